//! Recorded jump histories.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::model::Count;

/// Why a run stopped. None of these is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Termination {
    /// The next firing would have happened after `t_max`.
    HorizonReached,
    /// Every propensity was zero and no intervention was pending.
    Absorbed,
    /// `max_firings` channel firings were performed.
    FiringLimit,
}

/// What produced a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cause {
    Initial,
    Channel(usize),
    Intervention,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub state: Vec<Count>,
    pub cause: Cause,
}

/// Full history of one run: the initial sample followed by one sample per
/// firing or intervention, in time order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    samples: Vec<Sample>,
    termination: Termination,
    firings: u64,
    end_time: f64,
}

impl Trajectory {
    pub(crate) fn new(
        samples: Vec<Sample>,
        termination: Termination,
        firings: u64,
        end_time: f64,
    ) -> Self {
        Self {
            samples,
            termination,
            firings,
            end_time,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Number of channel firings, excluding interventions.
    pub fn firings(&self) -> u64 {
        self.firings
    }

    /// `t_max` when the horizon was reached, otherwise the time of the last
    /// sample.
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn final_state(&self) -> Option<&[Count]> {
        self.samples.last().map(|s| s.state.as_slice())
    }

    pub fn final_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.time)
    }

    /// State in effect at `time`: the last sample recorded at or before it.
    /// `None` before the first sample.
    pub fn state_at(&self, time: f64) -> Option<&[Count]> {
        let idx = self.samples.partition_point(|s| s.time <= time);
        idx.checked_sub(1).map(|i| self.samples[i].state.as_slice())
    }

    /// States at each of `times`, which must not precede the first sample.
    pub fn sample_grid(&self, times: &[f64]) -> SimResult<Vec<Vec<Count>>> {
        times
            .iter()
            .map(|&t| {
                self.state_at(t).map(<[Count]>::to_vec).ok_or_else(|| {
                    SimError::InvalidArgument(format!(
                        "time {t} precedes the start of the trajectory"
                    ))
                })
            })
            .collect()
    }

    /// Gaps between consecutive samples.
    pub fn waiting_times(&self) -> Vec<f64> {
        self.samples
            .windows(2)
            .map(|pair| pair[1].time - pair[0].time)
            .collect()
    }

    /// `(time, count)` pairs for one species.
    pub fn species_series(&self, species: usize) -> Vec<(f64, Count)> {
        self.samples
            .iter()
            .filter_map(|s| s.state.get(species).map(|&c| (s.time, c)))
            .collect()
    }
}
