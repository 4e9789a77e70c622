//! Independent runs in parallel.
//!
//! Every run owns its state, its RNG and its record, so runs share nothing
//! mutable. Per-run seeds are derived from the base seed and the run index,
//! which makes the output independent of the thread count.

use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::Simulation;
use crate::error::{SimError, SimResult};
use crate::model::{Count, Model};
use crate::options::{EnsembleOptions, OutputMode, SimulationOptions};
use crate::trajectory::{Termination, Trajectory};

/// Initial states for the members of an ensemble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InitialStates {
    Shared(Vec<Count>),
    PerTrajectory(Vec<Vec<Count>>),
}

impl InitialStates {
    fn get(&self, idx: usize) -> &[Count] {
        match self {
            Self::Shared(state) => state,
            Self::PerTrajectory(states) => &states[idx],
        }
    }

    fn validate(&self, n_species: usize, n_trajectories: usize) -> SimResult<()> {
        let check = |state: &[Count]| {
            if state.len() == n_species {
                Ok(())
            } else {
                Err(SimError::Shape(format!(
                    "initial state length {} does not match number of species {}",
                    state.len(),
                    n_species
                )))
            }
        };
        match self {
            Self::Shared(state) => check(state),
            Self::PerTrajectory(states) => {
                if states.len() != n_trajectories {
                    return Err(SimError::Shape(format!(
                        "initial_states length {} does not match number of trajectories {}",
                        states.len(),
                        n_trajectories
                    )));
                }
                states.iter().try_for_each(|state| check(state))
            }
        }
    }
}

/// What one ensemble member recorded. `times[k]` is the time of `states[k]`:
/// the jump times, the requested time points, or the end time alone,
/// depending on the [`OutputMode`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub termination: Termination,
    pub firings: u64,
    pub end_time: f64,
    pub times: Vec<f64>,
    pub states: Vec<Vec<Count>>,
}

impl RunRecord {
    pub fn final_state(&self) -> Option<&[Count]> {
        self.states.last().map(Vec::as_slice)
    }
}

impl From<Trajectory> for RunRecord {
    fn from(trajectory: Trajectory) -> Self {
        let termination = trajectory.termination();
        let firings = trajectory.firings();
        let end_time = trajectory.end_time();
        let (times, states) = trajectory
            .into_samples()
            .into_iter()
            .map(|sample| (sample.time, sample.state))
            .unzip();
        Self {
            termination,
            firings,
            end_time,
            times,
            states,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOutput {
    pub mode: OutputMode,
    pub n_species: usize,
    pub runs: Vec<RunRecord>,
}

impl EnsembleOutput {
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Runs `ensemble.n_trajectories` independent trajectories.
pub fn run_ensemble(
    model: &Model,
    options: &SimulationOptions,
    ensemble: &EnsembleOptions,
    initial: &InitialStates,
) -> SimResult<EnsembleOutput> {
    options.validate()?;
    options.interventions.validate(model)?;
    ensemble.validate(options)?;
    initial.validate(model.n_species(), ensemble.n_trajectories)?;

    let base_seed = match ensemble.seed {
        Some(seed) => seed,
        None => entropy_seed()?,
    };
    info!(
        n_trajectories = ensemble.n_trajectories,
        n_threads = ?ensemble.n_threads,
        base_seed,
        "running ensemble"
    );

    let simulate = || -> SimResult<Vec<RunRecord>> {
        (0..ensemble.n_trajectories)
            .into_par_iter()
            .map(|idx| {
                let rng = ChaCha8Rng::seed_from_u64(derive_seed(base_seed, idx as u64));
                let mut sim = Simulation::new(model, initial.get(idx), options, rng)?;
                if let Some(times) = &ensemble.initial_times {
                    sim = sim.with_start_time(times[idx])?;
                }
                record_run(sim, &ensemble.output)
            })
            .collect()
    };

    let runs = match ensemble.n_threads {
        Some(n) => ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?
            .install(simulate)?,
        None => simulate()?,
    };

    info!(n_runs = runs.len(), "ensemble finished");
    Ok(EnsembleOutput {
        mode: ensemble.output.clone(),
        n_species: model.n_species(),
        runs,
    })
}

fn record_run(mut sim: Simulation<'_, ChaCha8Rng>, mode: &OutputMode) -> SimResult<RunRecord> {
    let (times, states) = match mode {
        OutputMode::Jumps => return sim.run().map(RunRecord::from),
        OutputMode::FinalOnly => {
            while sim.advance()?.is_some() {}
            (vec![sim.end_time()], vec![sim.state().to_vec()])
        }
        OutputMode::Timeseries(t_points) => {
            let mut recorded = Vec::with_capacity(t_points.len());
            let mut previous = sim.state().to_vec();
            while let Some(event) = sim.advance()? {
                // Points strictly before this event see the state it replaced.
                while recorded.len() < t_points.len() && t_points[recorded.len()] < event.time {
                    recorded.push(previous.clone());
                }
                previous.copy_from_slice(sim.state());
            }
            recorded.resize(t_points.len(), previous);
            (t_points.clone(), recorded)
        }
    };
    let termination = sim.termination().ok_or_else(|| {
        SimError::InvalidArgument("run stopped without reaching a terminal state".into())
    })?;
    Ok(RunRecord {
        termination,
        firings: sim.firings(),
        end_time: sim.end_time(),
        times,
        states,
    })
}

/// SplitMix64 mix of the base seed and the run index.
pub fn derive_seed(base: u64, trajectory: u64) -> u64 {
    const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut z = (base ^ trajectory.wrapping_mul(GOLDEN_GAMMA)).wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn entropy_seed() -> SimResult<u64> {
    let mut bytes = [0u8; 8];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

/// RNG for a single run: seeded when `seed` is given, otherwise from OS
/// entropy. Entropy failures are returned, not papered over.
pub fn seeded_rng(seed: Option<u64>) -> SimResult<ChaCha8Rng> {
    match seed {
        Some(seed) => Ok(ChaCha8Rng::seed_from_u64(seed)),
        None => Ok(ChaCha8Rng::from_rng(OsRng)?),
    }
}
