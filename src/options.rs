//! Run and ensemble configuration.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::intervention::{InterventionPlan, TIME_EPSILON};

/// How the firing channel is chosen among the current propensities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSelection {
    /// Re-evaluate every channel each step and scan the cumulative sum.
    #[default]
    LinearScan,
    /// Keep propensities in a sum tree and re-evaluate only the channels that
    /// depend on species changed by the last firing.
    Tree,
}

/// Options for a single simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationOptions {
    /// Simulated time of the initial state.
    pub t_start: f64,
    /// Horizon; the run stops before the first firing past this time.
    pub t_max: f64,
    #[serde(default)]
    pub selection: ChannelSelection,
    /// Safety cap on the number of channel firings.
    #[serde(default)]
    pub max_firings: Option<u64>,
    #[serde(default)]
    pub interventions: InterventionPlan,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_max: 1.0,
            selection: ChannelSelection::default(),
            max_firings: None,
            interventions: InterventionPlan::default(),
        }
    }
}

impl SimulationOptions {
    pub fn with_horizon(t_max: f64) -> Self {
        Self {
            t_max,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(self.t_start.is_finite() && self.t_start >= 0.0) {
            return Err(SimError::InvalidArgument(
                "t_start must be finite and non-negative".into(),
            ));
        }
        if !(self.t_max.is_finite() && self.t_max > self.t_start) {
            return Err(SimError::InvalidArgument(
                "t_max must be finite and greater than t_start".into(),
            ));
        }
        if self.max_firings == Some(0) {
            return Err(SimError::InvalidArgument(
                "max_firings must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// What each ensemble member records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Every jump of the trajectory.
    Jumps,
    /// The state at each of the given (sorted) time points.
    Timeseries(Vec<f64>),
    /// Only the final state.
    #[default]
    FinalOnly,
}

/// Options for a set of independent runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOptions {
    pub n_trajectories: usize,
    /// Size of a dedicated thread pool; the global rayon pool when `None`.
    #[serde(default)]
    pub n_threads: Option<usize>,
    /// Base seed; per-run seeds are derived from it. Drawn from OS entropy
    /// when `None`.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub output: OutputMode,
    /// Per-run start times overriding `SimulationOptions::t_start`.
    #[serde(default)]
    pub initial_times: Option<Vec<f64>>,
}

impl EnsembleOptions {
    pub fn new(n_trajectories: usize) -> Self {
        Self {
            n_trajectories,
            n_threads: None,
            seed: None,
            output: OutputMode::default(),
            initial_times: None,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn validate(&self, sim: &SimulationOptions) -> SimResult<()> {
        if self.n_trajectories == 0 {
            return Err(SimError::InvalidArgument(
                "number of trajectories must be greater than zero".into(),
            ));
        }
        if self.n_threads == Some(0) {
            return Err(SimError::InvalidArgument(
                "n_threads must be positive".into(),
            ));
        }
        let mut latest_start = sim.t_start;
        if let Some(times) = &self.initial_times {
            if times.len() != self.n_trajectories {
                return Err(SimError::Shape(format!(
                    "initial_times length {} does not match number of trajectories {}",
                    times.len(),
                    self.n_trajectories
                )));
            }
            if times
                .iter()
                .any(|&t| !t.is_finite() || t < 0.0 || t >= sim.t_max)
            {
                return Err(SimError::InvalidArgument(
                    "initial_times entries must be finite and in [0, t_max)".into(),
                ));
            }
            latest_start = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        }
        if let OutputMode::Timeseries(t_points) = &self.output {
            if t_points.is_empty() {
                return Err(SimError::InvalidArgument(
                    "timeseries mode requires at least one time point".into(),
                ));
            }
            if t_points.iter().any(|t| !t.is_finite()) {
                return Err(SimError::InvalidArgument(
                    "t_points entries must be finite".into(),
                ));
            }
            if t_points.windows(2).any(|w| w[0] > w[1] + TIME_EPSILON) {
                return Err(SimError::InvalidArgument(
                    "t_points must be sorted in ascending order".into(),
                ));
            }
            if t_points[0] + TIME_EPSILON < latest_start {
                return Err(SimError::InvalidArgument(
                    "t_points must not precede the start time of any trajectory".into(),
                ));
            }
            if t_points[t_points.len() - 1] > sim.t_max + TIME_EPSILON {
                return Err(SimError::InvalidArgument(
                    "t_points cannot exceed t_max".into(),
                ));
            }
        }
        Ok(())
    }
}
