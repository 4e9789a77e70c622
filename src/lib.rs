//! Exact stochastic simulation of well-mixed chemical reaction networks.
//!
//! A [`Model`] is a fixed set of species and reaction [`Channel`]s, each with
//! a stoichiometric delta and a state-dependent propensity. A [`Simulation`]
//! advances one sample path of the chemical master equation with Gillespie's
//! direct method, either lazily (it is an [`Iterator`] of [`Sample`]s) or to
//! completion with [`Simulation::run`]. [`run_ensemble`] runs independent
//! paths in parallel with reproducible per-run seeds.
//!
//! ```no_run
//! use stochsim::{Channel, Model, SimulationOptions, Termination, simulate};
//!
//! let mut builder = Model::builder();
//! let a = builder.species("A");
//! let b = builder.species("B");
//! builder.channel(Channel::mass_action(1.0, &[(a, 1)], &[(b, 1)]));
//! let model = builder.build()?;
//!
//! let options = SimulationOptions::with_horizon(50.0);
//! let trajectory = simulate(&model, &[1000, 0], &options, Some(7))?;
//! assert_eq!(trajectory.termination(), Termination::Absorbed);
//! # Ok::<(), stochsim::SimError>(())
//! ```

pub mod analysis;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod intervention;
pub mod model;
pub mod options;
pub mod sparse;
pub mod trajectory;

mod tree;

pub use analysis::{final_distribution, mean_timeseries, termination_counts};
pub use engine::{Event, RunStatus, Simulation, simulate};
pub use ensemble::{
    EnsembleOutput, InitialStates, RunRecord, derive_seed, run_ensemble, seeded_rng,
};
pub use error::{SimError, SimResult};
pub use intervention::{InterventionAction, InterventionEvent, InterventionPlan};
pub use model::{Channel, Count, Kinetics, Model, ModelBuilder, PropensityFn, SpeciesDelta};
pub use options::{ChannelSelection, EnsembleOptions, OutputMode, SimulationOptions};
pub use sparse::SparseCounts;
pub use trajectory::{Cause, Sample, Termination, Trajectory};

#[cfg(test)]
mod tests;
