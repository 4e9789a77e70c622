//! Error types for model construction and simulation runs.

use thiserror::Error;

/// Errors raised while building a model or running a simulation.
///
/// Reaching an absorbing state is not an error; it is reported through
/// [`crate::Termination::Absorbed`].
#[derive(Debug, Error)]
pub enum SimError {
    #[error("channel {channel} produced invalid propensity {value}")]
    InvalidPropensity { channel: usize, value: f64 },

    #[error("model must contain at least one reaction channel")]
    EmptyChannelSet,

    #[error("model must contain at least one species")]
    NoSpecies,

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Firing would leave a count outside `0..=Count::MAX`. Reactant gating
    /// rules out underflow, so in practice this is a product overflow.
    #[error("channel {channel} would take species {species} out of range")]
    CountOutOfRange { channel: usize, species: usize },

    #[error("random number generator error: {0}")]
    Rng(String),

    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

pub type SimResult<T> = Result<T, SimError>;

impl From<rand::Error> for SimError {
    fn from(err: rand::Error) -> Self {
        SimError::Rng(err.to_string())
    }
}
