//! Scheduled perturbations applied at fixed simulated times.
//!
//! An intervention changes the state or a rate constant without firing a
//! channel. Because the direct method is memoryless, a pending waiting time
//! that would cross an intervention is discarded and redrawn afterwards.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::model::{Count, Model};

pub(crate) const TIME_EPSILON: f64 = 1e-12;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InterventionAction {
    /// Adds `delta` copies of a species.
    SpeciesDelta { species: usize, delta: i64 },
    /// Overwrites the count of a species.
    SpeciesSet { species: usize, value: Count },
    /// Replaces the rate constant of a channel.
    RateSet { channel: usize, value: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterventionEvent {
    pub time: f64,
    pub actions: Vec<InterventionAction>,
}

/// Time-ordered list of interventions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InterventionPlan {
    events: Vec<InterventionEvent>,
}

impl InterventionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `actions` at `time`. Times must be non-decreasing.
    pub fn at(
        mut self,
        time: f64,
        actions: impl IntoIterator<Item = InterventionAction>,
    ) -> SimResult<Self> {
        if !(time.is_finite() && time >= 0.0) {
            return Err(SimError::InvalidArgument(
                "intervention times must be finite and non-negative".into(),
            ));
        }
        if let Some(last) = self.events.last() {
            if time + TIME_EPSILON < last.time {
                return Err(SimError::InvalidArgument(
                    "intervention times must be sorted".into(),
                ));
            }
        }
        let actions: Vec<_> = actions.into_iter().collect();
        if actions.is_empty() {
            return Err(SimError::InvalidArgument(
                "each intervention must specify at least one action".into(),
            ));
        }
        self.events.push(InterventionEvent { time, actions });
        Ok(self)
    }

    pub fn events(&self) -> &[InterventionEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Checks ordering and index ranges against `model`. Plans built through
    /// [`InterventionPlan::at`] are already ordered, deserialized ones may not be.
    pub fn validate(&self, model: &Model) -> SimResult<()> {
        let mut last_time = f64::NEG_INFINITY;
        for event in &self.events {
            if !(event.time.is_finite() && event.time >= 0.0) {
                return Err(SimError::InvalidArgument(
                    "intervention times must be finite and non-negative".into(),
                ));
            }
            if event.time + TIME_EPSILON < last_time {
                return Err(SimError::InvalidArgument(
                    "intervention times must be sorted".into(),
                ));
            }
            last_time = event.time;
            if event.actions.is_empty() {
                return Err(SimError::InvalidArgument(
                    "each intervention must specify at least one action".into(),
                ));
            }
            for action in &event.actions {
                match *action {
                    InterventionAction::SpeciesDelta { species, .. }
                    | InterventionAction::SpeciesSet { species, .. } => {
                        if species >= model.n_species() {
                            return Err(SimError::InvalidArgument(format!(
                                "intervention refers to invalid species index {species}"
                            )));
                        }
                    }
                    InterventionAction::RateSet { channel, value } => {
                        if channel >= model.n_channels() {
                            return Err(SimError::InvalidArgument(format!(
                                "intervention refers to invalid channel index {channel}"
                            )));
                        }
                        if !(value.is_finite() && value >= 0.0) {
                            return Err(SimError::InvalidArgument(format!(
                                "rate constant {value} for channel {channel} must be finite and non-negative"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Index of the first event not strictly before `time`.
    pub(crate) fn first_due_from(&self, time: f64) -> usize {
        self.events
            .iter()
            .position(|event| event.time + TIME_EPSILON >= time)
            .unwrap_or(self.events.len())
    }
}

pub(crate) fn apply_event(
    event: &InterventionEvent,
    state: &mut [Count],
    rate_constants: &mut [f64],
) -> SimResult<()> {
    for action in &event.actions {
        match *action {
            InterventionAction::SpeciesDelta { species, delta } => {
                state[species] = state[species].checked_add_signed(delta).ok_or_else(|| {
                    SimError::InvalidArgument(format!(
                        "intervention at t={} drives species {species} below zero",
                        event.time
                    ))
                })?;
            }
            InterventionAction::SpeciesSet { species, value } => state[species] = value,
            InterventionAction::RateSet { channel, value } => rate_constants[channel] = value,
        }
        tracing::trace!(time = event.time, ?action, "applied intervention");
    }
    Ok(())
}
