//! Gillespie direct-method engine.
//!
//! One [`Simulation`] owns the state of a single run. Each call to
//! [`Simulation::advance`] performs one iteration:
//!
//! 1. evaluate the propensities `a_i` and their sum `a0`;
//! 2. stop with [`Termination::Absorbed`] when `a0 <= 0`;
//! 3. draw `tau = -ln(r1) / a0` with `r1` uniform in `(0, 1)`;
//! 4. stop with [`Termination::HorizonReached`] when `t + tau > t_max`,
//!    leaving the state untouched;
//! 5. pick channel `j` with `a_1 + .. + a_{j-1} <= r2 < a_1 + .. + a_j` for
//!    `r2` uniform in `(0, a0)`;
//! 6. apply the stoichiometric delta of `j`.
//!
//! Pending interventions preempt step 4 when they fall before `t + tau`.

use rand::Rng;
use rand::distributions::Open01;
use tracing::debug;

use crate::ensemble::seeded_rng;
use crate::error::{SimError, SimResult};
use crate::intervention::{TIME_EPSILON, apply_event};
use crate::model::{Channel, Count, Model, checked_propensity};
use crate::options::{ChannelSelection, SimulationOptions};
use crate::trajectory::{Cause, Sample, Termination, Trajectory};
use crate::tree::{PropensityTree, select_linear};

/// One step of a run, without a copy of the state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub time: f64,
    pub cause: Cause,
}

/// Lifecycle of a run. `Terminated` and `Failed` are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Terminated(Termination),
    /// The run was aborted by an error returned from `advance`.
    Failed,
}

pub struct Simulation<'a, R> {
    model: &'a Model,
    options: &'a SimulationOptions,
    rng: R,
    state: Vec<Count>,
    rate_constants: Vec<f64>,
    propensities: Vec<f64>,
    tree: Option<PropensityTree>,
    stale: bool,
    time: f64,
    firings: u64,
    next_intervention: usize,
    started: bool,
    status: RunStatus,
}

impl<'a, R: Rng> Simulation<'a, R> {
    pub fn new(
        model: &'a Model,
        initial_state: &[Count],
        options: &'a SimulationOptions,
        rng: R,
    ) -> SimResult<Self> {
        options.validate()?;
        options.interventions.validate(model)?;
        if initial_state.len() != model.n_species() {
            return Err(SimError::Shape(format!(
                "initial state length {} does not match number of species {}",
                initial_state.len(),
                model.n_species()
            )));
        }
        let tree = match options.selection {
            ChannelSelection::LinearScan => None,
            ChannelSelection::Tree => Some(PropensityTree::new(model.n_channels())),
        };
        Ok(Self {
            model,
            options,
            rng,
            state: initial_state.to_vec(),
            rate_constants: model.channels().iter().map(Channel::rate_constant).collect(),
            propensities: vec![0.0; model.n_channels()],
            tree,
            stale: true,
            time: options.t_start,
            firings: 0,
            next_intervention: options.interventions.first_due_from(options.t_start),
            started: false,
            status: RunStatus::Running,
        })
    }

    /// Overrides `t_start` for this run. Only valid before the first step.
    pub fn with_start_time(mut self, t_start: f64) -> SimResult<Self> {
        if self.started {
            return Err(SimError::InvalidArgument(
                "start time can only be changed before the first step".into(),
            ));
        }
        if !(t_start.is_finite() && t_start >= 0.0 && t_start < self.options.t_max) {
            return Err(SimError::InvalidArgument(format!(
                "start time {t_start} must be in [0, t_max)"
            )));
        }
        self.time = t_start;
        self.next_intervention = self.options.interventions.first_due_from(t_start);
        Ok(self)
    }

    pub fn state(&self) -> &[Count] {
        &self.state
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn firings(&self) -> u64 {
        self.firings
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn termination(&self) -> Option<Termination> {
        match self.status {
            RunStatus::Terminated(reason) => Some(reason),
            _ => None,
        }
    }

    /// Simulated time at which the run stopped; `t_max` once the horizon was
    /// reached.
    pub fn end_time(&self) -> f64 {
        match self.status {
            RunStatus::Terminated(Termination::HorizonReached) => self.options.t_max,
            _ => self.time,
        }
    }

    /// Performs one step. The first call reports the initial state; `None`
    /// means the run has terminated.
    pub fn advance(&mut self) -> SimResult<Option<Event>> {
        if self.status != RunStatus::Running {
            return Ok(None);
        }
        let result = self.advance_running();
        if result.is_err() {
            self.status = RunStatus::Failed;
        }
        result
    }

    /// Like [`Simulation::advance`], with a copy of the resulting state.
    pub fn step(&mut self) -> SimResult<Option<Sample>> {
        let event = self.advance()?;
        Ok(event.map(|event| Sample {
            time: event.time,
            state: self.state.clone(),
            cause: event.cause,
        }))
    }

    /// Runs to termination and returns the materialized trajectory.
    pub fn run(mut self) -> SimResult<Trajectory> {
        let mut samples = Vec::new();
        while let Some(sample) = self.step()? {
            samples.push(sample);
        }
        let termination = self.termination().ok_or_else(|| {
            SimError::InvalidArgument("run stopped without reaching a terminal state".into())
        })?;
        Ok(Trajectory::new(
            samples,
            termination,
            self.firings,
            self.end_time(),
        ))
    }

    fn advance_running(&mut self) -> SimResult<Option<Event>> {
        if !self.started {
            self.started = true;
            self.apply_due_interventions()?;
            debug!(
                n_species = self.model.n_species(),
                n_channels = self.model.n_channels(),
                t_start = self.time,
                t_max = self.options.t_max,
                selection = ?self.options.selection,
                "starting run"
            );
            return Ok(Some(Event {
                time: self.time,
                cause: Cause::Initial,
            }));
        }

        // Absorption takes precedence over the firing cap.
        let a0 = self.total_propensity()?;
        let next_intervention = self.pending_intervention_time();
        if a0 <= 0.0 {
            return match next_intervention {
                Some(time) => self.jump_to_intervention(time),
                None => Ok(self.terminate(Termination::Absorbed)),
            };
        }

        if let Some(limit) = self.options.max_firings {
            if self.firings >= limit {
                return Ok(self.terminate(Termination::FiringLimit));
            }
        }

        let r1: f64 = self.rng.sample(Open01);
        let tau = -r1.ln() / a0;
        let next_time = self.time + tau;
        if let Some(time) = next_intervention {
            if next_time + TIME_EPSILON >= time {
                return self.jump_to_intervention(time);
            }
        }
        if next_time > self.options.t_max {
            return Ok(self.terminate(Termination::HorizonReached));
        }

        let r2: f64 = self.rng.sample(Open01);
        let target = r2 * a0;
        let channel = match &self.tree {
            Some(tree) => tree.select(target),
            None => select_linear(&self.propensities, target),
        };
        self.fire(channel)?;
        self.time = next_time;
        self.firings += 1;
        Ok(Some(Event {
            time: next_time,
            cause: Cause::Channel(channel),
        }))
    }

    fn total_propensity(&mut self) -> SimResult<f64> {
        match self.tree.as_mut() {
            None => recompute_propensities(
                self.model.channels(),
                &self.rate_constants,
                &self.state,
                &mut self.propensities,
            ),
            Some(tree) => {
                if self.stale {
                    recompute_propensities(
                        self.model.channels(),
                        &self.rate_constants,
                        &self.state,
                        &mut self.propensities,
                    )?;
                    tree.rebuild(&self.propensities);
                    self.stale = false;
                }
                Ok(tree.total())
            }
        }
    }

    fn fire(&mut self, channel: usize) -> SimResult<()> {
        let channels = self.model.channels();
        for delta in channels[channel].deltas() {
            let count = &mut self.state[delta.species];
            *count = count.checked_add_signed(delta.delta).ok_or(
                SimError::CountOutOfRange {
                    channel,
                    species: delta.species,
                },
            )?;
        }
        if let Some(tree) = self.tree.as_mut() {
            for &dep in self.model.dependents(channel) {
                let value = checked_propensity(
                    dep,
                    channels[dep].propensity(self.rate_constants[dep], &self.state),
                )?;
                self.propensities[dep] = value;
                tree.update(dep, value);
            }
        }
        Ok(())
    }

    fn pending_intervention_time(&self) -> Option<f64> {
        self.options
            .interventions
            .events()
            .get(self.next_intervention)
            .map(|event| event.time)
            .filter(|&time| time <= self.options.t_max + TIME_EPSILON)
    }

    fn jump_to_intervention(&mut self, time: f64) -> SimResult<Option<Event>> {
        self.time = time.max(self.time);
        self.apply_due_interventions()?;
        Ok(Some(Event {
            time: self.time,
            cause: Cause::Intervention,
        }))
    }

    fn apply_due_interventions(&mut self) -> SimResult<()> {
        let events = self.options.interventions.events();
        while let Some(event) = events.get(self.next_intervention) {
            if self.time + TIME_EPSILON < event.time {
                break;
            }
            apply_event(event, &mut self.state, &mut self.rate_constants)?;
            self.next_intervention += 1;
            self.stale = true;
        }
        Ok(())
    }

    fn terminate(&mut self, reason: Termination) -> Option<Event> {
        self.status = RunStatus::Terminated(reason);
        debug!(
            ?reason,
            firings = self.firings,
            time = self.time,
            "run terminated"
        );
        None
    }
}

impl<R: Rng> Iterator for Simulation<'_, R> {
    type Item = SimResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}

/// Evaluates every channel into `propensities` and returns their sum.
pub(crate) fn recompute_propensities(
    channels: &[Channel],
    rate_constants: &[f64],
    state: &[Count],
    propensities: &mut [f64],
) -> SimResult<f64> {
    let mut total = 0.0;
    for (idx, channel) in channels.iter().enumerate() {
        let value = checked_propensity(idx, channel.propensity(rate_constants[idx], state))?;
        propensities[idx] = value;
        total += value;
    }
    Ok(total)
}

/// Runs one trajectory with a fresh RNG: seeded when `seed` is given,
/// otherwise drawn from OS entropy.
pub fn simulate(
    model: &Model,
    initial_state: &[Count],
    options: &SimulationOptions,
    seed: Option<u64>,
) -> SimResult<Trajectory> {
    let rng = seeded_rng(seed)?;
    Simulation::new(model, initial_state, options, rng)?.run()
}
