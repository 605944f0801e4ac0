//! The coordinating time loop.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::SchedError;

use super::activator::PartitionActivator;
use super::clock::SimulationClock;
use super::context::SchedulerContext;
use super::request::{ActivationRequest, ResultCell};
use super::types::{ClockId, ClockState};

/// Counters from one pass of the time loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Ticks evaluated.
    pub ticks: u64,
    /// Activations started by time predicates.
    pub scheduled: u64,
}

/// Drives the simulation clock and dispatches predicate-driven activations.
///
/// The scheduler never waits for the activations it starts: an activation
/// from tick `t` may still run when tick `t + 1` dispatches again.
pub struct ClockScheduler {
    ctx: Arc<SchedulerContext>,
    activator: PartitionActivator,
    clock: SimulationClock,
    /// One entry per input clock, in `topology.input_clocks()` order.
    states: Vec<ClockState>,
    pacing: Option<Duration>,
}

impl ClockScheduler {
    pub fn new(ctx: Arc<SchedulerContext>, clock: SimulationClock) -> Self {
        let states = vec![ClockState::Inactive; ctx.topology.input_clocks().len()];
        let activator = PartitionActivator::new(Arc::clone(&ctx));
        Self {
            ctx,
            activator,
            clock,
            states,
            pacing: None,
        }
    }

    /// Sleeps `pacing` of wall-clock time after every tick.
    pub fn with_pacing(mut self, pacing: Option<Duration>) -> Self {
        self.pacing = pacing.filter(|d| !d.is_zero());
        self
    }

    /// Current state of an input clock.
    pub fn state(&self, clock: ClockId) -> Option<ClockState> {
        self.ctx
            .topology
            .input_clocks()
            .iter()
            .position(|c| c.id == clock)
            .map(|i| self.states[i])
    }

    /// Evaluates every independent input clock's predicate at `time` and
    /// returns the ids found Active, in ascending order.
    ///
    /// Dependency-triggered clocks are left untouched.
    pub fn tick(&mut self, time: f64) -> Vec<ClockId> {
        let mut active = Vec::new();
        for (state, clock) in self.states.iter_mut().zip(self.ctx.topology.input_clocks()) {
            if clock.predicate.is_triggered() {
                continue;
            }
            *state = if clock.predicate.is_active(time) {
                active.push(clock.id);
                ClockState::Active
            } else {
                ClockState::Inactive
            };
        }
        active
    }

    /// Consumes every Active clock into an activation request at `time`.
    ///
    /// Each clock is reset to Inactive before its request is handed off, so
    /// one Active observation starts at most one activation.
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::Dispatch`] on the first request that cannot be
    /// started; later Active clocks of the same tick stay Active.
    pub fn dispatch_active(&mut self, time: f64) -> Result<Vec<ResultCell>, SchedError> {
        let mut cells = Vec::new();
        for (i, clock) in self.ctx.topology.input_clocks().iter().enumerate() {
            if !self.states[i].is_active() {
                continue;
            }
            self.states[i] = ClockState::Inactive;
            debug!(clock = %clock.id, name = %clock.name, time, "starting activation");
            let cell = self
                .activator
                .dispatch(ActivationRequest::scheduled(clock.id, time))?;
            cells.push(cell);
        }
        Ok(cells)
    }

    /// Runs the loop until the stop time or the first fatal error.
    pub fn run(&mut self) -> Result<LoopSummary, SchedError> {
        let mut summary = LoopSummary::default();
        while let Some(time) = self.clock.tick() {
            if let Some(err) = self.ctx.take_fatal() {
                return Err(err);
            }
            self.ctx.cursor.publish(time);
            summary.ticks += 1;

            let active = self.tick(time);
            if !active.is_empty() {
                info!(time, clocks = ?active, "tick");
                let cells = self.dispatch_active(time)?;
                summary.scheduled += cells.len() as u64;
            }

            if let Some(err) = self.ctx.take_fatal() {
                return Err(err);
            }
            if let Some(pacing) = self.pacing {
                thread::sleep(pacing);
            }
        }
        Ok(summary)
    }
}
