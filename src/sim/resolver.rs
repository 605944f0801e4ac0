//! Translation of ticked output clocks into dependency-triggered activations.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::SchedError;

use super::activator::PartitionActivator;
use super::context::SchedulerContext;
use super::event::OutputClockEvent;
use super::request::{ActivationRequest, ResultCell};
use super::types::ClockId;

/// An activation started by a dependency edge.
#[derive(Debug, Clone)]
pub struct DispatchedRequest {
    pub clock: ClockId,
    pub time: f64,
    pub source: ClockId,
    pub result: ResultCell,
}

/// Reacts to partition notifications by dispatching downstream partitions.
pub struct DependencyResolver {
    ctx: Arc<SchedulerContext>,
    activator: PartitionActivator,
}

impl DependencyResolver {
    pub fn new(ctx: Arc<SchedulerContext>, activator: PartitionActivator) -> Self {
        Self { ctx, activator }
    }

    /// Runs one resolution pass.
    ///
    /// Queries every output clock, then works through the Active ones in id
    /// order. A targeted edge dispatches its input clock at the current
    /// simulation time; an untargeted edge is only logged and recorded. Each
    /// input clock is dispatched at most once per pass.
    ///
    /// `lineage` is the cascade of input clocks that led to the notifying
    /// activation.
    ///
    /// # Errors
    ///
    /// * [`SchedError::ClockQuery`] if the collaborator cannot report clocks
    /// * [`SchedError::DependencyCycle`] if an edge targets a clock already in
    ///   `lineage`
    /// * [`SchedError::Dispatch`] if a triggered activation cannot start
    pub fn on_partition_event(
        &self,
        lineage: &[ClockId],
    ) -> Result<Vec<DispatchedRequest>, SchedError> {
        let outputs = self.ctx.topology.output_clock_ids();
        if outputs.is_empty() {
            return Ok(Vec::new());
        }
        let states = self
            .ctx
            .collaborator
            .get_clocks(&outputs)
            .map_err(SchedError::ClockQuery)?;
        let time = self.ctx.cursor.now();

        let mut work: VecDeque<ClockId> = outputs
            .iter()
            .zip(&states)
            .filter(|(_, state)| state.is_active())
            .map(|(id, _)| *id)
            .collect();
        if work.is_empty() {
            debug!(time, "no output clock active");
        }

        let mut fired = BTreeSet::new();
        let mut dispatched = Vec::new();
        while let Some(source) = work.pop_front() {
            let Some(edge) = self.ctx.topology.output_clock(source) else {
                continue;
            };
            let Some(target) = edge.target else {
                info!(clock = %source, name = %edge.name, time, "output clock ticked");
                self.ctx.events.push(OutputClockEvent {
                    time,
                    clock: source,
                    dispatched: None,
                });
                continue;
            };

            if lineage.contains(&target) {
                let mut chain = lineage.to_vec();
                chain.push(target);
                return Err(SchedError::DependencyCycle {
                    target,
                    lineage: chain,
                });
            }
            if !fired.insert(target) {
                debug!(clock = %source, %target, "target already dispatched in this pass");
                self.ctx.events.push(OutputClockEvent {
                    time,
                    clock: source,
                    dispatched: None,
                });
                continue;
            }

            info!(clock = %source, %target, time, "output clock triggers dependent partition");
            self.ctx.events.push(OutputClockEvent {
                time,
                clock: source,
                dispatched: Some(target),
            });
            let request = ActivationRequest::cascaded(target, time, source, lineage);
            let result = self.activator.dispatch(request)?;
            dispatched.push(DispatchedRequest {
                clock: target,
                time,
                source,
                result,
            });
        }
        Ok(dispatched)
    }
}
