//! Execution of a single partition activation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, error, warn};

use crate::error::{DispatchError, LockError, SchedError};

use super::collaborator::HostCallbacks;
use super::context::SchedulerContext;
use super::request::{ActivationRequest, ActivationStage, ActivationStatus, ResultCell};
use super::resolver::DependencyResolver;
use super::types::{ClockId, NEUTRAL_VALUE, Partition, Value};

/// Runs activation requests against the collaborator.
#[derive(Clone)]
pub struct PartitionActivator {
    ctx: Arc<SchedulerContext>,
}

impl PartitionActivator {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self { ctx }
    }

    /// Starts `request` on its own execution unit with its clock's
    /// configured placement and returns a handle to its result cell.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] if no execution unit could be started. The
    /// request's result cell is then written with the failure.
    pub fn dispatch(&self, request: ActivationRequest) -> Result<ResultCell, DispatchError> {
        let Some(clock) = self.ctx.topology.input_clock(request.clock) else {
            let cell = request.result.clone();
            write_once(
                &cell,
                request.clock,
                ActivationStatus::failed(
                    ActivationStage::Dispatch,
                    format!("no input clock {}", request.clock),
                ),
            );
            return Ok(cell);
        };
        let placement = clock.placement;
        let label = clock.name.clone();
        let clock_id = request.clock;
        let cell = request.result.clone();
        self.ctx.register(&request);

        debug!(clock = %request.clock, time = request.time, "dispatching activation");
        let activator = self.clone();
        let outcome = self.ctx.dispatcher.dispatch(
            &label,
            placement,
            Box::new(move || {
                activator.activate(request);
            }),
        );
        if let Err(err) = outcome {
            write_once(
                &cell,
                clock_id,
                ActivationStatus::failed(ActivationStage::Dispatch, &err),
            );
            return Err(err);
        }
        Ok(cell)
    }

    /// Executes one request and writes its result cell exactly once.
    ///
    /// Failures are logged and end up in the cell; they never propagate.
    pub fn activate(&self, request: ActivationRequest) -> ActivationStatus {
        let status = match panic::catch_unwind(AssertUnwindSafe(|| self.run_steps(&request))) {
            Ok(Ok(())) => ActivationStatus::Completed,
            Ok(Err(status)) => status,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ActivationStatus::failed(ActivationStage::Panicked, reason)
            }
        };

        if let ActivationStatus::Failed { stage, reason } = &status {
            warn!(clock = %request.clock, time = request.time, %stage, %reason, "activation failed");
        } else {
            debug!(clock = %request.clock, time = request.time, "activation completed");
        }
        write_once(&request.result, request.clock, status.clone());
        status
    }

    fn run_steps(&self, request: &ActivationRequest) -> Result<(), ActivationStatus> {
        let partition = self.ctx.topology.partition(request.clock).ok_or_else(|| {
            ActivationStatus::failed(
                ActivationStage::Activate,
                format!("no partition bound to {}", request.clock),
            )
        })?;
        let collaborator = &self.ctx.collaborator;

        // (a) inputs
        if !partition.inputs.is_empty() {
            let values = self
                .take_inputs(partition)
                .map_err(|e| ActivationStatus::failed(ActivationStage::Lock, e))?;
            collaborator
                .set_variables(&partition.input_ids(), &values)
                .map_err(|e| ActivationStatus::failed(ActivationStage::SetInputs, e))?;
        }

        // (b) activation, with callbacks bound to this request's cascade.
        // The host is dropped before the outputs are read, releasing any lock
        // the collaborator left behind, including on unwind.
        let activated = {
            let host = ActivationHost::new(self.clone(), request);
            collaborator.activate_partition(request.clock, request.time, &host)
        };
        activated.map_err(|e| ActivationStatus::failed(ActivationStage::Activate, e))?;

        // (c) outputs
        let outputs = collaborator
            .get_variables(&partition.output_ids())
            .map_err(|e| ActivationStatus::failed(ActivationStage::GetOutputs, e))?;

        // (d) hand-off
        self.post_outputs(partition, &outputs)
            .map_err(|e| ActivationStatus::failed(ActivationStage::Lock, e))?;

        // (e) record
        self.ctx
            .sink
            .record(partition, request.time, &outputs)
            .map_err(|e| ActivationStatus::failed(ActivationStage::Record, e))?;
        Ok(())
    }

    fn take_inputs(&self, partition: &Partition) -> Result<Vec<Value>, LockError> {
        self.ctx.lock.with(|guard| {
            partition
                .inputs
                .iter()
                .map(|v| {
                    self.ctx
                        .handoff
                        .take(guard, partition.clock, v.id)
                        .unwrap_or(NEUTRAL_VALUE)
                })
                .collect()
        })
    }

    fn post_outputs(&self, partition: &Partition, outputs: &[Value]) -> Result<(), LockError> {
        let routed: Vec<_> = partition
            .outputs
            .iter()
            .zip(outputs)
            .filter(|(v, _)| self.ctx.handoff.is_source(partition.clock, v.id))
            .collect();
        if routed.is_empty() {
            return Ok(());
        }
        self.ctx.lock.with(|guard| {
            for (var, value) in routed {
                self.ctx.handoff.post(guard, partition.clock, var.id, *value);
            }
        })
    }
}

fn write_once(cell: &ResultCell, clock: ClockId, status: ActivationStatus) {
    if cell.write(status).is_err() {
        warn!(%clock, "result cell already written");
    }
}

/// Callbacks handed to the collaborator for one activation.
///
/// Tracks the raw preemption locks it handed out. Unlocks beyond that count
/// are rejected, and whatever is still held when the host drops is released.
struct ActivationHost {
    activator: PartitionActivator,
    clock: ClockId,
    lineage: Vec<ClockId>,
    held: AtomicUsize,
}

impl ActivationHost {
    fn new(activator: PartitionActivator, request: &ActivationRequest) -> Self {
        Self {
            activator,
            clock: request.clock,
            lineage: request.lineage.clone(),
            held: AtomicUsize::new(0),
        }
    }
}

impl Drop for ActivationHost {
    fn drop(&mut self) {
        let leaked = *self.held.get_mut();
        if leaked == 0 {
            return;
        }
        error!(clock = %self.clock, leaked, "activation left the preemption lock held; releasing");
        for _ in 0..leaked {
            if let Err(err) = self.activator.ctx.lock.unlock_raw() {
                error!(clock = %self.clock, error = %err, "releasing leaked preemption lock failed");
            }
        }
    }
}

impl HostCallbacks for ActivationHost {
    fn intermediate_update(&self, clocks_ticked: bool) {
        if !clocks_ticked {
            debug!("intermediate update without clock ticks");
            return;
        }
        let ctx = &self.activator.ctx;
        let resolver = DependencyResolver::new(Arc::clone(ctx), self.activator.clone());
        if let Err(err) = resolver.on_partition_event(&self.lineage) {
            match err {
                SchedError::ClockQuery(e) => {
                    warn!(error = %e, "output clock query failed");
                }
                fatal => ctx.raise_fatal(fatal),
            }
        }
    }

    fn lock_preemption(&self) -> Result<(), LockError> {
        self.activator.ctx.lock.lock_raw()?;
        self.held.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unlock_preemption(&self) -> Result<(), LockError> {
        // Only this host's own acquisitions may be released through it.
        self.held
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| {
                warn!(clock = %self.clock, "unlock without a matching lock from this activation");
                LockError::NotHeld
            })?;
        self.activator.ctx.lock.unlock_raw()
    }
}
