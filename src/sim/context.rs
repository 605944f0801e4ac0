//! State shared by the coordinator and every running activation.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::SchedError;
use crate::io::export::OutputSink;

use super::clock::TimeCursor;
use super::collaborator::Collaborator;
use super::dispatch::Dispatcher;
use super::event::EventLog;
use super::handoff::HandoffBoard;
use super::lock::PreemptionLock;
use super::request::{ActivationRequest, ActivationStatus, ResultCell, Trigger};
use super::types::{ClockId, Topology};

/// Everything an activation needs, owned for the whole run.
pub struct SchedulerContext {
    pub topology: Topology,
    pub collaborator: Arc<dyn Collaborator>,
    pub lock: PreemptionLock,
    pub handoff: HandoffBoard,
    pub sink: Arc<dyn OutputSink>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub cursor: TimeCursor,
    pub events: EventLog,
    ledger: Mutex<Vec<LedgerEntry>>,
    fatal: Mutex<Option<SchedError>>,
}

struct LedgerEntry {
    clock: ClockId,
    time: f64,
    trigger: Trigger,
    result: ResultCell,
}

/// Outcome of one activation as seen after the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationRecord {
    pub clock: ClockId,
    pub time: f64,
    pub trigger: Trigger,
    /// `None` if the activation had not finished when the record was taken.
    pub status: Option<ActivationStatus>,
}

impl SchedulerContext {
    pub fn new(
        topology: Topology,
        collaborator: Arc<dyn Collaborator>,
        sink: Arc<dyn OutputSink>,
        dispatcher: Arc<dyn Dispatcher>,
        start_time: f64,
    ) -> Self {
        let handoff = HandoffBoard::new(topology.handoffs());
        Self {
            topology,
            collaborator,
            lock: PreemptionLock::new(),
            handoff,
            sink,
            dispatcher,
            cursor: TimeCursor::new(start_time),
            events: EventLog::default(),
            ledger: Mutex::new(Vec::new()),
            fatal: Mutex::new(None),
        }
    }

    /// Keeps a handle to the request's result cell for reporting.
    pub(crate) fn register(&self, request: &ActivationRequest) {
        self.ledger.lock().push(LedgerEntry {
            clock: request.clock,
            time: request.time,
            trigger: request.trigger,
            result: request.result.clone(),
        });
    }

    /// Activations dispatched so far, in dispatch order.
    pub fn activations(&self) -> Vec<ActivationRecord> {
        self.ledger
            .lock()
            .iter()
            .map(|e| ActivationRecord {
                clock: e.clock,
                time: e.time,
                trigger: e.trigger,
                status: e.result.get().cloned(),
            })
            .collect()
    }

    /// Flags a run-level error raised off the coordinator thread. The first
    /// error wins; the coordinator stops at its next check.
    pub fn raise_fatal(&self, err: SchedError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            tracing::error!(error = %err, "fatal scheduling error");
            *fatal = Some(err);
        }
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal.lock().is_some()
    }

    pub(crate) fn take_fatal(&self) -> Option<SchedError> {
        self.fatal.lock().take()
    }
}
