//! Activation requests and their single-write result cells.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use super::types::ClockId;

/// Step of an activation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStage {
    /// No execution unit could be started; the partition never ran.
    Dispatch,
    SetInputs,
    Activate,
    GetOutputs,
    Record,
    Lock,
    Panicked,
}

impl fmt::Display for ActivationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivationStage::Dispatch => "dispatch activation",
            ActivationStage::SetInputs => "set inputs",
            ActivationStage::Activate => "activate partition",
            ActivationStage::GetOutputs => "get outputs",
            ActivationStage::Record => "record outputs",
            ActivationStage::Lock => "acquire preemption lock",
            ActivationStage::Panicked => "panic",
        };
        f.write_str(s)
    }
}

/// Final outcome of one activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActivationStatus {
    Completed,
    Failed {
        stage: ActivationStage,
        reason: String,
    },
}

impl ActivationStatus {
    pub fn failed(stage: ActivationStage, reason: impl fmt::Display) -> Self {
        ActivationStatus::Failed {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ActivationStatus::Completed)
    }
}

/// Write-once slot for an activation's status.
///
/// Clones share the same slot, so the coordinator keeps a handle while the
/// activation owns the request.
#[derive(Debug, Clone, Default)]
pub struct ResultCell(Arc<OnceLock<ActivationStatus>>);

impl ResultCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the status. A second write is rejected and hands the status
    /// back.
    pub fn write(&self, status: ActivationStatus) -> Result<(), ActivationStatus> {
        self.0.set(status)
    }

    pub fn get(&self) -> Option<&ActivationStatus> {
        self.0.get()
    }

    pub fn is_written(&self) -> bool {
        self.0.get().is_some()
    }
}

/// What made an input clock Active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// The clock's time predicate.
    Predicate,
    /// A ticked output clock's dependency edge.
    Dependency { source: ClockId },
}

/// One consumed Active transition of an input clock.
#[derive(Debug)]
pub struct ActivationRequest {
    pub clock: ClockId,
    pub time: f64,
    pub trigger: Trigger,
    /// Input clocks of the cascade that led here, this one last.
    pub lineage: Vec<ClockId>,
    pub result: ResultCell,
}

impl ActivationRequest {
    /// Request started by a clock's own predicate.
    pub fn scheduled(clock: ClockId, time: f64) -> Self {
        Self {
            clock,
            time,
            trigger: Trigger::Predicate,
            lineage: vec![clock],
            result: ResultCell::new(),
        }
    }

    /// Request started by `source` ticking during an activation of the last
    /// clock in `lineage`.
    pub fn cascaded(clock: ClockId, time: f64, source: ClockId, lineage: &[ClockId]) -> Self {
        let mut chain = lineage.to_vec();
        chain.push(clock);
        Self {
            clock,
            time,
            trigger: Trigger::Dependency { source },
            lineage: chain,
            result: ResultCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_accepts_exactly_one_write() {
        let cell = ResultCell::new();
        let observer = cell.clone();
        assert!(!observer.is_written());

        assert!(cell.write(ActivationStatus::Completed).is_ok());
        let second = cell.write(ActivationStatus::failed(ActivationStage::Activate, "late"));
        assert!(second.is_err());
        assert_eq!(observer.get(), Some(&ActivationStatus::Completed));
    }

    #[test]
    fn cascaded_request_extends_lineage() {
        let req = ActivationRequest::cascaded(ClockId(3), 0.0, ClockId(4), &[ClockId(2)]);
        assert_eq!(req.lineage, vec![ClockId(2), ClockId(3)]);
        assert_eq!(req.trigger, Trigger::Dependency { source: ClockId(4) });
    }

    #[test]
    fn scheduled_request_starts_its_own_lineage() {
        let req = ActivationRequest::scheduled(ClockId(1), 4.0);
        assert_eq!(req.lineage, vec![ClockId(1)]);
        assert_eq!(req.trigger, Trigger::Predicate);
        assert!(!req.result.is_written());
    }
}
