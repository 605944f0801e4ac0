//! Error taxonomy for the scheduler and its collaborators.

use crate::config::ConfigError;
use crate::sim::types::{ClockId, VariableId};

/// Error reported by the simulated-entity collaborator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("unknown clock {0}")]
    UnknownClock(ClockId),

    #[error("unknown variable {0}")]
    UnknownVariable(VariableId),

    #[error("variable {0} is not settable")]
    NotSettable(VariableId),

    #[error("value count {values} does not match variable count {variables}")]
    LengthMismatch { variables: usize, values: usize },

    #[error("{call} not allowed in state {state}")]
    InvalidState {
        call: &'static str,
        state: &'static str,
    },

    #[error("collaborator failed: {0}")]
    Failed(String),
}

/// Preemption lock failure.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    #[error("preemption lock has been closed")]
    Closed,

    #[error("preemption lock released while not held")]
    NotHeld,
}

/// Failure to start a concurrent execution unit.
#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("failed to spawn activation thread `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dispatcher is shut down")]
    ShutDown,
}

/// Failure of the output-recording sink.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("no output stream for {0}")]
    UnknownPartition(ClockId),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-level error. Only configuration, lifecycle and dispatch failures
/// reach this level; per-activation failures end in result cells.
#[derive(thiserror::Error, Debug)]
pub enum SchedError {
    #[error("invalid configuration: {}", join_config_errors(.0))]
    InvalidConfig(Vec<ConfigError>),

    #[error("instantiation failed: {0}")]
    Instantiate(#[source] CollaboratorError),

    #[error("{stage} failed: {source}")]
    Lifecycle {
        stage: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("dependency cycle: {target} re-triggered within cascade {lineage:?}")]
    DependencyCycle {
        target: ClockId,
        lineage: Vec<ClockId>,
    },

    #[error("clock query failed: {0}")]
    ClockQuery(#[source] CollaboratorError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("output recording failed: {0}")]
    Record(#[from] RecordError),
}

fn join_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
