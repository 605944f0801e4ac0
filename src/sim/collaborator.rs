//! Boundary to the simulated entity.
//!
//! The scheduler drives a [`Collaborator`]; the collaborator calls back into
//! the scheduler through [`HostCallbacks`].

use crate::error::{CollaboratorError, LockError};

use super::types::{ClockId, ClockState, Value, VariableId};

/// The simulated entity whose partitions are scheduled.
///
/// All methods may be called concurrently from several activation threads;
/// implementations protect their own state.
pub trait Collaborator: Send + Sync {
    /// Creates the simulated instance.
    fn instantiate(&self, instance_name: &str) -> Result<(), CollaboratorError>;

    fn enter_initialization(&self, start_time: f64, stop_time: f64)
    -> Result<(), CollaboratorError>;

    fn exit_initialization(&self) -> Result<(), CollaboratorError>;

    /// Runs the partition bound to `clock` at `time`.
    ///
    /// `host` is valid for the duration of the call.
    fn activate_partition(
        &self,
        clock: ClockId,
        time: f64,
        host: &dyn HostCallbacks,
    ) -> Result<(), CollaboratorError>;

    /// Reads clock states. Reading an Active output clock resets it.
    fn get_clocks(&self, clocks: &[ClockId]) -> Result<Vec<ClockState>, CollaboratorError>;

    fn set_variables(&self, vars: &[VariableId], values: &[Value])
    -> Result<(), CollaboratorError>;

    fn get_variables(&self, vars: &[VariableId]) -> Result<Vec<Value>, CollaboratorError>;

    fn terminate(&self) -> Result<(), CollaboratorError>;

    /// Releases the instance. Called once, last.
    fn dispose(&self);
}

/// Callbacks the scheduler exposes to a running partition.
pub trait HostCallbacks: Send + Sync {
    /// The partition's state changed in a way that may have ticked output
    /// clocks.
    fn intermediate_update(&self, clocks_ticked: bool);

    /// Enters a critical section guarded by the preemption lock.
    fn lock_preemption(&self) -> Result<(), LockError>;

    /// Leaves the critical section entered by
    /// [`lock_preemption`](Self::lock_preemption).
    ///
    /// Fails with [`LockError::NotHeld`] if this activation holds no lock.
    /// Locks still held when the activation ends are released for it.
    fn unlock_preemption(&self) -> Result<(), LockError>;
}
