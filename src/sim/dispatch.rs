//! Starting activations on concurrent execution units.
//!
//! [`ThreadDispatcher`] runs every job on its own OS thread and never waits
//! for it; [`InlineDispatcher`] runs jobs to completion on the calling
//! thread for deterministic harnesses.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::error::DispatchError;

use super::types::Placement;

/// A unit of work handed to a dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Starts jobs with a given placement.
pub trait Dispatcher: Send + Sync {
    /// Starts `job` without waiting for it to finish.
    fn dispatch(&self, label: &str, placement: Placement, job: Job) -> Result<(), DispatchError>;

    /// Blocks until every job dispatched so far, including jobs they
    /// dispatched in turn, has finished. Only used at shutdown.
    fn quiesce(&self);

    /// Rejects further dispatches.
    fn close(&self);

    /// Number of jobs dispatched since creation.
    fn dispatched(&self) -> u64;
}

/// One OS thread per activation.
///
/// With the `affinity` feature and `pin_threads` set, each thread is pinned
/// to the core selected by its affinity group (`group % cores`), so one
/// group is time-sliced on one core. Without pinning the placement priority
/// is only carried as a hint in the thread name and log span.
#[derive(Debug, Default)]
pub struct ThreadDispatcher {
    pin_threads: bool,
    handles: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    dispatched: AtomicU64,
}

impl ThreadDispatcher {
    pub fn new(pin_threads: bool) -> Self {
        Self {
            pin_threads,
            ..Self::default()
        }
    }

    /// Number of threads started and not yet joined or reaped.
    pub fn in_flight(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }
}

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, label: &str, placement: Placement, job: Job) -> Result<(), DispatchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }

        let name = format!("{label}-p{}", placement.priority.0);
        let pin = self.pin_threads;
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                #[cfg(feature = "affinity")]
                if pin {
                    pin_to_group(placement.affinity);
                }

                #[cfg(not(feature = "affinity"))]
                let _ = pin;

                let span = tracing::debug_span!(
                    "activation",
                    priority = placement.priority.0,
                    affinity = placement.affinity.0
                );
                let _entered = span.enter();
                job();
            })
            .map_err(|source| DispatchError::Spawn { name, source })?;

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    fn quiesce(&self) {
        loop {
            let batch: Vec<_> = std::mem::take(&mut *self.handles.lock());
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if handle.join().is_err() {
                    tracing::error!("activation thread panicked outside the activation boundary");
                }
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

#[cfg(feature = "affinity")]
fn pin_to_group(group: super::types::AffinityGroup) {
    let Some(cores) = core_affinity::get_core_ids() else {
        tracing::warn!("core ids unavailable; running unpinned");
        return;
    };
    if cores.is_empty() {
        return;
    }
    let core = cores[group.0 % cores.len()];
    if !core_affinity::set_for_current(core) {
        tracing::warn!(core = core.id, "failed to pin activation thread");
    }
}

/// Runs each job synchronously inside `dispatch`.
///
/// Dependency cascades then nest inside the activation that triggered them,
/// which makes runs fully deterministic.
#[derive(Debug, Default)]
pub struct InlineDispatcher {
    closed: AtomicBool,
    dispatched: AtomicU64,
}

impl InlineDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, _label: &str, _placement: Placement, job: Job) -> Result<(), DispatchError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        job();
        Ok(())
    }

    fn quiesce(&self) {}

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}
