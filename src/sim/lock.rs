//! The single process-wide preemption lock.
//!
//! Scoped acquisition goes through [`PreemptionLock::acquire`], whose guard
//! releases on drop. The collaborator's lock/unlock callback pair maps onto
//! [`PreemptionLock::lock_raw`] and [`PreemptionLock::unlock_raw`], since the
//! collaborator brackets its critical sections with two separate calls.
//!
//! The lock is not reentrant: acquiring it twice from the same thread
//! deadlocks.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::LockError;

#[derive(Debug, Default)]
struct LockState {
    held: bool,
    closed: bool,
}

/// Mutual exclusion for all cross-partition shared state.
#[derive(Debug, Default)]
pub struct PreemptionLock {
    state: Mutex<LockState>,
    released: Condvar,
    acquisitions: AtomicU64,
}

impl PreemptionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock is free and returns a guard that releases it on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Closed`] once the run has been torn down.
    pub fn acquire(&self) -> Result<PreemptionGuard<'_>, LockError> {
        self.lock_raw()?;
        Ok(PreemptionGuard { lock: self })
    }

    /// Runs `f` inside the critical section.
    pub fn with<R>(&self, f: impl FnOnce(&PreemptionGuard<'_>) -> R) -> Result<R, LockError> {
        let guard = self.acquire()?;
        Ok(f(&guard))
    }

    /// Unscoped acquisition for the collaborator's lock callback.
    ///
    /// Every successful call must be paired with one
    /// [`unlock_raw`](Self::unlock_raw).
    pub fn lock_raw(&self) -> Result<(), LockError> {
        let mut state = self.state.lock();
        while state.held && !state.closed {
            self.released.wait(&mut state);
        }
        if state.closed {
            return Err(LockError::Closed);
        }
        state.held = true;
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Unscoped release for the collaborator's unlock callback.
    ///
    /// The lock has no owner: this releases whoever holds it. Callers must
    /// only release acquisitions they made themselves.
    pub fn unlock_raw(&self) -> Result<(), LockError> {
        let mut state = self.state.lock();
        if !state.held {
            return Err(LockError::NotHeld);
        }
        state.held = false;
        drop(state);
        self.released.notify_one();
        Ok(())
    }

    /// Rejects all further acquisitions and wakes any waiters.
    ///
    /// A holder at the time of closing keeps the lock until it releases.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.released.notify_all();
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Total successful acquisitions since creation.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}

/// Proof of holding the [`PreemptionLock`]. Shared-state accessors take a
/// reference to it.
#[derive(Debug)]
pub struct PreemptionGuard<'a> {
    lock: &'a PreemptionLock,
}

impl Drop for PreemptionGuard<'_> {
    fn drop(&mut self) {
        // Held by construction; NotHeld here would mean a stray unlock_raw.
        if self.lock.unlock_raw().is_err() {
            tracing::error!("preemption guard dropped while lock was not held");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let lock = PreemptionLock::new();
        {
            let _guard = lock.acquire().expect("lock should be free");
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn guard_releases_on_error_path() {
        fn fails(lock: &PreemptionLock) -> Result<(), String> {
            let _guard = lock.acquire().map_err(|e| e.to_string())?;
            Err("partition failed".to_string())
        }

        let lock = PreemptionLock::new();
        assert!(fails(&lock).is_err());
        assert!(!lock.is_held());
    }

    #[test]
    fn with_holds_lock_only_inside_closure() {
        let lock = PreemptionLock::new();
        let held = lock.with(|_| lock.is_held()).expect("lock should be free");
        assert!(held);
        assert!(!lock.is_held());
        lock.close();
        assert_eq!(lock.with(|_| ()), Err(LockError::Closed));
    }

    #[test]
    fn raw_pair_maps_to_same_lock() {
        let lock = PreemptionLock::new();
        lock.lock_raw().expect("lock should be free");
        assert!(lock.is_held());
        lock.unlock_raw().expect("lock is held");
        assert!(!lock.is_held());
        assert_eq!(lock.acquisitions(), 1);
    }

    #[test]
    fn unlock_without_lock_is_rejected() {
        let lock = PreemptionLock::new();
        assert_eq!(lock.unlock_raw(), Err(LockError::NotHeld));
    }

    #[test]
    fn closed_lock_rejects_acquisition() {
        let lock = PreemptionLock::new();
        lock.close();
        assert!(matches!(lock.acquire(), Err(LockError::Closed)));
    }

    #[test]
    fn close_wakes_blocked_waiter() {
        let lock = Arc::new(PreemptionLock::new());
        lock.lock_raw().expect("lock should be free");

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.lock_raw())
        };
        thread::sleep(std::time::Duration::from_millis(20));
        lock.close();
        assert_eq!(waiter.join().ok(), Some(Err(LockError::Closed)));
    }

    #[test]
    fn at_most_one_holder() {
        let lock = Arc::new(PreemptionLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard = lock.acquire().expect("lock is open");
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("worker should not panic");
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(lock.acquisitions(), 400);
    }
}
