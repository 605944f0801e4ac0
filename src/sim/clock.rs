use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A simulation clock that walks `[start, stop)` in fixed steps.
///
/// Time at tick `n` is computed as `start + n * step` rather than by
/// repeated addition, so the same configuration always yields bit-identical
/// times.
///
/// # Examples
///
/// ```
/// use partition_sched::sim::clock::SimulationClock;
///
/// let mut clock = SimulationClock::new(0.0, 3.0, 1.0);
/// let mut times = Vec::new();
///
/// clock.run(|t| times.push(t));
/// assert_eq!(times, vec![0.0, 1.0, 2.0]);
/// ```
#[derive(Debug, Clone)]
pub struct SimulationClock {
    start: f64,
    stop: f64,
    step: f64,
    /// Number of ticks already handed out.
    ticks: u64,
}

impl SimulationClock {
    /// Creates a new clock over `[start, stop)`.
    ///
    /// # Panics
    ///
    /// Panics if `step` is not strictly positive.
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        assert!(step > 0.0, "step must be > 0");
        Self {
            start,
            stop,
            step,
            ticks: 0,
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(time)` - The simulation time of this tick
    /// * `None` - If the next time would reach the stop time
    pub fn tick(&mut self) -> Option<f64> {
        let time = self.time_at(self.ticks);
        if time < self.stop {
            self.ticks += 1;
            Some(time)
        } else {
            None
        }
    }

    /// Runs a function for each remaining tick.
    pub fn run(&mut self, mut f: impl FnMut(f64)) {
        while let Some(time) = self.tick() {
            f(time);
        }
    }

    /// Number of ticks handed out so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    fn time_at(&self, n: u64) -> f64 {
        self.start + n as f64 * self.step
    }
}

/// Read-only view of the coordinator's current simulation time, shared with
/// activations so that dependency-triggered requests use the time of the
/// tick in progress.
#[derive(Debug, Clone, Default)]
pub struct TimeCursor(Arc<AtomicU64>);

impl TimeCursor {
    pub fn new(time: f64) -> Self {
        Self(Arc::new(AtomicU64::new(time.to_bits())))
    }

    pub fn now(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn publish(&self, time: f64) {
        self.0.store(time.to_bits(), Ordering::Release);
    }
}
