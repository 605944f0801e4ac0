use parking_lot::Mutex;
use serde::Serialize;

use super::types::ClockId;

/// An output clock observed Active during dependency resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutputClockEvent {
    /// Simulation time of the tick in progress.
    pub time: f64,
    /// The output clock that ticked.
    pub clock: ClockId,
    /// Input clock dispatched in response, `None` when the edge has no
    /// target or the target was already dispatched in the same pass.
    pub dispatched: Option<ClockId>,
}

impl OutputClockEvent {
    /// Returns `true` when the tick only got observed.
    pub fn is_observed_only(&self) -> bool {
        self.dispatched.is_none()
    }
}

/// Append-only record of observed output-clock ticks.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<OutputClockEvent>>,
}

impl EventLog {
    pub fn push(&self, event: OutputClockEvent) {
        self.events.lock().push(event);
    }

    pub fn snapshot(&self) -> Vec<OutputClockEvent> {
        self.events.lock().clone()
    }

    /// Events for one output clock, in arrival order.
    pub fn for_clock(&self, clock: ClockId) -> Vec<OutputClockEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.clock == clock)
            .copied()
            .collect()
    }
}
