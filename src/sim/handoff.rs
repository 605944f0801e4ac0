//! Cross-partition data hand-off.
//!
//! Every hand-off target input owns a mailbox. A producing activation posts
//! its output value; the consuming activation drains the mailbox and keeps
//! the most recent value, so each produced value is delivered at most once.
//! Both sides must hold the [`PreemptionLock`](super::lock::PreemptionLock).

use std::collections::BTreeMap;

use crossbeam_queue::SegQueue;

use super::lock::PreemptionGuard;
use super::types::{ClockId, Handoff, Value, VariableId};

type Endpoint = (ClockId, VariableId);

/// Shared state written by one partition and read by another.
#[derive(Debug, Default)]
pub struct HandoffBoard {
    routes: BTreeMap<Endpoint, Vec<Endpoint>>,
    mailboxes: BTreeMap<Endpoint, SegQueue<Value>>,
}

impl HandoffBoard {
    pub fn new(handoffs: &[Handoff]) -> Self {
        let mut routes: BTreeMap<Endpoint, Vec<Endpoint>> = BTreeMap::new();
        let mut mailboxes = BTreeMap::new();
        for h in handoffs {
            routes
                .entry((h.from_clock, h.output))
                .or_default()
                .push((h.to_clock, h.input));
            mailboxes
                .entry((h.to_clock, h.input))
                .or_insert_with(SegQueue::new);
        }
        Self { routes, mailboxes }
    }

    /// Returns `true` if this output of `clock`'s partition feeds another
    /// partition.
    pub fn is_source(&self, clock: ClockId, output: VariableId) -> bool {
        self.routes.contains_key(&(clock, output))
    }

    /// Posts a produced value to every input it is routed to. Returns the
    /// number of mailboxes written.
    pub fn post(
        &self,
        _guard: &PreemptionGuard<'_>,
        clock: ClockId,
        output: VariableId,
        value: Value,
    ) -> usize {
        let Some(targets) = self.routes.get(&(clock, output)) else {
            return 0;
        };
        let mut delivered = 0;
        for target in targets {
            if let Some(mailbox) = self.mailboxes.get(target) {
                mailbox.push(value);
                delivered += 1;
            }
        }
        delivered
    }

    /// Consumes the latest value handed to `input` of `clock`'s partition.
    ///
    /// Older undelivered values are discarded. Returns `None` when nothing
    /// was produced since the last take.
    pub fn take(
        &self,
        _guard: &PreemptionGuard<'_>,
        clock: ClockId,
        input: VariableId,
    ) -> Option<Value> {
        let mailbox = self.mailboxes.get(&(clock, input))?;
        let mut latest = None;
        while let Some(v) = mailbox.pop() {
            latest = Some(v);
        }
        latest
    }

    /// Number of values waiting for `input` of `clock`'s partition.
    pub fn pending(&self, clock: ClockId, input: VariableId) -> usize {
        self.mailboxes
            .get(&(clock, input))
            .map_or(0, SegQueue::len)
    }
}
