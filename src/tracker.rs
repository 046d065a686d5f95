//! Per-connection delta accounting
//!
//! Operating systems expose write counters as running totals per process.
//! [`DeltaTracker`] remembers the last total seen for each
//! [`ConnectionIdentity`] and turns successive readings into per-tick deltas.
//!
//! The first reading for an identity is diffed against zero, so the first
//! delta is the process's whole write history up to that point rather than
//! the bytes written since monitoring started. Expect one oversized row the
//! first time a connection shows up.

use std::collections::HashMap;

use crate::types::ConnectionIdentity;

#[derive(Debug, Clone, Copy)]
struct Entry {
    total: u64,
    last_seen: u64,
}

/// Last observed cumulative byte count per connection identity.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    entries: HashMap<ConnectionIdentity, Entry>,
    tick: u64,
}

impl DeltaTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` for `identity` and return `current - previous`.
    ///
    /// The stored value is always overwritten, so a counter reset yields a
    /// negative delta once and the next tick diffs against the new baseline.
    /// Callers must discard non-positive deltas.
    pub fn observe(&mut self, identity: &ConnectionIdentity, current: u64) -> i64 {
        let tick = self.tick;
        let previous = match self.entries.get_mut(identity) {
            Some(entry) => {
                let previous = entry.total;
                entry.total = current;
                entry.last_seen = tick;
                previous
            }
            None => {
                self.entries.insert(
                    identity.clone(),
                    Entry {
                        total: current,
                        last_seen: tick,
                    },
                );
                0
            }
        };

        signed_delta(current, previous)
    }

    /// Last recorded cumulative count for `identity`
    #[must_use]
    pub fn previous(&self, identity: &ConnectionIdentity) -> Option<u64> {
        self.entries.get(identity).map(|entry| entry.total)
    }

    /// Close the current tick. Observations after this belong to the next one.
    pub fn end_tick(&mut self) {
        self.tick += 1;
    }

    /// Drop identities that have not been observed during the last
    /// `max_idle` ticks. Returns the number of evicted entries.
    pub fn evict_stale(&mut self, max_idle: u64) -> usize {
        let tick = self.tick;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| tick.saturating_sub(entry.last_seen) <= max_idle);
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn signed_delta(current: u64, previous: u64) -> i64 {
    if current >= previous {
        i64::try_from(current - previous).unwrap_or(i64::MAX)
    } else {
        i64::try_from(previous - current).map_or(i64::MIN, |d| -d)
    }
}
