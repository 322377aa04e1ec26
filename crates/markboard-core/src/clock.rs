//! Logical clock for ordering document mutations.

use serde::{Deserialize, Serialize};

/// Lamport counter, one per document.
///
/// Every local mutation takes a fresh value from [`LogicalClock::tick`]; every
/// remote counter seen is folded in with [`LogicalClock::observe`] so the next
/// local value is strictly greater than anything already applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalClock {
    counter: u64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value (the last one handed out or observed).
    pub fn now(&self) -> u64 {
        self.counter
    }

    /// Advance and return the new value.
    pub fn tick(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    /// Fold in a counter received from another replica.
    pub fn observe(&mut self, remote: u64) {
        self.counter = self.counter.max(remote);
    }
}
