use std::sync::atomic::{AtomicI64, Ordering};

use crate::state::MetricsSwitch;

/// A signed counter.
///
/// Every update is a single atomic operation, so the final value always equals the algebraic sum
/// of every delta applied, no matter how many threads are updating it.
#[derive(Debug)]
pub struct Counter {
    value: AtomicI64,
    switch: MetricsSwitch,
}

impl Counter {
    pub(crate) fn new(switch: MetricsSwitch) -> Counter {
        Counter { value: AtomicI64::new(0), switch }
    }

    /// Increments the counter by `n`.
    pub fn increment(&self, n: i64) {
        if self.switch.is_enabled() {
            self.value.fetch_add(n, Ordering::AcqRel);
        }
    }

    /// Decrements the counter by `n`.
    pub fn decrement(&self, n: i64) {
        if self.switch.is_enabled() {
            self.value.fetch_sub(n, Ordering::AcqRel);
        }
    }

    /// Resets the counter to zero.
    pub fn reset(&self) {
        if self.switch.is_enabled() {
            self.value.store(0, Ordering::Release);
        }
    }

    /// Gets the current value.
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }
}
