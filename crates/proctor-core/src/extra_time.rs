//! The extra-time pool.
//!
//! A test taker may be granted an additional, globally capped time allowance
//! consumable across one or more timed scopes. Consumption only moves
//! forward and never exceeds the allowance, no matter how many timers report
//! concurrently.

use serde::{Deserialize, Serialize};

/// Global per-session extra-time allowance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraTimePool {
    /// Total granted allowance in milliseconds.
    total_ms: u64,
    /// Amount consumed so far; monotonically non-decreasing, capped at total.
    consumed_ms: u64,
}

impl ExtraTimePool {
    pub fn new(total_ms: u64) -> Self {
        Self {
            total_ms,
            consumed_ms: 0,
        }
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    pub fn consumed_ms(&self) -> u64 {
        self.consumed_ms
    }

    pub fn remaining_ms(&self) -> u64 {
        self.total_ms - self.consumed_ms
    }

    /// Draw `amount_ms` from the pool. Returns what was actually consumed,
    /// which is less than requested once the pool runs dry.
    pub fn consume(&mut self, amount_ms: u64) -> u64 {
        let granted = amount_ms.min(self.remaining_ms());
        self.consumed_ms += granted;
        granted
    }

    /// Raise the consumed total to at least `reported_ms`.
    ///
    /// Concurrently active timers each report a consumed total; the pool
    /// keeps the largest. Reports below the current total are ignored, so
    /// consumption stays monotonic, and reports beyond the allowance are
    /// capped at it.
    pub fn record_consumed(&mut self, reported_ms: u64) {
        self.consumed_ms = self.consumed_ms.max(reported_ms).min(self.total_ms);
    }

    pub fn is_exhausted(&self) -> bool {
        self.consumed_ms >= self.total_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_caps_at_allowance() {
        let mut pool = ExtraTimePool::new(10_000);
        assert_eq!(pool.consume(6_000), 6_000);
        assert_eq!(pool.consume(6_000), 4_000);
        assert_eq!(pool.consumed_ms(), 10_000);
        assert!(pool.is_exhausted());
        assert_eq!(pool.consume(1), 0);
    }

    #[test]
    fn record_consumed_is_monotonic_and_capped() {
        let mut pool = ExtraTimePool::new(10_000);
        pool.record_consumed(4_000);
        assert_eq!(pool.consumed_ms(), 4_000);

        // A lower concurrent report must not roll consumption back.
        pool.record_consumed(2_500);
        assert_eq!(pool.consumed_ms(), 4_000);

        // Reports past the allowance are capped, regardless of how many
        // timers report concurrently.
        pool.record_consumed(25_000);
        assert_eq!(pool.consumed_ms(), 10_000);
        assert_eq!(pool.remaining_ms(), 0);
    }

    #[test]
    fn empty_pool() {
        let mut pool = ExtraTimePool::default();
        assert!(pool.is_exhausted());
        assert_eq!(pool.consume(500), 0);
    }
}
