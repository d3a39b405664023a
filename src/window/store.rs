//! Window state store trait for abstracting in-process and remote backends.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::LimitConfig;
use crate::error::Result;

use super::info::Status;
use super::key::CounterKey;

/// A point-in-time view of a window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Units counted in the window (0 when there is no live counter)
    pub count: u64,
    /// Remaining lifetime of the counter, `None` when there is no live counter
    pub ttl: Option<Duration>,
}

impl WindowSnapshot {
    /// Snapshot of a key with no live counter.
    pub fn absent() -> Self {
        Self {
            count: 0,
            ttl: None,
        }
    }

    /// Whether a live counter exists.
    pub fn is_open(&self) -> bool {
        self.ttl.is_some()
    }
}

/// Result of an atomic conditional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementOutcome {
    /// Which branch the store took
    pub status: Status,
    /// Counter value after the operation (unchanged unless `Success`)
    pub count: u64,
    /// Remaining lifetime of the counter
    pub ttl: Option<Duration>,
}

/// Trait for window state stores.
///
/// Every method must run as a single atomic operation against the store;
/// the limiter holds no locks of its own and relies on this alone for
/// correctness across concurrent callers and processes.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Read the counter without touching its value or expiry.
    async fn read(&self, key: &CounterKey) -> Result<WindowSnapshot>;

    /// Add `count` units if they fit.
    ///
    /// An absent counter is opened first with a count of 0 and a TTL equal
    /// to the window duration. Then:
    /// - `count >= limit` → `Throttled`, nothing changes
    /// - `count + requested > limit` → `Failure`, nothing changes
    /// - otherwise → `Success`, the count grows and the TTL is left alone
    async fn increment_if_capacity(
        &self,
        key: &CounterKey,
        limits: &LimitConfig,
        count: u64,
    ) -> Result<IncrementOutcome>;

    /// Remove the counter, closing the window immediately.
    async fn clear(&self, key: &CounterKey) -> Result<()>;

    /// Get store type name for debugging.
    fn store_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_snapshot() {
        let snapshot = WindowSnapshot::absent();
        assert_eq!(snapshot.count, 0);
        assert!(!snapshot.is_open());
    }
}
