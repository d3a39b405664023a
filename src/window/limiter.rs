//! Fixed window rate limiter.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::{LimitConfig, MAX_UNITS};
use crate::error::{LimitReason, LimitedError, Result, WindowError};

use super::info::{RateLimitInfo, Status};
use super::key::CounterKey;
use super::store::WindowStore;

/// A rate limiter using the Fixed Window algorithm.
///
/// A window admits up to `limit` units. The first admitted unit opens the
/// window, which then lives for `duration` no matter how many more units are
/// added. Once it expires the whole capacity is available again; nothing is
/// refilled before that. Bursts of up to twice the limit can therefore pass
/// around a window boundary.
///
/// The limiter holds no mutable state. Any number of instances, in any
/// number of processes, may share a resource as long as they share a store.
pub struct FixedWindow<S: WindowStore> {
    key: CounterKey,
    limits: LimitConfig,
    store: Arc<S>,
}

impl<S: WindowStore> FixedWindow<S> {
    /// Create a limiter for `resource` under the default key prefix.
    pub fn new(resource: &str, limits: LimitConfig, store: Arc<S>) -> Self {
        Self::with_key(CounterKey::new(resource), limits, store)
    }

    /// Create a limiter for `resource` under a custom key prefix.
    pub fn with_prefix(prefix: &str, resource: &str, limits: LimitConfig, store: Arc<S>) -> Self {
        Self::with_key(CounterKey::with_prefix(prefix, resource), limits, store)
    }

    /// Create a limiter for an explicit counter key.
    pub fn with_key(key: CounterKey, limits: LimitConfig, store: Arc<S>) -> Self {
        Self { key, limits, store }
    }

    /// The counter key this limiter operates on.
    pub fn key(&self) -> &CounterKey {
        &self.key
    }

    /// The limit configuration.
    pub fn limits(&self) -> &LimitConfig {
        &self.limits
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Report the current state of the window without changing it.
    ///
    /// The result is advisory: other callers may change the window the
    /// moment this returns.
    pub async fn info(&self) -> Result<RateLimitInfo> {
        let limit = self.limits.limit();
        let snapshot = self.store.read(&self.key).await?;

        let info = match snapshot.ttl {
            None => RateLimitInfo::empty(limit),
            Some(ttl) => {
                let status = if snapshot.count >= limit {
                    Status::Throttled
                } else {
                    Status::Success
                };
                RateLimitInfo::from_outcome(limit, status, snapshot.count, Some(ttl))
            }
        };

        trace!(
            key = %self.key,
            remaining = info.remaining,
            reset_after = ?info.reset_after,
            "Window info"
        );
        Ok(info)
    }

    /// Add `count` units to the window if there is room for all of them.
    ///
    /// Returns the new window state on success. Fails with
    /// [`WindowError::Limited`] when the window is full or too short on room,
    /// in which case nothing was counted.
    pub async fn increment(&self, count: u64) -> Result<RateLimitInfo> {
        if count == 0 || count > MAX_UNITS {
            return Err(WindowError::InvalidCount(count));
        }

        trace!(key = %self.key, count = count, "Incrementing window");

        let outcome = self
            .store
            .increment_if_capacity(&self.key, &self.limits, count)
            .await?;
        let info = RateLimitInfo::from_outcome(
            self.limits.limit(),
            outcome.status,
            outcome.count,
            outcome.ttl,
        );

        let reason = match outcome.status {
            Status::Success => return Ok(info),
            Status::Throttled => LimitReason::WindowFull,
            Status::Failure => LimitReason::InsufficientCapacity,
        };

        debug!(
            key = %self.key,
            count = count,
            remaining = info.remaining,
            retry_after = ?info.retry_after,
            reason = ?reason,
            "Window limit reached"
        );
        Err(LimitedError::new(reason, info).into())
    }

    /// Add a single unit to the window.
    pub async fn increment_one(&self) -> Result<RateLimitInfo> {
        self.increment(1).await
    }

    /// Close the window immediately, restoring the full limit.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear(&self.key).await
    }
}

impl<S: WindowStore> Clone for FixedWindow<S> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            limits: self.limits,
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: WindowStore> std::fmt::Debug for FixedWindow<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindow")
            .field("key", &self.key)
            .field("limits", &self.limits)
            .field("store", &self.store.store_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::MemoryStore;
    use std::time::Duration;

    fn create_limiter(limit: u64, millis: u64) -> FixedWindow<MemoryStore> {
        let limits = LimitConfig::new(limit, Duration::from_millis(millis)).unwrap();
        FixedWindow::new("foo", limits, Arc::new(MemoryStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_info_on_untouched_window() {
        let limiter = create_limiter(12, 2000);
        let info = limiter.info().await.unwrap();

        assert_eq!(info, RateLimitInfo::empty(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_one() {
        let limiter = create_limiter(12, 2000);
        let info = limiter.increment_one().await.unwrap();

        assert_eq!(info.remaining, 11);
        assert_eq!(info.reset_after, Some(Duration::from_secs(2)));
        assert!(info.retry_after.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_several() {
        let limiter = create_limiter(12, 2000);
        let info = limiter.increment(5).await.unwrap();

        assert_eq!(info.remaining, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_count_rejected_without_store_call() {
        let limiter = create_limiter(12, 2000);

        let err = limiter.increment(0).await.unwrap_err();
        assert!(matches!(err, WindowError::InvalidCount(0)));
        assert_eq!(limiter.store().counter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_count_rejected_without_store_call() {
        let limiter = create_limiter(12, 2000);

        let err = limiter.increment(MAX_UNITS + 1).await.unwrap_err();
        assert!(matches!(err, WindowError::InvalidCount(_)));
        assert_eq!(limiter.store().counter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_window_reports_retry_after() {
        let limiter = create_limiter(3, 2000);
        for _ in 0..3 {
            limiter.increment_one().await.unwrap();
        }

        let info = limiter.info().await.unwrap();
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_after, Some(Duration::from_secs(2)));
        assert_eq!(info.retry_after, info.reset_after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_error() {
        let limiter = create_limiter(3, 2000);
        limiter.increment(3).await.unwrap();

        let err = limiter.increment_one().await.unwrap_err();
        let limited = match err {
            WindowError::Limited(limited) => limited,
            other => panic!("expected a limiting decision, got {:?}", other),
        };
        assert_eq!(limited.reason, LimitReason::WindowFull);
        assert_eq!(limited.info.remaining, 0);
        assert_eq!(limited.info.retry_after, Some(Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_capacity_error() {
        let limiter = create_limiter(12, 2000);
        limiter.increment(6).await.unwrap();

        let err = limiter.increment(7).await.unwrap_err();
        let limited = match err {
            WindowError::Limited(limited) => limited,
            other => panic!("expected a limiting decision, got {:?}", other),
        };
        assert_eq!(limited.reason, LimitReason::InsufficientCapacity);
        assert_eq!(limited.info.remaining, 6);
        assert_eq!(limited.info.retry_after, limited.info.reset_after);

        assert_eq!(limiter.info().await.unwrap().remaining, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_limit() {
        let limiter = create_limiter(2, 2000);
        limiter.increment(2).await.unwrap();

        limiter.reset().await.unwrap();

        assert_eq!(limiter.info().await.unwrap(), RateLimitInfo::empty(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires_as_a_whole() {
        let limiter = create_limiter(4, 250);
        limiter.increment(4).await.unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(limiter.info().await.unwrap().remaining, 0);

        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(limiter.info().await.unwrap(), RateLimitInfo::empty(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_resources_have_separate_windows() {
        let store = Arc::new(MemoryStore::new());
        let limits = LimitConfig::new(2, Duration::from_secs(1)).unwrap();
        let a = FixedWindow::new("a", limits, store.clone());
        let b = FixedWindow::new("b", limits, store.clone());

        a.increment(2).await.unwrap();

        assert_eq!(b.increment_one().await.unwrap().remaining, 1);
        assert_eq!(store.counter_count(), 2);
    }
}
