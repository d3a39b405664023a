//! In-memory window store.
//!
//! Uses DashMap so that each operation holds the shard lock for its key,
//! which makes it atomic with respect to other tasks in the same process.
//! Suitable for single-instance deployments and tests; counters are not
//! shared across processes.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::LimitConfig;
use crate::error::{Result, WindowError};

use super::info::Status;
use super::key::CounterKey;
use super::store::{IncrementOutcome, WindowSnapshot, WindowStore};

/// A window counter and the instant it expires.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    expires_at: Instant,
}

impl WindowCounter {
    /// Remaining lifetime, `None` once expired.
    fn ttl(&self, now: Instant) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }
}

/// In-memory window store.
pub struct MemoryStore {
    counters: DashMap<String, WindowCounter>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        debug!("Creating new in-memory window store");
        Self {
            counters: DashMap::new(),
        }
    }

    /// Get the number of tracked counters, expired ones included.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Drop counters whose window has elapsed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.counters.retain(|_, counter| counter.ttl(now).is_some());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn read(&self, key: &CounterKey) -> Result<WindowSnapshot> {
        let now = Instant::now();

        let snapshot = self
            .counters
            .get(&key.to_store_key())
            .and_then(|counter| {
                counter.ttl(now).map(|ttl| WindowSnapshot {
                    count: counter.count,
                    ttl: Some(ttl),
                })
            })
            .unwrap_or_else(WindowSnapshot::absent);

        trace!(key = %key, count = snapshot.count, ttl = ?snapshot.ttl, "Memory read");
        Ok(snapshot)
    }

    async fn increment_if_capacity(
        &self,
        key: &CounterKey,
        limits: &LimitConfig,
        count: u64,
    ) -> Result<IncrementOutcome> {
        let now = Instant::now();
        let expires_at = now.checked_add(limits.duration()).ok_or_else(|| {
            WindowError::InvalidLimit(format!(
                "window of {:?} cannot be represented by this clock",
                limits.duration()
            ))
        })?;
        let fresh = WindowCounter {
            count: 0,
            expires_at,
        };

        // The entry guard holds the shard lock until the end of this block
        let outcome = match self.counters.entry(key.to_store_key()) {
            Entry::Vacant(vacant) => {
                let mut counter = vacant.insert(fresh);
                apply(&mut counter, limits.limit(), count, now)
            }
            Entry::Occupied(mut occupied) => {
                let counter = occupied.get_mut();
                if counter.ttl(now).is_none() {
                    *counter = fresh;
                }
                apply(counter, limits.limit(), count, now)
            }
        };

        trace!(
            key = %key,
            status = ?outcome.status,
            count = outcome.count,
            "Memory increment"
        );
        Ok(outcome)
    }

    async fn clear(&self, key: &CounterKey) -> Result<()> {
        debug!(key = %key, "Clearing window counter");
        self.counters.remove(&key.to_store_key());
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

/// Evaluate the three increment branches against a live counter.
fn apply(counter: &mut WindowCounter, limit: u64, requested: u64, now: Instant) -> IncrementOutcome {
    let status = if counter.count >= limit {
        Status::Throttled
    } else if counter.count.saturating_add(requested) > limit {
        Status::Failure
    } else {
        counter.count += requested;
        Status::Success
    };

    IncrementOutcome {
        status,
        count: counter.count,
        ttl: counter.ttl(now),
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("counters", &self.counters.len())
            .finish()
    }
}
