//! Redis window store.
//!
//! Counters live in Redis and are shared by every process pointing at the
//! same server. Both operations run as Lua routines, so each one is atomic
//! with respect to all other clients.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, trace};

use crate::config::LimitConfig;
use crate::error::{Result, WindowError};

use super::info::Status;
use super::key::CounterKey;
use super::script::{AtomicRoutine, ScriptHost};
use super::store::{IncrementOutcome, WindowSnapshot, WindowStore};

const INFO_SOURCE: &str = include_str!("scripts/info.lua");
const INCREMENT_SOURCE: &str = include_str!("scripts/increment.lua");

#[async_trait]
impl ScriptHost for ConnectionManager {
    async fn eval_hash(&mut self, hash: &str, keys: &[String], args: &[String]) -> Result<Vec<i64>> {
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(hash).arg(keys.len());
        for key in keys {
            cmd.arg(key);
        }
        for arg in args {
            cmd.arg(arg);
        }

        cmd.query_async(self).await.map_err(|e| {
            if e.code() == Some("NOSCRIPT") {
                WindowError::ScriptNotLoaded(hash.to_string())
            } else {
                WindowError::Redis(e)
            }
        })
    }

    async fn load(&mut self, source: &str) -> Result<String> {
        let hash: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(source)
            .query_async(self)
            .await?;
        Ok(hash)
    }
}

/// Redis-backed window store.
pub struct RedisStore {
    /// Redis connection manager
    conn: ConnectionManager,
    info_routine: AtomicRoutine,
    increment_routine: AtomicRoutine,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        debug!(url = %url, "Connecting to Redis window store");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self::from_manager(conn))
    }

    /// Build a store over an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self {
            conn,
            info_routine: AtomicRoutine::new("info", INFO_SOURCE),
            increment_routine: AtomicRoutine::new("increment", INCREMENT_SOURCE),
        }
    }
}

#[async_trait]
impl WindowStore for RedisStore {
    async fn read(&self, key: &CounterKey) -> Result<WindowSnapshot> {
        let mut conn = self.conn.clone();
        let reply = self
            .info_routine
            .invoke(&mut conn, &[key.to_store_key()], &[])
            .await?;

        let snapshot = parse_snapshot(&reply)?;
        trace!(key = %key, count = snapshot.count, ttl = ?snapshot.ttl, "Redis read");
        Ok(snapshot)
    }

    async fn increment_if_capacity(
        &self,
        key: &CounterKey,
        limits: &LimitConfig,
        count: u64,
    ) -> Result<IncrementOutcome> {
        let mut conn = self.conn.clone();
        let args = [
            limits.limit().to_string(),
            limits.duration_ms().to_string(),
            count.to_string(),
        ];
        let reply = self
            .increment_routine
            .invoke(&mut conn, &[key.to_store_key()], &args)
            .await?;

        let outcome = parse_outcome(&reply)?;
        trace!(
            key = %key,
            status = ?outcome.status,
            count = outcome.count,
            "Redis increment"
        );
        Ok(outcome)
    }

    async fn clear(&self, key: &CounterKey) -> Result<()> {
        debug!(key = %key, "Clearing window counter in Redis");

        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(key.to_store_key())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("info_routine", &self.info_routine)
            .field("increment_routine", &self.increment_routine)
            .finish()
    }
}

/// Map a `PTTL` reply to a remaining lifetime.
///
/// `-2` means no key and `-1` a key without expiry; neither is a live window.
fn ttl_from_millis(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

fn count_from(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| WindowError::protocol(format!("negative counter {}", value)))
}

/// Parse the `{count, pttl}` reply of the info routine.
fn parse_snapshot(reply: &[i64]) -> Result<WindowSnapshot> {
    match *reply {
        [count, pttl] => match ttl_from_millis(pttl) {
            Some(ttl) => Ok(WindowSnapshot {
                count: count_from(count)?,
                ttl: Some(ttl),
            }),
            None => Ok(WindowSnapshot::absent()),
        },
        _ => Err(WindowError::protocol(format!(
            "info routine returned {} values, expected 2",
            reply.len()
        ))),
    }
}

/// Parse the `{status, count, pttl}` reply of the increment routine.
fn parse_outcome(reply: &[i64]) -> Result<IncrementOutcome> {
    match *reply {
        [status, count, pttl] => Ok(IncrementOutcome {
            status: Status::try_from(status)?,
            count: count_from(count)?,
            ttl: ttl_from_millis(pttl),
        }),
        _ => Err(WindowError::protocol(format!(
            "increment routine returned {} values, expected 3",
            reply.len()
        ))),
    }
}
