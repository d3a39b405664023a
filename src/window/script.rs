//! Server-side atomic routines, executed by hash and registered on demand.
//!
//! A routine that has not been registered by this process is loaded before
//! its first call. Afterwards it is invoked by its SHA1 hash only. If the
//! store reports that it no longer knows the hash (for example after a
//! restart or `SCRIPT FLUSH`), the source is registered again and the call
//! is retried exactly once. A second miss, or a failed registration, is
//! returned to the caller.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Result, WindowError};

/// A store able to run routines by hash and register routine sources.
#[async_trait]
pub trait ScriptHost: Send {
    /// Run the routine with the given hash.
    ///
    /// Must fail with [`WindowError::ScriptNotLoaded`] when the store does
    /// not know the hash.
    async fn eval_hash(&mut self, hash: &str, keys: &[String], args: &[String]) -> Result<Vec<i64>>;

    /// Register a routine source, returning the hash the store assigned.
    async fn load(&mut self, source: &str) -> Result<String>;
}

/// Whether the routine is known to be registered on the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineState {
    /// Not loaded by this process yet, or the store reported it missing
    Unregistered,
    /// Loaded by this process and not reported missing since
    Registered,
}

/// A routine source with its cached identity.
pub struct AtomicRoutine {
    name: &'static str,
    source: &'static str,
    hash: String,
    state: Mutex<RoutineState>,
}

impl AtomicRoutine {
    /// Create a routine from its source.
    pub fn new(name: &'static str, source: &'static str) -> Self {
        let hash = redis::Script::new(source).get_hash().to_string();
        Self {
            name,
            source,
            hash,
            state: Mutex::new(RoutineState::Unregistered),
        }
    }

    /// SHA1 hash identifying the routine on the store.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Last known registration state.
    pub fn state(&self) -> RoutineState {
        *self.state.lock()
    }

    fn set_state(&self, state: RoutineState) {
        *self.state.lock() = state;
    }

    /// Register the source and record the routine as known to the store.
    async fn register<H>(&self, host: &mut H) -> Result<()>
    where
        H: ScriptHost + ?Sized,
    {
        let assigned = host.load(self.source).await?;
        if !assigned.eq_ignore_ascii_case(&self.hash) {
            warn!(
                routine = self.name,
                expected = %self.hash,
                assigned = %assigned,
                "Store assigned an unexpected routine hash"
            );
            return Err(WindowError::protocol(format!(
                "routine {} registered as {}, expected {}",
                self.name, assigned, self.hash
            )));
        }
        self.set_state(RoutineState::Registered);
        Ok(())
    }

    /// Run the routine.
    ///
    /// An unregistered routine is loaded first. A registered one runs by
    /// hash, and is registered again and retried once if the store has
    /// lost it.
    pub async fn invoke<H>(&self, host: &mut H, keys: &[String], args: &[String]) -> Result<Vec<i64>>
    where
        H: ScriptHost + ?Sized,
    {
        if self.state() == RoutineState::Unregistered {
            debug!(routine = self.name, hash = %self.hash, "Registering routine");
            self.register(host).await?;
            return host.eval_hash(&self.hash, keys, args).await;
        }

        match host.eval_hash(&self.hash, keys, args).await {
            Err(WindowError::ScriptNotLoaded(_)) => {
                self.set_state(RoutineState::Unregistered);
                debug!(routine = self.name, hash = %self.hash, "Routine not loaded, registering");

                self.register(host).await?;
                host.eval_hash(&self.hash, keys, args).await
            }
            result => result,
        }
    }
}

impl std::fmt::Debug for AtomicRoutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicRoutine")
            .field("name", &self.name)
            .field("hash", &self.hash)
            .field("state", &self.state())
            .finish()
    }
}
