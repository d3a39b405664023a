//! Fixed window rate limiting over an atomic key-value store.

mod info;
mod key;
mod limiter;
mod memory;
mod store;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
mod script;

pub use info::{RateLimitInfo, Status};
pub use key::{CounterKey, DEFAULT_PREFIX};
pub use limiter::FixedWindow;
pub use memory::MemoryStore;
pub use store::{IncrementOutcome, WindowSnapshot, WindowStore};

#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
#[cfg(feature = "redis")]
pub use script::{AtomicRoutine, RoutineState, ScriptHost};
