//! Windowgate - Distributed Fixed Window Rate Limiting
//!
//! This crate limits how many units of usage a resource may consume per fixed
//! window of time. Window counters live in a shared store that evaluates every
//! check-and-increment atomically, so any number of processes can enforce one
//! limit together without locks of their own.

pub mod config;
pub mod error;
pub mod window;

pub use config::LimitConfig;
pub use error::{LimitReason, LimitedError, Result, WindowError};
pub use window::{FixedWindow, MemoryStore, RateLimitInfo, Status, WindowStore};

#[cfg(feature = "redis")]
pub use window::RedisStore;
