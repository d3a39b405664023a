//! Error types for Windowgate.

use std::time::Duration;

use thiserror::Error;

use crate::window::RateLimitInfo;

/// Why an increment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitReason {
    /// The window has already been filled up to its limit.
    WindowFull,
    /// The window still has room, but not enough for the requested units.
    InsufficientCapacity,
}

impl std::fmt::Display for LimitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            LimitReason::WindowFull => "no more units allowed in the window",
            LimitReason::InsufficientCapacity => {
                "not enough room in the window for the requested units"
            }
        };
        f.write_str(message)
    }
}

/// A limiting decision: the request was not admitted and nothing was counted.
///
/// Carries the same [`RateLimitInfo`] a successful increment returns, so the
/// caller can surface `retry_after` without another round trip.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct LimitedError {
    /// Which limiting branch was taken
    pub reason: LimitReason,
    /// State of the window at the time of the decision
    pub info: RateLimitInfo,
}

impl LimitedError {
    /// Create a new limited error.
    pub fn new(reason: LimitReason, info: RateLimitInfo) -> Self {
        Self { reason, info }
    }
}

/// Main error type for Windowgate operations.
#[derive(Error, Debug)]
pub enum WindowError {
    /// The request was refused by the limiter
    #[error(transparent)]
    Limited(#[from] LimitedError),

    /// Increments must add at least one unit and at most `MAX_UNITS`
    #[error("Invalid count: {0} (must be between 1 and 2^53)")]
    InvalidCount(u64),

    /// Limit configuration rejected
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    /// The backing store failed to evaluate the request
    #[error("Store error: {0}")]
    Store(String),

    /// The backing store answered with something we cannot interpret
    #[error("Store protocol error: {0}")]
    Protocol(String),

    /// The store does not know the routine identified by this hash
    #[error("Script not loaded: {0}")]
    ScriptNotLoaded(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying Redis errors
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl WindowError {
    /// Create a new store error.
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new protocol error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Check if this error is a limiting decision rather than a failure.
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited(_))
    }

    /// The window state attached to a limiting decision.
    pub fn limited_info(&self) -> Option<&RateLimitInfo> {
        match self {
            Self::Limited(limited) => Some(&limited.info),
            _ => None,
        }
    }

    /// Time to wait before retrying, if this is a limiting decision.
    pub fn retry_after(&self) -> Option<Duration> {
        self.limited_info().and_then(|info| info.retry_after)
    }
}

impl From<config::ConfigError> for WindowError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for Windowgate operations.
pub type Result<T> = std::result::Result<T, WindowError>;
