//! Window state as reported to callers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WindowError};

/// Outcome code returned by the atomic increment routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The units were added to the window
    Success,
    /// The window is already full
    Throttled,
    /// The window has room, but not enough for the requested units
    Failure,
}

impl Status {
    /// Convert to the wire code used by the store routines.
    pub fn code(&self) -> i64 {
        match self {
            Status::Success => 0,
            Status::Throttled => 1,
            Status::Failure => 2,
        }
    }
}

impl TryFrom<i64> for Status {
    type Error = WindowError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Status::Success),
            1 => Ok(Status::Throttled),
            2 => Ok(Status::Failure),
            other => Err(WindowError::protocol(format!(
                "unknown status code {}",
                other
            ))),
        }
    }
}

/// State of a fixed window at a point in time.
///
/// `reset_after` is present only while the window is open. `retry_after` is
/// present only when the operation that produced this value was refused (or,
/// for `info`, when the window is full). Both are equal whenever both are
/// present, since the whole window resets at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Maximum units per window
    pub limit: u64,
    /// Units still available in the current window
    pub remaining: u64,
    /// Time until the window expires
    #[serde(with = "opt_secs")]
    pub reset_after: Option<Duration>,
    /// Time until a refused request may be retried
    #[serde(with = "opt_secs")]
    pub retry_after: Option<Duration>,
}

impl RateLimitInfo {
    /// State of a window with no live counter.
    pub fn empty(limit: u64) -> Self {
        Self {
            limit,
            remaining: limit,
            reset_after: None,
            retry_after: None,
        }
    }

    /// Build the info for a store outcome.
    ///
    /// `count` is the counter value after the operation; it is unchanged for
    /// refused outcomes.
    pub fn from_outcome(limit: u64, status: Status, count: u64, ttl: Option<Duration>) -> Self {
        let retry_after = match status {
            Status::Success => None,
            Status::Throttled | Status::Failure => ttl,
        };

        Self {
            limit,
            remaining: limit.saturating_sub(count),
            reset_after: ttl,
            retry_after,
        }
    }

    /// Whether the window has no units left.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Optional durations as fractional seconds, `null` when absent.
mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        match secs {
            Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) => Err(serde::de::Error::custom(format!(
                "invalid duration: {}",
                s
            ))),
            None => Ok(None),
        }
    }
}
