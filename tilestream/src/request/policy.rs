//! Retry and scheduling policy for tile requests.
//!
//! - [`RetryPolicy`]: how a request reacts to a timed-out fetch
//! - [`Priority`]: dispatch order (higher first, FIFO within a level)

use std::time::Duration;

/// Default initial delay for exponential backoff (100ms).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;

/// Default maximum delay for exponential backoff (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// How a tile request handles timed-out fetches.
///
/// Only timeouts are retried; every other failure is final. `max_attempts`
/// counts the initial attempt, so `Fixed { max_attempts: 3, .. }` dispatches a
/// request at most three times.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum RetryPolicy {
    /// Fail on the first timeout.
    #[default]
    None,

    /// Constant delay between attempts.
    Fixed { max_attempts: u32, delay: Duration },

    /// Delay grows by `multiplier` after each failed attempt, capped at
    /// `max_delay`.
    ExponentialBackoff {
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Exponential backoff with the default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based), or `None` once the retry ceiling is reached.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = (initial_delay.as_millis() as f64 * factor)
                    .min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(delay_ms as u64).min(*max_delay))
            }
        }
    }

    /// The retry ceiling: total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => *max_attempts,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}

/// Request dispatch priority. Higher values are dispatched first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    pub const NORMAL: Priority = Priority(0);

    /// Shallower tiles first: the root outranks its descendants.
    pub fn from_depth(depth: u32) -> Self {
        Self(-(depth.min(i32::MAX as u32) as i32))
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}
