//! Crash-restart policy.
//!
//! A pure decision function: given when an instance crashed and how many
//! times it has crashed, decide whether it may restart now. The first few
//! crashes restart immediately; after that the wait doubles from 30 s up
//! to a cap, and after the attempt budget is spent the instance stays down.

use std::time::Duration;

use crate::validator::{Validate, ValidationError};

/// Crashes that restart with no backoff.
pub const DEFAULT_IMMEDIATE_RESTARTS: i32 = 3;
/// Default ceiling on the doubling backoff.
pub const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(16 * 60);
/// Default total restart budget.
pub const DEFAULT_MAX_RESTARTS: i32 = 200;
/// The smallest (and initial) backoff.
pub const CRASH_BACKOFF_MIN_DURATION: Duration = Duration::from_secs(30);

/// Decides whether a crashed instance may restart at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartCalculator {
    /// Crashes that restart with no backoff.
    pub immediate_restarts: i32,
    /// Ceiling on the doubling backoff.
    pub max_backoff_duration: Duration,
    /// Number of doublings before the backoff reaches its ceiling.
    pub max_backoff_count: i32,
    /// Total restart budget; beyond it the instance never restarts.
    pub max_restart_attempts: i32,
}

impl Default for RestartCalculator {
    fn default() -> Self {
        Self::new(
            DEFAULT_IMMEDIATE_RESTARTS,
            DEFAULT_MAX_BACKOFF_DURATION,
            DEFAULT_MAX_RESTARTS,
        )
    }
}

impl RestartCalculator {
    /// Creates a calculator, deriving the doubling count from the cap.
    #[must_use]
    pub fn new(
        immediate_restarts: i32,
        max_backoff_duration: Duration,
        max_restart_attempts: i32,
    ) -> Self {
        let min_secs = CRASH_BACKOFF_MIN_DURATION.as_secs();
        let ratio = max_backoff_duration.as_secs().div_ceil(min_secs).max(1);
        #[allow(clippy::cast_possible_wrap)]
        let max_backoff_count = ratio.ilog2() as i32;
        Self {
            immediate_restarts,
            max_backoff_duration,
            max_backoff_count,
            max_restart_attempts,
        }
    }

    /// Whether an instance that crashed at `crashed_at` (nanoseconds) for
    /// the `crash_count`-th time may restart at `now` (nanoseconds).
    #[must_use]
    pub fn should_restart(&self, now: i64, crashed_at: i64, crash_count: i32) -> bool {
        if crash_count < self.immediate_restarts {
            return true;
        }
        if crash_count < self.max_restart_attempts {
            let backoff = self.backoff_duration(crash_count);
            #[allow(clippy::cast_possible_wrap)]
            let next_restart = crashed_at.saturating_add(backoff.as_nanos() as i64);
            return next_restart <= now;
        }
        false
    }

    fn backoff_duration(&self, crash_count: i32) -> Duration {
        let power = (crash_count - self.immediate_restarts).clamp(0, self.max_backoff_count);
        let backoff = CRASH_BACKOFF_MIN_DURATION.saturating_mul(1u32 << power.min(31));
        backoff.min(self.max_backoff_duration)
    }
}

impl Validate for RestartCalculator {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.immediate_restarts < 0 {
            err.invalid_field("immediate_restarts");
        }
        if self.max_backoff_duration < CRASH_BACKOFF_MIN_DURATION {
            err.invalid_field("max_backoff_duration");
        }
        if self.max_restart_attempts < 0 {
            err.invalid_field("max_restart_attempts");
        }
        err.into_result()
    }
}
