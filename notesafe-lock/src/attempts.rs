//! Consecutive wrong-PIN tracking with exponential lockout.

use chrono::{DateTime, Duration, Utc};

use crate::config::LockConfig;
use crate::error::{LockError, LockResult};

#[derive(Debug)]
pub(crate) struct PinAttemptLimiter {
    max_attempts: u32,
    base_secs: u64,
    max_secs: u64,
    failures: u32,
    locked_until: Option<DateTime<Utc>>,
}

impl PinAttemptLimiter {
    pub(crate) fn new(config: &LockConfig) -> Self {
        Self {
            max_attempts: config.max_pin_attempts.max(1),
            base_secs: config.lockout_base_secs,
            max_secs: config.lockout_max_secs.max(config.lockout_base_secs),
            failures: 0,
            locked_until: None,
        }
    }

    /// Refuses while a lockout is running.
    pub(crate) fn check(&self, now: DateTime<Utc>) -> LockResult<()> {
        match self.locked_until {
            Some(until) if now < until => {
                let remaining = (until - now).num_milliseconds();
                let retry_after_secs = u64::try_from((remaining + 999) / 1000).unwrap_or(1);
                Err(LockError::TooManyAttempts { retry_after_secs })
            }
            _ => Ok(()),
        }
    }

    /// Counts a wrong PIN. Returns the lockout it started, if any.
    pub(crate) fn record_failure(&mut self, now: DateTime<Utc>) -> Option<u64> {
        self.failures = self.failures.saturating_add(1);
        if self.failures < self.max_attempts {
            return None;
        }

        let doublings = self.failures - self.max_attempts;
        let factor = 1u64.checked_shl(doublings).unwrap_or(u64::MAX);
        let secs = self.base_secs.saturating_mul(factor).min(self.max_secs);
        let until = i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lockout| now.checked_add_signed(lockout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.locked_until = Some(until);
        Some(secs)
    }

    pub(crate) fn reset(&mut self) {
        self.failures = 0;
        self.locked_until = None;
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}
