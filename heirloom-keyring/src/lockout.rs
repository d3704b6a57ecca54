//! Brute-force lockout policy.
//!
//! Pure mapping from a consecutive-failure count to a lock expiry.
//! Durations grow exponentially past the threshold and are capped, so
//! sustained guessing gets slower and slower without a transient typo
//! streak locking a legitimate user out forever.

use chrono::{DateTime, Duration, Utc};

/// Maps consecutive unlock failures to a lock expiry.
#[derive(Clone, Debug)]
pub struct LockoutPolicy {
    /// Failure count at/above which a lock is applied.
    pub threshold: u32,
    /// Lock duration at exactly `threshold` failures.
    pub base: Duration,
    /// Upper bound on any lock duration.
    pub max: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            base: Duration::minutes(15),
            max: Duration::hours(24),
        }
    }
}

impl LockoutPolicy {
    /// Returns the lock expiry after `failed_attempts` consecutive
    /// failures, or `None` below the threshold.
    ///
    /// The duration doubles for each failure past the threshold, capped
    /// at `max`.
    pub fn next_lock_expiry(
        &self,
        failed_attempts: u32,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if failed_attempts < self.threshold {
            return None;
        }

        let exponent = failed_attempts - self.threshold;
        let factor = 1i32.checked_shl(exponent.min(30)).unwrap_or(i32::MAX);
        let duration = self
            .base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max));

        Some(now + duration)
    }
}
