//! Retry Scheduler (SPEC_FULL §4.F). Unlike the exponential-backoff-with-
//! jitter policy this codebase normally uses for delivery retries
//! (`empath-delivery/src/policy/retry.rs`), the spec's formula is linear
//! and is followed literally rather than generalised: `fail_count *
//! base_interval_minutes`. See DESIGN.md.

use std::time::Duration;

/// Retry policy: a base interval and a cap on `fail_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_interval_minutes: u32,
    pub max_retries: u32,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(base_interval_minutes: u32, max_retries: u32) -> Self {
        Self {
            base_interval_minutes,
            max_retries,
        }
    }

    /// The wall-clock delay to wait before invoking the executor for an
    /// entry with this `fail_count`. Zero in primary mode: callers pass
    /// `fail_count = 0` there.
    #[must_use]
    pub const fn delay_for(&self, fail_count: u32) -> Duration {
        Duration::from_secs(fail_count as u64 * self.base_interval_minutes as u64 * 60)
    }

    /// Whether `fail_count + 1` would exceed `max_retries`, i.e. whether
    /// the next retry enqueue should instead dead-letter the message.
    #[must_use]
    pub const fn exhausted(&self, fail_count: u32) -> bool {
        fail_count + 1 > self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(15, 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_spec_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_interval_minutes, 15);
        assert_eq!(policy.max_retries, 5);
    }

    #[test]
    fn delay_is_linear_in_fail_count() {
        let policy = RetryPolicy::new(15, 5);
        assert_eq!(policy.delay_for(0), Duration::from_secs(0));
        assert_eq!(policy.delay_for(1), Duration::from_secs(15 * 60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(30 * 60));
        assert_eq!(policy.delay_for(5), Duration::from_secs(75 * 60));
    }

    #[test]
    fn exhausted_at_cap() {
        let policy = RetryPolicy::new(15, 5);
        assert!(!policy.exhausted(4));
        assert!(policy.exhausted(5));
        assert!(policy.exhausted(6));
    }
}
