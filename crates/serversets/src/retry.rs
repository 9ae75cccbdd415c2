//! Refresh retry policy: exponential back-off with randomized jitter.

use std::time::Duration;

use rand::Rng;
use ss_domain::RetryConfig;

/// Fraction of the nominal delay added or removed at random.
const JITTER: f64 = 0.25;

/// Controls how a watch re-attempts a refresh that failed on a transient
/// coordination error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Nominal delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the nominal delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Consecutive failures before giving up.  `0` means unlimited.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(c: &RetryConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(c.initial_delay_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
            backoff_factor: c.backoff_factor,
            max_attempts: c.max_attempts,
        }
    }
}

impl RetryPolicy {
    /// Nominal (unjittered) delay for `attempt`, 0-indexed, capped at
    /// `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Delay to sleep before retry `attempt`: the nominal delay scaled by a
    /// fresh random factor in `[0.75, 1.25)`, drawn per call so watches hit
    /// by the same outage spread out.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        if base == 0.0 {
            return Duration::ZERO;
        }
        let factor = rand::rng().random_range((1.0 - JITTER)..(1.0 + JITTER));
        Duration::from_secs_f64(base * factor)
    }

    /// Whether `attempt` failures exhaust the policy.
    pub fn should_give_up(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_factor: 2.0,
            max_attempts: 0,
        }
    }

    #[test]
    fn config_defaults_carry_over() {
        let p = RetryPolicy::default();
        assert_eq!(p.initial_delay, Duration::from_millis(100));
        assert_eq!(p.max_delay, Duration::from_secs(10));
        assert_eq!(p.max_attempts, 10);
    }

    #[test]
    fn base_delay_doubles_then_caps() {
        let p = policy(100, 1_000);
        assert_eq!(p.base_delay(0), Duration::from_millis(100));
        assert_eq!(p.base_delay(1), Duration::from_millis(200));
        assert_eq!(p.base_delay(3), Duration::from_millis(800));
        assert_eq!(p.base_delay(4), Duration::from_millis(1_000));
        assert_eq!(p.base_delay(30), Duration::from_millis(1_000));
    }

    #[test]
    fn jittered_delay_stays_within_bounds() {
        let p = policy(100, 1_000);
        for attempt in [0, 2, 10] {
            let base = p.base_delay(attempt).as_secs_f64();
            for _ in 0..200 {
                let d = p.delay_for_attempt(attempt).as_secs_f64();
                assert!(d >= base * 0.75 - 1e-9, "attempt {attempt}: {d} below range");
                assert!(d < base * 1.25 + 1e-9, "attempt {attempt}: {d} above range");
            }
        }
    }

    #[test]
    fn independent_policies_do_not_retry_in_lockstep() {
        let a = RetryPolicy::default();
        let b = RetryPolicy::default();
        let first: Vec<Duration> = (0..8).map(|n| a.delay_for_attempt(n)).collect();
        let second: Vec<Duration> = (0..8).map(|n| b.delay_for_attempt(n)).collect();
        assert_ne!(first, second);
    }

    #[test]
    fn repeated_calls_vary() {
        let p = RetryPolicy::default();
        let samples: std::collections::BTreeSet<Duration> =
            (0..32).map(|_| p.delay_for_attempt(3)).collect();
        assert!(samples.len() > 1);
    }

    #[test]
    fn zero_delay_stays_zero() {
        assert_eq!(policy(0, 0).delay_for_attempt(5), Duration::ZERO);
    }

    #[test]
    fn gives_up_only_when_limited() {
        let limited = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(!limited.should_give_up(2));
        assert!(limited.should_give_up(3));

        let unlimited = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!unlimited.should_give_up(1_000_000));
    }
}
