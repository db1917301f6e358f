//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{duration_ms, BrighterError};

/// Retries transient failures.
///
/// Only errors whose kind is `Transient` are retried. Deferral, configuration
/// and permanent errors are returned on the first occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,

    /// Delay after the first failure.
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,

    pub multiplier: f64,

    /// Upper bound for a single delay.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,

    /// Scale each delay by a random factor in [0.5, 1.0].
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Rejects settings that cannot produce a usable backoff.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry max_attempts must be at least 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "retry multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            ));
        }
        Ok(())
    }

    /// Delay before the next attempt, given how many attempts have failed (1-indexed).
    ///
    /// `base_delay * multiplier^(attempts - 1)`, kept within `[0, max_delay]`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let max_secs = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        let delay_secs = if delay_secs.is_nan() {
            0.0
        } else {
            delay_secs.clamp(0.0, max_secs)
        };
        let delay = Duration::from_secs_f64(delay_secs);
        if self.jitter {
            delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
        } else {
            delay
        }
    }

    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, BrighterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrighterError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempts < self.max_attempts => {
                    let delay = self.next_delay(attempts);
                    warn!(
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn exponential_backoff_increases_up_to_the_cap() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(10));

        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
        assert_eq!(policy.next_delay(4), Duration::from_secs(10));
    }

    #[test]
    fn jitter_never_exceeds_the_plain_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100)).with_jitter(true);
        for attempt in 1..=3 {
            let d = policy.next_delay(attempt);
            assert!(d <= Duration::from_millis(100 * 2u64.pow(attempt - 1)));
        }
    }

    #[test]
    fn odd_multipliers_stay_within_bounds() {
        let cap = Duration::from_millis(500);
        for multiplier in [-2.0, 0.0, f64::NAN, f64::INFINITY, 1e300] {
            let policy = RetryPolicy::new(10, Duration::from_millis(100))
                .with_multiplier(multiplier)
                .with_max_delay(cap);
            for attempt in 1..=10 {
                assert!(policy.next_delay(attempt) <= cap, "multiplier {multiplier}");
            }
        }
    }

    #[test]
    fn validate_rejects_shrinking_or_missing_attempts() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::default().with_multiplier(-2.0).validate().is_err());
        assert!(RetryPolicy::default().with_multiplier(0.5).validate().is_err());
        assert!(RetryPolicy::default().with_multiplier(f64::NAN).validate().is_err());
        assert!(RetryPolicy::new(0, Duration::from_millis(10)).validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let result = policy
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BrighterError::transient("broker busy"))
                } else {
                    Ok("sent")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "sent");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(10));

        let result: Result<(), _> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BrighterError::transient("broker down"))
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deferral_is_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = policy
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BrighterError::defer())
            })
            .await;

        assert!(result.unwrap_err().is_defer());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
