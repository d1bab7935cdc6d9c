//! Exponential backoff for worker registration.
//!
//! A failed install leaves the previous worker in control; the host retries
//! the registration with the delays computed here.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Whether to spread delays by a random factor in `0.5..1.5`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after the given failed attempt (0-indexed): `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doubled = self
            .base_delay
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.max_delay);
        let capped = doubled.min(self.max_delay);

        if self.jitter {
            let factor = rand::rng().random_range(0.5..1.5);
            capped.mul_f64(factor).min(self.max_delay)
        } else {
            capped
        }
    }
}

/// Outcome bookkeeping of a retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Run `operation` until it succeeds, a non-retryable error occurs, or the
/// attempts are exhausted.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let mut attempt = 0;

    loop {
        stats.attempts = attempt + 1;

        let err = match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Succeeded after {} attempts", attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(err) => err,
        };

        stats.last_error = Some(err.to_string());

        if !should_retry(&err) || attempt + 1 >= config.max_attempts {
            warn!("Giving up after {} attempt(s): {}", attempt + 1, err);
            return (Err(err), stats);
        }

        let delay = config.delay_for(attempt);
        stats.total_delay += delay;
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt + 1,
            config.max_attempts,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_doubles_without_jitter() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_millis(100))
            .with_jitter(false);

        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_capped() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter(false);

        assert_eq!(config.delay_for(2), Duration::from_secs(30));
        assert_eq!(config.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig::new().with_base_delay(Duration::from_secs(2));
        for _ in 0..20 {
            let delay = config.delay_for(0);
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let config = RetryConfig::new()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(5))
            .with_jitter(false);
        let counter = Arc::new(AtomicU32::new(0));

        let (result, stats) = retry_async(
            &config,
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("precache fetch failed".to_string())
                    } else {
                        Ok("installed")
                    }
                }
            },
            |_: &String| true,
        )
        .await;

        assert_eq!(result.unwrap(), "installed");
        assert_eq!(stats.attempts, 3);
        assert!(stats.success);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let config = RetryConfig::new().with_max_attempts(5);

        let (result, stats) = retry_async(
            &config,
            || async { Err::<(), _>("bad config".to_string()) },
            |e: &String| !e.contains("config"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.last_error.as_deref(), Some("bad config"));
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let config = RetryConfig::new()
            .with_max_attempts(2)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false);

        let (result, stats) = retry_async(
            &config,
            || async { Err::<(), _>("offline".to_string()) },
            |_: &String| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 2);
        assert!(!stats.success);
    }
}
