//! Retry logic with exponential backoff
//!
//! Transient extractor failures (rate limiting, upstream outages, timeouts) are
//! retried inside a single job attempt before `Failed` becomes observable.
//! Delays grow exponentially, are capped at `max_delay`, and optionally carry
//! random jitter so simultaneous jobs don't hammer the platform in lockstep.
//!
//! # Example
//!
//! ```no_run
//! use tube_dl::retry::{IsRetryable, with_retry};
//! use tube_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::extractor::ExtractError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ExtractError {
    fn is_retryable(&self) -> bool {
        match self {
            ExtractError::RateLimited(_)
            | ExtractError::UpstreamUnavailable(_)
            | ExtractError::Timeout(_) => true,
            // The video or format will not appear on a second try
            ExtractError::NotFound(_) | ExtractError::UnsupportedFormat(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// `operation` is called once, then up to `config.max_retries` more times
/// while it keeps returning retryable errors. Returns the first success or the
/// last error.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;
    let mut delay = config.initial_delay.min(config.max_delay);

    loop {
        match operation().await {
            Ok(result) => {
                if retries > 0 {
                    tracing::info!(calls = retries + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && retries < config.max_retries => {
                retries += 1;

                let wait = if config.jitter {
                    add_jitter(delay, config.max_delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    retry = retries,
                    max_retries = config.max_retries,
                    delay_ms = wait.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(wait).await;

                let next = delay.as_secs_f64() * config.backoff_multiplier;
                delay = Duration::try_from_secs_f64(next)
                    .unwrap_or(config.max_delay)
                    .min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        calls = retries + 1,
                        "Operation failed after all retries exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// The result lies between `delay` and `2 * delay`, capped at `max`.
fn add_jitter(delay: Duration, max: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
        .unwrap_or(max)
        .min(max)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn extractor_failures_are_classified() {
        assert!(ExtractError::RateLimited("429".into()).is_retryable());
        assert!(ExtractError::UpstreamUnavailable("reset".into()).is_retryable());
        assert!(ExtractError::Timeout("slow".into()).is_retryable());
        assert!(!ExtractError::NotFound("gone".into()).is_retryable());
        assert!(!ExtractError::UnsupportedFormat("no 720p".into()).is_retryable());
    }

    #[tokio::test]
    async fn success_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&RetryConfig::default(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ExtractError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limited_twice_then_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ExtractError::RateLimited("HTTP Error 429".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(2), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ExtractError::UpstreamUnavailable("503".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(ExtractError::UpstreamUnavailable(_))));
        assert_eq!(
            counter.load(Ordering::SeqCst),
            3,
            "should try initial + 2 retries"
        );
    }

    #[tokio::test]
    async fn not_found_fails_without_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast_config(3), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ExtractError::NotFound("Video unavailable".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(ExtractError::NotFound(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backoff_grows_exponentially() {
        let start = std::time::Instant::now();

        let _ = with_retry(&fast_config(3), || async {
            Err::<(), _>(ExtractError::Timeout("slow".into()))
        })
        .await;

        // 10ms + 20ms + 40ms
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(70),
            "should wait at least 70ms, waited {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_secs(2),
            "should not wait too long, waited {elapsed:?}"
        );
    }

    #[test]
    fn jitter_stays_within_one_delay() {
        let delay = Duration::from_millis(100);
        for _ in 0..50 {
            let jittered = add_jitter(delay, Duration::from_secs(1));
            assert!(jittered >= delay);
            assert!(jittered <= delay * 2);
        }
    }

    #[test]
    fn jitter_is_capped() {
        let max = Duration::from_millis(150);
        for _ in 0..50 {
            assert!(add_jitter(Duration::from_millis(100), max) <= max);
        }
        assert_eq!(add_jitter(Duration::MAX, max), max);
    }

    #[tokio::test]
    async fn oversized_multiplier_is_capped_at_max_delay() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let config = RetryConfig {
            backoff_multiplier: f64::MAX,
            max_delay: Duration::from_millis(20),
            ..fast_config(3)
        };

        let result = with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ExtractError::RateLimited("429".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(ExtractError::RateLimited(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
