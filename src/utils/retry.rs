//! Retry utilities with exponential backoff for outbound requests.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::RetrySettings;
use crate::sources::SourceError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Ceiling on the delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: if settings.backoff_multiplier.is_finite() {
                settings.backoff_multiplier.max(1.0)
            } else {
                tracing::warn!(
                    multiplier = settings.backoff_multiplier,
                    "Invalid backoff multiplier, using 1.0"
                );
                1.0
            },
        }
    }
}

impl RetryConfig {
    /// Delay to wait after failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let ceiling = self.max_delay.as_secs_f64();
        if delay.is_nan() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay.clamp(0.0, ceiling))
    }
}

/// Transport faults that should trigger a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientError {
    /// Request timed out
    Timeout,
    /// Connection could not be established or was reset
    Connection,
}

impl TransientError {
    /// Classify a SourceError; `None` means it must not be retried
    pub fn from_source_error(err: &SourceError) -> Option<Self> {
        match err {
            SourceError::Timeout { .. } => Some(TransientError::Timeout),
            SourceError::Connection { .. } => Some(TransientError::Connection),
            _ => None,
        }
    }
}

/// Execute an async operation, retrying transient faults with exponential backoff.
///
/// The operation is invoked at most `config.max_attempts` times. Non-transient
/// errors are returned immediately.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Request succeeded after transient failures");
                }
                return Ok(result);
            }
            Err(error) => {
                let Some(transient) = TransientError::from_source_error(&error) else {
                    return Err(error);
                };

                if attempt >= max_attempts {
                    tracing::warn!(attempts = attempt, %error, "Giving up after transient failures");
                    return Err(error);
                }

                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    kind = ?transient,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::time::Instant;

    fn timeout_error() -> SourceError {
        SourceError::Timeout {
            provider: "pubmed".to_string(),
            message: "timed out".to_string(),
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(12), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(RetryConfig::default(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Ok("success")
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(RetryConfig::default(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    if *call_count.borrow() < 3 {
                        Err(SourceError::Connection {
                            provider: "arxiv".to_string(),
                            message: "connection reset".to_string(),
                        })
                    } else {
                        Ok("success")
                    }
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_max_attempts_with_backoff() {
        let call_count = Rc::new(RefCell::new(0));
        let start = Instant::now();

        let result: Result<(), SourceError> = {
            let call_count = call_count.clone();
            with_retry(RetryConfig::default(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(timeout_error())
                }
            })
        }
        .await;

        assert!(matches!(result, Err(SourceError::Timeout { .. })));
        assert_eq!(*call_count.borrow(), 3);
        // 1s after the first attempt, 2s after the second, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_retry_returns_permanent_error() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, SourceError> = {
            let call_count = call_count.clone();
            with_retry(RetryConfig::default(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::Unavailable {
                        provider: "biorxiv".to_string(),
                        status: 503,
                    })
                }
            })
        }
        .await;

        assert!(matches!(result, Err(SourceError::Unavailable { status: 503, .. })));
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_is_not_retried() {
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<(), SourceError> = {
            let call_count = call_count.clone();
            with_retry(RetryConfig::default(), move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::RateLimited {
                        provider: "pubmed".to_string(),
                        retry_after: Duration::from_secs(30),
                    })
                }
            })
        }
        .await;

        assert!(result.is_err());
        assert_eq!(*call_count.borrow(), 1);
    }

    #[test]
    fn test_transient_error_detection() {
        assert_eq!(
            TransientError::from_source_error(&timeout_error()),
            Some(TransientError::Timeout)
        );
        assert!(TransientError::from_source_error(&SourceError::Parse("bad".into())).is_none());
        assert!(TransientError::from_source_error(&SourceError::RequestFailed {
            provider: "arxiv".into(),
            status: Some(400),
            message: "bad request".into(),
        })
        .is_none());
    }

    #[test]
    fn test_retry_config_from_settings() {
        let settings = RetrySettings {
            max_attempts: 0,
            initial_delay_ms: 250,
            max_delay_ms: 2000,
            backoff_multiplier: 3.0,
        };
        let config = RetryConfig::from(&settings);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(750));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(2));
    }

    #[test]
    fn test_negative_backoff_multiplier_is_clamped() {
        let settings = RetrySettings {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_multiplier: -2.0,
        };
        let config = RetryConfig::from(&settings);
        assert_eq!(config.backoff_multiplier, 1.0);
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(100));

        let unchecked = RetryConfig {
            backoff_multiplier: -2.0,
            ..config
        };
        assert_eq!(unchecked.delay_for_attempt(2), Duration::ZERO);
    }
}
