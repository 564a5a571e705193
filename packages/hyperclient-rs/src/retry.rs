//! Retry policy for chain reads
//!
//! Transient failures (timeouts, dropped connections, rate limiting) are
//! retried with exponential backoff. Anything else escalates immediately.
//! Once the attempts run out the failure surfaces as
//! [`TrackerError::ChainUnreachable`].

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ChainError, TrackerError};

/// Chain read retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries, fail on the first error
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Temporary failure - should retry (RPC timeout, network issues)
    Transient,
    /// Do not retry (bad request, decode failure, contract error)
    Permanent,
}

/// Classify an error message for retry decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("error sending request")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("429")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transient;
    }

    ErrorClass::Permanent
}

/// Run a chain read, retrying transient failures with backoff
///
/// `chain` and `what` only label logs and the escalated error.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    chain: &str,
    what: &str,
    mut operation: F,
) -> Result<T, TrackerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => {
                debug!(chain, what, error = %e, "Permanent chain read failure");
                return Err(TrackerError::ChainRead {
                    chain: chain.to_string(),
                    reason: format!("{}: {}", what, e),
                });
            }
            Err(e) => {
                if !config.should_retry(attempt) {
                    warn!(chain, what, attempts = attempt + 1, error = %e, "Giving up on chain read");
                    return Err(TrackerError::ChainUnreachable {
                        chain: chain.to_string(),
                        attempts: attempt + 1,
                        reason: format!("{}: {}", what, e),
                    });
                }

                let backoff = config.backoff_for_attempt(attempt);
                warn!(
                    chain,
                    what,
                    attempt = attempt + 1,
                    max = config.max_retries,
                    ?backoff,
                    error = %e,
                    "Retrying chain read after backoff"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let config = RetryConfig::default();

        assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(6), Duration::from_secs(10)); // capped
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_error("connection timeout"), ErrorClass::Transient);
        assert_eq!(classify_error("HTTP 429 Too Many Requests"), ErrorClass::Transient);
        assert_eq!(classify_error("execution reverted"), ErrorClass::Permanent);
        assert_eq!(classify_error("invalid hex"), ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(), "EVM-1", "timestamp", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ChainError::Transport("connection reset".into()))
                } else {
                    Ok(42u64)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_unreachable() {
        let calls = AtomicU32::new(0);
        let result: Result<u64, _> = with_retry(&fast(), "EVM-1", "timestamp", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ChainError::Transport("connection refused".into())) }
        })
        .await;

        assert!(matches!(
            result,
            Err(TrackerError::ChainUnreachable { attempts: 4, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u64, _> = with_retry(&fast(), "EVM-1", "receipt", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ChainError::Decode("bad word".into())) }
        })
        .await;

        assert!(matches!(result, Err(TrackerError::ChainRead { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
