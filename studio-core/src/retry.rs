//! Retry utilities for calls to the remote generative backend.
//!
//! Every remote call passes through [`ResilientInvoker`]: a bounded loop with
//! exponential backoff that only retries rate limiting (429) and server-side
//! failures (>= 500).

use crate::error::TransportFailure;
use rand::Rng;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Initial backoff duration before first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to backoff duration.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }
}

/// Retry settings as they appear in layered configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            ..Default::default()
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the specified max retries.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Create a config with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt (0-based).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);

        if self.add_jitter {
            // Up to 25% on top of the base delay
            let jitter = (backoff_ms as f64 * 0.25 * rand::thread_rng().gen::<f64>()) as u64;
            duration += Duration::from_millis(jitter);
        }

        duration
    }

    /// The full sequence of delays a call may wait through before giving up.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        (0..self.max_retries)
            .map(|attempt| self.backoff_duration(attempt))
            .collect()
    }
}

/// Rate limiting or a server-side failure.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// Determines if an error is worth retrying.
pub fn is_retryable<E: TransportFailure>(error: &E) -> bool {
    error.transport_status().is_some_and(is_retryable_status)
}

/// Execute a remote call with retry logic.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name of the operation for logging
/// * `f` - The async function that performs the call
///
/// # Example
/// ```ignore
/// let text = retry_call(&RetryConfig::default(), "generate_text", || async {
///     provider.generate(&credential, &request).await
/// })
/// .await?;
/// ```
pub async fn retry_call<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransportFailure + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Remote call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    warn!(
                        operation = operation_name,
                        status = ?error.transport_status(),
                        error = %error,
                        "Remote call failed with non-retryable error"
                    );
                    return Err(error);
                }

                if attempt >= config.max_retries {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        status = ?error.transport_status(),
                        error = %error,
                        "Remote call failed after max retries"
                    );
                    return Err(error);
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    status = ?error.transport_status(),
                    error = %error,
                    backoff_ms = backoff.as_millis() as u64,
                    "Remote call failed, retrying after backoff"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// The single chokepoint every remote call passes through.
#[derive(Clone, Debug, Default)]
pub struct ResilientInvoker {
    config: RetryConfig,
}

impl ResilientInvoker {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry.
    pub async fn invoke<F, Fut, T, E>(&self, operation_name: &str, f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: TransportFailure + std::fmt::Display,
    {
        retry_call(&self.config, operation_name, f).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn transport(status: u16) -> AppError {
        AppError::Transport {
            status,
            message: format!("status {}", status),
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff, Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_duration() {
        let config = RetryConfig::default();

        assert_eq!(config.backoff_duration(0), Duration::from_millis(1000));
        assert_eq!(config.backoff_duration(1), Duration::from_millis(2000));
        assert_eq!(config.backoff_duration(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_backoff: Duration::from_millis(1500),
            ..Default::default()
        };
        assert_eq!(config.backoff_duration(5), Duration::from_millis(1500));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig {
            add_jitter: true,
            ..Default::default()
        };
        for _ in 0..20 {
            let d = config.backoff_duration(1);
            assert!(d >= Duration::from_millis(2000));
            assert!(d <= Duration::from_millis(2500));
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let schedule = RetryConfig::default().backoff_schedule();
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&transport(429)));
        assert!(is_retryable(&transport(500)));
        assert!(is_retryable(&transport(503)));
        assert!(!is_retryable(&transport(400)));
        assert!(!is_retryable(&transport(404)));
        assert!(!is_retryable(&AppError::CredentialMissing));
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let config = RetryConfig::default();
        let result = retry_call(&config, "test_op", || async { Ok::<_, AppError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_two_server_errors() {
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let invoker = ResilientInvoker::default();

        let recorded = calls.clone();
        let result = invoker
            .invoke("flaky_op", move || {
                let recorded = recorded.clone();
                async move {
                    let mut calls = recorded.lock().unwrap();
                    calls.push(Instant::now());
                    if calls.len() <= 2 {
                        Err(transport(503))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert_eq!(first_gap, Duration::from_millis(1000));
        assert_eq!(second_gap, Duration::from_millis(2000));
        assert!(second_gap >= first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bad_request_fails_immediately() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let started = Instant::now();

        let result = retry_call(&RetryConfig::default(), "bad_op", move || {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Err::<(), _>(transport(400))
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(AppError::Transport { status: 400, .. })
        ));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(Instant::now() - started, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_returns_last_error() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();

        let result = retry_call(&RetryConfig::default(), "down_op", move || {
            let counter = counter.clone();
            async move {
                let mut n = counter.lock().unwrap();
                *n += 1;
                Err::<(), _>(transport(500 + *n as u16))
            }
        })
        .await;

        // one initial attempt plus three retries
        assert_eq!(*calls.lock().unwrap(), 4);
        assert!(matches!(
            result,
            Err(AppError::Transport { status: 504, .. })
        ));
    }

    #[tokio::test]
    async fn test_no_retry_config_gives_up_at_once() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();

        let result = retry_call(&RetryConfig::no_retry(), "once", move || {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Err::<(), _>(transport(429))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
