//! Submit-then-poll driver for long-running backend jobs.
//!
//! A run moves through `Submitted -> Polling -> Done | Failed`. Status checks
//! are strictly sequential and every remote call goes through the
//! [`ResilientInvoker`]. Cancellation is local only: the handle is dropped and
//! no further checks are issued.

use crate::config::PollingConfig;
use crate::models::RemoteOperation;
use crate::services::metrics;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use studio_core::error::{AppError, TransportFailure};
use studio_core::retry::ResilientInvoker;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Status emitted once the job has been accepted.
pub const STATUS_SUBMITTED: &str = "Thinking...";

/// Status emitted after a check that found the job still running.
pub const STATUS_POLLING: &str = "Generating...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_duration: Option<Duration>,
    pub max_polls: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollConfig {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval,
            max_duration: config.max_duration,
            max_polls: config.max_polls,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperationPoller {
    invoker: ResilientInvoker,
    config: PollConfig,
}

impl OperationPoller {
    pub fn new(invoker: ResilientInvoker, config: PollConfig) -> Self {
        Self { invoker, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Drive a job to completion and return its result URI.
    pub async fn run<S, SF, C, CF, E>(
        &self,
        submit: S,
        check: C,
        on_status: impl Fn(&str),
    ) -> Result<String, AppError>
    where
        S: FnMut() -> SF,
        SF: Future<Output = Result<RemoteOperation, E>>,
        C: FnMut(RemoteOperation) -> CF,
        CF: Future<Output = Result<RemoteOperation, E>>,
        E: TransportFailure + Display,
        AppError: From<E>,
    {
        self.run_with_cancel(&CancellationToken::new(), submit, check, on_status)
            .await
    }

    /// Like [`run`](Self::run), abandoning the job when `cancel` fires.
    pub async fn run_with_cancel<S, SF, C, CF, E>(
        &self,
        cancel: &CancellationToken,
        mut submit: S,
        mut check: C,
        on_status: impl Fn(&str),
    ) -> Result<String, AppError>
    where
        S: FnMut() -> SF,
        SF: Future<Output = Result<RemoteOperation, E>>,
        C: FnMut(RemoteOperation) -> CF,
        CF: Future<Output = Result<RemoteOperation, E>>,
        E: TransportFailure + Display,
        AppError: From<E>,
    {
        let started = Instant::now();

        let mut operation = cancellable(cancel, async {
            self.invoker
                .invoke("submit_operation", &mut submit)
                .await
                .map_err(AppError::from)
        })
        .await?;

        let mut state = PollState::Submitted;
        tracing::info!(operation = %operation.handle, state = ?state, "Operation submitted");
        on_status(STATUS_SUBMITTED);

        let mut polls: u32 = 0;
        while !operation.done {
            state = PollState::Polling;

            if let Some(max_polls) = self.config.max_polls {
                if polls >= max_polls {
                    return Err(self.timed_out(&operation, started, polls));
                }
            }
            if let Some(max_duration) = self.config.max_duration {
                if started.elapsed() + self.config.interval > max_duration {
                    return Err(self.timed_out(&operation, started, polls));
                }
            }

            cancellable(cancel, async {
                tokio::time::sleep(self.config.interval).await;
                Ok(())
            })
            .await?;

            let current = operation.clone();
            let result = cancellable(cancel, async {
                self.invoker
                    .invoke("check_operation", || check(current.clone()))
                    .await
                    .map_err(AppError::from)
            })
            .await;

            operation = match result {
                Ok(op) => op,
                Err(e) => {
                    metrics::record_video_poll("error");
                    return Err(e);
                }
            };
            polls += 1;

            if !operation.done {
                metrics::record_video_poll("pending");
                tracing::debug!(
                    operation = %operation.handle,
                    polls,
                    state = ?state,
                    "Operation still running"
                );
                if operation.last_status_message.is_empty() {
                    on_status(STATUS_POLLING);
                } else {
                    on_status(&operation.last_status_message);
                }
            }
        }

        match operation.usable_result() {
            Some(uri) => {
                state = PollState::Done;
                metrics::record_video_poll("done");
                tracing::info!(
                    operation = %operation.handle,
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    state = ?state,
                    "Operation completed"
                );
                Ok(uri.to_string())
            }
            None => {
                state = PollState::Failed;
                metrics::record_video_poll("failed");
                let message = if operation.last_status_message.is_empty() {
                    "Operation finished without a result".to_string()
                } else {
                    operation.last_status_message.clone()
                };
                tracing::warn!(
                    operation = %operation.handle,
                    polls,
                    state = ?state,
                    error = %message,
                    "Operation failed"
                );
                Err(AppError::OperationFailed(message))
            }
        }
    }

    fn timed_out(&self, operation: &RemoteOperation, started: Instant, polls: u32) -> AppError {
        let elapsed = started.elapsed();
        tracing::warn!(
            operation = %operation.handle,
            polls,
            elapsed_ms = elapsed.as_millis() as u64,
            "Operation exceeded polling ceiling, abandoning"
        );
        AppError::OperationTimedOut { elapsed }
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("Operation cancelled locally");
            Err(AppError::Cancelled)
        }
        result = fut => result,
    }
}
