use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("API credential is missing")]
    CredentialMissing,

    #[error("Invalid credential format: {0}")]
    InvalidCredentialFormat(String),

    #[error("Transport error (status {status}): {message}")]
    Transport { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Content filtered by provider safety settings")]
    ContentFiltered,

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Audio decode error: {0}")]
    DecodeError(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Operation timed out after {elapsed:?}")]
    OperationTimedOut { elapsed: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("Storage error: {0}")]
    StorageError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::StorageError(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::StorageError(anyhow::Error::new(err))
    }
}

/// Errors that may carry a transport status code from a remote call.
///
/// The retry loop only needs this view of an error to decide whether a
/// failure is transient.
pub trait TransportFailure {
    /// Status code reported by the transport, if the call got that far.
    fn transport_status(&self) -> Option<u16>;
}

impl TransportFailure for AppError {
    fn transport_status(&self) -> Option<u16> {
        match self {
            AppError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl AppError {
    /// Terminal, human readable message for the failure.
    ///
    /// Raw transport details are logged, never shown.
    pub fn user_message(&self) -> String {
        match self {
            AppError::CredentialMissing => {
                "An API key is required. Please enter your key to continue.".to_string()
            }
            AppError::InvalidCredentialFormat(_) => {
                "That API key does not look right. Please check it and try again.".to_string()
            }
            AppError::Transport { status: 429, .. } => {
                "The service is busy right now. Please try again in a moment.".to_string()
            }
            AppError::Transport { status, message } if *status >= 500 => {
                tracing::error!(status, error = %message, "Backend failure");
                "The service is temporarily unavailable. Please try again later.".to_string()
            }
            AppError::Transport { status, message } => {
                tracing::warn!(status, error = %message, "Request rejected by backend");
                "The request could not be completed.".to_string()
            }
            AppError::Network(err) => {
                tracing::warn!(error = %err, "Network failure");
                "Could not reach the service. Check your connection and try again.".to_string()
            }
            AppError::InvalidRequest(msg) => format!("Invalid request: {}", msg),
            AppError::ContentFiltered => {
                "The request was blocked by content safety filters.".to_string()
            }
            AppError::EmptyResponse(_) => "Nothing was generated. Please try again.".to_string(),
            AppError::DecodeError(_) => "The audio could not be played.".to_string(),
            AppError::OperationFailed(_) => "Generation failed. Please try again.".to_string(),
            AppError::OperationTimedOut { .. } => {
                "Generation is taking too long and was stopped.".to_string()
            }
            AppError::Cancelled => "Cancelled.".to_string(),
            AppError::PlaybackError(_) => "The audio could not be played.".to_string(),
            AppError::StorageError(err) => {
                tracing::error!(error = %err, "Storage error");
                "Local data could not be saved.".to_string()
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                "The application is not configured correctly.".to_string()
            }
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "Internal error");
                "Something went wrong.".to_string()
            }
        }
    }
}
