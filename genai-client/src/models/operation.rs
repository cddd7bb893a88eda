//! Long-running remote operation (video synthesis).

use serde::{Deserialize, Serialize};

/// A backend job in flight.
///
/// Once `done` is set, a missing `result_uri` means the job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOperation {
    /// Opaque token the backend uses to look the job up.
    pub handle: String,
    pub done: bool,
    pub result_uri: Option<String>,
    /// Latest progress or error text reported for the job.
    pub last_status_message: String,
}

impl RemoteOperation {
    pub fn pending(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            done: false,
            result_uri: None,
            last_status_message: String::new(),
        }
    }

    pub fn completed(handle: impl Into<String>, result_uri: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            done: true,
            result_uri: Some(result_uri.into()),
            last_status_message: String::new(),
        }
    }

    pub fn failed(handle: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            done: true,
            result_uri: None,
            last_status_message: message.into(),
        }
    }

    pub fn with_status(mut self, message: impl Into<String>) -> Self {
        self.last_status_message = message.into();
        self
    }

    /// Result URI, if the job completed with a usable one.
    pub fn usable_result(&self) -> Option<&str> {
        if !self.done {
            return None;
        }
        self.result_uri.as_deref().filter(|uri| !uri.trim().is_empty())
    }
}
