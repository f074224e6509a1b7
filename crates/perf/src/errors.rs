//! Error types for the performance helpers.
//!
//! - [`DispatchError`]: failures surfaced by the request dispatcher
//! - [`ConfigError`]: invalid configuration overrides

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while dispatching a request.
///
/// Every variant except [`DispatchError::Shutdown`] counts as a failed attempt
/// and is retried until the attempt budget is spent. The error of the last
/// attempt is what the submitter finally receives.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The HTTP client failed before a response was received.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A transport implementation reported a failure of its own.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
    },

    /// The attempt did not complete within the request timeout.
    #[error("Request to {target} timed out after {after:?}")]
    Timeout {
        /// The request target
        target: String,
        /// The timeout that elapsed
        after: Duration,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {status_text}")]
    HttpStatus {
        /// Numeric status code
        status: u16,
        /// Reason phrase, empty when the server sent none
        status_text: String,
    },

    /// The dispatcher task is gone and can no longer accept or answer requests.
    #[error("Dispatcher shut down")]
    Shutdown,
}

impl DispatchError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Shutdown)
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Errors raised while reading configuration overrides.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Environment variable name
        key: String,
        /// The raw value found
        value: String,
    },
}
