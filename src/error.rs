use std::time::Duration;

use thiserror::Error;

/// Failure raised by a translate operation.
///
/// The retry controller decides what to do with each variant, see
/// [`crate::retry::classify`].
#[derive(Debug, Clone, Error)]
pub enum TranslateError {
    /// The service throttled the request.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The service answered, but the content could not be used.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Non-success status from the service.
    #[error("service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The caller's deadline expired.
    #[error("translation cancelled")]
    Cancelled,

    /// Anything the caller does not want retried.
    #[error("{0}")]
    Fatal(String),
}

impl TranslateError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        TranslateError::RateLimited {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TranslateError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TranslateError {
    fn from(err: reqwest::Error) -> Self {
        TranslateError::Transport(err.to_string())
    }
}
