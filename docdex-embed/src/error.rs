//! Error types for the embedding subsystem

use std::time::Duration;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// The variants split along the retry boundary: [`EmbedError::RateLimited`]
/// and [`EmbedError::Transient`] are retryable, everything else fails the
/// call immediately. The retry loop in [`crate::retry`] consults
/// [`EmbedError::is_retryable`] rather than matching variants itself, so
/// the classification lives in exactly one place.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The remote service rejected the request due to rate limiting.
    ///
    /// Carries the server-specified retry-after hint when one was present;
    /// the retry policy prefers the hint over its computed backoff.
    #[error("embedding service rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    /// A transient network or server-side failure (timeout, connection
    /// reset, HTTP 5xx). Safe to retry.
    #[error("transient embedding failure: {message}")]
    Transient { message: String },

    /// The input itself was rejected (e.g. still too long after
    /// truncation). Retrying the same input cannot succeed.
    #[error("embedding input rejected: {message}")]
    InvalidInput { message: String },

    /// Invalid or incomplete provider configuration (bad endpoint,
    /// missing key, authentication failure).
    #[error("invalid embedding configuration: {message}")]
    Config { message: String },

    /// The service answered successfully but the response did not have the
    /// expected shape (missing fields, wrong dimension).
    #[error("unexpected embedding response: {message}")]
    Protocol { message: String },
}

impl EmbedError {
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Whether the operation that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }

    /// Server-specified delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl crate::retry::Retryable for EmbedError {
    fn is_retryable(&self) -> bool {
        EmbedError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        EmbedError::retry_after(self)
    }
}

impl From<reqwest::Error> for EmbedError {
    fn from(source: reqwest::Error) -> Self {
        if source.is_timeout() || source.is_connect() || source.is_request() {
            Self::Transient {
                message: source.to_string(),
            }
        } else {
            Self::Protocol {
                message: source.to_string(),
            }
        }
    }
}
