//! Error types for chatvault-core

use thiserror::Error;

/// Main error type for the chatvault-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing token, malformed config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication rejected by a remote API (401/403); never retried
    #[error("authentication error: {0}")]
    Auth(String),

    /// Remote entity does not exist (channel, user, ticket)
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient remote failure (429, 5xx); callers may retry with backoff
    #[error("retryable API error: {message}")]
    Retryable {
        message: String,
        /// Server-advised wait, in seconds, from a Retry-After header
        retry_after: Option<u64>,
    },

    /// Non-retryable remote API failure that fits no narrower kind
    #[error("API error: {0}")]
    Api(String),

    /// Operation aborted by a cancellation signal or closed resource
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decode error on an API payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Parquet encode/decode error
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow record batch error
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// A row violates a required-field invariant; indicates a bug
    #[error("schema violation: {0}")]
    Schema(String),
}

impl Error {
    /// Whether a remote call that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retryable { .. })
    }
}

/// Result type alias for chatvault-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let err = Error::Retryable {
            message: "429".to_string(),
            retry_after: Some(3),
        };
        assert!(err.is_retryable());
        assert!(!Error::Auth("401".to_string()).is_retryable());
        assert!(!Error::NotFound("channel".to_string()).is_retryable());
    }
}
