//! Error types for the signal engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the signal engine
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Data provider errors
    #[error("Provider request failed: {0}")]
    Http(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider connection failed: {0}")]
    Connection(String),

    #[error("Provider rate limit hit")]
    RateLimited,

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Retries exhausted for {operation} after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    // Data integrity errors
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Metadata unavailable for token {0}")]
    MetadataUnavailable(String),

    // Execution errors
    #[error("Swap rejected: {0}")]
    SwapRejected(String),

    #[error("Insufficient funds: {available} available, {required} required")]
    InsufficientFunds { available: f64, required: f64 },

    #[error("Slippage exceeded: expected {expected}, got {actual}")]
    SlippageExceeded { expected: f64, actual: f64 },

    #[error("Invalid fill for {token}: zero quantity received")]
    EmptyFill { token: String },

    // Position management errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Position already open for token {0}")]
    PositionAlreadyOpen(String),

    #[error("Global position limit reached: {open}/{max}")]
    PositionLimitReached { open: usize, max: usize },

    #[error("Category position limit reached for {category}: {open}/{max}")]
    CategoryLimitReached {
        category: String,
        open: usize,
        max: usize,
    },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Timeout | Error::Connection(_) | Error::RateLimited
        )
    }

    /// Check if this error is fatal to the owning subsystem (no retry, no skip)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Auth(_) | Error::Config(_) | Error::MissingEnvVar(_)
        )
    }

    /// Check if this error only invalidates a single record
    pub fn is_record_level(&self) -> bool {
        matches!(self, Error::MalformedRecord(_))
    }
}

// Conversion from reqwest errors, split by transience
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else if e.is_connect() {
            Error::Connection(e.to_string())
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::RateLimited.is_retryable());
        assert!(Error::Timeout.is_retryable());
        assert!(Error::Connection("reset".into()).is_retryable());
        assert!(!Error::Auth("bad key".into()).is_retryable());
        assert!(!Error::MalformedRecord("missing field".into()).is_retryable());
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(Error::Timeout.to_string(), "Provider request timed out");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Auth("bad key".into()).is_fatal());
        assert!(Error::Config("missing section".into()).is_fatal());
        assert!(!Error::RateLimited.is_fatal());
    }
}
