//! Error types for the quota ledger.

use thiserror::Error;

/// Failures talking to the key-value store.
///
/// Every variant means "the store could not answer", which callers must keep
/// apart from a legitimate negative policy decision.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No store was configured for this process
    #[error("key-value store is not configured")]
    NotConfigured,

    /// The store could not be reached or the command failed in transit
    #[error("key-value store unreachable: {0}")]
    Unreachable(String),

    /// The store answered with a value of the wrong shape
    #[error("malformed value at `{key}`: {detail}")]
    Malformed { key: String, detail: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::TypeError => StoreError::Malformed {
                key: String::new(),
                detail: err.to_string(),
            },
            _ => StoreError::Unreachable(err.to_string()),
        }
    }
}

/// Result type alias for store primitives.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Main error type for ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Caller input or configuration rejected before any store access
    #[error("Validation error: {0}")]
    Validation(String),

    /// The key-value store could not answer
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Whether this error came from the store rather than from validation.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_))
    }
}

impl From<config::ConfigError> for LedgerError {
    fn from(err: config::ConfigError) -> Self {
        LedgerError::Config(err.to_string())
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
