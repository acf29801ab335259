//! Error types for the coordination layer.

use crate::schema::SchemaViolation;
use crate::transaction::TransactionResult;
use ensemble_store::{ErrorCode, StoreError};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in coordination-layer operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A fatal store error, surfaced unchanged.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The call was malformed; nothing was sent to the store.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// An operation was rejected by its schema; nothing was sent to the store.
    #[error("schema violation in operation {index} ({path}): {violation}")]
    SchemaViolation {
        /// Index of the offending operation in its batch.
        index: usize,
        /// Path of the offending operation.
        path: String,
        /// The violated constraint.
        #[source]
        violation: SchemaViolation,
    },

    /// A retryable error persisted until the retry policy gave up.
    #[error("gave up after {attempts} attempts in {elapsed:?}: {source}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Time since the first attempt.
        elapsed: Duration,
        /// The last error seen.
        #[source]
        source: StoreError,
    },

    /// A transaction was aborted by the store; none of it took effect.
    #[error("transaction aborted by operation {index} ({path}): {code}")]
    TransactionFailed {
        /// Index of the operation that caused the abort.
        index: usize,
        /// Path of the operation that caused the abort.
        path: String,
        /// Result code of the offending operation.
        code: ErrorCode,
        /// Per-operation results in submission order.
        results: Vec<TransactionResult>,
    },

    /// Configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Configuration could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A background callback returned an error or panicked.
    #[error("background callback failed: {message}")]
    CallbackFailed {
        /// Description of the failure.
        message: String,
    },

    /// The store answered in a way that breaks its contract.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the problem.
        message: String,
    },

    /// The framework has been closed.
    #[error("framework is shut down")]
    ShuttingDown,
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a callback failure error.
    pub fn callback_failed(message: impl Into<String>) -> Self {
        Self::CallbackFailed {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns the store result code behind this error, if there is one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            CoreError::Store(err) => Some(err.code()),
            CoreError::RetriesExhausted { source, .. } => Some(source.code()),
            CoreError::TransactionFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the store was never contacted.
    pub fn is_rejected_before_submission(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidArgument { .. }
                | CoreError::SchemaViolation { .. }
                | CoreError::ShuttingDown
        )
    }
}
