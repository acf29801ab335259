//! Error types for raw store calls.

use crate::op::OpResult;
use std::fmt;
use thiserror::Error;

/// Result type for raw store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result codes reported by the store.
///
/// The integer values match the codes used on the wire by ZooKeeper-style
/// servers so they can be logged and compared with server-side diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// An internal inconsistency; also used for multi-op entries that were
    /// not executed because another entry aborted the batch.
    RuntimeInconsistency,
    /// The connection to the server was lost. Retryable.
    ConnectionLoss,
    /// Marshalling or argument error.
    BadArguments,
    /// The server did not answer in time. Retryable.
    OperationTimeout,
    /// The operation is not implemented by this server.
    Unimplemented,
    /// The node does not exist.
    NoNode,
    /// The caller lacks permission for the operation.
    NoAuth,
    /// The expected version did not match.
    BadVersion,
    /// Ephemeral nodes cannot have children.
    NoChildrenForEphemerals,
    /// The node already exists.
    NodeExists,
    /// The node has children.
    NotEmpty,
    /// The session has expired.
    SessionExpired,
    /// The ACL is invalid.
    InvalidAcl,
    /// Client authentication failed.
    AuthFailed,
    /// The session moved to another server.
    SessionMoved,
}

impl ErrorCode {
    /// Returns the integer code for this error.
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::RuntimeInconsistency => -2,
            ErrorCode::ConnectionLoss => -4,
            ErrorCode::BadArguments => -8,
            ErrorCode::OperationTimeout => -7,
            ErrorCode::Unimplemented => -6,
            ErrorCode::NoNode => -101,
            ErrorCode::NoAuth => -102,
            ErrorCode::BadVersion => -103,
            ErrorCode::NoChildrenForEphemerals => -108,
            ErrorCode::NodeExists => -110,
            ErrorCode::NotEmpty => -111,
            ErrorCode::SessionExpired => -112,
            ErrorCode::InvalidAcl => -114,
            ErrorCode::AuthFailed => -115,
            ErrorCode::SessionMoved => -118,
        }
    }

    /// Looks up an error code by its integer value.
    pub fn from_code(code: i32) -> Option<Self> {
        let code = match code {
            -2 => ErrorCode::RuntimeInconsistency,
            -4 => ErrorCode::ConnectionLoss,
            -8 => ErrorCode::BadArguments,
            -7 => ErrorCode::OperationTimeout,
            -6 => ErrorCode::Unimplemented,
            -101 => ErrorCode::NoNode,
            -102 => ErrorCode::NoAuth,
            -103 => ErrorCode::BadVersion,
            -108 => ErrorCode::NoChildrenForEphemerals,
            -110 => ErrorCode::NodeExists,
            -111 => ErrorCode::NotEmpty,
            -112 => ErrorCode::SessionExpired,
            -114 => ErrorCode::InvalidAcl,
            -115 => ErrorCode::AuthFailed,
            -118 => ErrorCode::SessionMoved,
            _ => return None,
        };
        Some(code)
    }

    /// Returns true if the call that produced this code may be retried.
    ///
    /// Only connection-class failures qualify: the request either never
    /// reached the server or its outcome is unknown.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::ConnectionLoss | ErrorCode::OperationTimeout)
    }

    fn describe(&self) -> &'static str {
        match self {
            ErrorCode::RuntimeInconsistency => "runtime inconsistency",
            ErrorCode::ConnectionLoss => "connection loss",
            ErrorCode::BadArguments => "bad arguments",
            ErrorCode::OperationTimeout => "operation timeout",
            ErrorCode::Unimplemented => "unimplemented",
            ErrorCode::NoNode => "no node",
            ErrorCode::NoAuth => "not authorized",
            ErrorCode::BadVersion => "bad version",
            ErrorCode::NoChildrenForEphemerals => "no children for ephemerals",
            ErrorCode::NodeExists => "node exists",
            ErrorCode::NotEmpty => "directory not empty",
            ErrorCode::SessionExpired => "session expired",
            ErrorCode::InvalidAcl => "invalid ACL",
            ErrorCode::AuthFailed => "authentication failed",
            ErrorCode::SessionMoved => "session moved",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.code())
    }
}

/// Errors returned by raw store calls.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A single call failed with a store result code.
    #[error("{code} for {}", path.as_deref().unwrap_or("<none>"))]
    Keeper {
        /// Result code.
        code: ErrorCode,
        /// Path the failing call targeted, when known.
        path: Option<String>,
    },

    /// A multi-op batch was aborted; nothing in it took effect.
    #[error("multi-op aborted by operation {index}: {code}")]
    MultiAborted {
        /// Index of the operation that caused the abort.
        index: usize,
        /// Result code of the offending operation.
        code: ErrorCode,
        /// Per-operation results, one per submitted operation.
        results: Vec<OpResult>,
    },

    /// The client has been closed.
    #[error("store client is closed")]
    Closed,
}

impl StoreError {
    /// Creates an error for a single call.
    pub fn keeper(code: ErrorCode, path: impl Into<String>) -> Self {
        Self::Keeper {
            code,
            path: Some(path.into()),
        }
    }

    /// Creates an error with no associated path.
    pub fn code_only(code: ErrorCode) -> Self {
        Self::Keeper { code, path: None }
    }

    /// Creates a connection loss error.
    pub fn connection_loss() -> Self {
        Self::code_only(ErrorCode::ConnectionLoss)
    }

    /// Returns the store result code behind this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Keeper { code, .. } => *code,
            StoreError::MultiAborted { code, .. } => *code,
            StoreError::Closed => ErrorCode::SessionExpired,
        }
    }

    /// Returns the path this error refers to, when known.
    pub fn path(&self) -> Option<&str> {
        match self {
            StoreError::Keeper { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Closed => false,
            other => other.code().is_retryable(),
        }
    }
}
