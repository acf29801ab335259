//! Requests and per-request results.

use crate::error::ErrorCode;
use crate::types::{Acl, CreateMode, Stat};

/// Version value that matches any node version.
pub const ANY_VERSION: i32 = -1;

/// The request kind, mirroring the store's op codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Create a node.
    Create,
    /// Create a container node.
    CreateContainer,
    /// Delete a node.
    Delete,
    /// Delete a container node if it is empty.
    DeleteContainer,
    /// Replace a node's data.
    SetData,
    /// Assert a node's version without changing it.
    Check,
}

/// A single request against one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Create `path` with the given payload, ACL and mode.
    Create {
        /// Target path.
        path: String,
        /// Initial payload.
        data: Vec<u8>,
        /// ACL for the new node.
        acl: Vec<Acl>,
        /// Create mode.
        mode: CreateMode,
    },
    /// Create a container node at `path`.
    CreateContainer {
        /// Target path.
        path: String,
        /// Initial payload.
        data: Vec<u8>,
        /// ACL for the new node.
        acl: Vec<Acl>,
    },
    /// Delete `path` if its version matches.
    Delete {
        /// Target path.
        path: String,
        /// Expected version, or [`ANY_VERSION`].
        version: i32,
    },
    /// Delete the container at `path` if it has no children.
    DeleteContainer {
        /// Target path.
        path: String,
    },
    /// Replace the data at `path` if its version matches.
    SetData {
        /// Target path.
        path: String,
        /// New payload.
        data: Vec<u8>,
        /// Expected version, or [`ANY_VERSION`].
        version: i32,
    },
    /// Fail unless `path` exists with a matching version.
    Check {
        /// Target path.
        path: String,
        /// Expected version, or [`ANY_VERSION`].
        version: i32,
    },
}

impl Op {
    /// Returns the request kind.
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Create { .. } => OpKind::Create,
            Op::CreateContainer { .. } => OpKind::CreateContainer,
            Op::Delete { .. } => OpKind::Delete,
            Op::DeleteContainer { .. } => OpKind::DeleteContainer,
            Op::SetData { .. } => OpKind::SetData,
            Op::Check { .. } => OpKind::Check,
        }
    }

    /// Returns the target path.
    pub fn path(&self) -> &str {
        match self {
            Op::Create { path, .. }
            | Op::CreateContainer { path, .. }
            | Op::Delete { path, .. }
            | Op::DeleteContainer { path }
            | Op::SetData { path, .. }
            | Op::Check { path, .. } => path,
        }
    }

    /// Returns a copy of this request targeting `path` instead.
    #[must_use]
    pub fn with_path(&self, new_path: impl Into<String>) -> Op {
        let mut op = self.clone();
        match &mut op {
            Op::Create { path, .. }
            | Op::CreateContainer { path, .. }
            | Op::Delete { path, .. }
            | Op::DeleteContainer { path }
            | Op::SetData { path, .. }
            | Op::Check { path, .. } => *path = new_path.into(),
        }
        op
    }

    /// Returns the effective create mode for create requests.
    pub fn create_mode(&self) -> Option<CreateMode> {
        match self {
            Op::Create { mode, .. } => Some(*mode),
            Op::CreateContainer { .. } => Some(CreateMode::Container),
            _ => None,
        }
    }

    /// Returns the payload carried by the request, if any.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Op::Create { data, .. } | Op::CreateContainer { data, .. } | Op::SetData { data, .. } => {
                Some(data)
            }
            _ => None,
        }
    }

    /// Returns the ACL carried by the request, if any.
    pub fn acl(&self) -> Option<&[Acl]> {
        match self {
            Op::Create { acl, .. } | Op::CreateContainer { acl, .. } => Some(acl),
            _ => None,
        }
    }

    /// Returns true if the request mutates the store.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Op::Check { .. })
    }
}

/// The raw outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    /// The node was created; carries the actual path (sequential suffix included).
    Create {
        /// Created path.
        path: String,
        /// Stat of the created node, when the store reported one.
        stat: Option<Stat>,
    },
    /// The node was deleted.
    Delete,
    /// The data was replaced.
    SetData {
        /// Stat after the update.
        stat: Stat,
    },
    /// The version check passed.
    Check,
    /// The request failed, or was not executed because its batch aborted.
    Error {
        /// Result code.
        code: ErrorCode,
    },
}

impl OpResult {
    /// Returns the error code for error results.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            OpResult::Error { code } => Some(*code),
            _ => None,
        }
    }
}
