use ensemble_store::{Acl, CreateMode, Op, OpKind, ANY_VERSION};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a transaction operation, as reported in results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// A create, including container creates.
    Create,
    /// A delete, including container deletes.
    Delete,
    /// A data update.
    SetData,
    /// A version check.
    Check,
}

impl From<OpKind> for OperationType {
    fn from(kind: OpKind) -> Self {
        match kind {
            OpKind::Create | OpKind::CreateContainer => OperationType::Create,
            OpKind::Delete | OpKind::DeleteContainer => OperationType::Delete,
            OpKind::SetData => OperationType::SetData,
            OpKind::Check => OperationType::Check,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationType::Create => "create",
            OperationType::Delete => "delete",
            OperationType::SetData => "set_data",
            OperationType::Check => "check",
        };
        f.write_str(name)
    }
}

/// An operation's type and the path the caller gave it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeAndPath {
    /// Operation type.
    pub op_type: OperationType,
    /// Path as given by the caller, without any namespace.
    pub for_path: String,
}

/// One operation of a transaction. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOp {
    op: Op,
    type_and_path: TypeAndPath,
    explicit_acl: bool,
}

impl TransactionOp {
    fn new(op: Op, explicit_acl: bool) -> Self {
        let type_and_path = TypeAndPath {
            op_type: op.kind().into(),
            for_path: op.path().to_string(),
        };
        Self {
            op,
            type_and_path,
            explicit_acl,
        }
    }

    /// Starts a create of `path`.
    pub fn create(path: impl Into<String>) -> CreateBuilder {
        CreateBuilder::new(path.into(), false)
    }

    /// Starts a container create of `path`.
    pub fn create_container(path: impl Into<String>) -> CreateBuilder {
        CreateBuilder::new(path.into(), true)
    }

    /// Starts a delete of `path`.
    pub fn delete(path: impl Into<String>) -> DeleteBuilder {
        DeleteBuilder {
            path: path.into(),
            version: ANY_VERSION,
        }
    }

    /// Deletes the container at `path`.
    pub fn delete_container(path: impl Into<String>) -> TransactionOp {
        Self::new(Op::DeleteContainer { path: path.into() }, false)
    }

    /// Starts a data update of `path`.
    pub fn set_data(path: impl Into<String>, data: impl Into<Vec<u8>>) -> SetDataBuilder {
        SetDataBuilder {
            path: path.into(),
            data: data.into(),
            version: ANY_VERSION,
        }
    }

    /// Starts a version check of `path`.
    pub fn check(path: impl Into<String>) -> CheckBuilder {
        CheckBuilder {
            path: path.into(),
            version: ANY_VERSION,
        }
    }

    /// The store request, with the caller's path.
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// The operation's type and caller path.
    pub fn type_and_path(&self) -> &TypeAndPath {
        &self.type_and_path
    }

    /// Returns the store request with `default_acl` applied when the caller
    /// did not choose an ACL.
    pub(crate) fn resolved_op(&self, default_acl: &[Acl]) -> Op {
        if self.explicit_acl {
            return self.op.clone();
        }
        match &self.op {
            Op::Create {
                path, data, mode, ..
            } => Op::Create {
                path: path.clone(),
                data: data.clone(),
                acl: default_acl.to_vec(),
                mode: *mode,
            },
            Op::CreateContainer { path, data, .. } => Op::CreateContainer {
                path: path.clone(),
                data: data.clone(),
                acl: default_acl.to_vec(),
            },
            other => other.clone(),
        }
    }
}

/// Builder for create operations.
#[derive(Debug, Clone)]
pub struct CreateBuilder {
    path: String,
    data: Vec<u8>,
    mode: CreateMode,
    acl: Option<Vec<Acl>>,
    container: bool,
}

impl CreateBuilder {
    fn new(path: String, container: bool) -> Self {
        Self {
            path,
            data: Vec::new(),
            mode: if container {
                CreateMode::Container
            } else {
                CreateMode::Persistent
            },
            acl: None,
            container,
        }
    }

    /// Sets the initial payload.
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Sets the create mode. Ignored for container creates.
    pub fn with_mode(mut self, mode: CreateMode) -> Self {
        if !self.container {
            self.mode = mode;
        }
        self
    }

    /// Sets the ACL. Without this the client's default ACL is used.
    pub fn with_acl(mut self, acl: Vec<Acl>) -> Self {
        self.acl = Some(acl);
        self
    }

    /// Builds the operation.
    pub fn build(self) -> TransactionOp {
        let explicit_acl = self.acl.is_some();
        let acl = self.acl.unwrap_or_default();
        let op = if self.container || self.mode.is_container() {
            Op::CreateContainer {
                path: self.path,
                data: self.data,
                acl,
            }
        } else {
            Op::Create {
                path: self.path,
                data: self.data,
                acl,
                mode: self.mode,
            }
        };
        TransactionOp::new(op, explicit_acl)
    }
}

/// Builder for delete operations.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    path: String,
    version: i32,
}

impl DeleteBuilder {
    /// Only delete if the node has this version.
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Builds the operation.
    pub fn build(self) -> TransactionOp {
        TransactionOp::new(
            Op::Delete {
                path: self.path,
                version: self.version,
            },
            false,
        )
    }
}

/// Builder for data updates.
#[derive(Debug, Clone)]
pub struct SetDataBuilder {
    path: String,
    data: Vec<u8>,
    version: i32,
}

impl SetDataBuilder {
    /// Only update if the node has this version.
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Builds the operation.
    pub fn build(self) -> TransactionOp {
        TransactionOp::new(
            Op::SetData {
                path: self.path,
                data: self.data,
                version: self.version,
            },
            false,
        )
    }
}

/// Builder for version checks.
#[derive(Debug, Clone)]
pub struct CheckBuilder {
    path: String,
    version: i32,
}

impl CheckBuilder {
    /// Requires this version.
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Builds the operation.
    pub fn build(self) -> TransactionOp {
        TransactionOp::new(
            Op::Check {
                path: self.path,
                version: self.version,
            },
            false,
        )
    }
}
