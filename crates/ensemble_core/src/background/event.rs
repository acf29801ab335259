use crate::transaction::TransactionResult;
use ensemble_store::{ErrorCode, OpKind, Stat};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied value echoed back on the event.
pub type Context = Arc<dyn Any + Send + Sync>;

/// What kind of call produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A create or container create.
    Create,
    /// A delete or container delete.
    Delete,
    /// A data update.
    SetData,
    /// A version check.
    Check,
    /// A multi-operation transaction.
    Transaction,
}

impl From<OpKind> for EventType {
    fn from(kind: OpKind) -> Self {
        match kind {
            OpKind::Create | OpKind::CreateContainer => EventType::Create,
            OpKind::Delete | OpKind::DeleteContainer => EventType::Delete,
            OpKind::SetData => EventType::SetData,
            OpKind::Check => EventType::Check,
        }
    }
}

/// The outcome of one background call.
#[derive(Clone)]
pub struct Event {
    /// Kind of call.
    pub event_type: EventType,
    /// Failure code, `None` on success.
    pub code: Option<ErrorCode>,
    /// Path the caller gave, without namespace. `None` for transactions.
    pub path: Option<String>,
    /// Created path, for creates.
    pub name: Option<String>,
    /// Stat reported by the store.
    pub stat: Option<Stat>,
    /// The caller's context value.
    pub context: Option<Context>,
    /// Per-operation results, for transactions.
    pub op_results: Option<Vec<TransactionResult>>,
}

impl Event {
    pub(crate) fn new(event_type: EventType, path: Option<String>) -> Self {
        Self {
            event_type,
            code: None,
            path,
            name: None,
            stat: None,
            context: None,
            op_results: None,
        }
    }

    pub(crate) fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Returns true if the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.code.is_none()
    }

    /// Downcasts the context to `T`.
    pub fn context_as<T: Any>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|c| c.downcast_ref::<T>())
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("code", &self.code)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("stat", &self.stat)
            .field("has_context", &self.context.is_some())
            .field("op_results", &self.op_results)
            .finish()
    }
}
