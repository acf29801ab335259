//! The raw store client boundary.

use crate::error::StoreResult;
use crate::op::{Op, OpResult};
use crate::types::{Acl, Stat};

/// Completion handler for an asynchronous raw call.
///
/// Invoked exactly once, on the client's own I/O thread.
pub type Completion<T> = Box<dyn FnOnce(StoreResult<T>) + Send + 'static>;

/// A raw client for a hierarchical, consensus-backed store.
///
/// This trait abstracts connection management and wire encoding. The
/// coordination layer only relies on the properties documented here.
///
/// # Invariants
///
/// - `multi` and `multi_async` are atomic: either every request in the batch
///   takes effect or none does. An aborted batch reports
///   [`crate::StoreError::MultiAborted`] with one offending index.
/// - Failed single calls report [`crate::StoreError::Keeper`]; they never
///   return [`OpResult::Error`].
/// - Connection-class failures are reported with a retryable
///   [`crate::ErrorCode`]; the outcome of such a call is unknown to the client.
/// - Async completions run on the client's I/O thread and must not block.
pub trait StoreClient: Send + Sync {
    /// Submits a single request and waits for its result.
    fn submit(&self, op: &Op) -> StoreResult<OpResult>;

    /// Submits a single request; `completion` receives the result.
    fn submit_async(&self, op: Op, completion: Completion<OpResult>);

    /// Submits a batch atomically and waits for the ordered results.
    fn multi(&self, ops: &[Op]) -> StoreResult<Vec<OpResult>>;

    /// Submits a batch atomically; `completion` receives the ordered results.
    fn multi_async(&self, ops: Vec<Op>, completion: Completion<Vec<OpResult>>);

    /// Returns the stat of `path`, or `None` if it does not exist.
    ///
    /// Existence checks are not subject to ACLs.
    fn exists(&self, path: &str) -> StoreResult<Option<Stat>>;

    /// Returns the data and stat of `path`.
    fn get_data(&self, path: &str) -> StoreResult<(Vec<u8>, Stat)>;

    /// Returns the sorted child names of `path`.
    fn get_children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Replaces the ACL of `path` if its ACL version matches.
    fn set_acl(&self, path: &str, acl: &[Acl], version: i32) -> StoreResult<Stat>;

    /// Returns the session id of this client.
    fn session_id(&self) -> i64;

    /// Checks if the client is connected.
    fn is_connected(&self) -> bool;

    /// Closes the client and its session.
    fn close(&self) -> StoreResult<()>;
}
