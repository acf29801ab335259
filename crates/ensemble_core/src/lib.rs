//! # ensemble_core
//!
//! Reliable coordination primitives over a hierarchical store whose calls
//! are neither idempotent nor immune to connection loss.
//!
//! The crate provides:
//! - retry policies and a retry loop that only repeats connection-class failures
//! - schema validation of every operation before it reaches the store
//! - foreground and background execution with exactly-once callbacks
//! - atomic multi-operation transactions with results in submission order
//! - an "ensure once" protocol for creating node hierarchies
//!
//! ## Example
//!
//! ```rust
//! use ensemble_core::{Backgrounding, ClientConfig, Framework, TransactionOp};
//! use ensemble_store::InMemoryStore;
//! use std::sync::Arc;
//!
//! let store = InMemoryStore::new();
//! let framework = Framework::new(Arc::new(store.connect()?), ClientConfig::default())?;
//!
//! framework.ensure_path("/jobs")?;
//! let results = framework
//!     .transaction()
//!     .for_operations([
//!         TransactionOp::create("/jobs/1").with_data("queued").build(),
//!         TransactionOp::set_data("/jobs", "1").build(),
//!     ])?
//!     .completed()
//!     .unwrap_or_default();
//!
//! assert_eq!(results.len(), 2);
//! assert_eq!(results[0].result_path.as_deref(), Some("/jobs/1"));
//! assert!(store.exists("/jobs/1"));
//! # Ok::<(), ensemble_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod background;
mod config;
mod ensure;
mod error;
mod framework;
mod namespace;
pub mod retry;
pub mod schema;
pub mod transaction;

pub use background::{
    BackgroundCallback, Backgrounding, CallbackError, CallbackExecutor, Event, EventType,
    InlineExecutor, Submission, UnhandledErrorListener,
};
pub use config::{ClientConfig, DEFAULT_BASE_SLEEP, DEFAULT_MAX_RETRIES};
pub use ensure::{EnsureContainers, PathEnsurer};
pub use error::{CoreError, CoreResult};
pub use framework::Framework;
pub use namespace::Namespace;
pub use retry::{ExponentialBackoffRetry, RetryLoop, RetryNTimes, RetryPolicy, RetrySleeper};
pub use schema::{Schema, SchemaSet, SchemaViolation};
pub use transaction::{OperationType, TransactionOp, TransactionResult};
