//! # Ensemble Store
//!
//! Raw store client boundary for ensemble.
//!
//! This crate is the lowest layer: it describes what the coordination layer
//! needs from a consensus-backed hierarchical store, and nothing more.
//!
//! ## Design Principles
//!
//! - A store exposes blocking and callback-based calls per request
//! - Multi-op batches are atomic at the store
//! - Errors carry a result code that distinguishes connection loss
//!   (retryable) from session expiry and node-level conditions
//! - Clients must be `Send + Sync`
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - In-process tree with sessions, ACLs and fault injection
//!
//! ## Example
//!
//! ```rust
//! use ensemble_store::{Acl, CreateMode, InMemoryStore, Op, StoreClient};
//!
//! let store = InMemoryStore::new();
//! let client = store.connect().unwrap();
//! let results = client
//!     .multi(&[
//!         Op::Create {
//!             path: "/a".into(),
//!             data: Vec::new(),
//!             acl: Acl::open_unsafe(),
//!             mode: CreateMode::Persistent,
//!         },
//!         Op::Check { path: "/a".into(), version: 0 },
//!     ])
//!     .unwrap();
//! assert_eq!(results.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod memory;
mod op;
pub mod path;
mod types;

pub use client::{Completion, StoreClient};
pub use error::{ErrorCode, StoreError, StoreResult};
pub use memory::{Fault, FaultTiming, InMemoryStore, MemorySession, IO_THREAD_NAME};
pub use op::{Op, OpKind, OpResult, ANY_VERSION};
pub use types::{Acl, CreateMode, Id, Perms, Stat};
