//! # ensemble testkit
//!
//! Test utilities for ensemble.
//!
//! This crate provides:
//! - Fixtures pairing an in-memory store with a framework
//! - Property-based test generators using proptest
//! - Recording callbacks, listeners and sleepers
//! - Log initialization for tests
//!
//! ## Usage
//!
//! ```rust
//! use ensemble_testkit::prelude::*;
//!
//! with_cluster(|cluster| {
//!     cluster.framework.ensure_path("/a/b").unwrap();
//!     assert!(cluster.store.exists("/a/b"));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::recording::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use recording::*;
