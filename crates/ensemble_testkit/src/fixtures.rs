//! Test fixtures pairing a store with a framework.

use crate::logging::init_test_logging;
use crate::recording::RecordingSleeper;
use ensemble_core::{ClientConfig, Framework, RetryNTimes};
use ensemble_store::{InMemoryStore, MemorySession};
use std::sync::Arc;
use std::time::Duration;

/// Retries allowed by [`test_config`].
pub const TEST_MAX_RETRIES: u32 = 5;

/// A configuration that retries quickly without real sleeps.
pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_retry_policy(Arc::new(RetryNTimes::new(
            TEST_MAX_RETRIES,
            Duration::from_millis(1),
        )))
        .with_sleeper(Arc::new(RecordingSleeper::default()))
}

/// An in-memory store with a framework connected to it.
pub struct TestCluster {
    /// The store, for inspection and fault injection.
    pub store: InMemoryStore,
    /// A framework over its own session.
    pub framework: Framework,
}

impl TestCluster {
    /// Creates a cluster with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a cluster with `config`.
    pub fn with_config(config: ClientConfig) -> Self {
        init_test_logging();
        let store = InMemoryStore::new();
        let session = store.connect().expect("Failed to open session");
        let framework = Framework::new(Arc::new(session), config)
            .expect("Failed to start framework");
        Self { store, framework }
    }

    /// Opens another framework over a new session on the same store.
    pub fn connect(&self, config: ClientConfig) -> Framework {
        Framework::new(Arc::new(self.session()), config).expect("Failed to start framework")
    }

    /// Opens a raw session on the same store.
    pub fn session(&self) -> MemorySession {
        self.store.connect().expect("Failed to open session")
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test against a fresh cluster.
///
/// # Example
///
/// ```rust
/// use ensemble_testkit::with_cluster;
///
/// with_cluster(|cluster| {
///     cluster.framework.ensure_path("/x").unwrap();
/// });
/// ```
pub fn with_cluster<F, R>(f: F) -> R
where
    F: FnOnce(&TestCluster) -> R,
{
    let cluster = TestCluster::new();
    f(&cluster)
}
