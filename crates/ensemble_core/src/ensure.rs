//! Idempotent creation of node hierarchies.
//!
//! A [`PathEnsurer`] remembers which paths it has already ensured and never
//! contacts the store for them again. This is an "ensure once" cache: a node
//! deleted after it was ensured is not recreated by the same ensurer.

use crate::config::ClientConfig;
use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use crate::retry::{RetryLoop, RetryPolicy, RetrySleeper};
use ensemble_store::{path, Acl, CreateMode, ErrorCode, Op, StoreClient, StoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Creates paths, including missing ancestors, at most once per instance.
pub struct PathEnsurer {
    client: Arc<dyn StoreClient>,
    policy: Arc<dyn RetryPolicy>,
    sleeper: Arc<dyn RetrySleeper>,
    namespace: Namespace,
    acl: Vec<Acl>,
    use_containers: bool,
    entries: Mutex<HashMap<String, Arc<Mutex<bool>>>>,
}

impl PathEnsurer {
    /// Creates an ensurer with an empty cache.
    pub fn new(client: Arc<dyn StoreClient>, config: &ClientConfig, namespace: Namespace) -> Self {
        Self {
            client,
            policy: Arc::clone(config.retry_policy()),
            sleeper: Arc::clone(config.sleeper()),
            namespace,
            acl: config.default_acl().to_vec(),
            use_containers: config.use_containers(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Makes sure `path` and its ancestors have been created.
    ///
    /// Returns immediately if this instance already ensured `path`.
    /// Concurrent calls for the same path wait for the first to finish.
    pub fn ensure(&self, path: &str) -> CoreResult<()> {
        self.ensure_with(path, |target| {
            RetryLoop::call_with_retry(
                self.policy.as_ref(),
                self.sleeper.as_ref(),
                "ensure_path",
                |_| self.create_hierarchy(target),
            )
        })
    }

    /// Like [`PathEnsurer::ensure`], but makes a single attempt.
    ///
    /// Store failures come back as [`CoreError::Store`] so the caller can
    /// schedule its own retry.
    pub(crate) fn ensure_once(&self, path: &str) -> CoreResult<()> {
        self.ensure_with(path, |target| {
            self.create_hierarchy(target).map_err(CoreError::Store)
        })
    }

    fn ensure_with(
        &self,
        path: &str,
        create: impl FnOnce(&str) -> CoreResult<()>,
    ) -> CoreResult<()> {
        path::validate_path(path).map_err(|e| CoreError::invalid_argument(e.to_string()))?;

        let entry = Arc::clone(self.entries.lock().entry(path.to_string()).or_default());
        let mut ensured = entry.lock();
        if *ensured {
            return Ok(());
        }

        create(&self.namespace.fix(path))?;
        *ensured = true;
        debug!(path, "path ensured");
        Ok(())
    }

    /// Returns true if `path` has been ensured by this instance.
    pub fn is_ensured(&self, path: &str) -> bool {
        let entry = self.entries.lock().get(path).cloned();
        entry.map(|entry| *entry.lock()).unwrap_or(false)
    }

    /// Paths ensured so far, sorted.
    pub fn ensured_paths(&self) -> Vec<String> {
        let entries: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(path, entry)| (path.clone(), Arc::clone(entry)))
            .collect();
        let mut paths: Vec<String> = entries
            .into_iter()
            .filter(|(_, entry)| *entry.lock())
            .map(|(path, _)| path)
            .collect();
        paths.sort();
        paths
    }

    fn create_hierarchy(&self, target: &str) -> StoreResult<()> {
        for node in path::prefixes(target) {
            let op = if self.use_containers {
                Op::CreateContainer {
                    path: node.clone(),
                    data: Vec::new(),
                    acl: self.acl.clone(),
                }
            } else {
                Op::Create {
                    path: node.clone(),
                    data: Vec::new(),
                    acl: self.acl.clone(),
                    mode: CreateMode::Persistent,
                }
            };

            let Err(err) = self.client.submit(&op) else {
                continue;
            };
            match err.code() {
                ErrorCode::NodeExists => {}
                ErrorCode::NoAuth => {
                    if self.client.exists(&node)?.is_none() {
                        return Err(err);
                    }
                    warn!(path = %node, "no create permission but node exists");
                }
                _ => return Err(err),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PathEnsurer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathEnsurer")
            .field("namespace", &self.namespace)
            .field("use_containers", &self.use_containers)
            .field("ensured", &self.ensured_paths().len())
            .finish()
    }
}

/// Ensures one fixed path, once.
#[derive(Debug)]
pub struct EnsureContainers {
    ensurer: PathEnsurer,
    path: String,
}

impl EnsureContainers {
    /// Creates the helper with its own cache.
    pub fn new(ensurer: PathEnsurer, path: impl Into<String>) -> Self {
        Self {
            ensurer,
            path: path.into(),
        }
    }

    /// The path this helper ensures.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Creates the path if this helper has not done so yet.
    pub fn ensure(&self) -> CoreResult<()> {
        self.ensurer.ensure(&self.path)
    }

    pub(crate) fn ensure_once(&self) -> CoreResult<()> {
        self.ensurer.ensure_once(&self.path)
    }

    /// Returns true once the path has been ensured.
    pub fn is_ensured(&self) -> bool {
        self.ensurer.is_ensured(&self.path)
    }
}
