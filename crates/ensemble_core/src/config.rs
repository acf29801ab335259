//! Client configuration.

use crate::error::{CoreError, CoreResult};
use crate::namespace::Namespace;
use crate::retry::{ExponentialBackoffRetry, RetryPolicy, RetrySleeper, ThreadSleeper};
use crate::schema::SchemaSet;
use ensemble_store::Acl;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default base sleep for the default retry policy.
pub const DEFAULT_BASE_SLEEP: Duration = Duration::from_millis(100);

/// Default retry limit for the default retry policy.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Configuration for a [`Framework`](crate::Framework).
#[derive(Clone)]
pub struct ClientConfig {
    retry_policy: Arc<dyn RetryPolicy>,
    sleeper: Arc<dyn RetrySleeper>,
    schema_set: Arc<SchemaSet>,
    namespace: Option<String>,
    default_acl: Vec<Acl>,
    use_containers: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_policy: Arc::new(ExponentialBackoffRetry::new(
                DEFAULT_BASE_SLEEP,
                DEFAULT_MAX_RETRIES,
            )),
            sleeper: Arc::new(ThreadSleeper),
            schema_set: Arc::new(SchemaSet::permissive()),
            namespace: None,
            default_acl: Acl::open_unsafe(),
            use_containers: true,
        }
    }
}

impl ClientConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy for every store call.
    pub fn with_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets how foreground retries wait.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn RetrySleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Sets the schemas operations are validated against.
    pub fn with_schema_set(mut self, schema_set: SchemaSet) -> Self {
        self.schema_set = Arc::new(schema_set);
        self
    }

    /// Prefixes every path with `namespace`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the ACL used for creates that do not name one.
    pub fn with_default_acl(mut self, acl: Vec<Acl>) -> Self {
        self.default_acl = acl;
        self
    }

    /// Whether ensured paths are created as containers.
    pub fn with_containers(mut self, use_containers: bool) -> Self {
        self.use_containers = use_containers;
        self
    }

    /// The retry policy.
    pub fn retry_policy(&self) -> &Arc<dyn RetryPolicy> {
        &self.retry_policy
    }

    /// The retry sleeper.
    pub fn sleeper(&self) -> &Arc<dyn RetrySleeper> {
        &self.sleeper
    }

    /// The schemas.
    pub fn schema_set(&self) -> &SchemaSet {
        &self.schema_set
    }

    /// The configured namespace name.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The default ACL.
    pub fn default_acl(&self) -> &[Acl] {
        &self.default_acl
    }

    /// Whether ensured paths are containers.
    pub fn use_containers(&self) -> bool {
        self.use_containers
    }

    /// Checks the configuration and resolves the namespace.
    pub fn validate(&self) -> CoreResult<Namespace> {
        if self.default_acl.is_empty() {
            return Err(CoreError::invalid_config("default ACL must not be empty"));
        }
        match &self.namespace {
            Some(name) => Namespace::new(name),
            None => Ok(Namespace::none()),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("retry_policy", &self.retry_policy)
            .field("sleeper", &self.sleeper)
            .field("schemas", &self.schema_set.len())
            .field("namespace", &self.namespace)
            .field("default_acl", &self.default_acl)
            .field("use_containers", &self.use_containers)
            .finish()
    }
}
