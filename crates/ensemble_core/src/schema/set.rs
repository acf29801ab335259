use super::definition::{PathMatcher, Schema, SchemaDefinition};
use super::violation::SchemaViolation;
use crate::error::{CoreError, CoreResult};
use ensemble_store::Op;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// The schemas configured for a client.
///
/// Built once at configuration time and read-only afterwards. Lookup order is
/// exact paths, then patterns in registration order, then the default schema.
#[derive(Debug, Clone)]
pub struct SchemaSet {
    exact: HashMap<String, Schema>,
    patterns: Vec<Schema>,
    default_schema: Option<Schema>,
}

impl Default for SchemaSet {
    fn default() -> Self {
        Self::permissive()
    }
}

impl SchemaSet {
    /// A set with no schemas; every path gets the permissive default.
    pub fn permissive() -> Self {
        Self::new(Vec::new())
    }

    /// Creates a set that falls back to the permissive default schema.
    ///
    /// A later exact schema for the same path replaces an earlier one.
    pub fn new(schemas: impl IntoIterator<Item = Schema>) -> Self {
        let mut exact = HashMap::new();
        let mut patterns = Vec::new();
        for schema in schemas {
            match schema.matcher() {
                PathMatcher::Exact(path) => {
                    exact.insert(path.clone(), schema);
                }
                PathMatcher::Pattern(_) | PathMatcher::Any => patterns.push(schema),
            }
        }
        Self {
            exact,
            patterns,
            default_schema: Some(Schema::default_schema()),
        }
    }

    /// Makes unmatched paths a validation error instead of using the default.
    pub fn without_default_schema(mut self) -> Self {
        self.default_schema = None;
        self
    }

    /// Returns true if unmatched paths get the default schema.
    pub fn uses_default_schema(&self) -> bool {
        self.default_schema.is_some()
    }

    /// Parses a JSON array of schema definitions.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let definitions: Vec<SchemaDefinition> = serde_json::from_str(json)?;
        let schemas = definitions
            .into_iter()
            .map(SchemaDefinition::into_schema)
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self::new(schemas))
    }

    /// Loads a JSON schema file.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let json = fs::read_to_string(path.as_ref()).map_err(CoreError::Io)?;
        Self::from_json(&json)
    }

    /// Number of configured schemas, excluding the default.
    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    /// Returns true if no schemas are configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the schema for `path`.
    pub fn resolve(&self, path: &str) -> Result<&Schema, SchemaViolation> {
        if let Some(schema) = self.exact.get(path) {
            return Ok(schema);
        }
        self.patterns
            .iter()
            .find(|s| s.matcher().matches(path))
            .or(self.default_schema.as_ref())
            .ok_or_else(|| SchemaViolation::no_schema(path))
    }

    /// Validates one store request against the schema for its own path.
    pub fn validate_op(&self, op: &Op) -> Result<(), SchemaViolation> {
        self.validate_op_for(op.path(), op)
    }

    /// Validates `op` against the schema for `path`.
    ///
    /// The framework passes the caller's path here, so schemas are written
    /// without the namespace prefix even though `op` carries it.
    pub fn validate_op_for(&self, path: &str, op: &Op) -> Result<(), SchemaViolation> {
        let schema = self.resolve(path)?;
        match op {
            Op::Create {
                data, acl, mode, ..
            } => schema.validate_create(*mode, path, data, acl),
            Op::CreateContainer { data, acl, .. } => {
                schema.validate_create(ensemble_store::CreateMode::Container, path, data, acl)
            }
            Op::Delete { .. } | Op::DeleteContainer { .. } => schema.validate_delete(path),
            Op::SetData { data, .. } => schema.validate_general(path, data, None),
            Op::Check { .. } => Ok(()),
        }
    }
}
