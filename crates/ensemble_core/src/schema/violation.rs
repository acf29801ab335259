use thiserror::Error;

/// A constraint an operation failed to satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema '{schema}' rejected {path}: {reason}")]
pub struct SchemaViolation {
    /// Name of the schema that applied, empty if none matched.
    pub schema: String,
    /// Path being validated.
    pub path: String,
    /// The violated constraint.
    pub reason: String,
}

impl SchemaViolation {
    /// Creates a violation.
    pub fn new(schema: impl Into<String>, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// A violation for a path no schema covers.
    pub fn no_schema(path: impl Into<String>) -> Self {
        Self::new("", path, "no schema found")
    }
}
