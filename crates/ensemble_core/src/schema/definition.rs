use super::violation::SchemaViolation;
use crate::error::{CoreError, CoreResult};
use ensemble_store::{Acl, CreateMode, Perms};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Name of the permissive schema used for unmatched paths.
pub const DEFAULT_SCHEMA_NAME: &str = "__default__";

/// Whether a node property is allowed, required or forbidden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allowance {
    /// Either is fine.
    #[default]
    Can,
    /// The property is required.
    Must,
    /// The property is forbidden.
    Cannot,
}

impl Allowance {
    fn check(self, has_property: bool, property: &str) -> Result<(), String> {
        match (self, has_property) {
            (Allowance::Must, false) => Err(format!("must be {property}")),
            (Allowance::Cannot, true) => Err(format!("cannot be {property}")),
            _ => Ok(()),
        }
    }
}

/// Constraint on node payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DataValidator {
    /// Any payload.
    #[default]
    Any,
    /// At most this many bytes.
    MaxLength(usize),
    /// Valid UTF-8.
    Utf8,
    /// A valid JSON document.
    Json,
    /// Every inner validator must pass.
    All(Vec<DataValidator>),
}

impl DataValidator {
    /// Checks `data`, describing the failure.
    pub fn validate(&self, data: &[u8]) -> Result<(), String> {
        match self {
            DataValidator::Any => Ok(()),
            DataValidator::MaxLength(max) if data.len() > *max => Err(format!(
                "data is {} bytes, limit is {max}",
                data.len()
            )),
            DataValidator::MaxLength(_) => Ok(()),
            DataValidator::Utf8 => std::str::from_utf8(data)
                .map(|_| ())
                .map_err(|e| format!("data is not UTF-8: {e}")),
            DataValidator::Json => serde_json::from_slice::<serde_json::Value>(data)
                .map(|_| ())
                .map_err(|e| format!("data is not JSON: {e}")),
            DataValidator::All(inner) => inner.iter().try_for_each(|v| v.validate(data)),
        }
    }
}

/// Payload format named in a schema file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// No format check.
    #[default]
    Any,
    /// UTF-8 text.
    Utf8,
    /// JSON.
    Json,
}

/// Constraint on the ACL a node is created with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclPolicy {
    /// Any ACL.
    #[default]
    Any,
    /// At least one entry.
    NonEmpty,
    /// No entry may grant write access to everyone.
    NoWorldWrite,
}

impl AclPolicy {
    fn validate(self, acl: &[Acl]) -> Result<(), String> {
        match self {
            AclPolicy::Any => Ok(()),
            AclPolicy::NonEmpty if acl.is_empty() => Err("ACL must not be empty".into()),
            AclPolicy::NonEmpty => Ok(()),
            AclPolicy::NoWorldWrite => {
                if acl
                    .iter()
                    .any(|a| a.id.is_anyone() && a.perms.contains(Perms::WRITE))
                {
                    Err("ACL must not grant world write".into())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// How a schema selects the paths it applies to.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// One exact path.
    Exact(String),
    /// Every path the whole regex matches.
    Pattern(Regex),
    /// Every path.
    Any,
}

impl PathMatcher {
    /// Compiles a pattern matcher anchored at both ends.
    pub fn pattern(pattern: &str) -> CoreResult<Self> {
        Regex::new(&format!("^(?:{pattern})$"))
            .map(PathMatcher::Pattern)
            .map_err(|e| CoreError::invalid_config(format!("bad schema pattern {pattern:?}: {e}")))
    }

    /// Returns true if `path` is covered.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Exact(exact) => exact == path,
            PathMatcher::Pattern(regex) => regex.is_match(path),
            PathMatcher::Any => true,
        }
    }
}

/// Validation rules for a set of paths.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    matcher: PathMatcher,
    documentation: String,
    ephemeral: Allowance,
    sequential: Allowance,
    can_be_deleted: bool,
    data: DataValidator,
    acl_policy: AclPolicy,
}

impl Schema {
    /// Starts a schema for one exact path.
    pub fn for_path(name: impl Into<String>, path: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name.into(), PathMatcher::Exact(path.into()))
    }

    /// Starts a schema for every path matching `pattern`.
    pub fn for_pattern(name: impl Into<String>, pattern: &str) -> CoreResult<SchemaBuilder> {
        Ok(SchemaBuilder::new(name.into(), PathMatcher::pattern(pattern)?))
    }

    /// The schema that allows everything.
    pub fn default_schema() -> Schema {
        SchemaBuilder::new(DEFAULT_SCHEMA_NAME.into(), PathMatcher::Any)
            .with_documentation("default schema")
            .build()
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path matcher.
    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    /// Free-form description.
    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    /// Whether matching nodes may be deleted.
    pub fn can_be_deleted(&self) -> bool {
        self.can_be_deleted
    }

    /// Validates a create request.
    pub fn validate_create(
        &self,
        mode: CreateMode,
        path: &str,
        data: &[u8],
        acl: &[Acl],
    ) -> Result<(), SchemaViolation> {
        self.ephemeral
            .check(mode.is_ephemeral(), "ephemeral")
            .and_then(|()| self.sequential.check(mode.is_sequential(), "sequential"))
            .map_err(|reason| self.violation(path, reason))?;
        self.validate_general(path, data, Some(acl))
    }

    /// Validates a delete request.
    pub fn validate_delete(&self, path: &str) -> Result<(), SchemaViolation> {
        if self.can_be_deleted {
            Ok(())
        } else {
            Err(self.violation(path, "cannot be deleted"))
        }
    }

    /// Validates a payload and, when given, an ACL.
    pub fn validate_general(
        &self,
        path: &str,
        data: &[u8],
        acl: Option<&[Acl]>,
    ) -> Result<(), SchemaViolation> {
        self.data
            .validate(data)
            .and_then(|()| acl.map_or(Ok(()), |acl| self.acl_policy.validate(acl)))
            .map_err(|reason| self.violation(path, reason))
    }

    fn violation(&self, path: &str, reason: impl Into<String>) -> SchemaViolation {
        SchemaViolation::new(self.name.clone(), path, reason)
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    fn new(name: String, matcher: PathMatcher) -> Self {
        Self {
            schema: Schema {
                name,
                matcher,
                documentation: String::new(),
                ephemeral: Allowance::Can,
                sequential: Allowance::Can,
                can_be_deleted: true,
                data: DataValidator::Any,
                acl_policy: AclPolicy::Any,
            },
        }
    }

    /// Sets the description.
    pub fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        self.schema.documentation = documentation.into();
        self
    }

    /// Sets whether nodes may, must or cannot be ephemeral.
    pub fn with_ephemeral(mut self, allowance: Allowance) -> Self {
        self.schema.ephemeral = allowance;
        self
    }

    /// Sets whether nodes may, must or cannot be sequential.
    pub fn with_sequential(mut self, allowance: Allowance) -> Self {
        self.schema.sequential = allowance;
        self
    }

    /// Sets whether nodes may be deleted.
    pub fn with_can_be_deleted(mut self, can_be_deleted: bool) -> Self {
        self.schema.can_be_deleted = can_be_deleted;
        self
    }

    /// Sets the payload validator.
    pub fn with_data_validator(mut self, validator: DataValidator) -> Self {
        self.schema.data = validator;
        self
    }

    /// Sets the ACL policy.
    pub fn with_acl_policy(mut self, policy: AclPolicy) -> Self {
        self.schema.acl_policy = policy;
        self
    }

    /// Builds the schema.
    pub fn build(self) -> Schema {
        self.schema
    }
}

fn default_true() -> bool {
    true
}

/// Serialized form of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDefinition {
    /// Schema name.
    pub name: String,
    /// Exact path; exclusive with `pattern`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Path regex; exclusive with `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub documentation: String,
    /// Ephemeral allowance.
    #[serde(default)]
    pub ephemeral: Allowance,
    /// Sequential allowance.
    #[serde(default)]
    pub sequential: Allowance,
    /// Whether nodes may be deleted.
    #[serde(default = "default_true")]
    pub can_be_deleted: bool,
    /// Payload size limit in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_data_len: Option<usize>,
    /// Payload format.
    #[serde(default)]
    pub data_format: DataFormat,
    /// ACL policy.
    #[serde(default)]
    pub acl_policy: AclPolicy,
}

impl SchemaDefinition {
    /// Converts the definition into a schema.
    pub fn into_schema(self) -> CoreResult<Schema> {
        let builder = match (self.path, self.pattern) {
            (Some(path), None) => Schema::for_path(self.name, path),
            (None, Some(pattern)) => Schema::for_pattern(self.name, &pattern)?,
            _ => {
                return Err(CoreError::invalid_config(format!(
                    "schema '{}' needs exactly one of path or pattern",
                    self.name
                )))
            }
        };

        let mut validators = Vec::new();
        if let Some(max) = self.max_data_len {
            validators.push(DataValidator::MaxLength(max));
        }
        match self.data_format {
            DataFormat::Any => {}
            DataFormat::Utf8 => validators.push(DataValidator::Utf8),
            DataFormat::Json => validators.push(DataValidator::Json),
        }
        let data = match validators.len() {
            0 => DataValidator::Any,
            1 => validators.remove(0),
            _ => DataValidator::All(validators),
        };

        Ok(builder
            .with_documentation(self.documentation)
            .with_ephemeral(self.ephemeral)
            .with_sequential(self.sequential)
            .with_can_be_deleted(self.can_be_deleted)
            .with_data_validator(data)
            .with_acl_policy(self.acl_policy)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_store::Id;

    #[test]
    fn ephemeral_allowance() {
        let schema = Schema::for_path("s", "/a")
            .with_ephemeral(Allowance::Must)
            .build();
        let acl = Acl::open_unsafe();
        assert!(schema
            .validate_create(CreateMode::Ephemeral, "/a", b"", &acl)
            .is_ok());
        let err = schema
            .validate_create(CreateMode::Persistent, "/a", b"", &acl)
            .unwrap_err();
        assert_eq!(err.reason, "must be ephemeral");
        assert_eq!(err.schema, "s");
    }

    #[test]
    fn sequential_cannot() {
        let schema = Schema::for_path("s", "/a")
            .with_sequential(Allowance::Cannot)
            .build();
        let err = schema
            .validate_create(CreateMode::EphemeralSequential, "/a", b"", &[])
            .unwrap_err();
        assert_eq!(err.reason, "cannot be sequential");
    }

    #[test]
    fn delete_policy() {
        let schema = Schema::for_path("s", "/a")
            .with_can_be_deleted(false)
            .build();
        assert!(schema.validate_delete("/a").is_err());
        assert!(Schema::default_schema().validate_delete("/a").is_ok());
    }

    #[test]
    fn data_validators() {
        assert!(DataValidator::MaxLength(3).validate(b"abc").is_ok());
        assert!(DataValidator::MaxLength(3).validate(b"abcd").is_err());
        assert!(DataValidator::Utf8.validate(&[0xff, 0xfe]).is_err());
        assert!(DataValidator::Json.validate(br#"{"a":1}"#).is_ok());
        assert!(DataValidator::Json.validate(b"{").is_err());
        let all = DataValidator::All(vec![DataValidator::MaxLength(10), DataValidator::Json]);
        assert!(all.validate(b"[1,2]").is_ok());
        assert!(all.validate(b"[1,2,3,4,5,6]").is_err());
    }

    #[test]
    fn acl_policies() {
        let open = Acl::open_unsafe();
        let read_only = Acl::read_unsafe();
        let digest = vec![Acl::new(Perms::ALL, Id::new("digest", "bob:x"))];
        assert!(AclPolicy::NoWorldWrite.validate(&open).is_err());
        assert!(AclPolicy::NoWorldWrite.validate(&read_only).is_ok());
        assert!(AclPolicy::NoWorldWrite.validate(&digest).is_ok());
        assert!(AclPolicy::NonEmpty.validate(&[]).is_err());
    }

    #[test]
    fn set_data_skips_acl() {
        let schema = Schema::for_path("s", "/a")
            .with_acl_policy(AclPolicy::NonEmpty)
            .build();
        assert!(schema.validate_general("/a", b"", None).is_ok());
        assert!(schema.validate_general("/a", b"", Some(&[])).is_err());
    }

    #[test]
    fn pattern_matches_whole_path() {
        let matcher = PathMatcher::pattern("/locks/[^/]+").unwrap();
        assert!(matcher.matches("/locks/a"));
        assert!(!matcher.matches("/locks/a/b"));
        assert!(!matcher.matches("/x/locks/a"));
        assert!(PathMatcher::pattern("(").is_err());
    }

    #[test]
    fn definition_requires_one_matcher() {
        let def = SchemaDefinition {
            name: "bad".into(),
            path: None,
            pattern: None,
            documentation: String::new(),
            ephemeral: Allowance::Can,
            sequential: Allowance::Can,
            can_be_deleted: true,
            max_data_len: None,
            data_format: DataFormat::Any,
            acl_policy: AclPolicy::Any,
        };
        assert!(matches!(
            def.into_schema(),
            Err(CoreError::InvalidConfig { .. })
        ));
    }
}
