//! Namespace prefixing of store paths.

use crate::error::{CoreError, CoreResult};
use ensemble_store::{path, Op};

/// A path prefix applied to every operation a framework submits.
///
/// Callers work with paths relative to the namespace; the store sees the
/// prefixed path. Result paths are stripped on the way back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    root: Option<String>,
}

impl Namespace {
    /// A namespace that leaves paths unchanged.
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a namespace such as `"app"` or `"app/region"`.
    pub fn new(name: &str) -> CoreResult<Self> {
        let trimmed = name.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::none());
        }
        let root = format!("/{trimmed}");
        path::validate_path(&root)
            .map_err(|_| CoreError::invalid_config(format!("invalid namespace: {name:?}")))?;
        Ok(Self { root: Some(root) })
    }

    /// Returns the namespace root path, if any.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Prefixes `path` with the namespace.
    pub fn fix(&self, path: &str) -> String {
        match &self.root {
            Some(root) if path == path::ROOT => root.clone(),
            Some(root) => path::join(root, path),
            None => path.to_string(),
        }
    }

    /// Strips the namespace from `path`.
    pub fn unfix(&self, path: &str) -> String {
        let Some(root) = &self.root else {
            return path.to_string();
        };
        if path == root {
            return path::ROOT.to_string();
        }
        match path.strip_prefix(root.as_str()) {
            Some(rest) if rest.starts_with('/') => rest.to_string(),
            _ => path.to_string(),
        }
    }

    /// Returns a copy of `op` targeting the prefixed path.
    pub fn fix_op(&self, op: &Op) -> Op {
        match &self.root {
            Some(_) => op.with_path(self.fix(op.path())),
            None => op.clone(),
        }
    }
}
