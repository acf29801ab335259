//! Slash-delimited node path helpers.

use crate::error::{ErrorCode, StoreError, StoreResult};

/// The root path.
pub const ROOT: &str = "/";

/// Checks that `path` is a well-formed absolute node path.
///
/// A valid path starts with `/`, has no empty, `.` or `..` segments, has no
/// trailing slash (except the root itself) and contains no NUL characters.
pub fn validate_path(path: &str) -> StoreResult<()> {
    let malformed = || StoreError::keeper(ErrorCode::BadArguments, path);

    if !path.starts_with('/') {
        return Err(malformed());
    }
    if path == ROOT {
        return Ok(());
    }
    if path.ends_with('/') || path.contains('\0') {
        return Err(malformed());
    }
    for segment in path[1..].split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(malformed());
        }
    }
    Ok(())
}

/// Returns the parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the last segment of `path`.
pub fn node_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Joins a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    let child = child.trim_start_matches('/');
    if parent == ROOT || parent.is_empty() {
        format!("/{child}")
    } else if child.is_empty() {
        parent.to_string()
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), child)
    }
}

/// Returns every ancestor-or-self path of `path`, shallowest first.
///
/// `"/a/b/c"` yields `["/a", "/a/b", "/a/b/c"]`; the root yields nothing.
pub fn prefixes(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}
