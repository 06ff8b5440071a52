//! Helpers for hierarchical node paths.

use crate::constants::PATH_SEPARATOR;

/// Joins path segments into an absolute path.
///
/// Each segment is trimmed of leading and trailing separators and empty
/// segments are dropped, so the result always has exactly one leading `/` and
/// no trailing one. No segments at all yields the root `/`.
pub fn concat_paths<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = segments
        .into_iter()
        .map(|s| s.as_ref().trim_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect();

    format!("{PATH_SEPARATOR}{}", parts.join(PATH_SEPARATOR))
}

/// Parent of an absolute path; `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == PATH_SEPARATOR || path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(PATH_SEPARATOR),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of an absolute path; empty for the root.
pub fn node_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Absolute, no trailing separator (except the root), no empty segments.
pub fn is_valid_path(path: &str) -> bool {
    if path == PATH_SEPARATOR {
        return true;
    }
    path.starts_with('/') && !path.ends_with('/') && !path.contains("//")
}
