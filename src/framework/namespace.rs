use std::fmt;

use crate::path::concat_paths;

/// Root path prefix of every node a framework instance touches.
///
/// Built once from segments: each is trimmed of surrounding `/`, empty ones
/// are dropped, and the rest are joined under a single leading `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Namespace(concat_paths(segments))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute path of `path` under this namespace
    pub fn resolve(
        &self,
        path: &str,
    ) -> String {
        concat_paths([self.0.as_str(), path])
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Namespace("/".to_string())
    }
}

impl fmt::Display for Namespace {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}
