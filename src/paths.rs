//! # Repository Paths
//!
//! A normalized, repository-relative path. Normalization strips a
//! leading `./`, unifies separators to `/`, and collapses duplicate
//! separators. Absolute paths, `..` components, and NUL bytes are
//! rejected at parse time so downstream code never re-validates.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A validated path relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoPath(String);

impl RepoPath {
    /// Parse and normalize a user-supplied path.
    pub fn parse(raw: &str, context: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::validation("path is empty", context));
        }
        if raw.contains('\0') {
            return Err(Error::validation("path contains a NUL byte", context));
        }

        let unified = raw.replace('\\', "/");
        if unified.starts_with('/') {
            return Err(Error::validation(
                format!("absolute paths are not allowed: {}", raw),
                context,
            ));
        }

        let mut components = Vec::new();
        for part in unified.split('/') {
            match part {
                "" | "." => continue,
                ".." => {
                    return Err(Error::validation(
                        format!("path may not contain '..': {}", raw),
                        context,
                    ));
                }
                other => components.push(other),
            }
        }

        if components.is_empty() {
            return Err(Error::validation(format!("invalid path: {}", raw), context));
        }

        Ok(Self(components.join("/")))
    }

    /// Build from a path already known to be inside the root.
    pub fn from_relative(path: &Path, context: &str) -> Result<Self> {
        Self::parse(&path.to_string_lossy(), context)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve against a repository root.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
