//! # Hashing
//!
//! Content and commit hashes. Both are SHA-256 hex digests: file hashes
//! cover the raw bytes of one file, commit hashes cover the metadata
//! string `author + message + timestamp`.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Hash the raw bytes of a file and return the hex digest.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// let digest = bittrack::hash::hash_file(Path::new("notes.txt")).unwrap();
/// assert_eq!(digest.len(), 64);
/// ```
pub fn hash_file(path: &Path) -> Result<String> {
    let content = fs::read(path).map_err(|e| Error::io("hash_file", path, e))?;
    Ok(hash_bytes(&content))
}

/// Hash a byte slice and return the hex digest.
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Derive a commit hash from author, message, and timestamp.
///
/// The digest covers only commit metadata, not file contents, so the
/// same triple always produces the same hash.
pub fn commit_hash(author: &str, message: &str, timestamp: &str) -> String {
    let combined = format!("{}{}{}", author, message, timestamp);
    hash_bytes(combined.as_bytes())
}
