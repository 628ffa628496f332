//! # Commit Engine
//!
//! Builds commit records from the staged set, stores snapshots in the
//! object store, and advances the branch tip. A commit record is a
//! plain-text file under `commits/<hash>`:
//!
//! ```text
//! Author: <author>
//! Branch: <branch>
//! Parent: <hash>          (zero or more, two for merges)
//! Timestamp: <YYYY-MM-DD HH:MM:SS>
//! Message: <message>
//! Files:
//! <path> <hash>
//! ```
//!
//! The commit hash covers author, message, and timestamp only, so the
//! record and the snapshot can be written after the hash is known.

use std::collections::BTreeMap;

use chrono::Local;

use crate::error::{Error, ErrorKind, Result, Severity};
use crate::index::Index;
use crate::paths::RepoPath;
use crate::{hash, objects, read_text, refs, write_text, Repository};

/// Longest accepted commit message, in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// An immutable commit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub branch: String,
    pub parents: Vec<String>,
    pub timestamp: String,
    pub message: String,
    /// Tracked path to blob hash.
    pub files: BTreeMap<String, String>,
}

impl CommitRecord {
    /// Render the on-disk record format.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Author: {}\n", self.author));
        out.push_str(&format!("Branch: {}\n", self.branch));
        for parent in &self.parents {
            out.push_str(&format!("Parent: {}\n", parent));
        }
        out.push_str(&format!("Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("Message: {}\n", self.message));
        out.push_str("Files:\n");
        for (path, file_hash) in &self.files {
            out.push_str(&format!("{} {}\n", path, file_hash));
        }
        out
    }

    /// Parse a record read from `commits/<hash>`.
    pub fn parse(hash: &str, content: &str) -> Result<Self> {
        let mut author = String::new();
        let mut branch = String::new();
        let mut parents = Vec::new();
        let mut timestamp = String::new();
        let mut message = String::new();
        let mut files = BTreeMap::new();
        let mut in_files = false;

        for line in content.lines() {
            if in_files {
                let mut parts = line.split_whitespace();
                if let (Some(path), Some(file_hash)) = (parts.next(), parts.next()) {
                    files.insert(path.to_string(), file_hash.to_string());
                }
            } else if let Some(rest) = line.strip_prefix("Author: ") {
                author = rest.to_string();
            } else if let Some(rest) = line.strip_prefix("Branch: ") {
                branch = rest.to_string();
            } else if let Some(rest) = line.strip_prefix("Parent: ") {
                parents.push(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("Timestamp: ") {
                timestamp = rest.to_string();
            } else if let Some(rest) = line.strip_prefix("Message: ") {
                message = rest.to_string();
            } else if line == "Files:" {
                in_files = true;
            }
        }

        if author.is_empty() || branch.is_empty() {
            return Err(Error::corrupted(
                format!("commit record {} is malformed", hash),
                "parse_commit",
            ));
        }

        Ok(Self {
            hash: hash.to_string(),
            author,
            branch,
            parents,
            timestamp,
            message,
            files,
        })
    }

    /// Load a record by hash.
    pub fn read(repo: &Repository, hash: &str) -> Result<Self> {
        let path = repo.commits_dir().join(hash);
        if !path.is_file() {
            return Err(Error::not_found(
                format!("commit {} not found", hash),
                "read_commit",
            ));
        }
        Self::parse(hash, &read_text(&path)?)
    }

    pub fn exists(repo: &Repository, hash: &str) -> bool {
        repo.commits_dir().join(hash).is_file()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() >= 2
    }
}

/// Current local time in the record format.
pub fn local_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Create a commit from the staged set on the current branch.
///
/// The parent is the branch tip, if any. Fails while a merge is in
/// progress.
pub fn commit_changes(repo: &Repository, author: &str, message: &str) -> Result<String> {
    if repo.merge_head_path().exists() {
        return Err(Error::state(
            "a merge is in progress; resolve it or abort before committing",
            "commit",
        ));
    }

    let branch = refs::current_branch(repo)?;
    let parents = match refs::branch_tip(repo, &branch)? {
        Some(tip) => vec![tip],
        None => Vec::new(),
    };

    commit_with_parents(repo, author, message, parents)
}

/// Create a commit with an explicit parent list. Used directly by the
/// merge engine to record both sides of a merge.
pub fn commit_with_parents(
    repo: &Repository,
    author: &str,
    message: &str,
    parents: Vec<String>,
) -> Result<String> {
    validate_author(author)?;
    validate_message(message)?;

    let index = Index::load(repo)?;
    if index.is_empty() {
        return Err(Error::state("no files staged", "commit"));
    }

    let branch = refs::current_branch(repo)?;
    let timestamp = local_timestamp();
    let commit_hash = hash::commit_hash(author, message, &timestamp);

    // Snapshot every staged path, re-reading the working tree so the
    // stored blob and the recorded hash always agree.
    let mut files = BTreeMap::new();
    for (path_str, _) in index.entries() {
        let path = RepoPath::parse(path_str, "commit")?;
        objects::store_snapshot(repo, &branch, &commit_hash, &path)?;
        let fresh = hash::hash_file(&path.to_path(&repo.root))?;
        files.insert(path_str.to_string(), fresh);
    }

    let record = CommitRecord {
        hash: commit_hash.clone(),
        author: author.to_string(),
        branch: branch.clone(),
        parents,
        timestamp,
        message: message.to_string(),
        files,
    };
    write_text(&repo.commits_dir().join(&commit_hash), &record.serialize())?;

    refs::prepend_history(repo, &commit_hash, &branch)?;
    refs::set_branch_tip(repo, &branch, &commit_hash)?;

    // Only emptied once every preceding step has succeeded.
    Index::clear(repo)?;

    Ok(commit_hash)
}

fn validate_author(author: &str) -> Result<()> {
    if author.trim().is_empty() {
        return Err(Error::validation("author cannot be empty", "commit"));
    }
    Ok(())
}

fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(Error::validation("commit message cannot be empty", "commit"));
    }
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(Error::new(
            ErrorKind::Validation,
            format!("commit message exceeds {} characters", MAX_MESSAGE_LEN),
            Severity::Warning,
            "commit",
        ));
    }
    Ok(())
}

/// Tip commit of the checked-out branch, if any.
pub fn current_commit(repo: &Repository) -> Result<Option<String>> {
    let branch = refs::current_branch(repo)?;
    refs::branch_tip(repo, &branch)
}

/// All commit records reachable from the history log, newest first.
///
/// Records whose file has been removed by maintenance are skipped.
pub fn history(repo: &Repository) -> Result<Vec<CommitRecord>> {
    let mut records = Vec::new();
    for (commit_hash, _branch) in refs::read_history(repo)? {
        if CommitRecord::exists(repo, &commit_hash) {
            records.push(CommitRecord::read(repo, &commit_hash)?);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index;
    use std::fs;
    use tempfile::tempdir;

    fn repo() -> (tempfile::TempDir, Repository) {
        let temp = tempdir().unwrap();
        let repo = Repository::init(temp.path(), "master").unwrap();
        (temp, repo)
    }

    fn stage_file(repo: &Repository, name: &str, content: &[u8]) {
        fs::write(repo.root.join(name), content).unwrap();
        index::stage(repo, name).unwrap();
    }

    #[test]
    fn test_commit_requires_staged_files() {
        let (_temp, repo) = repo();
        let err = commit_changes(&repo, "alice", "empty").unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
        assert_eq!(err.message, "no files staged");
    }

    #[test]
    fn test_commit_rejects_empty_author_and_message() {
        let (_temp, repo) = repo();
        stage_file(&repo, "a.txt", b"x");

        assert!(commit_changes(&repo, "", "msg").is_err());
        assert!(commit_changes(&repo, "alice", "").is_err());
    }

    #[test]
    fn test_message_length_boundary() {
        let (_temp, repo) = repo();
        stage_file(&repo, "a.txt", b"x");

        let long = "m".repeat(1001);
        let err = commit_changes(&repo, "alice", &long).unwrap_err();
        assert_eq!(err.severity, Severity::Warning);

        let exact = "m".repeat(1000);
        assert!(commit_changes(&repo, "alice", &exact).is_ok());
    }

    #[test]
    fn test_commit_writes_snapshot_record_and_tip() {
        let (_temp, repo) = repo();
        stage_file(&repo, "a.txt", b"hello\n");

        let commit_hash = commit_changes(&repo, "alice", "first").unwrap();

        // tip advanced
        assert_eq!(
            refs::branch_tip(&repo, "master").unwrap().as_deref(),
            Some(commit_hash.as_str())
        );

        // blob stored byte-for-byte
        let path = RepoPath::parse("a.txt", "t").unwrap();
        assert_eq!(
            objects::read_blob(&repo, "master", &commit_hash, &path).unwrap(),
            b"hello\n"
        );

        // record holds the content hash
        let record = CommitRecord::read(&repo, &commit_hash).unwrap();
        assert_eq!(record.author, "alice");
        assert_eq!(record.branch, "master");
        assert_eq!(record.files["a.txt"], hash::hash_bytes(b"hello\n"));
        assert!(record.parents.is_empty());

        // history gained a record and the index was emptied
        assert_eq!(refs::read_history(&repo).unwrap()[0].0, commit_hash);
        assert!(Index::load(&repo).unwrap().is_empty());
    }

    #[test]
    fn test_second_commit_has_parent() {
        let (_temp, repo) = repo();
        stage_file(&repo, "a.txt", b"one");
        let first = commit_changes(&repo, "alice", "first").unwrap();

        stage_file(&repo, "a.txt", b"two");
        let second = commit_changes(&repo, "alice", "second").unwrap();

        let record = CommitRecord::read(&repo, &second).unwrap();
        assert_eq!(record.parents, vec![first]);
    }

    #[test]
    fn test_record_roundtrip() {
        let record = CommitRecord {
            hash: "deadbeef".to_string(),
            author: "alice".to_string(),
            branch: "master".to_string(),
            parents: vec!["p1".to_string(), "p2".to_string()],
            timestamp: "2024-03-01 09:30:00".to_string(),
            message: "merge work".to_string(),
            files: BTreeMap::from([("a.txt".to_string(), "h1".to_string())]),
        };

        let parsed = CommitRecord::parse("deadbeef", &record.serialize()).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_merge());
    }

    #[test]
    fn test_record_starts_with_author_line() {
        let (_temp, repo) = repo();
        stage_file(&repo, "a.txt", b"x");
        let commit_hash = commit_changes(&repo, "alice", "first").unwrap();

        let content = fs::read_to_string(repo.commits_dir().join(&commit_hash)).unwrap();
        assert!(content.starts_with("Author: alice\n"));
        assert!(content.contains("Branch: master\n"));
    }

    #[test]
    fn test_commit_blocked_during_merge() {
        let (_temp, repo) = repo();
        stage_file(&repo, "a.txt", b"x");
        fs::write(repo.merge_head_path(), "a.txt\n").unwrap();

        let err = commit_changes(&repo, "alice", "msg").unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
    }

    #[test]
    fn test_empty_file_commit_produces_empty_blob() {
        let (_temp, repo) = repo();
        stage_file(&repo, "empty.txt", b"");

        let commit_hash = commit_changes(&repo, "alice", "empty file").unwrap();
        let path = RepoPath::parse("empty.txt", "t").unwrap();
        assert_eq!(
            objects::read_blob(&repo, "master", &commit_hash, &path).unwrap(),
            b""
        );
    }
}
