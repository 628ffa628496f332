//! # Object Store
//!
//! Blobs live under `objects/<branch>/<commit>/<path>`, one full copy
//! of every tracked file per commit. Writes copy working-tree bytes
//! verbatim; reads are by `(branch, commit, path)` triple. The store is
//! append-only apart from branch removal.

use std::fs;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::paths::RepoPath;
use crate::Repository;

/// Directory holding one commit's snapshot on one branch.
pub fn snapshot_dir(repo: &Repository, branch: &str, commit: &str) -> PathBuf {
    repo.objects_dir().join(branch).join(commit)
}

/// Path of one blob inside a snapshot.
pub fn blob_path(repo: &Repository, branch: &str, commit: &str, path: &RepoPath) -> PathBuf {
    path.to_path(&snapshot_dir(repo, branch, commit))
}

/// Copy a working-tree file into a snapshot, byte for byte.
pub fn store_snapshot(
    repo: &Repository,
    branch: &str,
    commit: &str,
    path: &RepoPath,
) -> Result<()> {
    let source = path.to_path(&repo.root);
    let target = blob_path(repo, branch, commit, path);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io("store_snapshot", parent, e))?;
    }

    fs::copy(&source, &target).map_err(|e| Error::io("store_snapshot", &source, e))?;
    Ok(())
}

/// Read one blob's bytes.
pub fn read_blob(repo: &Repository, branch: &str, commit: &str, path: &RepoPath) -> Result<Vec<u8>> {
    let blob = blob_path(repo, branch, commit, path);
    fs::read(&blob).map_err(|e| Error::io("read_blob", &blob, e))
}

/// Read one blob's bytes, or `None` when the snapshot has no such file.
pub fn read_blob_opt(
    repo: &Repository,
    branch: &str,
    commit: &str,
    path: &RepoPath,
) -> Result<Option<Vec<u8>>> {
    let blob = blob_path(repo, branch, commit, path);
    if !blob.exists() {
        return Ok(None);
    }
    fs::read(&blob)
        .map(Some)
        .map_err(|e| Error::io("read_blob", &blob, e))
}

/// List every file in a snapshot as repository-relative paths.
///
/// Returns an empty list when the snapshot directory does not exist.
pub fn list_snapshot_files(repo: &Repository, branch: &str, commit: &str) -> Result<Vec<RepoPath>> {
    let dir = snapshot_dir(repo, branch, commit);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            Error::new(
                crate::error::ErrorKind::Filesystem,
                format!("{}: {}", dir.display(), e),
                crate::error::Severity::Error,
                "list_snapshot_files",
            )
        })?;

        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(&dir)
                .map_err(|_| Error::corrupted("snapshot entry escapes its directory", "list_snapshot_files"))?;
            files.push(RepoPath::from_relative(relative, "list_snapshot_files")?);
        }
    }

    files.sort();
    Ok(files)
}

/// Copy one commit's snapshot tree onto another branch.
///
/// Used when a branch is forked so the new branch owns a complete copy
/// of its starting snapshot.
pub fn copy_snapshot_to_branch(
    repo: &Repository,
    source_branch: &str,
    target_branch: &str,
    commit: &str,
) -> Result<()> {
    let files = list_snapshot_files(repo, source_branch, commit)?;

    for path in &files {
        let from = blob_path(repo, source_branch, commit, path);
        let to = blob_path(repo, target_branch, commit, path);

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io("copy_snapshot", parent, e))?;
        }
        fs::copy(&from, &to).map_err(|e| Error::io("copy_snapshot", &from, e))?;
    }

    Ok(())
}

/// Delete every snapshot owned by a branch.
pub fn remove_branch_objects(repo: &Repository, branch: &str) -> Result<()> {
    let dir = repo.objects_dir().join(branch);
    if dir.exists() {
        fs::remove_dir_all(&dir).map_err(|e| Error::io("remove_branch_objects", &dir, e))?;
    }
    Ok(())
}

/// Whether a snapshot directory exists for the given triple prefix.
pub fn snapshot_exists(repo: &Repository, branch: &str, commit: &str) -> bool {
    snapshot_dir(repo, branch, commit).is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn repo_with_file(content: &[u8]) -> (tempfile::TempDir, Repository, RepoPath) {
        let temp = tempdir().unwrap();
        let repo = Repository::init(temp.path(), "master").unwrap();
        let path = RepoPath::parse("dir/a.txt", "test").unwrap();
        fs::create_dir_all(temp.path().join("dir")).unwrap();
        fs::write(path.to_path(&repo.root), content).unwrap();
        (temp, repo, path)
    }

    #[test]
    fn test_store_and_read_roundtrip() {
        let (_temp, repo, path) = repo_with_file(b"snapshot bytes");

        store_snapshot(&repo, "master", "c1", &path).unwrap();
        let bytes = read_blob(&repo, "master", "c1", &path).unwrap();
        assert_eq!(bytes, b"snapshot bytes");
    }

    #[test]
    fn test_store_preserves_empty_file() {
        let (_temp, repo, path) = repo_with_file(b"");

        store_snapshot(&repo, "master", "c1", &path).unwrap();
        assert_eq!(read_blob(&repo, "master", "c1", &path).unwrap(), b"");
    }

    #[test]
    fn test_list_snapshot_files_sorted() {
        let (_temp, repo, path) = repo_with_file(b"x");
        let other = RepoPath::parse("b.txt", "test").unwrap();
        fs::write(other.to_path(&repo.root), b"y").unwrap();

        store_snapshot(&repo, "master", "c1", &path).unwrap();
        store_snapshot(&repo, "master", "c1", &other).unwrap();

        let files = list_snapshot_files(&repo, "master", "c1").unwrap();
        let names: Vec<&str> = files.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "dir/a.txt"]);
    }

    #[test]
    fn test_list_missing_snapshot_is_empty() {
        let temp = tempdir().unwrap();
        let repo = Repository::init(temp.path(), "master").unwrap();
        assert!(list_snapshot_files(&repo, "master", "nope").unwrap().is_empty());
    }

    #[test]
    fn test_copy_snapshot_to_branch() {
        let (_temp, repo, path) = repo_with_file(b"fork me");
        store_snapshot(&repo, "master", "c1", &path).unwrap();

        copy_snapshot_to_branch(&repo, "master", "feature", "c1").unwrap();
        assert_eq!(read_blob(&repo, "feature", "c1", &path).unwrap(), b"fork me");
    }

    #[test]
    fn test_remove_branch_objects() {
        let (_temp, repo, path) = repo_with_file(b"gone");
        store_snapshot(&repo, "master", "c1", &path).unwrap();

        remove_branch_objects(&repo, "master").unwrap();
        assert!(!snapshot_exists(&repo, "master", "c1"));
    }
}
