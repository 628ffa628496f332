//! # Working-Tree Engine
//!
//! Switches the working tree between branch tips. Untracked files are
//! moved aside into a scratch area under the metadata directory for the
//! duration of the switch, so a checkout never loses work that was not
//! committed anywhere.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Error, ErrorKind, Result, Severity};
use crate::paths::RepoPath;
use crate::{ignore, index, objects, refs, Repository};

/// Directories and files never considered for the untracked backup.
const UNTRACKED_EXCLUDES: &[&str] = &["build", ".git", ".DS_Store", ".github"];

/// Switch HEAD and the working tree to another branch.
///
/// With uncommitted changes present the caller must pass `force` to
/// confirm the switch; interactive callers prompt first.
pub fn switch_branch(repo: &Repository, name: &str, force: bool) -> Result<()> {
    if !refs::branch_exists(repo, name) {
        return Err(Error::not_found(
            format!("branch '{}' not found", name),
            "switch_branch",
        ));
    }

    if refs::current_branch(repo)? == name {
        return Err(Error::state(
            format!("already on branch '{}'", name),
            "switch_branch",
        ));
    }

    if !force && has_uncommitted_changes(repo)? {
        return Err(Error::state(
            "you have uncommitted changes; switching may overwrite them",
            "switch_branch",
        ));
    }

    update_working_directory(repo, name)?;
    refs::set_head(repo, name)?;

    Ok(())
}

/// Whether staged entries exist or any tracked file diverges from the
/// current tip snapshot.
///
/// Untracked files do not count: they survive a switch through the
/// scratch backup and need no confirmation.
pub fn has_uncommitted_changes(repo: &Repository) -> Result<bool> {
    if !index::staged_files(repo)?.is_empty() {
        return Ok(true);
    }

    let branch = refs::current_branch(repo)?;
    let tip = match refs::branch_tip(repo, &branch)? {
        Some(tip) => tip,
        None => return Ok(false),
    };

    for path in objects::list_snapshot_files(repo, &branch, &tip)? {
        let working = path.to_path(&repo.root);
        if !working.exists() {
            return Ok(true);
        }
        let snapshot = objects::read_blob(repo, &branch, &tip, &path)?;
        let on_disk =
            fs::read(&working).map_err(|e| Error::io("has_uncommitted_changes", &working, e))?;
        if snapshot != on_disk {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Replace the working tree with the target branch's tip snapshot.
///
/// Untracked files are copied to a scratch area first and restored
/// afterwards; both steps are skipped when there is nothing untracked.
pub fn update_working_directory(repo: &Repository, target_branch: &str) -> Result<()> {
    let target_tip = refs::branch_tip(repo, target_branch)?.ok_or_else(|| {
        Error::state(
            format!("no commits found in branch '{}'", target_branch),
            "checkout",
        )
    })?;

    let untracked = untracked_files(repo)?;
    if !untracked.is_empty() {
        backup_untracked_files(repo, &untracked)?;
    }

    remove_current_snapshot_files(repo)?;
    restore_files_from_snapshot(repo, target_branch, &target_tip)?;

    if !untracked.is_empty() {
        restore_untracked_files(repo)?;
    }

    Ok(())
}

/// Working-tree files absent from the current branch's tip snapshot.
///
/// Metadata, the ignore file, and common build artifacts are excluded.
/// With no tip yet, nothing is treated as untracked.
fn untracked_files(repo: &Repository) -> Result<Vec<RepoPath>> {
    let branch = refs::current_branch(repo)?;
    let tip = match refs::branch_tip(repo, &branch)? {
        Some(tip) => tip,
        None => return Ok(Vec::new()),
    };

    let mut untracked = Vec::new();
    for entry in WalkDir::new(&repo.root).follow_links(false) {
        let entry = entry.map_err(|e| {
            Error::new(
                ErrorKind::Filesystem,
                format!("walking working tree: {}", e),
                Severity::Error,
                "untracked_files",
            )
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(&repo.root) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let path = RepoPath::from_relative(relative, "untracked_files")?;

        if ignore::is_reserved(path.as_str()) || is_excluded_artifact(path.as_str()) {
            continue;
        }

        if !objects::blob_path(repo, &branch, &tip, &path).exists() {
            untracked.push(path);
        }
    }

    Ok(untracked)
}

fn is_excluded_artifact(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or(path);
    UNTRACKED_EXCLUDES.contains(&first)
}

fn scratch_dir(repo: &Repository) -> std::path::PathBuf {
    repo.meta_dir.join("untracked_backup")
}

fn backup_untracked_files(repo: &Repository, untracked: &[RepoPath]) -> Result<()> {
    let scratch = scratch_dir(repo);

    for path in untracked {
        let source = path.to_path(&repo.root);
        let target = path.to_path(&scratch);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io("backup_untracked", parent, e))?;
        }
        fs::copy(&source, &target).map_err(|e| Error::io("backup_untracked", &source, e))?;
    }

    Ok(())
}

fn restore_untracked_files(repo: &Repository) -> Result<()> {
    let scratch = scratch_dir(repo);
    if !scratch.exists() {
        return Ok(());
    }

    for entry in WalkDir::new(&scratch).follow_links(false) {
        let entry = entry.map_err(|e| {
            Error::new(
                ErrorKind::Filesystem,
                format!("walking scratch area: {}", e),
                Severity::Error,
                "restore_untracked",
            )
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(&scratch)
            .map_err(|_| Error::corrupted("scratch entry escapes its directory", "restore_untracked"))?;
        let target = repo.root.join(relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io("restore_untracked", parent, e))?;
        }
        fs::copy(entry.path(), &target).map_err(|e| Error::io("restore_untracked", entry.path(), e))?;
    }

    fs::remove_dir_all(&scratch).map_err(|e| Error::io("restore_untracked", &scratch, e))
}

/// Delete every file of the current tip's snapshot from the working
/// tree. A branch without commits leaves the tree untouched.
fn remove_current_snapshot_files(repo: &Repository) -> Result<()> {
    let branch = refs::current_branch(repo)?;
    let tip = match refs::branch_tip(repo, &branch)? {
        Some(tip) => tip,
        None => return Ok(()),
    };

    for path in objects::list_snapshot_files(repo, &branch, &tip)? {
        let working = path.to_path(&repo.root);
        if working.exists() {
            fs::remove_file(&working).map_err(|e| Error::io("checkout", &working, e))?;
        }
    }

    Ok(())
}

/// Copy every file of a snapshot into the working tree.
pub fn restore_files_from_snapshot(repo: &Repository, branch: &str, commit: &str) -> Result<()> {
    let snapshot = objects::snapshot_dir(repo, branch, commit);
    if !snapshot.exists() {
        return Err(Error::corrupted(
            format!("snapshot missing for commit {} on '{}'", commit, branch),
            "checkout",
        ));
    }

    for path in objects::list_snapshot_files(repo, branch, commit)? {
        let source = objects::blob_path(repo, branch, commit, &path);
        let target = path.to_path(&repo.root);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io("checkout", parent, e))?;
        }
        copy_over(&source, &target)?;
    }

    Ok(())
}

fn copy_over(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        fs::remove_file(target).map_err(|e| Error::io("checkout", target, e))?;
    }
    fs::copy(source, target).map_err(|e| Error::io("checkout", source, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit;
    use std::fs;
    use tempfile::tempdir;

    fn repo() -> (tempfile::TempDir, Repository) {
        let temp = tempdir().unwrap();
        let repo = Repository::init(temp.path(), "master").unwrap();
        (temp, repo)
    }

    fn commit_file(repo: &Repository, name: &str, content: &[u8], message: &str) -> String {
        fs::write(repo.root.join(name), content).unwrap();
        index::stage(repo, name).unwrap();
        commit::commit_changes(repo, "alice", message).unwrap()
    }

    #[test]
    fn test_switch_to_missing_branch() {
        let (_temp, repo) = repo();
        let err = switch_branch(&repo, "nope", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_switch_to_same_branch() {
        let (_temp, repo) = repo();
        let err = switch_branch(&repo, "master", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
    }

    #[test]
    fn test_switch_updates_head_and_tree() {
        let (_temp, repo) = repo();
        commit_file(&repo, "a.txt", b"master content", "first");

        refs::create_branch(&repo, "feature").unwrap();
        switch_branch(&repo, "feature", false).unwrap();
        assert_eq!(refs::current_branch(&repo).unwrap(), "feature");

        // diverge the feature branch, then go back
        fs::write(repo.root.join("a.txt"), b"feature content").unwrap();
        index::stage(&repo, "a.txt").unwrap();
        commit::commit_changes(&repo, "alice", "feature change").unwrap();

        switch_branch(&repo, "master", false).unwrap();
        assert_eq!(fs::read(repo.root.join("a.txt")).unwrap(), b"master content");
    }

    #[test]
    fn test_switch_with_uncommitted_changes_needs_force() {
        let (_temp, repo) = repo();
        commit_file(&repo, "a.txt", b"v1", "first");
        refs::create_branch(&repo, "feature").unwrap();

        fs::write(repo.root.join("a.txt"), b"dirty").unwrap();

        let err = switch_branch(&repo, "feature", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);

        switch_branch(&repo, "feature", true).unwrap();
        assert_eq!(refs::current_branch(&repo).unwrap(), "feature");
    }

    #[test]
    fn test_switch_preserves_untracked_files() {
        let (_temp, repo) = repo();
        commit_file(&repo, "a.txt", b"tracked", "first");
        refs::create_branch(&repo, "feature").unwrap();

        fs::write(repo.root.join("scratch.txt"), b"x").unwrap();

        switch_branch(&repo, "feature", true).unwrap();

        assert_eq!(fs::read(repo.root.join("scratch.txt")).unwrap(), b"x");
        assert_eq!(fs::read(repo.root.join("a.txt")).unwrap(), b"tracked");
        assert!(!scratch_dir(&repo).exists());
    }

    #[test]
    fn test_checkout_branch_without_commits() {
        let (_temp, repo) = repo();
        commit_file(&repo, "a.txt", b"x", "first");

        // a branch ref with no tip, created by hand
        fs::write(repo.heads_dir().join("empty"), "").unwrap();

        let err = switch_branch(&repo, "empty", true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
        assert!(err.message.contains("no commits"));
    }

    #[test]
    fn test_tracked_file_removed_when_absent_from_target() {
        let (_temp, repo) = repo();
        commit_file(&repo, "a.txt", b"base", "first");
        refs::create_branch(&repo, "feature").unwrap();
        switch_branch(&repo, "feature", false).unwrap();

        commit_file(&repo, "b.txt", b"feature only", "second");

        switch_branch(&repo, "master", false).unwrap();
        assert!(!repo.root.join("b.txt").exists());
        assert!(repo.root.join("a.txt").exists());
    }
}
