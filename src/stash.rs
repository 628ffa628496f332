//! # Stash
//!
//! Saves the staged files aside, clears them from the index and the
//! working tree, and restores them later. Captured file copies live
//! under `stash/<id>/<path>`; the entry list in `stash/index` is kept
//! newest first, so the most recent stash has position 0.

use std::fs;

use chrono::Local;
use walkdir::WalkDir;

use crate::error::{Error, ErrorKind, Result, Severity};
use crate::index::{self, Index};
use crate::paths::RepoPath;
use crate::{commit, read_text, refs, write_text, Repository};

/// One saved stash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry {
    pub id: String,
    pub message: String,
    pub branch: String,
    /// Tip commit at stash time; empty before the first commit.
    pub commit: String,
    pub timestamp: i64,
}

impl StashEntry {
    fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.id, self.message, self.branch, self.commit, self.timestamp
        )
    }

    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(5, '|');
        Some(Self {
            id: parts.next()?.to_string(),
            message: parts.next()?.to_string(),
            branch: parts.next()?.to_string(),
            commit: parts.next()?.to_string(),
            timestamp: parts.next()?.parse().ok()?,
        })
    }
}

fn stash_index_path(repo: &Repository) -> std::path::PathBuf {
    repo.stash_dir().join("index")
}

fn capture_dir(repo: &Repository, id: &str) -> std::path::PathBuf {
    repo.stash_dir().join(id)
}

/// List stash entries, newest first.
pub fn entries(repo: &Repository) -> Result<Vec<StashEntry>> {
    let path = stash_index_path(repo);
    if !path.exists() {
        return Ok(Vec::new());
    }

    Ok(read_text(&path)?
        .lines()
        .filter(|l| !l.is_empty())
        .filter_map(StashEntry::parse)
        .collect())
}

fn find_entry(repo: &Repository, id: Option<&str>) -> Result<StashEntry> {
    let all = entries(repo)?;
    match id {
        Some(id) => all
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::not_found(format!("stash '{}' not found", id), "stash")),
        None => all
            .into_iter()
            .next()
            .ok_or_else(|| Error::info(ErrorKind::NotFound, "no stashes found", "stash")),
    }
}

fn write_entries(repo: &Repository, all: &[StashEntry]) -> Result<()> {
    let dir = repo.stash_dir();
    fs::create_dir_all(&dir).map_err(|e| Error::io("stash", &dir, e))?;

    let mut content = String::new();
    for entry in all {
        content.push_str(&entry.to_line());
        content.push('\n');
    }
    write_text(&stash_index_path(repo), &content)
}

fn generate_id(repo: &Repository) -> String {
    let base = format!("stash_{}", Local::now().timestamp());
    let mut id = base.clone();
    let mut counter = 1;
    while capture_dir(repo, &id).exists() {
        id = format!("{}_{}", base, counter);
        counter += 1;
    }
    id
}

/// Capture the staged files into a new stash entry.
///
/// Clears the index and deletes the captured files from the working
/// tree afterwards.
pub fn save(repo: &Repository, message: Option<&str>) -> Result<StashEntry> {
    let staged = index::staged_files(repo)?;
    if staged.is_empty() {
        return Err(Error::info(
            ErrorKind::State,
            "no staged changes to stash",
            "stash",
        ));
    }

    let branch = refs::current_branch(repo)?;
    let entry = StashEntry {
        id: generate_id(repo),
        message: match message {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => format!("WIP on {}", branch),
        },
        branch: branch.clone(),
        commit: commit::current_commit(repo)?.unwrap_or_default(),
        timestamp: Local::now().timestamp(),
    };

    // capture copies first so a failure leaves the index intact
    let dir = capture_dir(repo, &entry.id);
    for path_str in &staged {
        let path = RepoPath::parse(path_str, "stash")?;
        let source = path.to_path(&repo.root);
        if !source.exists() {
            continue;
        }
        let target = path.to_path(&dir);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io("stash", parent, e))?;
        }
        fs::copy(&source, &target).map_err(|e| Error::io("stash", &source, e))?;
    }

    let mut all = entries(repo)?;
    all.insert(0, entry.clone());
    write_entries(repo, &all)?;

    Index::clear(repo)?;

    for path_str in &staged {
        let working = repo.root.join(path_str);
        if working.exists() {
            fs::remove_file(&working).map_err(|e| Error::io("stash", &working, e))?;
        }
    }

    Ok(entry)
}

/// Files captured by one stash, as repository-relative paths.
pub fn captured_files(repo: &Repository, id: &str) -> Result<Vec<RepoPath>> {
    let dir = capture_dir(repo, id);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            Error::new(
                ErrorKind::Filesystem,
                format!("walking stash capture: {}", e),
                Severity::Error,
                "stash",
            )
        })?;
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(&dir)
                .map_err(|_| Error::corrupted("stash entry escapes its directory", "stash"))?;
            files.push(RepoPath::from_relative(relative, "stash")?);
        }
    }

    files.sort();
    Ok(files)
}

/// Copy a stash's files back into the working tree and restage them.
///
/// Without an id, the most recent stash is applied. The entry stays in
/// the list; use [`pop`] to apply and drop in one step.
pub fn apply(repo: &Repository, id: Option<&str>) -> Result<StashEntry> {
    let entry = find_entry(repo, id)?;
    let dir = capture_dir(repo, &entry.id);

    for path in captured_files(repo, &entry.id)? {
        let source = path.to_path(&dir);
        let target = path.to_path(&repo.root);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io("stash_apply", parent, e))?;
        }
        if target.exists() {
            fs::remove_file(&target).map_err(|e| Error::io("stash_apply", &target, e))?;
        }
        fs::copy(&source, &target).map_err(|e| Error::io("stash_apply", &source, e))?;

        index::stage(repo, path.as_str())?;
    }

    Ok(entry)
}

/// Apply a stash, then drop it.
pub fn pop(repo: &Repository, id: Option<&str>) -> Result<StashEntry> {
    let entry = apply(repo, id)?;
    drop_entry(repo, &entry.id)?;
    Ok(entry)
}

/// Remove one stash entry and its captured files.
pub fn drop_entry(repo: &Repository, id: &str) -> Result<()> {
    let all = entries(repo)?;
    if !all.iter().any(|e| e.id == id) {
        return Err(Error::not_found(format!("stash '{}' not found", id), "stash_drop"));
    }

    let dir = capture_dir(repo, id);
    if dir.exists() {
        fs::remove_dir_all(&dir).map_err(|e| Error::io("stash_drop", &dir, e))?;
    }

    let remaining: Vec<StashEntry> = all.into_iter().filter(|e| e.id != id).collect();
    write_entries(repo, &remaining)
}

/// Remove every stash.
pub fn clear(repo: &Repository) -> Result<()> {
    for entry in entries(repo)? {
        let dir = capture_dir(repo, &entry.id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| Error::io("stash_clear", &dir, e))?;
        }
    }

    let path = stash_index_path(repo);
    if path.exists() {
        fs::remove_file(&path).map_err(|e| Error::io("stash_clear", &path, e))?;
    }
    Ok(())
}
