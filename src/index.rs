//! # Index (Staging Area)
//!
//! The index tracks files staged for the next commit as an ordered
//! mapping from a normalized repository-relative path to the content
//! hash recorded at stage time. It is persisted as one `"<path> <hash>"`
//! line per entry.

use std::collections::BTreeMap;
use std::fs;

use walkdir::WalkDir;

use crate::error::{Error, ErrorKind, Result, Severity};
use crate::ignore::{self, IgnoreList};
use crate::paths::RepoPath;
use crate::{hash, read_text, Repository};

/// The staging area: path to content hash, ordered by path.
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: BTreeMap<String, String>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index from disk. A missing or empty file yields an
    /// empty index.
    pub fn load(repo: &Repository) -> Result<Self> {
        let path = repo.index_path();
        if !path.exists() {
            return Ok(Self::new());
        }

        let mut entries = BTreeMap::new();
        for line in read_text(&path)?.lines() {
            let mut parts = line.split_whitespace();
            if let (Some(file), Some(file_hash)) = (parts.next(), parts.next()) {
                entries.insert(file.to_string(), file_hash.to_string());
            }
        }

        Ok(Self { entries })
    }

    /// Persist the index, writing through `index_temp` and renaming
    /// into place.
    pub fn save(&self, repo: &Repository) -> Result<()> {
        let path = repo.index_path();
        let temp = repo.meta_dir.join("index_temp");

        let mut content = String::new();
        for (file, file_hash) in &self.entries {
            content.push_str(file);
            content.push(' ');
            content.push_str(file_hash);
            content.push('\n');
        }

        fs::write(&temp, content).map_err(|e| Error::io("save_index", &temp, e))?;
        fs::rename(&temp, &path).map_err(|e| Error::io("save_index", &path, e))?;
        Ok(())
    }

    /// Empty the index file.
    pub fn clear(repo: &Repository) -> Result<()> {
        let path = repo.index_path();
        fs::write(&path, "").map_err(|e| Error::io("clear_index", &path, e))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(|s| s.as_str())
    }

    pub fn insert(&mut self, path: String, content_hash: String) {
        self.entries.insert(path, content_hash);
    }

    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.entries.remove(path)
    }

    /// Iterate entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, h)| (p.as_str(), h.as_str()))
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// What happened to each candidate of a stage request.
#[derive(Debug, Default)]
pub struct StageReport {
    pub staged: Vec<String>,
    /// Already staged with an identical hash.
    pub unchanged: Vec<String>,
}

/// Stage one path, or the entire tree when `spec` is `.`.
///
/// Ignored and reserved paths are skipped silently during a full-tree
/// stage; naming one explicitly is an error.
pub fn stage(repo: &Repository, spec: &str) -> Result<StageReport> {
    let ignore = IgnoreList::load(repo)?;
    let mut index = Index::load(repo)?;
    let mut report = StageReport::default();

    if spec == "." {
        for path in working_files(repo, &ignore)? {
            stage_one(repo, &mut index, &path, &mut report)?;
        }
    } else {
        let path = RepoPath::parse(spec, "stage")?;
        let full = path.to_path(&repo.root);

        if !full.exists() {
            return Err(Error::not_found(
                format!("file not found: {}", path),
                "stage",
            ));
        }
        if full.is_dir() {
            return Err(Error::validation(
                format!("'{}' is a directory; stage files or use '.'", path),
                "stage",
            ));
        }
        if ignore::is_reserved(path.as_str()) {
            return Err(Error::validation(
                format!("'{}' is reserved and cannot be staged", path),
                "stage",
            ));
        }
        if ignore.is_ignored(path.as_str()) {
            return Err(Error::info(
                ErrorKind::Validation,
                format!("'{}' is ignored", path),
                "stage",
            ));
        }

        stage_one(repo, &mut index, &path, &mut report)?;
    }

    index.save(repo)?;
    Ok(report)
}

fn stage_one(
    repo: &Repository,
    index: &mut Index,
    path: &RepoPath,
    report: &mut StageReport,
) -> Result<()> {
    let content_hash = hash::hash_file(&path.to_path(&repo.root)).map_err(|e| {
        Error::new(
            ErrorKind::Filesystem,
            format!("staging failed: {}", e.message),
            Severity::Error,
            "stage",
        )
    })?;

    if index.get(path.as_str()) == Some(content_hash.as_str()) {
        report.unchanged.push(path.as_str().to_string());
        return Ok(());
    }

    index.insert(path.as_str().to_string(), content_hash);
    report.staged.push(path.as_str().to_string());
    Ok(())
}

/// Remove one entry from the index.
pub fn unstage(repo: &Repository, spec: &str) -> Result<()> {
    let path = RepoPath::parse(spec, "unstage")?;
    let mut index = Index::load(repo)?;

    if index.remove(path.as_str()).is_none() {
        return Err(Error::not_found(
            format!("'{}' is not staged", path),
            "unstage",
        ));
    }

    index.save(repo)
}

/// Paths currently staged, in path order.
pub fn staged_files(repo: &Repository) -> Result<Vec<String>> {
    Ok(Index::load(repo)?.paths())
}

/// Working-tree files that are not staged, plus staged files whose
/// on-disk content no longer matches the recorded hash.
pub fn unstaged_files(repo: &Repository) -> Result<Vec<String>> {
    let ignore = IgnoreList::load(repo)?;
    let index = Index::load(repo)?;

    let mut unstaged = Vec::new();

    for path in working_files(repo, &ignore)? {
        match index.get(path.as_str()) {
            None => unstaged.push(path.as_str().to_string()),
            Some(recorded) => {
                let current = hash::hash_file(&path.to_path(&repo.root))?;
                if current != recorded {
                    unstaged.push(path.as_str().to_string());
                }
            }
        }
    }

    // Staged files deleted from the working tree count as unstaged too.
    for (path, _) in index.entries() {
        if !repo.root.join(path).exists() {
            unstaged.push(path.to_string());
        }
    }

    unstaged.sort();
    unstaged.dedup();
    Ok(unstaged)
}

/// Every regular file in the working tree, filtered by ignore rules and
/// the reserved metadata paths. Symlinks are not followed.
pub fn working_files(repo: &Repository, ignore: &IgnoreList) -> Result<Vec<RepoPath>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(&repo.root).follow_links(false) {
        let entry = entry.map_err(|e| {
            Error::new(
                ErrorKind::Filesystem,
                format!("walking working tree: {}", e),
                Severity::Error,
                "working_files",
            )
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(&repo.root) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let path = RepoPath::from_relative(relative, "working_files")?;

        if ignore::is_reserved(path.as_str()) || ignore.is_ignored(path.as_str()) {
            continue;
        }

        files.push(path);
    }

    files.sort();
    Ok(files)
}
