//! # BitTrack - A Local Content-Addressed Version Control System
//!
//! BitTrack records snapshots of a working tree, organizes them along
//! named branches, and merges divergent histories.
//!
//! ## Architecture Overview
//!
//! Every commit stores a full copy of each tracked file, keyed by branch
//! and commit hash. There is no delta compression and no global object
//! pool: blobs are addressed by `(branch, commit, path)`.
//!
//! ## Repository Structure
//!
//! ```text
//! .bittrack/
//! ├── HEAD                     # current branch name
//! ├── index                    # staging area: "<path> <hash>" per line
//! ├── commits/
//! │   ├── history              # "<commit> <branch>" per line, newest first
//! │   └── <commit-hash>        # commit record
//! ├── objects/<branch>/<commit>/<path>
//! ├── refs/
//! │   ├── heads/<branch>       # tip commit hash
//! │   └── tags/<name>          # lightweight or annotated tag
//! ├── stash/
//! │   ├── index                # one entry per line, newest first
//! │   └── <id>/<path>          # stashed file copies
//! ├── MERGE_HEAD               # present iff a merge is in progress
//! └── config                   # "<key>=<value>" per line
//! ```
//!
//! ## Usage Example
//!
//! ```bash
//! # Initialize a new repository
//! bittrack init
//!
//! # Stage a file and commit it
//! bittrack --stage notes.txt
//! bittrack --commit
//! ```

pub mod commit;
pub mod config;
pub mod diff;
pub mod error;
pub mod hash;
pub mod ignore;
pub mod index;
pub mod merge;
pub mod objects;
pub mod paths;
pub mod refs;
pub mod stash;
pub mod worktree;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// The name of the metadata directory at the repository root.
pub const BITTRACK_DIR: &str = ".bittrack";

/// The ignore file read from the repository root.
pub const IGNORE_FILE: &str = ".bitignore";

/// Handle to an open repository, passed explicitly to every operation.
#[derive(Debug, Clone)]
pub struct Repository {
    /// The root directory of the repository (where `.bittrack` lives).
    pub root: PathBuf,
    /// The `.bittrack` directory path.
    pub meta_dir: PathBuf,
}

impl Repository {
    /// Find the repository by walking up from the current directory.
    pub fn find() -> Result<Self> {
        let current_dir = std::env::current_dir()
            .map_err(|e| Error::io("find_repository", Path::new("."), e))?;
        Self::find_from(&current_dir)
    }

    /// Find the repository starting from a specific path.
    pub fn find_from(start: &Path) -> Result<Self> {
        let mut current = start.to_path_buf();

        loop {
            let meta_dir = current.join(BITTRACK_DIR);
            if meta_dir.is_dir() {
                return Ok(Self { root: current, meta_dir });
            }

            if !current.pop() {
                return Err(Error::not_in_repository("find_repository"));
            }
        }
    }

    /// Open the repository rooted exactly at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let meta_dir = path.join(BITTRACK_DIR);
        if !meta_dir.is_dir() {
            return Err(Error::not_in_repository("open_repository"));
        }
        Ok(Self {
            root: path.to_path_buf(),
            meta_dir,
        })
    }

    /// Initialize a new repository at the given path.
    ///
    /// Creates the `.bittrack` directory structure, seeds HEAD with
    /// `default_branch`, and creates an empty ref file for it. The
    /// branch gets its first tip on the first commit.
    pub fn init(path: &Path, default_branch: &str) -> Result<Self> {
        let root = path.to_path_buf();
        let meta_dir = root.join(BITTRACK_DIR);

        if meta_dir.exists() {
            return Err(Error::already_exists("repository already exists", "init"));
        }

        refs::validate_ref_name(default_branch, "init")?;

        for dir in [
            meta_dir.clone(),
            meta_dir.join("objects"),
            meta_dir.join("commits"),
            meta_dir.join("refs").join("heads"),
            meta_dir.join("refs").join("tags"),
        ] {
            fs::create_dir_all(&dir).map_err(|e| Error::io("init", &dir, e))?;
        }

        let repo = Self { root, meta_dir };

        write_text(&repo.history_path(), "")?;
        write_text(&repo.index_path(), "")?;
        write_text(&repo.heads_dir().join(default_branch), "")?;
        write_text(&repo.head_path(), &format!("{}\n", default_branch))?;

        Ok(repo)
    }

    /// Delete the metadata directory, dropping all history.
    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.meta_dir).map_err(|e| Error::io("remove_repo", &self.meta_dir, e))
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.meta_dir.join("objects")
    }

    pub fn commits_dir(&self) -> PathBuf {
        self.meta_dir.join("commits")
    }

    pub fn history_path(&self) -> PathBuf {
        self.meta_dir.join("commits").join("history")
    }

    pub fn heads_dir(&self) -> PathBuf {
        self.meta_dir.join("refs").join("heads")
    }

    pub fn tags_dir(&self) -> PathBuf {
        self.meta_dir.join("refs").join("tags")
    }

    pub fn head_path(&self) -> PathBuf {
        self.meta_dir.join("HEAD")
    }

    pub fn index_path(&self) -> PathBuf {
        self.meta_dir.join("index")
    }

    pub fn stash_dir(&self) -> PathBuf {
        self.meta_dir.join("stash")
    }

    pub fn merge_head_path(&self) -> PathBuf {
        self.meta_dir.join("MERGE_HEAD")
    }

    pub fn config_path(&self) -> PathBuf {
        self.meta_dir.join("config")
    }

    pub fn ignore_path(&self) -> PathBuf {
        self.root.join(IGNORE_FILE)
    }
}

/// Write a whole text file, mapping failures into the error taxonomy.
pub(crate) fn write_text(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| Error::io("write_file", path, e))
}

/// Read a whole text file.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io("read_file", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_structure() {
        let temp = tempdir().unwrap();
        let repo = Repository::init(temp.path(), "master").unwrap();

        assert!(repo.meta_dir.exists());
        assert!(repo.objects_dir().exists());
        assert!(repo.heads_dir().exists());
        assert!(repo.tags_dir().exists());
        assert!(repo.head_path().exists());
        assert!(repo.history_path().exists());
        assert!(repo.index_path().exists());
        assert!(repo.heads_dir().join("master").exists());
    }

    #[test]
    fn test_init_seeds_head_with_default_branch() {
        let temp = tempdir().unwrap();
        let repo = Repository::init(temp.path(), "trunk").unwrap();

        let head = fs::read_to_string(repo.head_path()).unwrap();
        assert_eq!(head.trim(), "trunk");
    }

    #[test]
    fn test_init_twice_fails() {
        let temp = tempdir().unwrap();
        Repository::init(temp.path(), "master").unwrap();
        assert!(Repository::init(temp.path(), "master").is_err());
    }

    #[test]
    fn test_find_from_nested_directory() {
        let temp = tempdir().unwrap();
        Repository::init(temp.path(), "master").unwrap();

        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let repo = Repository::find_from(&nested).unwrap();
        assert_eq!(repo.root, temp.path());
    }

    #[test]
    fn test_remove_deletes_metadata() {
        let temp = tempdir().unwrap();
        let repo = Repository::init(temp.path(), "master").unwrap();
        let meta = repo.meta_dir.clone();

        repo.remove().unwrap();
        assert!(!meta.exists());
    }
}
