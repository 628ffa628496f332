//! # Reference Store
//!
//! Branches are one file each under `refs/heads/<name>`, holding the tip
//! commit hash (empty before the first commit). Tags mirror that layout
//! under `refs/tags/`. HEAD is a single file with the checked-out branch
//! name, and the history log keeps `"<commit> <branch>"` lines newest
//! first.

use std::fs;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, ErrorKind, Result, Severity};
use crate::{objects, read_text, write_text, Repository};

/// Reserved token that can never name a branch or tag.
pub const HEAD_NAME: &str = "HEAD";

static REF_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("ref name pattern is valid"));

/// Validate a branch or tag name.
pub fn validate_ref_name(name: &str, context: &str) -> Result<()> {
    if name == HEAD_NAME {
        return Err(Error::validation(
            format!("'{}' is a reserved name", name),
            context,
        ));
    }
    if !REF_NAME_RE.is_match(name) {
        return Err(Error::validation(
            format!("'{}' is not a valid name", name),
            context,
        ));
    }
    Ok(())
}

/// Read the currently checked-out branch name from HEAD.
pub fn current_branch(repo: &Repository) -> Result<String> {
    let head = read_text(&repo.head_path())
        .map_err(|_| Error::corrupted("HEAD file is missing", "current_branch"))?;

    let name = head.lines().next().unwrap_or("").trim().to_string();
    if name.is_empty() {
        return Err(Error::state("no branch is checked out", "current_branch"));
    }
    Ok(name)
}

/// Point HEAD at a branch.
pub fn set_head(repo: &Repository, branch: &str) -> Result<()> {
    write_text(&repo.head_path(), &format!("{}\n", branch))
}

pub fn branch_exists(repo: &Repository, name: &str) -> bool {
    repo.heads_dir().join(name).is_file()
}

/// List branch names, sorted.
pub fn list_branches(repo: &Repository) -> Result<Vec<String>> {
    let heads = repo.heads_dir();
    if !heads.exists() {
        return Ok(Vec::new());
    }

    let mut branches = Vec::new();
    let entries = fs::read_dir(&heads).map_err(|e| Error::io("list_branches", &heads, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io("list_branches", &heads, e))?;
        if entry.path().is_file() {
            if let Some(name) = entry.file_name().to_str() {
                branches.push(name.to_string());
            }
        }
    }

    branches.sort();
    Ok(branches)
}

/// Read a branch tip. `Ok(None)` means the branch exists but has no
/// commits yet.
pub fn branch_tip(repo: &Repository, name: &str) -> Result<Option<String>> {
    let path = repo.heads_dir().join(name);
    if !path.is_file() {
        return Err(Error::not_found(
            format!("branch '{}' not found", name),
            "branch_tip",
        ));
    }

    let content = read_text(&path)?;
    let tip = content.trim();
    if tip.is_empty() {
        Ok(None)
    } else {
        Ok(Some(tip.to_string()))
    }
}

/// Overwrite a branch tip with a commit hash.
pub fn set_branch_tip(repo: &Repository, name: &str, commit: &str) -> Result<()> {
    write_text(&repo.heads_dir().join(name), &format!("{}\n", commit))
}

/// Fork a new branch from the current HEAD branch.
///
/// Requires the current branch to have a tip; the tip's snapshot tree is
/// copied into the new branch's object subtree and a history record
/// links the commit to the new name.
pub fn create_branch(repo: &Repository, name: &str) -> Result<()> {
    validate_ref_name(name, "create_branch")?;

    if branch_exists(repo, name) {
        return Err(Error::already_exists(
            format!("branch '{}' already exists", name),
            "create_branch",
        ));
    }

    let current = current_branch(repo)?;
    let tip = branch_tip(repo, &current)?.ok_or_else(|| {
        Error::state(
            format!("branch '{}' has no commits to fork from", current),
            "create_branch",
        )
    })?;

    objects::copy_snapshot_to_branch(repo, &current, name, &tip)?;
    set_branch_tip(repo, name, &tip)?;
    prepend_history(repo, &tip, name)?;

    Ok(())
}

/// Delete a branch, its ref file, and its object subtree.
///
/// Refused while the branch is checked out or the index is non-empty.
pub fn remove_branch(repo: &Repository, name: &str) -> Result<()> {
    if !branch_exists(repo, name) {
        return Err(Error::not_found(
            format!("branch '{}' not found", name),
            "remove_branch",
        ));
    }

    if current_branch(repo)? == name {
        return Err(Error::state(
            format!("cannot delete the checked-out branch '{}'", name),
            "remove_branch",
        ));
    }

    if !crate::index::Index::load(repo)?.is_empty() {
        return Err(Error::state(
            "unstage all files before removing a branch",
            "remove_branch",
        ));
    }

    let ref_path = repo.heads_dir().join(name);
    fs::remove_file(&ref_path).map_err(|e| Error::io("remove_branch", &ref_path, e))?;
    objects::remove_branch_objects(repo, name)?;

    Ok(())
}

/// Prepend a `"<commit> <branch>"` record to the history log.
pub fn prepend_history(repo: &Repository, commit: &str, branch: &str) -> Result<()> {
    let path = repo.history_path();
    let existing = if path.exists() { read_text(&path)? } else { String::new() };
    write_text(&path, &format!("{} {}\n{}", commit, branch, existing))
}

/// Read the history log, newest first.
pub fn read_history(repo: &Repository) -> Result<Vec<(String, String)>> {
    let path = repo.history_path();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for line in read_text(&path)?.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(commit), Some(branch)) = (parts.next(), parts.next()) {
            records.push((commit.to_string(), branch.to_string()));
        }
    }
    Ok(records)
}

/// A tag reference: lightweight, or annotated with message metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub target: String,
    pub annotation: Option<TagAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAnnotation {
    pub tagger: String,
    pub timestamp: String,
    pub message: String,
}

/// List tag names, sorted.
pub fn list_tags(repo: &Repository) -> Result<Vec<String>> {
    let tags = repo.tags_dir();
    if !tags.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    let entries = fs::read_dir(&tags).map_err(|e| Error::io("list_tags", &tags, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io("list_tags", &tags, e))?;
        if entry.path().is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}

pub fn tag_exists(repo: &Repository, name: &str) -> bool {
    repo.tags_dir().join(name).is_file()
}

/// Create a tag at the current HEAD tip.
///
/// A message turns the tag into an annotated one, stored as an
/// `object`/`type`/`tag`/`tagger` header block followed by the message.
pub fn create_tag(
    repo: &Repository,
    name: &str,
    message: Option<&str>,
    tagger: &str,
) -> Result<()> {
    validate_ref_name(name, "create_tag")?;

    if tag_exists(repo, name) {
        return Err(Error::already_exists(
            format!("tag '{}' already exists", name),
            "create_tag",
        ));
    }

    let current = current_branch(repo)?;
    let tip = branch_tip(repo, &current)?.ok_or_else(|| {
        Error::new(
            ErrorKind::State,
            "no commits to tag",
            Severity::Error,
            "create_tag",
        )
    })?;

    let content = match message {
        None => format!("{}\n", tip),
        Some(message) => {
            let timestamp = crate::commit::local_timestamp();
            format!(
                "object {}\ntype commit\ntag {}\ntagger {} {}\n\n{}\n",
                tip, name, tagger, timestamp, message
            )
        }
    };

    write_text(&repo.tags_dir().join(name), &content)
}

/// Read and parse a tag.
pub fn read_tag(repo: &Repository, name: &str) -> Result<Tag> {
    let path = repo.tags_dir().join(name);
    if !path.is_file() {
        return Err(Error::not_found(
            format!("tag '{}' not found", name),
            "read_tag",
        ));
    }

    let content = read_text(&path)?;

    if !content.starts_with("object ") {
        return Ok(Tag {
            name: name.to_string(),
            target: content.trim().to_string(),
            annotation: None,
        });
    }

    let mut target = String::new();
    let mut tagger = String::new();
    let mut timestamp = String::new();
    let mut lines = content.lines();

    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix("object ") {
            target = rest.to_string();
        } else if let Some(rest) = line.strip_prefix("tagger ") {
            // "<author> <YYYY-MM-DD> <HH:MM:SS>"
            let mut parts = rest.rsplitn(3, ' ');
            let time = parts.next().unwrap_or("").to_string();
            let date = parts.next().unwrap_or("").to_string();
            tagger = parts.next().unwrap_or("").to_string();
            timestamp = format!("{} {}", date, time);
        }
    }

    let message: String = lines.collect::<Vec<_>>().join("\n");

    Ok(Tag {
        name: name.to_string(),
        target,
        annotation: Some(TagAnnotation {
            tagger,
            timestamp,
            message: message.trim_end().to_string(),
        }),
    })
}

/// Delete a tag.
pub fn delete_tag(repo: &Repository, name: &str) -> Result<()> {
    let path = repo.tags_dir().join(name);
    if !path.is_file() {
        return Err(Error::not_found(
            format!("tag '{}' not found", name),
            "delete_tag",
        ));
    }
    fs::remove_file(&path).map_err(|e| Error::io("delete_tag", &path, e))
}
