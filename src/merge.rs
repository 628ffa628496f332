//! # Merge Engine
//!
//! Merges one branch into the checked-out branch. Fast-forwards when
//! the target is an ancestor of the source; otherwise runs a three-way
//! merge against the most recent common ancestor, writing conflict
//! markers into the working copy for files both sides changed.
//!
//! While conflicts are unresolved a merge-state file blocks commits and
//! further merges; the merge concludes with `abort` or `continue_merge`.

use std::collections::{HashSet, VecDeque};
use std::fs;

use crate::commit::CommitRecord;
use crate::error::{Error, ErrorKind, Result};
use crate::paths::RepoPath;
use crate::{commit, index, objects, read_text, refs, worktree, write_text, Repository};

/// Author recorded on commits the merge engine creates itself.
const MERGE_AUTHOR: &str = "bittrack";

/// What a merge did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The source tip was already reachable from the target.
    AlreadyUpToDate,
    /// The target tip was advanced without creating a commit.
    FastForward { commit: String },
    /// A merge commit was created.
    Merged {
        commit: String,
        added: Vec<String>,
        modified: Vec<String>,
        deleted: Vec<String>,
    },
    /// Conflict markers were written; no commit was created.
    Conflicts { files: Vec<String> },
}

/// Per-file decision of the three-way comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileOutcome {
    Unchanged,
    KeepTarget,
    TakeSource(Vec<u8>),
    AddSource(Vec<u8>),
    Delete,
    Conflict {
        target: Vec<u8>,
        source: Vec<u8>,
    },
}

/// In-progress merge recorded in the merge-state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeState {
    pub source_branch: String,
    pub source_commit: String,
    pub target_branch: String,
    pub target_commit: String,
    pub conflicts: Vec<String>,
}

/// Merge `source` into `target`, which must be the checked-out branch.
pub fn merge(repo: &Repository, source: &str, target: &str) -> Result<MergeOutcome> {
    if source.is_empty() || target.is_empty() {
        return Err(Error::validation("branch names cannot be empty", "merge"));
    }
    if source == target {
        return Err(Error::validation("cannot merge a branch with itself", "merge"));
    }
    if repo.merge_head_path().exists() {
        return Err(Error::state(
            "a merge is already in progress; resolve or abort it first",
            "merge",
        ));
    }

    for name in [source, target] {
        if !refs::branch_exists(repo, name) {
            return Err(Error::not_found(format!("branch '{}' not found", name), "merge"));
        }
    }

    if refs::current_branch(repo)? != target {
        return Err(Error::validation(
            format!("must be on branch '{}' to merge into it", target),
            "merge",
        ));
    }

    if worktree::has_uncommitted_changes(repo)? {
        return Err(Error::state(
            "you have uncommitted changes; commit or stash them before merging",
            "merge",
        ));
    }

    let source_tip = refs::branch_tip(repo, source)?
        .ok_or_else(|| Error::state(format!("branch '{}' has no commits", source), "merge"))?;
    let target_tip = refs::branch_tip(repo, target)?
        .ok_or_else(|| Error::state(format!("branch '{}' has no commits", target), "merge"))?;

    if source_tip == target_tip || is_ancestor(repo, &source_tip, &target_tip)? {
        return Ok(MergeOutcome::AlreadyUpToDate);
    }

    if is_ancestor(repo, &target_tip, &source_tip)? {
        return fast_forward(repo, source, target, &source_tip);
    }

    let base = merge_base(repo, &source_tip, &target_tip)?.ok_or_else(|| {
        Error::state("no common ancestor found", "merge")
    })?;

    three_way_merge(repo, source, target, &base, &target_tip, &source_tip)
}

/// Advance the target tip to the source tip.
///
/// The source snapshot is copied into the target branch's object
/// subtree so the tip's blobs stay reachable through the target, the
/// ref and history are updated, and the snapshot files are overlaid
/// onto the working tree.
fn fast_forward(
    repo: &Repository,
    source: &str,
    target: &str,
    source_tip: &str,
) -> Result<MergeOutcome> {
    if !objects::snapshot_exists(repo, target, source_tip) {
        objects::copy_snapshot_to_branch(repo, source, target, source_tip)?;
    }

    refs::set_branch_tip(repo, target, source_tip)?;
    refs::prepend_history(repo, source_tip, target)?;

    for path in objects::list_snapshot_files(repo, target, source_tip)? {
        let blob = objects::read_blob(repo, target, source_tip, &path)?;
        write_working_file(repo, &path, &blob)?;
    }

    Ok(MergeOutcome::FastForward {
        commit: source_tip.to_string(),
    })
}

fn three_way_merge(
    repo: &Repository,
    source: &str,
    target: &str,
    base: &str,
    target_tip: &str,
    source_tip: &str,
) -> Result<MergeOutcome> {
    let outcomes = evaluate(repo, base, target_tip, source_tip)?;

    let conflicts: Vec<&(RepoPath, FileOutcome)> = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, FileOutcome::Conflict { .. }))
        .collect();

    if !conflicts.is_empty() {
        let mut conflicted = Vec::new();
        for (path, outcome) in &conflicts {
            if let FileOutcome::Conflict { target, source } = outcome {
                write_conflict_file(repo, path, target, source)?;
                conflicted.push(path.as_str().to_string());
            }
        }

        let state = MergeState {
            source_branch: source.to_string(),
            source_commit: source_tip.to_string(),
            target_branch: target.to_string(),
            target_commit: target_tip.to_string(),
            conflicts: conflicted.clone(),
        };
        save_merge_state(repo, &state)?;

        return Ok(MergeOutcome::Conflicts { files: conflicted });
    }

    let (added, modified, deleted) = apply_clean_outcomes(repo, &outcomes)?;

    if added.is_empty() && modified.is_empty() && deleted.is_empty() {
        return Ok(MergeOutcome::AlreadyUpToDate);
    }

    let message = format!("Merge branch '{}' into {}", source, target);
    let merge_commit = commit::commit_with_parents(
        repo,
        MERGE_AUTHOR,
        &message,
        vec![target_tip.to_string(), source_tip.to_string()],
    )?;

    Ok(MergeOutcome::Merged {
        commit: merge_commit,
        added,
        modified,
        deleted,
    })
}

/// Write adds and takes into the working tree and stage them; apply
/// deletions. Returns the (added, modified, deleted) path lists.
fn apply_clean_outcomes(
    repo: &Repository,
    outcomes: &[(RepoPath, FileOutcome)],
) -> Result<(Vec<String>, Vec<String>, Vec<String>)> {
    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut deleted = Vec::new();

    for (path, outcome) in outcomes {
        match outcome {
            FileOutcome::Unchanged | FileOutcome::KeepTarget => {}
            FileOutcome::AddSource(content) => {
                write_working_file(repo, path, content)?;
                index::stage(repo, path.as_str())?;
                added.push(path.as_str().to_string());
            }
            FileOutcome::TakeSource(content) => {
                write_working_file(repo, path, content)?;
                index::stage(repo, path.as_str())?;
                modified.push(path.as_str().to_string());
            }
            FileOutcome::Delete => {
                let working = path.to_path(&repo.root);
                if working.exists() {
                    fs::remove_file(&working).map_err(|e| Error::io("merge", &working, e))?;
                }
                deleted.push(path.as_str().to_string());
            }
            // conflicts never reach this point
            FileOutcome::Conflict { .. } => {}
        }
    }

    Ok((added, modified, deleted))
}

/// Compare base, target, and source content for every path seen by any
/// of the three commits.
fn evaluate(
    repo: &Repository,
    base: &str,
    target_tip: &str,
    source_tip: &str,
) -> Result<Vec<(RepoPath, FileOutcome)>> {
    let base_record = CommitRecord::read(repo, base)?;
    let target_record = CommitRecord::read(repo, target_tip)?;
    let source_record = CommitRecord::read(repo, source_tip)?;

    let mut all_paths: Vec<&String> = base_record
        .files
        .keys()
        .chain(target_record.files.keys())
        .chain(source_record.files.keys())
        .collect();
    all_paths.sort();
    all_paths.dedup();

    let mut outcomes = Vec::new();
    for path_str in all_paths {
        let path = RepoPath::parse(path_str, "merge")?;

        let in_base = snapshot_content(repo, &base_record, &path)?;
        let in_target = snapshot_content(repo, &target_record, &path)?;
        let in_source = snapshot_content(repo, &source_record, &path)?;

        outcomes.push((path, decide(in_base, in_target, in_source)));
    }

    Ok(outcomes)
}

/// Read one file's bytes out of a commit's snapshot, if the commit
/// tracks it.
fn snapshot_content(
    repo: &Repository,
    record: &CommitRecord,
    path: &RepoPath,
) -> Result<Option<Vec<u8>>> {
    if !record.files.contains_key(path.as_str()) {
        return Ok(None);
    }
    objects::read_blob_opt(repo, &record.branch, &record.hash, path)
}

/// The three-way outcome table.
fn decide(
    base: Option<Vec<u8>>,
    target: Option<Vec<u8>>,
    source: Option<Vec<u8>>,
) -> FileOutcome {
    match (base, target, source) {
        (None, None, Some(s)) => FileOutcome::AddSource(s),
        (None, Some(_), None) => FileOutcome::KeepTarget,
        (None, Some(t), Some(s)) => {
            if t == s {
                FileOutcome::Unchanged
            } else {
                reconcile(t, s)
            }
        }
        (Some(b), Some(t), Some(s)) => {
            if t == b && s == b {
                FileOutcome::Unchanged
            } else if t == b {
                FileOutcome::TakeSource(s)
            } else if s == b {
                FileOutcome::KeepTarget
            } else if t == s {
                FileOutcome::Unchanged
            } else {
                reconcile(t, s)
            }
        }
        (Some(b), None, Some(s)) => {
            if s == b {
                FileOutcome::Delete
            } else {
                // deleted here, modified there
                FileOutcome::Conflict {
                    target: Vec::new(),
                    source: s,
                }
            }
        }
        (Some(b), Some(t), None) => {
            if t == b {
                FileOutcome::Delete
            } else {
                // modified here, deleted there
                FileOutcome::Conflict {
                    target: t,
                    source: Vec::new(),
                }
            }
        }
        (Some(_), None, None) => FileOutcome::Delete,
        (None, None, None) => FileOutcome::Unchanged,
    }
}

/// Last-resort reconciliation before declaring a conflict: treat the
/// sides as equal when they differ only in surrounding whitespace, and
/// prefer the non-empty side when exactly one side is empty.
fn reconcile(target: Vec<u8>, source: Vec<u8>) -> FileOutcome {
    if target.is_empty() && !source.is_empty() {
        return FileOutcome::TakeSource(source);
    }
    if !target.is_empty() && source.is_empty() {
        return FileOutcome::KeepTarget;
    }

    if lines_match_ignoring_whitespace(&target, &source) {
        return FileOutcome::Unchanged;
    }

    FileOutcome::Conflict { target, source }
}

fn lines_match_ignoring_whitespace(a: &[u8], b: &[u8]) -> bool {
    let a = String::from_utf8_lossy(a);
    let b = String::from_utf8_lossy(b);
    let a_lines: Vec<&str> = a.lines().collect();
    let b_lines: Vec<&str> = b.lines().collect();

    a_lines.len() == b_lines.len()
        && a_lines
            .iter()
            .zip(b_lines.iter())
            .all(|(x, y)| x.trim() == y.trim())
}

fn write_working_file(repo: &Repository, path: &RepoPath, content: &[u8]) -> Result<()> {
    let target = path.to_path(&repo.root);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io("merge", parent, e))?;
    }
    fs::write(&target, content).map_err(|e| Error::io("merge", &target, e))
}

/// Overwrite the working copy with conflict markers around both sides.
fn write_conflict_file(
    repo: &Repository,
    path: &RepoPath,
    target: &[u8],
    source: &[u8],
) -> Result<()> {
    let mut content = Vec::new();
    content.extend_from_slice(b"<<<<<<< HEAD\n");
    push_with_newline(&mut content, target);
    content.extend_from_slice(b"=======\n");
    push_with_newline(&mut content, source);
    content.extend_from_slice(b">>>>>>> theirs\n");

    write_working_file(repo, path, &content)
}

fn push_with_newline(buffer: &mut Vec<u8>, content: &[u8]) {
    buffer.extend_from_slice(content);
    if !content.is_empty() && !content.ends_with(b"\n") {
        buffer.push(b'\n');
    }
}

/// Breadth-first search over recorded parents, starting at `commit`.
fn ancestors(repo: &Repository, commit: &str) -> Result<HashSet<String>> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([commit.to_string()]);

    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if !CommitRecord::exists(repo, &current) {
            continue;
        }
        for parent in CommitRecord::read(repo, &current)?.parents {
            queue.push_back(parent);
        }
    }

    Ok(seen)
}

/// Whether `ancestor` is reachable from `descendant` via parent links.
pub fn is_ancestor(repo: &Repository, ancestor: &str, descendant: &str) -> Result<bool> {
    Ok(ancestors(repo, descendant)?.contains(ancestor))
}

/// The first commit reachable from `source` that is also an ancestor of
/// `target`, in breadth-first order.
pub fn merge_base(repo: &Repository, source: &str, target: &str) -> Result<Option<String>> {
    let target_ancestors = ancestors(repo, target)?;

    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([source.to_string()]);

    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if target_ancestors.contains(&current) {
            return Ok(Some(current));
        }
        if !CommitRecord::exists(repo, &current) {
            continue;
        }
        for parent in CommitRecord::read(repo, &current)?.parents {
            queue.push_back(parent);
        }
    }

    Ok(None)
}

/// Persist the merge-state file: two header lines, then one conflicted
/// path per line.
fn save_merge_state(repo: &Repository, state: &MergeState) -> Result<()> {
    let mut content = format!(
        "source {} {}\ntarget {} {}\n",
        state.source_branch, state.source_commit, state.target_branch, state.target_commit
    );
    for path in &state.conflicts {
        content.push_str(path);
        content.push('\n');
    }
    write_text(&repo.merge_head_path(), &content)
}

/// Load the merge-state file, if a merge is in progress.
pub fn load_merge_state(repo: &Repository) -> Result<Option<MergeState>> {
    let path = repo.merge_head_path();
    if !path.exists() {
        return Ok(None);
    }

    let content = read_text(&path)?;
    let mut source_branch = String::new();
    let mut source_commit = String::new();
    let mut target_branch = String::new();
    let mut target_commit = String::new();
    let mut conflicts = Vec::new();

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("source ") {
            let mut parts = rest.split_whitespace();
            source_branch = parts.next().unwrap_or("").to_string();
            source_commit = parts.next().unwrap_or("").to_string();
        } else if let Some(rest) = line.strip_prefix("target ") {
            let mut parts = rest.split_whitespace();
            target_branch = parts.next().unwrap_or("").to_string();
            target_commit = parts.next().unwrap_or("").to_string();
        } else if !line.is_empty() {
            conflicts.push(line.to_string());
        }
    }

    Ok(Some(MergeState {
        source_branch,
        source_commit,
        target_branch,
        target_commit,
        conflicts,
    }))
}

/// Conflicted paths of the in-progress merge, empty when none.
pub fn conflicted_files(repo: &Repository) -> Result<Vec<String>> {
    Ok(load_merge_state(repo)?.map(|s| s.conflicts).unwrap_or_default())
}

/// Abandon the in-progress merge. Conflict markers already written to
/// the working tree are left for the user to clean up.
pub fn abort(repo: &Repository) -> Result<()> {
    let path = repo.merge_head_path();
    if !path.exists() {
        return Err(Error::info(ErrorKind::State, "no merge in progress", "merge_abort"));
    }
    fs::remove_file(&path).map_err(|e| Error::io("merge_abort", &path, e))
}

/// Conclude a conflicted merge after the user has edited the files.
///
/// Every recorded conflict file must exist and be free of markers. The
/// non-conflicting changes are re-applied, everything is staged, and
/// the merge commit is created with both parents.
pub fn continue_merge(repo: &Repository) -> Result<MergeOutcome> {
    let state = load_merge_state(repo)?
        .ok_or_else(|| Error::info(ErrorKind::State, "no merge in progress", "merge_continue"))?;

    for path_str in &state.conflicts {
        let working = repo.root.join(path_str);
        if !working.exists() {
            return Err(Error::state(
                format!("conflicted file '{}' is missing", path_str),
                "merge_continue",
            ));
        }
        let content = fs::read_to_string(&working)
            .map_err(|e| Error::io("merge_continue", &working, e))?;
        if has_conflict_markers(&content) {
            return Err(Error::state(
                format!("'{}' still contains conflict markers", path_str),
                "merge_continue",
            ));
        }
    }

    // re-apply the clean side effects the conflicted run skipped
    let base = resolve_base(repo, &state)?;
    let outcomes = evaluate(repo, &base, &state.target_commit, &state.source_commit)?;
    let conflict_set: HashSet<&str> = state.conflicts.iter().map(|s| s.as_str()).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut deleted = Vec::new();
    for (path, outcome) in &outcomes {
        if conflict_set.contains(path.as_str()) {
            continue;
        }
        match outcome {
            FileOutcome::AddSource(content) => {
                write_working_file(repo, path, content)?;
                index::stage(repo, path.as_str())?;
                added.push(path.as_str().to_string());
            }
            FileOutcome::TakeSource(content) => {
                write_working_file(repo, path, content)?;
                index::stage(repo, path.as_str())?;
                modified.push(path.as_str().to_string());
            }
            FileOutcome::Delete => {
                let working = path.to_path(&repo.root);
                if working.exists() {
                    fs::remove_file(&working).map_err(|e| Error::io("merge_continue", &working, e))?;
                }
                deleted.push(path.as_str().to_string());
            }
            _ => {}
        }
    }

    for path_str in &state.conflicts {
        index::stage(repo, path_str)?;
        modified.push(path_str.clone());
    }

    let message = format!(
        "Merge branch '{}' into {}",
        state.source_branch, state.target_branch
    );
    let merge_commit = commit::commit_with_parents(
        repo,
        MERGE_AUTHOR,
        &message,
        vec![state.target_commit.clone(), state.source_commit.clone()],
    )?;

    let path = repo.merge_head_path();
    fs::remove_file(&path).map_err(|e| Error::io("merge_continue", &path, e))?;

    Ok(MergeOutcome::Merged {
        commit: merge_commit,
        added,
        modified,
        deleted,
    })
}

fn resolve_base(repo: &Repository, state: &MergeState) -> Result<String> {
    merge_base(repo, &state.source_commit, &state.target_commit)?
        .ok_or_else(|| Error::state("no common ancestor found", "merge_continue"))
}

fn has_conflict_markers(content: &str) -> bool {
    content.lines().any(|line| {
        line.starts_with("<<<<<<<") || line.starts_with("=======") || line.starts_with(">>>>>>>")
    })
}
