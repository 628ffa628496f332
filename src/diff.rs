//! # Diff Engine
//!
//! Line-level diffs between two content sources. Lines are paired by
//! index: equal pairs become context, unequal pairs emit a deletion and
//! an addition, and excess lines on either side are pure additions or
//! deletions. Runs of changes are grouped into hunks.
//!
//! A file is binary when a NUL byte appears in its first 1024 bytes;
//! binary diffs carry no hunks.

use std::collections::BTreeSet;

use crate::commit::CommitRecord;
use crate::error::Result;
use crate::index::{self, Index};
use crate::paths::RepoPath;
use crate::{objects, refs, Repository};

/// How many leading bytes are scanned for NUL when deciding binary.
const BINARY_SNIFF_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Context,
    Addition,
    Deletion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub content: String,
}

/// One run of changed lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

impl DiffHunk {
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )
    }
}

/// Diff of one file between two content sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub is_binary: bool,
    pub hunks: Vec<DiffHunk>,
}

impl FileDiff {
    pub fn has_changes(&self) -> bool {
        self.is_binary || !self.hunks.is_empty()
    }
}

/// NUL in the first 1024 bytes marks content as binary.
pub fn is_binary(content: &[u8]) -> bool {
    let limit = content.len().min(BINARY_SNIFF_LEN);
    content[..limit].contains(&0)
}

fn split_lines(content: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(content)
        .lines()
        .map(|s| s.to_string())
        .collect()
}

/// Diff two byte buffers into hunks.
pub fn compare_bytes(path: &str, old: &[u8], new: &[u8]) -> FileDiff {
    if is_binary(old) || is_binary(new) {
        return FileDiff {
            path: path.to_string(),
            is_binary: true,
            hunks: Vec::new(),
        };
    }

    let old_lines = split_lines(old);
    let new_lines = split_lines(new);

    FileDiff {
        path: path.to_string(),
        is_binary: false,
        hunks: compute_hunks(&old_lines, &new_lines),
    }
}

/// Pair lines positionally and group the changed runs into hunks.
fn compute_hunks(old_lines: &[String], new_lines: &[String]) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut current: Option<DiffHunk> = None;

    let mut old_line = 1usize;
    let mut new_line = 1usize;
    let max_lines = old_lines.len().max(new_lines.len());

    for i in 0..max_lines {
        let old_exists = i < old_lines.len();
        let new_exists = i < new_lines.len();

        if old_exists && new_exists && old_lines[i] == new_lines[i] {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            old_line += 1;
            new_line += 1;
            continue;
        }

        let hunk = current.get_or_insert_with(|| DiffHunk {
            old_start: old_line,
            old_count: 0,
            new_start: new_line,
            new_count: 0,
            lines: Vec::new(),
        });

        if old_exists {
            hunk.lines.push(DiffLine {
                kind: DiffLineKind::Deletion,
                content: old_lines[i].clone(),
            });
            hunk.old_count += 1;
            old_line += 1;
        }
        if new_exists {
            hunk.lines.push(DiffLine {
                kind: DiffLineKind::Addition,
                content: new_lines[i].clone(),
            });
            hunk.new_count += 1;
            new_line += 1;
        }
    }

    if let Some(hunk) = current.take() {
        hunks.push(hunk);
    }

    hunks
}

/// Render a diff in unified style. Binary diffs collapse to a notice.
pub fn render(diff: &FileDiff) -> String {
    if diff.is_binary {
        return format!("Binary files a/{} and b/{} differ\n", diff.path, diff.path);
    }

    let mut out = String::new();
    out.push_str(&format!("--- a/{}\n", diff.path));
    out.push_str(&format!("+++ b/{}\n", diff.path));

    for hunk in &diff.hunks {
        out.push_str(&hunk.header());
        out.push('\n');
        for line in &hunk.lines {
            let prefix = match line.kind {
                DiffLineKind::Addition => '+',
                DiffLineKind::Deletion => '-',
                DiffLineKind::Context => ' ',
            };
            out.push(prefix);
            out.push_str(&line.content);
            out.push('\n');
        }
    }

    out
}

fn working_bytes(repo: &Repository, path: &RepoPath) -> Vec<u8> {
    std::fs::read(path.to_path(&repo.root)).unwrap_or_default()
}

fn tip_blob(repo: &Repository, path: &RepoPath) -> Result<Vec<u8>> {
    let branch = refs::current_branch(repo)?;
    match refs::branch_tip(repo, &branch)? {
        Some(tip) => Ok(objects::read_blob_opt(repo, &branch, &tip, path)?.unwrap_or_default()),
        None => Ok(Vec::new()),
    }
}

/// Staged files against their blobs in the last commit.
pub fn diff_staged(repo: &Repository) -> Result<Vec<FileDiff>> {
    let mut diffs = Vec::new();

    for path_str in index::staged_files(repo)? {
        let path = RepoPath::parse(&path_str, "diff")?;
        let old = tip_blob(repo, &path)?;
        let new = working_bytes(repo, &path);

        let diff = compare_bytes(&path_str, &old, &new);
        if diff.has_changes() {
            diffs.push(diff);
        }
    }

    Ok(diffs)
}

/// Unstaged files against the staged state.
///
/// The index stores hashes only, so the nearest recoverable baseline
/// for a modified file is its blob in the last commit; files never
/// staged diff against empty content.
pub fn diff_unstaged(repo: &Repository) -> Result<Vec<FileDiff>> {
    let index = Index::load(repo)?;
    let mut diffs = Vec::new();

    for path_str in index::unstaged_files(repo)? {
        let path = RepoPath::parse(&path_str, "diff")?;
        let new = working_bytes(repo, &path);
        let old = if index.contains(&path_str) {
            tip_blob(repo, &path)?
        } else {
            Vec::new()
        };

        let diff = compare_bytes(&path_str, &old, &new);
        if diff.has_changes() {
            diffs.push(diff);
        }
    }

    Ok(diffs)
}

/// Every working-tree or tracked file against the last commit.
pub fn diff_working(repo: &Repository) -> Result<Vec<FileDiff>> {
    let branch = refs::current_branch(repo)?;
    let tip = match refs::branch_tip(repo, &branch)? {
        Some(tip) => tip,
        None => return Ok(Vec::new()),
    };

    let mut all_paths = BTreeSet::new();
    for path in index::staged_files(repo)? {
        all_paths.insert(path);
    }
    for path in index::unstaged_files(repo)? {
        all_paths.insert(path);
    }
    for path in objects::list_snapshot_files(repo, &branch, &tip)? {
        all_paths.insert(path.as_str().to_string());
    }

    let mut diffs = Vec::new();
    for path_str in all_paths {
        let path = RepoPath::parse(&path_str, "diff")?;
        let old = objects::read_blob_opt(repo, &branch, &tip, &path)?.unwrap_or_default();
        let new = working_bytes(repo, &path);

        let diff = compare_bytes(&path_str, &old, &new);
        if diff.has_changes() {
            diffs.push(diff);
        }
    }

    Ok(diffs)
}

/// Arbitrary commit-to-commit comparison.
pub fn diff_commits(repo: &Repository, old_commit: &str, new_commit: &str) -> Result<Vec<FileDiff>> {
    let old_record = CommitRecord::read(repo, old_commit)?;
    let new_record = CommitRecord::read(repo, new_commit)?;

    let mut all_paths = BTreeSet::new();
    all_paths.extend(old_record.files.keys().cloned());
    all_paths.extend(new_record.files.keys().cloned());

    let mut diffs = Vec::new();
    for path_str in all_paths {
        let path = RepoPath::parse(&path_str, "diff")?;
        let old = objects::read_blob_opt(repo, &old_record.branch, &old_record.hash, &path)?
            .unwrap_or_default();
        let new = objects::read_blob_opt(repo, &new_record.branch, &new_record.hash, &path)?
            .unwrap_or_default();

        let diff = compare_bytes(&path_str, &old, &new);
        if diff.has_changes() {
            diffs.push(diff);
        }
    }

    Ok(diffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit;
    use std::fs;
    use tempfile::tempdir;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identical_content_has_no_hunks() {
        let content = lines(&["a", "b"]);
        assert!(compute_hunks(&content, &content).is_empty());
    }

    #[test]
    fn test_changed_line_pairs_deletion_with_addition() {
        let old = lines(&["a", "b", "c"]);
        let new = lines(&["a", "x", "c"]);

        let hunks = compute_hunks(&old, &new);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].old_start, 2);
        assert_eq!(hunks[0].new_start, 2);
        assert_eq!(hunks[0].old_count, 1);
        assert_eq!(hunks[0].new_count, 1);
        assert_eq!(hunks[0].lines[0].kind, DiffLineKind::Deletion);
        assert_eq!(hunks[0].lines[0].content, "b");
        assert_eq!(hunks[0].lines[1].kind, DiffLineKind::Addition);
        assert_eq!(hunks[0].lines[1].content, "x");
    }

    #[test]
    fn test_excess_lines_are_pure_additions() {
        let old = lines(&["a"]);
        let new = lines(&["a", "b", "c"]);

        let hunks = compute_hunks(&old, &new);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].old_count, 0);
        assert_eq!(hunks[0].new_count, 2);
        assert_eq!(hunks[0].header(), "@@ -2,0 +2,2 @@");
    }

    #[test]
    fn test_shifted_lines_diff_positionally() {
        // an inserted first line misaligns everything after it
        let old = lines(&["b", "c"]);
        let new = lines(&["a", "b", "c"]);

        let hunks = compute_hunks(&old, &new);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].old_count, 2);
        assert_eq!(hunks[0].new_count, 3);
    }

    #[test]
    fn test_separate_runs_make_separate_hunks() {
        let old = lines(&["a", "b", "c", "d", "e"]);
        let new = lines(&["a", "x", "c", "d", "y"]);

        let hunks = compute_hunks(&old, &new);
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].old_start, 2);
        assert_eq!(hunks[1].old_start, 5);
    }

    #[test]
    fn test_binary_detection_boundary() {
        let mut early_nul = vec![b'x'; 1024];
        early_nul[1023] = 0;
        assert!(is_binary(&early_nul));

        let mut late_nul = vec![b'x'; 1025];
        late_nul[1024] = 0;
        assert!(!is_binary(&late_nul));
    }

    #[test]
    fn test_binary_diff_has_no_hunks() {
        let diff = compare_bytes("blob.bin", b"a\0b", b"text");
        assert!(diff.is_binary);
        assert!(diff.hunks.is_empty());
        assert!(render(&diff).contains("differ"));
    }

    #[test]
    fn test_render_unified_format() {
        let diff = compare_bytes("a.txt", b"one\n", b"two\n");
        let text = render(&diff);
        assert!(text.starts_with("--- a/a.txt\n+++ b/a.txt\n"));
        assert!(text.contains("@@ -1,1 +1,1 @@\n"));
        assert!(text.contains("-one\n"));
        assert!(text.contains("+two\n"));
    }

    #[test]
    fn test_diff_staged_against_last_commit() {
        let temp = tempdir().unwrap();
        let repo = Repository::init(temp.path(), "master").unwrap();

        fs::write(repo.root.join("a.txt"), b"v1\n").unwrap();
        index::stage(&repo, "a.txt").unwrap();
        commit::commit_changes(&repo, "alice", "first").unwrap();

        fs::write(repo.root.join("a.txt"), b"v2\n").unwrap();
        index::stage(&repo, "a.txt").unwrap();

        let diffs = diff_staged(&repo).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "a.txt");
        assert_eq!(diffs[0].hunks[0].lines[0].content, "v1");
        assert_eq!(diffs[0].hunks[0].lines[1].content, "v2");
    }

    #[test]
    fn test_diff_commits() {
        let temp = tempdir().unwrap();
        let repo = Repository::init(temp.path(), "master").unwrap();

        fs::write(repo.root.join("a.txt"), b"old\n").unwrap();
        index::stage(&repo, "a.txt").unwrap();
        let first = commit::commit_changes(&repo, "alice", "first").unwrap();

        fs::write(repo.root.join("a.txt"), b"new\n").unwrap();
        index::stage(&repo, "a.txt").unwrap();
        let second = commit::commit_changes(&repo, "alice", "second").unwrap();

        let diffs = diff_commits(&repo, &first, &second).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].hunks[0].lines[0].content, "old");
        assert_eq!(diffs[0].hunks[0].lines[1].content, "new");
    }
}
