//! End-to-end scenarios driven through the library surface, each one
//! starting from a freshly initialized repository in a temporary
//! directory.

use std::fs;

use anyhow::Result;
use tempfile::{tempdir, TempDir};

use bittrack::{commit, hash, index, merge, refs, worktree, Repository};

fn init_repo() -> Result<(TempDir, Repository)> {
    let temp = tempdir()?;
    let repo = Repository::init(temp.path(), "master")?;
    Ok((temp, repo))
}

fn write_and_stage(repo: &Repository, path: &str, content: &[u8]) -> Result<()> {
    let full = repo.root.join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(full, content)?;
    index::stage(repo, path)?;
    Ok(())
}

#[test]
fn first_commit_lays_out_the_repository() -> Result<()> {
    let (_temp, repo) = init_repo()?;

    write_and_stage(&repo, "a.txt", b"hello\n")?;
    let hash = commit::commit_changes(&repo, "alice", "first")?;

    // the branch ref now holds a non-empty hash
    let tip = fs::read_to_string(repo.heads_dir().join("master"))?;
    assert_eq!(tip.trim(), hash);
    assert!(!tip.trim().is_empty());

    // the record begins with the author line
    let record = fs::read_to_string(repo.commits_dir().join(&hash))?;
    assert!(record.starts_with("Author:"));

    // the blob is stored byte-for-byte
    let blob = fs::read(repo.objects_dir().join("master").join(&hash).join("a.txt"))?;
    assert_eq!(blob, b"hello\n");

    // the index file is empty again
    assert_eq!(fs::read_to_string(repo.index_path())?, "");

    Ok(())
}

#[test]
fn unstage_returns_file_to_the_unstaged_listing() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    write_and_stage(&repo, "a.txt", b"hello\n")?;
    commit::commit_changes(&repo, "alice", "first")?;

    fs::write(repo.root.join("a.txt"), b"world\n")?;
    index::stage(&repo, "a.txt")?;
    index::unstage(&repo, "a.txt")?;

    assert!(index::staged_files(&repo)?.is_empty());
    assert!(index::unstaged_files(&repo)?.contains(&"a.txt".to_string()));

    Ok(())
}

#[test]
fn branch_switch_preserves_untracked_files() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    write_and_stage(&repo, "a.txt", b"hello\n")?;
    commit::commit_changes(&repo, "alice", "first")?;

    fs::write(repo.root.join("scratch.txt"), b"x")?;

    refs::create_branch(&repo, "feature")?;
    worktree::switch_branch(&repo, "feature", false)?;

    assert_eq!(fs::read(repo.root.join("scratch.txt"))?, b"x");
    assert!(repo.root.join("a.txt").exists());
    assert_eq!(refs::current_branch(&repo)?, "feature");

    Ok(())
}

#[test]
fn clean_merge_brings_in_the_new_file() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    write_and_stage(&repo, "a.txt", b"hello\n")?;
    commit::commit_changes(&repo, "alice", "first")?;

    refs::create_branch(&repo, "feature")?;
    worktree::switch_branch(&repo, "feature", false)?;
    write_and_stage(&repo, "b.txt", b"B")?;
    commit::commit_changes(&repo, "alice", "add b")?;

    worktree::switch_branch(&repo, "master", false)?;
    let history_before = refs::read_history(&repo)?.len();
    merge::merge(&repo, "feature", "master")?;

    assert_eq!(fs::read(repo.root.join("a.txt"))?, b"hello\n");
    assert_eq!(fs::read(repo.root.join("b.txt"))?, b"B");
    assert!(refs::read_history(&repo)?.len() > history_before);
    assert!(!repo.merge_head_path().exists());

    Ok(())
}

#[test]
fn conflicting_merge_writes_markers_and_state() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    write_and_stage(&repo, "a.txt", b"hello\n")?;
    commit::commit_changes(&repo, "alice", "first")?;

    // fork before the divergent edits
    refs::create_branch(&repo, "feature")?;

    fs::write(repo.root.join("a.txt"), b"M\n")?;
    index::stage(&repo, "a.txt")?;
    let master_tip = commit::commit_changes(&repo, "alice", "master edit")?;

    worktree::switch_branch(&repo, "feature", false)?;
    fs::write(repo.root.join("a.txt"), b"F\n")?;
    index::stage(&repo, "a.txt")?;
    commit::commit_changes(&repo, "alice", "feature edit")?;

    worktree::switch_branch(&repo, "master", false)?;
    let outcome = merge::merge(&repo, "feature", "master")?;
    assert_eq!(
        outcome,
        merge::MergeOutcome::Conflicts {
            files: vec!["a.txt".to_string()]
        }
    );

    let content = fs::read_to_string(repo.root.join("a.txt"))?;
    assert_eq!(content, "<<<<<<< HEAD\nM\n=======\nF\n>>>>>>> theirs\n");

    let state = fs::read_to_string(repo.merge_head_path())?;
    assert!(state.lines().any(|line| line == "a.txt"));

    // no new commit was produced
    assert_eq!(
        refs::branch_tip(&repo, "master")?.as_deref(),
        Some(master_tip.as_str())
    );

    Ok(())
}

#[test]
fn ignore_negation_limits_a_full_tree_stage() -> Result<()> {
    let (_temp, repo) = init_repo()?;

    fs::write(repo.ignore_path(), "build/\n!build/keep.txt\n")?;
    fs::create_dir_all(repo.root.join("build"))?;
    fs::write(repo.root.join("build/a.o"), b"obj")?;
    fs::write(repo.root.join("build/keep.txt"), b"keep")?;

    index::stage(&repo, ".")?;

    assert_eq!(index::staged_files(&repo)?, vec!["build/keep.txt"]);

    Ok(())
}

#[test]
fn every_recorded_blob_exists_and_matches_its_hash() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    write_and_stage(&repo, "a.txt", b"one\n")?;
    write_and_stage(&repo, "dir/b.txt", b"two\n")?;
    commit::commit_changes(&repo, "alice", "first")?;

    write_and_stage(&repo, "a.txt", b"three\n")?;
    commit::commit_changes(&repo, "alice", "second")?;

    for (commit_hash, _branch) in refs::read_history(&repo)? {
        let record = commit::CommitRecord::read(&repo, &commit_hash)?;
        for (path, recorded) in &record.files {
            let blob = repo
                .objects_dir()
                .join(&record.branch)
                .join(&record.hash)
                .join(path);
            assert!(blob.exists(), "missing blob for {}", path);
            assert_eq!(&hash::hash_file(&blob)?, recorded);
        }
    }

    Ok(())
}

#[test]
fn branch_tips_point_at_records_for_their_branch() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    write_and_stage(&repo, "a.txt", b"x")?;
    commit::commit_changes(&repo, "alice", "first")?;

    refs::create_branch(&repo, "feature")?;
    worktree::switch_branch(&repo, "feature", false)?;
    write_and_stage(&repo, "b.txt", b"y")?;
    commit::commit_changes(&repo, "alice", "second")?;

    for branch in refs::list_branches(&repo)? {
        if let Some(tip) = refs::branch_tip(&repo, &branch)? {
            let record = commit::CommitRecord::read(&repo, &tip)?;
            assert_eq!(record.branch, branch);
        }
    }

    Ok(())
}

#[test]
fn checkout_roundtrip_preserves_content() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    let original = b"line 1\nline 2\n";
    write_and_stage(&repo, "a.txt", original)?;
    commit::commit_changes(&repo, "alice", "first")?;

    refs::create_branch(&repo, "other")?;
    worktree::switch_branch(&repo, "other", false)?;
    worktree::switch_branch(&repo, "master", false)?;

    assert_eq!(fs::read(repo.root.join("a.txt"))?, original);

    Ok(())
}

#[test]
fn commit_with_empty_index_is_refused() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    let err = commit::commit_changes(&repo, "alice", "nothing").unwrap_err();
    assert_eq!(err.message, "no files staged");
    Ok(())
}

#[test]
fn branch_named_head_is_rejected() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    write_and_stage(&repo, "a.txt", b"x")?;
    commit::commit_changes(&repo, "alice", "first")?;

    assert!(refs::create_branch(&repo, "HEAD").is_err());
    Ok(())
}

#[test]
fn merging_a_branch_into_itself_is_rejected() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    write_and_stage(&repo, "a.txt", b"x")?;
    commit::commit_changes(&repo, "alice", "first")?;

    assert!(merge::merge(&repo, "master", "master").is_err());
    Ok(())
}

#[test]
fn identical_trees_merge_without_conflicts_or_changes() -> Result<()> {
    let (_temp, repo) = init_repo()?;
    write_and_stage(&repo, "a.txt", b"same\n")?;
    commit::commit_changes(&repo, "alice", "first")?;

    refs::create_branch(&repo, "twin")?;

    let outcome = merge::merge(&repo, "twin", "master")?;
    assert_eq!(outcome, merge::MergeOutcome::AlreadyUpToDate);
    assert_eq!(fs::read(repo.root.join("a.txt"))?, b"same\n");

    Ok(())
}
