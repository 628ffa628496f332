//! Command-line entry point.
//!
//! Parses the flag surface, opens the repository once, and dispatches
//! into the library. Errors are printed coloured by severity and mapped
//! to the process exit code.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

use bittrack::error::{Error, ErrorKind, Result, Severity};
use bittrack::{commit, config, diff, index, merge, refs, stash, worktree, Repository};

/// BitTrack - a local content-addressed version control system
#[derive(Parser)]
#[command(name = "bittrack")]
#[command(version = "0.1.0")]
#[command(about = "A local content-addressed version control system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// List staged and unstaged files
    #[arg(long)]
    status: bool,

    /// Stage one path, or the entire tree with '.'
    #[arg(long, value_name = "PATH")]
    stage: Option<String>,

    /// Remove a path from the index
    #[arg(long, value_name = "PATH")]
    unstage: Option<String>,

    /// Read a message from standard input and create a commit
    #[arg(long)]
    commit: bool,

    /// Print the commit history
    #[arg(long)]
    log: bool,

    /// Print the tip hash of the checked-out branch
    #[arg(long = "current-commit")]
    current_commit: bool,

    /// Print each staged entry as "<path> <hash>"
    #[arg(long = "staged-files-hashes")]
    staged_files_hashes: bool,

    /// Branch operations: -l (list), -c <name> (create), -r <name> (remove)
    #[arg(long, num_args = 1..=2, allow_hyphen_values = true, value_name = "ARGS")]
    branch: Option<Vec<String>>,

    /// Switch to another branch
    #[arg(long, value_name = "BRANCH")]
    checkout: Option<String>,

    /// Merge a source branch into a target branch
    #[arg(long, num_args = 2, value_names = ["SOURCE", "TARGET"])]
    merge: Option<Vec<String>>,

    /// Abandon the merge in progress
    #[arg(long = "merge-abort")]
    merge_abort: bool,

    /// Conclude the merge in progress after resolving conflicts
    #[arg(long = "merge-continue")]
    merge_continue: bool,

    /// List conflicted paths of the merge in progress
    #[arg(long)]
    conflicts: bool,

    /// Tag operations: -l (list), -c <name> [<message>] (create), -r <name> (remove)
    #[arg(long, num_args = 1..=3, allow_hyphen_values = true, value_name = "ARGS")]
    tag: Option<Vec<String>>,

    /// Stash operations: save [<msg>], list, show [<id>], apply [<id>],
    /// pop [<id>], drop <id>, clear
    #[arg(long, num_args = 1..=2, value_name = "ARGS")]
    stash: Option<Vec<String>>,

    /// Diff: no value for working vs last commit, 'staged', 'unstaged',
    /// or two commit hashes
    #[arg(long, num_args = 0..=2, value_name = "ARGS")]
    diff: Option<Vec<String>>,

    /// Config: -l (list), <key> (get), <key> <value> (set)
    #[arg(long, num_args = 1..=2, allow_hyphen_values = true, value_name = "ARGS")]
    config: Option<Vec<String>>,

    /// Apply --config to the global scope
    #[arg(long)]
    global: bool,

    /// Confirm branch switches despite uncommitted changes
    #[arg(long)]
    yes: bool,

    /// Delete the repository metadata directory
    #[arg(long = "remove-repo")]
    remove_repo: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create the .bittrack directory and seed the default branch
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error(&err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(Command::Init) = cli.command {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::io("init", std::path::Path::new("."), e))?;
        Repository::init(&cwd, &config::init_default_branch())?;
        println!("Initialized empty bittrack repository.");
        return Ok(());
    }

    let repo = Repository::find()?;

    if cli.status {
        status(&repo)
    } else if let Some(path) = &cli.stage {
        run_stage(&repo, path)
    } else if let Some(path) = &cli.unstage {
        index::unstage(&repo, path)
    } else if cli.commit {
        run_commit(&repo)
    } else if cli.log {
        run_log(&repo)
    } else if cli.current_commit {
        run_current_commit(&repo)
    } else if cli.staged_files_hashes {
        run_staged_hashes(&repo)
    } else if let Some(args) = &cli.branch {
        run_branch(&repo, args)
    } else if let Some(branch) = &cli.checkout {
        run_checkout(&repo, branch, cli.yes)
    } else if let Some(args) = &cli.merge {
        run_merge(&repo, &args[0], &args[1])
    } else if cli.merge_abort {
        merge::abort(&repo).map(|()| println!("Merge aborted."))
    } else if cli.merge_continue {
        run_merge_continue(&repo)
    } else if cli.conflicts {
        run_conflicts(&repo)
    } else if let Some(args) = &cli.tag {
        run_tag(&repo, args)
    } else if let Some(args) = &cli.stash {
        run_stash(&repo, args)
    } else if let Some(args) = &cli.diff {
        run_diff(&repo, args)
    } else if let Some(args) = &cli.config {
        run_config(&repo, args, cli.global)
    } else if cli.remove_repo {
        repo.remove().map(|()| println!("Repository removed."))
    } else {
        Err(Error::validation("no operation requested; see --help", "cli"))
    }
}

fn status(repo: &Repository) -> Result<()> {
    println!("On branch {}", refs::current_branch(repo)?);
    println!();

    println!("staged files:");
    for file in index::staged_files(repo)? {
        println!("  {}", style(file).green());
    }

    println!();
    println!("unstaged files:");
    for file in index::unstaged_files(repo)? {
        println!("  {}", style(file).red());
    }

    Ok(())
}

fn run_stage(repo: &Repository, path: &str) -> Result<()> {
    let report = index::stage(repo, path)?;
    for file in &report.staged {
        println!("staged: {}", file);
    }
    for file in &report.unchanged {
        println!("already staged and unchanged: {}", file);
    }
    Ok(())
}

fn run_commit(repo: &Repository) -> Result<()> {
    print!("message: ");
    io::stdout()
        .flush()
        .map_err(|e| Error::io("commit", std::path::Path::new("stdout"), e))?;

    let mut message = String::new();
    io::stdin()
        .lock()
        .read_line(&mut message)
        .map_err(|e| Error::io("commit", std::path::Path::new("stdin"), e))?;

    let author = config::author(repo)?;
    let hash = commit::commit_changes(repo, &author, message.trim())?;
    println!("[{}] committed", &hash[..7.min(hash.len())]);
    Ok(())
}

fn run_log(repo: &Repository) -> Result<()> {
    for record in commit::history(repo)? {
        print!("{}", record.serialize());
        println!();
    }
    Ok(())
}

fn run_current_commit(repo: &Repository) -> Result<()> {
    match commit::current_commit(repo)? {
        Some(hash) => println!("{}", hash),
        None => println!(),
    }
    Ok(())
}

fn run_staged_hashes(repo: &Repository) -> Result<()> {
    let loaded = index::Index::load(repo)?;
    for (path, hash) in loaded.entries() {
        println!("{} {}", path, hash);
    }
    Ok(())
}

fn run_branch(repo: &Repository, args: &[String]) -> Result<()> {
    match args[0].as_str() {
        "-l" => {
            let current = refs::current_branch(repo)?;
            for branch in refs::list_branches(repo)? {
                if branch == current {
                    println!("* {}", style(branch).green());
                } else {
                    println!("  {}", branch);
                }
            }
            Ok(())
        }
        "-c" => {
            let name = branch_arg(args)?;
            refs::create_branch(repo, name)?;
            println!("Created branch '{}'", name);
            Ok(())
        }
        "-r" => {
            let name = branch_arg(args)?;
            refs::remove_branch(repo, name)?;
            println!("Removed branch '{}'", name);
            Ok(())
        }
        other => Err(Error::validation(
            format!("unknown branch flag '{}'; use -l, -c, or -r", other),
            "branch",
        )),
    }
}

fn branch_arg(args: &[String]) -> Result<&str> {
    args.get(1)
        .map(|s| s.as_str())
        .ok_or_else(|| Error::validation("branch name missing", "branch"))
}

fn run_checkout(repo: &Repository, branch: &str, assume_yes: bool) -> Result<()> {
    match worktree::switch_branch(repo, branch, assume_yes) {
        Ok(()) => {
            println!("Switched to branch '{}'", branch);
            Ok(())
        }
        Err(err) if err.kind == ErrorKind::State && err.message.contains("uncommitted") => {
            println!("{}", err.message);
            if confirm("Do you want to continue? (y/N): ")? {
                worktree::switch_branch(repo, branch, true)?;
                println!("Switched to branch '{}'", branch);
                Ok(())
            } else {
                println!("Branch switch cancelled.");
                Ok(())
            }
        }
        Err(err) => Err(err),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout()
        .flush()
        .map_err(|e| Error::io("confirm", std::path::Path::new("stdout"), e))?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| Error::io("confirm", std::path::Path::new("stdin"), e))?;

    let answer = answer.trim();
    Ok(answer == "y" || answer == "Y")
}

fn run_merge(repo: &Repository, source: &str, target: &str) -> Result<()> {
    match merge::merge(repo, source, target)? {
        merge::MergeOutcome::AlreadyUpToDate => {
            println!("Already up to date.");
            Ok(())
        }
        merge::MergeOutcome::FastForward { commit } => {
            println!("Fast-forward to {}", &commit[..7.min(commit.len())]);
            Ok(())
        }
        merge::MergeOutcome::Merged {
            commit,
            added,
            modified,
            deleted,
        } => {
            println!("Merge completed successfully.");
            println!("  added: {}, modified: {}, deleted: {}", added.len(), modified.len(), deleted.len());
            println!("  merge commit: {}", &commit[..7.min(commit.len())]);
            Ok(())
        }
        merge::MergeOutcome::Conflicts { files } => {
            println!("Merge conflicts detected in {} file(s):", files.len());
            for file in &files {
                println!("  {}", style(file).red());
            }
            println!("Resolve them, then run --merge-continue, or --merge-abort.");
            Err(Error::state("merge conflicts detected", "merge"))
        }
    }
}

fn run_merge_continue(repo: &Repository) -> Result<()> {
    if let merge::MergeOutcome::Merged { commit, .. } = merge::continue_merge(repo)? {
        println!("Merge concluded with commit {}", &commit[..7.min(commit.len())]);
    }
    Ok(())
}

fn run_conflicts(repo: &Repository) -> Result<()> {
    let files = merge::conflicted_files(repo)?;
    if files.is_empty() {
        println!("No conflicts found.");
    } else {
        println!("Conflicted files:");
        for file in files {
            println!("  {}", file);
        }
    }
    Ok(())
}

fn run_tag(repo: &Repository, args: &[String]) -> Result<()> {
    match args[0].as_str() {
        "-l" => {
            for tag in refs::list_tags(repo)? {
                println!("{}", tag);
            }
            Ok(())
        }
        "-c" => {
            let name = args
                .get(1)
                .ok_or_else(|| Error::validation("tag name missing", "tag"))?;
            let message = args.get(2).map(|s| s.as_str());
            let tagger = config::author(repo)?;
            refs::create_tag(repo, name, message, &tagger)?;
            println!("Created tag '{}'", name);
            Ok(())
        }
        "-r" => {
            let name = args
                .get(1)
                .ok_or_else(|| Error::validation("tag name missing", "tag"))?;
            refs::delete_tag(repo, name)?;
            println!("Removed tag '{}'", name);
            Ok(())
        }
        other => Err(Error::validation(
            format!("unknown tag flag '{}'; use -l, -c, or -r", other),
            "tag",
        )),
    }
}

fn run_stash(repo: &Repository, args: &[String]) -> Result<()> {
    let argument = args.get(1).map(|s| s.as_str());

    match args[0].as_str() {
        "save" => {
            let entry = stash::save(repo, argument)?;
            println!("Stashed staged files: {}", entry.message);
            Ok(())
        }
        "list" => {
            let entries = stash::entries(repo)?;
            if entries.is_empty() {
                println!("No stashes found.");
            }
            for entry in entries {
                println!("  {}: {} ({})", entry.id, entry.message, format_timestamp(entry.timestamp));
            }
            Ok(())
        }
        "show" => {
            let entries = stash::entries(repo)?;
            let entry = match argument {
                Some(id) => entries.into_iter().find(|e| e.id == id).ok_or_else(|| {
                    Error::not_found(format!("stash '{}' not found", id), "stash")
                })?,
                None => entries.into_iter().next().ok_or_else(|| {
                    Error::info(ErrorKind::NotFound, "no stashes found", "stash")
                })?,
            };

            println!("Stash: {}", entry.id);
            println!("Message: {}", entry.message);
            println!("Branch: {}", entry.branch);
            println!("Commit: {}", entry.commit);
            println!("Timestamp: {}", format_timestamp(entry.timestamp));
            for file in stash::captured_files(repo, &entry.id)? {
                println!("  {}", file);
            }
            Ok(())
        }
        "apply" => {
            let entry = stash::apply(repo, argument)?;
            println!("Applied stash: {}", entry.message);
            Ok(())
        }
        "pop" => {
            let entry = stash::pop(repo, argument)?;
            println!("Popped stash: {}", entry.message);
            Ok(())
        }
        "drop" => {
            let id = argument
                .ok_or_else(|| Error::validation("stash id required for drop", "stash"))?;
            stash::drop_entry(repo, id)?;
            println!("Dropped stash: {}", id);
            Ok(())
        }
        "clear" => {
            stash::clear(repo)?;
            println!("Cleared all stashes.");
            Ok(())
        }
        other => Err(Error::validation(
            format!("unknown stash operation '{}'", other),
            "stash",
        )),
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};
    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}

fn run_diff(repo: &Repository, args: &[String]) -> Result<()> {
    let diffs = match args {
        [] => diff::diff_working(repo)?,
        [mode] if mode == "staged" => diff::diff_staged(repo)?,
        [mode] if mode == "unstaged" => diff::diff_unstaged(repo)?,
        [old, new] => diff::diff_commits(repo, old, new)?,
        _ => {
            return Err(Error::validation(
                "usage: --diff [staged|unstaged|<commit> <commit>]",
                "diff",
            ))
        }
    };

    if diffs.is_empty() {
        println!("No differences found.");
        return Ok(());
    }

    for file_diff in diffs {
        print!("{}", diff::render(&file_diff));
    }
    Ok(())
}

fn run_config(repo: &Repository, args: &[String], global: bool) -> Result<()> {
    let scope = if global {
        config::ConfigScope::Global
    } else {
        config::ConfigScope::Repository
    };

    match args {
        [flag] if flag == "-l" => {
            let loaded = config::load(Some(repo), scope)?;
            for (key, value) in loaded.entries() {
                println!("{}={}", key, value);
            }
            Ok(())
        }
        [key] => {
            match config::get(repo, key)? {
                Some(value) => println!("{}", value),
                None => println!(),
            }
            Ok(())
        }
        [key, value] => config::set(Some(repo), scope, key, value),
        _ => Err(Error::validation("usage: --config -l | <key> [<value>]", "config")),
    }
}

fn print_error(err: &Error) {
    let label = match err.severity {
        Severity::Info => style(format!("[{}]", err.severity)).cyan(),
        Severity::Warning => style(format!("[{}]", err.severity)).yellow(),
        Severity::Error => style(format!("[{}]", err.severity)).red(),
        Severity::Fatal => style(format!("[{}]", err.severity)).magenta(),
    };

    eprintln!("{} ({}) {}", label, err.context, err.message);

    if let Some(hint) = err.recovery_hint() {
        eprintln!("  {}", hint);
    }
}
