//! # Error Types
//!
//! A single fallible result type for every repository operation. Each
//! error carries a kind (the broad category), a human-readable message,
//! a severity, and the name of the operation that produced it.

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The metadata directory is missing or incomplete.
    NotInRepository,
    /// The metadata directory exists but its contents are inconsistent.
    RepositoryCorrupted,
    /// Invalid user input: path, branch name, commit message, key.
    Validation,
    /// A file, branch, tag, commit, or stash entry does not exist.
    NotFound,
    /// A branch, tag, or repository with that name already exists.
    AlreadyExists,
    /// The repository is in a state that forbids the operation.
    State,
    /// An underlying filesystem operation failed.
    Filesystem,
    /// Anything else.
    Unexpected,
}

/// How serious a failure is, from informational to process-terminating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        };
        write!(f, "{}", s)
    }
}

/// The error type returned by every fallible operation in the crate.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub severity: Severity,
    /// Name of the operation that failed, e.g. `"stage"` or `"merge"`.
    pub context: String,
}

impl Error {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        severity: Severity,
        context: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            severity,
            context: context.into(),
        }
    }

    /// Invalid user input, reported at error severity.
    pub fn validation(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message, Severity::Error, context)
    }

    pub fn not_found(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message, Severity::Error, context)
    }

    pub fn already_exists(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message, Severity::Error, context)
    }

    pub fn state(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, message, Severity::Error, context)
    }

    /// Informational refusal, e.g. staging an ignored path.
    pub fn info(kind: ErrorKind, message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(kind, message, Severity::Info, context)
    }

    pub fn not_in_repository(context: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::NotInRepository,
            "not inside a bittrack repository",
            Severity::Error,
            context,
        )
    }

    pub fn corrupted(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::RepositoryCorrupted, message, Severity::Fatal, context)
    }

    /// Wrap a filesystem failure with the path it happened on.
    pub fn io(context: impl Into<String>, path: &Path, source: std::io::Error) -> Self {
        Self::new(
            ErrorKind::Filesystem,
            format!("{}: {}", path.display(), source),
            Severity::Error,
            context,
        )
    }

    /// A short suggestion for the user, when one exists for this kind.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self.kind {
            ErrorKind::NotInRepository => {
                Some("run 'bittrack init' to initialize a new repository")
            }
            ErrorKind::NotFound => Some("check that the name or path is spelled correctly"),
            ErrorKind::State => {
                Some("commit or stash your changes, or resolve the merge, then retry")
            }
            _ => None,
        }
    }

    /// Exit code the CLI should return for this error.
    pub fn exit_code(&self) -> u8 {
        match self.severity {
            Severity::Info => 0,
            Severity::Warning | Severity::Error => 1,
            Severity::Fatal => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
