//! # Configuration
//!
//! Key/value settings stored as `<key>=<value>` lines. Two scopes:
//! repository (`.bittrack/config`) and global
//! (`$HOME/.bittrack/config`). Repository lookups fall back to the
//! global scope. Unknown keys are stored unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::Repository;

/// Keys the tool itself reads.
pub const KNOWN_KEYS: &[&str] = &[
    "user.name",
    "user.email",
    "core.editor",
    "core.pager",
    "init.defaultBranch",
    "github.token",
];

/// Branch created by `init` when `init.defaultBranch` is not set.
pub const DEFAULT_BRANCH: &str = "master";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Repository,
    Global,
}

/// One scope's settings, loaded eagerly and written back on change.
#[derive(Debug, Clone, Default)]
pub struct Config {
    entries: BTreeMap<String, String>,
}

impl Config {
    fn load_file(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) if path.exists() => path,
            _ => return Ok(Self::default()),
        };

        let content =
            fs::read_to_string(&path).map_err(|e| Error::io("load_config", &path, e))?;

        let mut entries = BTreeMap::new();
        for line in content.lines() {
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Ok(Self { entries })
    }

    fn save_file(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io("save_config", parent, e))?;
        }

        let mut content = String::new();
        for (key, value) in &self.entries {
            content.push_str(&format!("{}={}\n", key, value));
        }

        fs::write(path, content).map_err(|e| Error::io("save_config", path, e))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// `$HOME/.bittrack/config`, when HOME is set.
pub fn global_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".bittrack").join("config"))
}

fn scope_path(repo: Option<&Repository>, scope: ConfigScope) -> Option<PathBuf> {
    match scope {
        ConfigScope::Repository => repo.map(|r| r.config_path()),
        ConfigScope::Global => global_config_path(),
    }
}

/// Load one scope.
pub fn load(repo: Option<&Repository>, scope: ConfigScope) -> Result<Config> {
    Config::load_file(scope_path(repo, scope))
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
        return Err(Error::validation(
            format!("invalid configuration key: '{}'", key),
            "config",
        ));
    }
    Ok(())
}

/// Look a key up in the repository scope, falling back to global.
pub fn get(repo: &Repository, key: &str) -> Result<Option<String>> {
    let repository = load(Some(repo), ConfigScope::Repository)?;
    if let Some(value) = repository.get(key) {
        return Ok(Some(value.to_string()));
    }

    let global = load(None, ConfigScope::Global)?;
    Ok(global.get(key).map(|s| s.to_string()))
}

/// Store a key in one scope.
pub fn set(repo: Option<&Repository>, scope: ConfigScope, key: &str, value: &str) -> Result<()> {
    validate_key(key)?;

    let path = scope_path(repo, scope).ok_or_else(|| {
        Error::state("HOME is not set; no global configuration available", "config")
    })?;

    let mut config = Config::load_file(Some(path.clone()))?;
    config.entries.insert(key.to_string(), value.to_string());
    config.save_file(&path)
}

/// Remove a key from one scope. Unknown keys are ignored.
pub fn unset(repo: Option<&Repository>, scope: ConfigScope, key: &str) -> Result<()> {
    let path = match scope_path(repo, scope) {
        Some(path) => path,
        None => return Ok(()),
    };

    let mut config = Config::load_file(Some(path.clone()))?;
    config.entries.remove(key);
    config.save_file(&path)
}

/// The branch `init` should create: `init.defaultBranch` from the
/// global scope, or `master`.
pub fn init_default_branch() -> String {
    load(None, ConfigScope::Global)
        .ok()
        .and_then(|c| c.get("init.defaultBranch").map(|s| s.to_string()))
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
}

/// Commit author: `user.name`, or a neutral fallback.
pub fn author(repo: &Repository) -> Result<String> {
    Ok(get(repo, "user.name")?.unwrap_or_else(|| "anonymous".to_string()))
}
