//! # Ignore Pattern Matching
//!
//! Parses and matches `.bitignore` patterns.
//!
//! Supports:
//! - Glob patterns (`*.log`, `build/`, `doc/**/*.md`)
//! - Negation patterns (`!important.log`)
//! - Directory patterns (`dir/` matches the directory and its contents)
//! - Root-anchored patterns (`/target`)
//!
//! Patterns are translated to regular expressions and evaluated
//! left-to-right; the final matching pattern decides the verdict.

use regex::Regex;

use crate::error::{Error, Result};
use crate::{Repository, BITTRACK_DIR, IGNORE_FILE};

/// A single parsed ignore pattern.
#[derive(Debug, Clone)]
struct IgnorePattern {
    /// The pattern text with `!`, leading `/`, and trailing `/` stripped.
    pattern: String,
    /// Whether this is a negation pattern (starts with `!`).
    negated: bool,
    /// Whether this matches directories only (ends with `/`).
    directory_only: bool,
    /// Whether this is anchored to the repository root (starts with `/`).
    anchored: bool,
    regex: Regex,
}

impl IgnorePattern {
    /// Parse one pattern line. Returns `None` for blanks and comments.
    fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let (rest, negated) = match trimmed.strip_prefix('!') {
            Some(rest) => (rest.trim(), true),
            None => (trimmed, false),
        };

        let (rest, directory_only) = match rest.strip_suffix('/') {
            Some(rest) => (rest, true),
            None => (rest, false),
        };

        let (rest, anchored) = match rest.strip_prefix('/') {
            Some(rest) => (rest, true),
            None => (rest, false),
        };

        if rest.is_empty() {
            return None;
        }

        let regex = build_regex(rest, anchored, directory_only)?;

        Some(Self {
            pattern: rest.to_string(),
            negated,
            directory_only,
            anchored,
            regex,
        })
    }

    /// Check whether a normalized path matches this pattern.
    fn matches(&self, path: &str) -> bool {
        // A directory pattern also covers the directory itself and, when
        // the pattern is glob-free, anything beneath it.
        if self.directory_only
            && (path == self.pattern || path.starts_with(&format!("{}/", self.pattern)))
        {
            return true;
        }

        self.regex.is_match(path)
    }
}

/// Translate one glob body to an anchored regular expression.
///
/// `**` crosses path separators, `*` and `?` do not. A pattern without a
/// trailing `/` matches the named file or any descendant of a directory
/// of that name; a directory pattern matches only what lies beneath it.
fn build_regex(body: &str, anchored: bool, directory_only: bool) -> Option<Regex> {
    let mut translated = String::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    translated.push_str(".*");
                    i += 1;
                } else {
                    translated.push_str("[^/]*");
                }
            }
            '?' => translated.push_str("[^/]"),
            c @ ('.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\') => {
                translated.push('\\');
                translated.push(c);
            }
            c => translated.push(c),
        }
        i += 1;
    }

    let prefix = if anchored { "" } else { ".*" };
    let suffix = if directory_only { "/.*" } else { "(/.*)?" };

    Regex::new(&format!("^{}{}{}$", prefix, translated, suffix)).ok()
}

/// An ordered collection of ignore patterns.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the `.bitignore` file from the repository root.
    ///
    /// A missing file yields an empty list.
    pub fn load(repo: &Repository) -> Result<Self> {
        let path = repo.ignore_path();
        if !path.exists() {
            return Ok(Self::empty());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::io("read_ignore_file", &path, e))?;

        Ok(Self::from_lines(content.lines()))
    }

    pub fn from_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Self {
        Self {
            patterns: lines.filter_map(IgnorePattern::parse).collect(),
        }
    }

    /// Check whether a repository-relative path should be ignored.
    ///
    /// Patterns are applied in file order; the last match wins, and a
    /// negation match un-ignores the path.
    pub fn is_ignored(&self, path: &str) -> bool {
        let normalized = normalize(path);

        let mut ignored = false;
        for pattern in &self.patterns {
            if pattern.matches(&normalized) {
                ignored = !pattern.negated;
            }
        }

        ignored
    }
}

/// Paths that can never be staged: the metadata directory and the
/// ignore file itself.
pub fn is_reserved(path: &str) -> bool {
    let normalized = normalize(path);
    normalized == BITTRACK_DIR
        || normalized.starts_with(&format!("{}/", BITTRACK_DIR))
        || normalized == IGNORE_FILE
}

fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let stripped = unified.strip_prefix("./").unwrap_or(&unified);

    let mut result = String::with_capacity(stripped.len());
    let mut last_was_slash = false;
    for c in stripped.chars() {
        if c == '/' {
            if !last_was_slash {
                result.push(c);
            }
            last_was_slash = true;
        } else {
            result.push(c);
            last_was_slash = false;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(patterns: &str) -> IgnoreList {
        IgnoreList::from_lines(patterns.lines())
    }

    #[test]
    fn test_parse_pattern_classes() {
        let rules = list("*.log\n!important.log\nbuild/\n/target\n# comment\n\n");
        assert_eq!(rules.patterns.len(), 4);
        assert!(rules.patterns[1].negated);
        assert!(rules.patterns[2].directory_only);
        assert!(rules.patterns[3].anchored);
    }

    #[test]
    fn test_star_does_not_cross_separators() {
        let rules = list("*.log");
        assert!(rules.is_ignored("file.log"));
        assert!(rules.is_ignored("sub/dir/file.log"));
        assert!(!rules.is_ignored("file.txt"));
    }

    #[test]
    fn test_double_star_crosses_separators() {
        let rules = list("doc/**/*.md");
        assert!(rules.is_ignored("doc/a/b/readme.md"));
        assert!(!rules.is_ignored("src/readme.md"));
    }

    #[test]
    fn test_question_mark_single_character() {
        let rules = list("file?.txt");
        assert!(rules.is_ignored("file1.txt"));
        assert!(!rules.is_ignored("file10.txt"));
        assert!(!rules.is_ignored("file/.txt"));
    }

    #[test]
    fn test_directory_pattern_covers_contents() {
        let rules = list("build/");
        assert!(rules.is_ignored("build"));
        assert!(rules.is_ignored("build/a.o"));
        assert!(rules.is_ignored("build/nested/b.o"));
        assert!(!rules.is_ignored("builder/a.o"));
    }

    #[test]
    fn test_plain_name_matches_file_or_descendants() {
        let rules = list("vendor");
        assert!(rules.is_ignored("vendor"));
        assert!(rules.is_ignored("vendor/lib.rs"));
        assert!(!rules.is_ignored("vendored"));
    }

    #[test]
    fn test_anchored_pattern_matches_from_root() {
        let rules = list("/target");
        assert!(rules.is_ignored("target"));
        assert!(rules.is_ignored("target/debug/app"));
        assert!(!rules.is_ignored("sub/target"));
    }

    #[test]
    fn test_negation_order_matters() {
        let rules = list("foo\n!foo");
        assert!(!rules.is_ignored("foo"));

        let reversed = list("!foo\nfoo");
        assert!(reversed.is_ignored("foo"));
    }

    #[test]
    fn test_directory_with_negated_file() {
        let rules = list("build/\n!build/keep.txt");
        assert!(rules.is_ignored("build/a.o"));
        assert!(!rules.is_ignored("build/keep.txt"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let rules = list("a+b.txt");
        assert!(rules.is_ignored("a+b.txt"));
        assert!(!rules.is_ignored("aab.txt"));
    }

    #[test]
    fn test_reserved_paths() {
        assert!(is_reserved(".bittrack"));
        assert!(is_reserved(".bittrack/index"));
        assert!(is_reserved("./.bittrack/objects/master/x"));
        assert!(is_reserved(".bitignore"));
        assert!(!is_reserved("src/main.rs"));
        assert!(!is_reserved(".bittrackish"));
    }

    #[test]
    fn test_normalize_strips_dot_slash_and_dupes() {
        let rules = list("*.log");
        assert!(rules.is_ignored("./sub//file.log"));
    }
}
