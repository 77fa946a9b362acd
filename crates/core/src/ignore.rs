//! Gitignore-style pattern matching for walking, watching, and searching.
//!
//! Patterns keep insertion order and later matches override earlier ones, so
//! a trailing `!pattern` re-includes what a previous pattern excluded. The
//! glob engine is the `ignore` crate's gitignore implementation; this type
//! adds pattern bookkeeping, the canned default set, and ignore-file parsing.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Directory and file patterns that are nearly always noise in a workspace.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git/",
    ".svn/",
    ".hg/",
    "node_modules/",
    "vendor/",
    "__pycache__/",
    "dist/",
    "build/",
    "target/",
    ".next/",
    ".idea/",
    ".vscode/",
    ".DS_Store",
    "Thumbs.db",
    "*.log",
    "*.tmp",
    "tmp/",
    "*.swp",
];

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },
    #[error("failed to read ignore file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// An ordered gitignore-style pattern set.
///
/// `base` anchors leading-`/` patterns; matching a path outside the base
/// falls back to basename semantics, which is what the watcher wants for
/// events arriving with absolute paths.
#[derive(Debug)]
pub struct IgnoreMatcher {
    base: PathBuf,
    patterns: Vec<String>,
    compiled: Gitignore,
}

impl IgnoreMatcher {
    /// Empty matcher anchored at the filesystem root.
    pub fn new() -> Self {
        Self::with_base("/")
    }

    /// Empty matcher with anchored patterns resolved against `base`.
    pub fn with_base(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref().to_path_buf();
        let compiled = Gitignore::empty();
        IgnoreMatcher { base, patterns: Vec::new(), compiled }
    }

    /// Matcher pre-loaded with [`DEFAULT_IGNORE_PATTERNS`].
    pub fn default_set() -> Self {
        let mut m = Self::new();
        for pat in DEFAULT_IGNORE_PATTERNS {
            // The canned set is known-good; a failure here is a programming
            // error, not user input.
            if let Err(e) = m.add_pattern(pat) {
                warn!(pattern = pat, error = %e, "default ignore pattern rejected");
            }
        }
        m
    }

    /// Append one pattern. Later patterns override earlier decisions.
    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), IgnoreError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }
        self.patterns.push(trimmed.to_string());
        self.rebuild()
    }

    /// Append several patterns, stopping at the first invalid one.
    pub fn add_patterns<I, S>(&mut self, patterns: I) -> Result<(), IgnoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for p in patterns {
            self.add_pattern(p.as_ref())?;
        }
        Ok(())
    }

    /// Parse newline-delimited gitignore syntax (blank and `#` lines skipped).
    pub fn add_file_contents(&mut self, contents: &str) -> Result<(), IgnoreError> {
        self.add_patterns(contents.lines())
    }

    /// Load an ignore file from the OS filesystem.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), IgnoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| IgnoreError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        self.add_file_contents(&contents)
    }

    /// Final verdict for `path`: true when the last matching pattern ignores
    /// it, false when no pattern matches or a negation re-included it. A
    /// path under an ignored directory is ignored.
    pub fn matches(&self, path: impl AsRef<Path>, is_dir: bool) -> bool {
        let path = path.as_ref();
        let rel = path.strip_prefix(&self.base).unwrap_or(path);
        self.compiled.matched_path_or_any_parents(rel, is_dir).is_ignore()
    }

    /// Like [`matches`](Self::matches), but first makes `path` relative to
    /// `base` instead of this matcher's own anchor.
    pub fn matches_relative(
        &self,
        path: impl AsRef<Path>,
        base: impl AsRef<Path>,
        is_dir: bool,
    ) -> bool {
        let path = path.as_ref();
        let rel = path.strip_prefix(base.as_ref()).unwrap_or(path);
        self.compiled.matched_path_or_any_parents(rel, is_dir).is_ignore()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    fn rebuild(&mut self) -> Result<(), IgnoreError> {
        let mut builder = GitignoreBuilder::new(&self.base);
        for pat in &self.patterns {
            builder
                .add_line(None, pat)
                .map_err(|source| IgnoreError::InvalidPattern { pattern: pat.clone(), source })?;
        }
        self.compiled =
            builder.build().map_err(|source| IgnoreError::InvalidPattern {
                pattern: String::new(),
                source,
            })?;
        Ok(())
    }
}

impl Default for IgnoreMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matcher_keeps_everything() {
        let m = IgnoreMatcher::new();
        assert!(!m.matches("src/main.rs", false));
        assert!(!m.matches("node_modules", true));
    }

    #[test]
    fn negation_overrides_earlier_pattern() {
        let mut m = IgnoreMatcher::new();
        m.add_patterns(["*.log", "!keep.log"]).unwrap();
        assert!(m.matches("debug.log", false));
        assert!(!m.matches("keep.log", false));
    }

    #[test]
    fn directory_only_pattern() {
        let mut m = IgnoreMatcher::new();
        m.add_pattern("build/").unwrap();
        assert!(m.matches("build", true));
        assert!(!m.matches("build", false));
    }

    #[test]
    fn anchored_pattern() {
        let mut m = IgnoreMatcher::with_base("/ws");
        m.add_pattern("/gen").unwrap();
        assert!(m.matches("/ws/gen", true));
        assert!(!m.matches("/ws/src/gen", true));
    }

    #[test]
    fn double_star_spans_components() {
        let mut m = IgnoreMatcher::new();
        m.add_pattern("**/fixtures/**").unwrap();
        assert!(m.matches("a/b/fixtures/c/d.txt", false));
        assert!(!m.matches("a/b/other/d.txt", false));
    }

    #[test]
    fn char_class_and_question_mark() {
        let mut m = IgnoreMatcher::new();
        m.add_patterns(["file[0-9].txt", "tes?.md"]).unwrap();
        assert!(m.matches("file3.txt", false));
        assert!(!m.matches("fileA.txt", false));
        assert!(m.matches("test.md", false));
    }

    #[test]
    fn default_set_covers_common_noise() {
        let m = IgnoreMatcher::default_set();
        assert!(m.matches(".git", true));
        assert!(m.matches("node_modules", true));
        assert!(m.matches("__pycache__", true));
        assert!(m.matches("app.log", false));
        assert!(m.matches(".DS_Store", false));
        assert!(!m.matches("src/lib.rs", false));
    }

    #[test]
    fn contents_of_ignored_directory_are_ignored() {
        let m = IgnoreMatcher::default_set();
        assert!(m.matches("node_modules/dep/index.js", false));
        assert!(m.matches("a/b/node_modules/dep/index.js", false));
        assert!(!m.matches("src/modules/index.js", false));
    }

    #[test]
    fn matches_relative_strips_base() {
        let mut m = IgnoreMatcher::new();
        m.add_pattern("*.log").unwrap();
        assert!(m.matches_relative("/project/logs/x.log", "/project", false));
    }

    #[test]
    fn file_contents_skip_blank_and_comments() {
        let mut m = IgnoreMatcher::new();
        m.add_file_contents("# header\n\n*.bak\n\n!important.bak\n").unwrap();
        assert_eq!(m.len(), 2);
        assert!(m.matches("old.bak", false));
        assert!(!m.matches("important.bak", false));
    }

    #[test]
    fn load_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".keystormignore");
        std::fs::write(&path, "secret/\n*.pem\n").unwrap();

        let mut m = IgnoreMatcher::new();
        m.load_file(&path).unwrap();
        assert!(m.matches("secret", true));
        assert!(m.matches("ca.pem", false));
    }
}
