//! Workspace configuration: exclude patterns, indexing limits, language
//! associations, and editor settings.
//!
//! Serializes 1:1 with `<folder>/.keystorm/workspace.json`; a missing file
//! means defaults. Merging follows override-wins semantics for scalars
//! (zero/default values do not override), union-with-dedup for lists, and
//! override-wins for map keys.

use crate::encoding::{Encoding, LineEnding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Files larger than this are not opened or indexed.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Parser workers the graph builder runs when the config does not say.
pub const DEFAULT_WORKER_COUNT: usize = 4;

pub const DEFAULT_TAB_SIZE: u32 = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Editor settings
// ---------------------------------------------------------------------------

/// Editor-facing defaults carried alongside the core config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    pub tab_size: u32,
    pub insert_spaces: bool,
    pub trim_trailing_whitespace: bool,
    pub insert_final_newline: bool,
    pub default_encoding: Encoding,
    /// `None` means auto: keep whatever the file already uses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_line_ending: Option<LineEnding>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            tab_size: DEFAULT_TAB_SIZE,
            insert_spaces: true,
            trim_trailing_whitespace: false,
            insert_final_newline: false,
            default_encoding: Encoding::Utf8,
            default_line_ending: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Per-workspace configuration value object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Glob patterns excluded from indexing and watching.
    pub exclude_patterns: Vec<String>,
    /// Additional excludes applied only to content search.
    pub search_exclude: Vec<String>,
    /// Additional excludes applied only to the file watcher.
    pub watcher_exclude: Vec<String>,
    /// Maximum file size (bytes) the document store and indexer will read.
    pub max_file_size: u64,
    /// Parser worker count for graph builds.
    pub worker_count: usize,
    /// Filename/extension glob to language id, layered over the builtin table.
    pub language_associations: BTreeMap<String, String>,
    pub editor: EditorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            exclude_patterns: Vec::new(),
            search_exclude: Vec::new(),
            watcher_exclude: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            language_associations: BTreeMap::new(),
            editor: EditorConfig::default(),
        }
    }
}

impl Config {
    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Merge `other` over `self`. Slices are unioned and deduplicated, maps
    /// take override keys, scalars take the override value unless it is the
    /// type default (a freshly built override leaves settings untouched).
    pub fn merge(&mut self, other: &Config) {
        union_dedup(&mut self.exclude_patterns, &other.exclude_patterns);
        union_dedup(&mut self.search_exclude, &other.search_exclude);
        union_dedup(&mut self.watcher_exclude, &other.watcher_exclude);

        if other.max_file_size != DEFAULT_MAX_FILE_SIZE {
            self.max_file_size = other.max_file_size;
        }
        if other.worker_count != DEFAULT_WORKER_COUNT {
            self.worker_count = other.worker_count;
        }

        for (glob, lang) in &other.language_associations {
            self.language_associations.insert(glob.clone(), lang.clone());
        }

        let editor_default = EditorConfig::default();
        if other.editor.tab_size != editor_default.tab_size {
            self.editor.tab_size = other.editor.tab_size;
        }
        if other.editor.insert_spaces != editor_default.insert_spaces {
            self.editor.insert_spaces = other.editor.insert_spaces;
        }
        if other.editor.trim_trailing_whitespace != editor_default.trim_trailing_whitespace {
            self.editor.trim_trailing_whitespace = other.editor.trim_trailing_whitespace;
        }
        if other.editor.insert_final_newline != editor_default.insert_final_newline {
            self.editor.insert_final_newline = other.editor.insert_final_newline;
        }
        if other.editor.default_encoding != editor_default.default_encoding {
            self.editor.default_encoding = other.editor.default_encoding;
        }
        if other.editor.default_line_ending.is_some() {
            self.editor.default_line_ending = other.editor.default_line_ending;
        }
    }
}

fn union_dedup(dst: &mut Vec<String>, src: &[String]) {
    for item in src {
        if !dst.contains(item) {
            dst.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(c.worker_count, DEFAULT_WORKER_COUNT);
        assert!(c.exclude_patterns.is_empty());
        assert_eq!(c.editor.tab_size, DEFAULT_TAB_SIZE);
        assert!(c.editor.insert_spaces);
    }

    #[test]
    fn merge_unions_slices() {
        let mut base = Config {
            exclude_patterns: vec!["*.log".into(), "dist/".into()],
            ..Config::default()
        };
        let over = Config {
            exclude_patterns: vec!["dist/".into(), "*.tmp".into()],
            ..Config::default()
        };
        base.merge(&over);
        assert_eq!(base.exclude_patterns, vec!["*.log", "dist/", "*.tmp"]);
    }

    #[test]
    fn merge_scalar_override_wins() {
        let mut base = Config::default();
        let over = Config { worker_count: 8, max_file_size: 1024, ..Config::default() };
        base.merge(&over);
        assert_eq!(base.worker_count, 8);
        assert_eq!(base.max_file_size, 1024);
    }

    #[test]
    fn merge_default_scalar_does_not_override() {
        let mut base = Config { worker_count: 8, ..Config::default() };
        base.merge(&Config::default());
        assert_eq!(base.worker_count, 8);
    }

    #[test]
    fn merge_map_override_keys_win() {
        let mut base = Config::default();
        base.language_associations.insert("*.ks".into(), "keystorm".into());
        base.language_associations.insert("*.x".into(), "old".into());

        let mut over = Config::default();
        over.language_associations.insert("*.x".into(), "new".into());

        base.merge(&over);
        assert_eq!(base.language_associations["*.ks"], "keystorm");
        assert_eq!(base.language_associations["*.x"], "new");
    }

    #[test]
    fn json_round_trip() {
        let mut c = Config::default();
        c.exclude_patterns.push("vendor/".into());
        c.editor.tab_size = 2;
        c.editor.default_line_ending = Some(LineEnding::Crlf);

        let bytes = c.to_json_pretty().unwrap();
        let back = Config::from_json(&bytes).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn empty_json_is_defaults() {
        let c = Config::from_json(b"{}").unwrap();
        assert_eq!(c, Config::default());
    }
}
