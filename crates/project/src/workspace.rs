//! Multi-root workspace model: an ordered, path-unique folder set with a
//! configuration object and observer fan-out, plus the JSON workspace-file
//! format that feeds it.

use crate::error::WorkspaceError;
use crate::events::{ObserverId, ObserverRegistry};
use keystorm_core::{Config, Encoding, LineEnding};
use keystorm_vfs::{path as vpath, Vfs};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::RwLock;
use std::time::SystemTime;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Folder
// ---------------------------------------------------------------------------

/// One workspace root. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    path: String,
    name: String,
}

impl Folder {
    pub fn new(path: &str) -> Self {
        let path = vpath::clean(path);
        let name = if path == "/" { "/".to_string() } else { vpath::base(&path) };
        Folder { path, name }
    }

    pub fn with_name(path: &str, name: impl Into<String>) -> Self {
        Folder { path: vpath::clean(path), name: name.into() }
    }

    /// Canonical absolute path, forward slashes.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> String {
        format!("file://{}", self.path)
    }

    /// True when this folder is `path` or an ancestor of it, judged at path
    /// component boundaries.
    pub fn contains(&self, path: &str) -> bool {
        vpath::is_ancestor_or_equal(&self.path, path)
    }
}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceChangeKind {
    FolderAdded,
    FolderRemoved,
    ConfigChanged,
}

/// Event handed to change observers. Config updates carry no folders.
#[derive(Debug, Clone)]
pub struct WorkspaceChangeEvent {
    pub kind: WorkspaceChangeKind,
    pub folders: Vec<Folder>,
    pub timestamp: SystemTime,
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

struct WorkspaceState {
    folders: Vec<Folder>,
    config: Config,
    open: bool,
}

/// Ordered multi-root folder set. The first folder is the primary root.
/// All mutating operations fail once the workspace is closed; observers are
/// always invoked outside the state lock.
pub struct Workspace {
    state: RwLock<WorkspaceState>,
    on_add: ObserverRegistry<Folder>,
    on_remove: ObserverRegistry<Folder>,
    on_change: ObserverRegistry<WorkspaceChangeEvent>,
}

impl Workspace {
    /// A closed, empty workspace. Call [`open`](Self::open) to start it.
    pub fn new() -> Self {
        Workspace {
            state: RwLock::new(WorkspaceState {
                folders: Vec::new(),
                config: Config::default(),
                open: false,
            }),
            on_add: ObserverRegistry::new(),
            on_remove: ObserverRegistry::new(),
            on_change: ObserverRegistry::new(),
        }
    }

    pub fn new_from_path(root: &str) -> Result<Self, WorkspaceError> {
        Self::new_from_paths(&[root])
    }

    pub fn new_from_paths(roots: &[&str]) -> Result<Self, WorkspaceError> {
        let ws = Self::new();
        ws.open(roots)?;
        Ok(ws)
    }

    /// Open with the given roots. Duplicate paths collapse to the first
    /// occurrence; opening an already-open workspace fails.
    pub fn open(&self, roots: &[&str]) -> Result<(), WorkspaceError> {
        if roots.is_empty() {
            return Err(WorkspaceError::NoFolders);
        }
        let added = {
            let mut state = self.state.write().unwrap();
            if state.open {
                return Err(WorkspaceError::AlreadyOpen);
            }
            let mut added = Vec::new();
            for root in roots {
                let folder = Folder::new(root);
                if !state.folders.iter().any(|f| f.path() == folder.path()) {
                    state.folders.push(folder.clone());
                    added.push(folder);
                }
            }
            state.open = true;
            added
        };
        info!(roots = added.len(), "workspace opened");
        for folder in &added {
            self.on_add.emit(folder);
        }
        Ok(())
    }

    /// Close the workspace. Idempotent; folders stay readable but every
    /// mutation fails afterwards.
    pub fn close(&self) {
        let mut state = self.state.write().unwrap();
        if state.open {
            state.open = false;
            debug!("workspace closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.read().unwrap().open
    }

    pub fn add_folder(&self, path: &str) -> Result<Folder, WorkspaceError> {
        let folder = {
            let mut state = self.state.write().unwrap();
            if !state.open {
                return Err(WorkspaceError::Closed);
            }
            let folder = Folder::new(path);
            if state.folders.iter().any(|f| f.path() == folder.path()) {
                return Err(WorkspaceError::FolderExists(folder.path().to_string()));
            }
            state.folders.push(folder.clone());
            folder
        };
        self.on_add.emit(&folder);
        self.on_change.emit(&WorkspaceChangeEvent {
            kind: WorkspaceChangeKind::FolderAdded,
            folders: vec![folder.clone()],
            timestamp: SystemTime::now(),
        });
        Ok(folder)
    }

    pub fn remove_folder(&self, path: &str) -> Result<Folder, WorkspaceError> {
        let cleaned = vpath::clean(path);
        let folder = {
            let mut state = self.state.write().unwrap();
            if !state.open {
                return Err(WorkspaceError::Closed);
            }
            let idx = state
                .folders
                .iter()
                .position(|f| f.path() == cleaned)
                .ok_or(WorkspaceError::FolderNotFound(cleaned))?;
            state.folders.remove(idx)
        };
        self.on_remove.emit(&folder);
        self.on_change.emit(&WorkspaceChangeEvent {
            kind: WorkspaceChangeKind::FolderRemoved,
            folders: vec![folder.clone()],
            timestamp: SystemTime::now(),
        });
        Ok(folder)
    }

    pub fn get_folder(&self, path: &str) -> Option<Folder> {
        let cleaned = vpath::clean(path);
        self.state.read().unwrap().folders.iter().find(|f| f.path() == cleaned).cloned()
    }

    pub fn get_folder_by_uri(&self, uri: &str) -> Option<Folder> {
        self.state.read().unwrap().folders.iter().find(|f| f.uri() == uri).cloned()
    }

    /// True when some folder is an ancestor (or the whole) of the cleaned
    /// path. Relative paths resolve against the primary root.
    pub fn is_in_workspace(&self, path: &str) -> bool {
        self.containing_folder(path).is_some()
    }

    /// The most specific folder containing `path` (longest matching prefix,
    /// so nested roots resolve to the inner one).
    pub fn containing_folder(&self, path: &str) -> Option<Folder> {
        let state = self.state.read().unwrap();
        let abs = Self::resolve(&state, path)?;
        state
            .folders
            .iter()
            .filter(|f| f.contains(&abs))
            .max_by_key(|f| f.path().len())
            .cloned()
    }

    /// Path relative to its containing folder; the cleaned input when no
    /// folder contains it.
    pub fn relative_path(&self, path: &str) -> String {
        let state = self.state.read().unwrap();
        let abs = match Self::resolve(&state, path) {
            Some(p) => p,
            None => return vpath::clean(path),
        };
        drop(state);
        match self.containing_folder(&abs) {
            Some(folder) => vpath::rel(folder.path(), &abs),
            None => abs,
        }
    }

    fn resolve(state: &WorkspaceState, path: &str) -> Option<String> {
        if path.starts_with('/') {
            return Some(vpath::clean(path));
        }
        let primary = state.folders.first()?;
        Some(vpath::abs(path, primary.path()))
    }

    pub fn roots(&self) -> Vec<String> {
        self.state.read().unwrap().folders.iter().map(|f| f.path().to_string()).collect()
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.state.read().unwrap().folders.clone()
    }

    pub fn folder_count(&self) -> usize {
        self.state.read().unwrap().folders.len()
    }

    pub fn is_multi_root(&self) -> bool {
        self.folder_count() > 1
    }

    /// Primary root path, when any folder exists.
    pub fn primary_root(&self) -> Option<String> {
        self.state.read().unwrap().folders.first().map(|f| f.path().to_string())
    }

    pub fn set_config(&self, config: Config) -> Result<(), WorkspaceError> {
        {
            let mut state = self.state.write().unwrap();
            if !state.open {
                return Err(WorkspaceError::Closed);
            }
            state.config = config;
        }
        self.on_change.emit(&WorkspaceChangeEvent {
            kind: WorkspaceChangeKind::ConfigChanged,
            folders: Vec::new(),
            timestamp: SystemTime::now(),
        });
        Ok(())
    }

    pub fn config(&self) -> Config {
        self.state.read().unwrap().config.clone()
    }

    // -- observers ----------------------------------------------------------

    pub fn on_folder_added(&self, f: impl Fn(&Folder) + Send + Sync + 'static) -> ObserverId {
        self.on_add.register(f)
    }

    pub fn on_folder_removed(&self, f: impl Fn(&Folder) + Send + Sync + 'static) -> ObserverId {
        self.on_remove.register(f)
    }

    pub fn on_workspace_changed(
        &self,
        f: impl Fn(&WorkspaceChangeEvent) + Send + Sync + 'static,
    ) -> ObserverId {
        self.on_change.register(f)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.on_add.unregister(id) || self.on_remove.unregister(id) || self.on_change.unregister(id)
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Workspace file
// ---------------------------------------------------------------------------

/// Relative path of the per-workspace config file inside a folder.
pub const WORKSPACE_CONFIG_PATH: &str = ".keystorm/workspace.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The on-disk workspace file. Known keys are typed; everything else rides
/// in `rest` and survives a load/save round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceFile {
    #[serde(default)]
    pub folders: Vec<FolderEntry>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl WorkspaceFile {
    pub fn parse(data: &[u8]) -> Result<Self, WorkspaceError> {
        serde_json::from_slice(data).map_err(|e| WorkspaceError::InvalidWorkspaceFile(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>, WorkspaceError> {
        serde_json::to_vec_pretty(self).map_err(|e| WorkspaceError::InvalidWorkspaceFile(e.to_string()))
    }

    pub fn load(vfs: &dyn Vfs, path: &str) -> Result<Self, WorkspaceError> {
        let data = vfs
            .read_file(path)
            .map_err(|e| WorkspaceError::InvalidWorkspaceFile(e.to_string()))?;
        Self::parse(&data)
    }

    pub fn save(&self, vfs: &dyn Vfs, path: &str) -> Result<(), WorkspaceError> {
        let data = self.to_json_pretty()?;
        vfs.write_file(path, &data)
            .map_err(|e| WorkspaceError::InvalidWorkspaceFile(e.to_string()))
    }

    /// Folders with relative paths resolved against the workspace file's
    /// directory.
    pub fn resolve_folders(&self, base_dir: &str) -> Vec<Folder> {
        self.folders
            .iter()
            .map(|entry| {
                let abs = vpath::abs(&entry.path, base_dir);
                match &entry.name {
                    Some(name) => Folder::with_name(&abs, name),
                    None => Folder::new(&abs),
                }
            })
            .collect()
    }

    /// Translate the known `settings` keys into a [`Config`] over defaults.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        let s = &self.settings;

        if let Some(map) = s.get("files.exclude").and_then(Value::as_object) {
            config.exclude_patterns = enabled_globs(map);
        }
        if let Some(map) = s.get("search.exclude").and_then(Value::as_object) {
            config.search_exclude = enabled_globs(map);
        }
        if let Some(map) = s.get("files.watcherExclude").and_then(Value::as_object) {
            config.watcher_exclude = enabled_globs(map);
        }
        if let Some(n) = s.get("editor.tabSize").and_then(Value::as_u64) {
            config.editor.tab_size = n as u32;
        }
        if let Some(b) = s.get("editor.insertSpaces").and_then(Value::as_bool) {
            config.editor.insert_spaces = b;
        }
        if let Some(b) = s.get("files.trimTrailingWhitespace").and_then(Value::as_bool) {
            config.editor.trim_trailing_whitespace = b;
        }
        if let Some(b) = s.get("files.insertFinalNewline").and_then(Value::as_bool) {
            config.editor.insert_final_newline = b;
        }
        if let Some(enc) = s.get("files.encoding").and_then(Value::as_str) {
            config.editor.default_encoding = parse_encoding(enc);
        }
        if let Some(eol) = s.get("files.eol").and_then(Value::as_str) {
            config.editor.default_line_ending = parse_eol(eol);
        }
        if let Some(map) = s.get("files.associations").and_then(Value::as_object) {
            for (glob, lang) in map {
                if let Some(lang) = lang.as_str() {
                    config.language_associations.insert(glob.clone(), lang.to_string());
                }
            }
        }
        config
    }

    /// Write the known keys of `config` back into `settings`, leaving
    /// unknown keys untouched.
    pub fn apply_config(&mut self, config: &Config) {
        self.settings.insert("files.exclude".into(), glob_map(&config.exclude_patterns));
        self.settings.insert("search.exclude".into(), glob_map(&config.search_exclude));
        self.settings.insert("files.watcherExclude".into(), glob_map(&config.watcher_exclude));
        self.settings
            .insert("editor.tabSize".into(), Value::from(config.editor.tab_size));
        self.settings
            .insert("editor.insertSpaces".into(), Value::from(config.editor.insert_spaces));
        self.settings.insert(
            "files.trimTrailingWhitespace".into(),
            Value::from(config.editor.trim_trailing_whitespace),
        );
        self.settings.insert(
            "files.insertFinalNewline".into(),
            Value::from(config.editor.insert_final_newline),
        );
        self.settings.insert(
            "files.encoding".into(),
            Value::from(encoding_name(config.editor.default_encoding)),
        );
        self.settings.insert(
            "files.eol".into(),
            Value::from(match config.editor.default_line_ending {
                Some(LineEnding::Crlf) => "\r\n",
                Some(_) => "\n",
                None => "auto",
            }),
        );
        if !config.language_associations.is_empty() {
            let mut map = Map::new();
            for (glob, lang) in &config.language_associations {
                map.insert(glob.clone(), Value::from(lang.clone()));
            }
            self.settings.insert("files.associations".into(), Value::Object(map));
        }
    }
}

fn enabled_globs(map: &Map<String, Value>) -> Vec<String> {
    map.iter()
        .filter(|(_, v)| v.as_bool().unwrap_or(false))
        .map(|(k, _)| k.clone())
        .collect()
}

fn glob_map(patterns: &[String]) -> Value {
    let mut map = Map::new();
    for p in patterns {
        map.insert(p.clone(), Value::from(true));
    }
    Value::Object(map)
}

fn parse_encoding(name: &str) -> Encoding {
    match name {
        "utf8" => Encoding::Utf8,
        "utf8bom" => Encoding::Utf8Bom,
        "utf16le" => Encoding::Utf16Le,
        "utf16be" => Encoding::Utf16Be,
        "latin1" | "iso88591" => Encoding::Latin1,
        "ascii" => Encoding::Ascii,
        other => {
            warn!(encoding = other, "unknown files.encoding, defaulting to utf8");
            Encoding::Utf8
        }
    }
}

fn encoding_name(encoding: Encoding) -> &'static str {
    match encoding {
        Encoding::Utf8 => "utf8",
        Encoding::Utf8Bom => "utf8bom",
        Encoding::Utf16Le => "utf16le",
        Encoding::Utf16Be => "utf16be",
        Encoding::Latin1 => "latin1",
        Encoding::Ascii => "ascii",
    }
}

fn parse_eol(eol: &str) -> Option<LineEnding> {
    match eol {
        "\n" => Some(LineEnding::Lf),
        "\r\n" => Some(LineEnding::Crlf),
        _ => None, // "auto"
    }
}

/// Load `<folder>/.keystorm/workspace.json` into a [`Config`]; a missing
/// file means defaults.
pub fn load_folder_config(vfs: &dyn Vfs, folder: &str) -> Config {
    let path = vpath::join(&[folder, WORKSPACE_CONFIG_PATH]);
    match vfs.read_file(&path) {
        Ok(data) => match Config::from_json(&data) {
            Ok(config) => config,
            Err(e) => {
                warn!(path, error = %e, "ignoring malformed workspace config");
                Config::default()
            }
        },
        Err(_) => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystorm_vfs::MemFs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn folders_are_unique_and_ordered() {
        let ws = Workspace::new_from_paths(&["/ws/a", "/ws/b", "/ws/a"]).unwrap();
        assert_eq!(ws.roots(), vec!["/ws/a", "/ws/b"]);
        assert!(ws.is_multi_root());
        assert_eq!(ws.primary_root().unwrap(), "/ws/a");
        assert!(matches!(ws.add_folder("/ws/b"), Err(WorkspaceError::FolderExists(_))));
    }

    #[test]
    fn open_twice_fails() {
        let ws = Workspace::new_from_path("/ws").unwrap();
        assert!(matches!(ws.open(&["/other"]), Err(WorkspaceError::AlreadyOpen)));
    }

    #[test]
    fn open_requires_roots() {
        let ws = Workspace::new();
        assert!(matches!(ws.open(&[]), Err(WorkspaceError::NoFolders)));
    }

    #[test]
    fn containment_respects_component_boundaries() {
        let ws = Workspace::new_from_path("/ws/app").unwrap();
        assert!(ws.is_in_workspace("/ws/app"));
        assert!(ws.is_in_workspace("/ws/app/src/main.go"));
        assert!(!ws.is_in_workspace("/ws/application/file"));
        assert!(!ws.is_in_workspace("/elsewhere"));
        // Relative paths resolve against the primary root.
        assert!(ws.is_in_workspace("src/main.go"));
    }

    #[test]
    fn containing_folder_prefers_most_specific() {
        let ws = Workspace::new_from_paths(&["/ws", "/ws/nested"]).unwrap();
        assert_eq!(ws.containing_folder("/ws/nested/f").unwrap().path(), "/ws/nested");
        assert_eq!(ws.containing_folder("/ws/other/f").unwrap().path(), "/ws");
    }

    #[test]
    fn relative_path_uses_containing_folder() {
        let ws = Workspace::new_from_path("/ws").unwrap();
        assert_eq!(ws.relative_path("/ws/src/a.go"), "src/a.go");
        assert_eq!(ws.relative_path("/outside/a.go"), "/outside/a.go");
    }

    #[test]
    fn mutations_fail_after_close() {
        let ws = Workspace::new_from_path("/ws").unwrap();
        ws.close();
        ws.close(); // idempotent
        assert!(matches!(ws.add_folder("/x"), Err(WorkspaceError::Closed)));
        assert!(matches!(ws.remove_folder("/ws"), Err(WorkspaceError::Closed)));
        assert!(matches!(ws.set_config(Config::default()), Err(WorkspaceError::Closed)));
        // Queries still answer.
        assert_eq!(ws.folder_count(), 1);
    }

    #[test]
    fn observers_fire_for_lifecycle() {
        let ws = Workspace::new_from_path("/ws").unwrap();
        let adds = Arc::new(AtomicUsize::new(0));
        let removes = Arc::new(AtomicUsize::new(0));
        let changes = Arc::new(AtomicUsize::new(0));

        let a = Arc::clone(&adds);
        ws.on_folder_added(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        let r = Arc::clone(&removes);
        ws.on_folder_removed(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let c = Arc::clone(&changes);
        ws.on_workspace_changed(move |ev| {
            if ev.kind == WorkspaceChangeKind::ConfigChanged {
                assert!(ev.folders.is_empty());
            }
            c.fetch_add(1, Ordering::SeqCst);
        });

        ws.add_folder("/ws/b").unwrap();
        ws.remove_folder("/ws/b").unwrap();
        ws.set_config(Config::default()).unwrap();

        assert_eq!(adds.load(Ordering::SeqCst), 1);
        assert_eq!(removes.load(Ordering::SeqCst), 1);
        assert_eq!(changes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn folder_uri_lookup() {
        let ws = Workspace::new_from_path("/ws/app").unwrap();
        let folder = ws.get_folder_by_uri("file:///ws/app").unwrap();
        assert_eq!(folder.path(), "/ws/app");
        assert_eq!(folder.name(), "app");
        assert!(ws.get_folder_by_uri("file:///nope").is_none());
    }

    #[test]
    fn workspace_file_round_trip_preserves_unknown_keys() {
        let raw = br#"{
            "folders": [{"path": "app", "name": "Application"}, {"path": "../lib"}],
            "settings": {
                "files.exclude": {"**/*.log": true, "**/keep": false},
                "editor.tabSize": 2,
                "files.eol": "\r\n",
                "custom.setting": "preserved"
            },
            "extensions": {"recommendations": ["vendor.tool"]},
            "launch": {"configurations": []}
        }"#;
        let file = WorkspaceFile::parse(raw).unwrap();

        let folders = file.resolve_folders("/ws/project");
        assert_eq!(folders[0].path(), "/ws/project/app");
        assert_eq!(folders[0].name(), "Application");
        assert_eq!(folders[1].path(), "/ws/lib");

        let config = file.config();
        assert_eq!(config.exclude_patterns, vec!["**/*.log"]);
        assert_eq!(config.editor.tab_size, 2);
        assert_eq!(config.editor.default_line_ending, Some(LineEnding::Crlf));

        // Unknown top-level and settings keys survive the round trip.
        let json = file.to_json_pretty().unwrap();
        let back = WorkspaceFile::parse(&json).unwrap();
        assert_eq!(back.rest.get("extensions"), file.rest.get("extensions"));
        assert_eq!(back.rest.get("launch"), file.rest.get("launch"));
        assert_eq!(
            back.settings.get("custom.setting").and_then(Value::as_str),
            Some("preserved")
        );
    }

    #[test]
    fn apply_config_writes_known_keys_only() {
        let mut file = WorkspaceFile::default();
        file.settings.insert("custom.setting".into(), Value::from(42));

        let mut config = Config::default();
        config.exclude_patterns.push("dist/".into());
        config.editor.tab_size = 8;
        file.apply_config(&config);

        assert_eq!(file.settings.get("editor.tabSize"), Some(&Value::from(8)));
        assert_eq!(file.settings.get("custom.setting"), Some(&Value::from(42)));
        let excludes = file.settings.get("files.exclude").unwrap().as_object().unwrap();
        assert_eq!(excludes.get("dist/"), Some(&Value::from(true)));
    }

    #[test]
    fn folder_config_missing_file_is_defaults() {
        let fs = MemFs::new();
        fs.mkdir("/ws").unwrap();
        assert_eq!(load_folder_config(&fs, "/ws"), Config::default());

        fs.mkdir_all("/ws/.keystorm").unwrap();
        fs.write_file("/ws/.keystorm/workspace.json", br#"{"workerCount": 9}"#).unwrap();
        assert_eq!(load_folder_config(&fs, "/ws").worker_count, 9);

        fs.write_file("/ws/.keystorm/workspace.json", b"{broken").unwrap();
        assert_eq!(load_folder_config(&fs, "/ws"), Config::default());
    }
}
