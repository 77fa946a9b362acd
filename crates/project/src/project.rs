//! The project facade: one handle owning the workspace, VFS, document
//! store, watcher + debouncer, indexes, and graph, with lifecycle and event
//! routing between them.

use crate::document::{Document, DocumentStore, StoreOptions};
use crate::error::{ProjectError, WorkspaceError};
use crate::events::{ObserverId, ObserverRegistry, ProjectChangeEvent, ProjectEventKind};
use crate::index::{
    ContentHit, ContentIndex, FileChangeEvent, FileChangeKind, FileIndex, InMemoryContentIndex,
    InMemoryFileIndex, IncrementalIndexer, IndexerDeps,
};
use crate::workspace::{load_folder_config, Workspace};
use keystorm_core::{CancelToken, Config, IgnoreMatcher};
use keystorm_graph::{
    query, BuildOptions, GraphBuilder, NodeId, ParserRegistry, ProjectGraph, RelatedFile,
};
use keystorm_vfs::{path as vpath, Vfs};
use keystorm_watch::{
    Debouncer, NativeWatcher, Op, WatchConfig, WatchEvent, Watcher, DEFAULT_DEBOUNCE_DELAY,
};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

pub struct ProjectOptions {
    /// Overrides merged over the primary root's folder config.
    pub config: Config,
    pub enable_watcher: bool,
    pub enable_graph: bool,
    pub debounce_delay: Duration,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        ProjectOptions {
            config: Config::default(),
            enable_watcher: true,
            enable_graph: true,
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
        }
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

struct ProjectState {
    workspace: Arc<Workspace>,
    documents: Arc<DocumentStore>,
    graph: Option<Arc<ProjectGraph>>,
    watcher: Option<Arc<Debouncer<NativeWatcher>>>,
    file_index: Arc<dyn FileIndex>,
    content_index: Arc<dyn ContentIndex>,
    indexer: Arc<IncrementalIndexer>,
    builder: Option<Arc<GraphBuilder>>,
    config: Config,
    cancel: CancelToken,
    router: Option<JoinHandle<()>>,
    initial_build: Option<JoinHandle<()>>,
}

/// One handle over every workspace subsystem. Thread-safe; file operations
/// require the project to be open and the path to be inside the workspace.
pub struct Project {
    vfs: Arc<dyn Vfs>,
    state: RwLock<Option<ProjectState>>,
    observers: Arc<ObserverRegistry<ProjectChangeEvent>>,
    // Joined outside the state lock during close.
    teardown: Mutex<()>,
}

impl Project {
    pub fn new(vfs: Arc<dyn Vfs>) -> Self {
        Project {
            vfs,
            state: RwLock::new(None),
            observers: Arc::new(ObserverRegistry::new()),
            teardown: Mutex::new(()),
        }
    }

    /// Open the project over `roots`. Fails fast when already open or when
    /// no roots are given. The watcher is best-effort; the graph build runs
    /// in the background.
    pub fn open(&self, roots: &[&str], options: ProjectOptions) -> Result<(), ProjectError> {
        let mut slot = self.state.write().unwrap();
        if slot.is_some() {
            return Err(ProjectError::AlreadyOpen);
        }
        if roots.is_empty() {
            return Err(ProjectError::Workspace(WorkspaceError::NoFolders));
        }

        let workspace = Arc::new(Workspace::new_from_paths(roots)?);

        // Folder config from the primary root, then caller overrides.
        let mut config = workspace
            .primary_root()
            .map(|root| load_folder_config(self.vfs.as_ref(), &root))
            .unwrap_or_default();
        config.merge(&options.config);
        workspace.set_config(config.clone())?;

        let documents = Arc::new(DocumentStore::new(
            Arc::clone(&self.vfs),
            StoreOptions {
                max_file_size: config.max_file_size,
                editor: config.editor.clone(),
                associations: config.language_associations.clone(),
            },
        ));

        let file_index: Arc<dyn FileIndex> = Arc::new(InMemoryFileIndex::new());
        let content_index: Arc<dyn ContentIndex> = Arc::new(InMemoryContentIndex::new());
        let graph = options.enable_graph.then(|| Arc::new(ProjectGraph::new()));
        let cancel = CancelToken::new();

        let walk_ignore = Arc::new(build_ignore(&config.exclude_patterns, &[]));
        let watch_ignore = build_ignore(&config.exclude_patterns, &config.watcher_exclude);

        let root_paths = workspace.roots();

        // Watcher is optional: a failed construction degrades to polling-free
        // operation rather than failing the open.
        let watcher = if options.enable_watcher {
            match NativeWatcher::new(watch_ignore, WatchConfig::default()) {
                Ok(native) => {
                    let debounced = Arc::new(Debouncer::new(native, options.debounce_delay));
                    for root in &root_paths {
                        if let Err(e) = debounced.watch_recursive(root) {
                            warn!(root, error = %e, "could not watch workspace root");
                        }
                    }
                    Some(debounced)
                }
                Err(e) => {
                    warn!(error = %e, "file watching disabled");
                    None
                }
            }
        } else {
            None
        };

        let indexer = Arc::new(IncrementalIndexer::start(
            root_paths.clone(),
            IndexerDeps {
                vfs: Arc::clone(&self.vfs),
                file_index: Arc::clone(&file_index),
                content_index: Arc::clone(&content_index),
                ignore: Arc::clone(&walk_ignore),
                max_file_size: config.max_file_size,
            },
        ));

        let router = watcher.as_ref().map(|w| {
            let events = w.events();
            let errors = w.errors();
            let observers = Arc::clone(&self.observers);
            let indexer = Arc::clone(&indexer);
            std::thread::Builder::new()
                .name("keystorm-project-events".to_string())
                .spawn(move || route_events(events, errors, observers, indexer))
                .expect("spawning event router")
        });

        let builder = graph.as_ref().map(|_| {
            Arc::new(GraphBuilder::new(
                Arc::clone(&self.vfs),
                Arc::new(ParserRegistry::with_builtins()),
                Arc::clone(&walk_ignore),
            ))
        });

        let initial_build = match (&graph, &builder) {
            (Some(graph), Some(builder)) => {
                let graph = Arc::clone(graph);
                let builder = Arc::clone(builder);
                let build_roots = root_paths.clone();
                let build_options = BuildOptions {
                    worker_count: config.worker_count,
                    max_file_size: config.max_file_size,
                    cancel: cancel.clone(),
                };
                Some(
                    std::thread::Builder::new()
                        .name("keystorm-graph-build".to_string())
                        .spawn(move || {
                            if let Err(e) = builder.build(&build_roots, &graph, &build_options) {
                                warn!(error = %e, "background graph build failed");
                            }
                        })
                        .expect("spawning graph build"),
                )
            }
            _ => None,
        };

        *slot = Some(ProjectState {
            workspace,
            documents,
            graph,
            watcher,
            file_index,
            content_index,
            indexer,
            builder,
            config,
            cancel,
            router,
            initial_build,
        });
        info!(roots = root_paths.len(), "project opened");
        Ok(())
    }

    /// Open from a `.code-workspace`-shaped JSON file: folders resolve
    /// against the file's directory, and its `settings` become config
    /// overrides (under any explicit `options.config` values).
    pub fn open_workspace_file(
        &self,
        path: &str,
        options: ProjectOptions,
    ) -> Result<(), ProjectError> {
        let path = vpath::clean(path);
        let file = crate::workspace::WorkspaceFile::load(self.vfs.as_ref(), &path)?;
        let base_dir = vpath::dir(&path);
        let folders = file.resolve_folders(&base_dir);
        if folders.is_empty() {
            return Err(ProjectError::Workspace(WorkspaceError::NoFolders));
        }

        let mut config = file.config();
        config.merge(&options.config);
        let roots: Vec<String> = folders.iter().map(|f| f.path().to_string()).collect();
        let root_refs: Vec<&str> = roots.iter().map(String::as_str).collect();
        self.open(&root_refs, ProjectOptions { config, ..options })
    }

    /// Tear everything down: watcher, indexer, documents (forced), graph,
    /// file index, workspace. Double-close is success.
    pub fn close(&self) -> Result<(), ProjectError> {
        let _guard = self.teardown.lock().unwrap();
        let state = match self.state.write().unwrap().take() {
            Some(state) => state,
            None => return Ok(()),
        };

        state.cancel.cancel();
        if let Some(watcher) = &state.watcher {
            if let Err(e) = watcher.close() {
                warn!(error = %e, "watcher close failed");
            }
        }
        if let Some(handle) = state.router {
            let _ = handle.join();
        }
        if let Some(handle) = state.initial_build {
            let _ = handle.join();
        }
        state.indexer.stop();
        if let Err(e) = state.documents.close_all(true) {
            warn!(error = %e, "force close-all failed");
        }
        if let Some(graph) = &state.graph {
            graph.clear();
        }
        state.file_index.close();
        state.workspace.close();
        info!("project closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.read().unwrap().is_some()
    }

    // -- subsystem access ---------------------------------------------------

    pub fn workspace(&self) -> Result<Arc<Workspace>, ProjectError> {
        self.with_state(|s| Arc::clone(&s.workspace))
    }

    pub fn documents(&self) -> Result<Arc<DocumentStore>, ProjectError> {
        self.with_state(|s| Arc::clone(&s.documents))
    }

    pub fn graph(&self) -> Result<Option<Arc<ProjectGraph>>, ProjectError> {
        self.with_state(|s| s.graph.clone())
    }

    pub fn file_index(&self) -> Result<Arc<dyn FileIndex>, ProjectError> {
        self.with_state(|s| Arc::clone(&s.file_index))
    }

    pub fn content_index(&self) -> Result<Arc<dyn ContentIndex>, ProjectError> {
        self.with_state(|s| Arc::clone(&s.content_index))
    }

    pub fn config(&self) -> Result<Config, ProjectError> {
        self.with_state(|s| s.config.clone())
    }

    pub fn vfs(&self) -> Arc<dyn Vfs> {
        Arc::clone(&self.vfs)
    }

    /// Watcher counters, when watching is active.
    pub fn watcher_stats(&self) -> Result<Option<keystorm_watch::WatcherStats>, ProjectError> {
        self.with_state(|s| s.watcher.as_ref().map(|w| w.stats()))
    }

    // -- document operations ------------------------------------------------

    pub fn open_file(&self, path: &str) -> Result<Arc<Document>, ProjectError> {
        let (documents, path) = self.documents_and_path(path)?;
        documents.open(&path).map_err(|e| ProjectError::document("open", &path, e))
    }

    pub fn close_file(&self, path: &str, force: bool) -> Result<(), ProjectError> {
        let (documents, path) = self.documents_and_path(path)?;
        documents.close(&path, force).map_err(|e| ProjectError::document("close", &path, e))
    }

    pub fn save_file(&self, path: &str) -> Result<(), ProjectError> {
        let (documents, path) = self.documents_and_path(path)?;
        documents.save(&path).map_err(|e| ProjectError::document("save", &path, e))
    }

    pub fn save_file_as(&self, path: &str, new_path: &str) -> Result<(), ProjectError> {
        let (documents, path) = self.documents_and_path(path)?;
        let new_path = self.resolve_in_workspace(new_path)?;
        documents
            .save_as(&path, &new_path)
            .map_err(|e| ProjectError::document("save-as", &path, e))
    }

    /// Returns whether content changed.
    pub fn reload_file(&self, path: &str, force: bool) -> Result<bool, ProjectError> {
        let (documents, path) = self.documents_and_path(path)?;
        documents.reload(&path, force).map_err(|e| ProjectError::document("reload", &path, e))
    }

    pub fn apply_edit(
        &self,
        path: &str,
        start: usize,
        end: usize,
        bytes: &[u8],
    ) -> Result<(), ProjectError> {
        let (documents, path) = self.documents_and_path(path)?;
        documents
            .apply_edit(&path, start, end, bytes)
            .map_err(|e| ProjectError::document("edit", &path, e))
    }

    pub fn update_content(&self, path: &str, bytes: &[u8]) -> Result<(), ProjectError> {
        let (documents, path) = self.documents_and_path(path)?;
        documents
            .update_content(&path, bytes)
            .map_err(|e| ProjectError::document("update", &path, e))
    }

    pub fn is_file_open(&self, path: &str) -> bool {
        self.documents_and_path(path).map(|(d, p)| d.is_open(&p)).unwrap_or(false)
    }

    pub fn is_file_dirty(&self, path: &str) -> bool {
        self.documents_and_path(path).map(|(d, p)| d.is_dirty(&p)).unwrap_or(false)
    }

    pub fn check_external_changes(&self) -> Result<Vec<String>, ProjectError> {
        self.with_state(|s| Arc::clone(&s.documents)).map(|d| d.check_external_changes())
    }

    // -- file and directory operations --------------------------------------

    pub fn create_file(&self, path: &str) -> Result<(), ProjectError> {
        let (documents, path) = self.documents_and_path(path)?;
        documents.create_file(&path).map_err(|e| ProjectError::document("create", &path, e))?;
        self.emit(ProjectChangeEvent::new(ProjectEventKind::FileCreated, path));
        Ok(())
    }

    pub fn delete_file(&self, path: &str) -> Result<(), ProjectError> {
        let (documents, path) = self.documents_and_path(path)?;
        documents.delete_file(&path).map_err(|e| ProjectError::document("delete", &path, e))?;
        self.emit(ProjectChangeEvent::new(ProjectEventKind::FileDeleted, path));
        Ok(())
    }

    pub fn rename_file(&self, old_path: &str, new_path: &str) -> Result<(), ProjectError> {
        let (documents, old_path) = self.documents_and_path(old_path)?;
        let new_path = self.resolve_in_workspace(new_path)?;
        documents
            .rename_file(&old_path, &new_path)
            .map_err(|e| ProjectError::document("rename", &old_path, e))?;
        self.emit(ProjectChangeEvent::renamed(old_path, new_path));
        Ok(())
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        self.vfs.read_file(&path).map_err(|e| ProjectError::vfs("read", &path, e))
    }

    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<(), ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        self.vfs.write_file(&path, data).map_err(|e| ProjectError::vfs("write", &path, e))
    }

    pub fn create_directory(&self, path: &str) -> Result<(), ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        self.vfs.mkdir_all(&path).map_err(|e| ProjectError::vfs("mkdir", &path, e))
    }

    pub fn delete_directory(&self, path: &str) -> Result<(), ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        self.vfs.remove_all(&path).map_err(|e| ProjectError::vfs("rmdir", &path, e))
    }

    pub fn list_directory(&self, path: &str) -> Result<Vec<keystorm_vfs::FileInfo>, ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        self.vfs.read_dir(&path).map_err(|e| ProjectError::vfs("readdir", &path, e))
    }

    // -- search -------------------------------------------------------------

    pub fn find_files(&self, query: &str, limit: usize) -> Result<Vec<String>, ProjectError> {
        self.with_state(|s| s.file_index.search(query, limit))
    }

    pub fn search_content(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ContentHit>, ProjectError> {
        self.with_state(|s| s.content_index.search(query, limit))
    }

    // -- graph queries ------------------------------------------------------

    /// Rebuild the graph synchronously over the workspace roots.
    pub fn rebuild_graph(&self) -> Result<(), ProjectError> {
        let (graph, builder, roots, options) = self.with_state(|s| {
            (
                s.graph.clone(),
                s.builder.clone(),
                s.workspace.roots(),
                BuildOptions {
                    worker_count: s.config.worker_count,
                    max_file_size: s.config.max_file_size,
                    cancel: s.cancel.clone(),
                },
            )
        })?;
        if let (Some(graph), Some(builder)) = (graph, builder) {
            graph.clear();
            builder.build(&roots, &graph, &options)?;
        }
        Ok(())
    }

    /// Persist the graph as `{nodes, edges}` JSON through the VFS.
    pub fn save_graph(&self, path: &str) -> Result<(), ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        if let Some(graph) = self.with_state(|s| s.graph.clone())? {
            let data = graph.to_json()?;
            self.vfs.write_file(&path, &data).map_err(|e| ProjectError::vfs("write", &path, e))?;
        }
        Ok(())
    }

    /// Load a previously saved graph; replaces the current contents
    /// atomically.
    pub fn load_graph(&self, path: &str) -> Result<(), ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        if let Some(graph) = self.with_state(|s| s.graph.clone())? {
            let data = self.vfs.read_file(&path).map_err(|e| ProjectError::vfs("read", &path, e))?;
            graph.load_json(&data)?;
        }
        Ok(())
    }

    pub fn related_files(&self, path: &str, limit: usize) -> Result<Vec<RelatedFile>, ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        Ok(self
            .with_state(|s| s.graph.clone())?
            .map(|g| query::related_files(&g, &path, limit))
            .unwrap_or_default())
    }

    pub fn find_tests_for(&self, path: &str) -> Result<Vec<String>, ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        Ok(self
            .with_state(|s| s.graph.clone())?
            .map(|g| query::find_tests_for(&g, &path))
            .unwrap_or_default())
    }

    pub fn find_impl_for(&self, path: &str) -> Result<Vec<String>, ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        Ok(self
            .with_state(|s| s.graph.clone())?
            .map(|g| query::find_impl_for(&g, &path))
            .unwrap_or_default())
    }

    pub fn import_chain(&self, from: &str, to: &str) -> Result<Vec<NodeId>, ProjectError> {
        let from = self.resolve_in_workspace(from)?;
        let to = self.resolve_in_workspace(to)?;
        Ok(self
            .with_state(|s| s.graph.clone())?
            .map(|g| query::import_chain(&g, &from, &to))
            .unwrap_or_default())
    }

    pub fn compute_impact(&self, path: &str) -> Result<f64, ProjectError> {
        let path = self.resolve_in_workspace(path)?;
        Ok(self
            .with_state(|s| s.graph.clone())?
            .map(|g| query::compute_impact(&g, &path))
            .unwrap_or(0.0))
    }

    // -- observers ----------------------------------------------------------

    pub fn on_change(
        &self,
        f: impl Fn(&ProjectChangeEvent) + Send + Sync + 'static,
    ) -> ObserverId {
        self.observers.register(f)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    // -- internals ----------------------------------------------------------

    fn with_state<R>(&self, f: impl FnOnce(&ProjectState) -> R) -> Result<R, ProjectError> {
        let guard = self.state.read().unwrap();
        match guard.as_ref() {
            Some(state) => Ok(f(state)),
            None => Err(ProjectError::NotOpen),
        }
    }

    fn documents_and_path(&self, path: &str) -> Result<(Arc<DocumentStore>, String), ProjectError> {
        let (documents, workspace) =
            self.with_state(|s| (Arc::clone(&s.documents), Arc::clone(&s.workspace)))?;
        let resolved = resolve_against(&workspace, path)?;
        Ok((documents, resolved))
    }

    fn resolve_in_workspace(&self, path: &str) -> Result<String, ProjectError> {
        let workspace = self.with_state(|s| Arc::clone(&s.workspace))?;
        resolve_against(&workspace, path)
    }

    fn emit(&self, event: ProjectChangeEvent) {
        let indexer = self.with_state(|s| Arc::clone(&s.indexer)).ok();
        if let Some(indexer) = indexer {
            indexer.push(to_index_event(&event));
        }
        self.observers.emit(&event);
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_against(workspace: &Workspace, path: &str) -> Result<String, ProjectError> {
    let abs = if path.starts_with('/') {
        vpath::clean(path)
    } else {
        match workspace.primary_root() {
            Some(root) => vpath::abs(path, &root),
            None => vpath::clean(path),
        }
    };
    if workspace.is_in_workspace(&abs) {
        Ok(abs)
    } else {
        Err(ProjectError::Workspace(WorkspaceError::NotInWorkspace(abs)))
    }
}

fn build_ignore(exclude: &[String], extra: &[String]) -> IgnoreMatcher {
    let mut matcher = IgnoreMatcher::default_set();
    for pattern in exclude.iter().chain(extra) {
        if let Err(e) = matcher.add_pattern(pattern) {
            warn!(pattern, error = %e, "skipping invalid exclude pattern");
        }
    }
    matcher
}

/// Collapse an op bitmask into the single change kind observers see.
fn translate_op(op: Op) -> ProjectEventKind {
    if op.contains(Op::REMOVE) {
        ProjectEventKind::FileDeleted
    } else if op.contains(Op::RENAME) {
        ProjectEventKind::FileRenamed
    } else if op.contains(Op::CREATE) {
        ProjectEventKind::FileCreated
    } else {
        ProjectEventKind::FileModified
    }
}

fn to_index_event(event: &ProjectChangeEvent) -> FileChangeEvent {
    let kind = match event.kind {
        ProjectEventKind::FileCreated => FileChangeKind::Created,
        ProjectEventKind::FileDeleted => FileChangeKind::Deleted,
        ProjectEventKind::FileRenamed => FileChangeKind::Renamed,
        _ => FileChangeKind::Modified,
    };
    FileChangeEvent {
        kind,
        path: event.path.clone(),
        old_path: event.old_path.clone(),
        timestamp: event.timestamp,
    }
}

/// Long-lived event loop: debounced watcher events become project change
/// events, feed the incremental indexer, and fan out to observers. Watcher
/// errors are logged and counted upstream; they never stop the loop.
fn route_events(
    mut events: crossbeam_channel::Receiver<WatchEvent>,
    mut errors: crossbeam_channel::Receiver<keystorm_watch::WatchError>,
    observers: Arc<ObserverRegistry<ProjectChangeEvent>>,
    indexer: Arc<IncrementalIndexer>,
) {
    let mut events_open = true;
    let mut errors_open = true;
    while events_open || errors_open {
        crossbeam_channel::select! {
            recv(events) -> msg => match msg {
                Ok(watch_event) => {
                    let kind = translate_op(watch_event.op);
                    let event = ProjectChangeEvent::new(kind, watch_event.path);
                    indexer.push(to_index_event(&event));
                    observers.emit(&event);
                }
                Err(_) => {
                    // Park the dead channel so select never spins on it.
                    events = crossbeam_channel::never();
                    events_open = false;
                }
            },
            recv(errors) -> msg => match msg {
                Ok(e) => debug!(error = %e, "watcher error"),
                Err(_) => {
                    errors = crossbeam_channel::never();
                    errors_open = false;
                }
            },
        }
    }
    debug!("project event router exiting");
}
