//! Index collaborators. The fuzzy file searcher and content searcher proper
//! live outside the core; these traits are the narrow contract the facade
//! holds them to, with in-memory defaults good enough for the facade's own
//! behavior and its tests.
//!
//! The incremental indexer is the background consumer of file-change
//! events: it keeps both indexes current without ever blocking the event
//! producer.

use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use keystorm_core::IgnoreMatcher;
use keystorm_vfs::{Vfs, WalkControl};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::SystemTime;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// What the facade feeds the indexer for every debounced watcher event.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    pub kind: FileChangeKind,
    pub path: String,
    pub old_path: Option<String>,
    pub timestamp: SystemTime,
}

impl FileChangeEvent {
    pub fn new(kind: FileChangeKind, path: impl Into<String>) -> Self {
        FileChangeEvent { kind, path: path.into(), old_path: None, timestamp: SystemTime::now() }
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Find-file-by-name service.
pub trait FileIndex: Send + Sync {
    fn add_path(&self, path: &str);
    fn remove_path(&self, path: &str);
    fn rename_path(&self, old_path: &str, new_path: &str);
    /// Ranked paths whose name matches `query`.
    fn search(&self, query: &str, limit: usize) -> Vec<String>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn close(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHit {
    pub path: String,
    pub line: u32,
    pub text: String,
}

/// Search-file-contents service.
pub trait ContentIndex: Send + Sync {
    fn update(&self, path: &str, content: &[u8]);
    fn remove(&self, path: &str);
    fn search(&self, query: &str, limit: usize) -> Vec<ContentHit>;
}

// ---------------------------------------------------------------------------
// In-memory defaults
// ---------------------------------------------------------------------------

/// Substring matcher over indexed paths; filename hits rank above full-path
/// hits.
#[derive(Default)]
pub struct InMemoryFileIndex {
    paths: DashMap<String, ()>,
    closed: AtomicBool,
}

impl InMemoryFileIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileIndex for InMemoryFileIndex {
    fn add_path(&self, path: &str) {
        if !self.closed.load(Ordering::Relaxed) {
            self.paths.insert(path.to_string(), ());
        }
    }

    fn remove_path(&self, path: &str) {
        self.paths.remove(path);
    }

    fn rename_path(&self, old_path: &str, new_path: &str) {
        if self.paths.remove(old_path).is_some() {
            self.add_path(new_path);
        }
    }

    fn search(&self, query: &str, limit: usize) -> Vec<String> {
        let needle = query.to_lowercase();
        let mut name_hits = Vec::new();
        let mut path_hits = Vec::new();
        for entry in self.paths.iter() {
            let path = entry.key();
            let name = keystorm_vfs::path::base(path).to_lowercase();
            if name.contains(&needle) {
                name_hits.push(path.clone());
            } else if path.to_lowercase().contains(&needle) {
                path_hits.push(path.clone());
            }
        }
        name_hits.sort();
        path_hits.sort();
        name_hits.extend(path_hits);
        name_hits.truncate(limit);
        name_hits
    }

    fn len(&self) -> usize {
        self.paths.len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.paths.clear();
    }
}

/// Line-oriented substring search over stored text.
#[derive(Default)]
pub struct InMemoryContentIndex {
    contents: DashMap<String, String>,
}

impl InMemoryContentIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentIndex for InMemoryContentIndex {
    fn update(&self, path: &str, content: &[u8]) {
        self.contents.insert(path.to_string(), String::from_utf8_lossy(content).into_owned());
    }

    fn remove(&self, path: &str) {
        self.contents.remove(path);
    }

    fn search(&self, query: &str, limit: usize) -> Vec<ContentHit> {
        let mut hits = Vec::new();
        for entry in self.contents.iter() {
            for (idx, line) in entry.value().lines().enumerate() {
                if line.contains(query) {
                    hits.push(ContentHit {
                        path: entry.key().clone(),
                        line: idx as u32 + 1,
                        text: line.to_string(),
                    });
                }
            }
        }
        hits.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
        hits.truncate(limit);
        hits
    }
}

// ---------------------------------------------------------------------------
// Incremental indexer
// ---------------------------------------------------------------------------

enum IndexerMsg {
    Change(FileChangeEvent),
    Stop,
}

/// Background job keeping the indexes current: an initial sweep over the
/// roots, then one change at a time from the facade. Per-file failures are
/// counted, never propagated.
pub struct IncrementalIndexer {
    tx: Sender<IndexerMsg>,
    handle: Mutex<Option<JoinHandle<()>>>,
    processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

pub struct IndexerDeps {
    pub vfs: Arc<dyn Vfs>,
    pub file_index: Arc<dyn FileIndex>,
    pub content_index: Arc<dyn ContentIndex>,
    pub ignore: Arc<IgnoreMatcher>,
    pub max_file_size: u64,
}

impl IncrementalIndexer {
    /// Spawn the indexer thread; it scans `roots` before draining changes.
    pub fn start(roots: Vec<String>, deps: IndexerDeps) -> Self {
        let (tx, rx) = unbounded();
        let processed = Arc::new(AtomicU64::new(0));
        let errors = Arc::new(AtomicU64::new(0));

        let t_processed = Arc::clone(&processed);
        let t_errors = Arc::clone(&errors);
        let handle = std::thread::Builder::new()
            .name("keystorm-indexer".to_string())
            .spawn(move || indexer_loop(roots, deps, rx, t_processed, t_errors))
            .expect("spawning indexer thread");

        IncrementalIndexer {
            tx,
            handle: Mutex::new(Some(handle)),
            processed,
            errors,
        }
    }

    /// Queue a change; never blocks.
    pub fn push(&self, event: FileChangeEvent) {
        let _ = self.tx.send(IndexerMsg::Change(event));
    }

    /// Stop after draining queued work. Idempotent.
    pub fn stop(&self) {
        let _ = self.tx.send(IndexerMsg::Stop);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

fn indexer_loop(
    roots: Vec<String>,
    deps: IndexerDeps,
    rx: Receiver<IndexerMsg>,
    processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
) {
    // Initial sweep.
    for root in &roots {
        let walk_result = deps.vfs.walk(root, &mut |info| {
            if info.is_dir {
                if info.path != *root && deps.ignore.matches_relative(&info.path, root, true) {
                    return WalkControl::SkipDir;
                }
                return WalkControl::Continue;
            }
            if !deps.ignore.matches_relative(&info.path, root, false) {
                index_file(&deps, &info.path, info.size, &errors);
            }
            WalkControl::Continue
        });
        if let Err(e) = walk_result {
            errors.fetch_add(1, Ordering::Relaxed);
            warn!(root, error = %e, "initial index sweep failed");
        }
    }
    info!(files = deps.file_index.len(), "initial index complete");

    while let Ok(msg) = rx.recv() {
        match msg {
            IndexerMsg::Change(event) => {
                apply_change(&deps, &event, &errors);
                processed.fetch_add(1, Ordering::Relaxed);
            }
            IndexerMsg::Stop => break,
        }
    }
    debug!("indexer stopped");
}

fn apply_change(deps: &IndexerDeps, event: &FileChangeEvent, errors: &AtomicU64) {
    match event.kind {
        FileChangeKind::Deleted => {
            deps.file_index.remove_path(&event.path);
            deps.content_index.remove(&event.path);
        }
        FileChangeKind::Renamed => {
            if let Some(old) = &event.old_path {
                deps.file_index.rename_path(old, &event.path);
                deps.content_index.remove(old);
            }
            refresh(deps, &event.path, errors);
        }
        FileChangeKind::Created | FileChangeKind::Modified => {
            // The path may be gone again by the time we get here.
            if deps.vfs.exists(&event.path) {
                refresh(deps, &event.path, errors);
            } else {
                deps.file_index.remove_path(&event.path);
                deps.content_index.remove(&event.path);
            }
        }
    }
}

fn refresh(deps: &IndexerDeps, path: &str, errors: &AtomicU64) {
    match deps.vfs.stat(path) {
        Ok(info) if !info.is_dir => index_file(deps, path, info.size, errors),
        _ => {}
    }
}

fn index_file(deps: &IndexerDeps, path: &str, size: u64, errors: &AtomicU64) {
    deps.file_index.add_path(path);
    if size > deps.max_file_size {
        return;
    }
    match deps.vfs.read_file(path) {
        Ok(content) => {
            if !keystorm_core::encoding::is_binary(&content) {
                deps.content_index.update(path, &content);
            }
        }
        Err(e) => {
            errors.fetch_add(1, Ordering::Relaxed);
            debug!(path, error = %e, "content index skipped file");
        }
    }
}
