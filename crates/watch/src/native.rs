//! Native watcher: wraps the platform notifier (inotify / FSEvents /
//! ReadDirectoryChangesW via `notify`), translates its events into the
//! [`Op`] bitmask, and runs the filter chain — hidden filter, ignore
//! matcher, then an optional caller predicate.
//!
//! Raw notifier callbacks only forward into an internal channel; a pump
//! thread does filtering, translation, directory auto-subscription, and the
//! non-blocking push onto the bounded outbound channel.

use crate::{Op, WatchConfig, WatchError, WatchEvent, Watcher, WatcherStats};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use dashmap::DashSet;
use keystorm_core::IgnoreMatcher;
use keystorm_vfs::{path as vpath, OsFs, Vfs, WalkControl};
use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};
use tracing::{debug, info, warn};

struct StatsInner {
    events_total: AtomicU64,
    errors_total: AtomicU64,
    last_error: Mutex<Option<String>>,
    started_at: SystemTime,
}

impl StatsInner {
    fn new() -> Self {
        StatsInner {
            events_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            last_error: Mutex::new(None),
            started_at: SystemTime::now(),
        }
    }

    fn record_error(&self, message: String) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock().unwrap() = Some(message);
    }
}

struct Shared {
    notifier: Mutex<Option<RecommendedWatcher>>,
    watched: DashSet<String>,
    /// Roots handed to `watch_recursive`; ignore patterns evaluate relative
    /// to the containing root so directories above it never match.
    roots: DashSet<String>,
    ignore: IgnoreMatcher,
    config: WatchConfig,
    stats: StatsInner,
    event_rx: Receiver<WatchEvent>,
    error_rx: Receiver<WatchError>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.notifier.lock().unwrap().is_none()
    }

    /// Most specific registered root containing `path`.
    fn containing_root(&self, path: &str) -> Option<String> {
        self.roots
            .iter()
            .filter(|r| vpath::is_ancestor_or_equal(r.key(), path))
            .max_by_key(|r| r.key().len())
            .map(|r| r.key().clone())
    }

    fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        match self.containing_root(path) {
            Some(root) => self.ignore.matches_relative(path, &root, is_dir),
            // Outside any root: only the basename can sensibly match.
            None => self.ignore.matches_relative(path, &vpath::dir(path), is_dir),
        }
    }

    /// Subscribe one path with the native notifier and register it. All
    /// quota / duplicate / existence checks happen here.
    fn subscribe(&self, path: &str) -> Result<(), WatchError> {
        let path = vpath::clean(path);
        let mut guard = self.notifier.lock().unwrap();
        let notifier = guard.as_mut().ok_or(WatchError::Closed)?;

        if !Path::new(&path).exists() {
            return Err(WatchError::PathNotExist(path));
        }
        if self.watched.contains(&path) {
            return Err(WatchError::AlreadyWatching(path));
        }
        if self.watched.len() >= self.config.max_watches {
            return Err(WatchError::QuotaExceeded { limit: self.config.max_watches });
        }

        notifier.watch(Path::new(&path), RecursiveMode::NonRecursive)?;
        self.watched.insert(path);
        Ok(())
    }

    /// Subscribe every non-ignored directory under `root`. The root itself
    /// must subscribe; descendants are best-effort except for quota
    /// exhaustion, which aborts.
    fn subscribe_tree(&self, root: &str) -> Result<(), WatchError> {
        let root = vpath::clean(root);
        let ignore_base = self.containing_root(&root).unwrap_or_else(|| root.clone());
        self.subscribe(&root)?;

        let fs = OsFs::new();
        let mut failure: Option<WatchError> = None;
        fs.walk_dir(&root, &mut |entry| {
            if !entry.is_dir {
                return WalkControl::Continue;
            }
            if entry.path == root {
                return WalkControl::Continue;
            }
            if self.ignore.matches_relative(&entry.path, &ignore_base, true) {
                debug!(path = %entry.path, "pruning ignored directory from watch");
                return WalkControl::SkipDir;
            }
            match self.subscribe(&entry.path) {
                Ok(()) => WalkControl::Continue,
                Err(WatchError::AlreadyWatching(_)) => WalkControl::Continue,
                Err(e @ WatchError::QuotaExceeded { .. }) => {
                    failure = Some(e);
                    WalkControl::Stop
                }
                Err(e) => {
                    self.stats.record_error(e.to_string());
                    warn!(path = %entry.path, error = %e, "skipping unwatchable directory");
                    WalkControl::Continue
                }
            }
        })
        .map_err(|e| {
            self.stats.record_error(e.to_string());
            WatchError::PathNotExist(root.clone())
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// File-system watcher over the platform notifier.
pub struct NativeWatcher {
    shared: Arc<Shared>,
}

impl NativeWatcher {
    pub fn new(ignore: IgnoreMatcher, config: WatchConfig) -> Result<Self, WatchError> {
        let (raw_tx, raw_rx) = unbounded::<Result<notify::Event, notify::Error>>();
        let (event_tx, event_rx) = bounded(config.channel_capacity);
        let (error_tx, error_rx) = bounded(config.channel_capacity);

        let notifier = notify::recommended_watcher(move |res| {
            // Never block or do work inside the notifier callback.
            let _ = raw_tx.send(res);
        })?;

        let shared = Arc::new(Shared {
            notifier: Mutex::new(Some(notifier)),
            watched: DashSet::new(),
            roots: DashSet::new(),
            ignore,
            config,
            stats: StatsInner::new(),
            event_rx,
            error_rx,
        });

        let pump_shared = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("keystorm-watch-pump".to_string())
            .spawn(move || pump_loop(pump_shared, raw_rx, event_tx, error_tx))
            .map_err(|e| WatchError::Notify(notify::Error::io(e)))?;

        Ok(NativeWatcher { shared })
    }

    pub fn with_defaults() -> Result<Self, WatchError> {
        Self::new(IgnoreMatcher::default_set(), WatchConfig::default())
    }
}

impl Watcher for NativeWatcher {
    fn watch(&self, path: &str) -> Result<(), WatchError> {
        self.shared.subscribe(path)
    }

    fn watch_recursive(&self, path: &str) -> Result<(), WatchError> {
        if self.shared.is_closed() {
            return Err(WatchError::Closed);
        }
        let root = vpath::clean(path);
        info!(root, "watching tree");
        self.shared.roots.insert(root.clone());
        self.shared.subscribe_tree(&root)
    }

    fn unwatch(&self, path: &str) -> Result<(), WatchError> {
        let path = vpath::clean(path);
        let mut guard = self.shared.notifier.lock().unwrap();
        let notifier = guard.as_mut().ok_or(WatchError::Closed)?;
        if self.shared.watched.remove(&path).is_none() {
            return Err(WatchError::NotWatching(path));
        }
        notifier.unwatch(Path::new(&path))?;
        Ok(())
    }

    fn events(&self) -> Receiver<WatchEvent> {
        self.shared.event_rx.clone()
    }

    fn errors(&self) -> Receiver<WatchError> {
        self.shared.error_rx.clone()
    }

    fn close(&self) -> Result<(), WatchError> {
        // Dropping the notifier drops the raw sender, which ends the pump
        // thread, which drops the outbound senders and closes both streams.
        let mut guard = self.shared.notifier.lock().unwrap();
        if guard.take().is_some() {
            info!("watcher closed");
        }
        self.shared.watched.clear();
        self.shared.roots.clear();
        Ok(())
    }

    fn stats(&self) -> WatcherStats {
        let s = &self.shared.stats;
        WatcherStats {
            watched_paths: self.shared.watched.len(),
            pending_events: self.shared.event_rx.len(),
            events_total: s.events_total.load(Ordering::Relaxed),
            errors_total: s.errors_total.load(Ordering::Relaxed),
            last_error: s.last_error.lock().unwrap().clone(),
            started_at: s.started_at,
        }
    }

    fn is_watching(&self, path: &str) -> bool {
        self.shared.watched.contains(&vpath::clean(path))
    }

    fn watched_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.shared.watched.iter().map(|p| p.key().clone()).collect();
        paths.sort();
        paths
    }
}

// ---------------------------------------------------------------------------
// Pump thread
// ---------------------------------------------------------------------------

fn pump_loop(
    shared: Arc<Shared>,
    raw_rx: Receiver<Result<notify::Event, notify::Error>>,
    event_tx: Sender<WatchEvent>,
    error_tx: Sender<WatchError>,
) {
    while let Ok(res) = raw_rx.recv() {
        let raw = match res {
            Ok(ev) => ev,
            Err(e) => {
                shared.stats.record_error(e.to_string());
                let _ = error_tx.try_send(WatchError::Notify(e));
                continue;
            }
        };

        let op = translate_kind(&raw.kind);
        if op.is_empty() {
            continue;
        }

        for raw_path in &raw.paths {
            let path = vpath::normalize(raw_path);
            let is_dir = raw_path.is_dir();

            if shared.config.ignore_hidden && vpath::base(&path).starts_with('.') {
                continue;
            }
            if shared.is_ignored(&path, is_dir) {
                continue;
            }

            let event = WatchEvent { path: path.clone(), op, timestamp: Instant::now() };
            if let Some(filter) = &shared.config.filter {
                if !filter(&event) {
                    continue;
                }
            }

            // New directory inside a watched area: subscribe it so events
            // from its contents keep flowing.
            if op.contains(Op::CREATE) && is_dir && !shared.watched.contains(&path) {
                if let Err(e) = shared.subscribe_tree(&path) {
                    shared.stats.record_error(e.to_string());
                    warn!(path = %path, error = %e, "auto-subscribe failed");
                }
            }

            shared.stats.events_total.fetch_add(1, Ordering::Relaxed);
            match event_tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(ev)) => {
                    // Deliberate back-pressure policy: drop, never block.
                    shared.stats.record_error(format!("event channel full, dropped {}", ev.path));
                    let _ = error_tx.try_send(WatchError::EventDropped(ev.path));
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
    debug!("watch pump exiting");
}

fn translate_kind(kind: &EventKind) -> Op {
    match kind {
        EventKind::Create(_) => Op::CREATE,
        EventKind::Modify(ModifyKind::Name(_)) => Op::RENAME,
        EventKind::Modify(ModifyKind::Metadata(_)) => Op::CHMOD,
        EventKind::Modify(_) => Op::WRITE,
        EventKind::Remove(_) => Op::REMOVE,
        _ => Op::NONE,
    }
}
