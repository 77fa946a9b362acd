//! Hand-driven watcher for tests: events are injected directly, so debounce
//! and routing behavior can be exercised without touching a real filesystem
//! or sleeping on the native notifier.

use crate::{WatchError, WatchEvent, Watcher, WatcherStats};
use crossbeam_channel::{unbounded, Receiver, Sender};
use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::SystemTime;

/// Test double implementing [`Watcher`]. `watch` only records the path;
/// [`inject`](MockWatcher::inject) pushes events downstream.
pub struct MockWatcher {
    watched: DashSet<String>,
    event_tx: Mutex<Option<Sender<WatchEvent>>>,
    event_rx: Receiver<WatchEvent>,
    error_tx: Mutex<Option<Sender<WatchError>>>,
    error_rx: Receiver<WatchError>,
    events_total: AtomicU64,
    last_error: RwLock<Option<String>>,
    started_at: SystemTime,
}

impl MockWatcher {
    pub fn new() -> Self {
        let (event_tx, event_rx) = unbounded();
        let (error_tx, error_rx) = unbounded();
        MockWatcher {
            watched: DashSet::new(),
            event_tx: Mutex::new(Some(event_tx)),
            event_rx,
            error_tx: Mutex::new(Some(error_tx)),
            error_rx,
            events_total: AtomicU64::new(0),
            last_error: RwLock::new(None),
            started_at: SystemTime::now(),
        }
    }

    /// Push an event downstream as if the native notifier produced it.
    /// Silently ignored after close.
    pub fn inject(&self, event: WatchEvent) {
        if let Some(tx) = self.event_tx.lock().unwrap().as_ref() {
            self.events_total.fetch_add(1, Ordering::Relaxed);
            let _ = tx.send(event);
        }
    }

    pub fn inject_error(&self, error: WatchError) {
        *self.last_error.write().unwrap() = Some(error.to_string());
        if let Some(tx) = self.error_tx.lock().unwrap().as_ref() {
            let _ = tx.send(error);
        }
    }

    fn is_closed(&self) -> bool {
        self.event_tx.lock().unwrap().is_none()
    }
}

impl Default for MockWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Watcher for MockWatcher {
    fn watch(&self, path: &str) -> Result<(), WatchError> {
        if self.is_closed() {
            return Err(WatchError::Closed);
        }
        if !self.watched.insert(path.to_string()) {
            return Err(WatchError::AlreadyWatching(path.to_string()));
        }
        Ok(())
    }

    fn watch_recursive(&self, path: &str) -> Result<(), WatchError> {
        self.watch(path)
    }

    fn unwatch(&self, path: &str) -> Result<(), WatchError> {
        if self.is_closed() {
            return Err(WatchError::Closed);
        }
        if self.watched.remove(path).is_none() {
            return Err(WatchError::NotWatching(path.to_string()));
        }
        Ok(())
    }

    fn events(&self) -> Receiver<WatchEvent> {
        self.event_rx.clone()
    }

    fn errors(&self) -> Receiver<WatchError> {
        self.error_rx.clone()
    }

    fn close(&self) -> Result<(), WatchError> {
        self.event_tx.lock().unwrap().take();
        self.error_tx.lock().unwrap().take();
        self.watched.clear();
        Ok(())
    }

    fn stats(&self) -> WatcherStats {
        WatcherStats {
            watched_paths: self.watched.len(),
            pending_events: self.event_rx.len(),
            events_total: self.events_total.load(Ordering::Relaxed),
            errors_total: 0,
            last_error: self.last_error.read().unwrap().clone(),
            started_at: self.started_at,
        }
    }

    fn is_watching(&self, path: &str) -> bool {
        self.watched.contains(path)
    }

    fn watched_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.watched.iter().map(|p| p.key().clone()).collect();
        paths.sort();
        paths
    }
}
