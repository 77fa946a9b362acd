//! Debouncing wrapper over any [`Watcher`].
//!
//! Each upstream event either opens a pending entry with a fresh deadline or
//! merges into an existing one — ops OR together, the timestamp and the
//! deadline refresh. A single timer thread emits entries whose deadline has
//! passed; there is never a thread or timer per event. Per-path order is
//! preserved; nothing is guaranteed across paths.

use crate::{WatchError, WatchEvent, Watcher, WatcherStats, DEFAULT_DEBOUNCE_DELAY};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_OUT_CAPACITY: usize = 1024;

enum Ctl {
    Flush,
    SetDelay(Duration),
    Close,
}

struct PendingEntry {
    event: WatchEvent,
    deadline: Instant,
}

/// Wraps an inner watcher and coalesces rapid events per path over a delay
/// window. Errors from the inner watcher pass through unchanged.
pub struct Debouncer<W: Watcher> {
    inner: W,
    ctl_tx: Sender<Ctl>,
    out_rx: Receiver<WatchEvent>,
    pending_count: Arc<AtomicUsize>,
    dropped_total: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<W: Watcher> Debouncer<W> {
    pub fn new(inner: W, delay: Duration) -> Self {
        Self::with_capacity(inner, delay, DEFAULT_OUT_CAPACITY)
    }

    pub fn with_default_delay(inner: W) -> Self {
        Self::new(inner, DEFAULT_DEBOUNCE_DELAY)
    }

    pub fn with_capacity(inner: W, delay: Duration, capacity: usize) -> Self {
        let (ctl_tx, ctl_rx) = unbounded();
        let (out_tx, out_rx) = bounded(capacity);
        let pending_count = Arc::new(AtomicUsize::new(0));
        let dropped_total = Arc::new(AtomicU64::new(0));

        let events_rx = inner.events();
        let thread_pending = Arc::clone(&pending_count);
        let thread_dropped = Arc::clone(&dropped_total);
        let handle = std::thread::Builder::new()
            .name("keystorm-debounce".to_string())
            .spawn(move || {
                timer_loop(events_rx, ctl_rx, out_tx, delay, thread_pending, thread_dropped)
            })
            .expect("spawning debounce thread");

        Debouncer {
            inner,
            ctl_tx,
            out_rx,
            pending_count,
            dropped_total,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Emit every pending entry immediately, cancelling its timer.
    pub fn flush(&self) {
        let _ = self.ctl_tx.send(Ctl::Flush);
    }

    /// Change the window for entries created after this call; entries
    /// already pending keep their current deadline.
    pub fn set_delay(&self, delay: Duration) {
        let _ = self.ctl_tx.send(Ctl::SetDelay(delay));
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }
}

impl<W: Watcher> Watcher for Debouncer<W> {
    fn watch(&self, path: &str) -> Result<(), WatchError> {
        self.inner.watch(path)
    }

    fn watch_recursive(&self, path: &str) -> Result<(), WatchError> {
        self.inner.watch_recursive(path)
    }

    fn unwatch(&self, path: &str) -> Result<(), WatchError> {
        self.inner.unwatch(path)
    }

    fn events(&self) -> Receiver<WatchEvent> {
        self.out_rx.clone()
    }

    fn errors(&self) -> Receiver<WatchError> {
        self.inner.errors()
    }

    fn close(&self) -> Result<(), WatchError> {
        // Pending timers are cancelled (not emitted), the downstream channel
        // closes when the timer thread drops its sender, then the inner
        // watcher closes.
        let _ = self.ctl_tx.send(Ctl::Close);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.inner.close()
    }

    fn stats(&self) -> WatcherStats {
        let mut stats = self.inner.stats();
        stats.pending_events = self.pending_count.load(Ordering::Relaxed);
        stats.errors_total += self.dropped_total.load(Ordering::Relaxed);
        stats
    }

    fn is_watching(&self, path: &str) -> bool {
        self.inner.is_watching(path)
    }

    fn watched_paths(&self) -> Vec<String> {
        self.inner.watched_paths()
    }
}

// ---------------------------------------------------------------------------
// Timer thread
// ---------------------------------------------------------------------------

fn timer_loop(
    events_rx: Receiver<WatchEvent>,
    ctl_rx: Receiver<Ctl>,
    out_tx: Sender<WatchEvent>,
    mut delay: Duration,
    pending_count: Arc<AtomicUsize>,
    dropped_total: Arc<AtomicU64>,
) {
    let mut pending: HashMap<String, PendingEntry> = HashMap::new();

    loop {
        let timer = match pending.values().map(|e| e.deadline).min() {
            Some(deadline) => {
                crossbeam_channel::after(deadline.saturating_duration_since(Instant::now()))
            }
            None => never(),
        };

        select! {
            recv(events_rx) -> msg => match msg {
                Ok(event) => {
                    let deadline = Instant::now() + delay;
                    pending
                        .entry(event.path.clone())
                        .and_modify(|entry| {
                            // OR-merge ops, refresh timestamp, reset timer.
                            entry.event.op |= event.op;
                            entry.event.timestamp = event.timestamp;
                            entry.deadline = deadline;
                        })
                        .or_insert(PendingEntry { event, deadline });
                    pending_count.store(pending.len(), Ordering::Relaxed);
                }
                Err(_) => {
                    // Inner watcher closed underneath us.
                    debug!(pending = pending.len(), "upstream closed, cancelling pending");
                    break;
                }
            },
            recv(ctl_rx) -> msg => match msg {
                Ok(Ctl::Flush) => {
                    let entries: Vec<PendingEntry> = pending.drain().map(|(_, e)| e).collect();
                    pending_count.store(0, Ordering::Relaxed);
                    for entry in entries {
                        emit(&out_tx, entry.event, &dropped_total);
                    }
                }
                Ok(Ctl::SetDelay(d)) => delay = d,
                Ok(Ctl::Close) | Err(_) => break,
            },
            recv(timer) -> _ => {
                let now = Instant::now();
                let expired: Vec<String> = pending
                    .iter()
                    .filter(|(_, e)| e.deadline <= now)
                    .map(|(p, _)| p.clone())
                    .collect();
                for path in expired {
                    if let Some(entry) = pending.remove(&path) {
                        emit(&out_tx, entry.event, &dropped_total);
                    }
                }
                pending_count.store(pending.len(), Ordering::Relaxed);
            }
        }
    }
    pending_count.store(0, Ordering::Relaxed);
}

fn emit(out_tx: &Sender<WatchEvent>, event: WatchEvent, dropped_total: &AtomicU64) {
    match out_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(ev)) => {
            dropped_total.fetch_add(1, Ordering::Relaxed);
            warn!(path = %ev.path, "debounce output full, dropped event");
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}
