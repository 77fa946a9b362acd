//! File-system watching: a typed event surface over the native notifier,
//! plus a debouncing wrapper that coalesces rapid events per path.
//!
//! Events flow through bounded channels and are dropped (with an error
//! recorded) rather than ever blocking the producer — a slow consumer must
//! not stall the native event source.

use crossbeam_channel::Receiver;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

pub mod debounce;
pub mod mock;
pub mod native;

pub use debounce::Debouncer;
pub use mock::MockWatcher;
pub use native::NativeWatcher;

// ---------------------------------------------------------------------------
// Operations bitmask
// ---------------------------------------------------------------------------

/// Bitmask of file operations observed for a path. Debounced events carry
/// the OR of every merged operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Op(u8);

impl Op {
    pub const NONE: Op = Op(0);
    pub const CREATE: Op = Op(1);
    pub const WRITE: Op = Op(1 << 1);
    pub const REMOVE: Op = Op(1 << 2);
    pub const RENAME: Op = Op(1 << 3);
    pub const CHMOD: Op = Op(1 << 4);

    pub fn contains(self, other: Op) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for Op {
    type Output = Op;
    fn bitor(self, rhs: Op) -> Op {
        Op(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Op {
    fn bitor_assign(&mut self, rhs: Op) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Op::CREATE, "CREATE"),
            (Op::WRITE, "WRITE"),
            (Op::REMOVE, "REMOVE"),
            (Op::RENAME, "RENAME"),
            (Op::CHMOD, "CHMOD"),
        ]
        .iter()
        .filter(|(op, _)| self.contains(*op))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

// ---------------------------------------------------------------------------
// Events and errors
// ---------------------------------------------------------------------------

/// One observed change. `timestamp` is monotonic; debouncing keeps the
/// latest merged input's timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub op: Op,
    pub timestamp: Instant,
}

impl WatchEvent {
    pub fn new(path: impl Into<String>, op: Op) -> Self {
        WatchEvent { path: path.into(), op, timestamp: Instant::now() }
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watcher is closed")]
    Closed,
    #[error("already watching: {0}")]
    AlreadyWatching(String),
    #[error("not watching: {0}")]
    NotWatching(String),
    #[error("watch path does not exist: {0}")]
    PathNotExist(String),
    #[error("watch quota exceeded (limit {limit})")]
    QuotaExceeded { limit: usize },
    #[error("event channel full, dropped event for {0}")]
    EventDropped(String),
    #[error("notifier error: {0}")]
    Notify(#[from] notify::Error),
}

// ---------------------------------------------------------------------------
// Statistics and configuration
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of a watcher's counters.
#[derive(Debug, Clone)]
pub struct WatcherStats {
    pub watched_paths: usize,
    pub pending_events: usize,
    pub events_total: u64,
    pub errors_total: u64,
    pub last_error: Option<String>,
    pub started_at: SystemTime,
}

/// Per-path filter applied after the hidden filter and ignore matcher.
pub type EventFilter = Box<dyn Fn(&WatchEvent) -> bool + Send + Sync>;

/// Construction options for the native watcher.
pub struct WatchConfig {
    /// Capacity of the bounded event channel.
    pub channel_capacity: usize,
    /// Upper bound on concurrently watched paths.
    pub max_watches: usize,
    /// Skip events for names starting with `.`.
    pub ignore_hidden: bool,
    /// Optional caller-supplied predicate; events it rejects are dropped.
    pub filter: Option<EventFilter>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            channel_capacity: 1024,
            max_watches: 8192,
            ignore_hidden: true,
            filter: None,
        }
    }
}

pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// A source of typed file-system events.
///
/// `events()` and `errors()` hand out channel receivers; both streams close
/// when the watcher does. Every operation after `close` fails with
/// [`WatchError::Closed`] except `close` itself, which is idempotent.
pub trait Watcher: Send + Sync {
    /// Watch one path non-recursively. Watching an already-watched path
    /// fails with [`WatchError::AlreadyWatching`].
    fn watch(&self, path: &str) -> Result<(), WatchError>;

    /// Walk a directory tree and watch every non-ignored directory. Per-
    /// directory failures are swallowed and counted; exceeding the watch
    /// quota fails.
    fn watch_recursive(&self, path: &str) -> Result<(), WatchError>;

    fn unwatch(&self, path: &str) -> Result<(), WatchError>;

    fn events(&self) -> Receiver<WatchEvent>;

    fn errors(&self) -> Receiver<WatchError>;

    fn close(&self) -> Result<(), WatchError>;

    fn stats(&self) -> WatcherStats;

    fn is_watching(&self, path: &str) -> bool;

    fn watched_paths(&self) -> Vec<String>;
}
