//! Project change events and the observer registry.
//!
//! Handlers register by value and are invoked on a snapshot taken under the
//! read lock and released before the first call, so a handler can register
//! or remove observers without deadlocking. A panicking handler is contained
//! and logged; it never unwinds into the emitter.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::warn;
use uuid::Uuid;

/// What changed, from the facade's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectEventKind {
    FileCreated,
    FileModified,
    FileDeleted,
    FileRenamed,
    WorkspaceConfigChanged,
    WorkspaceFolderChanged,
}

#[derive(Debug, Clone)]
pub struct ProjectChangeEvent {
    pub kind: ProjectEventKind,
    pub path: String,
    /// Previous path for renames.
    pub old_path: Option<String>,
    pub timestamp: SystemTime,
}

impl ProjectChangeEvent {
    pub fn new(kind: ProjectEventKind, path: impl Into<String>) -> Self {
        ProjectChangeEvent {
            kind,
            path: path.into(),
            old_path: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn renamed(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        ProjectChangeEvent {
            kind: ProjectEventKind::FileRenamed,
            path: new_path.into(),
            old_path: Some(old_path.into()),
            timestamp: SystemTime::now(),
        }
    }
}

/// Handle returned by observer registration; pass back to unregister.
pub type ObserverId = Uuid;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered set of observers for one event type.
pub struct ObserverRegistry<E> {
    handlers: RwLock<Vec<(ObserverId, Handler<E>)>>,
}

impl<E> ObserverRegistry<E> {
    pub fn new() -> Self {
        ObserverRegistry { handlers: RwLock::new(Vec::new()) }
    }

    pub fn register(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> ObserverId {
        let id = Uuid::new_v4();
        self.handlers.write().unwrap().push((id, Arc::new(handler)));
        id
    }

    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every handler in registration order, outside the lock.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = {
            let handlers = self.handlers.read().unwrap();
            handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!("observer panicked; continuing");
            }
        }
    }
}

impl<E> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emits_in_registration_order() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.register(move |_| order.write().unwrap().push(tag));
        }
        registry.emit(&1);
        assert_eq!(*order.read().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unregister_removes_handler() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let id = registry.register(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        registry.emit(&1);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        registry.emit(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_observer_is_contained() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        registry.register(|_| panic!("boom"));
        let c = Arc::clone(&count);
        registry.register(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        registry.emit(&1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_mutate_registry_during_emit() {
        let registry: Arc<ObserverRegistry<u32>> = Arc::new(ObserverRegistry::new());
        let r = Arc::clone(&registry);
        registry.register(move |_| {
            r.register(|_| {});
        });
        registry.emit(&1);
        assert_eq!(registry.len(), 2);
    }
}
