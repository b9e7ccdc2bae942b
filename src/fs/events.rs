//! Change notifications delivered by file system providers.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeKind {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub kind: FileChangeKind,
    pub path: String,
}

impl FileChangeEvent {
    pub fn new(kind: FileChangeKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

pub trait FileChangeListener: Send + Sync {
    fn file_changed(&self, event: &FileChangeEvent);
}

/// Weakly-held listeners; dropped listeners are pruned on dispatch.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Weak<dyn FileChangeListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Weak<dyn FileChangeListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn remove(&self, listener: &Weak<dyn FileChangeListener>) {
        self.listeners.lock().retain(|l| !Weak::ptr_eq(l, listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().iter().filter(|l| l.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event. Listeners run outside the registry lock.
    pub fn dispatch(&self, event: &FileChangeEvent) {
        let live: Vec<Arc<dyn FileChangeListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener.file_changed(event);
        }
    }
}
