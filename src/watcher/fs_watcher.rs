//! Background thread turning OS notifications into index change events.
//!
//! One `notify` watcher serves every registered index. Directories are
//! watched non-recursively; the set is recomputed whenever an index finishes
//! a tree build. Creations and removals are forwarded at once, modifications
//! after the debounce period.

use crossbeam_channel as channel;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use super::debouncer::Debouncer;
use super::error::WatchError;
use super::path_registry::PathRegistry;
use crate::fs::{FileChangeEvent, FileChangeKind, LocalFileSystem, path_to_string};
use crate::indexing::{Index, IndexChangeListener, paths};

/// Upper bound on how long the thread sleeps with nothing pending.
const IDLE_TICK: Duration = Duration::from_millis(500);

enum WatchCommand {
    SetDirs(Vec<String>),
}

/// How a raw notification affects a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Added,
    Removed,
    Modified,
    /// Rename either side; presence on disk decides.
    Moved,
}

fn classify(kind: &EventKind) -> Option<Change> {
    match kind {
        EventKind::Create(_) => Some(Change::Added),
        EventKind::Remove(_) => Some(Change::Removed),
        EventKind::Modify(ModifyKind::Name(_)) => Some(Change::Moved),
        EventKind::Modify(_) => Some(Change::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// What the file system says about a path right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    File,
    Dir,
    Missing,
}

fn presence(path: &Path) -> Presence {
    if path.is_dir() {
        Presence::Dir
    } else if path.exists() {
        Presence::File
    } else {
        Presence::Missing
    }
}

/// Event translation with debouncing, independent of the OS backend.
struct EventRouter {
    debouncer: Debouncer,
}

impl EventRouter {
    fn new(debounce_ms: u64) -> Self {
        Self {
            debouncer: Debouncer::new(debounce_ms),
        }
    }

    /// Events to forward immediately for one notification.
    fn route(&mut self, event: &Event, probe: &dyn Fn(&Path) -> Presence) -> Vec<FileChangeEvent> {
        let Some(change) = classify(&event.kind) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for native in &event.paths {
            let state = probe(native);
            if state == Presence::Dir {
                continue;
            }
            let path = paths::normalize(&path_to_string(native));
            match change {
                Change::Added => out.push(FileChangeEvent::new(FileChangeKind::Added, path)),
                Change::Removed => {
                    self.debouncer.remove(&path);
                    out.push(FileChangeEvent::new(FileChangeKind::Removed, path));
                }
                Change::Modified => self.debouncer.record(path),
                Change::Moved => {
                    if state == Presence::Missing {
                        self.debouncer.remove(&path);
                        out.push(FileChangeEvent::new(FileChangeKind::Removed, path));
                    } else {
                        out.push(FileChangeEvent::new(FileChangeKind::Added, path));
                    }
                }
            }
        }
        out
    }

    /// Modifications whose quiet period is over. A file gone by then is
    /// reported as removed.
    fn ready(&mut self, probe: &dyn Fn(&Path) -> Presence) -> Vec<FileChangeEvent> {
        self.debouncer
            .take_ready()
            .into_iter()
            .filter_map(|path| match probe(Path::new(&path)) {
                Presence::File => Some(FileChangeEvent::new(FileChangeKind::Modified, path)),
                Presence::Missing => Some(FileChangeEvent::new(FileChangeKind::Removed, path)),
                Presence::Dir => None,
            })
            .collect()
    }

    fn next_wakeup(&self) -> Duration {
        self.debouncer.next_deadline().unwrap_or(IDLE_TICK).min(IDLE_TICK)
    }
}

/// Watches the directories of registered indexes and reports changes to a
/// [`LocalFileSystem`], which dispatches them to its listeners.
pub struct FsWatcher {
    commands: channel::Sender<WatchCommand>,
    stop: channel::Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    indexes: Mutex<Vec<Weak<Index>>>,
}

impl FsWatcher {
    pub fn start(fs: Arc<LocalFileSystem>, debounce_ms: u64) -> Result<Arc<Self>, WatchError> {
        let (event_tx, event_rx) = channel::unbounded::<notify::Result<Event>>();
        let (command_tx, command_rx) = channel::unbounded::<WatchCommand>();
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let watcher = notify::recommended_watcher(move |res| {
            let _ = event_tx.send(res);
        })
        .map_err(|e| WatchError::InitFailed {
            reason: e.to_string(),
        })?;

        let worker = std::thread::Builder::new()
            .name("hdlindex-watcher".to_string())
            .spawn(move || run(watcher, fs, debounce_ms, event_rx, command_rx, stop_rx))
            .map_err(|e| WatchError::InitFailed {
                reason: e.to_string(),
            })?;

        crate::log_event!("watcher", "started", "debounce {debounce_ms}ms");
        Ok(Arc::new(Self {
            commands: command_tx,
            stop: stop_tx,
            worker: Mutex::new(Some(worker)),
            indexes: Mutex::new(Vec::new()),
        }))
    }

    /// Watch `index`'s directories now and after each of its rebuilds.
    pub fn watch_index(self: &Arc<Self>, index: &Arc<Index>) -> Result<(), WatchError> {
        self.indexes.lock().push(Arc::downgrade(index));
        let listener: Arc<dyn IndexChangeListener> = self.clone();
        index.add_change_listener(listener);
        self.refresh()
    }

    /// Recompute the watched directories from the live indexes.
    pub fn refresh(&self) -> Result<(), WatchError> {
        let dirs: Vec<String> = {
            let mut indexes = self.indexes.lock();
            indexes.retain(|w| w.strong_count() > 0);
            indexes
                .iter()
                .filter_map(Weak::upgrade)
                .flat_map(|index| index.watched_dirs())
                .collect()
        };
        self.commands
            .send(WatchCommand::SetDirs(dirs))
            .map_err(|_| WatchError::ChannelClosed)
    }

    /// Stop the background thread. Pending modifications are delivered first.
    pub fn stop(&self) {
        let _ = self.stop.try_send(());
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("[watcher] thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl IndexChangeListener for FsWatcher {
    fn index_rebuilt(&self, base_location: &str) {
        if let Err(e) = self.refresh() {
            tracing::warn!("[watcher] cannot refresh after rebuild of {base_location}: {e}");
        }
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    mut watcher: notify::RecommendedWatcher,
    fs: Arc<LocalFileSystem>,
    debounce_ms: u64,
    event_rx: channel::Receiver<notify::Result<Event>>,
    command_rx: channel::Receiver<WatchCommand>,
    stop_rx: channel::Receiver<()>,
) {
    let mut router = EventRouter::new(debounce_ms);
    let mut registry = PathRegistry::new();
    let probe: &dyn Fn(&Path) -> Presence = &presence;

    loop {
        let wakeup = router.next_wakeup();
        channel::select! {
            recv(stop_rx) -> _ => break,
            recv(command_rx) -> msg => {
                let Ok(WatchCommand::SetDirs(dirs)) = msg else { break };
                apply_dirs(&mut watcher, &fs, &mut registry, dirs);
            }
            recv(event_rx) -> msg => {
                let Ok(res) = msg else { break };
                match res {
                    Ok(event) => {
                        for change in router.route(&event, probe) {
                            crate::debug_event!("watcher", "change", "{:?} {}", change.kind, change.path);
                            fs.notify(&change);
                        }
                    }
                    Err(e) => tracing::warn!("[watcher] {}", WatchError::from(e)),
                }
            }
            default(wakeup) => {}
        }
        for change in router.ready(probe) {
            crate::debug_event!("watcher", "change", "{:?} {}", change.kind, change.path);
            fs.notify(&change);
        }
    }

    for path in router.debouncer.flush() {
        if presence(Path::new(&path)) == Presence::File {
            fs.notify(&FileChangeEvent::new(FileChangeKind::Modified, path));
        }
    }
    crate::log_event!("watcher", "stopped");
}

fn apply_dirs(
    watcher: &mut notify::RecommendedWatcher,
    fs: &LocalFileSystem,
    registry: &mut PathRegistry,
    dirs: Vec<String>,
) {
    let diff = registry.set_desired(dirs);
    for dir in &diff.removed {
        if let Err(e) = watcher.unwatch(&fs.native_path(dir)) {
            tracing::debug!("[watcher] unwatch {dir}: {e}");
        }
    }
    for dir in &diff.added {
        let native = fs.native_path(dir);
        match watcher.watch(&native, RecursiveMode::NonRecursive) {
            Ok(()) => crate::debug_event!("watcher", "watching", "{dir}"),
            Err(e) => {
                // Keep going; the directory may appear later and be picked
                // up by the next refresh.
                tracing::warn!("[watcher] {}", WatchError::from(e));
                registry.forget(dir);
            }
        }
    }
    if !diff.is_empty() {
        crate::log_event!("watcher", "monitoring", "{} directories", registry.len());
    }
}
