//! [`DirectoryWatcher`] backed by the platform notification facility
//! (inotify, FSEvents, ...) through the `notify` crate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::{DirectoryWatcher, WatchError, WatchEvent, WatchEventSender, WatchEvents};

pub struct NotifyWatcher {
    watcher: Mutex<RecommendedWatcher>,
    watched: Mutex<HashSet<PathBuf>>,
}

impl std::fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("watched", &*self.watched.lock())
            .finish()
    }
}

impl NotifyWatcher {
    /// Build the watcher and the receiver its events are delivered to.
    ///
    /// Failing here means the platform facility is unavailable, which is
    /// fatal for the service.
    pub fn new() -> Result<(Self, WatchEvents), WatchError> {
        let (sender, events) = WatchEvents::channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            dispatch(&sender, res)
        })
        .map_err(|e| WatchError::Init(Box::new(e)))?;

        Ok((
            Self {
                watcher: Mutex::new(watcher),
                watched: Mutex::new(HashSet::new()),
            },
            events,
        ))
    }

    /// Paths currently being watched
    pub fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }
}

impl DirectoryWatcher for NotifyWatcher {
    fn register(&self, path: &Path) -> Result<(), WatchError> {
        let mut watched = self.watched.lock();
        if watched.contains(path) {
            return Ok(());
        }

        self.watcher
            .lock()
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Register {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;
        watched.insert(path.to_path_buf());
        tracing::info!("watching {}", path.display());
        Ok(())
    }

    fn unregister(&self, path: &Path) {
        if !self.watched.lock().remove(path) {
            return;
        }
        // the backend may already have dropped the watch if the directory was deleted
        if let Err(e) = self.watcher.lock().unwatch(path) {
            tracing::debug!("unwatch {}: {}", path.display(), e);
        }
        tracing::info!("stopped watching {}", path.display());
    }
}

fn dispatch(sender: &WatchEventSender, res: notify::Result<notify::Event>) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("filesystem watcher error: {}", e);
            return;
        }
    };

    for watch_event in translate(&event) {
        tracing::debug!("watch event {:?} {}", watch_event.kind, watch_event.path.display());
        if !sender.send(watch_event) {
            tracing::debug!("watch event consumer is gone, dropping event");
            return;
        }
    }
}

/// Map a backend event onto create/remove notifications.
///
/// Renames count as a removal of the old name and a move-in of the new one,
/// so that following by name keeps working when files are moved into place.
fn translate(event: &notify::Event) -> Vec<WatchEvent> {
    match event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(WatchEvent::created).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(WatchEvent::removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().cloned().map(WatchEvent::removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().cloned().map(WatchEvent::moved_in).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                WatchEvent::removed(from.clone()),
                WatchEvent::moved_in(to.clone()),
            ],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
