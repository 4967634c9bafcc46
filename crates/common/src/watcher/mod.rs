//! Filesystem create/remove notifications for volume directories
//!
//! A [`DirectoryWatcher`] watches individual directories (one per volume)
//! and reports entries created or removed directly inside them. Events go to
//! a single consumer through the [`WatchEvents`] receiver handed out when the
//! watcher is built, in the order the backend produced them.

use std::path::{Path, PathBuf};

mod native;

pub use native::NotifyWatcher;

/// What happened to a path inside a watched directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Created,
    /// Renamed or moved into the directory from another name
    MovedIn,
    Removed,
}

/// A create/remove notification for one absolute path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Created,
            path: path.into(),
        }
    }

    pub fn moved_in(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::MovedIn,
            path: path.into(),
        }
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Removed,
            path: path.into(),
        }
    }
}

/// Capability for watching directories
pub trait DirectoryWatcher: Send + Sync + 'static {
    /// Start watching `path`. Registering a watched path again is a no-op.
    fn register(&self, path: &Path) -> Result<(), WatchError>;

    /// Stop watching `path`. Safe to call for paths that were never
    /// registered or are already unregistered.
    fn unregister(&self, path: &Path);
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to initialize filesystem watcher: {0}")]
    Init(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to watch {path}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Sending half used by watcher backends
#[derive(Debug, Clone)]
pub(crate) struct WatchEventSender {
    tx: flume::Sender<WatchEvent>,
}

impl WatchEventSender {
    /// Returns false once the consumer is gone
    pub(crate) fn send(&self, event: WatchEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Receiving half of a watcher's event stream
///
/// Unbounded and FIFO. Ends once the watcher that feeds it is dropped.
#[derive(Debug)]
pub struct WatchEvents {
    rx: flume::Receiver<WatchEvent>,
}

impl WatchEvents {
    pub(crate) fn channel() -> (WatchEventSender, Self) {
        let (tx, rx) = flume::unbounded();
        (WatchEventSender { tx }, Self { rx })
    }

    /// Wait for the next event. Returns None when the watcher is gone.
    pub async fn recv(&self) -> Option<WatchEvent> {
        self.rx.recv_async().await.ok()
    }

    /// Take the next event without waiting
    pub fn try_recv(&self) -> Option<WatchEvent> {
        self.rx.try_recv().ok()
    }

    /// Number of events waiting to be consumed
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
