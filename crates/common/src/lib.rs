//! Core engine for tailvol: filesystem-backed volumes whose files are
//! followed line by line, with every line broadcast to live subscribers.
//!
//! The pieces, leaves first:
//!
//! - [`event`]: the [`LineEvent`](event::LineEvent) value and its line codec
//! - [`broadcast`]: the subscriber set and non-blocking fan-out
//! - [`tail`]: follower subprocesses and the supervisor that tracks them
//! - [`watcher`]: filesystem create/remove notifications per volume
//! - [`volume`]: the authoritative registry of volumes and their on-disk layout
//! - [`engine`]: wires the above together and runs the watch event pump

pub mod broadcast;
pub mod engine;
pub mod event;
pub mod tail;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
pub mod volume;
pub mod watcher;

pub mod prelude {
    pub use crate::broadcast::{EventBroadcaster, Subscription};
    pub use crate::engine::{Engine, EngineConfig, EngineError};
    pub use crate::event::LineEvent;
    pub use crate::tail::{FollowFrom, TailCommand, TailError, TailState, TailSupervisor};
    pub use crate::volume::{Volume, VolumeError, VolumeRegistry};
    pub use crate::watcher::{DirectoryWatcher, WatchEvent, WatchEventKind, WatchEvents};
}
