//! Following files and supervising the followers.
//!
//! - [`Follower`]: capability that starts a follower for one path
//! - [`TailProcess`]: one running follower, its readers and its stop handle
//! - [`TailSupervisor`]: tracks at most one active process per file path and
//!   reacts to watch events

use std::path::PathBuf;

mod follower;
mod process;
mod supervisor;

pub use follower::{
    default_tail_args, FollowChild, FollowFrom, Follower, Following, TailCommand,
    DEFAULT_TAIL_PROGRAM,
};
pub use process::TailProcess;
pub use supervisor::{TailSupervisor, DEFAULT_STOP_TIMEOUT};

/// Lifecycle of a tail process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Starting,
    Running,
    Stopped,
    Failed,
}

impl TailState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TailState::Starting => "starting",
            TailState::Running => "running",
            TailState::Stopped => "stopped",
            TailState::Failed => "failed",
        }
    }

    /// Starting or Running
    pub fn is_active(&self) -> bool {
        matches!(self, TailState::Starting | TailState::Running)
    }
}

impl std::fmt::Display for TailState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("failed to start follower for {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("follower has no {0} pipe")]
    MissingPipe(&'static str),
}
