//! One follower process for one file path.
//!
//! A [`TailProcess`] owns three tasks: a stdout reader that turns lines into
//! [`LineEvent`]s and publishes them, a stderr reader that logs, and a
//! supervising task that waits for the process to exit or for a stop
//! request. Whichever way the process ends, the exit hook fires exactly once
//! with the terminal state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::follower::{FollowChild, FollowFrom, Follower};
use super::{TailError, TailState};
use crate::broadcast::EventBroadcaster;
use crate::event::{decode_line, LineEvent};

static TAIL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Called once when a tail process reaches a terminal state
pub(crate) type ExitHook = Box<dyn FnOnce(u64, TailState) + Send>;

pub struct TailProcess {
    id: u64,
    path: PathBuf,
    state: Arc<Mutex<TailState>>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for TailProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailProcess")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

impl TailProcess {
    /// Start following `path` from `from`, publishing its lines to
    /// `broadcaster`.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(
        path: &Path,
        from: FollowFrom,
        follower: &dyn Follower,
        broadcaster: EventBroadcaster,
        stop_timeout: Duration,
        on_exit: ExitHook,
    ) -> Result<Self, TailError> {
        let id = TAIL_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(Mutex::new(TailState::Starting));

        let following = match follower.follow(path, from) {
            Ok(following) => following,
            Err(e) => {
                *state.lock() = TailState::Failed;
                return Err(e);
            }
        };
        *state.lock() = TailState::Running;

        let (stop_tx, stop_rx) = watch::channel(false);

        let stdout_task = tokio::spawn(read_stdout(
            following.stdout,
            path.to_path_buf(),
            broadcaster,
            stop_rx.clone(),
        ));
        let stderr_task = tokio::spawn(read_stderr(following.stderr, path.to_path_buf()));

        let task = tokio::spawn(supervise(
            id,
            path.to_path_buf(),
            following.child,
            [stdout_task, stderr_task],
            stop_rx,
            stop_timeout,
            state.clone(),
            on_exit,
        ));

        Ok(Self {
            id,
            path: path.to_path_buf(),
            state,
            stop_tx,
            task,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> TailState {
        *self.state.lock()
    }

    /// Terminate the process and wait until its readers have exited.
    ///
    /// Lines the process had already written but that were not yet published
    /// are discarded.
    pub async fn stop(self) {
        // the supervising task may already be gone if the process exited
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("tail supervisor task for {} failed: {}", self.path.display(), e);
        }
    }
}

async fn read_stdout(
    stdout: Box<dyn AsyncRead + Send + Unpin>,
    path: PathBuf,
    broadcaster: EventBroadcaster,
    stop_rx: watch::Receiver<bool>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if *stop_rx.borrow() {
                    break;
                }
                broadcaster.publish(LineEvent::for_path(&path, decode_line(&buf)));
            }
            Err(e) => {
                tracing::warn!("error reading tail output for {}: {}", path.display(), e);
                break;
            }
        }
    }
}

async fn read_stderr(stderr: Box<dyn AsyncRead + Send + Unpin>, path: PathBuf) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => tracing::warn!("tail process for {}: {}", path.display(), decode_line(&buf)),
            Err(e) => {
                tracing::debug!("error reading tail stderr for {}: {}", path.display(), e);
                break;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    id: u64,
    path: PathBuf,
    mut child: Box<dyn FollowChild>,
    readers: [JoinHandle<()>; 2],
    mut stop_rx: watch::Receiver<bool>,
    stop_timeout: Duration,
    state: Arc<Mutex<TailState>>,
    on_exit: ExitHook,
) {
    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => {
                tracing::info!("tail process for {} exited", path.display());
                TailState::Stopped
            }
            Ok(status) => {
                tracing::warn!("tail process for {} exited with {}", path.display(), status);
                TailState::Failed
            }
            Err(e) => {
                tracing::warn!("error waiting on tail process for {}: {}", path.display(), e);
                TailState::Failed
            }
        },
        // a dropped sender counts as a stop request
        _ = stop_rx.changed() => {
            terminate(&mut *child, &path, stop_timeout).await;
            TailState::Stopped
        }
    };

    for mut reader in readers {
        if tokio::time::timeout(stop_timeout, &mut reader).await.is_err() {
            tracing::warn!("tail reader for {} did not finish, aborting", path.display());
            reader.abort();
        }
    }

    *state.lock() = outcome;
    on_exit(id, outcome);
}

async fn terminate(child: &mut dyn FollowChild, path: &Path, stop_timeout: Duration) {
    tracing::info!("stopping tail process for {}", path.display());
    if let Err(e) = child.start_kill() {
        tracing::debug!("kill tail process for {}: {}", path.display(), e);
    }
    match tokio::time::timeout(stop_timeout, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!("error waiting on tail process for {}: {}", path.display(), e),
        Err(_) => tracing::warn!(
            "tail process for {} did not exit within {:?}",
            path.display(),
            stop_timeout
        ),
    }
}
