//! Test doubles for the watcher and follower capabilities.
//!
//! [`ManualWatcher`] records registrations and lets a test inject watch
//! events. [`ScriptedFollower`] hands out in-memory pipes instead of
//! spawning processes; the test writes lines, stderr output or an exit code
//! through the matching [`ScriptedTail`].

use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::watch;

use crate::tail::{FollowChild, FollowFrom, Follower, Following, TailError};
use crate::watcher::{DirectoryWatcher, WatchError, WatchEvent, WatchEventSender, WatchEvents};

const PIPE_CAPACITY: usize = 64 * 1024;
const SIGKILL: i32 = 9;

/// A watcher driven by the test
pub struct ManualWatcher {
    sender: WatchEventSender,
    registered: Mutex<HashSet<PathBuf>>,
    registrations: AtomicUsize,
    failing: AtomicBool,
}

impl ManualWatcher {
    pub fn new() -> (Self, WatchEvents) {
        let (sender, events) = WatchEvents::channel();
        (
            Self {
                sender,
                registered: Mutex::new(HashSet::new()),
                registrations: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            },
            events,
        )
    }

    /// Deliver an event to the consumer
    pub fn emit(&self, event: WatchEvent) {
        self.sender.send(event);
    }

    pub fn is_registered(&self, path: &Path) -> bool {
        self.registered.lock().contains(path)
    }

    /// Currently registered paths, sorted
    pub fn registered(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.registered.lock().iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of registrations that created a new watch
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// Make subsequent registrations fail
    pub fn fail_registrations(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

impl DirectoryWatcher for ManualWatcher {
    fn register(&self, path: &Path) -> Result<(), WatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WatchError::Register {
                path: path.to_path_buf(),
                source: "registration disabled".into(),
            });
        }
        if self.registered.lock().insert(path.to_path_buf()) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn unregister(&self, path: &Path) {
        self.registered.lock().remove(path);
    }
}

/// A follower whose output is written by the test
#[derive(Default)]
pub struct ScriptedFollower {
    tails: Mutex<HashMap<PathBuf, Vec<ScriptedTail>>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl ScriptedFollower {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next follow of `path` fail to start
    pub fn fail_next(&self, path: &Path) {
        self.failing.lock().insert(path.to_path_buf());
    }

    /// The most recently started tail for `path`
    pub fn latest(&self, path: &Path) -> Option<ScriptedTail> {
        self.tails
            .lock()
            .get(path)
            .and_then(|tails| tails.last().cloned())
    }

    /// How many tails have been started for `path`
    pub fn started(&self, path: &Path) -> usize {
        self.tails.lock().get(path).map(Vec::len).unwrap_or(0)
    }
}

impl Follower for ScriptedFollower {
    fn follow(&self, path: &Path, from: FollowFrom) -> Result<Following, TailError> {
        if self.failing.lock().remove(path) {
            return Err(TailError::Spawn {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted failure"),
            });
        }

        let (stdout_writer, stdout_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_writer, stderr_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (exit_tx, exit_rx) = watch::channel(None);

        let tail = ScriptedTail {
            from,
            stdout: Arc::new(tokio::sync::Mutex::new(Some(stdout_writer))),
            stderr: Arc::new(tokio::sync::Mutex::new(Some(stderr_writer))),
            exit: Arc::new(exit_tx),
            killed: Arc::new(AtomicBool::new(false)),
        };
        let child = ScriptedChild {
            tail: tail.clone(),
            exit_rx,
            status: None,
        };

        self.tails
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .push(tail);

        Ok(Following {
            stdout: Box::new(stdout_reader),
            stderr: Box::new(stderr_reader),
            child: Box::new(child),
        })
    }
}

type Pipe = Arc<tokio::sync::Mutex<Option<DuplexStream>>>;

/// Test-side handle to one scripted follower
#[derive(Clone)]
pub struct ScriptedTail {
    from: FollowFrom,
    stdout: Pipe,
    stderr: Pipe,
    exit: Arc<watch::Sender<Option<ExitStatus>>>,
    killed: Arc<AtomicBool>,
}

impl ScriptedTail {
    /// Where the follower was asked to start reading
    pub fn started_from(&self) -> FollowFrom {
        self.from
    }

    /// Write one line to the follower's stdout
    pub async fn write_line(&self, line: &str) -> io::Result<()> {
        write_pipe(&self.stdout, line).await
    }

    /// Write one line to the follower's stderr
    pub async fn write_stderr(&self, line: &str) -> io::Result<()> {
        write_pipe(&self.stderr, line).await
    }

    /// Make the follower exit on its own with `code`
    pub fn exit(&self, code: i32) {
        self.exit.send_replace(Some(ExitStatus::from_raw(code << 8)));
    }

    /// Whether the follower was asked to terminate
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.stdout.lock().await.take();
        self.stderr.lock().await.take();
    }
}

async fn write_pipe(pipe: &Pipe, line: &str) -> io::Result<()> {
    let mut pipe = pipe.lock().await;
    let writer = pipe
        .as_mut()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "follower has exited"))?;
    writer.write_all(format!("{}\n", line).as_bytes()).await?;
    writer.flush().await
}

struct ScriptedChild {
    tail: ScriptedTail,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
    status: Option<ExitStatus>,
}

#[async_trait::async_trait]
impl FollowChild for ScriptedChild {
    async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        let status = loop {
            if let Some(status) = *self.exit_rx.borrow_and_update() {
                break status;
            }
            // the sender lives in our own tail handle, so this cannot close
            if self.exit_rx.changed().await.is_err() {
                return Err(io::Error::new(io::ErrorKind::Other, "exit channel closed"));
            }
        };

        // an exited process closes its pipes
        self.tail.close().await;
        self.status = Some(status);
        Ok(status)
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.tail.killed.store(true, Ordering::SeqCst);
        self.tail.exit.send_if_modified(|status| {
            if status.is_none() {
                *status = Some(ExitStatus::from_raw(SIGKILL));
                true
            } else {
                false
            }
        });
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        None
    }
}
