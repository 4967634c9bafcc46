//! Keeps the set of running tail processes in line with the files that
//! exist inside watched volumes.
//!
//! Processes are keyed by absolute file path and there is at most one active
//! process per path. An entry leaves the map when the file is removed, when
//! its volume is removed, or when the process exits on its own, so a later
//! creation of the same path always starts a fresh process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::follower::{FollowFrom, Follower};
use super::process::{ExitHook, TailProcess};
use super::TailState;
use crate::broadcast::EventBroadcaster;
use crate::watcher::{WatchEvent, WatchEventKind, WatchEvents};

/// How long a stopping process and its readers get before being abandoned
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

type Tracked = Mutex<HashMap<PathBuf, TailProcess>>;

struct Inner {
    follower: Arc<dyn Follower>,
    broadcaster: EventBroadcaster,
    stop_timeout: Duration,
    tracked: Arc<Tracked>,
}

#[derive(Clone)]
pub struct TailSupervisor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TailSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailSupervisor")
            .field("tracked", &self.tracked())
            .field("stop_timeout", &self.inner.stop_timeout)
            .finish()
    }
}

impl TailSupervisor {
    pub fn new(
        follower: Arc<dyn Follower>,
        broadcaster: EventBroadcaster,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                follower,
                broadcaster,
                stop_timeout,
                tracked: Arc::new(Mutex::new(HashMap::new())),
            }),
        }
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.inner.broadcaster
    }

    /// Consume watch events until the watcher goes away
    pub async fn run(self, events: WatchEvents) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::info!("watch event stream closed, tail supervisor exiting");
    }

    pub async fn handle(&self, event: WatchEvent) {
        match event.kind {
            WatchEventKind::Created => {
                self.on_created(&event.path);
            }
            WatchEventKind::MovedIn => {
                self.on_moved_in(&event.path);
            }
            WatchEventKind::Removed => {
                self.on_removed(&event.path).await;
            }
        }
    }

    /// Start following a newly created file from its first line, unless it
    /// is already followed or is not a regular file. Returns true if a
    /// process was started.
    pub fn on_created(&self, path: &Path) -> bool {
        self.start(path, FollowFrom::Start)
    }

    /// Start following a file renamed into a volume from its current end, so
    /// content it carried under its old name is not published again.
    pub fn on_moved_in(&self, path: &Path) -> bool {
        self.start(path, FollowFrom::End)
    }

    /// The existence check, the spawn and the insert happen under the
    /// tracking lock, so a concurrent [`stop_all`](Self::stop_all) for a
    /// directory that was just deleted either sees the new entry or the
    /// check sees the file gone. The check is a single `stat` and the spawn
    /// does not wait on the child.
    fn start(&self, path: &Path, from: FollowFrom) -> bool {
        let mut tracked = self.inner.tracked.lock();

        if let Some(existing) = tracked.get(path) {
            if existing.state().is_active() {
                tracing::debug!("{} is already being tailed", path.display());
                return false;
            }
        }

        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                tracing::debug!("ignoring {}: not a regular file", path.display());
                return false;
            }
            Err(e) => {
                tracing::debug!("ignoring {}: {}", path.display(), e);
                return false;
            }
        }

        let process = TailProcess::spawn(
            path,
            from,
            self.inner.follower.as_ref(),
            self.inner.broadcaster.clone(),
            self.inner.stop_timeout,
            self.exit_hook(path),
        );

        match process {
            Ok(process) => {
                tracing::info!("tailing {} from {:?}", path.display(), from);
                tracked.insert(path.to_path_buf(), process);
                true
            }
            Err(e) => {
                tracing::warn!("error starting tail process: {}", e);
                false
            }
        }
    }

    /// Stop following `path`. Returns true if it was being followed.
    pub async fn on_removed(&self, path: &Path) -> bool {
        let process = self.inner.tracked.lock().remove(path);
        match process {
            Some(process) => {
                process.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every process whose path lies under `prefix`, waiting for all of
    /// them. Returns how many were stopped.
    pub async fn stop_all(&self, prefix: &Path) -> usize {
        let stopping: Vec<TailProcess> = {
            let mut tracked = self.inner.tracked.lock();
            let paths: Vec<PathBuf> = tracked
                .keys()
                .filter(|path| path.starts_with(prefix))
                .cloned()
                .collect();
            paths.iter().filter_map(|path| tracked.remove(path)).collect()
        };

        let count = stopping.len();
        if count > 0 {
            tracing::info!("stopping {} tail process(es) under {}", count, prefix.display());
        }
        futures::future::join_all(stopping.into_iter().map(TailProcess::stop)).await;
        count
    }

    /// Stop everything
    pub async fn shutdown(&self) {
        let stopping: Vec<TailProcess> = {
            let mut tracked = self.inner.tracked.lock();
            tracked.drain().map(|(_, process)| process).collect()
        };
        futures::future::join_all(stopping.into_iter().map(TailProcess::stop)).await;
    }

    /// Tracked paths, sorted
    pub fn tracked(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.inner.tracked.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.inner.tracked.lock().contains_key(path)
    }

    pub fn state(&self, path: &Path) -> Option<TailState> {
        self.inner.tracked.lock().get(path).map(TailProcess::state)
    }

    /// Untrack the process when it ends, unless the entry has since been
    /// replaced by a newer process for the same path.
    fn exit_hook(&self, path: &Path) -> ExitHook {
        let tracked = Arc::downgrade(&self.inner.tracked);
        let path = path.to_path_buf();

        Box::new(move |id, state| {
            let Some(tracked) = tracked.upgrade() else {
                return;
            };
            let mut tracked = tracked.lock();
            if tracked.get(&path).map(TailProcess::id) == Some(id) {
                tracked.remove(&path);
                tracing::info!("tail process for {} ended ({})", path.display(), state);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::testkit::ScriptedFollower;

    fn setup() -> (TailSupervisor, Arc<ScriptedFollower>, TempDir) {
        let follower = Arc::new(ScriptedFollower::new());
        let supervisor = TailSupervisor::new(
            follower.clone(),
            EventBroadcaster::default(),
            Duration::from_secs(2),
        );
        (supervisor, follower, tempfile::tempdir().unwrap())
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    async fn wait_untracked(supervisor: &TailSupervisor, path: &Path) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while supervisor.is_tracked(path) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("entry was never untracked");
    }

    #[tokio::test]
    async fn test_created_starts_tail_and_publishes() {
        let (supervisor, follower, temp) = setup();
        let mut sub = supervisor.broadcaster().subscribe();
        let path = touch(temp.path(), "app.log");

        supervisor.handle(WatchEvent::created(&path)).await;
        assert!(supervisor.is_tracked(&path));
        assert_eq!(supervisor.state(&path), Some(TailState::Running));

        follower.latest(&path).unwrap().write_line("hello").await.unwrap();
        let event = sub.recv().await.unwrap();
        assert_eq!(event.file, "app.log");
        assert_eq!(event.line, "hello");

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_position_follows_event_kind() {
        let (supervisor, follower, temp) = setup();
        let created = touch(temp.path(), "app.log");
        let rotated = touch(temp.path(), "app.log.1");

        supervisor.handle(WatchEvent::created(&created)).await;
        supervisor.handle(WatchEvent::moved_in(&rotated)).await;

        assert_eq!(
            follower.latest(&created).unwrap().started_from(),
            FollowFrom::Start
        );
        assert_eq!(
            follower.latest(&rotated).unwrap().started_from(),
            FollowFrom::End
        );

        // a move-in of an already followed path keeps the running process
        assert!(!supervisor.on_moved_in(&created));
        assert_eq!(follower.started(&created), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_created_keeps_one_process() {
        let (supervisor, follower, temp) = setup();
        let path = touch(temp.path(), "app.log");

        assert!(supervisor.on_created(&path));
        assert!(!supervisor.on_created(&path));
        assert_eq!(follower.started(&path), 1);
        assert_eq!(supervisor.tracked(), vec![path.clone()]);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_removed_stops_and_untracks() {
        let (supervisor, follower, temp) = setup();
        let path = touch(temp.path(), "app.log");
        supervisor.on_created(&path);

        supervisor.handle(WatchEvent::removed(&path)).await;
        assert!(!supervisor.is_tracked(&path));
        assert!(follower.latest(&path).unwrap().is_killed());

        // unknown paths are ignored
        assert!(!supervisor.on_removed(&path).await);
    }

    #[tokio::test]
    async fn test_exit_untracks_and_allows_restart() {
        let (supervisor, follower, temp) = setup();
        let path = touch(temp.path(), "app.log");
        supervisor.on_created(&path);

        follower.latest(&path).unwrap().exit(0);
        wait_untracked(&supervisor, &path).await;

        assert!(supervisor.on_created(&path));
        assert_eq!(follower.started(&path), 2);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_old_exit_does_not_untrack_replacement() {
        let (supervisor, follower, temp) = setup();
        let mut sub = supervisor.broadcaster().subscribe();
        let path = touch(temp.path(), "app.log");

        supervisor.on_created(&path);
        supervisor.on_removed(&path).await;
        supervisor.on_created(&path);
        assert_eq!(follower.started(&path), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(supervisor.is_tracked(&path));

        follower.latest(&path).unwrap().write_line("again").await.unwrap();
        assert_eq!(sub.recv().await.unwrap().line, "again");

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_path_untracked() {
        let (supervisor, follower, temp) = setup();
        let path = touch(temp.path(), "app.log");

        follower.fail_next(&path);
        assert!(!supervisor.on_created(&path));
        assert!(!supervisor.is_tracked(&path));

        // the next creation event retries
        assert!(supervisor.on_created(&path));
        assert!(supervisor.is_tracked(&path));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_directories_and_missing_files_are_ignored() {
        let (supervisor, follower, temp) = setup();
        let dir = temp.path().join("nested");
        std::fs::create_dir(&dir).unwrap();

        assert!(!supervisor.on_created(&dir));
        assert!(!supervisor.on_created(&temp.path().join("gone.log")));
        assert_eq!(follower.started(&dir), 0);
        assert!(supervisor.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_only_stops_under_prefix() {
        let (supervisor, follower, temp) = setup();
        let a = temp.path().join("a").join("_data");
        let b = temp.path().join("b").join("_data");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();

        let a1 = touch(&a, "one.log");
        let a2 = touch(&a, "two.log");
        let b1 = touch(&b, "one.log");
        for path in [&a1, &a2, &b1] {
            assert!(supervisor.on_created(path));
        }

        // a lexical prefix that is not a path component boundary matches nothing
        assert_eq!(supervisor.stop_all(&temp.path().join("a").join("_da")).await, 0);

        assert_eq!(supervisor.stop_all(&a).await, 2);
        assert_eq!(supervisor.tracked(), vec![b1.clone()]);
        assert!(follower.latest(&a1).unwrap().is_killed());
        assert!(follower.latest(&a2).unwrap().is_killed());
        assert!(!follower.latest(&b1).unwrap().is_killed());

        supervisor.shutdown().await;
        assert!(supervisor.tracked().is_empty());
    }

    #[tokio::test]
    async fn test_run_consumes_watch_events() {
        let (supervisor, _follower, temp) = setup();
        let (watcher, events) = crate::testkit::ManualWatcher::new();
        let path = touch(temp.path(), "app.log");

        let pump = tokio::spawn(supervisor.clone().run(events));
        watcher.emit(WatchEvent::created(&path));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !supervisor.is_tracked(&path) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        watcher.emit(WatchEvent::removed(&path));
        wait_untracked(&supervisor, &path).await;

        // dropping the watcher ends the pump
        drop(watcher);
        tokio::time::timeout(Duration::from_secs(5), pump)
            .await
            .unwrap()
            .unwrap();
    }
}
