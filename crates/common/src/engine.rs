//! Composition root for the tail engine.
//!
//! Builds the broadcaster, the supervisor and the registry around a watcher
//! and a follower, and runs the pump that feeds watch events to the
//! supervisor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::broadcast::{EventBroadcaster, DEFAULT_SUBSCRIBER_BUFFER};
use crate::tail::{Follower, TailCommand, TailSupervisor, DEFAULT_STOP_TIMEOUT};
use crate::volume::{VolumeError, VolumeRegistry};
use crate::watcher::{DirectoryWatcher, NotifyWatcher, WatchError, WatchEvents};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base path; volumes live under `<base>/volumes`
    pub base: PathBuf,
    pub tail_command: TailCommand,
    pub stop_timeout: Duration,
    pub subscriber_buffer: usize,
}

impl EngineConfig {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            tail_command: TailCommand::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("watcher error: {0}")]
    Watcher(#[from] WatchError),
    #[error("volume registry error: {0}")]
    Volume(#[from] VolumeError),
}

pub struct Engine {
    registry: VolumeRegistry,
    supervisor: TailSupervisor,
    broadcaster: EventBroadcaster,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("supervisor", &self.supervisor)
            .field("broadcaster", &self.broadcaster)
            .finish()
    }
}

impl Engine {
    /// Start the engine with the platform watcher and `tail -F` followers
    pub async fn start(config: EngineConfig) -> Result<Self, EngineError> {
        tracing::info!("tail engine using base={}", config.base.display());
        let (watcher, events) = NotifyWatcher::new()?;
        let follower = Arc::new(config.tail_command.clone());
        Self::with_parts(config, Arc::new(watcher), events, follower).await
    }

    /// Start the engine around an explicit watcher and follower
    pub async fn with_parts(
        config: EngineConfig,
        watcher: Arc<dyn DirectoryWatcher>,
        events: WatchEvents,
        follower: Arc<dyn Follower>,
    ) -> Result<Self, EngineError> {
        let broadcaster = EventBroadcaster::new(config.subscriber_buffer);
        let supervisor = TailSupervisor::new(follower, broadcaster.clone(), config.stop_timeout);
        let registry = VolumeRegistry::open(&config.base, watcher, supervisor.clone()).await?;

        let pump = tokio::spawn(supervisor.clone().run(events));

        Ok(Self {
            registry,
            supervisor,
            broadcaster,
            pump: Mutex::new(Some(pump)),
        })
    }

    pub fn registry(&self) -> &VolumeRegistry {
        &self.registry
    }

    pub fn supervisor(&self) -> &TailSupervisor {
        &self.supervisor
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Stop consuming watch events and stop every tail process
    pub async fn shutdown(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.supervisor.shutdown().await;
        tracing::info!("tail engine stopped");
    }
}
