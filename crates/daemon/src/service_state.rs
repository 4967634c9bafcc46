use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use common::prelude::*;

use crate::service_config::Config;

/// Shared state handed to every HTTP handler
#[derive(Debug, Clone)]
pub struct State {
    engine: Arc<Engine>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl State {
    pub fn new(engine: Arc<Engine>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Start the engine described by `config`
    pub async fn from_config(config: &Config) -> Result<Self, EngineError> {
        let engine = Engine::start(config.engine_config()).await?;
        Ok(Self::new(Arc::new(engine)))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn registry(&self) -> &VolumeRegistry {
        self.engine.registry()
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        self.engine.broadcaster()
    }

    /// Tell long-lived responses such as event streams to finish
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once [`State::begin_shutdown`] has been called
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}
