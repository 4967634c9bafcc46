use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use common::prelude::EngineError;

use crate::http_server;
use crate::service_config::Config;
use crate::service_state::State;

const LOG_FILE_PREFIX: &str = "tailvol.log";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to start tail engine: {0}")]
    Engine(#[from] EngineError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("http server error: {0}")]
    Server(std::io::Error),
    #[error("service task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handle to a running service
#[derive(Debug)]
pub struct ShutdownHandle {
    state: State,
    local_addr: SocketAddr,
    task: JoinHandle<Result<(), ServiceError>>,
}

impl ShutdownHandle {
    /// Address the server is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Stop accepting requests, end open event streams, stop every tail
    /// process, then wait for the server task.
    pub async fn shutdown(self) -> Result<(), ServiceError> {
        self.state.begin_shutdown();
        self.task.await?
    }
}

/// Start the engine and the HTTP server in the background
pub async fn spawn_service(config: &Config) -> Result<ShutdownHandle, ServiceError> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| ServiceError::Bind {
            addr: config.listen_addr,
            source,
        })?;
    let local_addr = listener.local_addr().map_err(ServiceError::Server)?;

    let state = State::from_config(config).await?;
    let app = http_server::router(state.clone());

    tracing::info!("tailvol listening on {}", local_addr);
    tracing::info!("volumes root: {}", state.registry().root().display());

    let task_state = state.clone();
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(task_state.shutdown_signal())
            .await
            .map_err(ServiceError::Server);
        task_state.engine().shutdown().await;
        tracing::info!("http server stopped");
        result
    });

    Ok(ShutdownHandle {
        state,
        local_addr,
        task,
    })
}

/// Run the service in the foreground until Ctrl-C
pub async fn start_service(config: &Config) -> Result<(), ServiceError> {
    let _guard = init_tracing(config);

    let handle = spawn_service(config).await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received shutdown signal"),
        Err(e) => tracing::error!("failed to listen for shutdown signal: {}", e),
    }

    handle.shutdown().await
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// The returned guard flushes the log file writer and must be held for the
/// life of the process.
pub fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init();
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }

    guard
}
