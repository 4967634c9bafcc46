use std::path::PathBuf;

use clap::Args;

use tailvol_daemon::service_config::{Config, ConfigError, ConfigLayer};
use tailvol_daemon::{start_service, ServiceError};

/// Run the plugin daemon in the foreground
#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Listen address: `host:port`, `port` or `:port`
    #[arg(long, env = "PLUGIN_PORT")]
    pub listen: Option<String>,

    /// Base path; volumes are created under `<base>/volumes`
    #[arg(long, env = "VOLUMES_ROOT")]
    pub base: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also write daily rolling log files to this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Program used to follow files
    #[arg(long)]
    pub tail_program: Option<PathBuf>,

    /// Seconds to wait for a follower to exit after it is killed
    #[arg(long)]
    pub stop_timeout_secs: Option<u64>,

    /// Events buffered per stream subscriber before lines are dropped
    #[arg(long)]
    pub subscriber_buffer: Option<usize>,
}

impl Daemon {
    fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            listen: self.listen.clone(),
            base: self.base.clone(),
            log_level: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
            tail_program: self.tail_program.clone(),
            tail_args: None,
            stop_timeout_secs: self.stop_timeout_secs,
            subscriber_buffer: self.subscriber_buffer,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let file = match &ctx.config_path {
            Some(path) => ConfigLayer::load(path)?,
            None => ConfigLayer::default(),
        };
        let config = Config::resolve(file.merge(self.overrides()))?;

        start_service(&config).await?;
        Ok("tailvol daemon stopped".to_string())
    }
}
