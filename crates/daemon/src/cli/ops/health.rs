use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use tailvol_daemon::http_server::api::client::ApiError;
use tailvol_daemon::http_server::health::liveness::LivezRequest;
use tailvol_daemon::http_server::health::version::VersionRequest;
use tailvol_daemon::{build_info, BuildInfo};

/// Check whether the daemon is up
#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug)]
pub enum EndpointStatus {
    Ok,
    Unhealthy(String),
    NotReachable,
}

#[derive(Debug)]
pub struct HealthOutput {
    pub url: String,
    pub livez: EndpointStatus,
    pub daemon_version: Option<BuildInfo>,
    pub client_version: BuildInfo,
}

impl fmt::Display for HealthOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}):", "Daemon".bold(), self.url)?;

        let livez = match &self.livez {
            EndpointStatus::Ok => "OK".green().to_string(),
            EndpointStatus::Unhealthy(code) => format!("{} ({})", "UNHEALTHY".red(), code),
            EndpointStatus::NotReachable => "NOT REACHABLE".red().to_string(),
        };
        writeln!(f, "  {} {}", "livez:".dimmed(), livez)?;

        match &self.daemon_version {
            Some(info) if info.version == self.client_version.version => {
                writeln!(f, "  {} {}", "version:".dimmed(), info.version)?
            }
            Some(info) => writeln!(
                f,
                "  {} {} {}",
                "version:".dimmed(),
                info.version,
                format!("(client is {})", self.client_version.version).yellow()
            )?,
            None => writeln!(f, "  {} {}", "version:".dimmed(), "unknown".dimmed())?,
        }

        write!(f, "  {} {}", "client:".dimmed(), self.client_version)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = HealthOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();

        let livez = match client.call(LivezRequest {}).await {
            Ok(response) if response.status == "ok" => EndpointStatus::Ok,
            Ok(response) => EndpointStatus::Unhealthy(response.status),
            Err(ApiError::HttpStatus(status, _)) => EndpointStatus::Unhealthy(status.to_string()),
            Err(_) => EndpointStatus::NotReachable,
        };

        let daemon_version = match livez {
            EndpointStatus::NotReachable => None,
            _ => client.call(VersionRequest {}).await.ok(),
        };

        Ok(HealthOutput {
            url: client.base_url().to_string(),
            livez,
            daemon_version,
            client_version: build_info(),
        })
    }
}
