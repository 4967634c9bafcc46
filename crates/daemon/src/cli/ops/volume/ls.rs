use clap::Args;

use crate::cli::op::{Op, OpContext};
use tailvol_daemon::http_server::api::client::ApiError;
use tailvol_daemon::http_server::api::driver::{ListRequest, ListResponse};

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[async_trait::async_trait]
impl Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response: ListResponse = client.call_driver(ListRequest {}).await?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&response.volumes)?);
        }

        if response.volumes.is_empty() {
            return Ok("No volumes".to_string());
        }

        let width = response
            .volumes
            .iter()
            .map(|v| v.name.len())
            .max()
            .unwrap_or(0)
            .max("NAME".len());

        let mut output = format!("{:<width$}  {}\n", "NAME", "MOUNTPOINT", width = width);
        for volume in response.volumes {
            output.push_str(&format!(
                "{:<width$}  {}\n",
                volume.name,
                volume.mountpoint,
                width = width
            ));
        }

        Ok(output)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl std::fmt::Display for Ls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume ls")
    }
}
