use clap::Args;

use crate::cli::op::{Op, OpContext};
use tailvol_daemon::http_server::api::client::ApiError;
use tailvol_daemon::http_server::api::driver::RemoveRequest;

#[derive(Args, Debug, Clone)]
pub struct Remove {
    /// Volume name
    pub name: String,
}

#[async_trait::async_trait]
impl Op for Remove {
    type Error = RemoveError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        client
            .call_driver(RemoveRequest {
                name: self.name.clone(),
            })
            .await?;

        Ok(format!("Removed volume {}", self.name))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoveError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

impl std::fmt::Display for Remove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume remove {}", self.name)
    }
}
