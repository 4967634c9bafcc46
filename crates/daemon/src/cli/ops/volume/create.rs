use clap::Args;

use crate::cli::op::{Op, OpContext};
use tailvol_daemon::http_server::api::client::ApiError;
use tailvol_daemon::http_server::api::driver::{CreateRequest, PathRequest};

#[derive(Args, Debug, Clone)]
pub struct Create {
    /// Volume name
    pub name: String,
}

#[async_trait::async_trait]
impl Op for Create {
    type Error = CreateError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        client
            .call_driver(CreateRequest {
                name: self.name.clone(),
                opts: None,
            })
            .await?;

        let path = client
            .call_driver(PathRequest {
                name: self.name.clone(),
            })
            .await?;

        Ok(format!("Created volume {} at {}", self.name, path.mountpoint))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

impl std::fmt::Display for Create {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume create {}", self.name)
    }
}
