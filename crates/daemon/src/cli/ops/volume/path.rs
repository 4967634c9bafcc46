use clap::Args;

use crate::cli::op::{Op, OpContext};
use tailvol_daemon::http_server::api::client::ApiError;
use tailvol_daemon::http_server::api::driver::PathRequest;

#[derive(Args, Debug, Clone)]
pub struct Path {
    /// Volume name
    pub name: String,
}

#[async_trait::async_trait]
impl Op for Path {
    type Error = PathError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response = client
            .call_driver(PathRequest {
                name: self.name.clone(),
            })
            .await?;

        Ok(response.mountpoint)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume path {}", self.name)
    }
}
