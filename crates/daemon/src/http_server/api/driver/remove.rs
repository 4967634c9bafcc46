use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{DriverError, DriverJson, DriverReply};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoveRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoveResponse {
    #[serde(default)]
    pub err: String,
}

impl DriverReply for RemoveResponse {
    fn err(&self) -> &str {
        &self.err
    }
}

/// Delete the volume's directory tree and stop every tail inside it
#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    DriverJson(req): DriverJson<RemoveRequest>,
) -> Result<Response, DriverError> {
    state.registry().remove(&req.name).await?;
    tracing::info!("volume {} removed", req.name);
    Ok((StatusCode::OK, Json(RemoveResponse::default())).into_response())
}

impl ApiRequest for RemoveRequest {
    type Response = RemoveResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/VolumeDriver.Remove")?;
        Ok(client.post(full_url).json(&self))
    }
}
