use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::VolumeError;

use super::{DriverError, DriverJson, DriverReply};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    pub name: String,
    /// Caller id sent by the container runtime
    #[serde(default, rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountResponse {
    #[serde(default)]
    pub mountpoint: String,
    #[serde(default)]
    pub err: String,
}

impl DriverReply for MountResponse {
    fn err(&self) -> &str {
        &self.err
    }
}

/// Nothing is mounted; the data directory already exists and is simply
/// handed back.
#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    DriverJson(req): DriverJson<MountRequest>,
) -> Result<Response, DriverError> {
    let volume = state
        .registry()
        .lookup(&req.name)
        .await
        .ok_or_else(|| VolumeError::NotFound(req.name.clone()))?;

    let body = MountResponse {
        mountpoint: volume.path.display().to_string(),
        err: String::new(),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

impl ApiRequest for MountRequest {
    type Response = MountResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/VolumeDriver.Mount")?;
        Ok(client.post(full_url).json(&self))
    }
}
