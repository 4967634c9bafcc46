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
pub struct PathRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PathResponse {
    #[serde(default)]
    pub mountpoint: String,
    #[serde(default)]
    pub err: String,
}

impl DriverReply for PathResponse {
    fn err(&self) -> &str {
        &self.err
    }
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    DriverJson(req): DriverJson<PathRequest>,
) -> Result<Response, DriverError> {
    let volume = state
        .registry()
        .lookup(&req.name)
        .await
        .ok_or(VolumeError::NotFound(req.name))?;

    let body = PathResponse {
        mountpoint: volume.path.display().to_string(),
        err: String::new(),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

impl ApiRequest for PathRequest {
    type Response = PathResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/VolumeDriver.Path")?;
        Ok(client.post(full_url).json(&self))
    }
}
