use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::VolumeError;

use super::{DriverError, DriverJson, DriverReply, VolumeInfo};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeInfo>,
    #[serde(default)]
    pub err: String,
}

impl DriverReply for GetResponse {
    fn err(&self) -> &str {
        &self.err
    }
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    DriverJson(req): DriverJson<GetRequest>,
) -> Result<Response, DriverError> {
    let volume = state
        .registry()
        .lookup(&req.name)
        .await
        .ok_or(VolumeError::NotFound(req.name))?;

    let body = GetResponse {
        volume: Some(volume.into()),
        err: String::new(),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

impl ApiRequest for GetRequest {
    type Response = GetResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/VolumeDriver.Get")?;
        Ok(client.post(full_url).json(&self))
    }
}
