use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{DriverError, DriverJson, DriverReply};
use crate::http_server::api::client::{ApiError, ApiRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnmountRequest {
    pub name: String,
    #[serde(default, rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnmountResponse {
    #[serde(default)]
    pub err: String,
}

impl DriverReply for UnmountResponse {
    fn err(&self) -> &str {
        &self.err
    }
}

/// No-op; tails keep running until the volume is removed
#[tracing::instrument]
pub async fn handler(DriverJson(req): DriverJson<UnmountRequest>) -> Result<Response, DriverError> {
    tracing::debug!("unmount of {} acknowledged", req.name);
    Ok((StatusCode::OK, Json(UnmountResponse::default())).into_response())
}

impl ApiRequest for UnmountRequest {
    type Response = UnmountResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/VolumeDriver.Unmount")?;
        Ok(client.post(full_url).json(&self))
    }
}
