use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::{ApiError, ApiRequest};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capabilities {
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub capabilities: Capabilities,
}

/// Volumes are local to this host
#[tracing::instrument]
pub async fn handler() -> Response {
    let body = CapabilitiesResponse {
        capabilities: Capabilities {
            scope: "local".to_string(),
        },
    };
    (StatusCode::OK, Json(body)).into_response()
}

impl ApiRequest for CapabilitiesRequest {
    type Response = CapabilitiesResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/VolumeDriver.Capabilities")?;
        Ok(client.post(full_url).json(&self))
    }
}
