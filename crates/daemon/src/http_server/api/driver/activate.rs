use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::{ApiError, ApiRequest};

pub const VOLUME_DRIVER: &str = "VolumeDriver";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivateRequest {}

/// Plugin handshake: the subsystems this plugin implements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<String>,
}

#[tracing::instrument]
pub async fn handler() -> Response {
    tracing::info!("plugin activated");
    let body = ActivateResponse {
        implements: vec![VOLUME_DRIVER.to_string()],
    };
    (StatusCode::OK, Json(body)).into_response()
}

impl ApiRequest for ActivateRequest {
    type Response = ActivateResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/Plugin.Activate")?;
        Ok(client.post(full_url).json(&self))
    }
}
