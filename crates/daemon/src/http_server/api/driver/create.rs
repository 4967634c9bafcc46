use std::collections::HashMap;

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
pub struct CreateRequest {
    pub name: String,
    /// Driver options; accepted and ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateResponse {
    #[serde(default)]
    pub err: String,
}

impl DriverReply for CreateResponse {
    fn err(&self) -> &str {
        &self.err
    }
}

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
    DriverJson(req): DriverJson<CreateRequest>,
) -> Result<Response, DriverError> {
    let volume = state.registry().create(&req.name).await?;
    tracing::info!("volume {} ready at {}", volume.name, volume.path.display());
    Ok((StatusCode::OK, Json(CreateResponse::default())).into_response())
}

impl ApiRequest for CreateRequest {
    type Response = CreateResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/VolumeDriver.Create")?;
        Ok(client.post(full_url).json(&self))
    }
}
