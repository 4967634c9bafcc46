use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{DriverReply, VolumeInfo};
use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListResponse {
    #[serde(default)]
    pub volumes: Vec<VolumeInfo>,
    #[serde(default)]
    pub err: String,
}

impl DriverReply for ListResponse {
    fn err(&self) -> &str {
        &self.err
    }
}

/// Every known volume, sorted by name
#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Response {
    let volumes = state
        .registry()
        .list()
        .await
        .into_iter()
        .map(VolumeInfo::from)
        .collect();

    let body = ListResponse {
        volumes,
        err: String::new(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

impl ApiRequest for ListRequest {
    type Response = ListResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/VolumeDriver.List")?;
        Ok(client.post(full_url).json(&self))
    }
}
