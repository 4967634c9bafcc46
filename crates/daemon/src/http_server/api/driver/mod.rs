//! Volume plugin protocol endpoints
//!
//! Every endpoint is a `POST` carrying a small JSON object. The container
//! runtime sends these bodies with its own plugin content type, so they are
//! decoded from the raw bytes instead of through [`axum::Json`]. Failures are
//! reported in-band: the response is always `200` and carries a non-empty
//! `Err` string.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{async_trait, Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use common::prelude::{Volume, VolumeError};

use crate::ServiceState;

mod activate;
mod capabilities;
mod create;
mod get;
mod list;
mod mount;
mod path;
mod remove;
mod unmount;

// Re-export request/response types for use by CLI and other clients
pub use activate::{ActivateRequest, ActivateResponse, VOLUME_DRIVER};
pub use capabilities::{Capabilities, CapabilitiesRequest, CapabilitiesResponse};
pub use create::{CreateRequest, CreateResponse};
pub use get::{GetRequest, GetResponse};
pub use list::{ListRequest, ListResponse};
pub use mount::{MountRequest, MountResponse};
pub use path::{PathRequest, PathResponse};
pub use remove::{RemoveRequest, RemoveResponse};
pub use unmount::{UnmountRequest, UnmountResponse};

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/Plugin.Activate", post(activate::handler))
        .route("/VolumeDriver.Create", post(create::handler))
        .route("/VolumeDriver.Remove", post(remove::handler))
        .route("/VolumeDriver.Mount", post(mount::handler))
        .route("/VolumeDriver.Path", post(path::handler))
        .route("/VolumeDriver.Unmount", post(unmount::handler))
        .route("/VolumeDriver.Get", post(get::handler))
        .route("/VolumeDriver.List", post(list::handler))
        .route("/VolumeDriver.Capabilities", post(capabilities::handler))
}

/// Driver responses that report failure through an `Err` field
pub trait DriverReply {
    fn err(&self) -> &str;
}

/// A volume as the driver protocol describes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: String,
}

impl From<Volume> for VolumeInfo {
    fn from(volume: Volume) -> Self {
        Self {
            name: volume.name,
            mountpoint: volume.path.display().to_string(),
        }
    }
}

/// Response body of a failed driver call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrResponse {
    err: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to read request body: {0}")]
    Body(String),
    #[error("invalid request body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Volume(#[from] VolumeError),
}

impl IntoResponse for DriverError {
    fn into_response(self) -> Response {
        tracing::error!("driver request failed: {}", self);
        let body = ErrResponse {
            err: self.to_string(),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// JSON body extractor that ignores the request content type. An empty body
/// decodes as `{}`.
#[derive(Debug)]
pub struct DriverJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for DriverJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = DriverError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| DriverError::Body(e.body_text()))?;
        let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &bytes
        };
        Ok(DriverJson(serde_json::from_slice(body)?))
    }
}
