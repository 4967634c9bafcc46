use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::ServiceState;

pub mod api;
pub mod health;
pub mod stream;

/// Build the full router: driver protocol, event stream and status probes
pub fn router(state: ServiceState) -> Router {
    Router::new()
        .merge(api::driver::router())
        .route(stream::STREAM_PATH, get(stream::handler))
        .route("/_status/livez", get(health::liveness::handler))
        .route("/_status/version", get(health::version::handler))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}
