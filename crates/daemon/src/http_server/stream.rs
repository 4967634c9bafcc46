//! Server-Sent Events feed of every line read from every tailed file.
//!
//! Each connection is one broadcaster subscription. A frame's `data` is the
//! JSON encoding of a single line event. Connections that fall behind lose
//! events rather than slowing down the tails.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};

use crate::ServiceState;

pub const STREAM_PATH: &str = "/stream";

#[tracing::instrument(skip(state))]
pub async fn handler(
    State(state): State<ServiceState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.broadcaster().subscribe();
    tracing::info!(
        "stream subscriber {} connected ({} total)",
        subscription.id(),
        state.broadcaster().subscriber_count()
    );

    let events = subscription
        .filter_map(|event| async move {
            match event.to_json() {
                Ok(json) => Some(Ok(Event::default().data(json))),
                Err(e) => {
                    tracing::warn!("failed to encode line event: {}", e);
                    None
                }
            }
        })
        .take_until(state.shutdown_signal());

    Sse::new(events).keep_alive(KeepAlive::default())
}
