//! Realtime sweep completion stream.
//!
//! Server-sent events endpoint pushing one event per completed sweep. Each
//! connection gets its own receiver from the broadcast hub; disconnecting
//! unsubscribes it and no state is shared between connections.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{debug, instrument};

use crate::AppState;

/// SSE endpoint streaming sweep completion events.
///
/// Subscribers that fall behind lose old events rather than slowing the
/// sweep down.
#[instrument(name = "event_stream", skip(state))]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(subscribers = state.hub.subscriber_count(), "Event stream subscriber attached");

    let stream = BroadcastStream::new(state.hub.subscribe()).filter_map(|event| {
        // Lagged receivers skip dropped events and continue.
        let event = event.ok()?;
        Some(Ok(Event::default().event("sweep").json_data(&event).ok()?))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
