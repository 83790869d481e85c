//! Server-Sent Events (SSE) streaming of batch progress.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Only forward events for this job id.
    pub job: Option<String>,
}

/// SSE endpoint. The `event:` name is the event's `type`.
pub async fn sse_handler(
    State(state): State<SharedState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.subscribe();
    let job = filter.job.filter(|j| !j.is_empty());
    let stream = BroadcastStream::new(rx)
        .filter_map(move |result| {
            // Lagged receivers skip what they missed.
            let event = result.ok()?;
            if job.as_deref().is_some_and(|j| event.job_id.to_string() != j) {
                return None;
            }
            serde_json::to_string(&event).ok().map(|data| {
                Ok(Event::default().event(event.kind()).data(data))
            })
        });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
