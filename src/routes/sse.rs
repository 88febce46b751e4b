use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/events",
    tag = "sse",
    responses((status = 200, description = "Event change stream (`event.created`, `event.updated`, `event.deleted`, `feed.resync`, `system.status`)", content_type = "text/event-stream", body = String))
)]
/// Stream event changes to connected viewers and editors.
pub async fn event_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe(&state);
    info!(
        subscribers = state.sse().subscriber_count(),
        "New event SSE connection"
    );
    sse_service::to_sse_stream(receiver, state.degraded_watcher())
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/events", get(event_stream))
}
