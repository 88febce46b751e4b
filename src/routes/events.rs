use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dao::models::{EventId, EventRecord},
    error::AppError,
    services::event_service,
    state::SharedState,
};

/// Public read-only event endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/{id}", get(get_event))
}

#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    responses(
        (status = 200, description = "Events in display order", body = [EventRecord]),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Return every event sorted by position, newest first on ties.
pub async fn list_events(
    State(state): State<SharedState>,
) -> Result<Json<Vec<EventRecord>>, AppError> {
    Ok(Json(event_service::list_events(&state).await?))
}

#[utoipa::path(
    get,
    path = "/events/{id}",
    tag = "events",
    params(("id" = String, Path, description = "Identifier of the event")),
    responses(
        (status = 200, description = "Event", body = EventRecord),
        (status = 404, description = "Unknown event")
    )
)]
/// Return a single event.
pub async fn get_event(
    State(state): State<SharedState>,
    Path(id): Path<EventId>,
) -> Result<Json<EventRecord>, AppError> {
    Ok(Json(event_service::get_event(&state, id).await?))
}
