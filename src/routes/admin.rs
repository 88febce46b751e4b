use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, post, put},
};
use axum_valid::Valid;
use tracing::info;

use crate::{
    dao::models::{EventId, EventRecord},
    dto::event::{
        EventInput, PhaseChangeResponse, PhaseRequest, ScoreAdjustmentRequest, SortOrderRequest,
    },
    error::AppError,
    services::event_service,
    state::{SharedState, session::EditorAccount},
};

/// Header carrying the editor token on every admin request.
pub const EDITOR_TOKEN_HEADER: &str = "x-editor-token";

/// Token and account of the editor issuing the current request.
#[derive(Debug, Clone)]
pub struct EditorIdentity {
    pub token: String,
    pub account: EditorAccount,
}

/// Editor-only endpoints mutating events.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/events", post(create_event))
        .route(
            "/admin/events/{id}",
            put(replace_event).delete(delete_event),
        )
        .route("/admin/events/{id}/sort-order", put(set_sort_order))
        .route("/admin/events/{id}/phase", post(change_phase))
        .route("/admin/events/{id}/score", post(adjust_score))
        .route("/admin/session", delete(sign_out))
        .route_layer(middleware::from_fn_with_state(state, require_editor_token))
}

/// Create an event; the server assigns its identity and revision.
#[utoipa::path(
    post,
    path = "/admin/events",
    tag = "admin",
    params(("X-Editor-Token" = String, Header, description = "Editor token from the configuration")),
    request_body = EventInput,
    responses(
        (status = 201, description = "Event created", body = EventRecord),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or revoked editor token")
    )
)]
pub async fn create_event(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<EventInput>>,
) -> Result<(StatusCode, Json<EventRecord>), AppError> {
    let record = event_service::create_event(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Replace an event wholesale. Its display position is preserved.
#[utoipa::path(
    put,
    path = "/admin/events/{id}",
    tag = "admin",
    params(("X-Editor-Token" = String, Header, description = "Editor token from the configuration"),
    ("id" = String, Path, description = "Identifier of the event to replace")),
    request_body = EventInput,
    responses(
        (status = 200, description = "Event replaced", body = EventRecord),
        (status = 404, description = "Unknown event")
    )
)]
pub async fn replace_event(
    State(state): State<SharedState>,
    Path(id): Path<EventId>,
    Valid(Json(payload)): Valid<Json<EventInput>>,
) -> Result<Json<EventRecord>, AppError> {
    Ok(Json(event_service::replace_event(&state, id, payload).await?))
}

/// Delete an event. Deleting an absent event succeeds too.
#[utoipa::path(
    delete,
    path = "/admin/events/{id}",
    tag = "admin",
    params(("X-Editor-Token" = String, Header, description = "Editor token from the configuration"),
    ("id" = String, Path, description = "Identifier of the event to delete")),
    responses((status = 204, description = "Event deleted or already absent"))
)]
pub async fn delete_event(
    State(state): State<SharedState>,
    Path(id): Path<EventId>,
) -> Result<StatusCode, AppError> {
    event_service::delete_event(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Move an event to a new display position.
#[utoipa::path(
    put,
    path = "/admin/events/{id}/sort-order",
    tag = "admin",
    params(("X-Editor-Token" = String, Header, description = "Editor token from the configuration"),
    ("id" = String, Path, description = "Identifier of the event to move")),
    request_body = SortOrderRequest,
    responses(
        (status = 200, description = "Event moved", body = EventRecord),
        (status = 404, description = "Unknown event")
    )
)]
pub async fn set_sort_order(
    State(state): State<SharedState>,
    Path(id): Path<EventId>,
    Valid(Json(payload)): Valid<Json<SortOrderRequest>>,
) -> Result<Json<EventRecord>, AppError> {
    Ok(Json(
        event_service::set_sort_order(&state, id, payload.sort_order).await?,
    ))
}

/// Move a match into another phase. Timed phases are stamped with server time.
#[utoipa::path(
    post,
    path = "/admin/events/{id}/phase",
    tag = "admin",
    params(("X-Editor-Token" = String, Header, description = "Editor token from the configuration"),
    ("id" = String, Path, description = "Identifier of the match")),
    request_body = PhaseRequest,
    responses(
        (status = 200, description = "Phase changed", body = PhaseChangeResponse),
        (status = 404, description = "Unknown event")
    )
)]
pub async fn change_phase(
    State(state): State<SharedState>,
    Path(id): Path<EventId>,
    Valid(Json(payload)): Valid<Json<PhaseRequest>>,
) -> Result<Json<PhaseChangeResponse>, AppError> {
    Ok(Json(
        event_service::change_phase(&state, id, payload.phase).await?,
    ))
}

/// Shift a side's score; results below zero are clamped.
#[utoipa::path(
    post,
    path = "/admin/events/{id}/score",
    tag = "admin",
    params(("X-Editor-Token" = String, Header, description = "Editor token from the configuration"),
    ("id" = String, Path, description = "Identifier of the match")),
    request_body = ScoreAdjustmentRequest,
    responses(
        (status = 200, description = "Score adjusted", body = EventRecord),
        (status = 404, description = "Unknown event")
    )
)]
pub async fn adjust_score(
    State(state): State<SharedState>,
    Path(id): Path<EventId>,
    Valid(Json(payload)): Valid<Json<ScoreAdjustmentRequest>>,
) -> Result<Json<EventRecord>, AppError> {
    Ok(Json(
        event_service::adjust_score(&state, id, payload.side, payload.delta).await?,
    ))
}

/// Revoke the calling editor's token.
#[utoipa::path(
    delete,
    path = "/admin/session",
    tag = "admin",
    params(("X-Editor-Token" = String, Header, description = "Editor token to revoke")),
    responses((status = 204, description = "Token revoked"))
)]
pub async fn sign_out(
    State(state): State<SharedState>,
    Extension(identity): Extension<EditorIdentity>,
) -> StatusCode {
    state.editors().revoke(&identity.token);
    info!(editor = %identity.account.name, "editor signed out");
    StatusCode::NO_CONTENT
}

/// Read the editor token header, if present.
pub fn editor_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(EDITOR_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
}

async fn require_editor_token(
    State(state): State<SharedState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = editor_token(req.headers()).ok_or_else(|| {
        AppError::Unauthorized("missing editor token header `X-Editor-Token`".into())
    })?;

    // Looked up on every request so a revoked token stops working immediately.
    let account = state
        .editors()
        .lookup(&token)
        .ok_or_else(|| AppError::Unauthorized("invalid or revoked editor token".into()))?;

    req.extensions_mut()
        .insert(EditorIdentity { token, account });
    Ok(next.run(req).await)
}
