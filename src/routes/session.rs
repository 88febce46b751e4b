use axum::{Json, Router, extract::State, http::HeaderMap, routing::get};

use crate::{
    dto::session::SessionResponse, error::AppError, routes::admin::editor_token,
    state::SharedState,
};

/// Session validity endpoint consulted by editors before each mutation.
pub fn router() -> Router<SharedState> {
    Router::new().route("/session", get(check_session))
}

#[utoipa::path(
    get,
    path = "/session",
    tag = "session",
    params(("X-Editor-Token" = String, Header, description = "Editor token to check")),
    responses(
        (status = 200, description = "Token is valid", body = SessionResponse),
        (status = 401, description = "Missing or revoked token")
    )
)]
/// Tell whether the editor token is still valid.
pub async fn check_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, AppError> {
    let token = editor_token(&headers).ok_or_else(|| {
        AppError::Unauthorized("missing editor token header `X-Editor-Token`".into())
    })?;
    let account = state
        .editors()
        .lookup(&token)
        .ok_or_else(|| AppError::Unauthorized("invalid or revoked editor token".into()))?;
    Ok(Json(SessionResponse::checked_now(account.name)))
}
