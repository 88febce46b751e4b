use axum::Router;

use crate::state::SharedState;

pub mod admin;
pub mod docs;
pub mod events;
pub mod health;
pub mod session;
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(events::router())
        .merge(session::router())
        .merge(admin::router(state.clone()))
        .merge(docs::router());

    api_router.with_state(state)
}
