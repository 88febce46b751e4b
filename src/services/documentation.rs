use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Matchday Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::event_stream,
        crate::routes::events::list_events,
        crate::routes::events::get_event,
        crate::routes::session::check_session,
        crate::routes::admin::create_event,
        crate::routes::admin::replace_event,
        crate::routes::admin::delete_event,
        crate::routes::admin::set_sort_order,
        crate::routes::admin::change_phase,
        crate::routes::admin::adjust_score,
        crate::routes::admin::sign_out,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::event::EventInput,
            crate::dto::event::SortOrderRequest,
            crate::dto::event::PhaseRequest,
            crate::dto::event::ScoreAdjustmentRequest,
            crate::dto::event::PhaseChangeResponse,
            crate::dto::session::SessionResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::ResyncNotice,
            crate::dao::models::EventRecord,
            crate::dao::models::ChangeRecord,
            crate::dao::models::ChangeKind,
            crate::dao::models::Side,
            crate::state::match_phase::MatchPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "events", description = "Public event reads"),
        (name = "session", description = "Editor session checks"),
        (name = "admin", description = "Editor-only event mutations"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_documented_as_uuid_strings() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        for schema in ["EventRecord", "ChangeRecord"] {
            let id = &doc["components"]["schemas"][schema]["properties"]["id"];
            assert_eq!(id["type"], "string", "{schema}");
            assert_eq!(id["format"], "uuid", "{schema}");
        }
    }
}
