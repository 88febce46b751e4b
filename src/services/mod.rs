/// OpenAPI documentation generation.
pub mod documentation;
/// Event reads and editor mutations.
pub mod event_service;
/// Relay from the store change feed to SSE clients.
pub mod feed_relay;
/// Health check service.
pub mod health_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
