use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Number of clients currently attached to the event stream.
    pub subscribers: usize,
}

impl HealthResponse {
    /// Build the payload from the degraded flag.
    pub fn new(degraded: bool, subscribers: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            subscribers,
        }
    }
}
