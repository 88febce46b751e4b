use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Answer of the session endpoint for a still-valid editor token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    /// Display name of the editor owning the token.
    pub editor: String,
    /// RFC 3339 instant at which the token was checked.
    pub checked_at: String,
}
