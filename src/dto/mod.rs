use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod event;
pub mod health;
pub mod session;
pub mod sse;
pub mod validation;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

impl session::SessionResponse {
    /// Response for `editor`, stamped with the check instant.
    pub fn checked_now(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
            checked_at: format_system_time(SystemTime::now()),
        }
    }
}
