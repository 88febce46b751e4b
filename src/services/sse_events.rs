use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::{ChangeKind, ChangeRecord},
    dto::sse::{Handshake, ResyncNotice, ServerEvent, SystemStatus},
    state::SharedState,
};

/// SSE event name carrying an inserted record.
pub const EVENT_CREATED: &str = "event.created";
/// SSE event name carrying a replaced record.
pub const EVENT_UPDATED: &str = "event.updated";
/// SSE event name carrying a deletion tombstone.
pub const EVENT_DELETED: &str = "event.deleted";
/// SSE event name asking the client to list events again.
pub const FEED_RESYNC: &str = "feed.resync";
/// SSE event name announcing degraded mode changes.
pub const SYSTEM_STATUS: &str = "system.status";
/// SSE event name of the first message on a new stream.
pub const HANDSHAKE: &str = "handshake";

/// SSE event name used for a change of the given kind.
pub fn change_event_name(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Insert => EVENT_CREATED,
        ChangeKind::Update => EVENT_UPDATED,
        ChangeKind::Delete => EVENT_DELETED,
    }
}

/// Broadcast a store change to every SSE client.
pub fn broadcast_change(state: &SharedState, change: &ChangeRecord) {
    send_event(state, change_event_name(change.kind), change);
}

/// Tell every SSE client that changes may have been missed.
pub fn broadcast_resync(state: &SharedState, reason: &str) {
    send_event(
        state,
        FEED_RESYNC,
        &ResyncNotice {
            reason: reason.to_string(),
        },
    );
}

/// Build the resync event sent to a single lagging client.
pub fn resync_event(reason: &str) -> Option<ServerEvent> {
    build_event(
        FEED_RESYNC,
        &ResyncNotice {
            reason: reason.to_string(),
        },
    )
}

/// Build the degraded status event.
pub fn system_status_event(degraded: bool) -> Option<ServerEvent> {
    build_event(SYSTEM_STATUS, &SystemStatus { degraded })
}

/// Build the handshake sent when a client connects.
pub fn handshake_event(degraded: bool) -> Option<ServerEvent> {
    build_event(
        HANDSHAKE,
        &Handshake {
            message: "event stream connected".to_string(),
            degraded,
        },
    )
}

fn send_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    if let Some(event) = build_event(event, payload) {
        state.sse().broadcast(event);
    }
}

fn build_event(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}
