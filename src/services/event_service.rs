//! Business logic behind the public and admin event routes. Every write goes through the
//! installed [`EventStore`], whose change feed reaches SSE clients through the feed relay.

use std::{sync::Arc, time::SystemTime};

use tracing::{debug, info};

use crate::{
    dao::{
        event_store::EventStore,
        models::{EventDraft, EventId, EventRecord, Side},
    },
    dto::event::{EventInput, PhaseChangeResponse},
    error::ServiceError,
    state::{
        SharedState,
        clock::elapsed_label,
        match_phase::{MatchPhase, PhaseTransition},
    },
};

fn not_found(id: EventId) -> ServiceError {
    ServiceError::NotFound(format!("event `{id}`"))
}

/// Return every event in display order.
pub async fn list_events(state: &SharedState) -> Result<Vec<EventRecord>, ServiceError> {
    let store = state.require_event_store().await?;
    Ok(store.list_events().await?)
}

/// Return one event by id.
pub async fn get_event(state: &SharedState, id: EventId) -> Result<EventRecord, ServiceError> {
    let store = state.require_event_store().await?;
    store.find_event(id).await?.ok_or_else(|| not_found(id))
}

/// Persist a new event; the store assigns its identity and revision.
pub async fn create_event(
    state: &SharedState,
    input: EventInput,
) -> Result<EventRecord, ServiceError> {
    let store = state.require_event_store().await?;
    let record = store.insert_event(input.into()).await?;
    info!(id = %record.id, title = %record.title, "event created");
    Ok(record)
}

/// Replace an event wholesale, keeping its stored position.
pub async fn replace_event(
    state: &SharedState,
    id: EventId,
    input: EventInput,
) -> Result<EventRecord, ServiceError> {
    let store = state.require_event_store().await?;
    let record = store
        .replace_event(id, input.into())
        .await?
        .ok_or_else(|| not_found(id))?;
    debug!(id = %id, revision = record.revision, "event replaced");
    Ok(record)
}

/// Delete an event. Unknown ids are accepted; the return value tells whether it existed.
pub async fn delete_event(state: &SharedState, id: EventId) -> Result<bool, ServiceError> {
    let store = state.require_event_store().await?;
    let removed = store.delete_event(id).await?;
    if removed {
        info!(id = %id, "event deleted");
    } else {
        debug!(id = %id, "delete of absent event ignored");
    }
    Ok(removed)
}

/// Move an event to a new display position.
pub async fn set_sort_order(
    state: &SharedState,
    id: EventId,
    sort_order: i64,
) -> Result<EventRecord, ServiceError> {
    let store = state.require_event_store().await?;
    store
        .set_sort_order(id, sort_order)
        .await?
        .ok_or_else(|| not_found(id))
}

/// Move a match into `phase`, stamping the start instant with server time when the phase is
/// timed.
pub async fn change_phase(
    state: &SharedState,
    id: EventId,
    phase: MatchPhase,
) -> Result<PhaseChangeResponse, ServiceError> {
    let store = state.require_event_store().await?;
    let now = SystemTime::now();
    let event = update_with(&store, id, |event| {
        let transition = PhaseTransition::plan(event, phase, now);
        debug!(
            id = %id,
            from = ?transition.from,
            to = ?transition.to,
            direction = ?transition.direction,
            "phase change"
        );
        transition.apply(event);
    })
    .await?;

    let clock = elapsed_label(event.status, event.running_since(), now);
    Ok(PhaseChangeResponse { event, clock })
}

/// Shift one side's score by `delta`, clamped at zero.
pub async fn adjust_score(
    state: &SharedState,
    id: EventId,
    side: Side,
    delta: i64,
) -> Result<EventRecord, ServiceError> {
    let store = state.require_event_store().await?;
    update_with(&store, id, |event| event.adjust_score(side, delta)).await
}

/// Read the current record, mutate it and write it back as a whole-record replace.
async fn update_with<F>(
    store: &Arc<dyn EventStore>,
    id: EventId,
    mutate: F,
) -> Result<EventRecord, ServiceError>
where
    F: FnOnce(&mut EventRecord),
{
    let mut event = store.find_event(id).await?.ok_or_else(|| not_found(id))?;
    mutate(&mut event);
    store
        .replace_event(id, EventDraft::from(event))
        .await?
        .ok_or_else(|| not_found(id))
}

/// Insert configured seed events when the store starts out empty.
pub async fn seed_events(
    store: &Arc<dyn EventStore>,
    drafts: &[EventDraft],
) -> Result<usize, ServiceError> {
    if drafts.is_empty() || !store.list_events().await?.is_empty() {
        return Ok(0);
    }

    for draft in drafts {
        store.insert_event(draft.clone()).await?;
    }
    info!(count = drafts.len(), "seeded events");
    Ok(drafts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::event_store::memory::MemoryEventStore,
        state::AppState,
    };

    async fn ready_state() -> SharedState {
        let state = AppState::new(&AppConfig::default());
        state
            .set_event_store(Arc::new(MemoryEventStore::default()))
            .await;
        state
    }

    fn input(title: &str) -> EventInput {
        serde_json::from_value(serde_json::json!({ "title": title })).unwrap()
    }

    #[tokio::test]
    async fn degraded_state_refuses_reads() {
        let state = AppState::new(&AppConfig::default());
        assert!(matches!(
            list_events(&state).await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn entering_a_timed_phase_stamps_server_time() {
        let state = ready_state().await;
        let created = create_event(&state, input("Derby")).await.unwrap();

        let before = SystemTime::now();
        let changed = change_phase(&state, created.id, MatchPhase::FirstHalf)
            .await
            .unwrap();
        assert_eq!(changed.clock, "0'");
        let stamped = changed.event.match_start_timestamp.unwrap();
        assert!(stamped >= before);

        let halftime = change_phase(&state, created.id, MatchPhase::Halftime)
            .await
            .unwrap();
        assert_eq!(halftime.clock, "HT");
        assert_eq!(halftime.event.match_start_timestamp, Some(stamped));
    }

    #[tokio::test]
    async fn score_adjustments_clamp_and_keep_position() {
        let state = ready_state().await;
        let created = create_event(&state, input("Derby")).await.unwrap();
        set_sort_order(&state, created.id, 3).await.unwrap();

        let scored = adjust_score(&state, created.id, Side::Home, 2).await.unwrap();
        assert_eq!(scored.home_score, 2);
        let corrected = adjust_score(&state, created.id, Side::Home, -5)
            .await
            .unwrap();
        assert_eq!(corrected.home_score, 0);
        assert_eq!(corrected.sort_order, 3);
    }

    #[tokio::test]
    async fn deleting_twice_is_not_an_error() {
        let state = ready_state().await;
        let created = create_event(&state, input("Derby")).await.unwrap();
        assert!(delete_event(&state, created.id).await.unwrap());
        assert!(!delete_event(&state, created.id).await.unwrap());
        assert!(matches!(
            get_event(&state, created.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn seeding_only_fills_an_empty_store() {
        let store: Arc<dyn EventStore> = Arc::new(MemoryEventStore::default());
        let drafts = vec![EventDraft::titled("a"), EventDraft::titled("b")];
        assert_eq!(seed_events(&store, &drafts).await.unwrap(), 2);
        assert_eq!(seed_events(&store, &drafts).await.unwrap(), 0);
    }
}
