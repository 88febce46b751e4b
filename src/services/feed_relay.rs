//! Relays the installed store's change feed to SSE clients.
//!
//! The relay is the only subscriber of the durable feed; SSE clients subscribe to the
//! in-process hub. When the store feed breaks, clients are told to resync because the
//! changes written during the gap are never replayed.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{dao::event_store::EventStore, services::sse_events, state::SharedState};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Spawn the relay task for `store`.
pub fn spawn(state: SharedState, store: Arc<dyn EventStore>) -> JoinHandle<()> {
    tokio::spawn(run(state, store))
}

async fn run(state: SharedState, store: Arc<dyn EventStore>) {
    let mut delay = INITIAL_DELAY;
    let mut reconnecting = false;

    loop {
        match store.changes().await {
            Ok(mut changes) => {
                if reconnecting {
                    info!("store change feed re-established");
                    sse_events::broadcast_resync(&state, "change feed re-established");
                }
                delay = INITIAL_DELAY;

                while let Some(next) = changes.next().await {
                    match next {
                        Ok(change) => {
                            debug!(id = %change.id, kind = ?change.kind, revision = change.revision, "relaying change");
                            sse_events::broadcast_change(&state, &change);
                        }
                        Err(err) => {
                            warn!(error = %err, "store change feed failed");
                            break;
                        }
                    }
                }
                warn!("store change feed ended; resubscribing");
            }
            Err(err) => {
                warn!(error = %err, "failed to subscribe to store changes");
            }
        }

        reconnecting = true;
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            event_store::memory::MemoryEventStore,
            models::{ChangeRecord, EventDraft},
        },
        services::sse_events::{EVENT_CREATED, EVENT_DELETED, FEED_RESYNC},
        state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn changes_reach_sse_subscribers() {
        let state = AppState::new(&AppConfig::default());
        let store = MemoryEventStore::default();
        let mut hub = state.sse().subscribe();
        let handle = spawn(state.clone(), Arc::new(store.clone()));
        tokio::task::yield_now().await;

        let created = store.insert_event(EventDraft::titled("a")).await.unwrap();
        store.delete_event(created.id).await.unwrap();

        let first = hub.recv().await.unwrap();
        assert_eq!(first.event.as_deref(), Some(EVENT_CREATED));
        let change: ChangeRecord = serde_json::from_str(&first.data).unwrap();
        assert_eq!(change.id, created.id);

        let second = hub.recv().await.unwrap();
        assert_eq!(second.event.as_deref(), Some(EVENT_DELETED));
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn broken_feed_triggers_resync_after_resubscribe() {
        let state = AppState::new(&AppConfig::default());
        let store = MemoryEventStore::new(1);
        let mut hub = state.sse().subscribe();
        let handle = spawn(state.clone(), Arc::new(store.clone()));
        tokio::task::yield_now().await;

        // Two writes before the relay polls overflow a one-slot feed.
        store.insert_event(EventDraft::titled("a")).await.unwrap();
        store.insert_event(EventDraft::titled("b")).await.unwrap();

        tokio::time::advance(INITIAL_DELAY).await;
        let notice = hub.recv().await.unwrap();
        assert_eq!(notice.event.as_deref(), Some(FEED_RESYNC));
        handle.abort();
    }
}
