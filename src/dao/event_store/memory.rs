//! In-process event backend. Holds the authoritative records behind a lock and fans out
//! change notifications over a Tokio broadcast channel.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::future::BoxFuture;
use tokio::sync::{RwLock, broadcast, broadcast::error::RecvError};
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    event_store::{ChangeStream, EventStore},
    models::{ChangeRecord, EventDraft, EventId, EventRecord, sort_events},
    storage::{StorageError, StorageResult},
};

/// Default capacity of the change feed before slow subscribers start lagging.
pub const DEFAULT_FEED_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct MemoryEventStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    events: RwLock<HashMap<EventId, EventRecord>>,
    sequence: AtomicU64,
    feed: broadcast::Sender<ChangeRecord>,
}

impl MemoryInner {
    fn next_revision(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish(&self, change: ChangeRecord) {
        debug!(id = %change.id, revision = change.revision, kind = ?change.kind, "memory store change");
        let _ = self.feed.send(change);
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl MemoryEventStore {
    /// Build an empty store whose change feed buffers `feed_capacity` notifications.
    pub fn new(feed_capacity: usize) -> Self {
        let (feed, _receiver) = broadcast::channel(feed_capacity.max(1));
        Self {
            inner: Arc::new(MemoryInner {
                events: RwLock::new(HashMap::new()),
                sequence: AtomicU64::new(0),
                feed,
            }),
        }
    }

    /// Number of events currently stored.
    pub async fn len(&self) -> usize {
        self.inner.events.read().await.len()
    }

    /// Whether the store holds no events.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl EventStore for MemoryEventStore {
    fn list_events(&self) -> BoxFuture<'static, StorageResult<Vec<EventRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut events: Vec<_> = inner.events.read().await.values().cloned().collect();
            sort_events(&mut events);
            Ok(events)
        })
    }

    fn find_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.events.read().await.get(&id).cloned()) })
    }

    fn insert_event(&self, draft: EventDraft) -> BoxFuture<'static, StorageResult<EventRecord>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut events = inner.events.write().await;
            let sort_order = draft.sort_order.unwrap_or_default();
            let record = draft.into_record(Uuid::now_v7(), inner.next_revision(), sort_order);
            events.insert(record.id, record.clone());
            inner.publish(ChangeRecord::inserted(record.clone()));
            Ok(record)
        })
    }

    fn replace_event(
        &self,
        id: EventId,
        draft: EventDraft,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut events = inner.events.write().await;
            let Some(current) = events.get(&id) else {
                return Ok(None);
            };

            let record = draft.into_record(id, inner.next_revision(), current.sort_order);
            events.insert(id, record.clone());
            inner.publish(ChangeRecord::updated(record.clone()));
            Ok(Some(record))
        })
    }

    fn set_sort_order(
        &self,
        id: EventId,
        sort_order: i64,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut events = inner.events.write().await;
            let Some(current) = events.get_mut(&id) else {
                return Ok(None);
            };

            current.sort_order = sort_order;
            current.revision = inner.next_revision();
            let record = current.clone();
            inner.publish(ChangeRecord::updated(record.clone()));
            Ok(Some(record))
        })
    }

    fn delete_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut events = inner.events.write().await;
            if events.remove(&id).is_none() {
                return Ok(false);
            }

            inner.publish(ChangeRecord::deleted(id, inner.next_revision()));
            Ok(true)
        })
    }

    fn changes(&self) -> BoxFuture<'static, StorageResult<ChangeStream>> {
        // Subscribe eagerly so nothing written after this call is missed.
        let mut receiver = self.inner.feed.subscribe();
        Box::pin(async move {
            let stream = async_stream::stream! {
                loop {
                    match receiver.recv().await {
                        Ok(change) => yield Ok(change),
                        Err(RecvError::Lagged(skipped)) => {
                            yield Err(StorageError::disconnected(format!(
                                "change feed lagged, {skipped} notifications dropped"
                            )));
                            break;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            };
            Ok(Box::pin(stream) as ChangeStream)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::dao::models::ChangeKind;

    #[tokio::test]
    async fn insert_assigns_identity_revision_and_default_position() {
        let store = MemoryEventStore::default();
        let first = store.insert_event(EventDraft::titled("a")).await.unwrap();
        let second = store.insert_event(EventDraft::titled("b")).await.unwrap();

        assert_eq!(first.sort_order, 0);
        assert!(second.revision > first.revision);

        let listed = store.list_events().await.unwrap();
        assert_eq!(listed[0].id, second.id, "newest first among equal positions");
    }

    #[tokio::test]
    async fn replace_preserves_sort_order_and_bumps_revision() {
        let store = MemoryEventStore::default();
        let created = store.insert_event(EventDraft::titled("a")).await.unwrap();
        store.set_sort_order(created.id, 7).await.unwrap();

        let mut draft = EventDraft::titled("renamed");
        draft.sort_order = Some(0);
        let replaced = store
            .replace_event(created.id, draft)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(replaced.title, "renamed");
        assert_eq!(replaced.sort_order, 7);
        assert!(replaced.revision > created.revision);
    }

    #[tokio::test]
    async fn unknown_ids_are_reported_as_absent() {
        let store = MemoryEventStore::default();
        let id = Uuid::now_v7();
        assert!(
            store
                .replace_event(id, EventDraft::titled("x"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.set_sort_order(id, 1).await.unwrap().is_none());
        assert!(!store.delete_event(id).await.unwrap());
    }

    #[tokio::test]
    async fn every_write_emits_one_change() {
        let store = MemoryEventStore::default();
        let mut changes = store.changes().await.unwrap();

        let created = store.insert_event(EventDraft::titled("a")).await.unwrap();
        store
            .replace_event(created.id, EventDraft::titled("b"))
            .await
            .unwrap();
        store.delete_event(created.id).await.unwrap();
        store.delete_event(created.id).await.unwrap();

        let kinds: Vec<_> = changes
            .by_ref()
            .take(3)
            .map(|change| change.unwrap().kind)
            .collect()
            .await;
        assert_eq!(
            kinds,
            vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
        );
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_a_disconnect() {
        let store = MemoryEventStore::new(1);
        let mut changes = store.changes().await.unwrap();
        store.insert_event(EventDraft::titled("a")).await.unwrap();
        store.insert_event(EventDraft::titled("b")).await.unwrap();

        let first = changes.next().await.unwrap();
        assert!(matches!(first, Err(StorageError::Disconnected { .. })));
        assert!(changes.next().await.is_none());
    }
}
