//! Control surface of the client engine: list, create, update, delete, reorder, subscribe.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        event_store::EventStore,
        models::{ChangeRecord, EventDraft, EventId, EventRecord, Side},
        storage::StorageResult,
    },
    error::SyncError,
    live::{reorder::ReorderCoordinator, replica::EventReplica},
    state::{
        match_phase::{MatchPhase, PhaseDirection, PhaseTransition},
        session::SessionAuthority,
    },
};

/// Default bound on every backend call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning of a [`LiveEvents`] instance.
#[derive(Debug, Clone, Copy)]
pub struct LiveConfig {
    /// Calls that take longer fail with [`SyncError::Timeout`].
    pub request_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Result of [`LiveEvents::list`]: always a list, plus the error that prevented a refresh.
#[derive(Debug)]
pub struct Listing {
    /// Fresh events, or the last known snapshot when `error` is set.
    pub events: Vec<EventRecord>,
    /// Retryable failure; the events above may be stale.
    pub error: Option<SyncError>,
}

impl Listing {
    /// Whether the events come from the last known snapshot instead of a fresh listing.
    pub fn is_stale(&self) -> bool {
        self.error.is_some()
    }
}

type Callback = Arc<dyn Fn(&ChangeRecord) + Send + Sync>;

/// Events held by one client process, kept in sync with a durable [`EventStore`].
///
/// Cloning is cheap and every clone shares the same replica.
#[derive(Clone)]
pub struct LiveEvents {
    inner: Arc<LiveInner>,
}

struct LiveInner {
    backend: Arc<dyn EventStore>,
    session: Arc<dyn SessionAuthority>,
    config: LiveConfig,
    replica: RwLock<EventReplica>,
    snapshot: watch::Sender<Vec<EventRecord>>,
    reload_required: watch::Sender<bool>,
    listeners: DashMap<u64, Callback>,
    next_listener: AtomicU64,
}

/// Registration returned by [`LiveEvents::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    inner: Weak<LiveInner>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.remove(&self.id);
        }
    }
}

impl LiveEvents {
    /// Empty replica over `backend`; mutations are allowed while `session` says so.
    pub fn new(
        backend: Arc<dyn EventStore>,
        session: Arc<dyn SessionAuthority>,
        config: LiveConfig,
    ) -> Self {
        let (snapshot, _) = watch::channel(Vec::new());
        let (reload_required, _) = watch::channel(false);
        Self {
            inner: Arc::new(LiveInner {
                backend,
                session,
                config,
                replica: RwLock::new(EventReplica::new()),
                snapshot,
                reload_required,
                listeners: DashMap::new(),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn backend(&self) -> Arc<dyn EventStore> {
        self.inner.backend.clone()
    }

    /// Current local snapshot in display order, without touching the backend.
    pub async fn snapshot(&self) -> Vec<EventRecord> {
        self.inner.replica.read().await.list()
    }

    /// Current local copy of one event.
    pub async fn get(&self, id: EventId) -> Option<EventRecord> {
        self.inner.replica.read().await.get(id).cloned()
    }

    /// Watch the local snapshot; it changes after every applied mutation.
    pub fn watch(&self) -> watch::Receiver<Vec<EventRecord>> {
        self.inner.snapshot.subscribe()
    }

    /// Flips to `true` once the editor session is found invalid. The UI must reload.
    pub fn reload_required(&self) -> watch::Receiver<bool> {
        self.inner.reload_required.subscribe()
    }

    /// Register `callback` for every change applied to the local list from now on.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChangeRecord) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.insert(id, Arc::new(callback));
        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Refresh from the backend. Never fails: on error the last known snapshot is returned
    /// along with the retryable error.
    pub async fn list(&self) -> Listing {
        match self.resync().await {
            Ok(events) => Listing {
                events,
                error: None,
            },
            Err(err) => {
                warn!(error = %err, "event listing failed; serving last known snapshot");
                Listing {
                    events: self.snapshot().await,
                    error: Some(err),
                }
            }
        }
    }

    /// Replace local state wholesale with the backend listing. Subscribers are told about every
    /// event the listing added, removed or reverted.
    pub async fn resync(&self) -> Result<Vec<EventRecord>, SyncError> {
        let watermark = self.inner.replica.read().await.watermark();
        let listing = self.call(self.inner.backend.list_events()).await?;
        let mut replica = self.inner.replica.write().await;
        let changes = replica.replace_all(listing, watermark);
        let events = replica.list();
        self.publish(&replica);
        for change in &changes {
            self.notify(change);
        }
        debug!(count = events.len(), changed = changes.len(), "replica resynced");
        Ok(events)
    }

    /// Persist a new event. Nothing is shown locally until the backend accepted it.
    pub async fn create(&self, draft: EventDraft) -> Result<EventRecord, SyncError> {
        self.ensure_session().await?;
        let record = self.call(self.inner.backend.insert_event(draft)).await?;
        self.apply_change(ChangeRecord::inserted(record.clone())).await;
        info!(id = %record.id, "event created");
        Ok(record)
    }

    /// Replace an event wholesale. The local copy changes immediately; the stored position is
    /// kept whatever `event.sort_order` says.
    pub async fn update(&self, mut event: EventRecord) -> Result<EventRecord, SyncError> {
        self.ensure_session().await?;
        let id = event.id;

        {
            let mut replica = self.inner.replica.write().await;
            if let Some(current) = replica.get(id) {
                event.sort_order = current.sort_order;
            }
            replica.upsert_local(event.clone());
            self.publish(&replica);
            self.notify(&ChangeRecord::updated(event.clone()));
        }

        let outcome = self
            .call(self.inner.backend.replace_event(id, EventDraft::from(event)))
            .await;

        match outcome {
            Ok(Some(record)) => {
                self.apply_change(ChangeRecord::updated(record.clone())).await;
                Ok(record)
            }
            Ok(None) => {
                warn!(id = %id, "update target is gone; resyncing");
                self.resync_quietly().await;
                Err(SyncError::NotFound(id))
            }
            Err(err) => {
                warn!(id = %id, error = %err, "update failed; resyncing");
                self.resync_quietly().await;
                Err(err)
            }
        }
    }

    /// Delete an event. Deleting an event that is already gone succeeds.
    pub async fn delete(&self, id: EventId) -> Result<(), SyncError> {
        self.ensure_session().await?;

        {
            let mut replica = self.inner.replica.write().await;
            if replica.remove_local(id).is_some() {
                self.publish(&replica);
                self.notify(&ChangeRecord::deleted(
                    id,
                    replica.applied_revision(id).unwrap_or_default(),
                ));
            }
        }

        match self.call(self.inner.backend.delete_event(id)).await {
            Ok(removed) => {
                debug!(id = %id, removed, "event delete acknowledged");
                Ok(())
            }
            Err(err) => {
                warn!(id = %id, error = %err, "delete failed; resyncing");
                self.resync_quietly().await;
                Err(err)
            }
        }
    }

    /// Persist a new display order. See [`ReorderCoordinator::reorder`].
    pub async fn reorder(&self, new_order: &[EventRecord]) -> Result<(), SyncError> {
        ReorderCoordinator::new(self.clone()).reorder(new_order).await
    }

    /// Move a match into `phase`; timed phases get a fresh start instant.
    pub async fn change_phase(
        &self,
        id: EventId,
        phase: MatchPhase,
    ) -> Result<EventRecord, SyncError> {
        let mut event = self.require(id).await?;
        let transition = PhaseTransition::plan(&event, phase, SystemTime::now());
        if transition.direction == PhaseDirection::Backward {
            info!(id = %id, from = ?transition.from, to = ?transition.to, "phase correction");
        }
        transition.apply(&mut event);
        self.update(event).await
    }

    /// Shift one side's score by `delta`, clamped at zero.
    pub async fn adjust_score(
        &self,
        id: EventId,
        side: Side,
        delta: i64,
    ) -> Result<EventRecord, SyncError> {
        let mut event = self.require(id).await?;
        event.adjust_score(side, delta);
        self.update(event).await
    }

    /// Apply a change received from the feed.
    pub async fn apply_change(&self, change: ChangeRecord) -> bool {
        let mut replica = self.inner.replica.write().await;
        let applied = replica.apply_change(&change);
        if applied {
            self.publish(&replica);
            self.notify(&change);
        }
        applied
    }

    /// Optimistically apply a permutation, returning the moved ids with their new position.
    pub(crate) async fn apply_order(&self, order: &[EventId]) -> Vec<(EventId, i64)> {
        let mut replica = self.inner.replica.write().await;
        let moved = replica.set_order(order);
        if !moved.is_empty() {
            self.publish(&replica);
        }
        moved
    }

    /// Ask the session authority, fresh, whether mutations are still allowed.
    pub async fn ensure_session(&self) -> Result<(), SyncError> {
        match self.call(self.inner.session.check()).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.require_reload();
                Err(SyncError::SessionInvalid)
            }
            Err(err) => Err(err),
        }
    }

    /// Run a backend call under the configured timeout.
    pub(crate) async fn call<T>(
        &self,
        request: BoxFuture<'static, StorageResult<T>>,
    ) -> Result<T, SyncError> {
        let limit = self.inner.config.request_timeout;
        let result = match tokio::time::timeout(limit, request).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout(limit)),
        };

        if matches!(result, Err(SyncError::SessionInvalid)) {
            self.require_reload();
        }
        result
    }

    pub(crate) async fn resync_quietly(&self) {
        if let Err(err) = self.resync().await {
            warn!(error = %err, "resync failed; local state may be stale");
        }
    }

    async fn require(&self, id: EventId) -> Result<EventRecord, SyncError> {
        match self.get(id).await {
            Some(event) => Ok(event),
            None => {
                self.resync_quietly().await;
                Err(SyncError::NotFound(id))
            }
        }
    }

    fn require_reload(&self) {
        warn!("editor session invalid; reload required");
        self.inner.reload_required.send_replace(true);
    }

    fn publish(&self, replica: &EventReplica) {
        self.inner.snapshot.send_replace(replica.list());
    }

    fn notify(&self, change: &ChangeRecord) {
        let callbacks: Vec<Callback> = self
            .inner
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for callback in callbacks {
            callback(change);
        }
    }
}
