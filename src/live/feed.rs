//! Keeps a [`LiveEvents`] replica subscribed to its backend's change feed.
//!
//! Missed changes are never replayed, so every (re)subscription is followed by a full listing.
//! While the feed is down the replica keeps its last snapshot and the status reports it stale.

use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{error::SyncError, live::store::LiveEvents};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Health of the subscription as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// First subscription not established yet.
    Connecting,
    /// Subscribed and resynced; local state tracks the backend.
    Live,
    /// Showing the last known snapshot until the feed comes back.
    Stale { reason: String },
}

impl FeedStatus {
    /// Whether local state may lag behind the backend.
    pub fn is_stale(&self) -> bool {
        !matches!(self, FeedStatus::Live)
    }
}

/// Background subscription task. Dropping it stops the task.
pub struct ChangeFeed {
    status: watch::Receiver<FeedStatus>,
    task: JoinHandle<()>,
}

impl ChangeFeed {
    /// Spawn the subscription task for `events`.
    pub fn start(events: &LiveEvents) -> Self {
        let (tx, status) = watch::channel(FeedStatus::Connecting);
        let task = tokio::spawn(run(events.clone(), tx));
        Self { status, task }
    }

    /// Watch the subscription health.
    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status.clone()
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(events: LiveEvents, status: watch::Sender<FeedStatus>) {
    let mut delay = INITIAL_DELAY;

    loop {
        let reason = match follow(&events, &status).await {
            Ok(()) => "change feed ended".to_string(),
            Err(err) => err.to_string(),
        };
        let reached_live = *status.borrow() == FeedStatus::Live;
        warn!(reason = %reason, "change feed lost; serving last known snapshot");
        status.send_replace(FeedStatus::Stale { reason });

        delay = retry_delay(delay, reached_live);
        sleep(with_jitter(delay)).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Delay before the next attempt. A subscription that went live starts over from the initial
/// delay, however long the earlier outages were.
fn retry_delay(previous: Duration, reached_live: bool) -> Duration {
    if reached_live { INITIAL_DELAY } else { previous }
}

/// Subscribe, resync, then apply changes until the feed breaks.
async fn follow(events: &LiveEvents, status: &watch::Sender<FeedStatus>) -> Result<(), SyncError> {
    let mut changes = events.call(events.backend().changes()).await?;
    let listed = events.resync().await?;
    info!(count = listed.len(), "change feed live");
    status.send_replace(FeedStatus::Live);

    while let Some(next) = changes.next().await {
        let change = next.map_err(SyncError::from)?;
        let applied = events.apply_change(change.clone()).await;
        debug!(id = %change.id, revision = change.revision, applied, "feed change");
    }
    Ok(())
}

fn with_jitter(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 4;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=spread))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dao::{
            event_store::{EventStore, memory::MemoryEventStore},
            models::EventDraft,
        },
        live::store::LiveConfig,
        state::session::TrustedSession,
    };

    fn live(store: Arc<dyn EventStore>) -> LiveEvents {
        LiveEvents::new(store, Arc::new(TrustedSession), LiveConfig::default())
    }

    async fn wait_for(status: &mut watch::Receiver<FeedStatus>, wanted: fn(&FeedStatus) -> bool) {
        status.wait_for(|current| wanted(current)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn remote_writes_reach_the_replica() {
        let backend = MemoryEventStore::default();
        let before = backend.insert_event(EventDraft::titled("before")).await.unwrap();
        let events = live(Arc::new(backend.clone()));
        let feed = ChangeFeed::start(&events);
        let mut status = feed.status();
        wait_for(&mut status, |s| *s == FeedStatus::Live).await;
        assert!(events.get(before.id).await.is_some(), "initial resync");

        let mut snapshots = events.watch();
        let created = backend.insert_event(EventDraft::titled("after")).await.unwrap();
        snapshots
            .wait_for(|list| list.iter().any(|e| e.id == created.id))
            .await
            .unwrap();
    }

    #[test]
    fn backoff_restarts_after_a_live_period() {
        assert_eq!(retry_delay(MAX_DELAY, true), INITIAL_DELAY);
        assert_eq!(retry_delay(MAX_DELAY, false), MAX_DELAY);
        assert_eq!(retry_delay(INITIAL_DELAY * 4, false), INITIAL_DELAY * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_feed_goes_stale_then_resyncs() {
        let backend = MemoryEventStore::new(1);
        let events = live(Arc::new(backend.clone()));
        let feed = ChangeFeed::start(&events);
        let mut status = feed.status();
        wait_for(&mut status, |s| *s == FeedStatus::Live).await;

        // Overflow the one-slot feed so the subscription lags out.
        let first = backend.insert_event(EventDraft::titled("a")).await.unwrap();
        let second = backend.insert_event(EventDraft::titled("b")).await.unwrap();
        wait_for(&mut status, FeedStatus::is_stale).await;

        wait_for(&mut status, |s| *s == FeedStatus::Live).await;
        assert!(events.get(first.id).await.is_some());
        assert!(events.get(second.id).await.is_some());
    }
}
