//! Turns a permutation of the event list into persisted positions.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    dao::models::{ChangeRecord, EventId, EventRecord},
    error::SyncError,
    live::store::LiveEvents,
};

/// Pointer travel, in pixels, below which a press is a click and not a drag.
pub const DRAG_ACTIVATION_DISTANCE: f32 = 8.0;

/// Move the element at `from` to index `to`, shifting the others. Returns `false` and leaves
/// `items` untouched when either index is out of range or they are equal.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from == to || from >= items.len() || to >= items.len() {
        return false;
    }
    let item = items.remove(from);
    items.insert(to, item);
    true
}

/// Pointer gesture tracker that only reports a drag once the pointer travelled far enough.
#[derive(Debug, Clone, Copy, Default)]
pub struct DragActivation {
    origin: Option<(f32, f32)>,
    active: bool,
}

impl DragActivation {
    /// Start a gesture at the pointer position.
    pub fn press(&mut self, x: f32, y: f32) {
        self.origin = Some((x, y));
        self.active = false;
    }

    /// Feed a pointer position. Returns `true` while a drag is in progress.
    pub fn motion(&mut self, x: f32, y: f32) -> bool {
        let Some((ox, oy)) = self.origin else {
            return false;
        };
        if !self.active {
            self.active = (x - ox).hypot(y - oy) >= DRAG_ACTIVATION_DISTANCE;
        }
        self.active
    }

    /// End the gesture; returns whether it counted as a drag.
    pub fn release(&mut self) -> bool {
        let was_drag = self.active;
        *self = Self::default();
        was_drag
    }
}

/// Keys understood by [`KeyboardReorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderKey {
    /// Towards the top of the list.
    Up,
    /// Towards the bottom of the list.
    Down,
}

/// Keyboard equivalent of a drag: grab an item, move it with arrow keys, drop it.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyboardReorder {
    grabbed: Option<(usize, usize)>,
}

impl KeyboardReorder {
    /// Pick up the item at `index`.
    pub fn grab(&mut self, index: usize) {
        self.grabbed = Some((index, index));
    }

    /// Move the grabbed item one slot within a list of `len` items. Returns its new index.
    pub fn press(&mut self, key: ReorderKey, len: usize) -> Option<usize> {
        let (origin, current) = self.grabbed?;
        let next = match key {
            ReorderKey::Up => current.checked_sub(1)?,
            ReorderKey::Down if current + 1 < len => current + 1,
            ReorderKey::Down => return None,
        };
        self.grabbed = Some((origin, next));
        Some(next)
    }

    /// Release the item, yielding `(from, to)` when it actually moved.
    pub fn drop_item(&mut self) -> Option<(usize, usize)> {
        let (origin, current) = self.grabbed.take()?;
        (origin != current).then_some((origin, current))
    }

    /// Put the item back without moving it.
    pub fn cancel(&mut self) {
        self.grabbed = None;
    }
}

/// Persists a new display order for a [`LiveEvents`] replica.
pub struct ReorderCoordinator {
    events: LiveEvents,
}

impl ReorderCoordinator {
    /// Coordinator writing through `events`.
    pub fn new(events: LiveEvents) -> Self {
        Self { events }
    }

    /// Show `new_order` immediately, then give every moved event its index as `sort_order`.
    ///
    /// Writes are issued concurrently. If any of them fails, local state is replaced by a fresh
    /// listing and the first error is returned.
    pub async fn reorder(&self, new_order: &[EventRecord]) -> Result<(), SyncError> {
        self.events.ensure_session().await?;

        let ids: Vec<EventId> = new_order.iter().map(|event| event.id).collect();
        let moved = self.events.apply_order(&ids).await;
        if moved.is_empty() {
            debug!("reorder left every position unchanged");
            return Ok(());
        }

        let backend = self.events.backend();
        let writes = moved.iter().map(|&(id, position)| {
            let request = backend.set_sort_order(id, position);
            async move { (id, self.events.call(request).await) }
        });
        let results = join_all(writes).await;

        let mut stored = Vec::with_capacity(results.len());
        let mut failure = None;
        for (id, result) in results {
            match result {
                Ok(Some(record)) => stored.push(record),
                Ok(None) => {
                    failure.get_or_insert(SyncError::NotFound(id));
                }
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            warn!(error = %err, "reorder failed; resyncing from backend");
            self.events.resync_quietly().await;
            return Err(err);
        }

        for record in stored {
            self.events.apply_change(ChangeRecord::updated(record)).await;
        }
        info!(moved = moved.len(), "event order persisted");
        Ok(())
    }

    /// Move the event at display index `from` to `to` and persist the result.
    pub async fn move_to(&self, from: usize, to: usize) -> Result<(), SyncError> {
        let mut order = self.events.snapshot().await;
        if !move_item(&mut order, from, to) {
            return Ok(());
        }
        self.reorder(&order).await
    }
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
        live::{
            store::LiveConfig,
            testing::{FlakyStore, granted_session},
        },
    };

    async fn seeded(store: Arc<dyn EventStore>) -> LiveEvents {
        for (index, title) in ["a", "b", "c"].into_iter().enumerate() {
            let mut draft = EventDraft::titled(title);
            draft.sort_order = Some(index as i64);
            store.insert_event(draft).await.unwrap();
        }
        let (_, session) = granted_session();
        let events = LiveEvents::new(store, session, LiveConfig::default());
        events.resync().await.unwrap();
        events
    }

    fn titles(events: &[EventRecord]) -> Vec<String> {
        events.iter().map(|event| event.title.clone()).collect()
    }

    #[tokio::test]
    async fn moving_last_to_first_persists_indices() {
        let backend = Arc::new(MemoryEventStore::default());
        let events = seeded(backend.clone()).await;

        let mut order = events.snapshot().await;
        assert!(move_item(&mut order, 2, 0));
        events.reorder(&order).await.unwrap();

        let listed = events.list().await.events;
        assert_eq!(titles(&listed), vec!["c", "a", "b"]);
        let persisted = backend.list_events().await.unwrap();
        for (index, event) in persisted.iter().enumerate() {
            assert_eq!(event.sort_order, index as i64);
        }
        assert_eq!(titles(&persisted), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn failed_write_resyncs_instead_of_partial_rollback() {
        let store = Arc::new(FlakyStore::default());
        let events = seeded(store.clone()).await;
        store.fail_sort_orders(true);

        let coordinator = ReorderCoordinator::new(events.clone());
        let result = coordinator.move_to(2, 0).await;

        assert!(matches!(result, Err(SyncError::Persistence(_))));
        assert_eq!(titles(&events.snapshot().await), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unchanged_order_issues_no_writes() {
        let store = Arc::new(FlakyStore::default());
        let events = seeded(store.clone()).await;
        store.fail_sort_orders(true);

        let order = events.snapshot().await;
        events.reorder(&order).await.unwrap();
    }

    #[test]
    fn short_pointer_travel_is_a_click() {
        let mut drag = DragActivation::default();
        drag.press(10.0, 10.0);
        assert!(!drag.motion(14.0, 13.0));
        assert!(!drag.release());

        drag.press(10.0, 10.0);
        assert!(drag.motion(18.0, 10.0));
        assert!(drag.motion(11.0, 10.0), "stays active once started");
        assert!(drag.release());
    }

    #[test]
    fn keyboard_moves_stay_in_bounds() {
        let mut keys = KeyboardReorder::default();
        keys.grab(1);
        assert_eq!(keys.press(ReorderKey::Up, 3), Some(0));
        assert_eq!(keys.press(ReorderKey::Up, 3), None);
        assert_eq!(keys.press(ReorderKey::Down, 3), Some(1));
        assert_eq!(keys.drop_item(), None);

        keys.grab(0);
        keys.press(ReorderKey::Down, 3);
        keys.press(ReorderKey::Down, 3);
        assert_eq!(keys.press(ReorderKey::Down, 3), None);
        assert_eq!(keys.drop_item(), Some((0, 2)));
    }

    #[test]
    fn move_item_rejects_out_of_range() {
        let mut items = vec![1, 2, 3];
        assert!(!move_item(&mut items, 3, 0));
        assert!(!move_item(&mut items, 1, 1));
        assert!(move_item(&mut items, 0, 2));
        assert_eq!(items, vec![2, 3, 1]);
    }
}
