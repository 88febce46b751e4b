//! Test doubles for the client engine.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::future::{self, BoxFuture};
use tokio::time::sleep;

use crate::{
    dao::{
        event_store::{ChangeStream, EventStore, memory::MemoryEventStore},
        models::{EventDraft, EventId, EventRecord},
        storage::{StorageError, StorageResult},
    },
    state::session::{EditorRegistry, RegistrySession, SessionAuthority},
};

pub const EDITOR_TOKEN: &str = "test-editor";

/// How long a slow listing waits between reading the store and answering.
pub const SLOW_LIST_DELAY: Duration = Duration::from_secs(1);

/// Registry with one granted editor, and that editor's session.
pub fn granted_session() -> (Arc<EditorRegistry>, Arc<dyn SessionAuthority>) {
    let registry = Arc::new(EditorRegistry::new());
    registry.grant(EDITOR_TOKEN, "test desk");
    let session = Arc::new(RegistrySession::new(registry.clone(), EDITOR_TOKEN));
    (registry, session)
}

/// Memory store whose calls can be made to fail or hang on demand.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryEventStore,
    fail_lists: Arc<AtomicBool>,
    hang_lists: Arc<AtomicBool>,
    slow_lists: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    fail_sort_orders: Arc<AtomicBool>,
}

fn refused<T: Send + 'static>(what: &'static str) -> BoxFuture<'static, StorageResult<T>> {
    Box::pin(async move {
        Err(StorageError::unavailable(
            format!("{what} refused"),
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "flaky store"),
        ))
    })
}

impl FlakyStore {
    pub fn fail_lists(&self, on: bool) {
        self.fail_lists.store(on, Ordering::SeqCst);
    }

    pub fn hang_lists(&self, on: bool) {
        self.hang_lists.store(on, Ordering::SeqCst);
    }

    /// Listings read the store at once but answer only after [`SLOW_LIST_DELAY`].
    pub fn slow_lists(&self, on: bool) {
        self.slow_lists.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_sort_orders(&self, on: bool) {
        self.fail_sort_orders.store(on, Ordering::SeqCst);
    }

    fn writes_fail(&self) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
    }
}

impl EventStore for FlakyStore {
    fn list_events(&self) -> BoxFuture<'static, StorageResult<Vec<EventRecord>>> {
        if self.hang_lists.load(Ordering::SeqCst) {
            return Box::pin(future::pending());
        }
        if self.fail_lists.load(Ordering::SeqCst) {
            return refused("list");
        }
        let listing = self.inner.list_events();
        if self.slow_lists.load(Ordering::SeqCst) {
            return Box::pin(async move {
                let events = listing.await;
                sleep(SLOW_LIST_DELAY).await;
                events
            });
        }
        listing
    }

    fn find_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        self.inner.find_event(id)
    }

    fn insert_event(&self, draft: EventDraft) -> BoxFuture<'static, StorageResult<EventRecord>> {
        if self.writes_fail() {
            return refused("insert");
        }
        self.inner.insert_event(draft)
    }

    fn replace_event(
        &self,
        id: EventId,
        draft: EventDraft,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        if self.writes_fail() {
            return refused("replace");
        }
        self.inner.replace_event(id, draft)
    }

    fn set_sort_order(
        &self,
        id: EventId,
        sort_order: i64,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        if self.writes_fail() || self.fail_sort_orders.load(Ordering::SeqCst) {
            return refused("sort order");
        }
        self.inner.set_sort_order(id, sort_order)
    }

    fn delete_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<bool>> {
        if self.writes_fail() {
            return refused("delete");
        }
        self.inner.delete_event(id)
    }

    fn changes(&self) -> BoxFuture<'static, StorageResult<ChangeStream>> {
        self.inner.changes()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}
