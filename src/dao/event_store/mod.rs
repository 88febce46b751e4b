#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "remote-client")]
pub mod remote;

use crate::dao::models::{ChangeRecord, EventDraft, EventId, EventRecord};
use crate::dao::storage::StorageResult;
use futures::{future::BoxFuture, stream::BoxStream};

/// Stream of change notifications. It ends (or yields an error) when the feed is lost;
/// missed changes are not replayed, so subscribers resync with a full listing.
pub type ChangeStream = BoxStream<'static, StorageResult<ChangeRecord>>;

/// Capability set of the durable event backend: sorted reads, insert, replace, delete and a
/// change feed. Every successful write emits exactly one [`ChangeRecord`].
pub trait EventStore: Send + Sync {
    fn list_events(&self) -> BoxFuture<'static, StorageResult<Vec<EventRecord>>>;
    fn find_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<Option<EventRecord>>>;
    fn insert_event(&self, draft: EventDraft) -> BoxFuture<'static, StorageResult<EventRecord>>;
    /// Replace every field of an existing event except its `sort_order`, which is carried over
    /// from the stored record. Returns `None` when the id is unknown.
    fn replace_event(
        &self,
        id: EventId,
        draft: EventDraft,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>>;
    /// Only write path for `sort_order`. Returns `None` when the id is unknown.
    fn set_sort_order(
        &self,
        id: EventId,
        sort_order: i64,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>>;
    /// Remove an event, returning whether something was deleted.
    fn delete_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<bool>>;
    /// Subscribe to changes happening after this call resolves.
    fn changes(&self) -> BoxFuture<'static, StorageResult<ChangeStream>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
