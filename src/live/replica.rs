//! Local replica of the event list. Every path that mutates a client's copy of the events
//! (optimistic edits, durable results, feed notifications, resyncs) goes through here.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::dao::models::{ChangeKind, ChangeRecord, EventId, EventRecord, display_order};

/// Events in display order plus the last applied revision of every identity.
///
/// Revisions are remembered after a delete, so a stale update delivered late cannot bring
/// the event back.
#[derive(Debug, Default, Clone)]
pub struct EventReplica {
    events: IndexMap<EventId, EventRecord>,
    applied: HashMap<EventId, u64>,
    /// Local sequence number of the last applied change per identity.
    touched: HashMap<EventId, u64>,
    sequence: u64,
}

impl EventReplica {
    /// Empty replica.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current local apply sequence. Take it before requesting a listing and hand it to
    /// [`EventReplica::replace_all`] so changes applied meanwhile survive the listing.
    pub fn watermark(&self) -> u64 {
        self.sequence
    }

    /// Snapshot in display order.
    pub fn list(&self) -> Vec<EventRecord> {
        self.events.values().cloned().collect()
    }

    /// Local copy of one event.
    pub fn get(&self, id: EventId) -> Option<&EventRecord> {
        self.events.get(&id)
    }

    /// Number of visible events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no event is visible.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Last revision applied for `id`, deletions included.
    pub fn applied_revision(&self, id: EventId) -> Option<u64> {
        self.applied.get(&id).copied()
    }

    /// Apply a server change. Returns `false` when the change is not newer than what was
    /// already applied for that identity, which makes redelivery a no-op.
    pub fn apply_change(&mut self, change: &ChangeRecord) -> bool {
        if self
            .applied_revision(change.id)
            .is_some_and(|seen| change.revision <= seen)
        {
            return false;
        }

        match (change.kind, &change.event) {
            (ChangeKind::Delete, _) => {
                self.events.shift_remove(&change.id);
            }
            (_, Some(event)) => {
                self.events.insert(change.id, event.clone());
                self.sort();
            }
            (_, None) => return false,
        }
        self.applied.insert(change.id, change.revision);
        self.sequence += 1;
        self.touched.insert(change.id, self.sequence);
        true
    }

    /// Replace the whole list with an authoritative listing requested at `watermark`, and
    /// return what changed as seen by this replica.
    ///
    /// Membership follows the listing, except for identities changed after the watermark: a
    /// change applied while the listing was in flight is newer than the listing and is kept.
    pub fn replace_all(&mut self, listing: Vec<EventRecord>, watermark: u64) -> Vec<ChangeRecord> {
        let mut next = IndexMap::with_capacity(listing.len());
        for event in listing {
            let newer = self
                .applied_revision(event.id)
                .is_some_and(|seen| seen > event.revision);
            if newer {
                if let Some(current) = self.events.get(&event.id) {
                    next.insert(event.id, current.clone());
                }
                continue;
            }
            self.applied.insert(event.id, event.revision);
            next.insert(event.id, event);
        }
        for (id, event) in &self.events {
            let applied_since = self.touched.get(id).is_some_and(|seq| *seq > watermark);
            if applied_since && !next.contains_key(id) {
                next.insert(*id, event.clone());
            }
        }

        let previous = std::mem::replace(&mut self.events, next);
        self.sort();

        let mut changes = Vec::new();
        for event in self.events.values() {
            match previous.get(&event.id) {
                None => changes.push(ChangeRecord::inserted(event.clone())),
                Some(before) if before != event => changes.push(ChangeRecord::updated(event.clone())),
                Some(_) => {}
            }
        }
        for (id, before) in &previous {
            if !self.events.contains_key(id) {
                let revision = self.applied_revision(*id).unwrap_or(before.revision);
                changes.push(ChangeRecord::deleted(*id, revision));
            }
        }
        changes
    }

    /// Optimistically show `event` before the backend confirms it. The applied revision is
    /// untouched so the durable answer (or the feed) still replaces it.
    pub fn upsert_local(&mut self, event: EventRecord) {
        self.events.insert(event.id, event);
        self.sort();
    }

    /// Optimistically hide an event.
    pub fn remove_local(&mut self, id: EventId) -> Option<EventRecord> {
        self.events.shift_remove(&id)
    }

    /// Optimistically apply a permutation: each listed id gets its index as `sort_order`.
    /// Returns the ids whose position actually changed.
    pub fn set_order(&mut self, order: &[EventId]) -> Vec<(EventId, i64)> {
        let mut changed = Vec::new();
        for (index, id) in order.iter().enumerate() {
            let position = index as i64;
            if let Some(event) = self.events.get_mut(id) {
                if event.sort_order != position {
                    event.sort_order = position;
                    changed.push((*id, position));
                }
            }
        }
        self.sort();
        changed
    }

    fn sort(&mut self) {
        self.events.sort_by(|_, a, _, b| display_order(a, b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, revision: u64) -> EventRecord {
        let mut event = EventRecord::sample(title);
        event.revision = revision;
        event
    }

    #[test]
    fn redelivered_change_is_a_no_op() {
        let mut replica = EventReplica::new();
        let change = ChangeRecord::inserted(record("a", 1));

        assert!(replica.apply_change(&change));
        let once = replica.list();
        assert!(!replica.apply_change(&change));
        assert_eq!(replica.list(), once);
    }

    #[test]
    fn latest_revision_wins_regardless_of_arrival_order() {
        let mut replica = EventReplica::new();
        let mut older = record("a", 3);
        older.home_score = 1;
        let mut newer = older.clone();
        newer.revision = 5;
        newer.home_score = 2;

        replica.apply_change(&ChangeRecord::updated(newer.clone()));
        replica.apply_change(&ChangeRecord::updated(older.clone()));
        assert_eq!(replica.get(newer.id).unwrap().home_score, 2);

        let mut other = EventReplica::new();
        other.apply_change(&ChangeRecord::updated(older));
        other.apply_change(&ChangeRecord::updated(newer.clone()));
        assert_eq!(other.list(), replica.list());
    }

    #[test]
    fn tombstones_block_stale_updates() {
        let mut replica = EventReplica::new();
        let event = record("a", 2);
        replica.apply_change(&ChangeRecord::inserted(event.clone()));
        replica.apply_change(&ChangeRecord::deleted(event.id, 4));

        let mut stale = event.clone();
        stale.revision = 3;
        assert!(!replica.apply_change(&ChangeRecord::updated(stale)));
        assert!(replica.is_empty());
    }

    #[test]
    fn resync_keeps_changes_newer_than_the_listing() {
        let mut replica = EventReplica::new();
        let mut fresh = record("a", 9);
        fresh.title = "fresh".into();
        replica.apply_change(&ChangeRecord::updated(fresh.clone()));

        let mut listed = fresh.clone();
        listed.revision = 8;
        listed.title = "listed".into();
        let gone = record("gone", 1);
        replica.upsert_local(gone);

        let changes = replica.replace_all(vec![listed], replica.watermark());
        assert_eq!(replica.len(), 1);
        assert_eq!(replica.get(fresh.id).unwrap().title, "fresh");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Delete);
    }

    #[test]
    fn listing_requested_before_an_insert_keeps_the_insert() {
        let mut replica = EventReplica::new();
        let watermark = replica.watermark();
        let created = record("kickoff", 1);
        assert!(replica.apply_change(&ChangeRecord::inserted(created.clone())));

        let changes = replica.replace_all(Vec::new(), watermark);
        assert!(changes.is_empty());
        assert!(replica.get(created.id).is_some());

        let later = replica.watermark();
        replica.replace_all(Vec::new(), later);
        assert!(replica.is_empty(), "a later listing still removes it");
    }

    #[test]
    fn resync_reports_reverted_optimistic_edits() {
        let mut replica = EventReplica::new();
        let stored = record("orig", 1);
        replica.apply_change(&ChangeRecord::inserted(stored.clone()));
        let mut edited = stored.clone();
        edited.title = "optimistic".into();
        replica.upsert_local(edited);

        let changes = replica.replace_all(vec![stored.clone()], replica.watermark());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Update);
        assert_eq!(changes[0].event.as_ref().unwrap().title, "orig");
        assert_eq!(replica.get(stored.id).unwrap().title, "orig");
    }

    #[test]
    fn set_order_reports_only_moved_events() {
        let mut replica = EventReplica::new();
        let mut ids = Vec::new();
        for (index, title) in ["a", "b", "c"].into_iter().enumerate() {
            let mut event = record(title, 1);
            event.sort_order = index as i64;
            ids.push(event.id);
            replica.apply_change(&ChangeRecord::inserted(event));
        }

        let moved = replica.set_order(&[ids[2], ids[0], ids[1]]);
        assert_eq!(moved.len(), 3);
        let titles: Vec<_> = replica.list().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);

        assert!(replica.set_order(&[ids[2], ids[0], ids[1]]).is_empty());
    }
}
