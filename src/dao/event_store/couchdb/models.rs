use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::{
    event_store::couchdb::error::CouchDaoError,
    models::{ChangeRecord, EventDraft, EventId, EventRecord},
};

pub const EVENT_PREFIX: &str = "event::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Body returned by CouchDB for successful `PUT` and `DELETE` requests.
#[derive(Debug, Deserialize)]
pub struct WriteResponse {
    pub rev: String,
}

/// One line of the continuous `_changes` feed.
#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub changes: Vec<ChangeRev>,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRev {
    pub rev: String,
}

/// Stored event document. The draft keeps `sort_order` populated once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: EventDraft,
}

impl EventDocument {
    pub fn new(id: EventId, rev: Option<String>, mut body: EventDraft, sort_order: i64) -> Self {
        body.sort_order = Some(sort_order);
        Self {
            id: event_doc_id(id),
            rev,
            body,
        }
    }

    pub fn sort_order(&self) -> i64 {
        self.body.sort_order.unwrap_or_default()
    }

    /// Convert into a record, using the generation of `rev` as the revision.
    pub fn into_record(self, rev: &str) -> Result<EventRecord, CouchDaoError> {
        let id = extract_uuid(&self.id)?;
        let revision = revision_generation(rev)?;
        let sort_order = self.sort_order();
        Ok(self.body.into_record(id, revision, sort_order))
    }

    /// Convert a document read back from CouchDB, which always carries its `_rev`.
    pub fn into_stored_record(self) -> Result<EventRecord, CouchDaoError> {
        let rev = self.rev.clone().ok_or_else(|| CouchDaoError::InvalidRevision {
            rev: String::new(),
        })?;
        self.into_record(&rev)
    }
}

impl ChangeRow {
    /// Map a feed row onto a change record. Rows for foreign documents yield `None`.
    pub fn into_change(self) -> Result<Option<ChangeRecord>, CouchDaoError> {
        if !self.id.starts_with(EVENT_PREFIX) {
            return Ok(None);
        }

        let rev = self
            .changes
            .first()
            .map(|change| change.rev.clone())
            .ok_or_else(|| CouchDaoError::InvalidRevision { rev: String::new() })?;

        if self.deleted {
            let id = extract_uuid(&self.id)?;
            return Ok(Some(ChangeRecord::deleted(id, revision_generation(&rev)?)));
        }

        let Some(doc) = self.doc else {
            return Ok(None);
        };
        let document: EventDocument =
            serde_json::from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                path: self.id.clone(),
                source,
            })?;
        let record = document.into_record(&rev)?;

        Ok(Some(if record.revision == 1 {
            ChangeRecord::inserted(record)
        } else {
            ChangeRecord::updated(record)
        }))
    }
}

pub fn event_doc_id(id: EventId) -> String {
    format!("{}{}", EVENT_PREFIX, id)
}

pub fn extract_uuid(doc_id: &str) -> Result<Uuid, CouchDaoError> {
    let (_, id) = doc_id
        .split_once("::")
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "missing separator",
        })?;

    Uuid::parse_str(id).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_string(),
        kind: "invalid UUID",
    })
}

/// Numeric generation of a CouchDB revision (`"3-abc..."` is generation 3). Generations grow
/// with every write of a document, deletions included.
pub fn revision_generation(rev: &str) -> Result<u64, CouchDaoError> {
    rev.split_once('-')
        .and_then(|(generation, _)| generation.parse::<u64>().ok())
        .ok_or_else(|| CouchDaoError::InvalidRevision {
            rev: rev.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::models::ChangeKind;

    #[test]
    fn revision_generation_parses_prefix() {
        assert_eq!(revision_generation("12-9f8e").unwrap(), 12);
        assert!(revision_generation("nope").is_err());
    }

    #[test]
    fn feed_rows_map_to_changes() {
        let id = Uuid::now_v7();
        let row: ChangeRow = serde_json::from_value(json!({
            "seq": "7-g1AAAA",
            "id": event_doc_id(id),
            "changes": [{"rev": "2-abc"}],
            "doc": {
                "_id": event_doc_id(id),
                "_rev": "2-abc",
                "title": "Derby",
                "sort_order": 4,
                "home_score": 1,
                "status": "first_half",
                "match_start_timestamp": 1700000000000_i64
            }
        }))
        .unwrap();

        let change = row.into_change().unwrap().unwrap();
        assert_eq!(change.kind, ChangeKind::Update);
        assert_eq!(change.revision, 2);
        let event = change.event.unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.sort_order, 4);
        assert_eq!(event.home_score, 1);
    }

    #[test]
    fn deleted_rows_carry_their_tombstone_generation() {
        let id = Uuid::now_v7();
        let row: ChangeRow = serde_json::from_value(json!({
            "id": event_doc_id(id),
            "deleted": true,
            "changes": [{"rev": "5-def"}],
            "doc": {"_id": event_doc_id(id), "_rev": "5-def", "_deleted": true}
        }))
        .unwrap();

        let change = row.into_change().unwrap().unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.revision, 5);
        assert!(change.event.is_none());
    }

    #[test]
    fn design_documents_are_skipped() {
        let row: ChangeRow = serde_json::from_value(json!({
            "id": "_design/events",
            "changes": [{"rev": "1-aaa"}]
        }))
        .unwrap();
        assert!(row.into_change().unwrap().is_none());
    }
}
