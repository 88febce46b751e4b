use std::{cmp::Ordering, time::SystemTime};

use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{TimestampMilliSeconds, serde_as};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::match_phase::MatchPhase;

/// Stable identity of an event. UUIDv7, so ordering by id is ordering by creation time.
pub type EventId = Uuid;

/// Flat event record, identical in storage, on the wire and in every client snapshot.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EventRecord {
    /// Stable identifier, never reused.
    #[schema(value_type = String, format = Uuid)]
    pub id: EventId,
    /// Server-assigned version, strictly increasing for a given id.
    #[serde(default)]
    pub revision: u64,
    pub title: String,
    /// Scheduled date, free text as entered by the editor.
    #[serde(default)]
    pub date: String,
    /// Scheduled time, free text as entered by the editor.
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    /// Cover image reference.
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
    /// Display position; ties are broken by id, newest first.
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub home_team_abbr: Option<String>,
    #[serde(default)]
    pub away_team_abbr: Option<String>,
    #[serde(default)]
    pub home_team_logo: Option<String>,
    #[serde(default)]
    pub away_team_logo: Option<String>,
    #[serde(default, deserialize_with = "clamped_score")]
    pub home_score: u32,
    #[serde(default, deserialize_with = "clamped_score")]
    pub away_score: u32,
    /// Match phase; `null` displays as scheduled.
    #[serde(default)]
    pub status: Option<MatchPhase>,
    /// Start of the running half, epoch milliseconds. Only meaningful in a timed phase.
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[schema(value_type = Option<i64>)]
    pub match_start_timestamp: Option<SystemTime>,
}

/// Team side of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl EventRecord {
    /// Phase used for display, with unset mapped to scheduled.
    pub fn phase(&self) -> MatchPhase {
        MatchPhase::or_scheduled(self.status)
    }

    /// Start instant, exposed only while the match clock runs.
    pub fn running_since(&self) -> Option<SystemTime> {
        if self.phase().is_timed() {
            self.match_start_timestamp
        } else {
            None
        }
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home_score,
            Side::Away => self.away_score,
        }
    }

    /// Shift one side's score by `delta`, clamping at zero.
    pub fn adjust_score(&mut self, side: Side, delta: i64) {
        let next = clamp_score(i64::from(self.score(side)).saturating_add(delta));
        match side {
            Side::Home => self.home_score = next,
            Side::Away => self.away_score = next,
        }
    }

    /// Whether this record describes a fixture between two teams.
    pub fn is_match(&self) -> bool {
        self.home_team.is_some()
    }

    #[cfg(test)]
    pub(crate) fn sample(title: &str) -> Self {
        EventDraft::titled(title).into_record(Uuid::now_v7(), 1, 0)
    }
}

/// Display order: `sort_order` ascending, then id descending (newest first).
pub fn display_order(a: &EventRecord, b: &EventRecord) -> Ordering {
    a.sort_order
        .cmp(&b.sort_order)
        .then_with(|| b.id.cmp(&a.id))
}

/// Sort a slice of events into display order.
pub fn sort_events(events: &mut [EventRecord]) {
    events.sort_by(display_order);
}

/// Clamp an arbitrary integer into the valid score range.
pub fn clamp_score(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn clamped_score<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.map(clamp_score).unwrap_or_default())
}

/// Event content without the identity and revision the backend assigns.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EventDraft {
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
    /// Requested position. Absent on create means 0, i.e. first among unordered events.
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub home_team_abbr: Option<String>,
    #[serde(default)]
    pub away_team_abbr: Option<String>,
    #[serde(default)]
    pub home_team_logo: Option<String>,
    #[serde(default)]
    pub away_team_logo: Option<String>,
    #[serde(default, deserialize_with = "clamped_score")]
    pub home_score: u32,
    #[serde(default, deserialize_with = "clamped_score")]
    pub away_score: u32,
    #[serde(default)]
    pub status: Option<MatchPhase>,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[schema(value_type = Option<i64>)]
    pub match_start_timestamp: Option<SystemTime>,
}

impl EventDraft {
    /// Minimal draft carrying only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date: String::new(),
            time: String::new(),
            location: String::new(),
            description: String::new(),
            image: String::new(),
            category: String::new(),
            sort_order: None,
            home_team: None,
            away_team: None,
            home_team_abbr: None,
            away_team_abbr: None,
            home_team_logo: None,
            away_team_logo: None,
            home_score: 0,
            away_score: 0,
            status: None,
            match_start_timestamp: None,
        }
    }

    /// Materialise the draft as a durable record.
    pub fn into_record(self, id: EventId, revision: u64, sort_order: i64) -> EventRecord {
        EventRecord {
            id,
            revision,
            title: self.title,
            date: self.date,
            time: self.time,
            location: self.location,
            description: self.description,
            image: self.image,
            category: self.category,
            sort_order,
            home_team: self.home_team,
            away_team: self.away_team,
            home_team_abbr: self.home_team_abbr,
            away_team_abbr: self.away_team_abbr,
            home_team_logo: self.home_team_logo,
            away_team_logo: self.away_team_logo,
            home_score: self.home_score,
            away_score: self.away_score,
            status: self.status,
            match_start_timestamp: self.match_start_timestamp,
        }
    }
}

impl From<EventRecord> for EventDraft {
    fn from(value: EventRecord) -> Self {
        Self {
            title: value.title,
            date: value.date,
            time: value.time,
            location: value.location,
            description: value.description,
            image: value.image,
            category: value.category,
            sort_order: Some(value.sort_order),
            home_team: value.home_team,
            away_team: value.away_team,
            home_team_abbr: value.home_team_abbr,
            away_team_abbr: value.away_team_abbr,
            home_team_logo: value.home_team_logo,
            away_team_logo: value.away_team_logo,
            home_score: value.home_score,
            away_score: value.away_score,
            status: value.status,
            match_start_timestamp: value.match_start_timestamp,
        }
    }
}

/// Kind of mutation carried by a [`ChangeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One notification of the backend change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    #[schema(value_type = String, format = Uuid)]
    pub id: EventId,
    /// Revision of the record after the change (or of the deletion).
    pub revision: u64,
    /// Full record for inserts and updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventRecord>,
}

impl ChangeRecord {
    pub fn inserted(event: EventRecord) -> Self {
        Self {
            kind: ChangeKind::Insert,
            id: event.id,
            revision: event.revision,
            event: Some(event),
        }
    }

    pub fn updated(event: EventRecord) -> Self {
        Self {
            kind: ChangeKind::Update,
            id: event.id,
            revision: event.revision,
            event: Some(event),
        }
    }

    pub fn deleted(id: EventId, revision: u64) -> Self {
        Self {
            kind: ChangeKind::Delete,
            id,
            revision,
            event: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn with_order(sort_order: i64) -> EventRecord {
        let mut event = EventRecord::sample("e");
        event.sort_order = sort_order;
        event
    }

    #[test]
    fn display_order_uses_sort_order_then_newest_first() {
        let older = with_order(0);
        let newer = with_order(0);
        let first = with_order(-1);
        let last = with_order(3);

        let mut events = vec![last.clone(), older.clone(), first.clone(), newer.clone()];
        sort_events(&mut events);

        let ids: Vec<_> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first.id, newer.id, older.id, last.id]);
    }

    #[test]
    fn flat_record_round_trips_wire_names() {
        let json = r#"{
            "id": "0190b5c2-7a3e-7c4e-8d8e-2b1f6a9d0c11",
            "revision": 4,
            "title": "Final",
            "sort_order": 2,
            "home_team": "Lions",
            "home_score": 2,
            "away_score": -3,
            "status": "second_half",
            "match_start_timestamp": 1700000000000
        }"#;

        let event: EventRecord = serde_json::from_str(json).unwrap();
        assert_eq!(event.status, Some(MatchPhase::SecondHalf));
        assert_eq!(event.away_score, 0);
        assert_eq!(
            event.match_start_timestamp,
            Some(SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_000))
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["match_start_timestamp"], 1_700_000_000_000_i64);
        assert_eq!(value["status"], "second_half");
    }

    #[test]
    fn null_status_reads_as_scheduled() {
        let json = r#"{"id": "0190b5c2-7a3e-7c4e-8d8e-2b1f6a9d0c11", "title": "Talk", "status": null}"#;
        let event: EventRecord = serde_json::from_str(json).unwrap();
        assert_eq!(event.phase(), MatchPhase::Scheduled);
        assert!(event.running_since().is_none());
    }

    #[test]
    fn adjusting_below_zero_clamps() {
        let mut event = EventRecord::sample("e");
        event.adjust_score(Side::Home, 1);
        event.adjust_score(Side::Home, -5);
        assert_eq!(event.home_score, 0);
        event.adjust_score(Side::Away, 2);
        assert_eq!(event.score(Side::Away), 2);
    }
}
