//! Request payloads of the event editing API.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{EventDraft, EventRecord, Side, clamp_score},
    dto::validation::validate_team_abbr,
    state::match_phase::MatchPhase,
};

/// Full event content submitted by an editor on create and replace.
///
/// Scores accept any integer and are clamped at zero. `sort_order` is only honoured on create;
/// a replace keeps the stored position.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct EventInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    #[validate(length(max = 64))]
    pub category: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_team_abbr"))]
    pub home_team_abbr: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_team_abbr"))]
    pub away_team_abbr: Option<String>,
    #[serde(default)]
    pub home_team_logo: Option<String>,
    #[serde(default)]
    pub away_team_logo: Option<String>,
    #[serde(default)]
    pub home_score: i64,
    #[serde(default)]
    pub away_score: i64,
    #[serde(default)]
    pub status: Option<MatchPhase>,
    /// Start of the running half, epoch milliseconds.
    #[serde(default)]
    #[validate(range(min = 0))]
    pub match_start_timestamp: Option<i64>,
}

impl From<EventInput> for EventDraft {
    fn from(value: EventInput) -> Self {
        Self {
            title: value.title,
            date: value.date,
            time: value.time,
            location: value.location,
            description: value.description,
            image: value.image,
            category: value.category,
            sort_order: value.sort_order,
            home_team: non_blank(value.home_team),
            away_team: non_blank(value.away_team),
            home_team_abbr: non_blank(value.home_team_abbr),
            away_team_abbr: non_blank(value.away_team_abbr),
            home_team_logo: non_blank(value.home_team_logo),
            away_team_logo: non_blank(value.away_team_logo),
            home_score: clamp_score(value.home_score),
            away_score: clamp_score(value.away_score),
            status: value.status,
            match_start_timestamp: value
                .match_start_timestamp
                .and_then(|millis| u64::try_from(millis).ok())
                .map(|millis| SystemTime::UNIX_EPOCH + Duration::from_millis(millis)),
        }
    }
}

/// Empty form fields mean "not a match side".
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

/// Request to move an event to a new display position.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SortOrderRequest {
    #[validate(range(min = 0))]
    pub sort_order: i64,
}

/// Request to move a match into another phase.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PhaseRequest {
    pub phase: MatchPhase,
}

/// Request to shift one side's score.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ScoreAdjustmentRequest {
    pub side: Side,
    #[validate(range(min = -99, max = 99))]
    pub delta: i64,
}

/// Response of the phase endpoint: the stored record plus the label computed server-side.
#[derive(Debug, Serialize, ToSchema)]
pub struct PhaseChangeResponse {
    pub event: EventRecord,
    /// Clock label at the instant of the change (`"0'"`, `"HT"`, ...).
    pub clock: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_converts_with_clamped_scores_and_trimmed_teams() {
        let input: EventInput = serde_json::from_str(
            r#"{
                "title": "Derby",
                "home_team": "Reds",
                "away_team": "  ",
                "home_score": -2,
                "away_score": 3,
                "status": "second_half",
                "match_start_timestamp": 1700000000000
            }"#,
        )
        .unwrap();
        assert!(input.validate().is_ok());

        let draft = EventDraft::from(input);
        assert_eq!(draft.home_score, 0);
        assert_eq!(draft.away_score, 3);
        assert_eq!(draft.away_team, None);
        assert_eq!(draft.status, Some(MatchPhase::SecondHalf));
        assert_eq!(
            draft.match_start_timestamp,
            Some(SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_000))
        );
    }

    #[test]
    fn empty_titles_and_long_abbreviations_fail_validation() {
        let input: EventInput =
            serde_json::from_str(r#"{"title": "", "home_team_abbr": "LONG"}"#).unwrap();
        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("home_team_abbr"));
    }
}
