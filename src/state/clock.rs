//! Match clock labels derived from the shared start instant.
//!
//! Nothing ticks server-side: every observer recomputes the label from `(phase, start, now)`.

use std::time::{Duration, SystemTime};

use crate::state::match_phase::MatchPhase;

/// Label shown during the break between halves.
pub const HALFTIME_LABEL: &str = "HT";
/// Label shown once the match has ended.
pub const FULL_TIME_LABEL: &str = "FT";

const HALF_LENGTH_MINUTES: u64 = 45;

/// Render the match clock for `phase`, started at `start`, as seen at `now`.
///
/// Untimed phases ignore `start` and `now`. A start instant in the future renders as `0'`.
pub fn elapsed_label(phase: Option<MatchPhase>, start: Option<SystemTime>, now: SystemTime) -> String {
    let phase = MatchPhase::or_scheduled(phase);
    match phase {
        MatchPhase::Halftime => HALFTIME_LABEL.to_string(),
        MatchPhase::Ended => FULL_TIME_LABEL.to_string(),
        MatchPhase::Scheduled => String::new(),
        MatchPhase::FirstHalf | MatchPhase::SecondHalf => {
            let Some(start) = start else {
                return String::new();
            };

            let offset = if phase == MatchPhase::FirstHalf {
                0
            } else {
                HALF_LENGTH_MINUTES
            };
            let limit = offset + HALF_LENGTH_MINUTES;
            let minutes = offset + elapsed_minutes(start, now);

            if minutes > limit {
                format!("{limit}+{}'", minutes - limit)
            } else {
                format!("{minutes}'")
            }
        }
    }
}

/// Whole minutes elapsed since `start`, clamped at zero.
fn elapsed_minutes(start: SystemTime, now: SystemTime) -> u64 {
    now.duration_since(start)
        .unwrap_or(Duration::ZERO)
        .as_secs()
        / 60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    #[test]
    fn first_half_counts_minutes_and_stoppage() {
        let phase = Some(MatchPhase::FirstHalf);
        assert_eq!(elapsed_label(phase, Some(t0()), t0() + minutes(10)), "10'");
        assert_eq!(elapsed_label(phase, Some(t0()), t0() + minutes(45)), "45'");
        assert_eq!(elapsed_label(phase, Some(t0()), t0() + minutes(46)), "45+1'");
        assert_eq!(
            elapsed_label(phase, Some(t0()), t0() + minutes(10) + Duration::from_secs(59)),
            "10'"
        );
    }

    #[test]
    fn second_half_starts_at_forty_five() {
        let phase = Some(MatchPhase::SecondHalf);
        assert_eq!(elapsed_label(phase, Some(t0()), t0()), "45'");
        assert_eq!(elapsed_label(phase, Some(t0()), t0() + minutes(50)), "90+5'");
        assert_eq!(elapsed_label(phase, Some(t0()), t0() + minutes(45)), "90'");
    }

    #[test]
    fn untimed_phases_ignore_the_clock() {
        for now in [t0(), t0() + minutes(7), t0() + minutes(300)] {
            for start in [None, Some(t0()), Some(t0() + minutes(90))] {
                assert_eq!(elapsed_label(Some(MatchPhase::Halftime), start, now), "HT");
                assert_eq!(elapsed_label(Some(MatchPhase::Ended), start, now), "FT");
                assert_eq!(elapsed_label(Some(MatchPhase::Scheduled), start, now), "");
                assert_eq!(elapsed_label(None, start, now), "");
            }
        }
    }

    #[test]
    fn future_start_clamps_to_zero() {
        let label = elapsed_label(Some(MatchPhase::FirstHalf), Some(t0() + minutes(3)), t0());
        assert_eq!(label, "0'");
    }

    #[test]
    fn missing_start_shows_no_timer() {
        assert_eq!(elapsed_label(Some(MatchPhase::FirstHalf), None, t0()), "");
    }
}
