use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dao::models::EventRecord;

/// Segment of a match lifecycle. An event without a phase displays as [`MatchPhase::Scheduled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Kick-off has not happened yet.
    Scheduled,
    /// First half is being played; the match clock runs from the start instant.
    FirstHalf,
    /// Break between halves.
    Halftime,
    /// Second half is being played; the match clock runs from 45'.
    SecondHalf,
    /// Full time.
    Ended,
}

impl MatchPhase {
    /// Reference operator flow, in order.
    pub const FLOW: [MatchPhase; 5] = [
        MatchPhase::Scheduled,
        MatchPhase::FirstHalf,
        MatchPhase::Halftime,
        MatchPhase::SecondHalf,
        MatchPhase::Ended,
    ];

    /// Resolve an optional stored phase, treating unset as scheduled.
    pub fn or_scheduled(phase: Option<MatchPhase>) -> MatchPhase {
        phase.unwrap_or(MatchPhase::Scheduled)
    }

    /// Whether the match clock runs in this phase.
    pub fn is_timed(self) -> bool {
        matches!(self, MatchPhase::FirstHalf | MatchPhase::SecondHalf)
    }

    fn flow_index(self) -> usize {
        Self::FLOW
            .iter()
            .position(|phase| *phase == self)
            .unwrap_or_default()
    }
}

/// How a requested phase relates to the reference flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseDirection {
    /// Moving along the reference flow (possibly skipping steps).
    Forward,
    /// Re-entering the current phase.
    Repeat,
    /// Operator correction going back in the flow.
    Backward,
}

/// A validated phase change, ready to be applied to an event snapshot.
///
/// Every phase may follow every other phase: the control room is an operator surface, so
/// corrections such as `ended -> first_half` are accepted. The only rule is that entering a
/// timed phase always carries a fresh start instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTransition {
    /// Phase the event displayed before the change.
    pub from: MatchPhase,
    /// Phase the event will display after the change.
    pub to: MatchPhase,
    /// Start instant stamped when `to` is timed.
    pub started_at: Option<SystemTime>,
    /// Position of the change relative to the reference flow.
    pub direction: PhaseDirection,
}

impl PhaseTransition {
    /// Plan the transition of `event` into `to` at instant `now`.
    pub fn plan(event: &EventRecord, to: MatchPhase, now: SystemTime) -> Self {
        let from = MatchPhase::or_scheduled(event.status);
        let direction = match from.flow_index().cmp(&to.flow_index()) {
            std::cmp::Ordering::Less => PhaseDirection::Forward,
            std::cmp::Ordering::Equal => PhaseDirection::Repeat,
            std::cmp::Ordering::Greater => PhaseDirection::Backward,
        };

        Self {
            from,
            to,
            started_at: to.is_timed().then_some(now),
            direction,
        }
    }

    /// Apply the transition to a snapshot. The previous start instant is left untouched when
    /// entering an untimed phase; consumers ignore it there.
    pub fn apply(&self, event: &mut EventRecord) {
        event.status = Some(self.to);
        if let Some(started_at) = self.started_at {
            event.match_start_timestamp = Some(started_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn transition(event: &mut EventRecord, to: MatchPhase, now: SystemTime) -> PhaseTransition {
        let plan = PhaseTransition::plan(event, to, now);
        plan.apply(event);
        plan
    }

    #[test]
    fn unset_phase_is_scheduled() {
        assert_eq!(MatchPhase::or_scheduled(None), MatchPhase::Scheduled);
        assert_eq!(
            MatchPhase::or_scheduled(Some(MatchPhase::Halftime)),
            MatchPhase::Halftime
        );
    }

    #[test]
    fn reference_flow_stamps_timed_phases() {
        let mut event = EventRecord::sample("Derby");

        transition(&mut event, MatchPhase::FirstHalf, at(1_000));
        assert_eq!(event.status, Some(MatchPhase::FirstHalf));
        assert_eq!(event.match_start_timestamp, Some(at(1_000)));

        let plan = transition(&mut event, MatchPhase::Halftime, at(4_000));
        assert_eq!(plan.direction, PhaseDirection::Forward);
        assert_eq!(plan.started_at, None);
        assert_eq!(event.match_start_timestamp, Some(at(1_000)));

        transition(&mut event, MatchPhase::SecondHalf, at(5_000));
        assert_eq!(event.match_start_timestamp, Some(at(5_000)));

        transition(&mut event, MatchPhase::Ended, at(8_000));
        assert_eq!(event.status, Some(MatchPhase::Ended));
    }

    #[test]
    fn backward_correction_is_allowed_and_restamps() {
        let mut event = EventRecord::sample("Derby");
        transition(&mut event, MatchPhase::SecondHalf, at(10));
        transition(&mut event, MatchPhase::Ended, at(20));

        let plan = transition(&mut event, MatchPhase::FirstHalf, at(30));
        assert_eq!(plan.direction, PhaseDirection::Backward);
        assert_eq!(event.status, Some(MatchPhase::FirstHalf));
        assert_eq!(event.match_start_timestamp, Some(at(30)));
    }

    #[test]
    fn reentering_a_timed_phase_overwrites_the_start() {
        let mut event = EventRecord::sample("Derby");
        transition(&mut event, MatchPhase::FirstHalf, at(10));
        let plan = transition(&mut event, MatchPhase::FirstHalf, at(99));
        assert_eq!(plan.direction, PhaseDirection::Repeat);
        assert_eq!(event.match_start_timestamp, Some(at(99)));
    }
}
