//! Periodic match clock recomputation for one event.

use std::time::{Duration, SystemTime};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::trace;

use crate::{
    dao::models::{EventId, EventRecord},
    state::clock::elapsed_label,
};

/// How often the label is recomputed.
pub const DEFAULT_TICK: Duration = Duration::from_secs(10);

/// Publishes the elapsed label of one event, recomputed every period and whenever the event
/// changes. Dropping the ticker stops it.
pub struct MatchClockTicker {
    label: watch::Receiver<String>,
    task: JoinHandle<()>,
}

impl MatchClockTicker {
    /// Follow event `id` in `events`, recomputing every `period`.
    pub fn start(events: watch::Receiver<Vec<EventRecord>>, id: EventId, period: Duration) -> Self {
        // Wall time follows the runtime clock from here on so paused-time tests see it move.
        let anchor = (SystemTime::now(), Instant::now());
        let initial = label_for(&events.borrow(), id, anchor.0);
        let (tx, label) = watch::channel(initial);
        let task = tokio::spawn(run(events, id, period, anchor, tx));
        Self { label, task }
    }

    /// Watch the label.
    pub fn label(&self) -> watch::Receiver<String> {
        self.label.clone()
    }

    /// Label as of the last recomputation.
    pub fn current(&self) -> String {
        self.label.borrow().clone()
    }
}

impl Drop for MatchClockTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn label_for(events: &[EventRecord], id: EventId, now: SystemTime) -> String {
    events
        .iter()
        .find(|event| event.id == id)
        .map(|event| elapsed_label(event.status, event.running_since(), now))
        .unwrap_or_default()
}

async fn run(
    mut events: watch::Receiver<Vec<EventRecord>>,
    id: EventId,
    period: Duration,
    (wall_anchor, anchor): (SystemTime, Instant),
    label: watch::Sender<String>,
) {
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticks.tick() => {}
            changed = events.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let now = wall_anchor + anchor.elapsed();
        let next = label_for(&events.borrow_and_update(), id, now);
        label.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            trace!(id = %id, label = %next, "match clock");
            *current = next;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;
    use crate::state::{clock::HALFTIME_LABEL, match_phase::MatchPhase};

    fn kicked_off(ago: Duration) -> EventRecord {
        let mut event = EventRecord::sample("derby");
        event.status = Some(MatchPhase::FirstHalf);
        event.match_start_timestamp = Some(SystemTime::now() - ago);
        event
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn label_advances_with_the_clock() {
        let event = kicked_off(Duration::from_secs(10 * 60 + 30));
        let (_tx, rx) = watch::channel(vec![event.clone()]);
        let ticker = MatchClockTicker::start(rx, event.id, DEFAULT_TICK);
        assert_eq!(ticker.current(), "10'");
        settle().await;

        advance(Duration::from_secs(40)).await;
        settle().await;
        assert_eq!(ticker.current(), "11'");
    }

    #[tokio::test(start_paused = true)]
    async fn phase_changes_are_picked_up_immediately() {
        let mut event = kicked_off(Duration::from_secs(60));
        let (tx, rx) = watch::channel(vec![event.clone()]);
        let ticker = MatchClockTicker::start(rx, event.id, DEFAULT_TICK);
        settle().await;

        event.status = Some(MatchPhase::Halftime);
        tx.send_replace(vec![event]);
        settle().await;
        assert_eq!(ticker.current(), HALFTIME_LABEL);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_event_has_no_label() {
        let (_tx, rx) = watch::channel(Vec::new());
        let ticker = MatchClockTicker::start(rx, uuid::Uuid::now_v7(), DEFAULT_TICK);
        assert_eq!(ticker.current(), "");
    }
}
