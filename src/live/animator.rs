//! Presentation-side score reveal: increases during play show up after a delay, together with
//! a short-lived goal indicator; corrections show up at once.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{sync::watch, task::JoinSet, time::sleep};
use tracing::debug;

use crate::dao::models::{EventRecord, Side};

/// Delay before an increase during play becomes visible.
pub const DEFAULT_REVEAL_DELAY: Duration = Duration::from_secs(5);
/// How long the goal indicator stays up by default.
pub const DEFAULT_INDICATOR_DURATION: Duration = Duration::from_secs(3);

/// Timers of a [`ScoreRevealAnimator`].
#[derive(Debug, Clone, Copy)]
pub struct RevealTimings {
    /// Time between receiving an increase and showing it.
    pub reveal_delay: Duration,
    /// How long the goal indicator stays up.
    pub indicator: Duration,
}

impl Default for RevealTimings {
    fn default() -> Self {
        Self {
            reveal_delay: DEFAULT_REVEAL_DELAY,
            indicator: DEFAULT_INDICATOR_DURATION,
        }
    }
}

/// What a viewer currently shows for one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreboardView {
    /// Home score on screen.
    pub home: u32,
    /// Away score on screen.
    pub away: u32,
    /// Side whose goal indicator is visible.
    pub goal: Option<Side>,
}

impl ScoreboardView {
    fn score(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }

    fn set_score(&mut self, side: Side, value: u32) {
        match side {
            Side::Home => self.home = value,
            Side::Away => self.away = value,
        }
    }
}

struct Shared {
    view: watch::Sender<ScoreboardView>,
    /// Latest known score; pending reveals never show more than this.
    truth: Mutex<(u32, u32)>,
    /// Bumped by each indicator so only the most recent one clears it.
    indicator_generation: Mutex<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn truth(&self, side: Side) -> u32 {
        let truth = lock(&self.truth);
        match side {
            Side::Home => truth.0,
            Side::Away => truth.1,
        }
    }

    /// Show `target` (capped at the latest truth) for `side`. Returns the indicator generation
    /// when a goal was raised.
    fn reveal(&self, side: Side, target: u32) -> Option<u64> {
        let value = target.min(self.truth(side));
        let mut generation = None;
        self.view.send_if_modified(|view| {
            if value <= view.score(side) {
                return false;
            }
            view.set_score(side, value);
            view.goal = Some(side);
            let mut counter = lock(&self.indicator_generation);
            *counter += 1;
            generation = Some(*counter);
            true
        });
        generation
    }

    fn clear_indicator(&self, generation: u64) {
        if *lock(&self.indicator_generation) != generation {
            return;
        }
        self.view.send_if_modified(|view| view.goal.take().is_some());
    }
}

/// Score reveal state for one event on one viewer. Dropping it cancels every pending timer.
pub struct ScoreRevealAnimator {
    timings: RevealTimings,
    shared: Arc<Shared>,
    pending: JoinSet<()>,
    initialized: bool,
}

impl ScoreRevealAnimator {
    /// Animator showing 0-0 until the first snapshot arrives.
    pub fn new(timings: RevealTimings) -> Self {
        let (view, _) = watch::channel(ScoreboardView::default());
        Self {
            timings,
            shared: Arc::new(Shared {
                view,
                truth: Mutex::new((0, 0)),
                indicator_generation: Mutex::new(0),
            }),
            pending: JoinSet::new(),
            initialized: false,
        }
    }

    /// Watch what the viewer should show.
    pub fn view(&self) -> watch::Receiver<ScoreboardView> {
        self.shared.view.subscribe()
    }

    /// What the viewer shows right now.
    pub fn current(&self) -> ScoreboardView {
        *self.shared.view.borrow()
    }

    /// Number of reveals and indicator timers still scheduled.
    pub fn pending(&mut self) -> usize {
        while self.pending.try_join_next().is_some() {}
        self.pending.len()
    }

    /// Feed the latest snapshot of the event. Must be called from within a Tokio runtime.
    pub fn observe(&mut self, event: &EventRecord) {
        while self.pending.try_join_next().is_some() {}
        *lock(&self.shared.truth) = (event.home_score, event.away_score);

        if !self.initialized {
            self.initialized = true;
            self.shared.view.send_modify(|view| {
                view.home = event.home_score;
                view.away = event.away_score;
            });
            return;
        }

        let timed = event.phase().is_timed();
        for side in [Side::Home, Side::Away] {
            let incoming = event.score(side);
            let shown = self.current().score(side);
            if incoming == shown {
                continue;
            }

            if incoming < shown || !timed {
                debug!(?side, from = shown, to = incoming, "score applied immediately");
                self.shared.view.send_modify(|view| view.set_score(side, incoming));
                continue;
            }

            debug!(?side, from = shown, to = incoming, "score reveal scheduled");
            let shared = self.shared.clone();
            let timings = self.timings;
            self.pending.spawn(async move {
                sleep(timings.reveal_delay).await;
                if let Some(generation) = shared.reveal(side, incoming) {
                    sleep(timings.indicator).await;
                    shared.clear_indicator(generation);
                }
            });
        }
    }
}

impl Default for ScoreRevealAnimator {
    fn default() -> Self {
        Self::new(RevealTimings::default())
    }
}

impl Drop for ScoreRevealAnimator {
    fn drop(&mut self) {
        self.pending.abort_all();
    }
}
