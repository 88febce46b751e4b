//! Terminal scoreboard following a matchday-back server: keeps a live replica of the events,
//! ticks the match clock of one fixture and reveals its goals with a delay.
//!
//! Configured through `MATCHDAY_BACK_URL` (default `http://localhost:8080`), the optional
//! `MATCHDAY_EDITOR_TOKEN` and the optional `MATCHDAY_EVENT_ID` of the fixture to follow.

use std::{env, sync::Arc};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use matchday_back::{
    dao::{
        event_store::remote::{RemoteConfig, RemoteEventStore},
        models::{EventId, EventRecord},
    },
    live::{
        ChangeFeed, LiveConfig, LiveEvents, MatchClockTicker, ScoreRevealAnimator,
        ticker::DEFAULT_TICK,
    },
};

const DEFAULT_URL: &str = "http://localhost:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let base_url = env::var("MATCHDAY_BACK_URL").unwrap_or_else(|_| DEFAULT_URL.into());
    let mut remote_config = RemoteConfig::new(base_url);
    if let Ok(token) = env::var("MATCHDAY_EDITOR_TOKEN") {
        remote_config = remote_config.with_token(token);
    }
    let wanted = env::var("MATCHDAY_EVENT_ID")
        .ok()
        .map(|raw| Uuid::parse_str(&raw))
        .transpose()
        .context("parsing MATCHDAY_EVENT_ID")?;

    let remote = RemoteEventStore::new(remote_config).context("building HTTP client")?;
    let events = LiveEvents::new(
        Arc::new(remote.clone()),
        Arc::new(remote),
        LiveConfig::default(),
    );

    let _changes = events.subscribe(|change| {
        info!(id = %change.id, kind = ?change.kind, revision = change.revision, "change applied");
    });

    let listing = events.list().await;
    if let Some(err) = &listing.error {
        warn!(error = %err, "initial listing failed; waiting for the change feed");
    }
    let feed = ChangeFeed::start(&events);
    let mut feed_status = feed.status();

    let Some(id) = pick_fixture(&listing.events, wanted) else {
        info!(count = listing.events.len(), "no fixture to follow; exiting");
        return Ok(());
    };
    info!(id = %id, "following fixture");

    let mut snapshots = events.watch();
    let ticker = MatchClockTicker::start(events.watch(), id, DEFAULT_TICK);
    let mut clock = ticker.label();
    let mut animator = ScoreRevealAnimator::default();
    let mut scoreboard = animator.view();

    if let Some(event) = events.get(id).await {
        animator.observe(&event);
    }

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = snapshots
                    .borrow_and_update()
                    .iter()
                    .find(|event| event.id == id)
                    .cloned();
                match current {
                    Some(event) => animator.observe(&event),
                    None => {
                        info!(id = %id, "fixture deleted; exiting");
                        break;
                    }
                }
            }
            Ok(()) = scoreboard.changed() => {
                let view = *scoreboard.borrow_and_update();
                info!(home = view.home, away = view.away, goal = ?view.goal, clock = %ticker.current(), "scoreboard");
            }
            Ok(()) = clock.changed() => {
                let label = clock.borrow_and_update().clone();
                info!(clock = %label, "match clock");
            }
            Ok(()) = feed_status.changed() => {
                let status = feed_status.borrow_and_update().clone();
                if status.is_stale() {
                    warn!(?status, "showing last known state");
                } else {
                    info!("live");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

/// The requested fixture, or else the first event with teams.
fn pick_fixture(events: &[EventRecord], wanted: Option<EventId>) -> Option<EventId> {
    match wanted {
        Some(id) => Some(id),
        None => events.iter().find(|event| event.is_match()).map(|event| event.id),
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
