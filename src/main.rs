//! matchday-back binary entrypoint wiring REST, SSE and the configured event store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use matchday_back::{
    config::{AppConfig, StorageKind},
    dao::{
        event_store::{EventStore, memory::MemoryEventStore},
        storage::StorageError,
    },
    routes,
    services::{event_service, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(&config);

    spawn_storage(app_state.clone(), &config)?;
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Start the storage supervisor for the configured backend. The server stays degraded until
/// the first connection succeeds.
fn spawn_storage(state: SharedState, config: &AppConfig) -> anyhow::Result<()> {
    match config.storage {
        StorageKind::Memory => {
            // One store for the whole process: reconnecting must not lose its contents.
            let store = MemoryEventStore::new(config.feed_capacity);
            let seeds = Arc::new(config.seed_events.clone());
            tokio::spawn(storage_supervisor::run(state, move || {
                let store: Arc<dyn EventStore> = Arc::new(store.clone());
                let seeds = seeds.clone();
                async move {
                    if let Err(err) = event_service::seed_events(&store, &seeds).await {
                        warn!(error = %err, "failed to seed events");
                    }
                    Ok::<_, StorageError>(store)
                }
            }));
            Ok(())
        }
        StorageKind::Couch => spawn_couch(state),
    }
}

#[cfg(feature = "couch-store")]
fn spawn_couch(state: SharedState) -> anyhow::Result<()> {
    use matchday_back::dao::event_store::couchdb::{CouchConfig, CouchEventStore};

    let couch = CouchConfig::from_env().context("reading CouchDB configuration")?;
    tokio::spawn(storage_supervisor::run(state, move || {
        let couch = couch.clone();
        async move {
            let store = CouchEventStore::connect(couch).await?;
            Ok::<Arc<dyn EventStore>, StorageError>(Arc::new(store))
        }
    }));
    Ok(())
}

#[cfg(not(feature = "couch-store"))]
fn spawn_couch(_state: SharedState) -> anyhow::Result<()> {
    anyhow::bail!("storage `couch` requested but the `couch-store` feature is disabled")
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
