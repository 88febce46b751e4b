pub mod clock;
pub mod match_phase;
pub mod session;
mod sse;

use std::sync::Arc;

use tokio::{
    sync::{Mutex, RwLock, watch},
    task::JoinHandle,
};

use crate::{
    config::AppConfig,
    dao::event_store::EventStore,
    error::ServiceError,
    state::session::EditorRegistry,
};

pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

/// Central application state: the installed event store, degraded flag, SSE hub and editors.
pub struct AppState {
    event_store: RwLock<Option<Arc<dyn EventStore>>>,
    degraded: watch::Sender<bool>,
    sse: SseHub,
    editors: Arc<EditorRegistry>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: &AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let editors = EditorRegistry::new();
        for editor in &config.editors {
            editors.grant(editor.token.clone(), editor.name.clone());
        }

        Arc::new(Self {
            event_store: RwLock::new(None),
            degraded: degraded_tx,
            sse: SseHub::new(config.feed_capacity),
            editors: Arc::new(editors),
            relay: Mutex::new(None),
        })
    }

    /// Obtain a handle to the current event store, if one is installed.
    pub async fn event_store(&self) -> Option<Arc<dyn EventStore>> {
        let guard = self.event_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current event store, or [`ServiceError::Degraded`] while none is usable.
    pub async fn require_event_store(&self) -> Result<Arc<dyn EventStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.event_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new event store implementation and leave degraded mode.
    pub async fn set_event_store(&self, store: Arc<dyn EventStore>) {
        {
            let mut guard = self.event_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Registry of valid editor tokens.
    pub fn editors(&self) -> &Arc<EditorRegistry> {
        &self.editors
    }

    /// Replace the task relaying store changes to SSE clients, stopping the previous one.
    pub async fn replace_relay(&self, handle: JoinHandle<()>) {
        let mut guard = self.relay.lock().await;
        if let Some(previous) = guard.replace(handle) {
            previous.abort();
        }
    }
}
