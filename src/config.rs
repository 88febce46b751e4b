//! Application-level configuration loading: editor tokens, storage backend and seed events.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::{event_store::memory::DEFAULT_FEED_CAPACITY, models::EventDraft};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MATCHDAY_BACK_CONFIG_PATH";

/// Which durable backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// In-process store; contents are lost on restart.
    #[default]
    Memory,
    /// CouchDB, configured through the `COUCH_*` environment variables.
    Couch,
}

/// Editor token entry from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditorEntry {
    pub token: String,
    pub name: String,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub editors: Vec<EditorEntry>,
    pub storage: StorageKind,
    /// Buffered change notifications per SSE subscriber before it must resync.
    pub feed_capacity: usize,
    /// Events inserted into an empty memory store at startup.
    pub seed_events: Vec<EventDraft>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        editors = app_config.editors.len(),
                        storage = ?app_config.storage,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON configuration document.
    pub fn parse(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            editors: Vec::new(),
            storage: StorageKind::default(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
            seed_events: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    editors: Vec<EditorEntry>,
    #[serde(default)]
    storage: StorageKind,
    #[serde(default)]
    feed_capacity: Option<usize>,
    #[serde(default)]
    seed_events: Vec<EventDraft>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            editors: value.editors,
            storage: value.storage,
            feed_capacity: value
                .feed_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_FEED_CAPACITY),
            seed_events: value.seed_events,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let config = AppConfig::parse(
            r#"{
                "editors": [{"token": "abc", "name": "desk"}],
                "storage": "couch",
                "feed_capacity": 8,
                "seed_events": [{"title": "Derby", "home_team": "Reds", "away_team": "Blues"}]
            }"#,
        )
        .unwrap();

        assert_eq!(config.storage, StorageKind::Couch);
        assert_eq!(config.feed_capacity, 8);
        assert_eq!(config.editors[0].name, "desk");
        assert_eq!(config.seed_events[0].home_team.as_deref(), Some("Reds"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config = AppConfig::parse(r#"{"feed_capacity": 0}"#).unwrap();
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.feed_capacity, DEFAULT_FEED_CAPACITY);
        assert!(config.editors.is_empty());
    }
}
