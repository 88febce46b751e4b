use std::time::Duration;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);
const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Runtime configuration describing how to reach the CouchDB event database.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub credentials: Option<(String, String)>,
    /// Heartbeat requested on the continuous `_changes` feed; a silent feed is a dead feed.
    pub heartbeat: Duration,
    /// How many times a write is retried after a `409 Conflict` from a concurrent editor.
    pub conflict_retries: u32,
}

impl CouchConfig {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            credentials: None,
            heartbeat: DEFAULT_HEARTBEAT,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    /// Attach basic-auth credentials to the configuration.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Build a configuration from `COUCH_BASE_URL`, `COUCH_DB`, and the optional
    /// `COUCH_USERNAME`/`COUCH_PASSWORD` pair and `COUCH_HEARTBEAT_MS`.
    pub fn from_env() -> CouchResult<Self> {
        let base_url =
            std::env::var("COUCH_BASE_URL").map_err(|_| CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL",
            })?;
        let database = std::env::var("COUCH_DB")
            .map_err(|_| CouchDaoError::MissingEnvVar { var: "COUCH_DB" })?;

        let mut config = Self::new(base_url, database);

        if let (Ok(username), Ok(password)) = (
            std::env::var("COUCH_USERNAME"),
            std::env::var("COUCH_PASSWORD"),
        ) {
            config = config.with_credentials(username, password);
        }

        if let Some(millis) = std::env::var("COUCH_HEARTBEAT_MS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            config.heartbeat = Duration::from_millis(millis.max(1_000));
        }

        Ok(config)
    }

    /// URL of the database itself.
    pub fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }
}
