use std::{sync::Arc, time::Duration};

use eventsource_stream::Eventsource;
use futures::{StreamExt, future::BoxFuture};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, warn};

use crate::{
    dao::{
        event_store::{ChangeStream, EventStore},
        models::{ChangeRecord, EventDraft, EventId, EventRecord},
        storage::{StorageError, StorageResult},
    },
    dto::{health::HealthResponse, sse::SystemStatus},
    services::sse_events::{
        EVENT_CREATED, EVENT_DELETED, EVENT_UPDATED, FEED_RESYNC, SYSTEM_STATUS,
    },
    state::session::SessionAuthority,
};

use super::error::{RemoteResult, RemoteStoreError};

const EDITOR_TOKEN_HEADER: &str = "x-editor-token";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the remote server lives and which editor token to present.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Editor token; viewers leave it unset and only read.
    pub token: Option<String>,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// [`EventStore`] backed by a matchday server over HTTP and SSE.
///
/// `delete_event` cannot tell whether the event existed, since the server answers 204 either
/// way; it reports `true`.
#[derive(Clone)]
pub struct RemoteEventStore {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl RemoteEventStore {
    pub fn new(config: RemoteConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|source| RemoteStoreError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url),
            token: config.token.map(Arc::from),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.header(EDITOR_TOKEN_HEADER, token.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, path: &str, builder: RequestBuilder) -> RemoteResult<Response> {
        builder
            .send()
            .await
            .map_err(|source| RemoteStoreError::RequestSend {
                path: path.to_string(),
                source,
            })
    }

    /// Send a request and decode its JSON body. A 404 maps to `None`.
    async fn fetch_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> RemoteResult<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = self.send(path, builder).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED => Err(RemoteStoreError::Unauthorized {
                path: path.to_string(),
            }),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|source| RemoteStoreError::DecodeResponse {
                    path: path.to_string(),
                    source,
                }),
            other => Err(RemoteStoreError::RequestStatus {
                path: path.to_string(),
                status: other,
            }),
        }
    }

    async fn probe(&self) -> RemoteResult<HealthResponse> {
        const PATH: &str = "/healthcheck";
        self.fetch_json::<HealthResponse, ()>(Method::GET, PATH, None)
            .await?
            .ok_or_else(|| RemoteStoreError::RequestStatus {
                path: PATH.to_string(),
                status: StatusCode::NOT_FOUND,
            })
    }
}

fn event_path(id: EventId) -> String {
    format!("/events/{id}")
}

fn admin_path(id: EventId) -> String {
    format!("/admin/events/{id}")
}

/// Map one SSE message to a feed item. `None` means "not a change, keep reading".
fn decode_message(name: &str, data: &str) -> Option<StorageResult<ChangeRecord>> {
    match name {
        EVENT_CREATED | EVENT_UPDATED | EVENT_DELETED => {
            match serde_json::from_str::<ChangeRecord>(data) {
                Ok(change) => Some(Ok(change)),
                Err(err) => {
                    warn!(event = name, error = %err, "skipping malformed change message");
                    None
                }
            }
        }
        FEED_RESYNC => Some(Err(StorageError::disconnected(
            "server requested a resync",
        ))),
        SYSTEM_STATUS => {
            let degraded = serde_json::from_str::<SystemStatus>(data)
                .map(|status| status.degraded)
                .unwrap_or(false);
            degraded.then(|| Err(StorageError::disconnected("server storage is degraded")))
        }
        _ => None,
    }
}

impl EventStore for RemoteEventStore {
    fn list_events(&self) -> BoxFuture<'static, StorageResult<Vec<EventRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let events = store
                .fetch_json::<Vec<EventRecord>, ()>(Method::GET, "/events", None)
                .await?;
            Ok(events.unwrap_or_default())
        })
    }

    fn find_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .fetch_json::<EventRecord, ()>(Method::GET, &event_path(id), None)
                .await?)
        })
    }

    fn insert_event(&self, draft: EventDraft) -> BoxFuture<'static, StorageResult<EventRecord>> {
        let store = self.clone();
        Box::pin(async move {
            const PATH: &str = "/admin/events";
            let created = store
                .fetch_json::<EventRecord, _>(Method::POST, PATH, Some(&draft))
                .await?;
            created.ok_or_else(|| {
                RemoteStoreError::RequestStatus {
                    path: PATH.to_string(),
                    status: StatusCode::NOT_FOUND,
                }
                .into()
            })
        })
    }

    fn replace_event(
        &self,
        id: EventId,
        draft: EventDraft,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .fetch_json::<EventRecord, _>(Method::PUT, &admin_path(id), Some(&draft))
                .await?)
        })
    }

    fn set_sort_order(
        &self,
        id: EventId,
        sort_order: i64,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let path = format!("{}/sort-order", admin_path(id));
            let body = json!({ "sort_order": sort_order });
            Ok(store
                .fetch_json::<EventRecord, _>(Method::PUT, &path, Some(&body))
                .await?)
        })
    }

    fn delete_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let path = admin_path(id);
            let response = store
                .send(&path, store.request(Method::DELETE, &path))
                .await?;
            match response.status() {
                status if status.is_success() => Ok(true),
                StatusCode::NOT_FOUND => Ok(false),
                StatusCode::UNAUTHORIZED => {
                    Err(RemoteStoreError::Unauthorized { path }.into())
                }
                other => Err(RemoteStoreError::RequestStatus {
                    path,
                    status: other,
                }
                .into()),
            }
        })
    }

    fn changes(&self) -> BoxFuture<'static, StorageResult<ChangeStream>> {
        let store = self.clone();
        Box::pin(async move {
            const PATH: &str = "/sse/events";
            let response = store.send(PATH, store.request(Method::GET, PATH)).await?;
            if !response.status().is_success() {
                return Err(RemoteStoreError::RequestStatus {
                    path: PATH.to_string(),
                    status: response.status(),
                }
                .into());
            }

            let mut events = response.bytes_stream().eventsource();
            let stream = async_stream::stream! {
                loop {
                    match events.next().await {
                        Some(Ok(message)) => {
                            debug!(event = %message.event, "remote feed message");
                            match decode_message(&message.event, &message.data) {
                                Some(Ok(change)) => yield Ok(change),
                                Some(Err(err)) => {
                                    yield Err(err);
                                    break;
                                }
                                None => {}
                            }
                        }
                        Some(Err(err)) => {
                            yield Err(StorageError::from(RemoteStoreError::Stream { message: err.to_string() }));
                            break;
                        }
                        None => {
                            yield Err(StorageError::disconnected("server closed the event stream"));
                            break;
                        }
                    }
                }
            };

            Ok(Box::pin(stream) as ChangeStream)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let health = store.probe().await?;
            if health.status == "ok" {
                Ok(())
            } else {
                Err(StorageError::disconnected(format!(
                    "server reports status `{}`",
                    health.status
                )))
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.health_check()
    }
}

impl SessionAuthority for RemoteEventStore {
    fn check(&self) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            if store.token.is_none() {
                return Ok(false);
            }
            const PATH: &str = "/session";
            let response = store.send(PATH, store.request(Method::GET, PATH)).await?;
            match response.status() {
                status if status.is_success() => Ok(true),
                StatusCode::UNAUTHORIZED => Ok(false),
                other => Err(RemoteStoreError::RequestStatus {
                    path: PATH.to_string(),
                    status: other,
                }
                .into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::dao::models::ChangeKind;

    #[test]
    fn change_messages_decode_to_records() {
        let change = ChangeRecord::deleted(Uuid::now_v7(), 4);
        let data = serde_json::to_string(&change).unwrap();

        let decoded = decode_message(EVENT_DELETED, &data).unwrap().unwrap();
        assert_eq!(decoded.kind, ChangeKind::Delete);
        assert_eq!(decoded.revision, 4);
    }

    #[test]
    fn resync_and_degraded_status_end_the_feed() {
        assert!(matches!(
            decode_message(FEED_RESYNC, r#"{"reason":"lagged"}"#),
            Some(Err(StorageError::Disconnected { .. }))
        ));
        assert!(matches!(
            decode_message(SYSTEM_STATUS, r#"{"degraded":true}"#),
            Some(Err(StorageError::Disconnected { .. }))
        ));
        assert!(decode_message(SYSTEM_STATUS, r#"{"degraded":false}"#).is_none());
        assert!(decode_message("handshake", "{}").is_none());
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        let config = RemoteConfig::new("http://localhost:8080/").with_token("abc");
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.token.as_deref(), Some("abc"));
    }
}
