use std::sync::Arc;

use futures::{StreamExt, future::BoxFuture};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::from_value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dao::{
    event_store::{ChangeStream, EventStore},
    models::{EventDraft, EventId, EventRecord, sort_events},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, ChangeRow, END_SUFFIX, EVENT_PREFIX, EventDocument, WriteResponse,
        event_doc_id,
    },
};

/// Event backend persisting one CouchDB document per event and exposing the database
/// `_changes` feed as the change stream.
#[derive(Clone)]
pub struct CouchEventStore {
    client: Client,
    config: Arc<CouchConfig>,
}

/// Outcome of a revision-guarded write.
enum WriteOutcome {
    Written(String),
    Conflict,
}

impl CouchEventStore {
    /// Connect to CouchDB and make sure the event database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            config: Arc::new(config),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.credentials {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.config.database_url(), path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.config.database.clone();
        let url = self.config.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::Database {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::Database {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    debug!(database = %database, "created CouchDB event database");
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document(&self, doc_id: &str) -> CouchResult<Option<EventDocument>> {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<EventDocument>()
                .await
                .map(Some)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<WriteOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        Self::write_outcome(doc_id, response).await
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<WriteOutcome> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        Self::write_outcome(doc_id, response).await
    }

    async fn write_outcome(doc_id: &str, response: reqwest::Response) -> CouchResult<WriteOutcome> {
        match response.status() {
            StatusCode::CONFLICT => Ok(WriteOutcome::Conflict),
            status if status.is_success() => {
                let body = response.json::<WriteResponse>().await.map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })?;
                Ok(WriteOutcome::Written(body.rev))
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_documents(&self) -> CouchResult<Vec<EventDocument>> {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", EVENT_PREFIX)),
            ("endkey", format!("\"{}{}\"", EVENT_PREFIX, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc.map(|doc| (row.id, doc)))
            .map(|(id, doc)| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue { path: id, source })
            })
            .collect()
    }

    /// Read-modify-write loop for an existing document. A `409` means another editor wrote
    /// first; the mutation is re-applied on top of the fresh document, so the last write to
    /// reach CouchDB wins.
    async fn update_document<F>(&self, id: EventId, mutate: F) -> CouchResult<Option<EventRecord>>
    where
        F: Fn(EventDocument) -> EventDocument,
    {
        let doc_id = event_doc_id(id);
        let attempts = self.config.conflict_retries.max(1);

        for attempt in 0..attempts {
            let Some(current) = self.get_document(&doc_id).await? else {
                return Ok(None);
            };

            let next = mutate(current);
            match self.put_document(&doc_id, &next).await? {
                WriteOutcome::Written(rev) => return next.into_record(&rev).map(Some),
                WriteOutcome::Conflict => {
                    debug!(doc_id = %doc_id, attempt, "CouchDB write conflict; retrying");
                }
            }
        }

        Err(CouchDaoError::ConflictRetriesExhausted { doc_id, attempts })
    }

    async fn remove_document(&self, id: EventId) -> CouchResult<bool> {
        let doc_id = event_doc_id(id);
        let attempts = self.config.conflict_retries.max(1);

        for _ in 0..attempts {
            let Some(current) = self.get_document(&doc_id).await? else {
                return Ok(false);
            };
            let rev = current.rev.unwrap_or_default();
            match self.delete_document(&doc_id, &rev).await? {
                WriteOutcome::Written(_) => return Ok(true),
                WriteOutcome::Conflict => continue,
            }
        }

        Err(CouchDaoError::ConflictRetriesExhausted { doc_id, attempts })
    }

    async fn open_changes(&self) -> CouchResult<reqwest::Response> {
        const CHANGES: &str = "_changes";
        let heartbeat = self.config.heartbeat.as_millis().to_string();
        let query = [
            ("feed", "continuous"),
            ("include_docs", "true"),
            ("since", "now"),
            ("heartbeat", heartbeat.as_str()),
        ];

        let response = self
            .request(Method::GET, CHANGES)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(CouchDaoError::RequestStatus {
                path: CHANGES.to_string(),
                status: response.status(),
            })
        }
    }
}

impl EventStore for CouchEventStore {
    fn list_events(&self) -> BoxFuture<'static, StorageResult<Vec<EventRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut events = store
                .list_documents()
                .await?
                .into_iter()
                .map(EventDocument::into_stored_record)
                .collect::<Result<Vec<_>, _>>()?;
            sort_events(&mut events);
            Ok(events)
        })
    }

    fn find_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store.get_document(&event_doc_id(id)).await?;
            Ok(document
                .map(EventDocument::into_stored_record)
                .transpose()?)
        })
    }

    fn insert_event(&self, draft: EventDraft) -> BoxFuture<'static, StorageResult<EventRecord>> {
        let store = self.clone();
        Box::pin(async move {
            let id = Uuid::now_v7();
            let sort_order = draft.sort_order.unwrap_or_default();
            let document = EventDocument::new(id, None, draft, sort_order);
            let doc_id = document.id.clone();

            match store.put_document(&doc_id, &document).await? {
                WriteOutcome::Written(rev) => Ok(document.into_record(&rev)?),
                WriteOutcome::Conflict => Err(CouchDaoError::ConflictRetriesExhausted {
                    doc_id,
                    attempts: 1,
                }
                .into()),
            }
        })
    }

    fn replace_event(
        &self,
        id: EventId,
        draft: EventDraft,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let updated = store
                .update_document(id, |current| {
                    let sort_order = current.sort_order();
                    EventDocument::new(id, current.rev, draft.clone(), sort_order)
                })
                .await?;
            Ok(updated)
        })
    }

    fn set_sort_order(
        &self,
        id: EventId,
        sort_order: i64,
    ) -> BoxFuture<'static, StorageResult<Option<EventRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let updated = store
                .update_document(id, |mut current| {
                    current.body.sort_order = Some(sort_order);
                    current
                })
                .await?;
            Ok(updated)
        })
    }

    fn delete_event(&self, id: EventId) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.remove_document(id).await?) })
    }

    fn changes(&self) -> BoxFuture<'static, StorageResult<ChangeStream>> {
        let store = self.clone();
        Box::pin(async move {
            let response = store.open_changes().await?;
            let mut bytes = response.bytes_stream();

            let stream = async_stream::stream! {
                let mut buffer = Vec::<u8>::new();
                loop {
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.extend_from_slice(&chunk);
                            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                                let line: Vec<u8> = buffer.drain(..=newline).collect();
                                // Heartbeats are bare newlines.
                                if line.iter().all(u8::is_ascii_whitespace) {
                                    continue;
                                }
                                match serde_json::from_slice::<ChangeRow>(&line) {
                                    Ok(row) => match row.into_change() {
                                        Ok(Some(change)) => yield Ok(change),
                                        Ok(None) => {}
                                        Err(err) => warn!(error = %err, "skipping malformed CouchDB change"),
                                    },
                                    Err(err) => {
                                        debug!(error = %err, "ignoring non-change line on CouchDB feed");
                                    }
                                }
                            }
                        }
                        Some(Err(source)) => {
                            yield Err(StorageError::from(CouchDaoError::FeedRead { source }));
                            break;
                        }
                        None => {
                            yield Err(StorageError::disconnected("CouchDB closed the changes feed"));
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
            let url = store.config.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
