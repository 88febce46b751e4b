//! Client of the matchday HTTP API. Implements [`EventStore`](super::EventStore) on top of the
//! public and admin routes and the `/sse/events` stream, so editor and viewer processes run the
//! same engine as in-process tests.

mod error;
mod store;

pub use error::{RemoteResult, RemoteStoreError};
pub use store::{RemoteConfig, RemoteEventStore};
