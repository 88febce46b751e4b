/// Durable event backends and their change feeds.
pub mod event_store;
/// Event record definitions shared by storage, wire and clients.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
