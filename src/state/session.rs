//! Editor sessions. The control room authenticates with an opaque token; each mutation asks
//! the [`SessionAuthority`] again whether that token is still good.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::info;

use crate::dao::storage::StorageResult;

/// Answers "is the acting identity still allowed to mutate events?".
///
/// `Ok(false)` means the session was revoked; `Err` means the question could not be answered.
pub trait SessionAuthority: Send + Sync {
    fn check(&self) -> BoxFuture<'static, StorageResult<bool>>;
}

/// Editor account bound to a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorAccount {
    pub name: String,
}

/// Registry of valid editor tokens. Revoking a token takes effect on the very next request.
#[derive(Debug, Default)]
pub struct EditorRegistry {
    tokens: DashMap<String, EditorAccount>,
}

impl EditorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an editor token.
    pub fn grant(&self, token: impl Into<String>, name: impl Into<String>) {
        self.tokens.insert(
            token.into(),
            EditorAccount { name: name.into() },
        );
    }

    /// Revoke a token, returning the account it belonged to.
    pub fn revoke(&self, token: &str) -> Option<EditorAccount> {
        let removed = self.tokens.remove(token).map(|(_, account)| account);
        if let Some(account) = &removed {
            info!(editor = %account.name, "editor session revoked");
        }
        removed
    }

    /// Resolve a token to its account, if still valid.
    pub fn lookup(&self, token: &str) -> Option<EditorAccount> {
        self.tokens.get(token).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Session of one editor token checked against a shared [`EditorRegistry`].
#[derive(Clone)]
pub struct RegistrySession {
    registry: Arc<EditorRegistry>,
    token: String,
}

impl RegistrySession {
    pub fn new(registry: Arc<EditorRegistry>, token: impl Into<String>) -> Self {
        Self {
            registry,
            token: token.into(),
        }
    }
}

impl SessionAuthority for RegistrySession {
    fn check(&self) -> BoxFuture<'static, StorageResult<bool>> {
        let valid = self.registry.lookup(&self.token).is_some();
        Box::pin(async move { Ok(valid) })
    }
}

/// Authority that accepts every mutation. Used by in-process tools and tests that own the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedSession;

impl SessionAuthority for TrustedSession {
    fn check(&self) -> BoxFuture<'static, StorageResult<bool>> {
        Box::pin(async { Ok(true) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revocation_is_seen_by_the_next_check() {
        let registry = Arc::new(EditorRegistry::new());
        registry.grant("tok-1", "desk");
        let session = RegistrySession::new(registry.clone(), "tok-1");

        assert!(session.check().await.unwrap());
        assert_eq!(registry.revoke("tok-1").unwrap().name, "desk");
        assert!(!session.check().await.unwrap());
        assert!(registry.revoke("tok-1").is_none());
    }

    #[tokio::test]
    async fn unknown_tokens_are_rejected() {
        let registry = Arc::new(EditorRegistry::new());
        let session = RegistrySession::new(registry, "nope");
        assert!(!session.check().await.unwrap());
    }
}
