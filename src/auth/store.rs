//! Persistent key-value storage seam for auth material.
//!
//! The application owns the real store (browser localStorage equivalent,
//! keychain, file); the bridge only reads it as a fallback when reactive
//! auth state lags behind storage writes.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Storage key holding the auth token.
pub const TOKEN_KEY: &str = "token";
/// Storage key holding the serialized user object.
pub const USER_KEY: &str = "user";

/// Opaque persistent key-value storage.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str);
    async fn remove(&self, key: &str);
}

/// In-memory store, used by tests and the demo binary.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }

    async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

/// Token from storage, treating empty strings as absent.
pub(crate) async fn stored_token(store: &dyn TokenStore) -> Option<String> {
    store.get(TOKEN_KEY).await.filter(|t| !t.is_empty())
}
