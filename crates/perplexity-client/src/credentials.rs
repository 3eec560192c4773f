//! Pluggable persistence for session cookies.
//!
//! The client never touches the filesystem itself; callers inject a
//! [`CredentialStore`] and the client loads cookies from it at connect time
//! and writes them back on close.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Snapshot of the cookies a session accumulated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Cookie name/value pairs.
    pub cookies: BTreeMap<String, String>,
}

impl StoredCredentials {
    /// Whether the snapshot holds any cookies at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Backing store for per-session credentials, keyed by caller-chosen id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the snapshot saved under `key`, if any.
    async fn load(&self, key: &str) -> Option<StoredCredentials>;

    /// Persist `credentials` under `key`, replacing any previous snapshot.
    async fn save(&self, key: &str, credentials: StoredCredentials);
}

/// In-process store, useful for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, StoredCredentials>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, key: &str) -> Option<StoredCredentials> {
        self.entries.read().get(key).cloned()
    }

    async fn save(&self, key: &str, credentials: StoredCredentials) {
        let _ = self.entries.write().insert(key.to_owned(), credentials);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
