//! Persistent key-value state storage seam.
//!
//! How bytes reach durable storage is a collaborator's concern. This trait
//! is the narrow interface the ledger, the action queue, and the extended
//! session state persist through: get/set/has/delete by (owner, key), where
//! an owner is a (user, session) pair.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

/// Identifies who a stored record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageOwner {
    pub user_id: String,
    pub session_id: String,
}

impl StorageOwner {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// Async key-value storage keyed by (owner, key). Values are opaque strings;
/// callers serialize whole records and write them in one `set`.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, owner: &StorageOwner, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, owner: &StorageOwner, key: &str, value: String) -> anyhow::Result<()>;

    async fn has(&self, owner: &StorageOwner, key: &str) -> anyhow::Result<bool>;

    async fn delete(&self, owner: &StorageOwner, key: &str) -> anyhow::Result<bool>;
}

/// In-memory store. The default backend for tests and the CLI replay
/// harness; real deployments plug in their own `StateStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(StorageOwner, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held. Test helper.
    pub fn len(&self) -> usize {
        self.records.lock().expect("store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, owner: &StorageOwner, key: &str) -> anyhow::Result<Option<String>> {
        let records = self.records.lock().expect("store poisoned");
        Ok(records.get(&(owner.clone(), key.to_string())).cloned())
    }

    async fn set(&self, owner: &StorageOwner, key: &str, value: String) -> anyhow::Result<()> {
        let mut records = self.records.lock().expect("store poisoned");
        records.insert((owner.clone(), key.to_string()), value);
        Ok(())
    }

    async fn has(&self, owner: &StorageOwner, key: &str) -> anyhow::Result<bool> {
        let records = self.records.lock().expect("store poisoned");
        Ok(records.contains_key(&(owner.clone(), key.to_string())))
    }

    async fn delete(&self, owner: &StorageOwner, key: &str) -> anyhow::Result<bool> {
        let mut records = self.records.lock().expect("store poisoned");
        Ok(records.remove(&(owner.clone(), key.to_string())).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_crud() {
        let store = MemoryStore::new();
        let owner = StorageOwner::new("user-1", "session-1");

        assert!(!store.has(&owner, "queue").await.unwrap());
        store.set(&owner, "queue", "[]".into()).await.unwrap();
        assert!(store.has(&owner, "queue").await.unwrap());
        assert_eq!(store.get(&owner, "queue").await.unwrap().as_deref(), Some("[]"));

        assert!(store.delete(&owner, "queue").await.unwrap());
        assert!(!store.delete(&owner, "queue").await.unwrap());
        assert!(store.get(&owner, "queue").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn owners_are_isolated() {
        let store = MemoryStore::new();
        let a = StorageOwner::new("user-1", "session-1");
        let b = StorageOwner::new("user-1", "session-2");

        store.set(&a, "timeline", "a".into()).await.unwrap();
        assert!(store.get(&b, "timeline").await.unwrap().is_none());
    }
}
