//! The persistent offline action queue.
//!
//! Every test-affecting call is appended here before any network attempt,
//! so a connectivity failure mid-dispatch can never lose the action. The
//! queue is strictly FIFO, persists as one record rewritten on every
//! mutation, and survives page reloads through the storage seam.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use proctor_core::action::QueuedAction;
use proctor_core::error::SessionError;
use proctor_core::store::{StateStore, StorageOwner};

/// Storage key for the serialized queue.
const QUEUE_KEY: &str = "action-queue";

/// FIFO queue of pending actions for one session.
#[derive(Debug)]
pub struct ActionQueue {
    owner: StorageOwner,
    entries: VecDeque<QueuedAction>,
}

impl ActionQueue {
    pub fn new(owner: StorageOwner) -> Self {
        Self {
            owner,
            entries: VecDeque::new(),
        }
    }

    /// Restore the queue persisted for this session, if any.
    pub async fn load(store: &dyn StateStore, owner: StorageOwner) -> Result<Self, SessionError> {
        let entries = match store
            .get(&owner, QUEUE_KEY)
            .await
            .map_err(|e| SessionError::Storage(format!("{e:#}")))?
        {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| SessionError::Storage(e.to_string()))?,
            None => VecDeque::new(),
        };
        if !entries.is_empty() {
            tracing::info!(pending = entries.len(), "restored pending actions");
        }
        Ok(Self { owner, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedAction> {
        self.entries.iter()
    }

    /// Append an action and persist the whole queue.
    pub async fn push(
        &mut self,
        store: &dyn StateStore,
        action: QueuedAction,
    ) -> Result<(), SessionError> {
        self.entries.push_back(action);
        self.persist(store).await
    }

    /// Remove a specific entry (after the server confirmed it directly).
    pub async fn remove(
        &mut self,
        store: &dyn StateStore,
        client_id: Uuid,
    ) -> Result<bool, SessionError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.client_id != client_id);
        let removed = self.entries.len() != before;
        if removed {
            self.persist(store).await?;
        }
        Ok(removed)
    }

    /// Pop the entire queue for a sync flush, preserving order.
    pub async fn drain_all(
        &mut self,
        store: &dyn StateStore,
    ) -> Result<Vec<QueuedAction>, SessionError> {
        let batch: Vec<QueuedAction> = self.entries.drain(..).collect();
        self.persist(store).await?;
        Ok(batch)
    }

    /// Put a failed batch back intact, ahead of anything queued since.
    pub async fn push_back_batch(
        &mut self,
        store: &dyn StateStore,
        batch: Vec<QueuedAction>,
    ) -> Result<(), SessionError> {
        for action in batch.into_iter().rev() {
            self.entries.push_front(action);
        }
        self.persist(store).await
    }

    async fn persist(&self, store: &dyn StateStore) -> Result<(), SessionError> {
        let json = serde_json::to_string(&self.entries)
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        store
            .set(&self.owner, QUEUE_KEY, json)
            .await
            .map_err(|e| SessionError::Storage(format!("{e:#}")))
    }

    /// A downloadable snapshot of everything pending, for manual submission
    /// when connectivity cannot be restored.
    pub fn export_snapshot(&self, exported_at: DateTime<Utc>) -> QueueSnapshot {
        QueueSnapshot {
            user_id: self.owner.user_id.clone(),
            session_id: self.owner.session_id.clone(),
            exported_at,
            entries: self.entries.iter().cloned().collect(),
        }
    }
}

/// Self-describing export of a pending queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub user_id: String,
    pub session_id: String,
    pub exported_at: DateTime<Utc>,
    pub entries: Vec<QueuedAction>,
}

impl QueueSnapshot {
    pub fn to_json_pretty(&self) -> Result<String, SessionError> {
        serde_json::to_string_pretty(self).map_err(|e| SessionError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proctor_core::action::Action;
    use proctor_core::map::NavigationDirection;
    use proctor_core::store::MemoryStore;
    use proctor_core::tags::Scope;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn owner() -> StorageOwner {
        StorageOwner::new("user-1", "session-1")
    }

    fn queued_move(offline: bool) -> QueuedAction {
        QueuedAction::new(
            Action::Move {
                direction: NavigationDirection::Next,
                scope: Scope::Item,
                position: None,
                start_timer: true,
                item_duration_ms: None,
                item_state: None,
                item_response: None,
                consumed_extra_time_ms: None,
            },
            offline,
            t0(),
        )
    }

    #[tokio::test]
    async fn queue_survives_reload() {
        let store = MemoryStore::new();
        let mut queue = ActionQueue::new(owner());

        let first = queued_move(true);
        let second = queued_move(true);
        queue.push(&store, first.clone()).await.unwrap();
        queue.push(&store, second.clone()).await.unwrap();

        let reloaded = ActionQueue::load(&store, owner()).await.unwrap();
        let ids: Vec<Uuid> = reloaded.iter().map(|e| e.client_id).collect();
        assert_eq!(ids, vec![first.client_id, second.client_id]);
    }

    #[tokio::test]
    async fn drain_preserves_order_and_clears() {
        let store = MemoryStore::new();
        let mut queue = ActionQueue::new(owner());

        let actions: Vec<QueuedAction> = (0..4).map(|_| queued_move(true)).collect();
        for action in &actions {
            queue.push(&store, action.clone()).await.unwrap();
        }

        let batch = queue.drain_all(&store).await.unwrap();
        assert!(queue.is_empty());
        assert_eq!(
            batch.iter().map(|e| e.client_id).collect::<Vec<_>>(),
            actions.iter().map(|e| e.client_id).collect::<Vec<_>>()
        );

        // The cleared queue is what persists.
        let reloaded = ActionQueue::load(&store, owner()).await.unwrap();
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn push_back_restores_batch_ahead_of_new_entries() {
        let store = MemoryStore::new();
        let mut queue = ActionQueue::new(owner());

        let early: Vec<QueuedAction> = (0..2).map(|_| queued_move(true)).collect();
        for action in &early {
            queue.push(&store, action.clone()).await.unwrap();
        }
        let batch = queue.drain_all(&store).await.unwrap();

        // An action queued while the flush was failing.
        let late = queued_move(true);
        queue.push(&store, late.clone()).await.unwrap();

        queue.push_back_batch(&store, batch).await.unwrap();
        let ids: Vec<Uuid> = queue.iter().map(|e| e.client_id).collect();
        assert_eq!(
            ids,
            vec![early[0].client_id, early[1].client_id, late.client_id]
        );
    }

    #[tokio::test]
    async fn remove_confirmed_entry() {
        let store = MemoryStore::new();
        let mut queue = ActionQueue::new(owner());

        let kept = queued_move(false);
        let confirmed = queued_move(false);
        queue.push(&store, kept.clone()).await.unwrap();
        queue.push(&store, confirmed.clone()).await.unwrap();

        assert!(queue.remove(&store, confirmed.client_id).await.unwrap());
        assert!(!queue.remove(&store, confirmed.client_id).await.unwrap());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.iter().next().unwrap().client_id, kept.client_id);
    }

    #[tokio::test]
    async fn snapshot_is_self_describing() {
        let store = MemoryStore::new();
        let mut queue = ActionQueue::new(owner());
        queue.push(&store, queued_move(true)).await.unwrap();

        let snapshot = queue.export_snapshot(t0());
        let json = snapshot.to_json_pretty().unwrap();
        let parsed: QueueSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session_id, "session-1");
        assert_eq!(parsed.user_id, "user-1");
        assert_eq!(parsed.entries.len(), 1);
        assert!(parsed.entries[0].offline);
    }
}
