//! Session context and extended per-session state.
//!
//! There is no ambient "current session": every ledger, evaluator, and
//! controller call receives an explicit [`SessionContext`]. The context owns
//! the session's ledger, extra-time pool, position, and the extended state
//! record that persists flags and bookmarks across reconnects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;
use crate::extra_time::ExtraTimePool;
use crate::ledger::{ClockTarget, TimerLedger};
use crate::store::{StateStore, StorageOwner};
use crate::tags::Tag;

/// Storage key for the extended state record.
const EXTENDED_STATE_KEY: &str = "extended-state";

/// Lifecycle state of a delivery session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    NotStarted,
    Running,
    Suspended,
    TimedOut,
    Terminated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Terminated)
    }

    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Running)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::NotStarted => "not-started",
            SessionState::Running => "running",
            SessionState::Suspended => "suspended",
            SessionState::TimedOut => "timed-out",
            SessionState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Per-item bookkeeping flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFlags {
    #[serde(default)]
    pub answered: bool,
    #[serde(default)]
    pub flagged_for_review: bool,
    #[serde(default)]
    pub viewed: bool,
}

/// Extended per-session state: everything beyond the ledger that must
/// survive a dropped connection.
///
/// Writes are buffered in memory and flushed explicitly as one record —
/// never per field — so a crash mid-update can not persist half a state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedState {
    /// Flags per item identifier.
    #[serde(default)]
    pub item_flags: BTreeMap<Tag, ItemFlags>,
    /// Position bookmark: the flat index the taker last sat on.
    #[serde(default)]
    pub href_index: Option<usize>,
    /// Opaque adaptive-engine values.
    #[serde(default)]
    pub adaptive_values: BTreeMap<String, Value>,
    /// Identifier of the backing store the client bound to.
    #[serde(default)]
    pub store_id: Option<String>,
    /// Whether this session line has replayed offline actions; duration
    /// queries then trust client-reported values where present.
    #[serde(default)]
    pub offline_aware: bool,
    #[serde(skip)]
    dirty: bool,
}

impl ExtendedState {
    pub fn flags_mut(&mut self, item: &Tag) -> &mut ItemFlags {
        self.dirty = true;
        self.item_flags.entry(item.clone()).or_default()
    }

    pub fn set_href_index(&mut self, index: usize) {
        self.href_index = Some(index);
        self.dirty = true;
    }

    pub fn set_adaptive_value(&mut self, key: impl Into<String>, value: Value) {
        self.adaptive_values.insert(key.into(), value);
        self.dirty = true;
    }

    pub fn set_store_id(&mut self, id: impl Into<String>) {
        self.store_id = Some(id.into());
        self.dirty = true;
    }

    pub fn mark_offline_aware(&mut self) {
        if !self.offline_aware {
            self.offline_aware = true;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flush the whole record in one write. No-op when nothing changed.
    pub async fn flush(
        &mut self,
        store: &dyn StateStore,
        owner: &StorageOwner,
    ) -> Result<(), SessionError> {
        if !self.dirty {
            return Ok(());
        }
        let json =
            serde_json::to_string(self).map_err(|e| SessionError::Storage(e.to_string()))?;
        store
            .set(owner, EXTENDED_STATE_KEY, json)
            .await
            .map_err(|e| SessionError::Storage(format!("{e:#}")))?;
        self.dirty = false;
        Ok(())
    }

    pub async fn load(
        store: &dyn StateStore,
        owner: &StorageOwner,
    ) -> Result<Self, SessionError> {
        match store
            .get(owner, EXTENDED_STATE_KEY)
            .await
            .map_err(|e| SessionError::Storage(format!("{e:#}")))?
        {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| SessionError::Storage(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }
}

/// Everything one request needs to know about a session, passed explicitly.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: String,
    pub session_id: String,
    pub state: SessionState,
    /// Flat position of the current item.
    pub position: usize,
    pub ledger: TimerLedger,
    pub extra_time: ExtraTimePool,
    pub extended: ExtendedState,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            state: SessionState::NotStarted,
            position: 0,
            ledger: TimerLedger::new(),
            extra_time: ExtraTimePool::default(),
            extended: ExtendedState::default(),
        }
    }

    pub fn owner(&self) -> StorageOwner {
        StorageOwner::new(self.user_id.clone(), self.session_id.clone())
    }

    /// Which clock duration queries should trust for this session.
    pub fn clock_target(&self) -> ClockTarget {
        if self.extended.offline_aware {
            ClockTarget::Client
        } else {
            ClockTarget::Server
        }
    }
}
