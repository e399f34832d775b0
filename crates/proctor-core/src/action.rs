//! The action model.
//!
//! Every test-affecting request is one of a closed set of actions. Each
//! variant carries its own parameters, so most required-field contracts are
//! enforced by the type system; `validate` covers the few that are not
//! expressible structurally and runs before any side effect.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SessionError;
use crate::map::NavigationDirection;
use crate::session::SessionState;
use crate::tags::{Scope, Tag};

/// A navigation- or state-affecting request against a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "parameters", rename_all = "camelCase")]
pub enum Action {
    /// Move to another item, submitting the current one on the way out.
    #[serde(rename_all = "camelCase")]
    Move {
        direction: NavigationDirection,
        scope: Scope,
        /// Target position for `Jump`.
        #[serde(default)]
        position: Option<usize>,
        /// Whether the next item's timer should (re)start after navigation.
        #[serde(default)]
        start_timer: bool,
        /// Client-measured duration of the item visit being closed.
        #[serde(default)]
        item_duration_ms: Option<u64>,
        #[serde(default)]
        item_state: Option<Value>,
        #[serde(default)]
        item_response: Option<Value>,
        /// Consumed extra time reported by the client's timers.
        #[serde(default)]
        consumed_extra_time_ms: Option<u64>,
    },

    /// Leave the current item without submitting a response.
    #[serde(rename_all = "camelCase")]
    Skip {
        scope: Scope,
        #[serde(default)]
        start_timer: bool,
        #[serde(default)]
        item_duration_ms: Option<u64>,
        #[serde(default)]
        consumed_extra_time_ms: Option<u64>,
    },

    /// A max timer ran out for some scope.
    #[serde(rename_all = "camelCase")]
    Timeout {
        scope: Scope,
        /// The entity whose timer expired.
        source: Tag,
        #[serde(default)]
        start_timer: bool,
        #[serde(default)]
        item_duration_ms: Option<u64>,
        #[serde(default)]
        item_response: Option<Value>,
        #[serde(default)]
        consumed_extra_time_ms: Option<u64>,
    },

    /// Suspend the session.
    #[serde(rename_all = "camelCase")]
    Pause {
        #[serde(default)]
        reason: Option<String>,
    },

    /// Leave the test entirely.
    #[serde(rename_all = "camelCase")]
    ExitTest {
        #[serde(default)]
        item_state: Option<Value>,
        #[serde(default)]
        item_response: Option<Value>,
        #[serde(default)]
        item_duration_ms: Option<u64>,
    },

    /// Persist a batch of trace variables.
    #[serde(rename_all = "camelCase")]
    StoreTraceData {
        trace_data: BTreeMap<String, Value>,
    },
}

impl Action {
    /// The wire name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::Skip { .. } => "skip",
            Action::Timeout { .. } => "timeout",
            Action::Pause { .. } => "pause",
            Action::ExitTest { .. } => "exitTest",
            Action::StoreTraceData { .. } => "storeTraceData",
        }
    }

    /// Check required parameters not already enforced by the type system.
    /// Must run before any side effect.
    pub fn validate(&self) -> Result<(), SessionError> {
        let missing = |parameter: &str| SessionError::MissingParameter {
            action: self.name().to_string(),
            parameter: parameter.to_string(),
        };
        match self {
            Action::Move {
                direction: NavigationDirection::Jump,
                position: None,
                ..
            } => Err(missing("position")),
            Action::Timeout { source, .. } if source.is_empty() => Err(missing("source")),
            Action::StoreTraceData { trace_data } if trace_data.is_empty() => {
                Err(missing("traceData"))
            }
            _ => Ok(()),
        }
    }

    /// Blocking actions force a synchronization attempt before completing
    /// while offline.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Action::Timeout { .. } | Action::Pause { .. } | Action::ExitTest { .. }
        )
    }

    /// True for actions that move the session to another item.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            Action::Move { .. } | Action::Skip { .. } | Action::Timeout { .. }
        )
    }
}

/// An action as it sits in the client's queue: immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    /// Locally generated identifier, stable across retries.
    pub client_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Whether the action was taken while offline.
    pub offline: bool,
    pub action: Action,
}

impl QueuedAction {
    pub fn new(action: Action, offline: bool, at: DateTime<Utc>) -> Self {
        Self {
            client_id: Uuid::new_v4(),
            created_at: at,
            offline,
            action,
        }
    }
}

/// Navigation state returned to the client after a successful action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationContext {
    pub position: usize,
    pub state: SessionState,
    /// Whether the session timed out as a consequence of this action.
    pub timed_out: bool,
}

/// Uniform result shape for every dispatched action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<NavigationContext>,
}

impl ActionOutcome {
    pub fn ok(context: NavigationContext) -> Self {
        Self {
            success: true,
            error: None,
            context: Some(context),
        }
    }

    pub fn failure(error: &SessionError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            context: None,
        }
    }
}
