//! Offline navigation.
//!
//! While the server is unreachable, moves are resolved against the cached
//! test map and the item cache. A move whose target item is not cached
//! fails with a dedicated condition instead of silently stalling, and
//! allow-skip rules are checked locally against the response cache.

use proctor_core::error::SessionError;
use proctor_core::map::{NavigationDirection, TestMap};
use proctor_core::tags::{Scope, Tag};

use crate::cache::{ItemCache, ResponseCache};

/// Where an offline move landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineMove {
    /// The session advanced to this position.
    Position(usize),
    /// The move walked off the end of the map.
    EndOfTest,
}

/// Resolve a navigation request locally.
pub fn resolve(
    map: &TestMap,
    cache: &ItemCache,
    position: usize,
    direction: NavigationDirection,
    scope: Scope,
    explicit: Option<usize>,
) -> Result<OfflineMove, SessionError> {
    let Some(target) = map.target_position(position, direction, scope, explicit) else {
        // Walking forward off the map ends the test; any other unresolvable
        // move is a bad request, not an exit.
        if direction == NavigationDirection::Next {
            return Ok(OfflineMove::EndOfTest);
        }
        return Err(SessionError::Internal(format!(
            "no navigation target from position {position}"
        )));
    };
    let entry = map
        .entry_at(target)
        .ok_or_else(|| SessionError::Internal(format!("no map entry at position {target}")))?;

    if !cache.has_item(&entry.item) {
        return Err(SessionError::CannotNavigateOffline(entry.item));
    }
    Ok(OfflineMove::Position(target))
}

/// Check allow-skip rules for leaving the current item, using locally
/// cached responses — the offline mirror of the server's validation.
pub fn ensure_can_leave(
    map: &TestMap,
    responses: &ResponseCache,
    position: usize,
) -> Result<(), SessionError> {
    let Some(entry) = map.entry_at(position) else {
        return Ok(());
    };
    let allow_skipping = map
        .item_def(&entry.item)
        .map(|i| i.allow_skipping)
        .unwrap_or(true);
    if !allow_skipping && !has_nonempty_submission(responses, &entry.item) {
        return Err(SessionError::EmptyResponseNotAllowed(entry.item));
    }
    Ok(())
}

fn has_nonempty_submission(responses: &ResponseCache, item: &Tag) -> bool {
    fn is_nonempty(value: &serde_json::Value) -> bool {
        match value {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.trim().is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(o) => o.values().any(is_nonempty),
            _ => true,
        }
    }
    responses.submitted(item).map(is_nonempty).unwrap_or(false)
}
