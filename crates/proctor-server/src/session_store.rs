//! Session persistence over the key-value storage seam.
//!
//! Item states, responses, and trace variables are written as individual
//! records; the ledger and the extended state flush as whole records through
//! their own save paths. Serialization of whom a record belongs to is the
//! store's concern — this module only shapes keys and values.

use serde_json::Value;

use proctor_core::error::SessionError;
use proctor_core::session::SessionContext;
use proctor_core::store::{StateStore, StorageOwner};
use proctor_core::tags::Tag;

fn storage_err(e: anyhow::Error) -> SessionError {
    SessionError::Storage(format!("{e:#}"))
}

/// Persist the mutable presentation state of one item.
pub async fn persist_item_state(
    store: &dyn StateStore,
    owner: &StorageOwner,
    item: &Tag,
    state: &Value,
) -> Result<(), SessionError> {
    let json = serde_json::to_string(state).map_err(|e| SessionError::Storage(e.to_string()))?;
    store
        .set(owner, &format!("item-state:{item}"), json)
        .await
        .map_err(storage_err)
}

/// Persist the submitted response for one item.
pub async fn persist_item_response(
    store: &dyn StateStore,
    owner: &StorageOwner,
    item: &Tag,
    response: &Value,
) -> Result<(), SessionError> {
    let json =
        serde_json::to_string(response).map_err(|e| SessionError::Storage(e.to_string()))?;
    store
        .set(owner, &format!("item-response:{item}"), json)
        .await
        .map_err(storage_err)
}

pub async fn load_item_response(
    store: &dyn StateStore,
    owner: &StorageOwner,
    item: &Tag,
) -> Result<Option<Value>, SessionError> {
    match store
        .get(owner, &format!("item-response:{item}"))
        .await
        .map_err(storage_err)?
    {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| SessionError::Storage(e.to_string())),
        None => Ok(None),
    }
}

/// Store a single trace variable. Each variable is an independent record so
/// one failing write cannot corrupt its siblings.
pub async fn store_trace_variable(
    store: &dyn StateStore,
    owner: &StorageOwner,
    identifier: &str,
    value: &Value,
) -> Result<(), SessionError> {
    let json = serde_json::to_string(value).map_err(|e| SessionError::Storage(e.to_string()))?;
    store
        .set(owner, &format!("trace:{identifier}"), json)
        .await
        .map_err(storage_err)
}

/// Persist the ledger and flush the extended state for a session.
pub async fn persist_session(
    store: &dyn StateStore,
    ctx: &mut SessionContext,
) -> Result<(), SessionError> {
    let owner = ctx.owner();
    ctx.ledger.save(store, &owner).await?;
    ctx.extended.flush(store, &owner).await
}
