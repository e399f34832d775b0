//! Session error taxonomy.
//!
//! Defined in `proctor-core` so the action controller and the sync engine
//! can classify failures for retry and offline-transition decisions without
//! string matching. The four families from the error-handling design:
//! validation (fail fast, never retried), timing (logged and tolerated),
//! connectivity (the only kind that triggers the offline transition and
//! bounded retry), and fatal (everything else).

use thiserror::Error;

use crate::tags::Tag;

/// Errors surfaced by the timing ledger, the action controller, and the
/// client-side sync engine.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A required action parameter was absent or empty.
    #[error("missing required parameter '{parameter}' for action '{action}'")]
    MissingParameter { action: String, parameter: String },

    /// An empty response was submitted for an item that disallows skipping.
    #[error("item '{0}' does not allow skipping and the response is empty")]
    EmptyResponseNotAllowed(Tag),

    /// A client-reported duration could not be reconciled with the ledger.
    #[error("inconsistent duration adjustment for [{tags}]: {detail}")]
    InconsistentDuration { tags: String, detail: String },

    /// The network was unreachable during dispatch or sync.
    #[error("network unreachable: {0}")]
    Unreachable(String),

    /// A dispatch or sync request timed out.
    #[error("request timed out after {0}s")]
    RequestTimeout(u64),

    /// The server rejected a request with an error response.
    #[error("server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Offline navigation was requested but the target item is not cached.
    #[error("cannot navigate offline: item '{0}' is not cached")]
    CannotNavigateOffline(Tag),

    /// The requested action is not valid in the session's current state.
    #[error("action '{action}' is not allowed while the session is {state}")]
    InvalidSessionState { action: String, state: String },

    /// Persistence failed beneath the ledger or the queue.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl SessionError {
    /// True for validation errors: surfaced immediately, never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SessionError::MissingParameter { .. } | SessionError::EmptyResponseNotAllowed(_)
        )
    }

    /// True for timing errors: logged and tolerated, the action completes.
    pub fn is_timing(&self) -> bool {
        matches!(self, SessionError::InconsistentDuration { .. })
    }

    /// True for connectivity errors: these alone trigger the offline
    /// transition and bounded retry. A `ServerError` is NOT connectivity —
    /// the server was reached and answered.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            SessionError::Unreachable(_) | SessionError::RequestTimeout(_)
        )
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<SessionError>() {
            Ok(err) => err,
            Err(other) => SessionError::Internal(format!("{other:#}")),
        }
    }
}
