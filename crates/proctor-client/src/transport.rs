//! Sync transports.
//!
//! The transport is the narrow seam between the session proxy and the
//! server: send one action, or send an ordered batch. The HTTP
//! implementation maps wire failures onto the error taxonomy so the sync
//! engine can tell a dead network (retry, go offline) from a server that
//! answered with an error (surface, stop).

use async_trait::async_trait;
use tracing::instrument;

use proctor_core::action::{ActionOutcome, QueuedAction};
use proctor_core::error::SessionError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Seam for reaching the authoritative server.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Dispatch a single action immediately.
    async fn send_action(&self, action: &QueuedAction) -> Result<ActionOutcome, SessionError>;

    /// Send a flushed queue as one ordered batch.
    async fn send_batch(
        &self,
        batch: &[QueuedAction],
    ) -> Result<Vec<ActionOutcome>, SessionError>;
}

/// HTTP transport against the server's action endpoints.
pub struct HttpSyncTransport {
    base_url: String,
    session_id: String,
    client: reqwest::Client,
}

impl HttpSyncTransport {
    pub fn new(base_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");
        Self {
            base_url: base_url.into(),
            session_id: session_id.into(),
            client,
        }
    }

    fn map_send_error(e: reqwest::Error) -> SessionError {
        if e.is_timeout() {
            SessionError::RequestTimeout(DEFAULT_TIMEOUT_SECS)
        } else {
            SessionError::Unreachable(e.to_string())
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, SessionError> {
        let response = self
            .client
            .post(format!("{}/sessions/{}/{path}", self.base_url, self.session_id))
            .json(body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(SessionError::ServerError { status, message });
        }

        response.json().await.map_err(|e| SessionError::ServerError {
            status: 0,
            message: format!("failed to parse response: {e}"),
        })
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    #[instrument(skip(self, action), fields(action = action.action.name()))]
    async fn send_action(&self, action: &QueuedAction) -> Result<ActionOutcome, SessionError> {
        self.post_json("actions", action).await
    }

    #[instrument(skip(self, batch), fields(actions = batch.len()))]
    async fn send_batch(
        &self,
        batch: &[QueuedAction],
    ) -> Result<Vec<ActionOutcome>, SessionError> {
        self.post_json("actions/batch", &batch).await
    }
}

/// Scripted transport for exercising the sync engine without a server.
pub mod mock {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use proctor_core::action::NavigationContext;
    use proctor_core::session::SessionState;

    use super::*;

    /// A transport that fails the first `fail_times` calls with a scripted
    /// error, then succeeds, recording every batch it was given.
    pub struct MockTransport {
        fail_times: AtomicU32,
        connectivity_failure: bool,
        calls: AtomicU32,
        batches: Mutex<Vec<Vec<QueuedAction>>>,
    }

    impl MockTransport {
        /// A transport that always succeeds.
        pub fn reliable() -> Self {
            Self::failing(0, true)
        }

        /// Fail the first `fail_times` calls; `connectivity` picks between a
        /// connectivity failure and a server-side error.
        pub fn failing(fail_times: u32, connectivity: bool) -> Self {
            Self {
                fail_times: AtomicU32::new(fail_times),
                connectivity_failure: connectivity,
                calls: AtomicU32::new(0),
                batches: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }

        /// Batches received by successful and failed calls alike.
        pub fn recorded_batches(&self) -> Vec<Vec<QueuedAction>> {
            self.batches.lock().expect("mock poisoned").clone()
        }

        fn next_error(&self) -> Option<SessionError> {
            let remaining = self.fail_times.load(Ordering::Relaxed);
            if remaining == 0 {
                return None;
            }
            self.fail_times.store(remaining - 1, Ordering::Relaxed);
            Some(if self.connectivity_failure {
                SessionError::Unreachable("connection reset".into())
            } else {
                SessionError::ServerError {
                    status: 500,
                    message: "internal error".into(),
                }
            })
        }

        fn ok_outcome() -> ActionOutcome {
            ActionOutcome::ok(NavigationContext {
                position: 0,
                state: SessionState::Running,
                timed_out: false,
            })
        }
    }

    #[async_trait]
    impl SyncTransport for MockTransport {
        async fn send_action(
            &self,
            action: &QueuedAction,
        ) -> Result<ActionOutcome, SessionError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.batches
                .lock()
                .expect("mock poisoned")
                .push(vec![action.clone()]);
            match self.next_error() {
                Some(e) => Err(e),
                None => Ok(Self::ok_outcome()),
            }
        }

        async fn send_batch(
            &self,
            batch: &[QueuedAction],
        ) -> Result<Vec<ActionOutcome>, SessionError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.batches
                .lock()
                .expect("mock poisoned")
                .push(batch.to_vec());
            match self.next_error() {
                Some(e) => Err(e),
                None => Ok(batch.iter().map(|_| Self::ok_outcome()).collect()),
            }
        }
    }
}
