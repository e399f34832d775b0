//! The synchronization protocol.
//!
//! A flush pops the entire queue and sends it as one ordered batch. On a
//! connectivity failure the same batch is resubmitted up to a bounded
//! number of attempts with exponential backoff; exhausting the attempts
//! puts the batch back on the queue intact and returns the proxy to
//! offline. Any other failure surfaces immediately — a server that
//! answered with an error will answer the same way again, so retrying is
//! pointless and the offline transition would be wrong.

use std::sync::Arc;
use std::time::Duration;

use proctor_core::action::ActionOutcome;
use proctor_core::error::SessionError;
use proctor_core::store::StateStore;

use crate::connectivity::ConnectivityMonitor;
use crate::queue::ActionQueue;
use crate::transport::SyncTransport;

/// Retry policy for sync flushes.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum send attempts per flush (the first try included).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt, capped at 60s.
    pub retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// What a successful flush accomplished.
#[derive(Debug)]
pub struct SyncReport {
    /// How many actions were sent.
    pub sent: usize,
    /// Per-action outcomes from the server, in queue order.
    pub outcomes: Vec<ActionOutcome>,
    /// How many attempts the flush needed.
    pub attempts: u32,
}

/// Runs sync flushes against a transport.
pub struct Synchronizer {
    transport: Arc<dyn SyncTransport>,
    config: SyncConfig,
}

impl Synchronizer {
    pub fn new(transport: Arc<dyn SyncTransport>, config: SyncConfig) -> Self {
        Self { transport, config }
    }

    /// Flush the queue as one ordered batch.
    ///
    /// The monitor's guarded transitions enforce the single-flush rule;
    /// calling while a flush is in flight fails without touching the queue.
    pub async fn flush(
        &self,
        queue: &mut ActionQueue,
        store: &dyn StateStore,
        monitor: &mut ConnectivityMonitor,
    ) -> Result<SyncReport, SessionError> {
        monitor.begin_sync()?;

        let batch = match queue.drain_all(store).await {
            Ok(batch) => batch,
            Err(e) => {
                monitor.finish_sync(false);
                return Err(e);
            }
        };
        if batch.is_empty() {
            monitor.finish_sync(true);
            return Ok(SyncReport {
                sent: 0,
                outcomes: Vec::new(),
                attempts: 0,
            });
        }

        let mut delay = self.config.retry_delay;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.transport.send_batch(&batch).await {
                Ok(outcomes) => {
                    tracing::info!(sent = batch.len(), attempt, "sync flush succeeded");
                    monitor.finish_sync(true);
                    return Ok(SyncReport {
                        sent: batch.len(),
                        outcomes,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_connectivity() && attempt < self.config.max_attempts => {
                    tracing::warn!(attempt, error = %e, "sync flush failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(60));
                }
                Err(e) if e.is_connectivity() => {
                    // Retries exhausted: the batch goes back intact and the
                    // proxy continues offline.
                    tracing::warn!(attempts = attempt, error = %e, "sync flush gave up");
                    queue.push_back_batch(store, batch).await?;
                    monitor.finish_sync(false);
                    return Err(e);
                }
                Err(e) => {
                    // The server was reached and rejected the batch; keep it
                    // for inspection but do not fall offline.
                    queue.push_back_batch(store, batch).await?;
                    monitor.finish_sync(true);
                    return Err(e);
                }
            }
        }
    }
}
