//! The test session proxy.
//!
//! One proxy owns a session's queue, caches, and connectivity state — the
//! single "schedule and attempt" surface UI plugins call, whether the
//! server is reachable or not. Every action is queued before any network
//! attempt; dispatch then either reaches the server, resolves locally
//! against the cached map, or surfaces the wait-vs-export choice when a
//! blocking action cannot be synchronized.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use proctor_core::action::{Action, ActionOutcome, QueuedAction};
use proctor_core::error::SessionError;
use proctor_core::map::{NavigationDirection, TestMap};
use proctor_core::session::SessionState;
use proctor_core::store::{StateStore, StorageOwner};
use proctor_core::tags::Tag;

use crate::cache::{CachedItem, ItemCache, ResponseCache};
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::navigator::{self, OfflineMove};
use crate::queue::{ActionQueue, QueueSnapshot};
use crate::sync::{SyncConfig, SyncReport, Synchronizer};
use crate::transport::SyncTransport;

/// Proxy tuning knobs.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Item cache capacity (0 = unbounded).
    pub preload_size: usize,
    pub sync: SyncConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            preload_size: 10,
            sync: SyncConfig::default(),
        }
    }
}

/// How a scheduled action ended up.
#[derive(Debug)]
pub enum PerformOutcome {
    /// The server processed the action (directly, or via a flush the action
    /// itself triggered).
    Synced(ActionOutcome),
    /// Resolved locally; the action stays queued for the next flush.
    Deferred { position: usize, end_of_test: bool },
    /// A required sync could not reach the server: the caller must offer
    /// waiting for connectivity or exporting the queue snapshot.
    AwaitingConnectivity { pending: usize },
}

/// Client-side owner of one session's offline machinery.
pub struct TestSessionProxy {
    map: TestMap,
    store: Arc<dyn StateStore>,
    transport: Arc<dyn SyncTransport>,
    queue: ActionQueue,
    items: ItemCache,
    responses: ResponseCache,
    monitor: ConnectivityMonitor,
    synchronizer: Synchronizer,
    position: usize,
    state: SessionState,
}

impl TestSessionProxy {
    /// Build a proxy, restoring any queue persisted for this session.
    pub async fn new(
        map: TestMap,
        store: Arc<dyn StateStore>,
        transport: Arc<dyn SyncTransport>,
        owner: StorageOwner,
        config: ProxyConfig,
    ) -> Result<Self, SessionError> {
        let queue = ActionQueue::load(store.as_ref(), owner).await?;
        let synchronizer = Synchronizer::new(Arc::clone(&transport), config.sync);
        Ok(Self {
            map,
            store,
            transport,
            queue,
            items: ItemCache::new(config.preload_size),
            responses: ResponseCache::new(),
            monitor: ConnectivityMonitor::new(),
            synchronizer,
            position: 0,
            state: SessionState::Running,
        })
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.monitor.state()
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn pending_actions(&self) -> usize {
        self.queue.len()
    }

    pub fn preload(&mut self, items: Vec<CachedItem>) {
        for item in items {
            self.items.insert(item);
        }
    }

    /// Record the correct response for an item, enabling offline scoring
    /// and allow-skip checks against it.
    pub fn record_correct_response(&mut self, item: Tag, response: serde_json::Value) {
        self.responses.set_correct(item, response);
    }

    /// Queue an action and attempt to execute it — the uniform entry point
    /// for online and offline alike.
    pub async fn perform(
        &mut self,
        action: Action,
        at: DateTime<Utc>,
    ) -> Result<PerformOutcome, SessionError> {
        action.validate()?;

        let offline = self.monitor.state() != ConnectivityState::Online;
        let queued = QueuedAction::new(action, offline, at);
        // Queued before any network attempt: a failure from here on can
        // never lose the action.
        self.queue.push(self.store.as_ref(), queued.clone()).await?;

        if self.monitor.state() == ConnectivityState::Online {
            match self.transport.send_action(&queued).await {
                Ok(outcome) => {
                    self.queue
                        .remove(self.store.as_ref(), queued.client_id)
                        .await?;
                    self.apply_context(&outcome);
                    return Ok(PerformOutcome::Synced(outcome));
                }
                Err(e) if e.is_connectivity() => {
                    // The action stays queued for later replay.
                    self.monitor.set_offline();
                }
                Err(e) => {
                    // The server answered and rejected it; replaying the
                    // same action would fail identically.
                    self.queue
                        .remove(self.store.as_ref(), queued.client_id)
                        .await?;
                    return Err(e);
                }
            }
        }

        self.resolve_offline(queued).await
    }

    /// Flush the queue now. Public so UI "retry" buttons map onto it.
    pub async fn sync(&mut self) -> Result<SyncReport, SessionError> {
        let report = self
            .synchronizer
            .flush(&mut self.queue, self.store.as_ref(), &mut self.monitor)
            .await?;
        if let Some(outcome) = report.outcomes.last() {
            self.apply_context(outcome);
        }
        Ok(report)
    }

    /// Snapshot of everything pending, for manual submission.
    pub fn export_snapshot(&self, at: DateTime<Utc>) -> QueueSnapshot {
        self.queue.export_snapshot(at)
    }

    // -----------------------------------------------------------------------

    fn apply_context(&mut self, outcome: &ActionOutcome) {
        if let Some(context) = &outcome.context {
            self.position = context.position;
            self.state = context.state;
        }
    }

    async fn resolve_offline(
        &mut self,
        queued: QueuedAction,
    ) -> Result<PerformOutcome, SessionError> {
        let mut end_of_test = false;

        if queued.action.is_navigation() {
            match self.navigate_locally(&queued) {
                Ok(left_test) => end_of_test = left_test,
                Err(e) => {
                    // The move did not take effect; drop it from the queue
                    // so a later flush does not replay a rejected action.
                    self.queue
                        .remove(self.store.as_ref(), queued.client_id)
                        .await?;
                    return Err(e);
                }
            }
        }

        // Blocking actions and reaching the end of the cached map force a
        // reconciliation attempt.
        let must_sync = queued.action.is_blocking()
            || end_of_test
            || self.map.is_last_position(self.position);
        if !must_sync {
            return Ok(PerformOutcome::Deferred {
                position: self.position,
                end_of_test,
            });
        }

        match self.sync().await {
            Ok(report) => {
                let outcome = report
                    .outcomes
                    .last()
                    .cloned()
                    .unwrap_or_else(|| ActionOutcome {
                        success: true,
                        error: None,
                        context: None,
                    });
                Ok(PerformOutcome::Synced(outcome))
            }
            Err(e) if e.is_connectivity() => Ok(PerformOutcome::AwaitingConnectivity {
                pending: self.queue.len(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Resolve a navigation action against the cached map. Returns whether
    /// the move walked off the end of the test.
    fn navigate_locally(&mut self, queued: &QueuedAction) -> Result<bool, SessionError> {
        let (direction, scope, explicit) = match &queued.action {
            Action::Move {
                direction,
                scope,
                position,
                item_response,
                ..
            } => {
                if let Some(response) = item_response {
                    if let Some(entry) = self.map.entry_at(self.position) {
                        self.responses.set_submitted(entry.item, response.clone());
                    }
                }
                (*direction, *scope, *position)
            }
            Action::Skip { scope, .. } => (NavigationDirection::Next, *scope, None),
            Action::Timeout { scope, .. } => (NavigationDirection::Next, *scope, None),
            _ => return Ok(false),
        };

        // Timeouts are exempt from allow-skip rules; the time is simply up.
        if !matches!(queued.action, Action::Timeout { .. }) {
            navigator::ensure_can_leave(&self.map, &self.responses, self.position)?;
        }

        match navigator::resolve(
            &self.map,
            &self.items,
            self.position,
            direction,
            scope,
            explicit,
        )? {
            OfflineMove::Position(position) => {
                self.position = position;
                Ok(false)
            }
            OfflineMove::EndOfTest => Ok(true),
        }
    }
}
