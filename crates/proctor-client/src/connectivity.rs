//! Connectivity state machine.
//!
//! Online, offline, and syncing are explicit states with guarded
//! transitions, so "only one flush at a time" is enforced structurally
//! rather than by convention. Transitions are broadcast to observers
//! (countdown displays, dialogs) over a tokio broadcast channel.

use tokio::sync::broadcast;

use proctor_core::error::SessionError;

/// Connectivity of the session proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectivityState {
    #[default]
    Online,
    Offline,
    Syncing,
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
            ConnectivityState::Syncing => "syncing",
        };
        f.write_str(s)
    }
}

/// Broadcast to observers on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    WentOnline,
    WentOffline,
    SyncStarted,
    SyncSucceeded,
    SyncFailed,
}

/// Owns the tri-state and its guarded transitions.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: ConnectivityState,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: ConnectivityState::Online,
            events,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn is_offline(&self) -> bool {
        self.state == ConnectivityState::Offline
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    fn broadcast(&self, event: ConnectivityEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    /// A connectivity failure was observed; fall back to offline.
    pub fn set_offline(&mut self) {
        if self.state != ConnectivityState::Offline {
            tracing::info!(from = %self.state, "connection lost, continuing offline");
            self.state = ConnectivityState::Offline;
            self.broadcast(ConnectivityEvent::WentOffline);
        }
    }

    /// Begin a sync flush. Fails if one is already in flight.
    pub fn begin_sync(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectivityState::Syncing {
            return Err(SessionError::Internal(
                "a synchronization is already in flight".into(),
            ));
        }
        self.state = ConnectivityState::Syncing;
        self.broadcast(ConnectivityEvent::SyncStarted);
        Ok(())
    }

    /// End the in-flight sync. Success lands online; failure falls back
    /// offline. Calling without a sync in flight is a logic error.
    pub fn finish_sync(&mut self, success: bool) {
        debug_assert_eq!(self.state, ConnectivityState::Syncing);
        if success {
            self.state = ConnectivityState::Online;
            self.broadcast(ConnectivityEvent::SyncSucceeded);
            self.broadcast(ConnectivityEvent::WentOnline);
        } else {
            self.state = ConnectivityState::Offline;
            self.broadcast(ConnectivityEvent::SyncFailed);
            self.broadcast(ConnectivityEvent::WentOffline);
        }
    }
}
