//! proctor-client — Offline-resilient session machinery.
//!
//! The client side of proctor: countdowns feeding the timer strategy
//! handler, the persistent action queue, item/response caches, the
//! connectivity state machine, and the synchronization protocol that
//! reconciles a session with the server once connectivity returns.

pub mod cache;
pub mod connectivity;
pub mod countdown;
pub mod navigator;
pub mod proxy;
pub mod queue;
pub mod strategy;
pub mod sync;
pub mod transport;

pub use connectivity::{ConnectivityEvent, ConnectivityMonitor, ConnectivityState};
pub use proxy::{PerformOutcome, ProxyConfig, TestSessionProxy};
pub use sync::{SyncConfig, SyncReport, Synchronizer};
pub use transport::{HttpSyncTransport, SyncTransport};
