//! proctor-server — Authoritative session control.
//!
//! Hosts the synchronization action controller: the per-request orchestrator
//! that closes and opens ledger ranges around every navigation action,
//! validates submitted responses, and persists session state through the
//! storage seam.

pub mod controller;
pub mod events;
pub mod session_store;
pub mod validation;

pub use controller::SyncActionController;
pub use events::{EventSink, NoopSink, SessionEvent};
