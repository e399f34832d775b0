//! Domain events raised by the action controller.

use std::collections::BTreeMap;

use serde_json::Value;

use proctor_core::tags::{Scope, Tag};

/// Events observers can subscribe to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A trace-data batch finished storing. Carries the full submitted
    /// payload even when some variables failed to store.
    TraceDataStored {
        session_id: String,
        values: BTreeMap<String, Value>,
        stored: usize,
        total: usize,
    },
    /// A timeout was raised against an entity.
    TimeoutRaised {
        session_id: String,
        source: Tag,
        scope: Scope,
    },
    /// The session was suspended by a pause action.
    SessionSuspended { session_id: String },
    /// The session reached its terminal state.
    SessionTerminated { session_id: String },
}

/// Observer seam for domain events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SessionEvent);
}

/// Sink that drops every event.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _: &SessionEvent) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every event for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<SessionEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &SessionEvent) {
            self.events.lock().expect("sink poisoned").push(event.clone());
        }
    }
}
