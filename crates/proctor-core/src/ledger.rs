//! The timer ledger — an append-only log of time ranges per session.
//!
//! Every duration the system reports is computed from this ledger, never
//! stored raw. The ledger is owned exclusively by one session and is mutated
//! only through `start`/`end`/`adjust`; readers go through `compute` (or a
//! per-request [`DurationCache`]).
//!
//! Invariant: for a given tag, at most one range may be open at any instant.
//! Conflicting operations (starting an already-open tag, ending an
//! already-closed one) are warnings, not errors — replaying a queued action
//! batch must be idempotent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::store::{StateStore, StorageOwner};
use crate::tags::TagSet;

/// Storage key for the serialized ledger.
const LEDGER_KEY: &str = "timeline";

/// Which clock a duration query trusts.
///
/// `Server` uses wall-clock timestamps measured when requests arrived.
/// `Client` prefers the duration the client reported for a range (its own
/// monotonic measurement), falling back to the server value when the client
/// reported nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockTarget {
    Client,
    Server,
}

/// One timed range in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    /// The scopes this range counts toward.
    pub tags: TagSet,
    /// When the range opened (server clock).
    pub started_at: DateTime<Utc>,
    /// When the range closed; `None` while the range is open.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Client-reported effective duration for this range, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_duration_ms: Option<u64>,
}

impl TimeRange {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Elapsed milliseconds for this range against the given clock target.
    ///
    /// Open ranges count up to `now`. Negative spans (clock skew) clamp to
    /// zero before being surfaced.
    pub fn duration_ms(&self, target: ClockTarget, now: DateTime<Utc>) -> u64 {
        let server_ms = |end: DateTime<Utc>| -> u64 {
            end.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64
        };
        match self.ended_at {
            None => server_ms(now),
            Some(end) => match (target, self.client_duration_ms) {
                (ClockTarget::Client, Some(ms)) => ms,
                _ => server_ms(end),
            },
        }
    }
}

/// The append-only timer ledger for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimerLedger {
    ranges: Vec<TimeRange>,
}

impl TimerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a range for the given tag set.
    ///
    /// If any of the tags already has an open range this is a no-op: the
    /// conflict is logged and the existing range keeps running. This makes
    /// replaying a queued `start` idempotent.
    pub fn start(&mut self, tags: TagSet, at: DateTime<Utc>) {
        if let Some(open) = self.ranges.iter().find(|r| r.is_open() && r.tags.intersects(&tags)) {
            tracing::warn!(
                requested = %tags,
                open = %open.tags,
                "start ignored: a matching range is already open"
            );
            return;
        }
        self.ranges.push(TimeRange {
            tags,
            started_at: at,
            ended_at: None,
            client_duration_ms: None,
        });
    }

    /// Close the most recent open range matching the tag set.
    ///
    /// Closing when nothing matching is open is a no-op logged as a warning,
    /// never an error.
    pub fn end(&mut self, tags: &TagSet, at: DateTime<Utc>) {
        match self
            .ranges
            .iter_mut()
            .rev()
            .find(|r| r.is_open() && r.tags.intersects(tags))
        {
            Some(range) => {
                if at < range.started_at {
                    tracing::warn!(
                        tags = %range.tags,
                        "end timestamp precedes start; clamping range to zero"
                    );
                    range.ended_at = Some(range.started_at);
                } else {
                    range.ended_at = Some(at);
                }
            }
            None => {
                tracing::warn!(requested = %tags, "end ignored: no matching open range");
            }
        }
    }

    /// Override the just-closed range's effective duration with a
    /// client-reported value.
    ///
    /// Used to reconcile client vs server clocks after an item visit. An
    /// absent value clears any previous override so the server measurement
    /// applies. A client value wildly larger than the server-measured span
    /// is tolerated but logged as a timing inconsistency — the action still
    /// completes.
    pub fn adjust(&mut self, tags: &TagSet, explicit_ms: Option<u64>) {
        let Some(range) = self
            .ranges
            .iter_mut()
            .rev()
            .find(|r| !r.is_open() && r.tags.intersects(tags))
        else {
            tracing::warn!(requested = %tags, "adjust ignored: no matching closed range");
            return;
        };

        match explicit_ms {
            None => {
                range.client_duration_ms = None;
            }
            Some(ms) => {
                let server_ms = range.duration_ms(ClockTarget::Server, range.started_at);
                if ms > server_ms.saturating_mul(2).max(server_ms + 1000) {
                    let err = SessionError::InconsistentDuration {
                        tags: tags.cache_key(),
                        detail: format!("client reported {ms}ms against {server_ms}ms measured"),
                    };
                    tracing::warn!(error = %err, "tolerating inconsistent client duration");
                }
                range.client_duration_ms = Some(ms);
            }
        }
    }

    /// Sum of all ranges whose tag set intersects the query.
    ///
    /// Open ranges contribute up to `now`. The result is already clamped to
    /// be non-negative.
    pub fn compute(&self, tags: &TagSet, target: ClockTarget, now: DateTime<Utc>) -> u64 {
        self.ranges
            .iter()
            .filter(|r| r.tags.intersects(tags))
            .map(|r| r.duration_ms(target, now))
            .sum()
    }

    /// Number of ranges matching the tag set (open or closed).
    pub fn range_count(&self, tags: &TagSet) -> usize {
        self.ranges.iter().filter(|r| r.tags.intersects(tags)).count()
    }

    /// True if some range matching the tag set is currently open.
    pub fn has_open(&self, tags: &TagSet) -> bool {
        self.ranges.iter().any(|r| r.is_open() && r.tags.intersects(tags))
    }

    /// Close every still-open range. Used by test termination as a final
    /// defensive sweep.
    pub fn close_all(&mut self, at: DateTime<Utc>) {
        for range in self.ranges.iter_mut().filter(|r| r.is_open()) {
            tracing::debug!(tags = %range.tags, "closing leftover open range");
            range.ended_at = Some(at.max(range.started_at));
        }
    }

    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Serialize the full ledger to its compact persisted form.
    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(&self.ranges).map_err(|e| SessionError::Storage(e.to_string()))
    }

    /// Restore a ledger from its persisted form.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let ranges: Vec<TimeRange> =
            serde_json::from_str(json).map_err(|e| SessionError::Storage(e.to_string()))?;
        Ok(Self { ranges })
    }

    /// Persist the whole ledger atomically. Partial writes are not a
    /// supported failure mode: the store either replaces the record or
    /// reports an error, and callers treat either outcome as all-or-nothing.
    pub async fn save(
        &self,
        store: &dyn StateStore,
        owner: &StorageOwner,
    ) -> Result<(), SessionError> {
        let json = self.to_json()?;
        store
            .set(owner, LEDGER_KEY, json)
            .await
            .map_err(|e| SessionError::Storage(format!("{e:#}")))
    }

    /// Load the ledger for a session, or an empty one if none was persisted.
    pub async fn load(
        store: &dyn StateStore,
        owner: &StorageOwner,
    ) -> Result<Self, SessionError> {
        match store
            .get(owner, LEDGER_KEY)
            .await
            .map_err(|e| SessionError::Storage(format!("{e:#}")))?
        {
            Some(json) => Self::from_json(&json),
            None => Ok(Self::new()),
        }
    }
}

/// Request-scoped duration cache.
///
/// Duration queries repeat heavily while building time constraints for a
/// single navigation request (the same section/part/test tags come up for
/// every scope). The cache key is `(target, sorted tag set)`; `now` is fixed
/// at construction so all durations within one request agree on the same
/// instant. Discard the cache when the request ends — it must not outlive a
/// ledger mutation.
#[derive(Debug)]
pub struct DurationCache {
    now: DateTime<Utc>,
    cached: HashMap<(ClockTarget, String), u64>,
}

impl DurationCache {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            cached: HashMap::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Compute (or recall) the duration for a tag set.
    pub fn compute(&mut self, ledger: &TimerLedger, tags: &TagSet, target: ClockTarget) -> u64 {
        let key = (target, tags.cache_key());
        if let Some(&ms) = self.cached.get(&key) {
            return ms;
        }
        let ms = ledger.compute(tags, target, self.now);
        self.cached.insert(key, ms);
        ms
    }
}
