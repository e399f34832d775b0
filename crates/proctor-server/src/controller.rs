//! The synchronization action controller.
//!
//! One controller instance serves one test definition; each inbound action
//! runs as its own request against an explicit [`SessionContext`]. The
//! controller closes and reopens ledger ranges around navigation, validates
//! responses, persists state through the storage seam, and converts every
//! failure into a uniform [`ActionOutcome`] — errors never cross the
//! transport boundary as anything else.
//!
//! Within one request all ledger mutations are synchronous; on error the
//! already-applied mutations stand (they are idempotent to replay) but no
//! further step executes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use proctor_core::action::{Action, ActionOutcome, NavigationContext, QueuedAction};
use proctor_core::constraint::{end_item_timer, ConstraintOptions, TimeConstraints};
use proctor_core::error::SessionError;
use proctor_core::ledger::DurationCache;
use proctor_core::map::TestMap;
use proctor_core::session::{SessionContext, SessionState};
use proctor_core::store::StateStore;
use proctor_core::tags::Scope;

use crate::events::{EventSink, SessionEvent};
use crate::session_store;
use crate::validation;

/// Per-request orchestrator for one test definition.
pub struct SyncActionController {
    map: TestMap,
    store: Arc<dyn StateStore>,
    events: Arc<dyn EventSink>,
}

impl SyncActionController {
    pub fn new(map: TestMap, store: Arc<dyn StateStore>, events: Arc<dyn EventSink>) -> Self {
        Self { map, store, events }
    }

    pub fn map(&self) -> &TestMap {
        &self.map
    }

    /// Start a not-yet-started session: opens the first item's timer range
    /// and moves the state machine to running.
    pub async fn begin(&self, ctx: &mut SessionContext, at: DateTime<Utc>) -> ActionOutcome {
        if ctx.state != SessionState::NotStarted {
            return ActionOutcome::failure(&SessionError::InvalidSessionState {
                action: "begin".into(),
                state: ctx.state.to_string(),
            });
        }
        ctx.state = SessionState::Running;
        ctx.position = ctx.extended.href_index.unwrap_or(0);
        ctx.extra_time = proctor_core::extra_time::ExtraTimePool::new(self.map.extra_time_ms);
        if let Some(tags) = self.map.tags_at(ctx.position) {
            ctx.ledger.start(tags, at);
        }
        ctx.extended.set_href_index(ctx.position);

        match session_store::persist_session(self.store.as_ref(), ctx).await {
            Ok(()) => ActionOutcome::ok(self.context_of(ctx, at)),
            Err(e) => ActionOutcome::failure(&e),
        }
    }

    /// Dispatch one action against the session.
    ///
    /// Required parameters are checked before any side effect. The action's
    /// own timestamp drives the ledger, so a replayed offline batch lands
    /// the ranges where they actually happened.
    pub async fn dispatch(&self, ctx: &mut SessionContext, queued: &QueuedAction) -> ActionOutcome {
        if let Err(e) = queued.action.validate() {
            return ActionOutcome::failure(&e);
        }

        match self.handle(ctx, queued).await {
            Ok(context) => ActionOutcome::ok(context),
            Err(e) => {
                tracing::error!(
                    action = queued.action.name(),
                    session = %ctx.session_id,
                    error = %e,
                    "action failed"
                );
                // Applied ledger changes stand; persist them so a replay of
                // the same action stays idempotent.
                if let Err(persist_err) =
                    session_store::persist_session(self.store.as_ref(), ctx).await
                {
                    tracing::warn!(error = %persist_err, "could not persist after failure");
                }
                ActionOutcome::failure(&e)
            }
        }
    }

    /// Dispatch a flushed offline batch in exact queue order.
    ///
    /// Processing continues after per-action failures — later actions may
    /// be independent of the failed one — and the caller inspects the
    /// per-action outcomes.
    pub async fn dispatch_batch(
        &self,
        ctx: &mut SessionContext,
        batch: &[QueuedAction],
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for queued in batch {
            outcomes.push(self.dispatch(ctx, queued).await);
        }
        outcomes
    }

    async fn handle(
        &self,
        ctx: &mut SessionContext,
        queued: &QueuedAction,
    ) -> Result<NavigationContext, SessionError> {
        let at = queued.created_at;
        match &queued.action {
            Action::Move {
                direction,
                scope,
                position,
                start_timer,
                item_duration_ms,
                item_state,
                item_response,
                consumed_extra_time_ms,
            } => {
                self.ensure_not_terminated(ctx, "move")?;
                self.close_current_item(ctx, at, *item_duration_ms, *consumed_extra_time_ms);

                let entry = self.current_entry(ctx)?;
                if let Some(state) = item_state {
                    session_store::persist_item_state(
                        self.store.as_ref(),
                        &ctx.owner(),
                        &entry.item,
                        state,
                    )
                    .await?;
                }

                validation::ensure_response_allowed(&self.map, &entry.item, item_response.as_ref())?;
                if let Some(response) = item_response {
                    session_store::persist_item_response(
                        self.store.as_ref(),
                        &ctx.owner(),
                        &entry.item,
                        response,
                    )
                    .await?;
                    ctx.extended.flags_mut(&entry.item).answered =
                        !validation::is_empty_response(Some(response));
                }

                if queued.offline {
                    ctx.extended.mark_offline_aware();
                }

                self.navigate(ctx, at, *direction, *scope, *position, *start_timer);
                session_store::persist_session(self.store.as_ref(), ctx).await?;
                Ok(self.context_of(ctx, at))
            }

            Action::Skip {
                scope,
                start_timer,
                item_duration_ms,
                consumed_extra_time_ms,
            } => {
                self.ensure_not_terminated(ctx, "skip")?;
                self.close_current_item(ctx, at, *item_duration_ms, *consumed_extra_time_ms);

                // Skipping leaves no response behind, so the allow-skip rule
                // applies with an empty one.
                let entry = self.current_entry(ctx)?;
                validation::ensure_response_allowed(&self.map, &entry.item, None)?;

                if queued.offline {
                    ctx.extended.mark_offline_aware();
                }

                self.navigate(
                    ctx,
                    at,
                    proctor_core::map::NavigationDirection::Next,
                    *scope,
                    None,
                    *start_timer,
                );
                session_store::persist_session(self.store.as_ref(), ctx).await?;
                Ok(self.context_of(ctx, at))
            }

            Action::Timeout {
                scope,
                source,
                start_timer,
                item_duration_ms,
                item_response,
                consumed_extra_time_ms,
            } => {
                self.ensure_not_terminated(ctx, "timeout")?;
                self.close_current_item(ctx, at, *item_duration_ms, *consumed_extra_time_ms);

                // Whatever was on screen when time ran out is kept; a
                // timeout is not subject to allow-skip validation.
                if let Some(response) = item_response {
                    let entry = self.current_entry(ctx)?;
                    session_store::persist_item_response(
                        self.store.as_ref(),
                        &ctx.owner(),
                        &entry.item,
                        response,
                    )
                    .await?;
                }

                if queued.offline {
                    ctx.extended.mark_offline_aware();
                }

                self.events.emit(&SessionEvent::TimeoutRaised {
                    session_id: ctx.session_id.clone(),
                    source: source.clone(),
                    scope: *scope,
                });

                if *scope == Scope::Test {
                    ctx.state = SessionState::TimedOut;
                    ctx.ledger.close_all(at);
                } else {
                    // Step past the expired scope; running out of map means
                    // the whole sitting is over.
                    self.navigate(
                        ctx,
                        at,
                        proctor_core::map::NavigationDirection::Next,
                        *scope,
                        None,
                        *start_timer,
                    );
                    if ctx.state == SessionState::Terminated {
                        ctx.state = SessionState::TimedOut;
                    }
                }
                session_store::persist_session(self.store.as_ref(), ctx).await?;
                Ok(self.context_of(ctx, at))
            }

            Action::Pause { reason } => {
                self.ensure_not_terminated(ctx, "pause")?;
                // Pause suspends the session without touching ranges.
                ctx.state = SessionState::Suspended;
                if let Some(reason) = reason {
                    tracing::info!(session = %ctx.session_id, reason, "session paused");
                }
                self.events.emit(&SessionEvent::SessionSuspended {
                    session_id: ctx.session_id.clone(),
                });
                session_store::persist_session(self.store.as_ref(), ctx).await?;
                Ok(self.context_of(ctx, at))
            }

            Action::ExitTest {
                item_state,
                item_response,
                item_duration_ms,
            } => {
                if ctx.state.is_terminal() {
                    return Ok(self.context_of(ctx, at));
                }
                self.close_current_item(ctx, at, *item_duration_ms, None);

                let entry = self.current_entry(ctx)?;
                if let Some(state) = item_state {
                    session_store::persist_item_state(
                        self.store.as_ref(),
                        &ctx.owner(),
                        &entry.item,
                        state,
                    )
                    .await?;
                }
                if let Some(response) = item_response {
                    session_store::persist_item_response(
                        self.store.as_ref(),
                        &ctx.owner(),
                        &entry.item,
                        response,
                    )
                    .await?;
                }

                if queued.offline {
                    ctx.extended.mark_offline_aware();
                }

                self.terminate(ctx, at);
                session_store::persist_session(self.store.as_ref(), ctx).await?;
                Ok(self.context_of(ctx, at))
            }

            Action::StoreTraceData { trace_data } => {
                let owner = ctx.owner();
                let total = trace_data.len();
                let mut stored = 0usize;
                for (identifier, value) in trace_data {
                    match session_store::store_trace_variable(
                        self.store.as_ref(),
                        &owner,
                        identifier,
                        value,
                    )
                    .await
                    {
                        Ok(()) => stored += 1,
                        Err(e) => {
                            tracing::warn!(identifier, error = %e, "trace variable not stored");
                        }
                    }
                }

                // The event carries the full submitted payload even when
                // some stores failed.
                self.events.emit(&SessionEvent::TraceDataStored {
                    session_id: ctx.session_id.clone(),
                    values: trace_data.clone(),
                    stored,
                    total,
                });

                if stored == total {
                    Ok(self.context_of(ctx, at))
                } else {
                    Err(SessionError::Internal(format!(
                        "stored {stored} of {total} trace variables"
                    )))
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shared steps
    // -----------------------------------------------------------------------

    fn ensure_not_terminated(
        &self,
        ctx: &mut SessionContext,
        action: &str,
    ) -> Result<(), SessionError> {
        if ctx.state.is_terminal() {
            return Err(SessionError::InvalidSessionState {
                action: action.to_string(),
                state: ctx.state.to_string(),
            });
        }
        // A replayed batch may arrive before any explicit begin.
        if ctx.state == SessionState::NotStarted {
            ctx.state = SessionState::Running;
        }
        Ok(())
    }

    fn current_entry(
        &self,
        ctx: &SessionContext,
    ) -> Result<proctor_core::map::MapEntry, SessionError> {
        self.map.entry_at(ctx.position).ok_or_else(|| {
            SessionError::Internal(format!("no map entry at position {}", ctx.position))
        })
    }

    /// Close the current item's range, reconcile the client-reported
    /// duration, and settle extra time.
    fn close_current_item(
        &self,
        ctx: &mut SessionContext,
        at: DateTime<Utc>,
        item_duration_ms: Option<u64>,
        consumed_extra_time_ms: Option<u64>,
    ) {
        let target = ctx.clock_target();
        end_item_timer(
            &mut ctx.ledger,
            &self.map,
            ctx.position,
            &mut ctx.extra_time,
            at,
            item_duration_ms,
            target,
        );
        if let Some(reported) = consumed_extra_time_ms {
            ctx.extra_time.record_consumed(reported);
        }
    }

    /// Perform the requested navigation. The next item's range opens only
    /// when the request asked for the timer to (re)start, and only after
    /// the new position is established.
    fn navigate(
        &self,
        ctx: &mut SessionContext,
        at: DateTime<Utc>,
        direction: proctor_core::map::NavigationDirection,
        scope: Scope,
        explicit: Option<usize>,
        start_timer: bool,
    ) {
        match self
            .map
            .target_position(ctx.position, direction, scope, explicit)
        {
            Some(next) => {
                ctx.position = next;
                ctx.extended.set_href_index(next);
                if start_timer {
                    if let Some(tags) = self.map.tags_at(next) {
                        ctx.ledger.start(tags, at);
                    }
                }
            }
            // Walking forward off the end of the map ends the sitting; an
            // unresolvable backward move or jump keeps the position.
            None if direction == proctor_core::map::NavigationDirection::Next => {
                self.terminate(ctx, at);
            }
            None => {
                tracing::warn!(
                    position = ctx.position,
                    ?direction,
                    "navigation target could not be resolved"
                );
            }
        }
    }

    /// Terminate the session, defensively closing any still-open range.
    fn terminate(&self, ctx: &mut SessionContext, at: DateTime<Utc>) {
        ctx.ledger.close_all(at);
        ctx.state = SessionState::Terminated;
        self.events.emit(&SessionEvent::SessionTerminated {
            session_id: ctx.session_id.clone(),
        });
    }

    fn context_of(&self, ctx: &SessionContext, at: DateTime<Utc>) -> NavigationContext {
        let timed_out = ctx.state == SessionState::TimedOut || {
            let mut cache = DurationCache::new(at);
            TimeConstraints::build(
                &self.map,
                ctx.position,
                &ctx.ledger,
                &mut cache,
                ConstraintOptions::strict(ctx.clock_target()),
            )
            .is_timeout(&ctx.extra_time)
        };
        NavigationContext {
            position: ctx.position,
            state: ctx.state,
            timed_out,
        }
    }
}
