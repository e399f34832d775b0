//! Timer strategies.
//!
//! Each strategy is a predicate-plus-behavior pair: given a timer it either
//! declines to apply or returns a behavior exposing a subset of the
//! lifecycle hooks. The handler evaluates every registered strategy when a
//! timer is set up, fans hooks out to the strategies active for that timer,
//! and forgets the activation record on tear-down. A timer may have several
//! strategies active at once; hook invocation is synchronous within one
//! timer, and strategies never run their own polling loops.

mod enforced_stay;
mod extra_time;
mod guided_navigation;
mod timeout;
mod warn_section_leaving;

pub use enforced_stay::EnforcedStay;
pub use extra_time::{ExtraTimeStrategy, CONSUMED_EXTRA_TIME_PARAM};
pub use guided_navigation::GuidedNavigation;
pub use timeout::TimeoutStrategy;
pub use warn_section_leaving::WarnSectionLeaving;

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use proctor_core::map::{NavigationDirection, NavigationMode};
use proctor_core::tags::{Scope, Tag};

/// What kind of bound a timer enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Minimum time that must be spent.
    Min,
    /// Maximum time allowed.
    Max,
    /// The item is locked for a fixed duration (guided delivery).
    Locked,
}

/// A client-side timer bound to one entity and scope.
#[derive(Debug, Clone)]
pub struct Timer {
    pub kind: TimerKind,
    pub scope: Scope,
    /// The entity the timer belongs to.
    pub entity: Tag,
    pub remaining_ms: u64,
    /// Extra-time budget allotted to this timer.
    pub extra_time_ms: u64,
    /// Consumed extra time previously reported for this timer.
    pub consumed_extra_ms: u64,
    pub navigation_mode: NavigationMode,
    /// Whether guided (auto-advancing) delivery is configured.
    pub guided_navigation: bool,
}

impl Timer {
    pub fn key(&self) -> TimerKey {
        (self.entity.clone(), self.kind)
    }
}

/// Identifies a timer's activation record.
pub type TimerKey = (Tag, TimerKind);

/// The narrow surface strategies act on. Rendering is a collaborator's
/// concern; these are the effects the delivery shell exposes.
pub trait DeliveryActions {
    fn disable_navigation(&mut self);
    fn enable_navigation(&mut self);
    fn hide_navigation(&mut self);
    fn show_navigation(&mut self);
    fn disable_item(&mut self);
    /// Trigger a forward move after `delay_ms`.
    fn schedule_forward_move(&mut self, delay_ms: u64);
    /// Raise a timeout against an entity and scope.
    fn raise_timeout(&mut self, source: &Tag, scope: Scope);
}

/// A navigation about to be performed, as seen by before-navigation hooks.
#[derive(Debug, Clone)]
pub struct NavigationIntent {
    pub direction: NavigationDirection,
    pub scope: Scope,
    /// Whether the move would leave the currently active timed section.
    pub leaving_timed_section: bool,
    /// Whether an end-of-test warning already covered this navigation.
    pub end_test_warning_shown: bool,
    /// Caller opted out of leave warnings.
    pub skip_leave_warnings: bool,
    /// Parameters attached to the outgoing navigation request.
    pub parameters: BTreeMap<String, Value>,
}

impl NavigationIntent {
    pub fn new(direction: NavigationDirection, scope: Scope) -> Self {
        Self {
            direction,
            scope,
            leaving_timed_section: false,
            end_test_warning_shown: false,
            skip_leave_warnings: false,
            parameters: BTreeMap::new(),
        }
    }
}

/// Verdict of the before-navigation hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    /// Block pending explicit user confirmation.
    AwaitConfirmation { message: String },
}

/// Lifecycle hooks a strategy may implement. All default to no-ops.
pub trait StrategyBehavior: Send {
    fn set_up(&mut self, _timer: &Timer, _ui: &mut dyn DeliveryActions) {}
    fn start(&mut self, _timer: &Timer, _ui: &mut dyn DeliveryActions) {}
    fn stop(&mut self, _timer: &Timer, _ui: &mut dyn DeliveryActions) {}
    fn complete(&mut self, _timer: &Timer, _ui: &mut dyn DeliveryActions) {}
    fn tear_down(&mut self, _timer: &Timer, _ui: &mut dyn DeliveryActions) {}

    /// Inspect (and amend) a pending navigation. Returning
    /// `AwaitConfirmation` blocks it until the user decides.
    fn before_navigation(
        &mut self,
        _timer: &Timer,
        _intent: &mut NavigationIntent,
    ) -> GuardDecision {
        GuardDecision::Proceed
    }
}

/// A strategy either declines a timer or yields a behavior for it.
pub trait TimerStrategy: Send + Sync {
    fn applies_to(&self, timer: &Timer) -> Option<Box<dyn StrategyBehavior>>;
}

struct ActiveTimer {
    timer: Timer,
    behaviors: Vec<Box<dyn StrategyBehavior>>,
}

/// Registry of strategies plus the activation records of live timers.
#[derive(Default)]
pub struct StrategyHandler {
    strategies: Vec<Box<dyn TimerStrategy>>,
    active: HashMap<TimerKey, ActiveTimer>,
}

impl StrategyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler with the stock strategies, in evaluation order.
    pub fn with_default_strategies() -> Self {
        let mut handler = Self::new();
        handler.register(Box::new(EnforcedStay));
        handler.register(Box::new(ExtraTimeStrategy));
        handler.register(Box::new(GuidedNavigation));
        handler.register(Box::new(TimeoutStrategy));
        handler.register(Box::new(WarnSectionLeaving));
        handler
    }

    pub fn register(&mut self, strategy: Box<dyn TimerStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of behaviors active for one timer.
    pub fn behaviors_for(&self, key: &TimerKey) -> usize {
        self.active.get(key).map(|a| a.behaviors.len()).unwrap_or(0)
    }

    /// Evaluate every registered strategy against the timer and activate
    /// all that apply.
    pub fn set_up(&mut self, timer: Timer, ui: &mut dyn DeliveryActions) {
        let mut behaviors: Vec<Box<dyn StrategyBehavior>> = self
            .strategies
            .iter()
            .filter_map(|s| s.applies_to(&timer))
            .collect();
        for behavior in &mut behaviors {
            behavior.set_up(&timer, ui);
        }
        self.active.insert(timer.key(), ActiveTimer { timer, behaviors });
    }

    /// Refresh a live timer's remaining time (driven by the countdown tick).
    pub fn on_tick(&mut self, key: &TimerKey, remaining_ms: u64) {
        if let Some(active) = self.active.get_mut(key) {
            active.timer.remaining_ms = remaining_ms;
        }
    }

    pub fn start(&mut self, key: &TimerKey, ui: &mut dyn DeliveryActions) {
        self.fan_out(key, ui, |b, t, ui| b.start(t, ui));
    }

    pub fn stop(&mut self, key: &TimerKey, ui: &mut dyn DeliveryActions) {
        self.fan_out(key, ui, |b, t, ui| b.stop(t, ui));
    }

    pub fn complete(&mut self, key: &TimerKey, ui: &mut dyn DeliveryActions) {
        self.fan_out(key, ui, |b, t, ui| b.complete(t, ui));
    }

    /// Fan out tear-down, then forget the timer's activation record.
    pub fn tear_down(&mut self, key: &TimerKey, ui: &mut dyn DeliveryActions) {
        if let Some(mut active) = self.active.remove(key) {
            for behavior in &mut active.behaviors {
                behavior.tear_down(&active.timer, ui);
            }
        }
    }

    fn fan_out(
        &mut self,
        key: &TimerKey,
        ui: &mut dyn DeliveryActions,
        mut hook: impl FnMut(&mut dyn StrategyBehavior, &Timer, &mut dyn DeliveryActions),
    ) {
        if let Some(active) = self.active.get_mut(key) {
            for behavior in &mut active.behaviors {
                hook(behavior.as_mut(), &active.timer, ui);
            }
        }
    }

    /// Run every active timer's before-navigation hooks against a pending
    /// navigation. Parameter-attaching hooks always run; the first blocking
    /// verdict wins.
    pub fn before_navigation(&mut self, intent: &mut NavigationIntent) -> GuardDecision {
        let mut decision = GuardDecision::Proceed;
        for active in self.active.values_mut() {
            for behavior in &mut active.behaviors {
                match behavior.before_navigation(&active.timer, intent) {
                    GuardDecision::Proceed => {}
                    block @ GuardDecision::AwaitConfirmation { .. } => {
                        if decision == GuardDecision::Proceed {
                            decision = block;
                        }
                    }
                }
            }
        }
        decision
    }

    /// The user cancelled a guarded navigation; restore the controls the
    /// guard disabled.
    pub fn navigation_cancelled(&mut self, ui: &mut dyn DeliveryActions) {
        ui.enable_navigation();
        ui.show_navigation();
    }
}

/// Fold parameters the before-navigation hooks attached into the outgoing
/// action, so the server sees what the client's timers reported.
pub fn apply_navigation_parameters(action: &mut proctor_core::action::Action, intent: &NavigationIntent) {
    use proctor_core::action::Action;

    let reported = intent
        .parameters
        .get(extra_time::CONSUMED_EXTRA_TIME_PARAM)
        .and_then(|v| v.as_u64());
    let Some(reported) = reported else {
        return;
    };

    let consumed = match action {
        Action::Move {
            consumed_extra_time_ms,
            ..
        }
        | Action::Skip {
            consumed_extra_time_ms,
            ..
        }
        | Action::Timeout {
            consumed_extra_time_ms,
            ..
        } => consumed_extra_time_ms,
        _ => return,
    };
    *consumed = Some(consumed.unwrap_or(0).max(reported));
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Records every delivery effect for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingUi {
        pub calls: Vec<String>,
    }

    impl DeliveryActions for RecordingUi {
        fn disable_navigation(&mut self) {
            self.calls.push("disable_navigation".into());
        }
        fn enable_navigation(&mut self) {
            self.calls.push("enable_navigation".into());
        }
        fn hide_navigation(&mut self) {
            self.calls.push("hide_navigation".into());
        }
        fn show_navigation(&mut self) {
            self.calls.push("show_navigation".into());
        }
        fn disable_item(&mut self) {
            self.calls.push("disable_item".into());
        }
        fn schedule_forward_move(&mut self, delay_ms: u64) {
            self.calls.push(format!("schedule_forward_move:{delay_ms}"));
        }
        fn raise_timeout(&mut self, source: &Tag, scope: Scope) {
            self.calls.push(format!("raise_timeout:{source}:{scope}"));
        }
    }

    pub fn max_timer(entity: &str, scope: Scope, remaining_ms: u64, extra_time_ms: u64) -> Timer {
        Timer {
            kind: TimerKind::Max,
            scope,
            entity: Tag::new(entity),
            remaining_ms,
            extra_time_ms,
            consumed_extra_ms: 0,
            navigation_mode: NavigationMode::Linear,
            guided_navigation: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{max_timer, RecordingUi};
    use super::*;

    #[test]
    fn max_timer_activates_multiple_strategies() {
        let mut handler = StrategyHandler::with_default_strategies();
        let mut ui = RecordingUi::default();

        // A section max timer picks up extra-time, timeout, and the
        // section-leave warning all at once.
        let timer = max_timer("section-A", Scope::Section, 600_000, 10_000);
        let key = timer.key();
        handler.set_up(timer, &mut ui);
        assert_eq!(handler.active_count(), 1);
        assert_eq!(handler.behaviors_for(&key), 3);
    }

    #[test]
    fn hooks_fan_out_within_one_timer_only() {
        let mut handler = StrategyHandler::with_default_strategies();
        let mut ui = RecordingUi::default();

        let section = max_timer("section-A", Scope::Section, 600_000, 0);
        let item = max_timer("item-1", Scope::Item, 90_000, 0);
        let section_key = section.key();
        let item_key = item.key();
        handler.set_up(section, &mut ui);
        handler.set_up(item, &mut ui);

        // Completing the item timer raises a timeout for the item only.
        handler.complete(&item_key, &mut ui);
        assert_eq!(ui.calls, vec!["raise_timeout:item-1:item"]);

        ui.calls.clear();
        handler.complete(&section_key, &mut ui);
        assert_eq!(ui.calls, vec!["raise_timeout:section-A:section"]);
    }

    #[test]
    fn tear_down_forgets_the_activation_record() {
        let mut handler = StrategyHandler::with_default_strategies();
        let mut ui = RecordingUi::default();

        let timer = max_timer("item-1", Scope::Item, 90_000, 0);
        let key = timer.key();
        handler.set_up(timer, &mut ui);
        assert_eq!(handler.active_count(), 1);

        handler.tear_down(&key, &mut ui);
        assert_eq!(handler.active_count(), 0);

        // Hooks on a torn-down timer are no-ops.
        ui.calls.clear();
        handler.complete(&key, &mut ui);
        assert!(ui.calls.is_empty());
    }

    #[test]
    fn on_tick_refreshes_remaining_time() {
        let mut handler = StrategyHandler::with_default_strategies();
        let mut ui = RecordingUi::default();

        let timer = max_timer("item-1", Scope::Item, 90_000, 10_000);
        let key = timer.key();
        handler.set_up(timer, &mut ui);
        handler.on_tick(&key, 4_000);

        let mut intent =
            NavigationIntent::new(NavigationDirection::Next, Scope::Item);
        handler.before_navigation(&mut intent);
        assert_eq!(
            intent.parameters.get("consumedExtraTime"),
            Some(&serde_json::json!(6_000))
        );
    }

    #[test]
    fn attached_parameters_reach_the_outgoing_action() {
        use proctor_core::action::Action;

        let mut intent = NavigationIntent::new(NavigationDirection::Next, Scope::Item);
        intent
            .parameters
            .insert("consumedExtraTime".to_string(), serde_json::json!(6_000));

        let mut action = Action::Move {
            direction: NavigationDirection::Next,
            scope: Scope::Item,
            position: None,
            start_timer: true,
            item_duration_ms: None,
            item_state: None,
            item_response: None,
            consumed_extra_time_ms: Some(2_000),
        };
        apply_navigation_parameters(&mut action, &intent);
        match action {
            Action::Move {
                consumed_extra_time_ms,
                ..
            } => assert_eq!(consumed_extra_time_ms, Some(6_000)),
            other => panic!("unexpected action: {other:?}"),
        }

        // Non-navigation actions are untouched.
        let mut pause = Action::Pause { reason: None };
        apply_navigation_parameters(&mut pause, &intent);
        assert_eq!(pause, Action::Pause { reason: None });
    }
}
