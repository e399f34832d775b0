//! Extra-time strategy: reports how much of the extra-time budget a
//! maximum timer has eaten, as a parameter on the next navigation request.

use super::{
    GuardDecision, NavigationIntent, StrategyBehavior, Timer, TimerKind, TimerStrategy,
};

/// The navigation parameter carrying the consumed total.
pub const CONSUMED_EXTRA_TIME_PARAM: &str = "consumedExtraTime";

pub struct ExtraTimeStrategy;

impl TimerStrategy for ExtraTimeStrategy {
    fn applies_to(&self, timer: &Timer) -> Option<Box<dyn StrategyBehavior>> {
        (timer.kind == TimerKind::Max)
            .then(|| Box::new(ExtraTimeBehavior) as Box<dyn StrategyBehavior>)
    }
}

struct ExtraTimeBehavior;

impl StrategyBehavior for ExtraTimeBehavior {
    fn before_navigation(
        &mut self,
        timer: &Timer,
        intent: &mut NavigationIntent,
    ) -> GuardDecision {
        // Once the remaining time falls inside the extra-time budget, the
        // deficit is what this timer has consumed of it.
        let local = timer.extra_time_ms.saturating_sub(timer.remaining_ms);
        let previously_reported = timer.consumed_extra_ms.min(timer.extra_time_ms);

        let already_attached = intent
            .parameters
            .get(CONSUMED_EXTRA_TIME_PARAM)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        // Concurrently active timers each report; the largest value wins.
        let consumed = local.max(previously_reported).max(already_attached);
        if consumed > 0 {
            intent.parameters.insert(
                CONSUMED_EXTRA_TIME_PARAM.to_string(),
                serde_json::json!(consumed),
            );
        }
        GuardDecision::Proceed
    }
}
