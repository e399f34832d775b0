//! Timeout strategy: a completed maximum timer raises a timeout against
//! its owning entity and scope.

use super::{DeliveryActions, StrategyBehavior, Timer, TimerKind, TimerStrategy};

pub struct TimeoutStrategy;

impl TimerStrategy for TimeoutStrategy {
    fn applies_to(&self, timer: &Timer) -> Option<Box<dyn StrategyBehavior>> {
        (timer.kind == TimerKind::Max)
            .then(|| Box::new(TimeoutBehavior) as Box<dyn StrategyBehavior>)
    }
}

struct TimeoutBehavior;

impl StrategyBehavior for TimeoutBehavior {
    fn complete(&mut self, timer: &Timer, ui: &mut dyn DeliveryActions) {
        ui.raise_timeout(&timer.entity, timer.scope);
    }
}
