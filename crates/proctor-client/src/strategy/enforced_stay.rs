//! Enforced-stay strategy: a minimum time on an item under linear
//! navigation keeps the taker on it until the timer completes.

use proctor_core::map::NavigationMode;
use proctor_core::tags::Scope;

use super::{DeliveryActions, StrategyBehavior, Timer, TimerKind, TimerStrategy};

pub struct EnforcedStay;

impl TimerStrategy for EnforcedStay {
    fn applies_to(&self, timer: &Timer) -> Option<Box<dyn StrategyBehavior>> {
        let applies = timer.kind == TimerKind::Min
            && timer.scope == Scope::Item
            && timer.navigation_mode == NavigationMode::Linear;
        applies.then(|| Box::new(EnforcedStayBehavior) as Box<dyn StrategyBehavior>)
    }
}

struct EnforcedStayBehavior;

impl StrategyBehavior for EnforcedStayBehavior {
    fn set_up(&mut self, _timer: &Timer, ui: &mut dyn DeliveryActions) {
        ui.disable_navigation();
    }

    fn complete(&mut self, _timer: &Timer, ui: &mut dyn DeliveryActions) {
        ui.enable_navigation();
    }
}
