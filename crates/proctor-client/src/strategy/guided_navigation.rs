//! Guided-navigation strategy: a locked item timer in a guided linear part
//! hides navigation and advances the test on its own when time is up.

use proctor_core::map::NavigationMode;
use proctor_core::tags::Scope;

use super::{DeliveryActions, StrategyBehavior, Timer, TimerKind, TimerStrategy};

/// Delay before the automatic forward move, giving the taker a beat to see
/// the item lock.
const AUTO_MOVE_DELAY_MS: u64 = 700;

pub struct GuidedNavigation;

impl TimerStrategy for GuidedNavigation {
    fn applies_to(&self, timer: &Timer) -> Option<Box<dyn StrategyBehavior>> {
        let applies = timer.kind == TimerKind::Locked
            && timer.scope == Scope::Item
            && timer.navigation_mode == NavigationMode::Linear
            && timer.guided_navigation;
        applies.then(|| Box::new(GuidedNavigationBehavior) as Box<dyn StrategyBehavior>)
    }
}

struct GuidedNavigationBehavior;

impl StrategyBehavior for GuidedNavigationBehavior {
    fn set_up(&mut self, _timer: &Timer, ui: &mut dyn DeliveryActions) {
        ui.hide_navigation();
    }

    fn complete(&mut self, _timer: &Timer, ui: &mut dyn DeliveryActions) {
        ui.disable_item();
        ui.hide_navigation();
        ui.schedule_forward_move(AUTO_MOVE_DELAY_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::RecordingUi;
    use super::super::StrategyHandler;
    use super::*;
    use proctor_core::tags::Tag;

    fn locked_timer(guided: bool) -> Timer {
        Timer {
            kind: TimerKind::Locked,
            scope: Scope::Item,
            entity: Tag::new("item-1"),
            remaining_ms: 30_000,
            extra_time_ms: 0,
            consumed_extra_ms: 0,
            navigation_mode: NavigationMode::Linear,
            guided_navigation: guided,
        }
    }

    #[test]
    fn requires_guided_configuration() {
        assert!(GuidedNavigation.applies_to(&locked_timer(true)).is_some());
        assert!(GuidedNavigation.applies_to(&locked_timer(false)).is_none());
    }

    #[test]
    fn completion_locks_the_item_and_schedules_the_move() {
        let mut handler = StrategyHandler::new();
        handler.register(Box::new(GuidedNavigation));
        let mut ui = RecordingUi::default();

        let timer = locked_timer(true);
        let key = timer.key();
        handler.set_up(timer, &mut ui);
        assert_eq!(ui.calls, vec!["hide_navigation"]);

        ui.calls.clear();
        handler.complete(&key, &mut ui);
        assert_eq!(
            ui.calls,
            vec![
                "disable_item",
                "hide_navigation",
                "schedule_forward_move:700"
            ]
        );
    }
}
