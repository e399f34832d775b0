//! Section-leave warning: a move that would abandon the currently active
//! timed section is blocked pending explicit confirmation.
//!
//! Precedence with the end-of-test warning is explicit: when that warning
//! already fired for this navigation, the section guard stands down rather
//! than stacking a second dialog.

use proctor_core::tags::Scope;

use super::{
    GuardDecision, NavigationIntent, StrategyBehavior, Timer, TimerKind, TimerStrategy,
};

pub struct WarnSectionLeaving;

impl TimerStrategy for WarnSectionLeaving {
    fn applies_to(&self, timer: &Timer) -> Option<Box<dyn StrategyBehavior>> {
        let applies = timer.kind == TimerKind::Max && timer.scope == Scope::Section;
        applies.then(|| Box::new(WarnSectionLeavingBehavior) as Box<dyn StrategyBehavior>)
    }
}

struct WarnSectionLeavingBehavior;

impl StrategyBehavior for WarnSectionLeavingBehavior {
    fn before_navigation(
        &mut self,
        timer: &Timer,
        intent: &mut NavigationIntent,
    ) -> GuardDecision {
        if !intent.leaving_timed_section
            || intent.end_test_warning_shown
            || intent.skip_leave_warnings
        {
            return GuardDecision::Proceed;
        }
        GuardDecision::AwaitConfirmation {
            message: format!(
                "Leaving the timed section '{}' — the remaining section time will be lost.",
                timer.entity
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{max_timer, RecordingUi};
    use super::super::StrategyHandler;
    use super::*;
    use proctor_core::map::NavigationDirection;

    fn handler_with_section_timer() -> StrategyHandler {
        let mut handler = StrategyHandler::new();
        handler.register(Box::new(WarnSectionLeaving));
        let mut ui = RecordingUi::default();
        handler.set_up(
            max_timer("section-A", Scope::Section, 300_000, 0),
            &mut ui,
        );
        handler
    }

    fn leaving_intent() -> NavigationIntent {
        let mut intent = NavigationIntent::new(NavigationDirection::Next, Scope::Item);
        intent.leaving_timed_section = true;
        intent
    }

    #[test]
    fn blocks_a_section_leaving_move() {
        let mut handler = handler_with_section_timer();
        let mut intent = leaving_intent();
        match handler.before_navigation(&mut intent) {
            GuardDecision::AwaitConfirmation { message } => {
                assert!(message.contains("section-A"));
            }
            GuardDecision::Proceed => panic!("expected the guard to block"),
        }
    }

    #[test]
    fn moves_inside_the_section_proceed() {
        let mut handler = handler_with_section_timer();
        let mut intent = NavigationIntent::new(NavigationDirection::Next, Scope::Item);
        assert_eq!(handler.before_navigation(&mut intent), GuardDecision::Proceed);
    }

    #[test]
    fn end_of_test_warning_takes_precedence() {
        let mut handler = handler_with_section_timer();
        let mut intent = leaving_intent();
        intent.end_test_warning_shown = true;
        assert_eq!(handler.before_navigation(&mut intent), GuardDecision::Proceed);
    }

    #[test]
    fn caller_opt_out_is_honored() {
        let mut handler = handler_with_section_timer();
        let mut intent = leaving_intent();
        intent.skip_leave_warnings = true;
        assert_eq!(handler.before_navigation(&mut intent), GuardDecision::Proceed);
    }

    #[test]
    fn cancellation_restores_navigation_controls() {
        let mut handler = handler_with_section_timer();
        let mut ui = RecordingUi::default();
        handler.navigation_cancelled(&mut ui);
        assert_eq!(ui.calls, vec!["enable_navigation", "show_navigation"]);
    }
}
