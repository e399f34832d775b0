//! Time-constraint evaluation.
//!
//! For a navigation point, the evaluator builds one [`TimeConstraint`] per
//! requested scope (item, section, test part, test) from the current ledger
//! state and the map's configured limits. Constraints are built fresh per
//! request and never persisted; the ledger is the only durable timing
//! record.

use std::ops::BitOr;

use chrono::{DateTime, Utc};

use crate::extra_time::ExtraTimePool;
use crate::ledger::{ClockTarget, DurationCache, TimerLedger};
use crate::map::{NavigationMode, TestMap};
use crate::tags::{Scope, Tag, TagSet};

/// Bit-flag selection of which scopes to evaluate. Defaults to all four.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeFlags(u8);

impl ScopeFlags {
    pub const ITEM: ScopeFlags = ScopeFlags(1);
    pub const SECTION: ScopeFlags = ScopeFlags(1 << 1);
    pub const TEST_PART: ScopeFlags = ScopeFlags(1 << 2);
    pub const TEST: ScopeFlags = ScopeFlags(1 << 3);
    pub const ALL: ScopeFlags = ScopeFlags(0b1111);

    pub fn contains(self, scope: Scope) -> bool {
        let flag = match scope {
            Scope::Item => Self::ITEM,
            Scope::Section => Self::SECTION,
            Scope::TestPart => Self::TEST_PART,
            Scope::Test => Self::TEST,
        };
        self.0 & flag.0 != 0
    }
}

impl Default for ScopeFlags {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for ScopeFlags {
    type Output = ScopeFlags;

    fn bitor(self, rhs: ScopeFlags) -> ScopeFlags {
        ScopeFlags(self.0 | rhs.0)
    }
}

/// How constraints are built for one request.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintOptions {
    /// Which scopes to evaluate.
    pub scopes: ScopeFlags,
    /// Whether minimum-time enforcement applies to this request.
    pub consider_min_time: bool,
    /// Whether the extra-time pool may stretch maximum bounds.
    pub apply_extra_time: bool,
    /// Which clock duration queries trust.
    pub target: ClockTarget,
}

impl Default for ConstraintOptions {
    fn default() -> Self {
        Self {
            scopes: ScopeFlags::ALL,
            consider_min_time: true,
            apply_extra_time: true,
            target: ClockTarget::Server,
        }
    }
}

impl ConstraintOptions {
    /// Strict settings for timeout detection: ignore min time, apply max.
    pub fn strict(target: ClockTarget) -> Self {
        Self {
            scopes: ScopeFlags::ALL,
            consider_min_time: false,
            apply_extra_time: true,
            target,
        }
    }
}

/// A single evaluated constraint for one scope.
#[derive(Debug, Clone)]
pub struct TimeConstraint {
    /// The entity the limits come from.
    pub source: Tag,
    pub scope: Scope,
    pub min_time_ms: Option<u64>,
    pub max_time_ms: Option<u64>,
    pub navigation_mode: NavigationMode,
    pub consider_min_time: bool,
    pub apply_extra_time: bool,
    /// Elapsed time for this scope, computed from the ledger.
    pub duration_ms: u64,
}

impl TimeConstraint {
    /// The max bound stretched by whatever extra time remains, when this
    /// constraint draws on the pool.
    pub fn effective_max_ms(&self, pool: &ExtraTimePool) -> Option<u64> {
        self.max_time_ms.map(|max| {
            if self.apply_extra_time {
                max + pool.remaining_ms()
            } else {
                max
            }
        })
    }

    /// Milliseconds left before the effective max bound, if one exists.
    pub fn remaining_ms(&self, pool: &ExtraTimePool) -> Option<u64> {
        self.effective_max_ms(pool)
            .map(|max| max.saturating_sub(self.duration_ms))
    }

    /// True once the effective max bound is used up.
    pub fn max_exceeded(&self, pool: &ExtraTimePool) -> bool {
        match self.effective_max_ms(pool) {
            Some(max) => self.duration_ms >= max,
            None => false,
        }
    }

    /// True while an enforced minimum has not yet been met.
    pub fn min_unmet(&self) -> bool {
        match (self.consider_min_time, self.min_time_ms) {
            (true, Some(min)) => self.duration_ms < min,
            _ => false,
        }
    }
}

/// The constraints relevant to one navigation point.
#[derive(Debug, Clone, Default)]
pub struct TimeConstraints {
    constraints: Vec<TimeConstraint>,
}

impl TimeConstraints {
    /// Build constraints for the item at `position`.
    pub fn build(
        map: &TestMap,
        position: usize,
        ledger: &TimerLedger,
        cache: &mut DurationCache,
        options: ConstraintOptions,
    ) -> Self {
        let mut constraints = Vec::new();
        let Some(entry) = map.entry_at(position) else {
            return Self { constraints };
        };
        let navigation_mode = map.navigation_mode_at(position);

        let sources = [
            (Scope::Item, entry.item.clone()),
            (Scope::Section, entry.section.clone()),
            (Scope::TestPart, entry.part.clone()),
            (Scope::Test, map.id.clone()),
        ];

        for (scope, source) in sources {
            if !options.scopes.contains(scope) {
                continue;
            }
            let Some(limits) = map.limits_for(scope, position) else {
                continue;
            };
            let duration_ms =
                cache.compute(ledger, &TagSet::single(source.clone()), options.target);
            constraints.push(TimeConstraint {
                source,
                scope,
                min_time_ms: limits.min_time_ms,
                max_time_ms: limits.max_time_ms,
                navigation_mode,
                consider_min_time: options.consider_min_time,
                apply_extra_time: options.apply_extra_time && limits.max_time_ms.is_some(),
                duration_ms,
            });
        }

        Self { constraints }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeConstraint> {
        self.constraints.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// True if any constraint's max bound is used up.
    ///
    /// The normal "not yet timed out" case is a plain `false`, never an
    /// error; only the exceeded case yields the timeout signal.
    pub fn is_timeout(&self, pool: &ExtraTimePool) -> bool {
        self.constraints.iter().any(|c| c.max_exceeded(pool))
    }

    /// Scopes whose enforced minimum is still unmet.
    pub fn unmet_minimums(&self) -> Vec<&TimeConstraint> {
        self.constraints.iter().filter(|c| c.min_unmet()).collect()
    }

    /// Total extra time drawn to date, measured against the most generous
    /// (maximum) applicable max-time bound: time spent beyond that bound
    /// came out of the pool.
    ///
    /// TODO: confirm with product whether the most generous bound is the
    /// intended base here, rather than the tightest.
    pub fn consumed_extra_time_ms(&self) -> u64 {
        self.constraints
            .iter()
            .filter(|c| c.apply_extra_time)
            .filter_map(|c| c.max_time_ms.map(|max| (max, c.duration_ms)))
            .max_by_key(|&(max, _)| max)
            .map(|(max, duration)| duration.saturating_sub(max))
            .unwrap_or(0)
    }
}

/// Result of closing an item's timer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemTimerClose {
    /// The item's total elapsed time after the close.
    pub item_duration_ms: u64,
    /// Extra time newly drawn from the pool by this visit.
    pub consumed_extra_ms: u64,
}

/// Close the active range for the current item and settle extra time.
///
/// The order here is significant: the range closes first, an explicit
/// client-reported duration (if any) is applied, and only then are the
/// constraints rebuilt — extra-time consumption must be measured against
/// durations that include the visit just ended, not the state before it.
pub fn end_item_timer(
    ledger: &mut TimerLedger,
    map: &TestMap,
    position: usize,
    pool: &mut ExtraTimePool,
    at: DateTime<Utc>,
    client_duration_ms: Option<u64>,
    target: ClockTarget,
) -> ItemTimerClose {
    let Some(entry) = map.entry_at(position) else {
        tracing::warn!(position, "end_item_timer at unknown position");
        return ItemTimerClose {
            item_duration_ms: 0,
            consumed_extra_ms: 0,
        };
    };
    let item_tags = TagSet::single(entry.item.clone());

    ledger.end(&item_tags, at);
    ledger.adjust(&item_tags, client_duration_ms);

    let mut cache = DurationCache::new(at);
    let constraints = TimeConstraints::build(
        map,
        position,
        ledger,
        &mut cache,
        ConstraintOptions::strict(target),
    );

    let before = pool.consumed_ms();
    pool.record_consumed(constraints.consumed_extra_time_ms());
    let consumed_extra_ms = pool.consumed_ms() - before;

    ItemTimerClose {
        item_duration_ms: cache.compute(ledger, &item_tags, target),
        consumed_extra_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::fixtures::two_part_map;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn secs(s: i64) -> chrono::Duration {
        chrono::Duration::seconds(s)
    }

    fn ledger_with_item1_open(map: &TestMap) -> TimerLedger {
        let mut ledger = TimerLedger::new();
        ledger.start(map.tags_at(0).unwrap(), t0());
        ledger
    }

    #[test]
    fn builds_one_constraint_per_limited_scope() {
        let map = two_part_map();
        let ledger = ledger_with_item1_open(&map);
        let mut cache = DurationCache::new(t0() + secs(10));

        let constraints = TimeConstraints::build(
            &map,
            0,
            &ledger,
            &mut cache,
            ConstraintOptions::default(),
        );

        // item-1 and section-A and the test carry limits; part-1 does not.
        assert_eq!(constraints.len(), 3);
        let scopes: Vec<Scope> = constraints.iter().map(|c| c.scope).collect();
        assert!(scopes.contains(&Scope::Item));
        assert!(scopes.contains(&Scope::Section));
        assert!(scopes.contains(&Scope::Test));
        for c in constraints.iter() {
            assert_eq!(c.duration_ms, 10_000);
            assert_eq!(c.navigation_mode, NavigationMode::Linear);
        }
    }

    #[test]
    fn scope_flags_filter_sources() {
        let map = two_part_map();
        let ledger = ledger_with_item1_open(&map);
        let mut cache = DurationCache::new(t0() + secs(10));

        let options = ConstraintOptions {
            scopes: ScopeFlags::ITEM | ScopeFlags::SECTION,
            ..Default::default()
        };
        let constraints = TimeConstraints::build(&map, 0, &ledger, &mut cache, options);
        assert_eq!(constraints.len(), 2);
        assert!(constraints.iter().all(|c| c.scope != Scope::Test));
    }

    #[test]
    fn not_timed_out_is_false_not_an_error() {
        let map = two_part_map();
        let ledger = ledger_with_item1_open(&map);
        let mut cache = DurationCache::new(t0() + secs(10));
        let pool = ExtraTimePool::new(0);

        let constraints = TimeConstraints::build(
            &map,
            0,
            &ledger,
            &mut cache,
            ConstraintOptions::strict(ClockTarget::Server),
        );
        assert!(!constraints.is_timeout(&pool));
    }

    #[test]
    fn timeout_when_item_max_exceeded() {
        let map = two_part_map();
        let ledger = ledger_with_item1_open(&map);
        // item-1 max is 90s; at 95s with no extra time, the item is out.
        let mut cache = DurationCache::new(t0() + secs(95));
        let pool = ExtraTimePool::new(0);

        let constraints = TimeConstraints::build(
            &map,
            0,
            &ledger,
            &mut cache,
            ConstraintOptions::strict(ClockTarget::Server),
        );
        assert!(constraints.is_timeout(&pool));
    }

    #[test]
    fn remaining_extra_time_defers_timeout() {
        let map = two_part_map();
        let ledger = ledger_with_item1_open(&map);
        let mut cache = DurationCache::new(t0() + secs(95));
        // 10s of extra time covers a 5s overrun of the 90s item bound.
        let pool = ExtraTimePool::new(10_000);

        let constraints = TimeConstraints::build(
            &map,
            0,
            &ledger,
            &mut cache,
            ConstraintOptions::strict(ClockTarget::Server),
        );
        assert!(!constraints.is_timeout(&pool));

        // Once the pool is drained the same durations do time out.
        let mut drained = pool;
        drained.consume(10_000);
        assert!(constraints.is_timeout(&drained));
    }

    #[test]
    fn min_time_enforcement_respects_consider_flag() {
        let map = two_part_map();
        let ledger = ledger_with_item1_open(&map);
        let mut cache = DurationCache::new(t0() + secs(2));

        let enforced = TimeConstraints::build(
            &map,
            0,
            &ledger,
            &mut cache,
            ConstraintOptions::default(),
        );
        // item-1 min is 5s; at 2s it is unmet.
        assert_eq!(enforced.unmet_minimums().len(), 1);

        let strict = TimeConstraints::build(
            &map,
            0,
            &ledger,
            &mut cache,
            ConstraintOptions::strict(ClockTarget::Server),
        );
        assert!(strict.unmet_minimums().is_empty());
    }

    #[test]
    fn consumed_extra_uses_most_generous_bound() {
        let map = two_part_map();
        let mut ledger = TimerLedger::new();
        ledger.start(map.tags_at(0).unwrap(), t0());
        // 100s on item-1: 10s past the item's 90s bound, but well inside the
        // section's 600s bound — the most generous bound wins, no overrun.
        ledger.end(&TagSet::single(Tag::new("item-1")), t0() + secs(100));

        let mut cache = DurationCache::new(t0() + secs(100));
        let constraints = TimeConstraints::build(
            &map,
            0,
            &ledger,
            &mut cache,
            ConstraintOptions::strict(ClockTarget::Server),
        );
        assert_eq!(constraints.consumed_extra_time_ms(), 0);
    }

    #[test]
    fn end_item_timer_settles_extra_time_after_close() {
        // A map where only the item carries a max bound, so the overrun is
        // measured against it.
        let mut map = two_part_map();
        map.time_limits = None;
        map.parts[0].sections[0].time_limits = None;

        let mut ledger = TimerLedger::new();
        ledger.start(map.tags_at(0).unwrap(), t0());
        let mut pool = ExtraTimePool::new(10_000);

        // Visit ran 96s against a 90s bound: 6s of extra time consumed.
        let close = end_item_timer(
            &mut ledger,
            &map,
            0,
            &mut pool,
            t0() + secs(96),
            None,
            ClockTarget::Server,
        );
        assert_eq!(close.item_duration_ms, 96_000);
        assert_eq!(close.consumed_extra_ms, 6_000);
        assert_eq!(pool.consumed_ms(), 6_000);

        // Replaying the close is idempotent: the range is already closed and
        // the pool total does not grow.
        let replay = end_item_timer(
            &mut ledger,
            &map,
            0,
            &mut pool,
            t0() + secs(120),
            None,
            ClockTarget::Server,
        );
        assert_eq!(replay.consumed_extra_ms, 0);
        assert_eq!(pool.consumed_ms(), 6_000);
    }

    #[test]
    fn end_item_timer_applies_client_duration() {
        let mut map = two_part_map();
        map.time_limits = None;
        map.parts[0].sections[0].time_limits = None;

        let mut ledger = TimerLedger::new();
        ledger.start(map.tags_at(0).unwrap(), t0());
        let mut pool = ExtraTimePool::new(10_000);

        let close = end_item_timer(
            &mut ledger,
            &map,
            0,
            &mut pool,
            t0() + secs(96),
            Some(93_000),
            ClockTarget::Client,
        );
        assert_eq!(close.item_duration_ms, 93_000);
        assert_eq!(close.consumed_extra_ms, 3_000);
    }
}
