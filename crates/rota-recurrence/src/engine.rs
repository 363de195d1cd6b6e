//! Raw occurrence generation.
//!
//! The anchor date is always an occurrence. Independently, stepped dates run
//! from `rule.start_date` every [`RecurrenceRule::step_days`] days, bounded by
//! the rule's end condition and by [`GenerationLimits::max_steps`].

use chrono::NaiveDate;
use rota_core::config::{RecurrenceConfig, DEFAULT_MAX_STEPS, DEFAULT_NEXT_SCAN_DAYS};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::calendar::{add_days, days_between, DateWindow};
use crate::rule::RecurrenceRule;

/// Iteration caps for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationLimits {
    /// Stepped dates examined per generation call.
    pub max_steps: u32,
    /// Days scanned by [`next_occurrence`].
    pub next_scan_days: u32,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            next_scan_days: DEFAULT_NEXT_SCAN_DAYS,
        }
    }
}

impl From<&RecurrenceConfig> for GenerationLimits {
    fn from(config: &RecurrenceConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            next_scan_days: config.next_occurrence_scan_days,
        }
    }
}

/// Candidate dates before exceptions are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOccurrences {
    /// Strictly increasing.
    pub dates: Vec<NaiveDate>,
    /// Set when the step bound stopped generation while dates were still due.
    /// Callers needing more must page through smaller windows.
    pub truncated: bool,
}

/// Candidate occurrence dates of a series inside `window`.
///
/// Stepping starts at the first series index that can reach `window.start`,
/// so long-running series do not spend the step bound on dates before the
/// window. `count` bounds the series index, not the number of dates emitted
/// into this window.
pub fn generate_raw_occurrences(
    anchor: NaiveDate,
    rule: &RecurrenceRule,
    window: DateWindow,
    limits: GenerationLimits,
) -> RawOccurrences {
    let mut out = RawOccurrences::default();
    if window.is_empty() {
        return out;
    }
    if window.contains(anchor) {
        out.dates.push(anchor);
    }

    let step = rule.step_days();
    let last = match rule.end_date() {
        Some(end) => end.min(window.end),
        None => window.end,
    };
    let count = rule.count().map(u64::from);
    let mut index = rule.steps_before(window.start);
    let mut steps: u32 = 0;

    loop {
        if count.is_some_and(|c| index >= c) {
            break;
        }
        let Some(date) = (index as i64)
            .checked_mul(step)
            .and_then(|offset| add_days(rule.start_date, offset))
        else {
            break;
        };
        if date > last {
            break;
        }
        if steps >= limits.max_steps {
            warn!(
                max_steps = limits.max_steps,
                start = %rule.start_date,
                window_start = %window.start,
                window_end = %window.end,
                "recurrence generation truncated at step bound"
            );
            out.truncated = true;
            break;
        }
        steps += 1;
        if date != anchor {
            out.dates.push(date);
        }
        index += 1;
    }

    out.dates.sort_unstable();
    out.dates.dedup();
    out
}

/// Whether `target` lies on the series grid (or is the anchor).
///
/// Ignores `count`: count-bounding belongs to generation, so a date past the
/// last counted occurrence still reports `true` here. Use
/// [`is_scheduled_occurrence`] when the count must hold.
pub fn is_valid_occurrence(target: NaiveDate, anchor: NaiveDate, rule: &RecurrenceRule) -> bool {
    if target == anchor {
        return true;
    }
    if target < rule.start_date {
        return false;
    }
    if rule.end_date().is_some_and(|end| target > end) {
        return false;
    }
    let diff = days_between(rule.start_date, target);
    diff >= 0 && diff % rule.step_days() == 0
}

/// [`is_valid_occurrence`] that also honours `count`.
pub fn is_scheduled_occurrence(
    target: NaiveDate,
    anchor: NaiveDate,
    rule: &RecurrenceRule,
) -> bool {
    if target == anchor {
        return true;
    }
    is_valid_occurrence(target, anchor, rule)
        && rule
            .count()
            .map_or(true, |c| rule.steps_before(target) < u64::from(c))
}

/// First occurrence strictly after `after`, scanning day by day for at most
/// `limits.next_scan_days` days.
pub fn next_occurrence(
    after: NaiveDate,
    anchor: NaiveDate,
    rule: &RecurrenceRule,
    limits: GenerationLimits,
) -> Option<NaiveDate> {
    // an anchor ahead of the stepped series would be skipped by the jump below
    if anchor > after && anchor < rule.start_date {
        return Some(anchor);
    }

    let mut cursor = add_days(after, 1)?.max(rule.start_date);
    for _ in 0..limits.next_scan_days {
        if is_scheduled_occurrence(cursor, anchor, rule) {
            return Some(cursor);
        }
        if cursor >= anchor && series_exhausted(cursor, rule) {
            return None;
        }
        cursor = add_days(cursor, 1)?;
    }
    None
}

fn series_exhausted(cursor: NaiveDate, rule: &RecurrenceRule) -> bool {
    rule.end_date().is_some_and(|end| cursor > end)
        || rule
            .count()
            .is_some_and(|c| rule.steps_before(cursor) >= u64::from(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Frequency, RuleEnd};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn daily(start: NaiveDate, end: RuleEnd) -> RecurrenceRule {
        RecurrenceRule::new(Frequency::Daily, 1, start, end).unwrap()
    }

    fn window(a: NaiveDate, b: NaiveDate) -> DateWindow {
        DateWindow::new(a, b)
    }

    #[test]
    fn daily_open_ended_fills_window() {
        let rule = daily(d(2024, 1, 1), RuleEnd::Never);
        let raw = generate_raw_occurrences(
            d(2024, 1, 1),
            &rule,
            window(d(2024, 1, 1), d(2024, 1, 5)),
            GenerationLimits::default(),
        );
        let expected: Vec<_> = (1..=5).map(|day| d(2024, 1, day)).collect();
        assert_eq!(raw.dates, expected);
        assert!(!raw.truncated);
    }

    #[test]
    fn weekly_count_stops_after_three() {
        // 2024-01-01 is a Monday
        let start = d(2024, 1, 1);
        let rule = RecurrenceRule::new(Frequency::Weekly, 2, start, RuleEnd::Count { count: 3 })
            .unwrap();
        let raw = generate_raw_occurrences(
            start,
            &rule,
            window(start, d(2024, 12, 31)),
            GenerationLimits::default(),
        );
        assert_eq!(raw.dates, vec![start, d(2024, 1, 15), d(2024, 1, 29)]);
    }

    #[test]
    fn count_bounds_series_index_not_window() {
        let start = d(2024, 1, 1);
        let rule = daily(start, RuleEnd::Count { count: 5 });
        let raw = generate_raw_occurrences(
            start,
            &rule,
            window(d(2024, 1, 4), d(2024, 1, 31)),
            GenerationLimits::default(),
        );
        assert_eq!(raw.dates, vec![d(2024, 1, 4), d(2024, 1, 5)]);
    }

    #[test]
    fn unaligned_anchor_is_always_included() {
        let rule = RecurrenceRule::new(Frequency::Weekly, 1, d(2024, 1, 1), RuleEnd::Never)
            .unwrap();
        let anchor = d(2024, 1, 3);
        let raw = generate_raw_occurrences(
            anchor,
            &rule,
            window(d(2024, 1, 1), d(2024, 1, 14)),
            GenerationLimits::default(),
        );
        assert_eq!(raw.dates, vec![d(2024, 1, 1), anchor, d(2024, 1, 8)]);
    }

    #[test]
    fn anchor_on_grid_is_not_duplicated() {
        let rule = daily(d(2024, 1, 1), RuleEnd::Never);
        let raw = generate_raw_occurrences(
            d(2024, 1, 3),
            &rule,
            window(d(2024, 1, 1), d(2024, 1, 5)),
            GenerationLimits::default(),
        );
        assert_eq!(raw.dates.len(), 5);
    }

    #[test]
    fn end_date_is_inclusive() {
        let rule = daily(d(2024, 1, 1), RuleEnd::Until { date: d(2024, 1, 3) });
        let raw = generate_raw_occurrences(
            d(2024, 1, 1),
            &rule,
            window(d(2024, 1, 1), d(2024, 1, 31)),
            GenerationLimits::default(),
        );
        assert_eq!(raw.dates, vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);
    }

    #[test]
    fn window_far_after_start_does_not_exhaust_bound() {
        let rule = daily(d(2000, 1, 1), RuleEnd::Never);
        let raw = generate_raw_occurrences(
            d(2000, 1, 1),
            &rule,
            window(d(2024, 6, 1), d(2024, 6, 30)),
            GenerationLimits::default(),
        );
        assert_eq!(raw.dates.len(), 30);
        assert!(!raw.truncated);
    }

    #[test]
    fn step_bound_sets_truncated_flag() {
        let rule = daily(d(2024, 1, 1), RuleEnd::Never);
        let limits = GenerationLimits {
            max_steps: 10,
            ..Default::default()
        };
        let raw = generate_raw_occurrences(
            d(2024, 1, 1),
            &rule,
            window(d(2024, 1, 1), d(2024, 12, 31)),
            limits,
        );
        assert!(raw.truncated);
        assert_eq!(raw.dates.len(), 10);
    }

    #[test]
    fn exact_fit_is_not_truncated() {
        let rule = daily(d(2024, 1, 1), RuleEnd::Never);
        let limits = GenerationLimits {
            max_steps: 5,
            ..Default::default()
        };
        let raw = generate_raw_occurrences(
            d(2024, 1, 1),
            &rule,
            window(d(2024, 1, 1), d(2024, 1, 5)),
            limits,
        );
        assert!(!raw.truncated);
        assert_eq!(raw.dates.len(), 5);
    }

    #[test]
    fn output_is_strictly_increasing() {
        let rule = RecurrenceRule::new(Frequency::Daily, 3, d(2024, 1, 2), RuleEnd::Never).unwrap();
        let raw = generate_raw_occurrences(
            d(2024, 1, 7),
            &rule,
            window(d(2024, 1, 1), d(2024, 3, 1)),
            GenerationLimits::default(),
        );
        assert!(raw.dates.windows(2).all(|w| w[0] < w[1]));
        assert!(raw.dates.contains(&d(2024, 1, 7)));
    }

    #[test]
    fn inverted_window_yields_nothing() {
        let rule = daily(d(2024, 1, 1), RuleEnd::Never);
        let raw = generate_raw_occurrences(
            d(2024, 1, 1),
            &rule,
            window(d(2024, 1, 5), d(2024, 1, 1)),
            GenerationLimits::default(),
        );
        assert!(raw.dates.is_empty());
    }

    #[test]
    fn validity_follows_grid() {
        let rule = RecurrenceRule::new(
            Frequency::Weekly,
            2,
            d(2024, 1, 1),
            RuleEnd::Until { date: d(2024, 3, 1) },
        )
        .unwrap();
        let anchor = d(2024, 1, 1);
        assert!(is_valid_occurrence(d(2024, 1, 15), anchor, &rule));
        assert!(!is_valid_occurrence(d(2024, 1, 8), anchor, &rule));
        assert!(!is_valid_occurrence(d(2023, 12, 18), anchor, &rule));
        assert!(!is_valid_occurrence(d(2024, 3, 11), anchor, &rule));
    }

    #[test]
    fn validity_ignores_count_but_schedule_does_not() {
        let rule = daily(d(2024, 1, 1), RuleEnd::Count { count: 3 });
        let anchor = d(2024, 1, 1);
        assert!(is_valid_occurrence(d(2024, 1, 10), anchor, &rule));
        assert!(!is_scheduled_occurrence(d(2024, 1, 10), anchor, &rule));
        assert!(is_scheduled_occurrence(d(2024, 1, 3), anchor, &rule));
        assert!(!is_scheduled_occurrence(d(2024, 1, 4), anchor, &rule));
    }

    #[test]
    fn off_grid_anchor_is_valid() {
        let rule = RecurrenceRule::new(Frequency::Weekly, 1, d(2024, 1, 1), RuleEnd::Never)
            .unwrap();
        assert!(is_valid_occurrence(d(2024, 1, 3), d(2024, 1, 3), &rule));
    }

    #[test]
    fn next_occurrence_steps_forward() {
        let rule = RecurrenceRule::new(Frequency::Weekly, 1, d(2024, 1, 1), RuleEnd::Never)
            .unwrap();
        let next =
            next_occurrence(d(2024, 1, 1), d(2024, 1, 1), &rule, GenerationLimits::default());
        assert_eq!(next, Some(d(2024, 1, 8)));
    }

    #[test]
    fn next_occurrence_before_start_returns_start() {
        let rule = daily(d(2024, 1, 10), RuleEnd::Never);
        let next =
            next_occurrence(d(2024, 1, 1), d(2024, 1, 10), &rule, GenerationLimits::default());
        assert_eq!(next, Some(d(2024, 1, 10)));
    }

    #[test]
    fn next_occurrence_stops_at_end() {
        let rule = daily(d(2024, 1, 1), RuleEnd::Until { date: d(2024, 1, 5) });
        let next =
            next_occurrence(d(2024, 1, 5), d(2024, 1, 1), &rule, GenerationLimits::default());
        assert_eq!(next, None);
    }

    #[test]
    fn next_occurrence_respects_count() {
        let rule = daily(d(2024, 1, 1), RuleEnd::Count { count: 2 });
        let anchor = d(2024, 1, 1);
        let limits = GenerationLimits::default();
        assert_eq!(next_occurrence(anchor, anchor, &rule, limits), Some(d(2024, 1, 2)));
        assert_eq!(next_occurrence(d(2024, 1, 2), anchor, &rule, limits), None);
    }

    #[test]
    fn next_occurrence_gives_up_after_scan_cap() {
        let rule = RecurrenceRule::new(Frequency::Weekly, 100, d(2024, 1, 1), RuleEnd::Never)
            .unwrap();
        let next =
            next_occurrence(d(2024, 1, 1), d(2024, 1, 1), &rule, GenerationLimits::default());
        assert_eq!(next, None);
    }
}
