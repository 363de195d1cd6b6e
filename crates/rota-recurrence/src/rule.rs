use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{days_between, previous_day};
use crate::error::{RecurrenceError, Result, RuleViolation};

/// How far apart stepped occurrences are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    /// Every `interval` days.
    Daily,
    /// Every `interval × 7` days.
    Weekly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            other => Err(format!("unknown frequency: {other}")),
        }
    }
}

/// When a series stops. End date and count cannot both be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleEnd {
    /// Open-ended.
    Never,
    /// Last possible occurrence date (inclusive).
    Until { date: NaiveDate },
    /// Total number of stepped occurrences, counted from `start_date`.
    Count { count: u32 },
}

/// Recurrence of a master shift.
///
/// Built through [`RecurrenceRule::new`] or a [`RuleSpec`], both of which
/// validate. Rows read back from the store are trusted as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RuleSpec", into = "RuleSpec")]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Step multiplier, at least 1.
    pub interval: u32,
    pub start_date: NaiveDate,
    pub end: RuleEnd,
}

impl RecurrenceRule {
    pub fn new(
        frequency: Frequency,
        interval: u32,
        start_date: NaiveDate,
        end: RuleEnd,
    ) -> Result<Self> {
        let rule = Self {
            frequency,
            interval,
            start_date,
            end,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Build from the flat end-date/count pair used on the wire.
    pub fn from_parts(
        frequency: Frequency,
        interval: u32,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        count: Option<u32>,
    ) -> Result<Self> {
        let end = match (end_date, count) {
            (Some(_), Some(_)) => {
                return Err(RecurrenceError::InvalidRule(RuleViolation::EndDateWithCount))
            }
            (Some(date), None) => RuleEnd::Until { date },
            (None, Some(count)) => RuleEnd::Count { count },
            (None, None) => RuleEnd::Never,
        };
        Self::new(frequency, interval, start_date, end)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval < 1 {
            return Err(RecurrenceError::InvalidRule(RuleViolation::IntervalBelowOne));
        }
        match self.end {
            RuleEnd::Until { date } if date <= self.start_date => Err(
                RecurrenceError::InvalidRule(RuleViolation::EndDateNotAfterStart),
            ),
            RuleEnd::Count { count } if count < 1 => {
                Err(RecurrenceError::InvalidRule(RuleViolation::CountBelowOne))
            }
            _ => Ok(()),
        }
    }

    /// Days between consecutive stepped occurrences.
    pub fn step_days(&self) -> i64 {
        let unit = match self.frequency {
            Frequency::Daily => 1,
            Frequency::Weekly => 7,
        };
        i64::from(self.interval) * unit
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        match self.end {
            RuleEnd::Until { date } => Some(date),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<u32> {
        match self.end {
            RuleEnd::Count { count } => Some(count),
            _ => None,
        }
    }

    /// Number of stepped dates strictly before `date`.
    pub fn steps_before(&self, date: NaiveDate) -> u64 {
        let diff = days_between(self.start_date, date);
        if diff <= 0 {
            return 0;
        }
        let step = self.step_days();
        ((diff + step - 1) / step) as u64
    }

    /// The same rule ending the day before `pivot`, or `None` when no stepped
    /// date would remain.
    ///
    /// A single remaining occurrence (`end == start`) is allowed here even
    /// though caller-supplied rules must end strictly after they start.
    pub fn truncated_before(&self, pivot: NaiveDate) -> Option<Self> {
        let last = previous_day(pivot);
        if last < self.start_date {
            return None;
        }
        Some(Self {
            end: RuleEnd::Until { date: last },
            ..self.clone()
        })
    }
}

/// Wire form of a rule: end date and count as two optional fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

fn default_interval() -> u32 {
    1
}

impl TryFrom<RuleSpec> for RecurrenceRule {
    type Error = RecurrenceError;

    fn try_from(wire: RuleSpec) -> Result<Self> {
        RecurrenceRule::from_parts(
            wire.frequency,
            wire.interval,
            wire.start_date,
            wire.end_date,
            wire.count,
        )
    }
}

impl From<RecurrenceRule> for RuleSpec {
    fn from(rule: RecurrenceRule) -> Self {
        RuleSpec {
            frequency: rule.frequency,
            interval: rule.interval,
            start_date: rule.start_date,
            end_date: rule.end_date(),
            count: rule.count(),
        }
    }
}

/// Partial update of a rule; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePatch {
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<RuleEnd>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.frequency.is_none()
            && self.interval.is_none()
            && self.start_date.is_none()
            && self.end.is_none()
    }

    /// Merge over `rule` and validate the result.
    ///
    /// A single-occurrence rule (`end == start`, as left by
    /// [`RecurrenceRule::truncated_before`]) keeps validating as long as
    /// neither its start nor its end is replaced.
    pub fn apply(&self, rule: &RecurrenceRule) -> Result<RecurrenceRule> {
        let patched = RecurrenceRule {
            frequency: self.frequency.unwrap_or(rule.frequency),
            interval: self.interval.unwrap_or(rule.interval),
            start_date: self.start_date.unwrap_or(rule.start_date),
            end: self.end.unwrap_or(rule.end),
        };
        let keeps_single_occurrence = self.start_date.is_none()
            && self.end.is_none()
            && rule.end_date() == Some(rule.start_date);

        match patched.validate() {
            Err(RecurrenceError::InvalidRule(RuleViolation::EndDateNotAfterStart))
                if keeps_single_occurrence =>
            {
                Ok(patched)
            }
            Err(e) => Err(e),
            Ok(()) => Ok(patched),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn violation(err: RecurrenceError) -> RuleViolation {
        match err {
            RecurrenceError::InvalidRule(v) => v,
            other => panic!("expected InvalidRule, got {other:?}"),
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = RecurrenceRule::new(Frequency::Daily, 0, d(2024, 1, 1), RuleEnd::Never)
            .unwrap_err();
        assert_eq!(violation(err), RuleViolation::IntervalBelowOne);
    }

    #[test]
    fn end_date_and_count_together_are_rejected() {
        let err = RecurrenceRule::from_parts(
            Frequency::Daily,
            1,
            d(2024, 1, 1),
            Some(d(2024, 2, 1)),
            Some(3),
        )
        .unwrap_err();
        assert_eq!(violation(err), RuleViolation::EndDateWithCount);
    }

    #[test]
    fn end_date_on_start_is_rejected() {
        let err = RecurrenceRule::from_parts(
            Frequency::Weekly,
            1,
            d(2024, 1, 1),
            Some(d(2024, 1, 1)),
            None,
        )
        .unwrap_err();
        assert_eq!(violation(err), RuleViolation::EndDateNotAfterStart);
    }

    #[test]
    fn zero_count_is_rejected() {
        let err = RecurrenceRule::from_parts(Frequency::Weekly, 1, d(2024, 1, 1), None, Some(0))
            .unwrap_err();
        assert_eq!(violation(err), RuleViolation::CountBelowOne);
    }

    #[test]
    fn weekly_step_multiplies_interval() {
        let rule = RecurrenceRule::new(Frequency::Weekly, 2, d(2024, 1, 1), RuleEnd::Never)
            .unwrap();
        assert_eq!(rule.step_days(), 14);
    }

    #[test]
    fn steps_before_rounds_up() {
        let rule = RecurrenceRule::new(Frequency::Daily, 3, d(2024, 1, 1), RuleEnd::Never).unwrap();
        assert_eq!(rule.steps_before(d(2024, 1, 1)), 0);
        assert_eq!(rule.steps_before(d(2024, 1, 4)), 1);
        assert_eq!(rule.steps_before(d(2024, 1, 5)), 2);
    }

    #[test]
    fn truncation_before_start_leaves_nothing() {
        let rule = RecurrenceRule::new(Frequency::Daily, 1, d(2024, 1, 10), RuleEnd::Never)
            .unwrap();
        assert!(rule.truncated_before(d(2024, 1, 10)).is_none());
        let kept = rule.truncated_before(d(2024, 1, 11)).unwrap();
        assert_eq!(kept.end_date(), Some(d(2024, 1, 10)));
    }

    #[test]
    fn wire_form_deserialization_validates() {
        let json = r#"{"frequency":"DAILY","start_date":"2024-01-01",
            "end_date":"2024-01-05","count":2}"#;
        assert!(serde_json::from_str::<RecurrenceRule>(json).is_err());

        let json = r#"{"frequency":"WEEKLY","interval":2,"start_date":"2024-01-01","count":3}"#;
        let rule: RecurrenceRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.end, RuleEnd::Count { count: 3 });
        assert_eq!(rule.interval, 2);
    }

    #[test]
    fn patch_keeps_start_and_revalidates() {
        let rule = RecurrenceRule::new(Frequency::Daily, 1, d(2024, 1, 1), RuleEnd::Never).unwrap();
        let patch = RulePatch {
            interval: Some(0),
            ..Default::default()
        };
        assert!(patch.apply(&rule).is_err());

        let patch = RulePatch {
            frequency: Some(Frequency::Weekly),
            ..Default::default()
        };
        let patched = patch.apply(&rule).unwrap();
        assert_eq!(patched.start_date, d(2024, 1, 1));
        assert_eq!(patched.step_days(), 7);
    }

    #[test]
    fn patch_moves_start_date() {
        let rule = RecurrenceRule::new(
            Frequency::Daily,
            1,
            d(2024, 1, 1),
            RuleEnd::Until { date: d(2024, 1, 31) },
        )
        .unwrap();
        let patch = RulePatch {
            start_date: Some(d(2024, 1, 8)),
            ..Default::default()
        };
        assert_eq!(patch.apply(&rule).unwrap().start_date, d(2024, 1, 8));

        let past_end = RulePatch {
            start_date: Some(d(2024, 2, 1)),
            ..Default::default()
        };
        assert_eq!(
            violation(past_end.apply(&rule).unwrap_err()),
            RuleViolation::EndDateNotAfterStart
        );
    }

    #[test]
    fn patch_on_single_occurrence_rule_keeps_inherited_end() {
        let rule = RecurrenceRule::new(Frequency::Daily, 1, d(2024, 1, 1), RuleEnd::Never)
            .unwrap()
            .truncated_before(d(2024, 1, 2))
            .unwrap();
        let patch = RulePatch {
            frequency: Some(Frequency::Weekly),
            ..Default::default()
        };
        let patched = patch.apply(&rule).unwrap();
        assert_eq!(patched.frequency, Frequency::Weekly);
        assert_eq!(patched.end_date(), Some(d(2024, 1, 1)));

        let explicit = RulePatch {
            end: Some(RuleEnd::Until { date: d(2024, 1, 1) }),
            ..Default::default()
        };
        assert_eq!(
            violation(explicit.apply(&rule).unwrap_err()),
            RuleViolation::EndDateNotAfterStart
        );
    }
}
