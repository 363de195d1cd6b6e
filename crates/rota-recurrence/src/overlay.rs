//! Per-date exceptions layered over raw occurrence dates.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::DateWindow;
use crate::engine::{generate_raw_occurrences, is_valid_occurrence, GenerationLimits};
use crate::rule::RecurrenceRule;

/// Discriminant of an [`ExceptionKind`], as stored and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionType {
    Cancelled,
    Modified,
}

impl std::fmt::Display for ExceptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExceptionType::Cancelled => "CANCELLED",
            ExceptionType::Modified => "MODIFIED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExceptionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CANCELLED" => Ok(ExceptionType::Cancelled),
            "MODIFIED" => Ok(ExceptionType::Modified),
            other => Err(format!("unknown exception type: {other}")),
        }
    }
}

/// What an exception does to its date. A cancellation carries no overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionKind {
    Cancelled,
    Modified {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_notes: Option<String>,
        /// Where the occurrence actually takes place; the calendar slot stays
        /// on the scheduled date.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_date: Option<NaiveDate>,
    },
}

impl ExceptionKind {
    pub fn exception_type(&self) -> ExceptionType {
        match self {
            ExceptionKind::Cancelled => ExceptionType::Cancelled,
            ExceptionKind::Modified { .. } => ExceptionType::Modified,
        }
    }
}

/// A persisted override for one scheduled date of a master shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftException {
    /// The scheduled (nominal) date this exception is keyed on.
    pub date: NaiveDate,
    #[serde(flatten)]
    pub kind: ExceptionKind,
}

/// Date → exception lookup, built per call from one master's exceptions.
#[derive(Debug, Default)]
pub struct ExceptionMap<'a> {
    by_date: HashMap<NaiveDate, &'a ExceptionKind>,
}

impl<'a> ExceptionMap<'a> {
    pub fn new(exceptions: &'a [ShiftException]) -> Self {
        Self {
            by_date: exceptions.iter().map(|e| (e.date, &e.kind)).collect(),
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<&'a ExceptionKind> {
        self.by_date.get(&date).copied()
    }

    pub fn is_cancelled(&self, date: NaiveDate) -> bool {
        matches!(self.get(date), Some(ExceptionKind::Cancelled))
    }
}

/// Master-shift values every occurrence inherits unless overridden.
#[derive(Debug, Clone, Copy)]
pub struct OccurrenceTemplate<'a> {
    pub anchor_date: NaiveDate,
    pub title: &'a str,
    pub notes: Option<&'a str>,
}

/// One calendar instance of a shift after exceptions. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Scheduled date: the calendar slot and the identity of this occurrence.
    pub date: NaiveDate,
    /// True only for the master's literal anchor date.
    pub is_original: bool,
    pub is_exception: bool,
    pub exception_type: Option<ExceptionType>,
    pub effective_title: String,
    pub effective_notes: Option<String>,
    /// Override date from a modification, if any.
    pub new_date: Option<NaiveDate>,
}

impl Occurrence {
    /// Where the occurrence actually happens.
    pub fn effective_date(&self) -> NaiveDate {
        self.new_date.unwrap_or(self.date)
    }
}

/// Occurrences of one master inside a window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedOccurrences {
    pub occurrences: Vec<Occurrence>,
    /// See [`crate::engine::RawOccurrences::truncated`].
    pub truncated: bool,
}

/// Drop cancelled dates and apply modifications to the rest.
pub fn apply_exceptions(
    raw: &[NaiveDate],
    template: OccurrenceTemplate<'_>,
    exceptions: &ExceptionMap<'_>,
) -> Vec<Occurrence> {
    raw.iter()
        .filter_map(|&date| {
            let is_original = date == template.anchor_date;
            match exceptions.get(date) {
                Some(ExceptionKind::Cancelled) => None,
                Some(ExceptionKind::Modified {
                    new_title,
                    new_notes,
                    new_date,
                }) => Some(Occurrence {
                    date,
                    is_original,
                    is_exception: true,
                    exception_type: Some(ExceptionType::Modified),
                    effective_title: new_title
                        .clone()
                        .unwrap_or_else(|| template.title.to_string()),
                    effective_notes: new_notes
                        .clone()
                        .or_else(|| template.notes.map(String::from)),
                    new_date: *new_date,
                }),
                None => Some(Occurrence {
                    date,
                    is_original,
                    is_exception: false,
                    exception_type: None,
                    effective_title: template.title.to_string(),
                    effective_notes: template.notes.map(String::from),
                    new_date: None,
                }),
            }
        })
        .collect()
}

/// [`is_valid_occurrence`] minus cancelled dates.
pub fn is_valid_occurrence_with_exceptions(
    target: NaiveDate,
    anchor: NaiveDate,
    rule: &RecurrenceRule,
    exceptions: &ExceptionMap<'_>,
) -> bool {
    is_valid_occurrence(target, anchor, rule) && !exceptions.is_cancelled(target)
}

/// Raw generation followed by the exception overlay.
///
/// Without a rule the shift is single: its anchor is the only candidate.
pub fn generate_occurrences(
    template: OccurrenceTemplate<'_>,
    rule: Option<&RecurrenceRule>,
    window: DateWindow,
    exceptions: &[ShiftException],
    limits: GenerationLimits,
) -> GeneratedOccurrences {
    let (raw, truncated) = match rule {
        Some(rule) => {
            let raw = generate_raw_occurrences(template.anchor_date, rule, window, limits);
            (raw.dates, raw.truncated)
        }
        None if window.contains(template.anchor_date) => (vec![template.anchor_date], false),
        None => (Vec::new(), false),
    };

    let map = ExceptionMap::new(exceptions);
    GeneratedOccurrences {
        occurrences: apply_exceptions(&raw, template, &map),
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Frequency, RuleEnd};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn template() -> OccurrenceTemplate<'static> {
        OccurrenceTemplate {
            anchor_date: d(2024, 1, 1),
            title: "Lobby cleaning",
            notes: Some("Bring mop"),
        }
    }

    fn daily_rule() -> RecurrenceRule {
        RecurrenceRule::new(Frequency::Daily, 1, d(2024, 1, 1), RuleEnd::Never).unwrap()
    }

    fn first_week() -> DateWindow {
        DateWindow::new(d(2024, 1, 1), d(2024, 1, 5))
    }

    fn modified(
        date: NaiveDate,
        title: Option<&str>,
        new_date: Option<NaiveDate>,
    ) -> ShiftException {
        ShiftException {
            date,
            kind: ExceptionKind::Modified {
                new_title: title.map(String::from),
                new_notes: None,
                new_date,
            },
        }
    }

    #[test]
    fn plain_series_has_no_exceptions() {
        let out = generate_occurrences(
            template(),
            Some(&daily_rule()),
            first_week(),
            &[],
            GenerationLimits::default(),
        );
        assert_eq!(out.occurrences.len(), 5);
        assert!(out.occurrences[0].is_original);
        assert!(out.occurrences[1..].iter().all(|o| !o.is_original));
        assert!(out.occurrences.iter().all(|o| !o.is_exception));
        assert_eq!(out.occurrences[2].effective_notes.as_deref(), Some("Bring mop"));
    }

    #[test]
    fn cancellation_removes_exactly_that_date() {
        let exceptions = vec![ShiftException {
            date: d(2024, 1, 3),
            kind: ExceptionKind::Cancelled,
        }];
        let out = generate_occurrences(
            template(),
            Some(&daily_rule()),
            first_week(),
            &exceptions,
            GenerationLimits::default(),
        );
        let dates: Vec<_> = out.occurrences.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 4), d(2024, 1, 5)]
        );
    }

    #[test]
    fn modification_keeps_slot_and_overrides_title() {
        let exceptions = vec![modified(d(2024, 1, 2), Some("Deep clean"), None)];
        let out = generate_occurrences(
            template(),
            Some(&daily_rule()),
            first_week(),
            &exceptions,
            GenerationLimits::default(),
        );
        assert_eq!(out.occurrences.len(), 5);
        let occ = &out.occurrences[1];
        assert_eq!(occ.date, d(2024, 1, 2));
        assert!(occ.is_exception);
        assert_eq!(occ.exception_type, Some(ExceptionType::Modified));
        assert_eq!(occ.effective_title, "Deep clean");
        // notes fall back to the master
        assert_eq!(occ.effective_notes.as_deref(), Some("Bring mop"));
        assert_eq!(out.occurrences[0].effective_title, "Lobby cleaning");
    }

    #[test]
    fn moved_occurrence_reports_effective_date() {
        let exceptions = vec![modified(d(2024, 1, 4), None, Some(d(2024, 1, 20)))];
        let out = generate_occurrences(
            template(),
            Some(&daily_rule()),
            first_week(),
            &exceptions,
            GenerationLimits::default(),
        );
        let occ = out
            .occurrences
            .iter()
            .find(|o| o.date == d(2024, 1, 4))
            .unwrap();
        assert_eq!(occ.effective_date(), d(2024, 1, 20));
        assert_eq!(occ.effective_title, "Lobby cleaning");
    }

    #[test]
    fn exception_off_the_grid_is_ignored() {
        let rule = RecurrenceRule::new(Frequency::Weekly, 1, d(2024, 1, 1), RuleEnd::Never)
            .unwrap();
        let exceptions = vec![modified(d(2024, 1, 3), Some("ghost"), None)];
        let out = generate_occurrences(
            template(),
            Some(&rule),
            DateWindow::new(d(2024, 1, 1), d(2024, 1, 14)),
            &exceptions,
            GenerationLimits::default(),
        );
        assert_eq!(out.occurrences.len(), 2);
        assert!(out.occurrences.iter().all(|o| o.effective_title != "ghost"));
    }

    #[test]
    fn single_shift_yields_anchor_only() {
        let out = generate_occurrences(
            template(),
            None,
            first_week(),
            &[],
            GenerationLimits::default(),
        );
        assert_eq!(out.occurrences.len(), 1);
        assert!(out.occurrences[0].is_original);

        let out = generate_occurrences(
            template(),
            None,
            DateWindow::new(d(2024, 2, 1), d(2024, 2, 5)),
            &[],
            GenerationLimits::default(),
        );
        assert!(out.occurrences.is_empty());
    }

    #[test]
    fn validity_with_exceptions_excludes_cancelled() {
        let exceptions = vec![ShiftException {
            date: d(2024, 1, 3),
            kind: ExceptionKind::Cancelled,
        }];
        let map = ExceptionMap::new(&exceptions);
        let rule = daily_rule();
        assert!(!is_valid_occurrence_with_exceptions(d(2024, 1, 3), d(2024, 1, 1), &rule, &map));
        assert!(is_valid_occurrence_with_exceptions(d(2024, 1, 4), d(2024, 1, 1), &rule, &map));
    }

    #[test]
    fn exception_kind_wire_format() {
        let cancelled = ShiftException {
            date: d(2024, 1, 3),
            kind: ExceptionKind::Cancelled,
        };
        let json = serde_json::to_string(&cancelled).unwrap();
        assert_eq!(json, r#"{"date":"2024-01-03","type":"CANCELLED"}"#);

        let parsed: ShiftException =
            serde_json::from_str(r#"{"date":"2024-01-03","type":"MODIFIED","new_title":"x"}"#)
                .unwrap();
        assert_eq!(parsed.kind.exception_type(), ExceptionType::Modified);
    }
}
