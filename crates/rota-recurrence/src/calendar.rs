//! Date normalisation and stepping.
//!
//! Every date handled by the engine is a [`NaiveDate`] interpreted as UTC
//! midnight. Timestamps entering from outside are normalised through
//! [`normalize`], which converts to UTC *before* dropping the time of day, so
//! two inputs describe the same occurrence iff their normalised dates are equal.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Canonical text form of a date: `YYYY-MM-DD`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Normalise any timestamp to its UTC calendar date.
pub fn normalize<Tz: TimeZone>(dt: &DateTime<Tz>) -> NaiveDate {
    dt.with_timezone(&Utc).date_naive()
}

/// `date + days`, or `None` past chrono's representable range.
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
}

/// Whole days from `from` to `to` (negative when `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// The day before `date`. Saturates at the minimum representable date.
pub fn previous_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(NaiveDate::MIN)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Inclusive date range `[start, end]`. An inverted window contains nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window covering the UTC dates of two timestamps.
    pub fn from_timestamps<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>) -> Self {
        Self::new(normalize(start), normalize(end))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Grow the window by `days` on both sides, clamping at chrono's limits.
    pub fn padded(&self, days: u32) -> Self {
        let days = i64::from(days);
        Self {
            start: add_days(self.start, -days).unwrap_or(NaiveDate::MIN),
            end: add_days(self.end, days).unwrap_or(NaiveDate::MAX),
        }
    }
}
