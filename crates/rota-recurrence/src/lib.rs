//! `rota-recurrence`: pure occurrence computation for recurring shifts.
//!
//! # Overview
//!
//! A master shift has an anchor date and, optionally, a [`rule::RecurrenceRule`].
//! Occurrences are never stored: they are materialised on demand for a
//! requested [`calendar::DateWindow`] and then overlaid with the per-date
//! exceptions persisted for the master.
//!
//! | Module          | Responsibility                                         |
//! |-----------------|--------------------------------------------------------|
//! | `calendar`      | UTC-midnight normalisation, stepping, day arithmetic   |
//! | `rule`          | Frequency / interval / end condition and validation   |
//! | `engine`        | Raw candidate dates, membership tests, next occurrence |
//! | `overlay`       | Cancelled / modified exceptions on top of raw dates    |
//! | `occurrence_id` | `<masterId>_<YYYY-MM-DD>` encoding                     |
//!
//! Nothing in this crate performs I/O or reads the clock.

pub mod calendar;
pub mod engine;
pub mod error;
pub mod occurrence_id;
pub mod overlay;
pub mod rule;

pub use calendar::DateWindow;
pub use engine::{
    generate_raw_occurrences, is_scheduled_occurrence, is_valid_occurrence, next_occurrence,
    GenerationLimits, RawOccurrences,
};
pub use error::{RecurrenceError, Result, RuleViolation};
pub use occurrence_id::{decode_occurrence_id, encode_occurrence_id, OccurrenceRef};
pub use overlay::{
    apply_exceptions, generate_occurrences, is_valid_occurrence_with_exceptions, ExceptionKind,
    ExceptionMap, ExceptionType, GeneratedOccurrences, Occurrence, OccurrenceTemplate,
    ShiftException,
};
pub use rule::{Frequency, RecurrenceRule, RuleEnd, RulePatch, RuleSpec};
