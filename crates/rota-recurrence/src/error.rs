use chrono::NaiveDate;
use rota_core::MasterId;
use thiserror::Error;

/// The recurrence-rule constraint that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleViolation {
    IntervalBelowOne,
    EndDateWithCount,
    EndDateNotAfterStart,
    CountBelowOne,
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuleViolation::IntervalBelowOne => "interval must be at least 1",
            RuleViolation::EndDateWithCount => "end date and count are mutually exclusive",
            RuleViolation::EndDateNotAfterStart => "end date must be after start date",
            RuleViolation::CountBelowOne => "count must be at least 1",
        };
        write!(f, "{s}")
    }
}

/// Errors raised by the occurrence engine.
///
/// Messages carry ids and dates only, never shift titles or notes.
#[derive(Debug, Error)]
pub enum RecurrenceError {
    /// Rejected before any generation or mutation runs.
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(RuleViolation),

    /// Wrong separator count, bad date shape, or impossible calendar date.
    #[error("Malformed occurrence id '{id}': {reason}")]
    MalformedId { id: String, reason: String },

    /// The date does not fall on the series described by the rule.
    #[error("{date} is not a valid occurrence of {master_id}")]
    NotAValidOccurrence { master_id: MasterId, date: NaiveDate },
}

impl RecurrenceError {
    pub fn code(&self) -> &'static str {
        match self {
            RecurrenceError::InvalidRule(_) => "INVALID_RULE",
            RecurrenceError::MalformedId { .. } => "MALFORMED_ID",
            RecurrenceError::NotAValidOccurrence { .. } => "NOT_A_VALID_OCCURRENCE",
        }
    }

    pub(crate) fn malformed(id: &str, reason: impl Into<String>) -> Self {
        RecurrenceError::MalformedId {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecurrenceError>;
