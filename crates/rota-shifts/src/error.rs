use rota_core::MasterId;
use rota_recurrence::RecurrenceError;
use thiserror::Error;

use crate::types::EditScope;

/// Errors from the shift store, series edits and conflict scans.
///
/// Messages carry ids, scopes and dates only. Titles and notes never leave
/// the store through an error.
#[derive(Debug, Error)]
pub enum ShiftError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Rule validation, malformed occurrence id, or off-series date.
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),

    /// No master with this id exists for the calling tenant.
    #[error("shift not found: {master_id}")]
    NotFound { master_id: MasterId },

    /// The scope or change needs a recurrence rule the master does not have.
    #[error("shift {master_id} is not recurring")]
    NotRecurring { master_id: MasterId },

    /// `single` and `this_and_future` need the occurrence date they act on.
    #[error("scope {scope} requires an occurrence date")]
    MissingOccurrenceDate { scope: EditScope },

    /// The change set does not fit the requested scope.
    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    /// A previous holder of the connection lock panicked.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl ShiftError {
    /// Short error code string for API-layer responses.
    pub fn code(&self) -> &'static str {
        match self {
            ShiftError::Database(_) => "DATABASE_ERROR",
            ShiftError::Recurrence(e) => e.code(),
            ShiftError::NotFound { .. } => "SHIFT_NOT_FOUND",
            ShiftError::NotRecurring { .. } => "NOT_RECURRING",
            ShiftError::MissingOccurrenceDate { .. } => "MISSING_OCCURRENCE_DATE",
            ShiftError::InvalidEdit(_) => "INVALID_EDIT",
            ShiftError::LockPoisoned => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ShiftError>;
