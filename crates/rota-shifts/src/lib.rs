//! `rota-shifts`: persisted master shifts and the operations that span
//! several rows: scoped series edits and operator conflict scans.
//!
//! # Overview
//!
//! [`store::ShiftStore`] owns a SQLite connection holding master shifts,
//! their recurrence rules, per-date exceptions, and site/operator
//! associations. Every read is filtered by tenant.
//!
//! Edits are planned by [`mutator::plan_edit`] as a [`mutator::UnitOfWork`]
//! (a complete, ordered list of writes) and applied inside one transaction,
//! so a scope is either fully applied or not at all.
//!
//! | Scope            | Effect                                                   |
//! |------------------|----------------------------------------------------------|
//! | `single`         | Upsert one exception (modified or cancelled)             |
//! | `this_and_future`| Split into a successor series, or truncate at the pivot  |
//! | `series`         | Update master/rule in place, or delete the whole series  |
//!
//! [`conflict::find_conflicts`] is read-only and advisory: a writer can
//! commit between the scan and a later mutation.

pub mod conflict;
pub mod db;
pub mod error;
pub mod mutator;
pub mod store;
pub mod types;

pub use conflict::{detect_conflicts, find_conflicts, ConflictQuery};
pub use error::{Result, ShiftError};
pub use mutator::{plan_edit, UnitOfWork, WriteOp};
pub use store::ShiftStore;
pub use types::{
    Conflict, EditAction, EditOutcome, EditScope, MasterFields, MasterShift, NewShift,
    ScopedEdit, Series, ShiftChanges,
};
