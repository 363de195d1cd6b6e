//! Scoped series edits, planned as a unit of work.
//!
//! [`plan_edit`] never touches storage: it turns a loaded [`Series`] and a
//! [`ScopedEdit`] into the ordered writes that implement it. The store
//! applies the whole list in one transaction or none of it.

use chrono::NaiveDate;
use rota_core::MasterId;
use rota_recurrence::{
    is_scheduled_occurrence, ExceptionKind, RecurrenceError, RecurrenceRule, RuleEnd,
    ShiftException,
};
use serde::Serialize;

use crate::error::{Result, ShiftError};
use crate::types::{
    EditAction, EditOutcome, EditScope, MasterFields, ScopedEdit, Series, ShiftChanges,
};

/// One write against the shift tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    /// Insert or fully replace the exception at `(master_id, exception.date)`.
    UpsertException {
        master_id: MasterId,
        exception: ShiftException,
    },
    UpdateMaster {
        master_id: MasterId,
        fields: MasterFields,
    },
    UpdateRule {
        master_id: MasterId,
        rule: RecurrenceRule,
    },
    InsertMaster {
        master_id: MasterId,
        fields: MasterFields,
    },
    InsertRule {
        master_id: MasterId,
        rule: RecurrenceRule,
    },
    /// Copy site and operator rows from one master to another.
    CopyAssociations { from: MasterId, to: MasterId },
    /// Re-parent exceptions dated on or after `from_date`.
    MoveExceptions {
        from: MasterId,
        to: MasterId,
        from_date: NaiveDate,
    },
    DeleteExceptionsFrom {
        master_id: MasterId,
        from_date: NaiveDate,
    },
    /// Cascades to rule, exceptions and associations.
    DeleteMaster { master_id: MasterId },
}

/// Ordered writes plus the outcome they produce once committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitOfWork {
    pub ops: Vec<WriteOp>,
    pub outcome: EditOutcome,
}

impl UnitOfWork {
    fn updated(master_id: &MasterId, ops: Vec<WriteOp>) -> Self {
        Self {
            ops,
            outcome: EditOutcome {
                updated: vec![master_id.clone()],
                ..EditOutcome::default()
            },
        }
    }

    fn deleted(master_id: &MasterId) -> Self {
        Self {
            ops: vec![WriteOp::DeleteMaster {
                master_id: master_id.clone(),
            }],
            outcome: EditOutcome {
                deleted: Some(master_id.clone()),
                ..EditOutcome::default()
            },
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Plan `edit` against `series`.
///
/// `successor_id` is only used when a this-and-future update splits the
/// series; it is passed in so planning stays deterministic.
pub fn plan_edit(
    series: &Series,
    edit: &ScopedEdit,
    successor_id: MasterId,
) -> Result<UnitOfWork> {
    match (edit.scope, &edit.action) {
        (EditScope::Single, EditAction::Update(changes)) => {
            plan_single_update(series, edit, changes)
        }
        (EditScope::Single, EditAction::Delete) => plan_single_cancel(series, edit),
        (EditScope::ThisAndFuture, EditAction::Update(changes)) => {
            plan_split(series, edit, changes, successor_id)
        }
        (EditScope::ThisAndFuture, EditAction::Delete) => plan_truncate(series, edit),
        (EditScope::Series, EditAction::Update(changes)) => plan_series_update(series, changes),
        (EditScope::Series, EditAction::Delete) => Ok(UnitOfWork::deleted(series.id())),
    }
}

/// The rule of a recurring series and the scheduled date an edit acts on.
fn scheduled_pivot<'a>(
    series: &'a Series,
    edit: &ScopedEdit,
) -> Result<(&'a RecurrenceRule, NaiveDate)> {
    let rule = series.rule.as_ref().ok_or_else(|| ShiftError::NotRecurring {
        master_id: series.id().clone(),
    })?;
    let pivot = edit
        .pivot
        .ok_or(ShiftError::MissingOccurrenceDate { scope: edit.scope })?;
    if !is_scheduled_occurrence(pivot, series.master.anchor_date, rule) {
        return Err(RecurrenceError::NotAValidOccurrence {
            master_id: series.id().clone(),
            date: pivot,
        }
        .into());
    }
    Ok((rule, pivot))
}

fn plan_single_update(
    series: &Series,
    edit: &ScopedEdit,
    changes: &ShiftChanges,
) -> Result<UnitOfWork> {
    if changes.rule.is_some() {
        return Err(ShiftError::InvalidEdit(
            "recurrence changes need the series or this_and_future scope".into(),
        ));
    }
    reject_anchor_change(changes)?;
    let (_, date) = scheduled_pivot(series, edit)?;
    let kind = ExceptionKind::Modified {
        new_title: changes.title.clone(),
        new_notes: changes.notes.clone(),
        new_date: changes.new_date,
    };
    Ok(upsert(series, date, kind))
}

fn plan_single_cancel(series: &Series, edit: &ScopedEdit) -> Result<UnitOfWork> {
    let (_, date) = scheduled_pivot(series, edit)?;
    Ok(upsert(series, date, ExceptionKind::Cancelled))
}

fn upsert(series: &Series, date: NaiveDate, kind: ExceptionKind) -> UnitOfWork {
    UnitOfWork::updated(
        series.id(),
        vec![WriteOp::UpsertException {
            master_id: series.id().clone(),
            exception: ShiftException { date, kind },
        }],
    )
}

fn plan_series_update(series: &Series, changes: &ShiftChanges) -> Result<UnitOfWork> {
    if changes.new_date.is_some() {
        return Err(ShiftError::InvalidEdit(
            "a new date applies to a single occurrence only".into(),
        ));
    }
    let master_id = series.id();
    let mut ops = Vec::new();

    if changes.title.is_some() || changes.notes.is_some() || changes.anchor_date.is_some() {
        let anchor_date = changes.anchor_date.unwrap_or(series.master.anchor_date);
        ops.push(WriteOp::UpdateMaster {
            master_id: master_id.clone(),
            fields: merged_fields(series, changes, anchor_date),
        });
    }

    if let Some(patch) = changes.rule.as_ref().filter(|p| !p.is_empty()) {
        let rule = series.rule.as_ref().ok_or_else(|| ShiftError::NotRecurring {
            master_id: master_id.clone(),
        })?;
        ops.push(WriteOp::UpdateRule {
            master_id: master_id.clone(),
            rule: patch.apply(rule)?,
        });
    }

    Ok(UnitOfWork::updated(master_id, ops))
}

/// Split at the pivot: a successor series takes the pivot and every later
/// occurrence (with their exceptions), the original keeps what came before.
fn plan_split(
    series: &Series,
    edit: &ScopedEdit,
    changes: &ShiftChanges,
    successor_id: MasterId,
) -> Result<UnitOfWork> {
    if changes.new_date.is_some() {
        return Err(ShiftError::InvalidEdit(
            "a new date applies to a single occurrence only".into(),
        ));
    }
    reject_anchor_change(changes)?;
    let patch = changes.rule.as_ref().filter(|p| !p.is_empty());
    if patch.is_some_and(|p| p.start_date.is_some()) {
        return Err(ShiftError::InvalidEdit(
            "the split series starts at the edited occurrence".into(),
        ));
    }
    let (rule, pivot) = scheduled_pivot(series, edit)?;
    let old_id = series.id();

    let carried = RecurrenceRule {
        start_date: pivot,
        end: remaining_end(rule, pivot),
        ..rule.clone()
    };
    let successor_rule = match patch {
        Some(patch) => patch.apply(&carried)?,
        None => {
            carried.validate()?;
            carried
        }
    };

    let mut ops = vec![
        WriteOp::InsertMaster {
            master_id: successor_id.clone(),
            fields: merged_fields(series, changes, pivot),
        },
        WriteOp::InsertRule {
            master_id: successor_id.clone(),
            rule: successor_rule,
        },
        WriteOp::CopyAssociations {
            from: old_id.clone(),
            to: successor_id.clone(),
        },
        WriteOp::MoveExceptions {
            from: old_id.clone(),
            to: successor_id.clone(),
            from_date: pivot,
        },
    ];
    let mut retired = retire_before(series, rule, pivot, false);
    ops.append(&mut retired.ops);

    Ok(UnitOfWork {
        ops,
        outcome: EditOutcome {
            created: Some(successor_id),
            ..retired.outcome
        },
    })
}

fn plan_truncate(series: &Series, edit: &ScopedEdit) -> Result<UnitOfWork> {
    let (rule, pivot) = scheduled_pivot(series, edit)?;
    Ok(retire_before(series, rule, pivot, true))
}

/// End the original series the day before `pivot`. A series with nothing
/// left before the pivot is deleted outright.
fn retire_before(
    series: &Series,
    rule: &RecurrenceRule,
    pivot: NaiveDate,
    purge: bool,
) -> UnitOfWork {
    let master_id = series.id();
    let Some(kept) = rule.truncated_before(pivot) else {
        return UnitOfWork::deleted(master_id);
    };

    let mut ops = Vec::new();
    if purge {
        ops.push(WriteOp::DeleteExceptionsFrom {
            master_id: master_id.clone(),
            from_date: pivot,
        });
    }
    // the anchor always generates, so it must not survive past the cut
    if series.master.anchor_date >= pivot {
        ops.push(WriteOp::UpdateMaster {
            master_id: master_id.clone(),
            fields: MasterFields {
                anchor_date: kept.start_date,
                ..series.master.fields()
            },
        });
    }
    ops.push(WriteOp::UpdateRule {
        master_id: master_id.clone(),
        rule: kept,
    });
    UnitOfWork::updated(master_id, ops)
}

/// End condition for the part of `rule` that starts at `pivot`.
fn remaining_end(rule: &RecurrenceRule, pivot: NaiveDate) -> RuleEnd {
    match rule.end {
        RuleEnd::Never => RuleEnd::Never,
        // an end on the pivot itself leaves exactly one occurrence
        RuleEnd::Until { date } if date <= pivot => RuleEnd::Count { count: 1 },
        RuleEnd::Until { date } => RuleEnd::Until { date },
        RuleEnd::Count { count } => {
            let used = u32::try_from(rule.steps_before(pivot)).unwrap_or(u32::MAX);
            RuleEnd::Count {
                count: count.saturating_sub(used).max(1),
            }
        }
    }
}

fn reject_anchor_change(changes: &ShiftChanges) -> Result<()> {
    if changes.anchor_date.is_some() {
        return Err(ShiftError::InvalidEdit(
            "anchor date changes need the series scope".into(),
        ));
    }
    Ok(())
}

fn merged_fields(
    series: &Series,
    changes: &ShiftChanges,
    anchor_date: NaiveDate,
) -> MasterFields {
    MasterFields {
        title: changes
            .title
            .clone()
            .unwrap_or_else(|| series.master.title.clone()),
        notes: changes.notes.clone().or_else(|| series.master.notes.clone()),
        anchor_date,
    }
}
