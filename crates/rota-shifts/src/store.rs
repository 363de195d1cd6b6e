use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use rota_core::{MasterId, OperatorId, SiteId, TenantId};
use rota_recurrence::{
    decode_occurrence_id, is_scheduled_occurrence, DateWindow, ExceptionKind, ExceptionMap,
    ExceptionType, GeneratedOccurrences, GenerationLimits, Occurrence, RecurrenceError,
    RecurrenceRule, RuleEnd, ShiftException,
};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::{debug, info, instrument};

use crate::db::init_db;
use crate::error::{Result, ShiftError};
use crate::mutator::{plan_edit, UnitOfWork, WriteOp};
use crate::types::{EditOutcome, MasterFields, MasterShift, NewShift, ScopedEdit, Series};

const MASTER_SELECT_SQL: &str =
    "SELECT id, tenant_id, title, notes, anchor_date, created_at, updated_at FROM master_shifts";

/// Tenant-scoped persistence for master shifts and everything hanging off
/// them. All multi-row writes go through a single SQLite transaction.
pub struct ShiftStore {
    db: Mutex<Connection>,
    limits: GenerationLimits,
}

impl ShiftStore {
    /// Wrap `conn`, enabling foreign keys and creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            limits: GenerationLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: GenerationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> GenerationLimits {
        self.limits
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| ShiftError::LockPoisoned)
    }

    /// Insert a master with its rule and associations.
    #[instrument(skip(self, shift), fields(tenant = %tenant))]
    pub fn create_shift(&self, tenant: &TenantId, shift: NewShift) -> Result<MasterShift> {
        if let Some(rule) = &shift.rule {
            rule.validate()?;
        }

        let now = Utc::now().to_rfc3339();
        let master = MasterShift {
            id: MasterId::new(),
            tenant_id: tenant.clone(),
            title: shift.title,
            notes: shift.notes,
            anchor_date: shift.anchor_date,
            created_at: now.clone(),
            updated_at: now.clone(),
        };

        let mut db = self.conn()?;
        let tx = db.transaction()?;
        insert_master(&tx, tenant, &master.id, &master.fields(), &now)?;
        if let Some(rule) = &shift.rule {
            insert_rule(&tx, &master.id, rule)?;
        }
        for site_id in &shift.site_ids {
            tx.execute(
                "INSERT OR IGNORE INTO shift_sites (master_id, site_id) VALUES (?1, ?2)",
                params![master.id.as_str(), site_id.as_str()],
            )?;
        }
        for operator_id in &shift.operator_ids {
            tx.execute(
                "INSERT OR IGNORE INTO shift_operators (master_id, operator_id) VALUES (?1, ?2)",
                params![master.id.as_str(), operator_id.as_str()],
            )?;
        }
        tx.commit()?;

        info!(master_id = %master.id, recurring = shift.rule.is_some(), "shift created");
        Ok(master)
    }

    #[instrument(skip(self), fields(tenant = %tenant, master_id = %master_id))]
    pub fn load_series(&self, tenant: &TenantId, master_id: &MasterId) -> Result<Series> {
        let db = self.conn()?;
        require_series(&db, tenant, master_id)
    }

    /// Every series owned by `tenant`, ordered by anchor date.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub fn list_series(&self, tenant: &TenantId) -> Result<Vec<Series>> {
        let db = self.conn()?;
        let ids = master_ids(
            &db,
            "SELECT id FROM master_shifts WHERE tenant_id = ?1 ORDER BY anchor_date, id",
            &[tenant.as_str()],
        )?;
        load_many(&db, tenant, &ids)
    }

    /// Series of `tenant` with at least one of `operator_ids` assigned.
    #[instrument(
        skip(self, operator_ids),
        fields(tenant = %tenant, operators = operator_ids.len())
    )]
    pub fn series_for_operators(
        &self,
        tenant: &TenantId,
        operator_ids: &[OperatorId],
    ) -> Result<Vec<Series>> {
        if operator_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (0..operator_ids.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT m.id FROM master_shifts m
             JOIN shift_operators o ON o.master_id = m.id
             WHERE m.tenant_id = ?1 AND o.operator_id IN ({placeholders})
             ORDER BY m.id"
        );
        let mut args = vec![tenant.as_str()];
        args.extend(operator_ids.iter().map(OperatorId::as_str));

        let db = self.conn()?;
        let ids = master_ids(&db, &sql, &args)?;
        debug!(candidates = ids.len(), "series loaded for operators");
        load_many(&db, tenant, &ids)
    }

    /// Occurrences of one master inside `window`, exceptions applied.
    pub fn occurrences(
        &self,
        tenant: &TenantId,
        master_id: &MasterId,
        window: DateWindow,
    ) -> Result<GeneratedOccurrences> {
        let series = self.load_series(tenant, master_id)?;
        Ok(series.occurrences(window, self.limits))
    }

    /// Resolve an occurrence id. A bare master id resolves to the anchor.
    ///
    /// Returns `Ok(None)` when the date is cancelled and
    /// `NotAValidOccurrence` when the date is not on the schedule.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub fn occurrence(&self, tenant: &TenantId, occurrence_id: &str) -> Result<Option<Occurrence>> {
        let occurrence_ref = decode_occurrence_id(occurrence_id)?;
        let series = self.load_series(tenant, &occurrence_ref.master_id)?;
        let anchor = series.master.anchor_date;
        let date = occurrence_ref.occurrence_date.unwrap_or(anchor);

        let on_schedule = match &series.rule {
            Some(rule) => is_scheduled_occurrence(date, anchor, rule),
            None => date == anchor,
        };
        if !on_schedule {
            return Err(RecurrenceError::NotAValidOccurrence {
                master_id: occurrence_ref.master_id,
                date,
            }
            .into());
        }
        if ExceptionMap::new(&series.exceptions).is_cancelled(date) {
            debug!(%date, "occurrence cancelled");
            return Ok(None);
        }

        let generated = series.occurrences(DateWindow::new(date, date), self.limits);
        Ok(generated.occurrences.into_iter().find(|o| o.date == date))
    }

    /// Plan and apply a scoped edit in one transaction.
    #[instrument(
        skip(self, edit),
        fields(tenant = %tenant, master_id = %edit.master_id, scope = %edit.scope)
    )]
    pub fn apply_scoped_edit(&self, tenant: &TenantId, edit: &ScopedEdit) -> Result<EditOutcome> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let series = require_series(&tx, tenant, &edit.master_id)?;
        let work = plan_edit(&series, edit, MasterId::new())?;
        apply_unit_of_work(&tx, tenant, &work)?;
        tx.commit()?;

        info!(
            ops = work.len(),
            created = ?work.outcome.created,
            deleted = ?work.outcome.deleted,
            "scoped edit committed"
        );
        Ok(work.outcome)
    }

    /// Delete a master and, through the cascade, everything attached to it.
    #[instrument(skip(self), fields(tenant = %tenant, master_id = %master_id))]
    pub fn delete_shift(&self, tenant: &TenantId, master_id: &MasterId) -> Result<()> {
        let db = self.conn()?;
        let n = db.execute(
            "DELETE FROM master_shifts WHERE id = ?1 AND tenant_id = ?2",
            params![master_id.as_str(), tenant.as_str()],
        )?;
        if n == 0 {
            return Err(ShiftError::NotFound {
                master_id: master_id.clone(),
            });
        }
        info!("shift deleted");
        Ok(())
    }
}

fn apply_unit_of_work(conn: &Connection, tenant: &TenantId, work: &UnitOfWork) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    for op in &work.ops {
        debug!(?op, "applying write");
        apply_op(conn, tenant, op, &now)?;
    }
    Ok(())
}

fn apply_op(conn: &Connection, tenant: &TenantId, op: &WriteOp, now: &str) -> Result<()> {
    match op {
        WriteOp::UpsertException { master_id, exception } => {
            let (new_title, new_notes, new_date) = match &exception.kind {
                ExceptionKind::Cancelled => (None, None, None),
                ExceptionKind::Modified {
                    new_title,
                    new_notes,
                    new_date,
                } => (new_title.as_deref(), new_notes.as_deref(), *new_date),
            };
            conn.execute(
                "INSERT INTO shift_exceptions
                 (master_id, date, kind, new_title, new_notes, new_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(master_id, date) DO UPDATE SET
                    kind       = excluded.kind,
                    new_title  = excluded.new_title,
                    new_notes  = excluded.new_notes,
                    new_date   = excluded.new_date,
                    updated_at = excluded.updated_at",
                params![
                    master_id.as_str(),
                    exception.date,
                    exception.kind.exception_type().to_string(),
                    new_title,
                    new_notes,
                    new_date,
                    now,
                ],
            )?;
        }
        WriteOp::UpdateMaster { master_id, fields } => {
            let n = conn.execute(
                "UPDATE master_shifts SET title = ?1, notes = ?2, anchor_date = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![fields.title, fields.notes, fields.anchor_date, now, master_id.as_str()],
            )?;
            if n == 0 {
                return Err(ShiftError::NotFound {
                    master_id: master_id.clone(),
                });
            }
        }
        WriteOp::UpdateRule { master_id, rule } => {
            conn.execute(
                "UPDATE recurrence_rules
                 SET frequency = ?1, step_interval = ?2, start_date = ?3,
                     end_date = ?4, max_count = ?5
                 WHERE master_id = ?6",
                params![
                    rule.frequency.to_string(),
                    rule.interval,
                    rule.start_date,
                    rule.end_date(),
                    rule.count(),
                    master_id.as_str(),
                ],
            )?;
            touch_master(conn, master_id, now)?;
        }
        WriteOp::InsertMaster { master_id, fields } => {
            insert_master(conn, tenant, master_id, fields, now)?;
        }
        WriteOp::InsertRule { master_id, rule } => {
            insert_rule(conn, master_id, rule)?;
        }
        WriteOp::CopyAssociations { from, to } => {
            conn.execute(
                "INSERT INTO shift_sites (master_id, site_id)
                 SELECT ?2, site_id FROM shift_sites WHERE master_id = ?1",
                params![from.as_str(), to.as_str()],
            )?;
            conn.execute(
                "INSERT INTO shift_operators (master_id, operator_id)
                 SELECT ?2, operator_id FROM shift_operators WHERE master_id = ?1",
                params![from.as_str(), to.as_str()],
            )?;
        }
        WriteOp::MoveExceptions { from, to, from_date } => {
            let moved = conn.execute(
                "UPDATE shift_exceptions SET master_id = ?2, updated_at = ?4
                 WHERE master_id = ?1 AND date >= ?3",
                params![from.as_str(), to.as_str(), from_date, now],
            )?;
            debug!(moved, "exceptions re-parented");
        }
        WriteOp::DeleteExceptionsFrom { master_id, from_date } => {
            let removed = conn.execute(
                "DELETE FROM shift_exceptions WHERE master_id = ?1 AND date >= ?2",
                params![master_id.as_str(), from_date],
            )?;
            debug!(removed, "exceptions purged");
        }
        WriteOp::DeleteMaster { master_id } => {
            conn.execute(
                "DELETE FROM master_shifts WHERE id = ?1",
                params![master_id.as_str()],
            )?;
        }
    }
    Ok(())
}

fn insert_master(
    conn: &Connection,
    tenant: &TenantId,
    master_id: &MasterId,
    fields: &MasterFields,
    now: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO master_shifts
             (id, tenant_id, title, notes, anchor_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            master_id.as_str(),
            tenant.as_str(),
            fields.title,
            fields.notes,
            fields.anchor_date,
            now,
        ],
    )?;
    Ok(())
}

fn insert_rule(conn: &Connection, master_id: &MasterId, rule: &RecurrenceRule) -> Result<()> {
    conn.execute(
        "INSERT INTO recurrence_rules
         (master_id, frequency, step_interval, start_date, end_date, max_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            master_id.as_str(),
            rule.frequency.to_string(),
            rule.interval,
            rule.start_date,
            rule.end_date(),
            rule.count(),
        ],
    )?;
    Ok(())
}

fn touch_master(conn: &Connection, master_id: &MasterId, now: &str) -> Result<()> {
    conn.execute(
        "UPDATE master_shifts SET updated_at = ?1 WHERE id = ?2",
        params![now, master_id.as_str()],
    )?;
    Ok(())
}

fn master_ids(conn: &Connection, sql: &str, args: &[&str]) -> Result<Vec<MasterId>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params_from_iter(args.iter()), |row| parse_column(row, 0))?
        .collect::<rusqlite::Result<Vec<MasterId>>>()?;
    Ok(ids)
}

fn load_many(conn: &Connection, tenant: &TenantId, ids: &[MasterId]) -> Result<Vec<Series>> {
    ids.iter()
        .map(|id| require_series(conn, tenant, id))
        .collect()
}

fn require_series(conn: &Connection, tenant: &TenantId, master_id: &MasterId) -> Result<Series> {
    load_series(conn, tenant, master_id)?.ok_or_else(|| ShiftError::NotFound {
        master_id: master_id.clone(),
    })
}

/// Load a master and its rule, exceptions and associations. A master owned
/// by another tenant is reported as absent.
fn load_series(
    conn: &Connection,
    tenant: &TenantId,
    master_id: &MasterId,
) -> Result<Option<Series>> {
    let master = match conn.query_row(
        &format!("{MASTER_SELECT_SQL} WHERE id = ?1 AND tenant_id = ?2"),
        params![master_id.as_str(), tenant.as_str()],
        row_to_master,
    ) {
        Ok(m) => m,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(ShiftError::Database(e)),
    };

    let rule = match conn.query_row(
        "SELECT frequency, step_interval, start_date, end_date, max_count
         FROM recurrence_rules WHERE master_id = ?1",
        params![master_id.as_str()],
        row_to_rule,
    ) {
        Ok(r) => Some(r),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(ShiftError::Database(e)),
    };

    let mut stmt = conn.prepare(
        "SELECT date, kind, new_title, new_notes, new_date
         FROM shift_exceptions WHERE master_id = ?1 ORDER BY date",
    )?;
    let exceptions = stmt
        .query_map(params![master_id.as_str()], row_to_exception)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt =
        conn.prepare("SELECT site_id FROM shift_sites WHERE master_id = ?1 ORDER BY site_id")?;
    let site_ids = stmt
        .query_map(params![master_id.as_str()], |row| row.get::<_, String>(0).map(SiteId))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT operator_id FROM shift_operators WHERE master_id = ?1 ORDER BY operator_id",
    )?;
    let operator_ids = stmt
        .query_map(params![master_id.as_str()], |row| {
            row.get::<_, String>(0).map(OperatorId)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    debug!(
        master_id = %master_id,
        recurring = rule.is_some(),
        exceptions = exceptions.len(),
        "series loaded"
    );
    Ok(Some(Series {
        master,
        rule,
        exceptions,
        site_ids,
        operator_ids,
    }))
}

fn row_to_master(row: &Row<'_>) -> rusqlite::Result<MasterShift> {
    Ok(MasterShift {
        id: parse_column(row, 0)?,
        tenant_id: TenantId(row.get(1)?),
        title: row.get(2)?,
        notes: row.get(3)?,
        anchor_date: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<RecurrenceRule> {
    let end_date: Option<NaiveDate> = row.get(3)?;
    let max_count: Option<u32> = row.get(4)?;
    let end = match (end_date, max_count) {
        (Some(date), _) => RuleEnd::Until { date },
        (None, Some(count)) => RuleEnd::Count { count },
        (None, None) => RuleEnd::Never,
    };
    Ok(RecurrenceRule {
        frequency: parse_column(row, 0)?,
        interval: row.get(1)?,
        start_date: row.get(2)?,
        end,
    })
}

fn row_to_exception(row: &Row<'_>) -> rusqlite::Result<ShiftException> {
    let kind = match parse_column::<ExceptionType>(row, 1)? {
        ExceptionType::Cancelled => ExceptionKind::Cancelled,
        ExceptionType::Modified => ExceptionKind::Modified {
            new_title: row.get(2)?,
            new_notes: row.get(3)?,
            new_date: row.get(4)?,
        },
    };
    Ok(ShiftException {
        date: row.get(0)?,
        kind,
    })
}

/// Read a TEXT column through `FromStr`.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: T::Err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}
