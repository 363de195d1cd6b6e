use rusqlite::{Connection, Result};

/// Initialise all tables for the shifts subsystem. Safe to call on every
/// startup; CREATE IF NOT EXISTS makes it idempotent.
///
/// Dates are `YYYY-MM-DD` text, so string comparison is date comparison.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_master_shifts_table(conn)?;
    create_recurrence_rules_table(conn)?;
    create_exceptions_table(conn)?;
    create_association_tables(conn)?;
    Ok(())
}

fn create_master_shifts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS master_shifts (
            id          TEXT PRIMARY KEY NOT NULL,
            tenant_id   TEXT NOT NULL,
            title       TEXT NOT NULL,
            notes       TEXT,
            anchor_date TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_master_shifts_tenant
            ON master_shifts(tenant_id, anchor_date);",
    )
}

/// At most one rule per master; no row means a single (non-recurring) shift.
fn create_recurrence_rules_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS recurrence_rules (
            master_id     TEXT PRIMARY KEY NOT NULL
                          REFERENCES master_shifts(id) ON DELETE CASCADE,
            frequency     TEXT NOT NULL,            -- DAILY | WEEKLY
            step_interval INTEGER NOT NULL CHECK (step_interval >= 1),
            start_date    TEXT NOT NULL,
            end_date      TEXT,                     -- NULL means no end date
            max_count     INTEGER,                  -- NULL means no count bound
            CHECK (end_date IS NULL OR max_count IS NULL)
        );",
    )
}

/// UNIQUE(master_id, date) backs the upsert in single-occurrence edits.
fn create_exceptions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS shift_exceptions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            master_id   TEXT NOT NULL REFERENCES master_shifts(id) ON DELETE CASCADE,
            date        TEXT NOT NULL,
            kind        TEXT NOT NULL,              -- CANCELLED | MODIFIED
            new_title   TEXT,
            new_notes   TEXT,
            new_date    TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(master_id, date)
        );",
    )
}

fn create_association_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS shift_sites (
            master_id   TEXT NOT NULL REFERENCES master_shifts(id) ON DELETE CASCADE,
            site_id     TEXT NOT NULL,
            PRIMARY KEY (master_id, site_id)
        );
        CREATE TABLE IF NOT EXISTS shift_operators (
            master_id   TEXT NOT NULL REFERENCES master_shifts(id) ON DELETE CASCADE,
            operator_id TEXT NOT NULL,
            PRIMARY KEY (master_id, operator_id)
        );
        CREATE INDEX IF NOT EXISTS idx_shift_operators_operator
            ON shift_operators(operator_id);",
    )
}
