use anyhow::{bail, Context, Result};
use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rota_core::{MasterId, OperatorId, RotaConfig, SiteId, TenantId};
use rota_recurrence::{
    encode_occurrence_id, DateWindow, Frequency, GenerationLimits, Occurrence, OccurrenceRef,
    RecurrenceRule,
};
use rota_shifts::{
    find_conflicts, ConflictQuery, EditAction, EditScope, NewShift, ScopedEdit, ShiftChanges,
    ShiftStore,
};
use serde::Serialize;
use tracing::{info, warn};

/// Days listed by `occurrences` when no `--to` is given.
const DEFAULT_LISTING_DAYS: u64 = 30;

#[derive(Parser)]
#[command(name = "rota")]
#[command(about = "Recurring shift schedules: list occurrences, check conflicts, edit series")]
struct Cli {
    /// Config file (defaults to $ROTA_CONFIG, then ~/.rota/rota.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Tenant every read and write is scoped to
    #[arg(long)]
    tenant: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a shift, recurring when --frequency is given
    Create {
        title: String,

        /// Date the shift is created for (YYYY-MM-DD)
        #[arg(long)]
        anchor: NaiveDate,

        #[arg(long)]
        notes: Option<String>,

        /// DAILY or WEEKLY
        #[arg(long)]
        frequency: Option<Frequency>,

        #[arg(long, default_value_t = 1)]
        interval: u32,

        /// First stepped date (defaults to the anchor)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last possible date, inclusive
        #[arg(long, conflicts_with = "count")]
        until: Option<NaiveDate>,

        /// Number of stepped occurrences
        #[arg(long)]
        count: Option<u32>,

        #[arg(long = "operator")]
        operators: Vec<String>,

        #[arg(long = "site")]
        sites: Vec<String>,
    },
    /// List occurrences of a shift as JSON lines
    Occurrences {
        id: MasterId,

        /// First date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date (YYYY-MM-DD, defaults to 30 days after --from)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Report shifts that already book the given operators
    Conflicts {
        #[arg(long = "operator", required = true)]
        operators: Vec<String>,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        /// Shift to leave out, usually the one being edited
        #[arg(long)]
        exclude: Option<MasterId>,
    },
    /// Change one occurrence, it and every later one, or the whole series
    Edit {
        /// <masterId>_<YYYY-MM-DD>, or a bare id for the series scope
        occurrence: OccurrenceRef,

        /// single, this_and_future or series
        #[arg(long, default_value = "single")]
        scope: EditScope,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Move a single occurrence to another date
        #[arg(long)]
        new_date: Option<NaiveDate>,

        /// New anchor date for the whole series
        #[arg(long)]
        anchor: Option<NaiveDate>,
    },
    /// Cancel one occurrence (<masterId>_<YYYY-MM-DD>)
    Cancel { occurrence: OccurrenceRef },
    /// Remove an occurrence and every later one
    Truncate { occurrence: OccurrenceRef },
    /// Delete a shift and all of its occurrences
    Delete { id: MasterId },
}

#[derive(Serialize)]
struct OccurrenceLine<'a> {
    occurrence_id: String,
    #[serde(flatten)]
    occurrence: &'a Occurrence,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rota=info,rota_shifts=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RotaConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        RotaConfig::default()
    });
    let tenant = TenantId::from(cli.tenant);
    let store = open_store(&config)?;

    match cli.command {
        Commands::Create {
            title,
            anchor,
            notes,
            frequency,
            interval,
            start,
            until,
            count,
            operators,
            sites,
        } => {
            let rule = match frequency {
                Some(frequency) => Some(RecurrenceRule::from_parts(
                    frequency,
                    interval,
                    start.unwrap_or(anchor),
                    until,
                    count,
                )?),
                None if until.is_some() || count.is_some() || start.is_some() => {
                    bail!("--start, --until and --count need --frequency")
                }
                None => None,
            };
            let mut shift = NewShift::new(title, anchor)
                .with_operators(operators.into_iter().map(OperatorId::from))
                .with_sites(sites.into_iter().map(SiteId::from));
            shift.notes = notes;
            shift.rule = rule;

            let master = store.create_shift(&tenant, shift)?;
            println!("{}", master.id);
        }
        Commands::Occurrences { id, from, to } => {
            let from = from.unwrap_or_else(|| Utc::now().date_naive());
            let to = match to {
                Some(to) => to,
                None => from
                    .checked_add_days(Days::new(DEFAULT_LISTING_DAYS))
                    .context("date out of range")?,
            };
            let generated = store.occurrences(&tenant, &id, DateWindow::new(from, to))?;
            if generated.truncated {
                warn!(master_id = %id, "listing truncated by the step bound; narrow the range");
            }
            for occurrence in &generated.occurrences {
                let line = OccurrenceLine {
                    occurrence_id: encode_occurrence_id(&id, occurrence.date),
                    occurrence,
                };
                println!("{}", serde_json::to_string(&line)?);
            }
        }
        Commands::Conflicts {
            operators,
            from,
            to,
            exclude,
        } => {
            let query = ConflictQuery {
                operator_ids: operators.into_iter().map(OperatorId::from).collect(),
                window: DateWindow::new(from, to),
                exclude,
            };
            for conflict in find_conflicts(&store, &tenant, &query, &config.conflicts)? {
                println!("{}", serde_json::to_string(&conflict)?);
            }
        }
        Commands::Edit {
            occurrence,
            scope,
            title,
            notes,
            new_date,
            anchor,
        } => {
            let changes = ShiftChanges {
                title,
                notes,
                new_date,
                anchor_date: anchor,
                rule: None,
            };
            let edit = ScopedEdit::for_occurrence(scope, &occurrence, EditAction::Update(changes));
            let outcome = store.apply_scoped_edit(&tenant, &edit)?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Cancel { occurrence } => {
            let edit =
                ScopedEdit::for_occurrence(EditScope::Single, &occurrence, EditAction::Delete);
            let outcome = store.apply_scoped_edit(&tenant, &edit)?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Truncate { occurrence } => {
            let edit = ScopedEdit::for_occurrence(
                EditScope::ThisAndFuture,
                &occurrence,
                EditAction::Delete,
            );
            let outcome = store.apply_scoped_edit(&tenant, &edit)?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Delete { id } => {
            let edit = ScopedEdit::new(EditScope::Series, id, None, EditAction::Delete);
            let outcome = store.apply_scoped_edit(&tenant, &edit)?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
    }
    Ok(())
}

fn open_store(config: &RotaConfig) -> Result<ShiftStore> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let conn = rusqlite::Connection::open(db_path)
        .with_context(|| format!("cannot open database at {db_path}"))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    let limits = GenerationLimits::from(&config.recurrence);
    Ok(ShiftStore::new(conn)?.with_limits(limits))
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
