//! Operator double-booking scan. Read-only and advisory: nothing is locked,
//! so a concurrent writer can still create the conflict after a clean scan.

use std::collections::HashSet;

use rota_core::config::ConflictConfig;
use rota_core::{MasterId, OperatorId, TenantId};
use rota_recurrence::{DateWindow, GenerationLimits};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::store::ShiftStore;
use crate::types::{Conflict, Series};

/// Which operators to check, over which dates, ignoring which shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictQuery {
    pub operator_ids: Vec<OperatorId>,
    pub window: DateWindow,
    /// Usually the shift being edited, so it does not conflict with itself.
    pub exclude: Option<MasterId>,
}

/// Scan `series` for shifts that occupy a queried operator in `query.window`.
///
/// Recurring series are expanded over the window widened by `padding_days`
/// on each side, so an occurrence moved into the window from outside it is
/// still found. Matching uses effective dates. One conflict is reported per
/// (operator, shift), dated at the earliest match.
pub fn detect_conflicts(
    series: &[Series],
    query: &ConflictQuery,
    padding_days: u32,
    limits: GenerationLimits,
) -> Vec<Conflict> {
    if query.window.is_empty() {
        return Vec::new();
    }
    let wanted: HashSet<&OperatorId> = query.operator_ids.iter().collect();
    let mut conflicts = Vec::new();

    for candidate in series {
        if query.exclude.as_ref() == Some(candidate.id()) {
            continue;
        }
        let booked: Vec<&OperatorId> = candidate
            .operator_ids
            .iter()
            .filter(|op| wanted.contains(op))
            .collect();
        if booked.is_empty() {
            continue;
        }

        let Some(conflict_date) =
            earliest_in_window(candidate, query.window, padding_days, limits)
        else {
            continue;
        };
        for operator_id in booked {
            conflicts.push(Conflict {
                operator_id: operator_id.clone(),
                master_id: candidate.id().clone(),
                title: candidate.master.title.clone(),
                conflict_date,
            });
        }
    }

    conflicts.sort_by(|a, b| {
        (&a.operator_id, a.conflict_date, &a.master_id).cmp(&(
            &b.operator_id,
            b.conflict_date,
            &b.master_id,
        ))
    });
    conflicts
}

fn earliest_in_window(
    series: &Series,
    window: DateWindow,
    padding_days: u32,
    limits: GenerationLimits,
) -> Option<chrono::NaiveDate> {
    let anchor = series.master.anchor_date;
    let Some(rule) = &series.rule else {
        return window.contains(anchor).then_some(anchor);
    };
    if anchor.min(rule.start_date) > window.end {
        return None;
    }

    let generated = series.occurrences(window.padded(padding_days), limits);
    if generated.truncated {
        warn!(
            master_id = %series.id(),
            "conflict scan hit the step bound; results may be incomplete"
        );
    }
    generated
        .occurrences
        .iter()
        .map(|o| o.effective_date())
        .filter(|date| window.contains(*date))
        .min()
}

/// Load the tenant's series for the queried operators and scan them.
#[instrument(
    skip(store, query, config),
    fields(tenant = %tenant, operators = query.operator_ids.len())
)]
pub fn find_conflicts(
    store: &ShiftStore,
    tenant: &TenantId,
    query: &ConflictQuery,
    config: &ConflictConfig,
) -> Result<Vec<Conflict>> {
    let candidates = store.series_for_operators(tenant, &query.operator_ids)?;
    let conflicts = detect_conflicts(
        &candidates,
        query,
        config.window_padding_days,
        store.limits(),
    );
    debug!(candidates = candidates.len(), conflicts = conflicts.len(), "conflict scan done");
    Ok(conflicts)
}
