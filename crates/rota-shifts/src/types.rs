use chrono::NaiveDate;
use rota_core::{MasterId, OperatorId, SiteId, TenantId};
use rota_recurrence::{
    generate_occurrences, DateWindow, GeneratedOccurrences, GenerationLimits, OccurrenceRef,
    OccurrenceTemplate, RecurrenceRule, RulePatch, ShiftException,
};
use serde::{Deserialize, Serialize};

/// A persisted shift definition. With a rule it is the template of a series;
/// without one it is a single shift on `anchor_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterShift {
    pub id: MasterId,
    pub tenant_id: TenantId,
    pub title: String,
    pub notes: Option<String>,
    pub anchor_date: NaiveDate,
    pub created_at: String,
    pub updated_at: String,
}

impl MasterShift {
    pub fn fields(&self) -> MasterFields {
        MasterFields {
            title: self.title.clone(),
            notes: self.notes.clone(),
            anchor_date: self.anchor_date,
        }
    }
}

/// The editable columns of a master, as written by the mutator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterFields {
    pub title: String,
    pub notes: Option<String>,
    pub anchor_date: NaiveDate,
}

/// Input for `ShiftStore::create_shift`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShift {
    pub title: String,
    pub notes: Option<String>,
    pub anchor_date: NaiveDate,
    pub rule: Option<RecurrenceRule>,
    #[serde(default)]
    pub site_ids: Vec<SiteId>,
    #[serde(default)]
    pub operator_ids: Vec<OperatorId>,
}

impl NewShift {
    pub fn new(title: impl Into<String>, anchor_date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            notes: None,
            anchor_date,
            rule: None,
            site_ids: Vec::new(),
            operator_ids: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: RecurrenceRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn with_operators(mut self, operator_ids: impl IntoIterator<Item = OperatorId>) -> Self {
        self.operator_ids = operator_ids.into_iter().collect();
        self
    }

    pub fn with_sites(mut self, site_ids: impl IntoIterator<Item = SiteId>) -> Self {
        self.site_ids = site_ids.into_iter().collect();
        self
    }
}

/// A master together with everything needed to expand it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub master: MasterShift,
    pub rule: Option<RecurrenceRule>,
    pub exceptions: Vec<ShiftException>,
    pub site_ids: Vec<SiteId>,
    pub operator_ids: Vec<OperatorId>,
}

impl Series {
    pub fn id(&self) -> &MasterId {
        &self.master.id
    }

    pub fn is_recurring(&self) -> bool {
        self.rule.is_some()
    }

    pub fn template(&self) -> OccurrenceTemplate<'_> {
        OccurrenceTemplate {
            anchor_date: self.master.anchor_date,
            title: &self.master.title,
            notes: self.master.notes.as_deref(),
        }
    }

    /// Expand over `window` with exceptions applied.
    pub fn occurrences(
        &self,
        window: DateWindow,
        limits: GenerationLimits,
    ) -> GeneratedOccurrences {
        generate_occurrences(
            self.template(),
            self.rule.as_ref(),
            window,
            &self.exceptions,
            limits,
        )
    }
}

/// How far an edit reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditScope {
    /// One occurrence, stored as an exception.
    Single,
    /// The chosen occurrence and every later one.
    ThisAndFuture,
    /// Every occurrence, past and future.
    Series,
}

impl std::fmt::Display for EditScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EditScope::Single => "single",
            EditScope::ThisAndFuture => "this_and_future",
            EditScope::Series => "series",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EditScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(EditScope::Single),
            "this_and_future" => Ok(EditScope::ThisAndFuture),
            "series" => Ok(EditScope::Series),
            other => Err(format!("unknown edit scope: {other}")),
        }
    }
}

/// Changes requested by an update. Absent fields are left alone.
///
/// `new_date` only makes sense for a single occurrence, `anchor_date` only
/// for the whole series, and `rule` for the series and this-and-future
/// scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftChanges {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub new_date: Option<NaiveDate>,
    pub anchor_date: Option<NaiveDate>,
    pub rule: Option<RulePatch>,
}

impl ShiftChanges {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EditAction {
    Update(ShiftChanges),
    Delete,
}

/// A mutation request against one master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedEdit {
    pub scope: EditScope,
    pub master_id: MasterId,
    /// The occurrence the edit is anchored on. Required unless `scope` is
    /// `series`.
    pub pivot: Option<NaiveDate>,
    pub action: EditAction,
}

impl ScopedEdit {
    pub fn new(
        scope: EditScope,
        master_id: MasterId,
        pivot: Option<NaiveDate>,
        action: EditAction,
    ) -> Self {
        Self {
            scope,
            master_id,
            pivot,
            action,
        }
    }

    /// Build an edit from a decoded occurrence id.
    pub fn for_occurrence(
        scope: EditScope,
        occurrence: &OccurrenceRef,
        action: EditAction,
    ) -> Self {
        Self::new(
            scope,
            occurrence.master_id.clone(),
            occurrence.occurrence_date,
            action,
        )
    }
}

/// What a committed edit touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOutcome {
    /// Masters updated in place (including exception upserts).
    pub updated: Vec<MasterId>,
    /// Successor series created by a this-and-future split.
    pub created: Option<MasterId>,
    /// Master removed together with its rule, exceptions and associations.
    pub deleted: Option<MasterId>,
}

/// An operator already booked by another shift inside the queried range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub operator_id: OperatorId,
    pub master_id: MasterId,
    pub title: String,
    /// Earliest effective date of the conflicting shift inside the range.
    pub conflict_date: NaiveDate,
}
