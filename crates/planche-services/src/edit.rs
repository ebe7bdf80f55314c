//! Edit translation
//!
//! Turns the planning widget's gestures into host writes. Only columns of the
//! current mapping that are not formulas receive values; clones and split
//! halves also copy the source row's stored columns.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use planche_core::{
    mapping::roles, CellValue, ColumnMapping, ColumnMetaSet, Fields, HostDocument, NewRecord,
    PlancheError, RawTable, RecordUpdate, RowId, WidgetConfig, ID_COLUMN, MANUAL_SORT_COLUMN,
};
use planche_schema::ReferenceResolver;

use crate::error::ServiceError;

/// A user gesture on one or more calendar records.
///
/// Offsets and durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditIntent {
    /// Drag or resize: shift the start, stretch the end
    Move {
        ids: Vec<RowId>,
        change_debut: f64,
        #[serde(default)]
        change_amplitude: f64,
    },
    SetDuration {
        ids: Vec<RowId>,
        seconds: f64,
    },
    SetEnd {
        ids: Vec<RowId>,
        end: DateTime<Utc>,
    },
    /// Move rows to another group and optionally subgroup
    Reassign {
        ids: Vec<RowId>,
        groupe_id: String,
        #[serde(default)]
        sous_groupe_id: Option<String>,
    },
    /// Set one column of the `fields` mapping
    SetField {
        ids: Vec<RowId>,
        field: String,
        value: CellValue,
    },
    /// Copy rows, either shifted in time or into another group
    Clone {
        ids: Vec<RowId>,
        #[serde(default)]
        change_debut: f64,
        #[serde(default)]
        groupe_id: Option<String>,
        #[serde(default)]
        sous_groupe_id: Option<String>,
    },
    /// Cut rows in two at `at`
    Split {
        ids: Vec<RowId>,
        at: DateTime<Utc>,
    },
    Create {
        date: DateTime<Utc>,
        duration_seconds: f64,
        #[serde(default)]
        groupe_id: Option<String>,
        #[serde(default)]
        sous_groupe_id: Option<String>,
    },
    Delete {
        ids: Vec<RowId>,
    },
}

/// Host writes produced by one intent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WritePlan {
    pub updates: Vec<RecordUpdate>,
    pub creates: Vec<NewRecord>,
    pub destroys: Vec<RowId>,
    /// Creates complete the updates (split halves) and must not run when
    /// the updates were rejected
    pub creates_follow_updates: bool,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.creates.is_empty() && self.destroys.is_empty()
    }

    fn update(&mut self, id: RowId, fields: Fields) {
        if fields.is_empty() {
            tracing::debug!(id, "nothing to write");
            return;
        }
        self.updates.push(RecordUpdate::new(id, fields));
    }
}

/// `at` shifted by `offset` seconds, `None` when out of range
fn shifted(at: DateTime<Utc>, offset: f64) -> Option<DateTime<Utc>> {
    let millis = (offset * 1000.0).round();
    if !millis.is_finite() {
        return None;
    }
    Duration::try_milliseconds(millis as i64).and_then(|delta| at.checked_add_signed(delta))
}

fn out_of_range(id: RowId, offset: f64) {
    tracing::warn!(id, offset, "date shift out of range, row skipped");
}

fn span_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

/// Translates edit intents against one snapshot
pub struct EditTranslator<'a> {
    raw: &'a RawTable,
    mapping: &'a ColumnMapping,
    metas: &'a ColumnMetaSet,
    config: &'a WidgetConfig,
}

impl<'a> EditTranslator<'a> {
    pub fn new(
        raw: &'a RawTable,
        mapping: &'a ColumnMapping,
        metas: &'a ColumnMetaSet,
        config: &'a WidgetConfig,
    ) -> Self {
        Self {
            raw,
            mapping,
            metas,
            config,
        }
    }

    pub fn translate(&self, intent: &EditIntent) -> WritePlan {
        let mut plan = WritePlan::default();
        match intent {
            EditIntent::Move {
                ids,
                change_debut,
                change_amplitude,
            } => {
                for (id, row) in self.rows(ids) {
                    match self.moved(row, *change_debut, *change_amplitude) {
                        Some(fields) => plan.update(id, fields),
                        None => out_of_range(id, *change_debut + *change_amplitude),
                    }
                }
            }
            EditIntent::SetDuration { ids, seconds: length } => {
                for (id, row) in self.rows(ids) {
                    let mut fields = Fields::new();
                    if self.config.uses_end_date() {
                        if let Some(start) = self.start(row) {
                            let Some(end) = shifted(start, *length) else {
                                out_of_range(id, *length);
                                continue;
                            };
                            self.put(&mut fields, roles::FIN, CellValue::from_datetime(end));
                        }
                    } else {
                        self.put(&mut fields, roles::DUREE, self.duration_value(*length));
                    }
                    plan.update(id, fields);
                }
            }
            EditIntent::SetEnd { ids, end } => {
                for (id, row) in self.rows(ids) {
                    let mut fields = Fields::new();
                    if self.config.uses_end_date() {
                        self.put(&mut fields, roles::FIN, CellValue::from_datetime(*end));
                    } else if let Some(start) = self.start(row) {
                        self.put(&mut fields, roles::DUREE, self.duration_value(span_seconds(start, *end)));
                    }
                    plan.update(id, fields);
                }
            }
            EditIntent::Reassign {
                ids,
                groupe_id,
                sous_groupe_id,
            } => {
                let mut fields = Fields::new();
                self.put_group(&mut fields, Some(groupe_id), sous_groupe_id.as_ref());
                for (id, _) in self.rows(ids) {
                    plan.update(id, fields.clone());
                }
            }
            EditIntent::SetField { ids, field, value } => {
                let editable = self.mapping.columns(roles::FIELDS).contains(field)
                    && !self.metas.is_formula(field);
                if !editable {
                    tracing::warn!(field = %field, "field is not an editable mapped column");
                    return plan;
                }
                for (id, _) in self.rows(ids) {
                    plan.update(id, Fields::from([(field.clone(), value.clone())]));
                }
            }
            EditIntent::Clone {
                ids,
                change_debut,
                groupe_id,
                sous_groupe_id,
            } => {
                for (id, row) in self.rows(ids) {
                    let mut fields = self.snapshot(row);
                    if *change_debut != 0.0 {
                        let Some(shift) = self.shift_interval(row, *change_debut) else {
                            out_of_range(id, *change_debut);
                            continue;
                        };
                        fields.extend(shift);
                    } else {
                        // an empty group id keeps the source row's group
                        let groupe_id = groupe_id.as_ref().filter(|g| !g.is_empty());
                        self.put_group(&mut fields, groupe_id, sous_groupe_id.as_ref());
                    }
                    plan.creates.push(NewRecord::new(fields));
                }
            }
            EditIntent::Split { ids, at } => {
                for (id, row) in self.rows(ids) {
                    match self.split(row, *at) {
                        Some((left, right)) => {
                            plan.update(id, left);
                            plan.creates.push(NewRecord::new(right));
                            plan.creates_follow_updates = true;
                        }
                        None => {
                            let error = PlancheError::InvalidSplitPoint { id };
                            tracing::warn!(%at, "{}", error);
                        }
                    }
                }
            }
            EditIntent::Create {
                date,
                duration_seconds,
                groupe_id,
                sous_groupe_id,
            } => {
                let mut fields = Fields::new();
                self.put(&mut fields, roles::DATE, CellValue::from_datetime(*date));
                if self.config.uses_end_date() {
                    let Some(end) = shifted(*date, *duration_seconds) else {
                        tracing::warn!(%date, duration_seconds, "end date out of range, nothing created");
                        return plan;
                    };
                    self.put(&mut fields, roles::FIN, CellValue::from_datetime(end));
                } else {
                    self.put(&mut fields, roles::DUREE, self.duration_value(*duration_seconds));
                }
                self.put_group(&mut fields, groupe_id.as_ref(), sous_groupe_id.as_ref());
                plan.creates.push(NewRecord::new(fields));
            }
            EditIntent::Delete { ids } => {
                plan.destroys = self.rows(ids).map(|(id, _)| id).collect();
            }
        }
        plan
    }

    /// Known ids with their row positions; unknown ids are logged and dropped
    fn rows<'b>(&'b self, ids: &'b [RowId]) -> impl Iterator<Item = (RowId, usize)> + 'b {
        ids.iter().filter_map(|&id| match self.raw.position_of(id) {
            Some(row) => Some((id, row)),
            None => {
                tracing::warn!(id, "edit targets a row missing from the snapshot");
                None
            }
        })
    }

    /// Mapped column of a role, unless it is a formula
    fn writable(&self, role: &str) -> Option<&'a str> {
        self.mapping
            .column(role)
            .filter(|col| !self.metas.is_formula(col))
    }

    fn put(&self, fields: &mut Fields, role: &str, value: CellValue) {
        if let Some(col) = self.writable(role) {
            fields.insert(col.to_string(), value);
        }
    }

    fn put_group(&self, fields: &mut Fields, groupe_id: Option<&String>, sous_groupe_id: Option<&String>) {
        if let (Some(col), Some(id)) = (self.writable(roles::GROUPE), groupe_id) {
            let value = ReferenceResolver::coerce_id(&self.metas.col_type(col), id);
            fields.insert(col.to_string(), value);
        }
        let sub = sous_groupe_id.filter(|id| !id.is_empty());
        if let (Some(col), Some(id)) = (self.writable(roles::SOUS_GROUPE), sub) {
            let value = ReferenceResolver::coerce_id(&self.metas.col_type(col), id);
            fields.insert(col.to_string(), value);
        }
    }

    fn duration_value(&self, length: f64) -> CellValue {
        CellValue::from(self.config.duration_unit.from_seconds(length))
    }

    fn role_value(&self, role: &str, row: usize) -> Option<&'a CellValue> {
        self.mapping
            .column(role)
            .and_then(|col| self.raw.value(col, row))
    }

    fn start(&self, row: usize) -> Option<DateTime<Utc>> {
        self.role_value(roles::DATE, row)
            .and_then(CellValue::as_datetime)
    }

    fn end(&self, row: usize) -> Option<DateTime<Utc>> {
        self.role_value(roles::FIN, row)
            .and_then(CellValue::as_datetime)
    }

    /// Stored duration in units, the configured default when unset or zero
    fn duree(&self, row: usize) -> f64 {
        self.role_value(roles::DUREE, row)
            .filter(|v| v.is_truthy())
            .and_then(CellValue::as_f64)
            .unwrap_or(self.config.default_duration)
    }

    /// Start (and end in end-date mode) moved by `offset` seconds
    fn shift_interval(&self, row: usize, offset: f64) -> Option<Fields> {
        let mut fields = Fields::new();
        if let Some(start) = self.start(row) {
            self.put(&mut fields, roles::DATE, CellValue::from_datetime(shifted(start, offset)?));
        }
        if self.config.uses_end_date() {
            if let Some(end) = self.end(row) {
                self.put(&mut fields, roles::FIN, CellValue::from_datetime(shifted(end, offset)?));
            }
        }
        Some(fields)
    }

    /// `None` when a shifted date falls out of range
    fn moved(&self, row: usize, change_debut: f64, change_amplitude: f64) -> Option<Fields> {
        let mut fields = Fields::new();
        if let Some(start) = self.start(row) {
            self.put(&mut fields, roles::DATE, CellValue::from_datetime(shifted(start, change_debut)?));
        }
        if self.config.uses_end_date() {
            if let Some(end) = self.end(row) {
                let end = shifted(end, change_debut + change_amplitude)?;
                self.put(&mut fields, roles::FIN, CellValue::from_datetime(end));
            }
        } else {
            let unit = self.config.duration_unit;
            let duree = (self.duree(row) + unit.from_seconds(change_amplitude))
                .max(self.config.min_duration);
            self.put(&mut fields, roles::DUREE, CellValue::from(duree));
        }
        Some(fields)
    }

    /// Left update and right creation for a split, `None` when `at` is not
    /// strictly inside the row's interval or the row has no stored duration
    fn split(&self, row: usize, at: DateTime<Utc>) -> Option<(Fields, Fields)> {
        let start = self.start(row)?;
        let mut left = Fields::new();
        let mut right = self.snapshot(row);
        self.put(&mut right, roles::DATE, CellValue::from_datetime(at));

        if self.config.uses_end_date() {
            let end = self.end(row)?;
            if !(start < at && at < end) {
                return None;
            }
            self.put(&mut left, roles::FIN, CellValue::from_datetime(at));
            self.put(&mut right, roles::FIN, CellValue::from_datetime(end));
        } else {
            let unit = self.config.duration_unit;
            let left_duree = unit.from_seconds(span_seconds(start, at));
            let stored = self
                .role_value(roles::DUREE, row)
                .filter(|v| v.is_truthy())
                .and_then(CellValue::as_f64)?;
            let right_duree = stored - left_duree;
            if left_duree <= 0.0 || right_duree <= 0.0 {
                return None;
            }
            self.put(&mut left, roles::DUREE, CellValue::from(left_duree));
            self.put(&mut right, roles::DUREE, CellValue::from(right_duree));
        }
        Some((left, right))
    }

    /// Stored columns of a row, copied into clones and split halves.
    ///
    /// Without metadata the mapped columns stand in for the stored ones.
    fn snapshot(&self, row: usize) -> Fields {
        let stored: Vec<&str> = if self.metas.is_empty() {
            self.mapping.value_set().into_iter().collect()
        } else {
            self.metas
                .writable_columns()
                .map(|meta| meta.col_id.as_str())
                .collect()
        };
        self.raw.row_snapshot(
            row,
            stored
                .into_iter()
                .filter(|col| *col != ID_COLUMN && *col != MANUAL_SORT_COLUMN),
        )
    }
}

/// Outcome of submitting a write plan
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Ids of created rows in creation order
    pub created: Vec<RowId>,
    pub failures: Vec<ServiceError>,
}

impl WriteReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Executes write plans against the host
#[derive(Clone)]
pub struct EditService {
    host: Arc<dyn HostDocument>,
}

impl EditService {
    pub fn new(host: Arc<dyn HostDocument>) -> Self {
        Self { host }
    }

    /// Apply a plan: one update call, one create call per new row and one
    /// destroy call. A failing call does not stop the others, except that
    /// creates completing rejected updates are dropped.
    #[tracing::instrument(skip(self, plan), fields(
        updates = plan.updates.len(),
        creates = plan.creates.len(),
        destroys = plan.destroys.len()
    ))]
    pub async fn submit(&self, table_id: &str, plan: WritePlan) -> WriteReport {
        let mut report = WriteReport::default();
        if plan.is_empty() {
            return report;
        }

        let mut creates = plan.creates;
        if !plan.updates.is_empty() {
            if let Err(e) = self.host.update_records(table_id, plan.updates).await {
                report.failures.push(rejected("update", e));
                if plan.creates_follow_updates {
                    tracing::warn!(skipped = creates.len(), "updates rejected, dependent rows not created");
                    creates.clear();
                }
            }
        }
        for record in creates {
            match self.host.create_records(table_id, vec![record]).await {
                Ok(ids) => report.created.extend(ids),
                Err(e) => report.failures.push(rejected("create", e)),
            }
        }
        if !plan.destroys.is_empty() {
            if let Err(e) = self.host.destroy_records(table_id, &plan.destroys).await {
                report.failures.push(rejected("destroy", e));
            }
        }

        tracing::debug!(created = ?report.created, failures = report.failures.len(), "write plan applied");
        report
    }
}

fn rejected(call: &str, error: PlancheError) -> ServiceError {
    tracing::warn!(call, error = %error, "host rejected write");
    ServiceError::WriteRejected(format!("{} failed: {}", call, error))
}
