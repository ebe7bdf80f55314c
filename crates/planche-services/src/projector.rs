//! Row projection
//!
//! Reads mapped columns of a columnar snapshot row by row and produces the
//! records the widgets display: calendar records for the planning widget and
//! grouped timeline sections for the export widget. Reference columns show
//! the label of the referenced row, choice columns their configured color.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

use planche_core::{
    mapping::roles, CellValue, ColumnMapping, ColumnMetaSet, ColumnType, RawTable, RowId,
    WidgetConfig,
};
use planche_schema::{ReferenceChoice, ReferenceLabels, ReferenceResolver};

/// Reference labels keyed by the column they apply to
pub type LabelMap = HashMap<String, ReferenceLabels>;

/// Resolve labels for every reference column among `col_ids`
pub async fn resolve_labels(
    resolver: &ReferenceResolver,
    metas: &ColumnMetaSet,
    col_ids: &[&str],
) -> LabelMap {
    let mut labels = LabelMap::new();
    for &col_id in col_ids {
        if labels.contains_key(col_id) {
            continue;
        }
        if let Some(meta) = metas.get(col_id).filter(|m| m.col_type.is_reference()) {
            labels.insert(col_id.to_string(), resolver.labels_for(meta).await);
        }
    }
    labels
}

fn display_label(labels: &LabelMap, col_id: &str, value: &CellValue) -> String {
    match labels.get(col_id) {
        Some(lookup) => lookup.label(value),
        None => value.to_string(),
    }
}

/// One row of the planning widget
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarRecord {
    pub id: RowId,
    pub date: Option<DateTime<Utc>>,
    /// Duration in the configured unit; derived from `fin` in end-date mode
    pub duree: Option<f64>,
    pub fin: Option<DateTime<Utc>>,
    pub groupe: String,
    /// Raw group value as text, empty when unset
    pub groupe_id: String,
    pub sous_groupe: Option<String>,
    pub sous_groupe_id: Option<String>,
    pub couleur: String,
    pub commentaire: Option<CellValue>,
    /// Values of the `contenu` columns, in mapping order
    pub contenu: Vec<CellValue>,
    /// Values of the `fields` columns keyed by column id
    pub fields: IndexMap<String, CellValue>,
}

fn mapped_value<'a>(
    raw: &'a RawTable,
    mapping: &ColumnMapping,
    role: &str,
    row: usize,
) -> Option<&'a CellValue> {
    mapping.column(role).and_then(|col| raw.value(col, row))
}

/// Project the rows at `indices` into calendar records
pub fn project_calendar(
    raw: &RawTable,
    indices: impl IntoIterator<Item = usize>,
    mapping: &ColumnMapping,
    metas: &ColumnMetaSet,
    labels: &LabelMap,
    config: &WidgetConfig,
) -> Vec<CalendarRecord> {
    let value = |role: &str, row: usize| mapped_value(raw, mapping, role, row);
    let color_options = mapping
        .column(roles::COULEUR)
        .and_then(|col| metas.widget_options(col));

    indices
        .into_iter()
        .filter_map(|row| {
            let id = raw.row_id(row)?;
            let date = value(roles::DATE, row).and_then(CellValue::as_datetime);
            let fin = if config.uses_end_date() {
                value(roles::FIN, row).and_then(CellValue::as_datetime)
            } else {
                None
            };
            let duree = if config.uses_end_date() {
                date.zip(fin).map(|(start, end)| {
                    config
                        .duration_unit
                        .from_seconds((end - start).num_milliseconds() as f64 / 1000.0)
                })
            } else {
                value(roles::DUREE, row).and_then(CellValue::as_f64)
            };

            let (groupe, groupe_id) = match mapping.column(roles::GROUPE) {
                Some(col) => {
                    let raw_value = raw.value(col, row).cloned().unwrap_or_default();
                    (display_label(labels, col, &raw_value), raw_value.to_id_string())
                }
                None => (String::new(), String::new()),
            };
            let (sous_groupe, sous_groupe_id) = match mapping.column(roles::SOUS_GROUPE) {
                Some(col) => {
                    let raw_value = raw.value(col, row).cloned().unwrap_or_default();
                    (
                        Some(display_label(labels, col, &raw_value)),
                        Some(raw_value.to_id_string()),
                    )
                }
                None => (None, None),
            };

            let couleur = value(roles::COULEUR, row)
                .and_then(|v| color_options.and_then(|options| options.fill_color(v)))
                .unwrap_or(config.fallback_color.as_str())
                .to_string();

            Some(CalendarRecord {
                id,
                date,
                duree,
                fin,
                groupe,
                groupe_id,
                sous_groupe,
                sous_groupe_id,
                couleur,
                commentaire: value(roles::COMMENTAIRE, row).cloned(),
                contenu: mapping
                    .columns(roles::CONTENU)
                    .iter()
                    .map(|col| raw.value(col, row).cloned().unwrap_or_default())
                    .collect(),
                fields: mapping
                    .columns(roles::FIELDS)
                    .iter()
                    .map(|col| (col.clone(), raw.value(col, row).cloned().unwrap_or_default()))
                    .collect(),
            })
        })
        .collect()
}

/// Source columns of a timeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineColumns {
    pub groupe: String,
    pub sous_groupe: Option<String>,
    pub start: String,
    pub end: String,
    pub color: Option<String>,
    pub content: Vec<String>,
}

/// Label of a timeline group: the group label, or group and subgroup labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GroupLabel {
    Single(String),
    Composite(String, String),
}

impl std::fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupLabel::Single(label) => write!(f, "{}", label),
            GroupLabel::Composite(label, sub_label) => write!(f, "{} : {}", label, sub_label),
        }
    }
}

/// One bar of a timeline row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSection {
    /// Text of each content column, empty for unset values
    pub label: Vec<String>,
    pub start_ms: f64,
    pub end_ms: f64,
    pub color: String,
}

/// Rows sharing a group (and subgroup) value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineGroup {
    /// Raw group value, `"group : subgroup"` when a subgroup is set
    pub key: String,
    pub label: GroupLabel,
    pub sections: Vec<TimelineSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    /// Groups in first-seen order
    pub groups: Vec<TimelineGroup>,
    pub min_start: Option<f64>,
    pub max_end: Option<f64>,
}

/// Bucket the rows at `indices` into timeline groups.
///
/// Row order inside a group follows `indices`. Rows without a numeric start
/// or end are left out.
pub fn project_timeline(
    raw: &RawTable,
    indices: impl IntoIterator<Item = usize>,
    columns: &TimelineColumns,
    metas: &ColumnMetaSet,
    labels: &LabelMap,
    fallback_color: &str,
) -> Timeline {
    let color_options = columns
        .color
        .as_deref()
        .and_then(|col| metas.widget_options(col));
    let mut timeline = Timeline::default();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in indices {
        let (Some(start_ms), Some(end_ms)) = (
            raw.value(&columns.start, row).and_then(CellValue::as_epoch_millis),
            raw.value(&columns.end, row).and_then(CellValue::as_epoch_millis),
        ) else {
            tracing::debug!(row, "skipping row without start or end");
            continue;
        };

        let group_value = raw.value(&columns.groupe, row).cloned().unwrap_or_default();
        let group_label = display_label(labels, &columns.groupe, &group_value);
        let (key, label) = match &columns.sous_groupe {
            Some(sub_col) => {
                let sub_value = raw.value(sub_col, row).cloned().unwrap_or_default();
                (
                    format!("{} : {}", group_value, sub_value),
                    GroupLabel::Composite(group_label, display_label(labels, sub_col, &sub_value)),
                )
            }
            None => (group_value.to_string(), GroupLabel::Single(group_label)),
        };

        let color = columns
            .color
            .as_deref()
            .and_then(|col| raw.value(col, row))
            .and_then(|v| color_options.and_then(|options| options.fill_color(v)))
            .unwrap_or(fallback_color)
            .to_string();
        let section = TimelineSection {
            label: columns
                .content
                .iter()
                .map(|col| {
                    raw.value(col, row)
                        .filter(|v| v.is_truthy())
                        .map(|v| v.to_string())
                        .unwrap_or_default()
                })
                .collect(),
            start_ms,
            end_ms,
            color,
        };

        let position = *positions.entry(key.clone()).or_insert_with(|| {
            timeline.groups.push(TimelineGroup {
                key,
                label,
                sections: Vec::new(),
            });
            timeline.groups.len() - 1
        });
        timeline.groups[position].sections.push(section);

        timeline.min_start = Some(timeline.min_start.map_or(start_ms, |min| min.min(start_ms)));
        timeline.max_end = Some(timeline.max_end.map_or(end_ms, |max| max.max(end_ms)));
    }

    timeline
}

/// A column of the `fields` mapping the user may edit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableField {
    pub col_id: String,
    pub label: String,
    pub col_type: ColumnType,
    /// Selectable rows for reference columns whose labels resolved
    pub references: Option<Vec<ReferenceChoice>>,
}

/// Non-formula columns of the `fields` mapping with known metadata
pub async fn editable_fields(
    mapping: &ColumnMapping,
    metas: &ColumnMetaSet,
    resolver: &ReferenceResolver,
) -> Vec<EditableField> {
    let mut fields = Vec::new();
    for col_id in mapping.columns(roles::FIELDS) {
        let Some(meta) = metas.get(col_id).filter(|m| !m.is_formula) else {
            continue;
        };
        let references = if meta.col_type.is_reference() {
            let labels = resolver.labels_for(meta).await;
            labels.is_resolved().then(|| labels.choices())
        } else {
            None
        };
        fields.push(EditableField {
            col_id: meta.col_id.clone(),
            label: meta.label.clone(),
            col_type: meta.col_type.clone(),
            references,
        });
    }
    fields
}
