//! Inclusion filters
//!
//! A filter set maps a column id to the set of raw values that may pass.
//! Columns without an entry are unfiltered; an entry with an empty include
//! set lets nothing through. The set is persisted as JSON text in one field
//! of a host record.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use planche_core::{
    CellValue, ColumnMeta, ColumnMetaSet, HostDocument, RawTable, RecordUpdate, RowId,
    MANUAL_SORT_COLUMN,
};
use planche_schema::ReferenceLabels;

use crate::error::{ServiceError, ServiceResult};

/// Prefix of columns the host adds for its own bookkeeping
const HELPER_COLUMN_PREFIX: &str = "gristHelper_";

/// Values allowed through for one column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFilter {
    #[serde(default)]
    pub include: IndexSet<CellValue>,
}

impl ColumnFilter {
    pub fn new(include: impl IntoIterator<Item = CellValue>) -> Self {
        Self {
            include: include.into_iter().collect(),
        }
    }

    pub fn allows(&self, value: &CellValue) -> bool {
        self.include.contains(value)
    }
}

/// Filters keyed by column id, in the order they were added
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet {
    filters: IndexMap<String, ColumnFilter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, col_id: impl Into<String>, filter: ColumnFilter) -> Self {
        self.filters.insert(col_id.into(), filter);
        self
    }

    /// Parse persisted JSON text. Empty or malformed text gives an empty set.
    pub fn parse(text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Option<FilterSet>>(text) {
            Ok(filters) => filters.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed filter set");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> ServiceResult<String> {
        serde_json::to_string(self).map_err(|e| ServiceError::Core(e.into()))
    }

    pub fn get(&self, col_id: &str) -> Option<&ColumnFilter> {
        self.filters.get(col_id)
    }

    pub fn contains(&self, col_id: &str) -> bool {
        self.filters.contains_key(col_id)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnFilter)> {
        self.filters.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Include every distinct value of the column
    pub fn set_filter_all(&mut self, raw: &RawTable, col_id: &str) {
        self.filters.insert(
            col_id.to_string(),
            ColumnFilter {
                include: raw.distinct_values(col_id),
            },
        );
    }

    /// Include nothing
    pub fn set_filter_none(&mut self, col_id: &str) {
        self.filters
            .insert(col_id.to_string(), ColumnFilter::default());
    }

    /// Add the value to the column's include set, or remove it if present.
    ///
    /// Returns false when the column has no filter.
    pub fn toggle_value(&mut self, col_id: &str, value: &CellValue) -> bool {
        let Some(filter) = self.filters.get_mut(col_id) else {
            return false;
        };
        if !filter.include.shift_remove(value) {
            filter.include.insert(value.clone());
        }
        true
    }

    pub fn remove_filter(&mut self, col_id: &str) -> bool {
        self.filters.shift_remove(col_id).is_some()
    }

    /// Start filtering a column with every value selected
    pub fn add_filter(&mut self, raw: &RawTable, col_id: &str) {
        self.set_filter_all(raw, col_id);
    }
}

/// Computes the rows that survive a filter set
pub struct FilterEngine;

impl FilterEngine {
    /// Row positions passing every filter. Filters on columns the table does
    /// not have are ignored.
    pub fn apply(raw: &RawTable, filters: &FilterSet) -> BTreeSet<usize> {
        let mut rows: BTreeSet<usize> = raw.all_indices().collect();
        for (col_id, filter) in filters.iter() {
            let Some(values) = raw.column(col_id) else {
                tracing::warn!(column = %col_id, "ignoring filter on unknown column");
                continue;
            };
            rows.retain(|&row| filter.allows(&values[row]));
        }
        tracing::debug!(total = raw.row_count(), kept = rows.len(), "applied filters");
        rows
    }
}

/// One checkbox of a column filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOption {
    pub value: CellValue,
    pub label: String,
    pub selected: bool,
}

/// Distinct values of a filtered column with their labels and selection
/// state, in first-seen order
pub fn filter_options(
    raw: &RawTable,
    filters: &FilterSet,
    col_id: &str,
    labels: &ReferenceLabels,
) -> Vec<FilterOption> {
    let filter = filters.get(col_id);
    raw.distinct_values(col_id)
        .into_iter()
        .map(|value| FilterOption {
            label: labels.label(&value),
            selected: filter.is_some_and(|f| f.allows(&value)),
            value,
        })
        .collect()
}

/// Columns a new filter can be added on
pub fn addable_columns<'a>(metas: &'a ColumnMetaSet, filters: &FilterSet) -> Vec<&'a ColumnMeta> {
    metas
        .iter()
        .filter(|m| m.col_id != MANUAL_SORT_COLUMN && !m.col_id.starts_with(HELPER_COLUMN_PREFIX))
        .filter(|m| !filters.contains(&m.col_id))
        .collect()
}

/// Host field holding a persisted filter set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTarget {
    pub table_id: String,
    pub row_id: RowId,
    pub col_id: String,
}

/// Filter set bound to its persistence field.
///
/// Each mutation writes the whole set back with a single host update. The
/// local set only changes once the host accepted the write.
pub struct FilterService {
    host: Arc<dyn HostDocument>,
    target: FilterTarget,
    filters: FilterSet,
}

impl FilterService {
    pub fn new(host: Arc<dyn HostDocument>, target: FilterTarget, filters: FilterSet) -> Self {
        Self {
            host,
            target,
            filters,
        }
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn target(&self) -> &FilterTarget {
        &self.target
    }

    pub async fn set_filter_all(&mut self, raw: &RawTable, col_id: &str) -> ServiceResult<()> {
        let mut next = self.filters.clone();
        next.set_filter_all(raw, col_id);
        self.commit(next).await
    }

    pub async fn set_filter_none(&mut self, col_id: &str) -> ServiceResult<()> {
        let mut next = self.filters.clone();
        next.set_filter_none(col_id);
        self.commit(next).await
    }

    pub async fn toggle_value(&mut self, col_id: &str, value: &CellValue) -> ServiceResult<()> {
        let mut next = self.filters.clone();
        if !next.toggle_value(col_id, value) {
            tracing::debug!(column = %col_id, "toggle on a column without filter");
            return Ok(());
        }
        self.commit(next).await
    }

    pub async fn remove_filter(&mut self, col_id: &str) -> ServiceResult<()> {
        let mut next = self.filters.clone();
        next.remove_filter(col_id);
        self.commit(next).await
    }

    pub async fn add_filter(&mut self, raw: &RawTable, col_id: &str) -> ServiceResult<()> {
        let mut next = self.filters.clone();
        next.add_filter(raw, col_id);
        self.commit(next).await
    }

    /// Persist `next` and keep it once the host accepted it
    #[tracing::instrument(skip(self, next), fields(table = %self.target.table_id, row = self.target.row_id))]
    async fn commit(&mut self, next: FilterSet) -> ServiceResult<()> {
        let text = next.to_json()?;
        let update = RecordUpdate::new(
            self.target.row_id,
            [(self.target.col_id.clone(), CellValue::Text(text))]
                .into_iter()
                .collect(),
        );
        self.host
            .update_records(&self.target.table_id, vec![update])
            .await
            .map_err(|e| ServiceError::WriteRejected(e.to_string()))?;
        self.filters = next;
        Ok(())
    }
}
