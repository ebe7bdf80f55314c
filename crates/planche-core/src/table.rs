//! Columnar table snapshots
//!
//! The host returns tables as one array per column, aligned by row position.
//! `RawTable` checks that alignment once at construction so readers can index
//! any column by row position.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

use crate::{CellValue, PlancheError, Result, RowId};

/// Reserved column holding unique row ids
pub const ID_COLUMN: &str = "id";
/// Reserved column holding the host's default row order
pub const MANUAL_SORT_COLUMN: &str = "manualSort";

/// One snapshot of a host table.
///
/// Immutable once built; a new host push replaces the whole value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "IndexMap<String, Vec<CellValue>>",
    into = "IndexMap<String, Vec<CellValue>>"
)]
pub struct RawTable {
    columns: IndexMap<String, Vec<CellValue>>,
    row_count: usize,
    positions: HashMap<RowId, usize>,
}

impl RawTable {
    /// Build a snapshot, checking that every column has the same length and
    /// that the `id` column holds unique integer ids.
    pub fn new(columns: IndexMap<String, Vec<CellValue>>) -> Result<Self> {
        let ids = columns
            .get(ID_COLUMN)
            .ok_or_else(|| PlancheError::InvalidTable("missing id column".to_string()))?;
        let row_count = ids.len();

        if let Some((col, values)) = columns.iter().find(|(_, v)| v.len() != row_count) {
            return Err(PlancheError::InvalidTable(format!(
                "column {} has {} values, expected {}",
                col,
                values.len(),
                row_count
            )));
        }

        let mut positions = HashMap::with_capacity(row_count);
        for (index, value) in ids.iter().enumerate() {
            let id = value.as_i64().ok_or_else(|| {
                PlancheError::InvalidTable(format!("row {} has a non-integer id: {:?}", index, value))
            })?;
            if positions.insert(id, index).is_some() {
                return Err(PlancheError::InvalidTable(format!("duplicate row id {}", id)));
            }
        }

        Ok(Self {
            columns,
            row_count,
            positions,
        })
    }

    /// A table with no rows and only the `id` column
    pub fn empty() -> Self {
        let mut columns = IndexMap::new();
        columns.insert(ID_COLUMN.to_string(), Vec::new());
        Self {
            columns,
            row_count: 0,
            positions: HashMap::new(),
        }
    }

    /// Parse the host's JSON representation
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let columns: IndexMap<String, Vec<CellValue>> = serde_json::from_value(value)?;
        Self::new(columns)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Every row position, in storage order
    pub fn all_indices(&self) -> Range<usize> {
        0..self.row_count
    }

    pub fn column_ids(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    pub fn has_column(&self, col_id: &str) -> bool {
        self.columns.contains_key(col_id)
    }

    pub fn column(&self, col_id: &str) -> Option<&[CellValue]> {
        self.columns.get(col_id).map(|v| v.as_slice())
    }

    /// Value at a row position; `None` for unknown columns or positions
    pub fn value(&self, col_id: &str, row: usize) -> Option<&CellValue> {
        self.columns.get(col_id).and_then(|values| values.get(row))
    }

    pub fn row_id(&self, row: usize) -> Option<RowId> {
        self.value(ID_COLUMN, row).and_then(|v| v.as_i64())
    }

    /// Row position of a row id
    pub fn position_of(&self, id: RowId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn manual_sort(&self, row: usize) -> Option<f64> {
        self.value(MANUAL_SORT_COLUMN, row).and_then(|v| v.as_f64())
    }

    /// Distinct values of a column in first-seen order
    pub fn distinct_values(&self, col_id: &str) -> IndexSet<CellValue> {
        self.column(col_id)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy the given columns of one row; unknown columns are skipped
    pub fn row_snapshot<'a>(
        &self,
        row: usize,
        col_ids: impl IntoIterator<Item = &'a str>,
    ) -> IndexMap<String, CellValue> {
        col_ids
            .into_iter()
            .filter_map(|col| self.value(col, row).map(|v| (col.to_string(), v.clone())))
            .collect()
    }
}

impl Default for RawTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl TryFrom<IndexMap<String, Vec<CellValue>>> for RawTable {
    type Error = PlancheError;

    fn try_from(columns: IndexMap<String, Vec<CellValue>>) -> Result<Self> {
        Self::new(columns)
    }
}

impl From<RawTable> for IndexMap<String, Vec<CellValue>> {
    fn from(table: RawTable) -> Self {
        table.columns
    }
}

/// Builder used by tests and the JSON document host
#[derive(Debug, Default)]
pub struct RawTableBuilder {
    columns: IndexMap<String, Vec<CellValue>>,
}

impl RawTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column<V: Into<CellValue>>(
        mut self,
        col_id: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.columns
            .insert(col_id.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<RawTable> {
        RawTable::new(self.columns)
    }
}
