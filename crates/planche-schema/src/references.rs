//! Reference column resolution
//!
//! A reference column stores row ids of another table. Its metadata names the
//! target table (`Ref:<tableId>`) and the row ref of the column to display
//! (`visibleCol`). Resolution never fails: when the display column cannot be
//! found the raw id is shown instead.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use planche_core::{CellValue, ColumnMeta, ColumnType, HostDocument, PlancheError, Result, RowId};

use crate::fetch_column_metadata;

/// One selectable row of a reference target table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceChoice {
    pub id: RowId,
    pub label: String,
}

/// Id to label lookup for one reference column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceLabels {
    labels: IndexMap<RowId, String>,
    resolved: bool,
}

impl ReferenceLabels {
    /// Lookup that shows every id as-is
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (RowId, String)>) -> Self {
        Self {
            labels: pairs.into_iter().collect(),
            resolved: true,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Display label of a raw cell value. Empty labels and unknown ids fall
    /// back to the raw value.
    pub fn label(&self, raw: &CellValue) -> String {
        raw.as_i64()
            .and_then(|id| self.labels.get(&id))
            .filter(|label| !label.is_empty())
            .cloned()
            .unwrap_or_else(|| raw.to_string())
    }

    /// Rows of the target table in table order
    pub fn choices(&self) -> Vec<ReferenceChoice> {
        self.labels
            .iter()
            .map(|(&id, label)| ReferenceChoice {
                id,
                label: if label.is_empty() { id.to_string() } else { label.clone() },
            })
            .collect()
    }
}

/// Resolves reference columns against their target tables
#[derive(Clone)]
pub struct ReferenceResolver {
    host: Arc<dyn HostDocument>,
}

impl ReferenceResolver {
    pub fn new(host: Arc<dyn HostDocument>) -> Self {
        Self { host }
    }

    /// Labels for a column. Non-reference columns and failed lookups give an
    /// unresolved lookup.
    pub async fn labels_for(&self, column: &ColumnMeta) -> ReferenceLabels {
        if !column.col_type.is_reference() {
            return ReferenceLabels::unresolved();
        }
        match self.resolve(column).await {
            Ok(labels) => labels,
            Err(e) => {
                tracing::warn!(column = %column.col_id, error = %e, "showing raw reference ids");
                ReferenceLabels::unresolved()
            }
        }
    }

    /// Selectable `(id, label)` rows for a reference column
    pub async fn choices(&self, column: &ColumnMeta) -> Vec<ReferenceChoice> {
        self.labels_for(column).await.choices()
    }

    #[tracing::instrument(skip(self, column), fields(column = %column.col_id))]
    async fn resolve(&self, column: &ColumnMeta) -> Result<ReferenceLabels> {
        let target = column.col_type.reference_target().ok_or_else(|| {
            PlancheError::ReferenceUnresolvable(format!("{} is not a reference", column.col_id))
        })?;
        let visible_col = column.visible_col.ok_or_else(|| {
            PlancheError::ReferenceUnresolvable(format!("{} has no display column", column.col_id))
        })?;

        let table = self.host.fetch_table(target).await?;
        let target_columns = fetch_column_metadata(self.host.as_ref(), target).await?;
        let display = target_columns.by_row_ref(visible_col).ok_or_else(|| {
            PlancheError::ReferenceUnresolvable(format!(
                "display column {} not found in {}",
                visible_col, target
            ))
        })?;
        let values = table.column(&display.col_id).ok_or_else(|| {
            PlancheError::ReferenceUnresolvable(format!("{} has no column {}", target, display.col_id))
        })?;

        let labels = table
            .all_indices()
            .filter_map(|row| {
                let id = table.row_id(row)?;
                Some((id, values[row].to_string()))
            })
            .collect::<Vec<_>>();
        tracing::debug!(target_table = %target, rows = labels.len(), "resolved reference labels");
        Ok(ReferenceLabels::from_pairs(labels))
    }

    /// Convert an id typed by the user into the value stored by the column.
    ///
    /// Reference columns store numeric row ids: the leading integer of the
    /// text is used, `Null` when there is none. Other columns keep the text.
    pub fn coerce_id(col_type: &ColumnType, raw: &str) -> CellValue {
        if !col_type.is_reference() {
            return CellValue::from(raw);
        }
        let trimmed = raw.trim_start();
        let sign_len = usize::from(trimmed.starts_with(['-', '+']));
        let digits = trimmed[sign_len..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(trimmed.len(), |end| end + sign_len);
        trimmed[..digits]
            .parse::<i64>()
            .map(CellValue::Int)
            .unwrap_or(CellValue::Null)
    }
}
