//! Column metadata cache
//!
//! Metadata is fetched from the host's schema tables and shared by every
//! reader of the same mapping generation. Each `notify_*` call that changes
//! the mapping identity or bound table replaces the stored fetch before it
//! returns, so readers only ever await the newest one and the results of a
//! superseded fetch are never observed.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use planche_core::{
    AccessLevel, CellValue, ColumnMapping, ColumnMeta, ColumnMetaSet, ColumnType, HostDocument,
    PlancheError, RawTable, Result, RowId, WidgetOptions, COLUMNS_META_TABLE, TABLES_META_TABLE,
};

type MetadataFuture = Shared<BoxFuture<'static, Arc<ColumnMetaSet>>>;

/// Token identifying one metadata fetch. Increases with every refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

struct CacheState {
    access_level: AccessLevel,
    table_id: Option<String>,
    col_ids: Option<Vec<String>>,
    generation: Generation,
    current: MetadataFuture,
}

/// Metadata cache for the table bound to a widget
pub struct ColumnMetadataCache {
    host: Arc<dyn HostDocument>,
    state: Mutex<CacheState>,
}

impl ColumnMetadataCache {
    pub fn new(host: Arc<dyn HostDocument>) -> Self {
        Self {
            host,
            state: Mutex::new(CacheState {
                access_level: AccessLevel::Full,
                table_id: None,
                col_ids: None,
                generation: Generation::default(),
                current: ready(ColumnMetaSet::empty()),
            }),
        }
    }

    /// Schema tables are only readable with full access; other levels make
    /// notifications no-ops.
    pub fn set_access_level(&self, level: AccessLevel) {
        self.state.lock().access_level = level;
    }

    /// Record the mapped column set. Refetches when the set changed and a
    /// table is already known.
    pub fn notify_mapping(&self, mapping: &ColumnMapping) -> Generation {
        let mut state = self.state.lock();
        if state.access_level != AccessLevel::Full {
            return state.generation;
        }
        let flat = mapping.flattened_ids();
        if state.col_ids.as_ref() != Some(&flat) {
            tracing::debug!(columns = ?flat, "mapped columns changed");
            state.col_ids = Some(flat);
            if let Some(table_id) = state.table_id.clone() {
                self.start_fetch(&mut state, table_id);
            }
        }
        state.generation
    }

    /// Record the bound table. Always refetches once a column set is known.
    pub fn notify_table(&self, table_id: &str) -> Generation {
        let mut state = self.state.lock();
        if state.access_level != AccessLevel::Full {
            return state.generation;
        }
        state.table_id = Some(table_id.to_string());
        if state.col_ids.is_some() {
            self.start_fetch(&mut state, table_id.to_string());
        }
        state.generation
    }

    fn start_fetch(&self, state: &mut CacheState, table_id: String) {
        state.generation = Generation(state.generation.0 + 1);
        let host = self.host.clone();
        let generation = state.generation;
        tracing::debug!(table = %table_id, generation = generation.0, "scheduling metadata fetch");
        state.current = async move {
            match fetch_column_metadata(host.as_ref(), &table_id).await {
                Ok(columns) => {
                    tracing::debug!(
                        table = %table_id,
                        generation = generation.0,
                        columns = columns.len(),
                        "column metadata loaded"
                    );
                    Arc::new(columns)
                }
                Err(e) => {
                    tracing::warn!(table = %table_id, error = %e, "column metadata unavailable");
                    Arc::new(ColumnMetaSet::empty())
                }
            }
        }
        .boxed()
        .shared();
    }

    pub fn generation(&self) -> Generation {
        self.state.lock().generation
    }

    /// Whether no notification superseded `generation`
    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation() == generation
    }

    pub fn table_id(&self) -> Option<String> {
        self.state.lock().table_id.clone()
    }

    /// Metadata of the latest generation. Never fails: unavailable metadata
    /// is an empty set.
    pub async fn metadata(&self) -> Arc<ColumnMetaSet> {
        let current = self.state.lock().current.clone();
        current.await
    }

    pub async fn types(&self) -> HashMap<String, ColumnType> {
        self.metadata().await.types()
    }

    pub async fn options(&self) -> HashMap<String, Option<WidgetOptions>> {
        self.metadata().await.options()
    }

    pub async fn formula_flags(&self) -> HashMap<String, bool> {
        self.metadata().await.formula_flags()
    }
}

fn ready(columns: ColumnMetaSet) -> MetadataFuture {
    futures::future::ready(Arc::new(columns)).boxed().shared()
}

/// Read the metadata of every column of `table_id` from the host schema
/// tables.
#[tracing::instrument(skip(host))]
pub async fn fetch_column_metadata(
    host: &dyn HostDocument,
    table_id: &str,
) -> Result<ColumnMetaSet> {
    let tables = host.fetch_table(TABLES_META_TABLE).await?;
    let columns = host.fetch_table(COLUMNS_META_TABLE).await?;

    let table_ref = tables
        .all_indices()
        .find(|&row| tables.value("tableId", row).and_then(|v| v.as_str()) == Some(table_id))
        .and_then(|row| tables.row_id(row))
        .ok_or_else(|| PlancheError::MetadataUnavailable(format!("unknown table {}", table_id)))?;

    let metas = columns
        .all_indices()
        .filter(|&row| columns.value("parentId", row).and_then(|v| v.as_i64()) == Some(table_ref))
        .filter_map(|row| column_meta_from_row(&columns, row))
        .collect();
    Ok(metas)
}

fn text(table: &RawTable, col: &str, row: usize) -> String {
    table
        .value(col, row)
        .and_then(CellValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn column_meta_from_row(columns: &RawTable, row: usize) -> Option<ColumnMeta> {
    let row_ref: RowId = columns.row_id(row)?;
    let col_id = text(columns, "colId", row);
    if col_id.is_empty() {
        return None;
    }
    let flagged_formula = columns
        .value("isFormula", row)
        .and_then(CellValue::as_bool)
        .unwrap_or(false);
    let formula = text(columns, "formula", row);
    let label = text(columns, "label", row);

    Some(ColumnMeta {
        label: if label.is_empty() { col_id.clone() } else { label },
        col_id,
        row_ref,
        parent_id: columns
            .value("parentId", row)
            .and_then(CellValue::as_i64)
            .unwrap_or_default(),
        col_type: ColumnType::parse(&text(columns, "type", row)),
        is_formula: flagged_formula && !formula.trim().is_empty(),
        widget_options: WidgetOptions::parse(&text(columns, "widgetOptions", row)),
        visible_col: columns
            .value("visibleCol", row)
            .and_then(CellValue::as_i64)
            .filter(|&id| id > 0),
    })
}

#[cfg(test)]
mod tests;
