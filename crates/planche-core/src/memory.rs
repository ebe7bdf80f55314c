//! In-memory host document
//!
//! Holds whole tables in columnar form and applies writes the way the host
//! does: unknown tables and columns are rejected, new rows get the next free
//! id and are appended to the manual order.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{
    CellValue, HostDocument, NewRecord, PlancheError, RawTable, RecordUpdate, Result, RowId,
    ID_COLUMN, MANUAL_SORT_COLUMN,
};

#[derive(Default)]
pub struct MemoryHost {
    tables: RwLock<IndexMap<String, RawTable>>,
    options: RwLock<Option<serde_json::Value>>,
    selection: RwLock<Vec<RowId>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table_id: impl Into<String>, table: RawTable) -> Self {
        self.tables.write().insert(table_id.into(), table);
        self
    }

    /// Load a document from JSON: an object of table id to columnar table
    pub fn from_document_json(document: serde_json::Value) -> Result<Self> {
        let tables: IndexMap<String, RawTable> = serde_json::from_value(document)?;
        Ok(Self {
            tables: RwLock::new(tables),
            ..Default::default()
        })
    }

    pub fn to_document_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&*self.tables.read())?)
    }

    pub fn table(&self, table_id: &str) -> Option<RawTable> {
        self.tables.read().get(table_id).cloned()
    }

    pub fn table_ids(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn options(&self) -> Option<serde_json::Value> {
        self.options.read().clone()
    }

    pub fn selection(&self) -> Vec<RowId> {
        self.selection.read().clone()
    }

    fn columns_of(&self, table_id: &str) -> Result<IndexMap<String, Vec<CellValue>>> {
        self.tables
            .read()
            .get(table_id)
            .cloned()
            .map(Into::into)
            .ok_or_else(|| PlancheError::NotFound(format!("table {}", table_id)))
    }

    fn store(&self, table_id: &str, columns: IndexMap<String, Vec<CellValue>>) -> Result<()> {
        let table = RawTable::new(columns)?;
        self.tables.write().insert(table_id.to_string(), table);
        Ok(())
    }
}

fn check_columns<'a>(
    columns: &IndexMap<String, Vec<CellValue>>,
    fields: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    for col in fields {
        if col == ID_COLUMN || !columns.contains_key(col) {
            return Err(PlancheError::WriteRejected(format!("invalid column {}", col)));
        }
    }
    Ok(())
}

#[async_trait]
impl HostDocument for MemoryHost {
    async fn fetch_table(&self, table_id: &str) -> Result<RawTable> {
        self.table(table_id)
            .ok_or_else(|| PlancheError::NotFound(format!("table {}", table_id)))
    }

    async fn update_records(&self, table_id: &str, updates: Vec<RecordUpdate>) -> Result<()> {
        let table = self.fetch_table(table_id).await?;
        let mut columns = self.columns_of(table_id)?;
        for update in &updates {
            check_columns(&columns, update.fields.keys())?;
            let row = table
                .position_of(update.id)
                .ok_or_else(|| PlancheError::WriteRejected(format!("unknown row {}", update.id)))?;
            for (col, value) in &update.fields {
                if let Some(values) = columns.get_mut(col) {
                    values[row] = value.clone();
                }
            }
        }
        self.store(table_id, columns)?;
        tracing::debug!(table = %table_id, count = updates.len(), "updated rows");
        Ok(())
    }

    async fn create_records(&self, table_id: &str, records: Vec<NewRecord>) -> Result<Vec<RowId>> {
        let table = self.fetch_table(table_id).await?;
        let mut columns = self.columns_of(table_id)?;
        let mut next_id = table
            .all_indices()
            .filter_map(|row| table.row_id(row))
            .max()
            .unwrap_or(0);
        let mut next_sort = table
            .all_indices()
            .filter_map(|row| table.manual_sort(row))
            .fold(0.0_f64, f64::max);

        let mut created = Vec::with_capacity(records.len());
        for record in &records {
            check_columns(&columns, record.fields.keys())?;
            next_id += 1;
            next_sort += 1.0;
            for (col, values) in columns.iter_mut() {
                let value = match col.as_str() {
                    ID_COLUMN => CellValue::Int(next_id),
                    MANUAL_SORT_COLUMN => CellValue::from(next_sort),
                    _ => record.fields.get(col).cloned().unwrap_or_default(),
                };
                values.push(value);
            }
            created.push(next_id);
        }
        self.store(table_id, columns)?;
        tracing::debug!(table = %table_id, ids = ?created, "created rows");
        Ok(created)
    }

    async fn destroy_records(&self, table_id: &str, ids: &[RowId]) -> Result<()> {
        let table = self.fetch_table(table_id).await?;
        let mut columns = self.columns_of(table_id)?;
        let keep: Vec<bool> = table
            .all_indices()
            .map(|row| table.row_id(row).is_some_and(|id| !ids.contains(&id)))
            .collect();
        for values in columns.values_mut() {
            let mut flags = keep.iter();
            values.retain(|_| flags.next().copied().unwrap_or(false));
        }
        self.store(table_id, columns)?;
        tracing::debug!(table = %table_id, count = ids.len(), "destroyed rows");
        Ok(())
    }

    async fn set_options(&self, options: serde_json::Value) -> Result<()> {
        *self.options.write() = Some(options);
        Ok(())
    }

    async fn set_selected_rows(&self, ids: &[RowId]) -> Result<()> {
        *self.selection.write() = ids.to_vec();
        Ok(())
    }
}
