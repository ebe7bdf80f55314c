//! Host document trait and write payloads

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{CellValue, RawTable, Result, RowId};

/// Host schema table listing tables
pub const TABLES_META_TABLE: &str = "_grist_Tables";
/// Host schema table listing columns
pub const COLUMNS_META_TABLE: &str = "_grist_Tables_column";

/// Field values keyed by host column id
pub type Fields = IndexMap<String, CellValue>;

/// Update of an existing row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub id: RowId,
    pub fields: Fields,
}

impl RecordUpdate {
    pub fn new(id: RowId, fields: Fields) -> Self {
        Self { id, fields }
    }
}

/// Row to create. Never carries an id; the host assigns one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub fields: Fields,
}

impl NewRecord {
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }
}

/// The host document: a key-columnar store with a row mutation API.
///
/// Every call is an independent asynchronous request; implementations decide
/// how writes are serialized.
#[async_trait]
pub trait HostDocument: Send + Sync {
    /// Fetch a full columnar snapshot of a table, including `id` and
    /// `manualSort`
    async fn fetch_table(&self, table_id: &str) -> Result<RawTable>;

    /// Apply field updates to existing rows
    async fn update_records(&self, table_id: &str, updates: Vec<RecordUpdate>) -> Result<()>;

    /// Create rows and return their ids in order
    async fn create_records(&self, table_id: &str, records: Vec<NewRecord>) -> Result<Vec<RowId>>;

    /// Delete rows
    async fn destroy_records(&self, table_id: &str, ids: &[RowId]) -> Result<()>;

    /// Persist the widget's option blob
    async fn set_options(&self, options: serde_json::Value) -> Result<()>;

    /// Move the host's row selection
    async fn set_selected_rows(&self, ids: &[RowId]) -> Result<()> {
        tracing::trace!(count = ids.len(), "host does not track selection");
        Ok(())
    }
}
