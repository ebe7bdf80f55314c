//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use planche_core::{
    mapping::roles, CellValue, ColumnMapping, HostDocument, MemoryHost, NewRecord, PlancheError,
    RawTable, RawTableBuilder, RecordUpdate, Result, RowId, COLUMNS_META_TABLE, ID_COLUMN,
    MANUAL_SORT_COLUMN, TABLES_META_TABLE,
};
use planche_services::export_roles;

pub const T0: i64 = 1_700_000_000;

/// Host double backed by an in-memory document.
///
/// Every call is logged as `"<method> <table>"`; writes can be scripted to
/// fail per kind.
pub struct MockHost {
    pub inner: MemoryHost,
    pub fail_updates: bool,
    pub fail_creates: bool,
    pub fail_destroys: bool,
    /// Log of all host calls, for assertion in tests
    pub call_log: Arc<Mutex<Vec<String>>>,
}

impl MockHost {
    pub fn new(inner: MemoryHost) -> Self {
        Self {
            inner,
            fail_updates: false,
            fail_creates: false,
            fail_destroys: false,
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    pub fn with_failing_creates(mut self) -> Self {
        self.fail_creates = true;
        self
    }

    pub fn with_failing_destroys(mut self) -> Self {
        self.fail_destroys = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.call_log.lock().clone()
    }

    /// Number of logged calls of one method
    pub fn call_count(&self, method: &str) -> usize {
        self.call_log
            .lock()
            .iter()
            .filter(|call| call.split(' ').next() == Some(method))
            .count()
    }

    fn log(&self, method: &str, table_id: &str) {
        self.call_log.lock().push(format!("{} {}", method, table_id));
    }
}

#[async_trait]
impl HostDocument for MockHost {
    async fn fetch_table(&self, table_id: &str) -> Result<RawTable> {
        self.log("fetch_table", table_id);
        self.inner.fetch_table(table_id).await
    }

    async fn update_records(&self, table_id: &str, updates: Vec<RecordUpdate>) -> Result<()> {
        self.log("update_records", table_id);
        if self.fail_updates {
            return Err(PlancheError::Host("update refused".into()));
        }
        self.inner.update_records(table_id, updates).await
    }

    async fn create_records(&self, table_id: &str, records: Vec<NewRecord>) -> Result<Vec<RowId>> {
        self.log("create_records", table_id);
        if self.fail_creates {
            return Err(PlancheError::Host("create refused".into()));
        }
        self.inner.create_records(table_id, records).await
    }

    async fn destroy_records(&self, table_id: &str, ids: &[RowId]) -> Result<()> {
        self.log("destroy_records", table_id);
        if self.fail_destroys {
            return Err(PlancheError::Host("destroy refused".into()));
        }
        self.inner.destroy_records(table_id, ids).await
    }

    async fn set_options(&self, options: serde_json::Value) -> Result<()> {
        self.log("set_options", "");
        self.inner.set_options(options).await
    }

    async fn set_selected_rows(&self, ids: &[RowId]) -> Result<()> {
        self.log("set_selected_rows", "");
        self.inner.set_selected_rows(ids).await
    }
}

pub fn tasks_table() -> RawTable {
    RawTableBuilder::new()
        .column(ID_COLUMN, [1i64, 2, 3])
        .column(MANUAL_SORT_COLUMN, [3.0, 1.0, 2.0])
        .column("Start", [T0, T0 + 3600, T0 + 7200])
        .column("End", [T0 + 7200, T0 + 7200, T0 + 18000])
        .column("Hours", [2.0, 1.0, 3.0])
        .column("Team", [1i64, 1, 2])
        .column("Status", ["Done", "Todo", "Done"])
        .column("Title", ["Alpha", "Beta", "Gamma"])
        .column("Total", [0i64, 0, 0])
        .build()
        .unwrap()
}

fn teams_table() -> RawTable {
    RawTableBuilder::new()
        .column(ID_COLUMN, [1i64, 2])
        .column(MANUAL_SORT_COLUMN, [1.0, 2.0])
        .column("Name", ["Red", "Blue"])
        .build()
        .unwrap()
}

/// Export settings record reading `Tasks`
pub fn exports_table(filters: &str) -> RawTable {
    RawTableBuilder::new()
        .column(ID_COLUMN, [1i64])
        .column("Title", ["Week plan"])
        .column("Source", ["Tasks"])
        .column("Sort", ["<Start"])
        .column("StartCol", ["Start"])
        .column("EndCol", ["End"])
        .column("GroupCol", ["Team"])
        .column("ColorCol", ["Status"])
        .column("Content", ["Title"])
        .column("Filters", [filters])
        .build()
        .unwrap()
}

fn schema_tables() -> (RawTable, RawTable) {
    let tables = RawTableBuilder::new()
        .column(ID_COLUMN, [1i64, 2, 3])
        .column("tableId", ["Tasks", "Teams", "Exports"])
        .build()
        .unwrap();
    let columns = RawTableBuilder::new()
        .column(ID_COLUMN, [10i64, 11, 12, 13, 14, 15, 16, 17, 20])
        .column("parentId", [1i64, 1, 1, 1, 1, 1, 1, 1, 2])
        .column(
            "colId",
            ["Start", "End", "Hours", "Team", "Status", "Title", "Total", MANUAL_SORT_COLUMN, "Name"],
        )
        .column(
            "type",
            [
                "DateTime:UTC",
                "DateTime:UTC",
                "Numeric",
                "Ref:Teams",
                "Choice",
                "Text",
                "Numeric",
                "ManualSortPos",
                "Text",
            ],
        )
        .column("isFormula", [false, false, false, false, false, false, true, false, false])
        .column("formula", ["", "", "", "", "", "", "$Hours * 2", "", ""])
        .column(
            "widgetOptions",
            [
                "",
                "",
                "",
                "",
                r##"{"choiceOptions":{"Done":{"fillColor":"#0f0"}}}"##,
                "",
                "",
                "",
                "",
            ],
        )
        .column("visibleCol", [0i64, 0, 0, 20, 0, 0, 0, 0, 0])
        .column("label", ["Start", "End", "Hours", "Team", "Status", "Title", "Total", "", "Name"])
        .build()
        .unwrap();
    (tables, columns)
}

/// Document with `Tasks`, `Teams`, an `Exports` settings table and the
/// host schema tables
pub fn document() -> MemoryHost {
    let (tables, columns) = schema_tables();
    MemoryHost::new()
        .with_table("Tasks", tasks_table())
        .with_table("Teams", teams_table())
        .with_table("Exports", exports_table(""))
        .with_table(TABLES_META_TABLE, tables)
        .with_table(COLUMNS_META_TABLE, columns)
}

/// Same user tables without schema tables: metadata is unavailable
pub fn document_without_schema() -> MemoryHost {
    MemoryHost::new()
        .with_table("Tasks", tasks_table())
        .with_table("Teams", teams_table())
        .with_table("Exports", exports_table(""))
}

pub fn planning_mapping() -> ColumnMapping {
    ColumnMapping::new()
        .with_column(roles::DATE, "Start")
        .with_column(roles::DUREE, "Hours")
        .with_column(roles::GROUPE, "Team")
        .with_column(roles::COULEUR, "Status")
        .with_columns(roles::CONTENU, ["Title"])
        .with_columns(roles::FIELDS, ["Title", "Total"])
}

pub fn export_mapping() -> ColumnMapping {
    use export_roles::*;
    ColumnMapping::new()
        .with_column(TITLE, "Title")
        .with_column(TABLE, "Source")
        .with_column(SORT, "Sort")
        .with_column(FROM_FIELD, "StartCol")
        .with_column(TO_FIELD, "EndCol")
        .with_column(GROUPE, "GroupCol")
        .with_column(COLOR, "ColorCol")
        .with_column(CONTENT, "Content")
        .with_column(FILTERS, "Filters")
}

pub fn value(host: &MemoryHost, table_id: &str, col_id: &str, id: RowId) -> Option<CellValue> {
    let table = host.table(table_id)?;
    let row = table.position_of(id)?;
    table.value(col_id, row).cloned()
}
