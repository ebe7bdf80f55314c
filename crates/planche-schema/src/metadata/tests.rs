//! Tests for the column metadata cache

use super::*;
use async_trait::async_trait;
use planche_core::{
    MemoryHost, NewRecord, RawTableBuilder, RecordUpdate, ID_COLUMN, MANUAL_SORT_COLUMN,
};
use pretty_assertions::assert_eq;

/// Host that counts table fetches
struct CountingHost {
    inner: MemoryHost,
    fetches: Mutex<Vec<String>>,
}

impl CountingHost {
    fn new(inner: MemoryHost) -> Self {
        Self {
            inner,
            fetches: Mutex::new(Vec::new()),
        }
    }

    fn fetches(&self) -> Vec<String> {
        self.fetches.lock().clone()
    }
}

#[async_trait]
impl HostDocument for CountingHost {
    async fn fetch_table(&self, table_id: &str) -> Result<RawTable> {
        self.fetches.lock().push(table_id.to_string());
        self.inner.fetch_table(table_id).await
    }

    async fn update_records(&self, table_id: &str, updates: Vec<RecordUpdate>) -> Result<()> {
        self.inner.update_records(table_id, updates).await
    }

    async fn create_records(&self, table_id: &str, records: Vec<NewRecord>) -> Result<Vec<RowId>> {
        self.inner.create_records(table_id, records).await
    }

    async fn destroy_records(&self, table_id: &str, ids: &[RowId]) -> Result<()> {
        self.inner.destroy_records(table_id, ids).await
    }

    async fn set_options(&self, options: serde_json::Value) -> Result<()> {
        self.inner.set_options(options).await
    }
}

/// Schema tables for two user tables: `Tasks` (ref 1) and `Teams` (ref 2)
fn schema_host() -> MemoryHost {
    let tables = RawTableBuilder::new()
        .column(ID_COLUMN, [1i64, 2])
        .column("tableId", ["Tasks", "Teams"])
        .build()
        .unwrap();
    let columns = RawTableBuilder::new()
        .column(ID_COLUMN, [10i64, 11, 12, 13, 14, 20])
        .column("parentId", [1i64, 1, 1, 1, 1, 2])
        .column("colId", ["Start", "Team", "Total", "Color", MANUAL_SORT_COLUMN, "Name"])
        .column("type", ["DateTime:UTC", "Ref:Teams", "Numeric", "Choice", "ManualSortPos", "Text"])
        .column("isFormula", [false, false, true, false, false, true])
        .column("formula", ["", "", "$a + 1", "", "", ""])
        .column(
            "widgetOptions",
            [
                "",
                "",
                "{broken",
                r##"{"choiceOptions":{"Red":{"fillColor":"#f00"}}}"##,
                "",
                "",
            ],
        )
        .column("visibleCol", [0i64, 20, 0, 0, 0, 0])
        .column("label", ["Start", "Team", "Total", "Color", "", "Name"])
        .build()
        .unwrap();
    MemoryHost::new()
        .with_table(TABLES_META_TABLE, tables)
        .with_table(COLUMNS_META_TABLE, columns)
}

fn mapping(cols: &[&str]) -> ColumnMapping {
    cols.iter()
        .enumerate()
        .fold(ColumnMapping::new(), |m, (i, col)| m.with_column(format!("role{}", i), *col))
}

#[tokio::test]
async fn test_fetch_column_metadata_filters_by_parent() {
    let host = schema_host();
    let metas = fetch_column_metadata(&host, "Tasks").await.unwrap();
    assert_eq!(metas.len(), 5);
    assert_eq!(metas.col_type("Start"), ColumnType::DateTime);
    assert_eq!(metas.col_type("Team"), ColumnType::Reference("Teams".into()));
    assert_eq!(metas.get("Team").unwrap().visible_col, Some(20));
    assert!(metas.is_formula("Total"));
    assert_eq!(metas.widget_options("Total"), None);
    assert_eq!(
        metas.widget_options("Color").unwrap().fill_color(&CellValue::from("Red")),
        Some("#f00")
    );
    assert_eq!(metas.get(MANUAL_SORT_COLUMN).unwrap().label, MANUAL_SORT_COLUMN);
    assert!(metas.get("Name").is_none());
}

#[tokio::test]
async fn test_empty_formula_is_not_a_formula() {
    let host = schema_host();
    let metas = fetch_column_metadata(&host, "Teams").await.unwrap();
    assert!(!metas.is_formula("Name"));
}

#[tokio::test]
async fn test_unknown_table_is_unavailable() {
    let host = schema_host();
    let err = fetch_column_metadata(&host, "Nope").await.unwrap_err();
    assert!(matches!(err, PlancheError::MetadataUnavailable(_)));
}

#[tokio::test]
async fn test_no_fetch_until_table_and_mapping_known() {
    let host = Arc::new(CountingHost::new(schema_host()));
    let cache = ColumnMetadataCache::new(host.clone());

    assert_eq!(cache.notify_mapping(&mapping(&["Start"])), Generation(0));
    assert!(cache.metadata().await.is_empty());
    assert!(host.fetches().is_empty());

    let generation = cache.notify_table("Tasks");
    assert_eq!(generation, Generation(1));
    assert_eq!(cache.metadata().await.len(), 5);
}

#[tokio::test]
async fn test_table_first_then_mapping() {
    let host = Arc::new(CountingHost::new(schema_host()));
    let cache = ColumnMetadataCache::new(host.clone());

    assert_eq!(cache.notify_table("Tasks"), Generation(0));
    assert_eq!(cache.notify_mapping(&mapping(&["Start"])), Generation(1));
    assert_eq!(cache.types().await["Team"], ColumnType::Reference("Teams".into()));
}

#[tokio::test]
async fn test_same_mapping_does_not_refetch() {
    let host = Arc::new(CountingHost::new(schema_host()));
    let cache = ColumnMetadataCache::new(host.clone());
    cache.notify_table("Tasks");
    let first = cache.notify_mapping(&mapping(&["Start", "Team"]));
    cache.metadata().await;
    let again = cache.notify_mapping(&mapping(&["Start", "Team"]));
    assert_eq!(first, again);
    cache.metadata().await;
    assert_eq!(host.fetches().len(), 2);

    let changed = cache.notify_mapping(&mapping(&["Start"]));
    assert!(changed > again);
}

#[tokio::test]
async fn test_concurrent_readers_share_one_fetch() {
    let host = Arc::new(CountingHost::new(schema_host()));
    let cache = ColumnMetadataCache::new(host.clone());
    cache.notify_table("Tasks");
    cache.notify_mapping(&mapping(&["Start"]));

    let (types, options, formulas) =
        tokio::join!(cache.types(), cache.options(), cache.formula_flags());
    assert_eq!(types.len(), 5);
    assert_eq!(options.len(), 5);
    assert!(formulas["Total"]);
    assert_eq!(
        host.fetches(),
        vec![TABLES_META_TABLE.to_string(), COLUMNS_META_TABLE.to_string()]
    );
}

#[tokio::test]
async fn test_last_notification_wins() {
    let host = Arc::new(CountingHost::new(schema_host()));
    let cache = ColumnMetadataCache::new(host.clone());
    cache.notify_mapping(&mapping(&["Start"]));
    let stale = cache.notify_table("Tasks");
    let latest = cache.notify_table("Teams");

    assert!(!cache.is_current(stale));
    assert!(cache.is_current(latest));
    let metas = cache.metadata().await;
    assert_eq!(metas.len(), 1);
    assert!(metas.get("Name").is_some());
    assert_eq!(cache.table_id().as_deref(), Some("Teams"));
}

#[tokio::test]
async fn test_unknown_table_degrades_to_empty() {
    let host = Arc::new(CountingHost::new(schema_host()));
    let cache = ColumnMetadataCache::new(host);
    cache.notify_mapping(&mapping(&["Start"]));
    cache.notify_table("Missing");
    assert!(cache.metadata().await.is_empty());
    assert!(cache.types().await.is_empty());
}

#[tokio::test]
async fn test_without_full_access_notifications_are_ignored() {
    let host = Arc::new(CountingHost::new(schema_host()));
    let cache = ColumnMetadataCache::new(host.clone());
    cache.set_access_level(AccessLevel::ReadTable);
    cache.notify_mapping(&mapping(&["Start"]));
    cache.notify_table("Tasks");
    assert_eq!(cache.generation(), Generation(0));
    assert!(cache.metadata().await.is_empty());
    assert!(host.fetches().is_empty());
}
