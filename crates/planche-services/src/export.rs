//! Timeline export
//!
//! The export widget is bound to one settings record. Each settings column
//! holds the name of a column in the source table (start, end, group...) or
//! a layout value. The pipeline reads the source table, filters and sorts
//! it, and groups it into a timeline document for the PDF layout engine.

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use planche_core::{CellValue, ColumnMapping, HostDocument, RawTable, RowId, WidgetConfig};
use planche_schema::{ColumnMetadataCache, ReferenceResolver};

use crate::error::{ServiceError, ServiceResult};
use crate::filter::{FilterEngine, FilterSet, FilterTarget};
use crate::projector::{project_timeline, resolve_labels, TimelineColumns, TimelineGroup};
use crate::sort::{SortEngine, SortSpec};

/// Roles of the export widget's settings record
pub mod export_roles {
    pub const TITLE: &str = "title";
    pub const FROM_DATE: &str = "fromDate";
    pub const TO_DATE: &str = "toDate";
    pub const TABLE: &str = "table";
    pub const SORT: &str = "sort";
    pub const FROM_FIELD: &str = "fromField";
    pub const TO_FIELD: &str = "toField";
    pub const GROUPE: &str = "groupe";
    pub const SOUS_GROUPE: &str = "sousGroupe";
    pub const COLOR: &str = "color";
    pub const CONTENT: &str = "content";
    pub const ORIENTATION: &str = "orientation";
    pub const PAPER_SIZE: &str = "papersize";
    pub const VPAGES: &str = "vpages";
    pub const HPAGES: &str = "hpages";
    pub const GROUPS_FONT_SIZE: &str = "groupsFontSize";
    pub const TASKS_FONT_SIZE: &str = "tasksFontSize";
    pub const HOURS_FONT_SIZE: &str = "hoursFontSize";
    pub const MODE: &str = "mode";
    pub const ALIGN: &str = "align";
    pub const MULTILINE: &str = "multiline";
    pub const FILTERS: &str = "filters";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    #[default]
    Vertical,
}

impl Orientation {
    fn parse(text: &str) -> Self {
        if text == "Horizontal" {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        }
    }
}

/// Alignment of section labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    #[default]
    Right,
}

impl Alignment {
    /// Settings use the French choice labels
    fn parse(text: &str) -> Self {
        match text {
            "Gauche" => Alignment::Left,
            "Centre" => Alignment::Center,
            _ => Alignment::Right,
        }
    }
}

/// Page layout passed through to the PDF layout engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSettings {
    /// Paper orientation
    pub orientation: Orientation,
    pub paper_size: String,
    pub vpages: u32,
    pub hpages: u32,
    /// Font sizes in points
    pub groups_font_size: f64,
    pub tasks_font_size: f64,
    pub hours_font_size: f64,
    /// Direction of the time axis
    pub mode: Orientation,
    pub align: Alignment,
    pub multiline: bool,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            orientation: Orientation::Vertical,
            paper_size: "A4".to_string(),
            vpages: 1,
            hpages: 1,
            groups_font_size: 10.0,
            tasks_font_size: 8.0,
            hours_font_size: 6.0,
            mode: Orientation::Horizontal,
            align: Alignment::Left,
            multiline: false,
        }
    }
}

/// Settings read from the export widget's record
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub title: String,
    /// Range start in epoch milliseconds, the earliest section when unset
    pub from_ms: Option<f64>,
    pub to_ms: Option<f64>,
    /// Source table
    pub table_id: String,
    pub sort: SortSpec,
    pub columns: TimelineColumns,
    pub filters: FilterSet,
    /// Settings column holding the persisted filters
    pub filters_column: Option<String>,
    pub layout: LayoutSettings,
}

struct SettingsRow<'a> {
    raw: &'a RawTable,
    row: usize,
    mapping: &'a ColumnMapping,
}

impl<'a> SettingsRow<'a> {
    fn value(&self, role: &str) -> Option<&'a CellValue> {
        self.mapping
            .column(role)
            .and_then(|col| self.raw.value(col, self.row))
            .filter(|v| !v.is_null())
    }

    fn text(&self, role: &str) -> Option<String> {
        self.value(role)
            .map(|v| v.to_string().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn required(&self, role: &str) -> ServiceResult<String> {
        self.text(role)
            .ok_or_else(|| ServiceError::InvalidSettings(format!("{} is not set", role)))
    }

    fn number(&self, role: &str) -> Option<f64> {
        self.value(role).and_then(CellValue::as_f64)
    }

    fn count(&self, role: &str, default: u32) -> u32 {
        self.value(role)
            .and_then(CellValue::as_i64)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(default)
    }
}

impl ExportSettings {
    /// Read the settings record `row_id` of `raw` through the widget mapping
    pub fn from_record(raw: &RawTable, row_id: RowId, mapping: &ColumnMapping) -> ServiceResult<Self> {
        use export_roles::*;

        let row = raw
            .position_of(row_id)
            .ok_or_else(|| ServiceError::InvalidSettings(format!("no settings row {}", row_id)))?;
        let settings = SettingsRow { raw, row, mapping };
        let defaults = LayoutSettings::default();

        let content = settings
            .text(CONTENT)
            .map(|text| {
                text.split(',')
                    .map(str::trim)
                    .filter(|col| !col.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let bound = |role: &str| {
            settings
                .value(role)
                .filter(|v| v.is_truthy())
                .and_then(CellValue::as_epoch_millis)
        };

        Ok(Self {
            title: settings.text(TITLE).unwrap_or_default(),
            from_ms: bound(FROM_DATE),
            to_ms: bound(TO_DATE),
            table_id: settings.required(TABLE)?,
            sort: settings
                .text(SORT)
                .and_then(|text| text.parse().ok())
                .unwrap_or_default(),
            columns: TimelineColumns {
                groupe: settings.required(GROUPE)?,
                sous_groupe: settings.text(SOUS_GROUPE),
                start: settings.required(FROM_FIELD)?,
                end: settings.required(TO_FIELD)?,
                color: settings.text(COLOR),
                content,
            },
            filters: settings
                .text(FILTERS)
                .map(|text| FilterSet::parse(&text))
                .unwrap_or_default(),
            filters_column: mapping.column(FILTERS).map(String::from),
            layout: LayoutSettings {
                orientation: settings
                    .text(ORIENTATION)
                    .map_or(defaults.orientation, |t| Orientation::parse(&t)),
                paper_size: settings.text(PAPER_SIZE).unwrap_or(defaults.paper_size),
                vpages: settings.count(VPAGES, defaults.vpages),
                hpages: settings.count(HPAGES, defaults.hpages),
                groups_font_size: settings
                    .number(GROUPS_FONT_SIZE)
                    .unwrap_or(defaults.groups_font_size),
                tasks_font_size: settings
                    .number(TASKS_FONT_SIZE)
                    .unwrap_or(defaults.tasks_font_size),
                hours_font_size: settings
                    .number(HOURS_FONT_SIZE)
                    .unwrap_or(defaults.hours_font_size),
                mode: settings
                    .text(MODE)
                    .map_or(defaults.mode, |t| Orientation::parse(&t)),
                align: settings
                    .text(ALIGN)
                    .map_or(defaults.align, |t| Alignment::parse(&t)),
                multiline: settings
                    .value(MULTILINE)
                    .is_some_and(CellValue::is_truthy),
            },
        })
    }
}

/// Grouped timeline handed to the layout engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDocument {
    pub title: String,
    /// Epoch milliseconds, `None` when no row has times
    pub from_ms: Option<f64>,
    pub to_ms: Option<f64>,
    pub groups: Vec<TimelineGroup>,
    pub layout: LayoutSettings,
}

/// Builds timeline documents from export settings
pub struct ExportPipeline {
    host: Arc<dyn HostDocument>,
    cache: ColumnMetadataCache,
    resolver: ReferenceResolver,
    config: WidgetConfig,
}

impl ExportPipeline {
    pub fn new(host: Arc<dyn HostDocument>, config: WidgetConfig) -> Self {
        let cache = ColumnMetadataCache::new(host.clone());
        cache.set_access_level(config.access_level);
        Self {
            resolver: ReferenceResolver::new(host.clone()),
            host,
            cache,
            config,
        }
    }

    /// Fetch, filter, sort and group the source table
    #[tracing::instrument(skip(self, settings, mapping), fields(table = %settings.table_id))]
    pub async fn build(
        &self,
        settings: &ExportSettings,
        mapping: &ColumnMapping,
    ) -> ServiceResult<TimelineDocument> {
        let raw = self
            .host
            .fetch_table(&settings.table_id)
            .await
            .map_err(|e| ServiceError::TableLoadFailed(e.to_string()))?;

        self.cache.notify_mapping(mapping);
        self.cache.notify_table(&settings.table_id);
        let metas = self.cache.metadata().await;

        let visible = FilterEngine::apply(&raw, &settings.filters);
        let order = SortEngine::order(&raw, &settings.sort, visible);

        let columns = &settings.columns;
        let label_columns: Vec<&str> = std::iter::once(columns.groupe.as_str())
            .chain(columns.sous_groupe.as_deref())
            .collect();
        let labels = resolve_labels(&self.resolver, &metas, &label_columns).await;
        let timeline = project_timeline(
            &raw,
            order,
            columns,
            &metas,
            &labels,
            &self.config.fallback_color,
        );
        tracing::debug!(groups = timeline.groups.len(), "timeline built");

        Ok(TimelineDocument {
            title: settings.title.clone(),
            from_ms: settings.from_ms.or(timeline.min_start),
            to_ms: settings.to_ms.or(timeline.max_end),
            groups: timeline.groups,
            layout: settings.layout.clone(),
        })
    }
}

type Sink<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Delays values until no new one arrived for a quiet period.
///
/// Every push cancels the pending one; only the last value of a burst
/// reaches the sink. Once the sink started it runs to completion.
pub struct Debouncer<T> {
    delay: Duration,
    sink: Sink<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F, Fut>(delay: Duration, sink: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            delay,
            sink: Arc::new(move |value| sink(value).boxed()),
            pending: Mutex::new(None),
        }
    }

    /// Must be called from within a tokio runtime
    pub fn push(&self, value: T) {
        let sink = self.sink.clone();
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(sink(value));
        });
        if let Some(previous) = self.pending.lock().replace(task) {
            previous.abort();
        }
    }

    /// Drop the pending value, if any
    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.abort();
        }
    }
}

/// A settings record pushed by the host
#[derive(Debug, Clone)]
pub struct SettingsRecord {
    pub table_id: String,
    pub table: Arc<RawTable>,
    pub row_id: RowId,
    pub mapping: ColumnMapping,
}

/// Export widget: regenerates the document once record pushes settle
pub struct ExportWidget {
    debouncer: Debouncer<SettingsRecord>,
}

impl ExportWidget {
    /// `on_document` receives each generated document
    pub fn new<F>(host: Arc<dyn HostDocument>, config: WidgetConfig, on_document: F) -> Self
    where
        F: Fn(ServiceResult<TimelineDocument>) + Send + Sync + 'static,
    {
        let delay = config.debounce();
        let pipeline = Arc::new(ExportPipeline::new(host, config));
        let on_document = Arc::new(on_document);
        let debouncer = Debouncer::new(delay, move |record: SettingsRecord| {
            let pipeline = pipeline.clone();
            let on_document = on_document.clone();
            async move {
                let document = match ExportSettings::from_record(&record.table, record.row_id, &record.mapping) {
                    Ok(settings) => pipeline.build(&settings, &record.mapping).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = &document {
                    tracing::warn!(error = %e, "export failed");
                }
                on_document(document);
            }
        });
        Self { debouncer }
    }

    pub fn on_record(&self, record: SettingsRecord) {
        tracing::debug!(row = record.row_id, "settings record received");
        self.debouncer.push(record);
    }

    /// Persistence target of the record's filter set
    pub fn filter_target(record: &SettingsRecord) -> Option<FilterTarget> {
        record
            .mapping
            .column(export_roles::FILTERS)
            .map(|col_id| FilterTarget {
                table_id: record.table_id.clone(),
                row_id: record.row_id,
                col_id: col_id.to_string(),
            })
    }
}
