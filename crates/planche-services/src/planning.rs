//! Planning widget dispatch
//!
//! The host pushes snapshots, mapping and table changes and option blobs on
//! one channel; the UI sends commands on another. One loop consumes both,
//! keeps the latest snapshot and publishes record batches. A rejected write
//! never leaves the UI on partial data: the last good batch is published
//! again.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use planche_core::{mapping::roles, ColumnMapping, HostDocument, RawTable, RowId, WidgetConfig};
use planche_schema::{ColumnMetadataCache, ReferenceResolver};

use crate::edit::{EditIntent, EditService, EditTranslator};
use crate::error::ServiceError;
use crate::projector::{editable_fields, project_calendar, resolve_labels, CalendarRecord, EditableField};
use crate::sort::{SortEngine, SortSpec};

/// Notification pushed by the host
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A full snapshot of the bound table, with the mapping when it changed
    SnapshotReceived {
        table: Arc<RawTable>,
        mapping: Option<ColumnMapping>,
    },
    MappingChanged(ColumnMapping),
    TableChanged(String),
    OptionsReceived(Option<Value>),
}

/// Request from the widget UI
#[derive(Debug, Clone)]
pub enum WidgetCommand {
    Edit(EditIntent),
    SelectRows(Vec<RowId>),
    UpdateOptions(Value),
}

/// Records ready for display
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordBatch {
    pub records: Vec<CalendarRecord>,
    pub editable: Vec<EditableField>,
    /// Rows created by the last edit, to be selected
    pub selection: Option<Vec<RowId>>,
}

/// Message published to the widget UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WidgetUpdate {
    Records(RecordBatch),
    Options(Value),
    WriteFailed { message: String },
}

/// State and event handling of the planning widget
pub struct PlanningWidget {
    host: Arc<dyn HostDocument>,
    config: WidgetConfig,
    cache: ColumnMetadataCache,
    resolver: ReferenceResolver,
    edits: EditService,
    table_id: Option<String>,
    mapping: Option<ColumnMapping>,
    snapshot: Option<Arc<RawTable>>,
    last_good: Option<RecordBatch>,
    options_received: bool,
    pending_selection: Option<Vec<RowId>>,
    updates: mpsc::UnboundedSender<WidgetUpdate>,
}

impl PlanningWidget {
    pub fn new(
        host: Arc<dyn HostDocument>,
        config: WidgetConfig,
        updates: mpsc::UnboundedSender<WidgetUpdate>,
    ) -> Self {
        let cache = ColumnMetadataCache::new(host.clone());
        cache.set_access_level(config.access_level);
        Self {
            resolver: ReferenceResolver::new(host.clone()),
            edits: EditService::new(host.clone()),
            host,
            config,
            cache,
            table_id: None,
            mapping: None,
            snapshot: None,
            last_good: None,
            options_received: false,
            pending_selection: None,
            updates,
        }
    }

    /// Consume host events and UI commands until both channels close
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<HostEvent>,
        mut commands: mpsc::Receiver<WidgetCommand>,
    ) {
        tracing::debug!("planning widget started");
        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event).await,
                Some(command) = commands.recv() => self.handle_command(command).await,
                else => break,
            }
        }
        tracing::debug!("planning widget stopped");
    }

    pub async fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::TableChanged(table_id) => {
                tracing::debug!(table = %table_id, "bound table changed");
                self.cache.notify_table(&table_id);
                self.table_id = Some(table_id);
            }
            HostEvent::MappingChanged(mapping) => {
                self.set_mapping(mapping);
                self.publish().await;
            }
            HostEvent::SnapshotReceived { table, mapping } => {
                if let Some(mapping) = mapping {
                    self.set_mapping(mapping);
                }
                tracing::debug!(rows = table.row_count(), "snapshot received");
                self.snapshot = Some(table);
                self.publish().await;
            }
            HostEvent::OptionsReceived(options) => {
                let options = options.filter(|v| !is_empty_blob(v));
                if let (false, Some(options)) = (self.options_received, options) {
                    self.options_received = true;
                    self.send(WidgetUpdate::Options(options));
                }
            }
        }
    }

    pub async fn handle_command(&mut self, command: WidgetCommand) {
        match command {
            WidgetCommand::Edit(intent) => self.apply_edit(intent).await,
            WidgetCommand::SelectRows(ids) => {
                if let Err(e) = self.host.set_selected_rows(&ids).await {
                    tracing::warn!(error = %e, "failed to move host selection");
                }
            }
            WidgetCommand::UpdateOptions(options) => {
                if let Err(e) = self.host.set_options(options).await {
                    self.report(ServiceError::WriteRejected(e.to_string()));
                }
            }
        }
    }

    pub fn last_good(&self) -> Option<&RecordBatch> {
        self.last_good.as_ref()
    }

    fn set_mapping(&mut self, mapping: ColumnMapping) {
        self.cache.notify_mapping(&mapping);
        self.mapping = Some(mapping);
    }

    #[tracing::instrument(skip(self, intent))]
    async fn apply_edit(&mut self, intent: EditIntent) {
        let (Some(table_id), Some(mapping), Some(raw)) =
            (self.table_id.clone(), self.mapping.clone(), self.snapshot.clone())
        else {
            self.report(ServiceError::NotMapped);
            return;
        };

        let metas = self.cache.metadata().await;
        let plan = EditTranslator::new(&raw, &mapping, &metas, &self.config).translate(&intent);
        if plan.is_empty() {
            tracing::debug!(?intent, "edit produced no writes");
            return;
        }

        let report = self.edits.submit(&table_id, plan).await;
        if !report.created.is_empty() {
            if let Err(e) = self.host.set_selected_rows(&report.created).await {
                tracing::warn!(error = %e, "failed to select created rows");
            }
            self.pending_selection = Some(report.created);
        }
        if !report.failures.is_empty() {
            for failure in report.failures {
                self.report(failure);
            }
            if let Some(batch) = self.last_good.clone() {
                self.send(WidgetUpdate::Records(batch));
            }
        }
    }

    /// Project the current snapshot and publish it
    async fn publish(&mut self) {
        let (Some(mapping), Some(raw)) = (self.mapping.clone(), self.snapshot.clone()) else {
            tracing::debug!("waiting for both mapping and snapshot");
            return;
        };

        let metas = self.cache.metadata().await;
        let label_columns: Vec<&str> = [roles::GROUPE, roles::SOUS_GROUPE]
            .into_iter()
            .filter_map(|role| mapping.column(role))
            .collect();
        let labels = resolve_labels(&self.resolver, &metas, &label_columns).await;
        let order = SortEngine::order(&raw, &SortSpec::default(), raw.all_indices());

        let batch = RecordBatch {
            records: project_calendar(&raw, order, &mapping, &metas, &labels, &self.config),
            editable: editable_fields(&mapping, &metas, &self.resolver).await,
            selection: self.pending_selection.take(),
        };
        tracing::debug!(records = batch.records.len(), "publishing records");
        self.last_good = Some(batch.clone());
        self.send(WidgetUpdate::Records(batch));
    }

    fn report(&self, error: ServiceError) {
        tracing::warn!(error = %error, "edit failed");
        self.send(WidgetUpdate::WriteFailed {
            message: error.to_string(),
        });
    }

    fn send(&self, update: WidgetUpdate) {
        if self.updates.send(update).is_err() {
            tracing::debug!("widget UI is gone, dropping update");
        }
    }
}

fn is_empty_blob(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
