//! Subcommand implementations over an in-memory host document

use anyhow::{bail, Context};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use planche_core::{ColumnMapping, HostDocument, MemoryHost, RowId, WidgetConfig};
use planche_services::{
    EditIntent, ExportPipeline, ExportSettings, HostEvent, PlanningWidget, WidgetCommand,
    WidgetUpdate,
};

/// Settings file first, then the URL query, then defaults
pub fn load_config(path: Option<&Path>, query: Option<&str>) -> anyhow::Result<WidgetConfig> {
    match (path, query) {
        (Some(path), _) => WidgetConfig::load(path)
            .with_context(|| format!("loading settings from {}", path.display())),
        (None, Some(query)) => Ok(WidgetConfig::from_query(query)),
        (None, None) => Ok(WidgetConfig::default()),
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_document(path: &Path) -> anyhow::Result<Arc<MemoryHost>> {
    let host = MemoryHost::from_document_json(read_json(path)?)
        .with_context(|| format!("loading document {}", path.display()))?;
    tracing::debug!(tables = ?host.table_ids(), "document loaded");
    Ok(Arc::new(host))
}

fn load_mapping(path: &Path) -> anyhow::Result<ColumnMapping> {
    serde_json::from_value(read_json(path)?)
        .with_context(|| format!("invalid column mapping in {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn drain(updates: &mut mpsc::UnboundedReceiver<WidgetUpdate>) -> Vec<WidgetUpdate> {
    let mut drained = Vec::new();
    while let Ok(update) = updates.try_recv() {
        drained.push(update);
    }
    drained
}

/// Planning widget bound to `table_id` with its first snapshot applied
async fn bind_widget(
    host: Arc<MemoryHost>,
    table_id: &str,
    mapping: ColumnMapping,
    config: WidgetConfig,
) -> anyhow::Result<(PlanningWidget, mpsc::UnboundedReceiver<WidgetUpdate>)> {
    let table = host
        .fetch_table(table_id)
        .await
        .with_context(|| format!("loading table {}", table_id))?;
    let (tx, rx) = mpsc::unbounded_channel();
    let mut widget = PlanningWidget::new(host, config, tx);
    widget
        .handle_event(HostEvent::TableChanged(table_id.to_string()))
        .await;
    widget
        .handle_event(HostEvent::SnapshotReceived {
            table: Arc::new(table),
            mapping: Some(mapping),
        })
        .await;
    Ok((widget, rx))
}

pub async fn project(
    document: &Path,
    table_id: &str,
    mapping: &Path,
    config: WidgetConfig,
) -> anyhow::Result<()> {
    let host = load_document(document)?;
    let (widget, mut updates) = bind_widget(host, table_id, load_mapping(mapping)?, config).await?;
    drain(&mut updates);
    match widget.last_good() {
        Some(batch) => print_json(batch),
        None => bail!("no records were published for table {}", table_id),
    }
}

pub async fn edit(
    document: &Path,
    table_id: &str,
    mapping: &Path,
    intent: &Path,
    output: &Path,
    config: WidgetConfig,
) -> anyhow::Result<()> {
    let intent: EditIntent = serde_json::from_value(read_json(intent)?)
        .with_context(|| format!("invalid edit intent in {}", intent.display()))?;
    let host = load_document(document)?;
    let (mut widget, mut updates) =
        bind_widget(host.clone(), table_id, load_mapping(mapping)?, config).await?;
    drain(&mut updates);

    widget.handle_command(WidgetCommand::Edit(intent)).await;
    let failures: Vec<String> = drain(&mut updates)
        .into_iter()
        .filter_map(|update| match update {
            WidgetUpdate::WriteFailed { message } => Some(message),
            _ => None,
        })
        .collect();

    // partial writes are kept: the host already applied them
    let saved = serde_json::to_string_pretty(&host.to_document_json()?)?;
    std::fs::write(output, saved).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(output = %output.display(), selection = ?host.selection(), "document saved");

    if !failures.is_empty() {
        bail!("{} write(s) rejected: {}", failures.len(), failures.join("; "));
    }
    print_json(&host.selection())
}

pub async fn export(
    document: &Path,
    settings_table: &str,
    row_id: RowId,
    mapping: &Path,
    config: WidgetConfig,
) -> anyhow::Result<()> {
    let host = load_document(document)?;
    let mapping = load_mapping(mapping)?;
    let settings_raw = host
        .fetch_table(settings_table)
        .await
        .with_context(|| format!("loading settings table {}", settings_table))?;
    let settings = ExportSettings::from_record(&settings_raw, row_id, &mapping)?;

    let pipeline = ExportPipeline::new(host, config);
    let timeline = pipeline.build(&settings, &mapping).await?;
    print_json(&timeline)
}
