//! Integration tests for the planning widget dispatch loop

mod common;

use chrono::{DateTime, TimeZone, Utc};
use common::{document, document_without_schema, planning_mapping, tasks_table, value, MockHost, T0};
use planche_core::{CellValue, WidgetConfig};
use planche_services::{
    EditIntent, HostEvent, PlanningWidget, RecordBatch, WidgetCommand, WidgetUpdate,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

async fn started(host: Arc<MockHost>) -> (PlanningWidget, mpsc::UnboundedReceiver<WidgetUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut widget = PlanningWidget::new(host, WidgetConfig::default(), tx);
    widget
        .handle_event(HostEvent::TableChanged("Tasks".into()))
        .await;
    widget
        .handle_event(HostEvent::SnapshotReceived {
            table: Arc::new(tasks_table()),
            mapping: Some(planning_mapping()),
        })
        .await;
    (widget, rx)
}

/// Push the host's current `Tasks` table as a new snapshot
async fn refresh(widget: &mut PlanningWidget, host: &MockHost) {
    let table = host.inner.table("Tasks").unwrap();
    widget
        .handle_event(HostEvent::SnapshotReceived {
            table: Arc::new(table),
            mapping: None,
        })
        .await;
}

fn drain(rx: &mut mpsc::UnboundedReceiver<WidgetUpdate>) -> Vec<WidgetUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

fn single_batch(updates: Vec<WidgetUpdate>) -> RecordBatch {
    match updates.as_slice() {
        [WidgetUpdate::Records(batch)] => batch.clone(),
        other => panic!("expected one record batch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_snapshot_publishes_records() {
    let host = Arc::new(MockHost::new(document()));
    let (_widget, mut rx) = started(host.clone()).await;

    let batch = single_batch(drain(&mut rx));
    let ids: Vec<_> = batch.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);

    let first = &batch.records[0];
    assert_eq!(first.groupe, "Red");
    assert_eq!(first.groupe_id, "1");
    assert_eq!(first.couleur, "grey");
    assert_eq!(batch.records[1].groupe, "Blue");

    let last = &batch.records[2];
    assert_eq!(last.date, Some(at(T0)));
    assert_eq!(last.duree, Some(2.0));
    assert_eq!(last.couleur, "#0f0");
    assert_eq!(last.contenu, vec![CellValue::from("Alpha")]);

    let editable: Vec<_> = batch.editable.iter().map(|f| f.col_id.as_str()).collect();
    assert_eq!(editable, vec!["Title"]);
    assert_eq!(batch.selection, None);
}

#[tokio::test]
async fn test_move_writes_to_host() {
    let host = Arc::new(MockHost::new(document()));
    let (mut widget, mut rx) = started(host.clone()).await;
    drain(&mut rx);

    widget
        .handle_command(WidgetCommand::Edit(EditIntent::Move {
            ids: vec![1],
            change_debut: 3600.0,
            change_amplitude: 0.0,
        }))
        .await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(value(&host.inner, "Tasks", "Start", 1), Some(CellValue::Int(T0 + 3600)));
    assert_eq!(value(&host.inner, "Tasks", "Hours", 1), Some(CellValue::from(2.0)));

    refresh(&mut widget, &host).await;
    let batch = single_batch(drain(&mut rx));
    let moved = batch.records.iter().find(|r| r.id == 1).unwrap();
    assert_eq!(moved.date, Some(at(T0 + 3600)));
}

#[tokio::test]
async fn test_clone_selects_created_rows() {
    let host = Arc::new(MockHost::new(document()));
    let (mut widget, mut rx) = started(host.clone()).await;
    drain(&mut rx);

    widget
        .handle_command(WidgetCommand::Edit(EditIntent::Clone {
            ids: vec![1],
            change_debut: 0.0,
            groupe_id: Some("2".into()),
            sous_groupe_id: None,
        }))
        .await;
    assert_eq!(host.inner.selection(), vec![4]);
    assert_eq!(value(&host.inner, "Tasks", "Team", 4), Some(CellValue::Int(2)));
    assert_eq!(value(&host.inner, "Tasks", "Title", 4), Some(CellValue::from("Alpha")));
    assert_eq!(value(&host.inner, "Tasks", "Total", 4), Some(CellValue::Null));

    refresh(&mut widget, &host).await;
    let batch = single_batch(drain(&mut rx));
    assert_eq!(batch.selection, Some(vec![4]));
    let clone = batch.records.iter().find(|r| r.id == 4).unwrap();
    assert_eq!(clone.groupe, "Blue");

    refresh(&mut widget, &host).await;
    assert_eq!(single_batch(drain(&mut rx)).selection, None);
}

#[tokio::test]
async fn test_rejected_write_restores_last_good_records() {
    let host = Arc::new(MockHost::new(document()).with_failing_updates());
    let (mut widget, mut rx) = started(host.clone()).await;
    let before = single_batch(drain(&mut rx));

    widget
        .handle_command(WidgetCommand::Edit(EditIntent::Move {
            ids: vec![1],
            change_debut: 3600.0,
            change_amplitude: 0.0,
        }))
        .await;

    let updates = drain(&mut rx);
    assert_eq!(updates.len(), 2);
    match &updates[0] {
        WidgetUpdate::WriteFailed { message } => assert!(message.contains("update")),
        other => panic!("expected a write failure, got {:?}", other),
    }
    assert_eq!(updates[1], WidgetUpdate::Records(before.clone()));
    assert_eq!(widget.last_good(), Some(&before));
    assert_eq!(value(&host.inner, "Tasks", "Start", 1), Some(CellValue::Int(T0)));
}

#[tokio::test]
async fn test_edit_before_mapping_is_reported() {
    let host = Arc::new(MockHost::new(document()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut widget = PlanningWidget::new(host.clone(), WidgetConfig::default(), tx);

    widget
        .handle_command(WidgetCommand::Edit(EditIntent::Delete { ids: vec![1] }))
        .await;
    assert_eq!(
        drain(&mut rx),
        vec![WidgetUpdate::WriteFailed {
            message: "No column mapping received yet".into()
        }]
    );
    assert_eq!(host.call_count("destroy_records"), 0);
}

#[tokio::test]
async fn test_first_non_empty_options_win() {
    let host = Arc::new(MockHost::new(document()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut widget = PlanningWidget::new(host, WidgetConfig::default(), tx);

    widget.handle_event(HostEvent::OptionsReceived(None)).await;
    widget
        .handle_event(HostEvent::OptionsReceived(Some(json!({}))))
        .await;
    widget
        .handle_event(HostEvent::OptionsReceived(Some(json!({"view": "week"}))))
        .await;
    widget
        .handle_event(HostEvent::OptionsReceived(Some(json!({"view": "month"}))))
        .await;

    assert_eq!(drain(&mut rx), vec![WidgetUpdate::Options(json!({"view": "week"}))]);
}

#[tokio::test]
async fn test_update_options_persists() {
    let host = Arc::new(MockHost::new(document()));
    let (mut widget, _rx) = started(host.clone()).await;

    widget
        .handle_command(WidgetCommand::UpdateOptions(json!({"view": "day"})))
        .await;
    assert_eq!(host.inner.options(), Some(json!({"view": "day"})));
}

#[tokio::test]
async fn test_missing_metadata_shows_raw_values() {
    let host = Arc::new(MockHost::new(document_without_schema()));
    let (_widget, mut rx) = started(host).await;

    let batch = single_batch(drain(&mut rx));
    assert_eq!(batch.records.len(), 3);
    assert!(batch.records.iter().all(|r| r.couleur == "grey"));
    assert_eq!(batch.records[0].groupe, "1");
    assert!(batch.editable.is_empty());
}

#[tokio::test]
async fn test_run_loop_handles_both_channels() {
    let host = Arc::new(MockHost::new(document()));
    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::channel(8);
    let (commands_tx, commands_rx) = mpsc::channel(8);
    let widget = PlanningWidget::new(host.clone(), WidgetConfig::default(), updates_tx);
    let handle = tokio::spawn(widget.run(events_rx, commands_rx));

    events_tx
        .send(HostEvent::TableChanged("Tasks".into()))
        .await
        .unwrap();
    events_tx
        .send(HostEvent::SnapshotReceived {
            table: Arc::new(tasks_table()),
            mapping: Some(planning_mapping()),
        })
        .await
        .unwrap();
    assert!(matches!(updates.recv().await, Some(WidgetUpdate::Records(_))));

    commands_tx
        .send(WidgetCommand::Edit(EditIntent::Delete { ids: vec![2] }))
        .await
        .unwrap();
    drop(events_tx);
    drop(commands_tx);
    handle.await.unwrap();

    let table = host.inner.table("Tasks").unwrap();
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.position_of(2), None);
}
