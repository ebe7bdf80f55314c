//! Planche Services Layer
//!
//! This crate turns host table snapshots into widget records and widget
//! gestures back into host writes.
//!
//! # Architecture
//!
//! ```text
//! Widget UI (calendar, PDF layout)
//!     ↓ records        ↑ edit intents
//! Service Layer (planche-services) ← This crate
//!     ↓
//! Schema Layer (planche-schema: metadata cache, reference labels)
//!     ↓
//! Core (planche-core: RawTable, ColumnMapping, HostDocument)
//! ```
//!
//! # Services
//!
//! - [`project_calendar`] / [`project_timeline`] - Row projection
//! - [`FilterEngine`] / [`FilterService`] - Inclusion filters and their persistence
//! - [`SortEngine`] - Multi-key row ordering
//! - [`EditTranslator`] / [`EditService`] - Edit intents to host writes
//! - [`PlanningWidget`] - Event dispatch loop of the planning widget
//! - [`ExportPipeline`] / [`ExportWidget`] - Timeline export with debounced output

mod edit;
mod error;
mod export;
mod filter;
mod planning;
mod projector;
mod sort;

pub use edit::{EditIntent, EditService, EditTranslator, WritePlan, WriteReport};
pub use error::{ServiceError, ServiceResult};
pub use export::{
    export_roles, Alignment, Debouncer, ExportPipeline, ExportSettings, ExportWidget,
    LayoutSettings, Orientation, SettingsRecord, TimelineDocument,
};
pub use filter::{
    addable_columns, filter_options, ColumnFilter, FilterEngine, FilterOption, FilterService,
    FilterSet, FilterTarget,
};
pub use planning::{HostEvent, PlanningWidget, RecordBatch, WidgetCommand, WidgetUpdate};
pub use projector::{
    editable_fields, project_calendar, project_timeline, resolve_labels, CalendarRecord,
    EditableField, GroupLabel, LabelMap, Timeline, TimelineColumns, TimelineGroup,
    TimelineSection,
};
pub use sort::{SortDirection, SortEngine, SortKey, SortSpec};
