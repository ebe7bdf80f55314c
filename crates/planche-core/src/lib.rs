//! Planche Core - Shared model for the planning and export widgets
//!
//! This crate provides the types every other Planche crate depends on.
//! It defines:
//!
//! - `HostDocument` - Trait for the host document (table fetch and writes)
//! - `RawTable` - Columnar table snapshot with a checked row alignment
//! - `ColumnMapping` - Widget roles mapped to host columns
//! - `ColumnType` / `ColumnMeta` - Column metadata resolved from host schema tables
//! - `WidgetConfig` - Widget behavior settings
//! - `MemoryHost` - In-memory host document
//! - Common types like `CellValue`, `RowId`, etc.

mod config;
mod error;
mod host;
pub mod mapping;
mod memory;
mod schema;
mod table;
mod types;

pub use config::*;
pub use error::*;
pub use host::*;
pub use mapping::{ColumnMapping, MappedColumns};
pub use memory::MemoryHost;
pub use schema::*;
pub use table::*;
pub use types::*;
