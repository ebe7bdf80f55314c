//! Planche Schema - Column metadata and reference resolution
//!
//! The host does not report column types with its row pushes, so they are
//! read from the host's schema tables and cached per mapping generation.
//!
//! - [`ColumnMetadataCache`] - Shared, generation-tokened metadata fetch
//! - [`ReferenceResolver`] - Id to label lookups for reference columns

mod metadata;
mod references;

pub use metadata::{fetch_column_metadata, ColumnMetadataCache, Generation};
pub use references::{ReferenceChoice, ReferenceLabels, ReferenceResolver};
