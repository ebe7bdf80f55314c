//! Widget role to host column mapping
//!
//! The host pushes a mapping from the widget's logical roles (`date`,
//! `groupe`, ...) to column ids of the bound table. Some roles accept several
//! columns.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Roles of the planning widget
pub mod roles {
    pub const DATE: &str = "date";
    pub const DUREE: &str = "duree";
    pub const FIN: &str = "fin";
    pub const GROUPE: &str = "groupe";
    pub const SOUS_GROUPE: &str = "sousGroupe";
    pub const COULEUR: &str = "couleur";
    pub const COMMENTAIRE: &str = "commentaire";
    pub const CONTENU: &str = "contenu";
    pub const FIELDS: &str = "fields";
}

/// Column(s) mapped to one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappedColumns {
    Single(String),
    Multiple(Vec<String>),
}

impl MappedColumns {
    pub fn as_slice(&self) -> &[String] {
        match self {
            MappedColumns::Single(col) => std::slice::from_ref(col),
            MappedColumns::Multiple(cols) => cols,
        }
    }
}

/// Mapping pushed by the host. Unmapped optional roles are `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    roles: IndexMap<String, Option<MappedColumns>>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a single-column role
    pub fn with_column(mut self, role: impl Into<String>, col_id: impl Into<String>) -> Self {
        self.roles
            .insert(role.into(), Some(MappedColumns::Single(col_id.into())));
        self
    }

    /// Map a multi-column role
    pub fn with_columns<S: Into<String>>(
        mut self,
        role: impl Into<String>,
        col_ids: impl IntoIterator<Item = S>,
    ) -> Self {
        let cols = col_ids.into_iter().map(Into::into).collect();
        self.roles
            .insert(role.into(), Some(MappedColumns::Multiple(cols)));
        self
    }

    /// Column mapped to a single-column role
    pub fn column(&self, role: &str) -> Option<&str> {
        match self.roles.get(role) {
            Some(Some(MappedColumns::Single(col))) => Some(col.as_str()),
            _ => None,
        }
    }

    /// Columns mapped to a role, in mapping order. Empty when unmapped.
    pub fn columns(&self, role: &str) -> &[String] {
        match self.roles.get(role) {
            Some(Some(mapped)) => mapped.as_slice(),
            _ => &[],
        }
    }

    pub fn is_mapped(&self, role: &str) -> bool {
        !self.columns(role).is_empty()
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(|k| k.as_str())
    }

    /// Every mapped column id, multi-column roles expanded in place.
    ///
    /// This list is the mapping identity used to invalidate column metadata.
    pub fn flattened_ids(&self) -> Vec<String> {
        self.roles
            .values()
            .flatten()
            .flat_map(|mapped| mapped.as_slice().iter().cloned())
            .collect()
    }

    /// Set of every mapped column id
    pub fn value_set(&self) -> HashSet<&str> {
        self.roles
            .values()
            .flatten()
            .flat_map(|mapped| mapped.as_slice().iter().map(|c| c.as_str()))
            .collect()
    }

    pub fn contains_column(&self, col_id: &str) -> bool {
        self.roles
            .values()
            .flatten()
            .any(|mapped| mapped.as_slice().iter().any(|c| c == col_id))
    }

    pub fn is_empty(&self) -> bool {
        self.roles.values().all(|v| v.is_none())
    }
}
