//! Column metadata types
//!
//! The host only exposes column types through its internal schema tables, so
//! the type tag is parsed at runtime into a closed set of variants.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{CellValue, RowId, MANUAL_SORT_COLUMN};

/// Prefix of reference type tags (`Ref:<tableId>`)
pub const REFERENCE_PREFIX: &str = "Ref:";

/// Column type resolved from the host's type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    Text,
    Numeric,
    Int,
    Bool,
    Date,
    /// `DateTime` and `DateTime:<timezone>`
    DateTime,
    Choice,
    /// Reference to a row of another table
    Reference(String),
    #[default]
    Any,
    /// Any tag not listed above, kept verbatim
    Other(String),
}

impl ColumnType {
    /// Parse a host type tag. Unknown tags become `Other`.
    pub fn parse(tag: &str) -> Self {
        if let Some(table) = tag.strip_prefix(REFERENCE_PREFIX) {
            return ColumnType::Reference(table.to_string());
        }
        if tag == "DateTime" || tag.starts_with("DateTime:") {
            return ColumnType::DateTime;
        }
        match tag {
            "Text" => ColumnType::Text,
            "Numeric" => ColumnType::Numeric,
            "Int" => ColumnType::Int,
            "Bool" => ColumnType::Bool,
            "Date" => ColumnType::Date,
            "Choice" => ColumnType::Choice,
            "Any" | "" => ColumnType::Any,
            other => ColumnType::Other(other.to_string()),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, ColumnType::Reference(_))
    }

    /// Target table id for reference columns
    pub fn reference_target(&self) -> Option<&str> {
        match self {
            ColumnType::Reference(table) => Some(table),
            _ => None,
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime)
    }
}

impl From<String> for ColumnType {
    fn from(tag: String) -> Self {
        ColumnType::parse(&tag)
    }
}

impl From<ColumnType> for String {
    fn from(ty: ColumnType) -> Self {
        ty.to_string()
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Text => write!(f, "Text"),
            ColumnType::Numeric => write!(f, "Numeric"),
            ColumnType::Int => write!(f, "Int"),
            ColumnType::Bool => write!(f, "Bool"),
            ColumnType::Date => write!(f, "Date"),
            ColumnType::DateTime => write!(f, "DateTime"),
            ColumnType::Choice => write!(f, "Choice"),
            ColumnType::Reference(table) => write!(f, "{}{}", REFERENCE_PREFIX, table),
            ColumnType::Any => write!(f, "Any"),
            ColumnType::Other(tag) => write!(f, "{}", tag),
        }
    }
}

/// Display style of one choice value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceStyle {
    #[serde(default)]
    pub fill_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
}

/// Parsed `widgetOptions` of a column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetOptions {
    #[serde(default)]
    pub choice_options: HashMap<String, ChoiceStyle>,
    /// Every other option, untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WidgetOptions {
    /// Parse the JSON text stored by the host. Returns `None` for empty or
    /// malformed text.
    pub fn parse(text: &str) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(text) {
            Ok(options) => Some(options),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed widget options");
                None
            }
        }
    }

    /// Fill color configured for a choice value
    pub fn fill_color(&self, value: &CellValue) -> Option<&str> {
        self.choice_options
            .get(&value.to_string())
            .and_then(|style| style.fill_color.as_deref())
    }
}

/// Metadata of one host column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column identifier in its table
    pub col_id: String,
    /// Row id of this column in the host's column definition table
    pub row_ref: RowId,
    /// Row id of the owning table in the host's table definition table
    pub parent_id: RowId,
    /// Human readable label
    #[serde(default)]
    pub label: String,
    pub col_type: ColumnType,
    /// True only when the column has a non-empty formula
    #[serde(default)]
    pub is_formula: bool,
    #[serde(default)]
    pub widget_options: Option<WidgetOptions>,
    /// Row ref of the column displayed for a reference
    #[serde(default)]
    pub visible_col: Option<RowId>,
}

impl ColumnMeta {
    pub fn new(col_id: impl Into<String>, col_type: ColumnType) -> Self {
        let col_id = col_id.into();
        Self {
            label: col_id.clone(),
            col_id,
            col_type,
            ..Default::default()
        }
    }

    pub fn with_formula(mut self, is_formula: bool) -> Self {
        self.is_formula = is_formula;
        self
    }

    pub fn with_row_ref(mut self, row_ref: RowId) -> Self {
        self.row_ref = row_ref;
        self
    }

    pub fn with_visible_col(mut self, visible_col: RowId) -> Self {
        self.visible_col = Some(visible_col);
        self
    }

    pub fn with_widget_options(mut self, options: WidgetOptions) -> Self {
        self.widget_options = Some(options);
        self
    }

    /// Columns the widgets may copy or write: stored data, not the host's
    /// manual order column.
    pub fn is_writable(&self) -> bool {
        !self.is_formula && self.col_id != MANUAL_SORT_COLUMN
    }
}

/// Metadata for the columns of one table.
///
/// Lookups of unknown columns answer "unknown type, not a formula, no
/// options".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMetaSet {
    columns: Vec<ColumnMeta>,
    index: HashMap<String, usize>,
}

impl ColumnMetaSet {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.col_id.clone(), i))
            .collect();
        Self { columns, index }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter()
    }

    pub fn get(&self, col_id: &str) -> Option<&ColumnMeta> {
        self.index.get(col_id).map(|&i| &self.columns[i])
    }

    /// Find a column by its row ref in the column definition table
    pub fn by_row_ref(&self, row_ref: RowId) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.row_ref == row_ref)
    }

    pub fn col_type(&self, col_id: &str) -> ColumnType {
        self.get(col_id)
            .map(|c| c.col_type.clone())
            .unwrap_or_default()
    }

    pub fn is_formula(&self, col_id: &str) -> bool {
        self.get(col_id).is_some_and(|c| c.is_formula)
    }

    pub fn widget_options(&self, col_id: &str) -> Option<&WidgetOptions> {
        self.get(col_id).and_then(|c| c.widget_options.as_ref())
    }

    /// Columns whose values are copied into clones and split rows
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(|c| c.is_writable())
    }

    pub fn types(&self) -> HashMap<String, ColumnType> {
        self.columns
            .iter()
            .map(|c| (c.col_id.clone(), c.col_type.clone()))
            .collect()
    }

    pub fn formula_flags(&self) -> HashMap<String, bool> {
        self.columns
            .iter()
            .map(|c| (c.col_id.clone(), c.is_formula))
            .collect()
    }

    pub fn options(&self) -> HashMap<String, Option<WidgetOptions>> {
        self.columns
            .iter()
            .map(|c| (c.col_id.clone(), c.widget_options.clone()))
            .collect()
    }
}

impl FromIterator<ColumnMeta> for ColumnMetaSet {
    fn from_iter<I: IntoIterator<Item = ColumnMeta>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
