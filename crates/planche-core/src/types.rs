//! Core types for Planche

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Host row identifier
pub type RowId = i64;

/// A cell value as the host stores it.
///
/// Dates and datetimes are epoch seconds, references are row ids. The enum
/// is `Eq + Hash` so values can be used as set members (filter include-sets,
/// distinct value enumeration).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Empty cell
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer (row ids, Int columns)
    Int(i64),
    /// Floating point (Numeric columns, epoch seconds)
    Float(OrderedFloat<f64>),
    /// Text, Choice
    Text(String),
    /// Encoded list values
    List(Vec<CellValue>),
}

/// Primitive kind of a cell value, used when comparing heterogeneous cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    Text,
    List,
}

impl CellValue {
    /// Check if the value is empty
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            CellValue::Null => ValueKind::Null,
            CellValue::Bool(_) => ValueKind::Bool,
            CellValue::Int(_) | CellValue::Float(_) => ValueKind::Number,
            CellValue::Text(_) => ValueKind::Text,
            CellValue::List(_) => ValueKind::List,
        }
    }

    /// Whether the host would consider this value "set".
    ///
    /// Null, `false`, zero and the empty string are not.
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Null => false,
            CellValue::Bool(b) => *b,
            CellValue::Int(v) => *v != 0,
            CellValue::Float(v) => v.0 != 0.0 && !v.0.is_nan(),
            CellValue::Text(s) => !s.is_empty(),
            CellValue::List(_) => true,
        }
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64 (integral floats included)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Float(v) if v.0.fract() == 0.0 && v.0.is_finite() => Some(v.0 as i64),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) => Some(v.0),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Interpret the value as epoch seconds
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        let seconds = self.as_f64()?;
        DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
    }

    /// Interpret the value as epoch seconds and return epoch milliseconds
    pub fn as_epoch_millis(&self) -> Option<f64> {
        self.as_f64().map(|seconds| seconds * 1000.0)
    }

    /// Encode a datetime the way the host stores it (epoch seconds)
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let millis = at.timestamp_millis();
        if millis % 1000 == 0 {
            CellValue::Int(millis / 1000)
        } else {
            CellValue::Float(OrderedFloat(millis as f64 / 1000.0))
        }
    }

    /// String form used for ids handed to the UI; empty when the value is not set
    pub fn to_id_string(&self) -> String {
        if self.is_truthy() {
            self.to_string()
        } else {
            String::new()
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Float(v) => write!(f, "{}", v.0),
            CellValue::Text(v) => write!(f, "{}", v),
            CellValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(OrderedFloat(v))
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}
