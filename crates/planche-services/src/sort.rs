//! Multi-key row ordering
//!
//! A sort spec is persisted as a comma-separated list of column ids, each
//! optionally prefixed with `<` (ascending) or `>` (descending). A bare
//! column id sorts descending. Without any key, rows follow the host's
//! manual order.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use planche_core::{CellValue, RawTable};
use unicase::UniCase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// A column to sort by with its direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Sort keys in priority order (first = highest priority)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromStr for SortSpec {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let keys = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| {
                let key = if let Some(column) = part.strip_prefix('<') {
                    SortKey::ascending(column.trim())
                } else if let Some(column) = part.strip_prefix('>') {
                    SortKey::descending(column.trim())
                } else {
                    SortKey::descending(part)
                };
                (!key.column.is_empty()).then_some(key)
            })
            .collect();
        Ok(Self { keys })
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .keys
            .iter()
            .map(|key| match key.direction {
                SortDirection::Ascending => format!("<{}", key.column),
                SortDirection::Descending => format!(">{}", key.column),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Orders row positions by a sort spec
pub struct SortEngine;

impl SortEngine {
    /// Order `indices` by `spec`. The sort is stable: rows on which every key
    /// ties keep their input order.
    pub fn order(
        raw: &RawTable,
        spec: &SortSpec,
        indices: impl IntoIterator<Item = usize>,
    ) -> Vec<usize> {
        let mut rows: Vec<usize> = indices.into_iter().collect();
        if spec.is_empty() {
            rows.sort_by(|&a, &b| {
                let a = raw.manual_sort(a).unwrap_or(f64::INFINITY);
                let b = raw.manual_sort(b).unwrap_or(f64::INFINITY);
                a.total_cmp(&b)
            });
            return rows;
        }

        let columns: Vec<(Option<&[CellValue]>, SortDirection)> = spec
            .keys()
            .iter()
            .map(|key| {
                let values = raw.column(&key.column);
                if values.is_none() {
                    tracing::warn!(column = %key.column, "sort key on unknown column ties every row");
                }
                (values, key.direction)
            })
            .collect();

        let compare = |a: usize, b: usize| {
            columns
                .iter()
                .filter_map(|(values, direction)| values.map(|values| (values, direction)))
                .map(|(values, direction)| direction.apply(compare_cells(&values[a], &values[b])))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        };
        merge_sort_by(&rows, &compare)
    }
}

/// Stable merge sort.
///
/// Mixed-kind ties make the key comparison intransitive, which
/// `slice::sort_by` does not accept.
fn merge_sort_by(rows: &[usize], compare: &impl Fn(usize, usize) -> Ordering) -> Vec<usize> {
    if rows.len() <= 1 {
        return rows.to_vec();
    }
    let (left, right) = rows.split_at(rows.len() / 2);
    let (left, right) = (merge_sort_by(left, compare), merge_sort_by(right, compare));

    let mut merged = Vec::with_capacity(rows.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if compare(right[j], left[i]).is_lt() {
            merged.push(right[j]);
            j += 1;
        } else {
            merged.push(left[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    merged
}

/// Compare two cells of the same kind: numbers numerically, text
/// case-insensitively then by code point. Cells of different kinds tie.
fn compare_cells(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Text(x), CellValue::Text(y)) => UniCase::new(x.as_str())
            .cmp(&UniCase::new(y.as_str()))
            .then_with(|| x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planche_core::{RawTableBuilder, ID_COLUMN, MANUAL_SORT_COLUMN};
    use pretty_assertions::assert_eq;

    fn table() -> RawTable {
        RawTableBuilder::new()
            .column(ID_COLUMN, [1i64, 2, 3, 4, 5])
            .column(MANUAL_SORT_COLUMN, [3.0, 1.0, 5.0, 2.0, 4.0])
            .column("Rank", [2i64, 1, 2, 3, 1])
            .column("Name", ["beta", "Alpha", "alpha", "Gamma", "beta"])
            .column(
                "Mixed",
                [
                    CellValue::Int(1),
                    CellValue::from("x"),
                    CellValue::Int(0),
                    CellValue::Null,
                    CellValue::from(0.5),
                ],
            )
            .build()
            .unwrap()
    }

    fn spec(text: &str) -> SortSpec {
        text.parse().unwrap()
    }

    #[test]
    fn test_parse_compact_spec() {
        assert_eq!(
            spec("<Rank, >Name,Date,,"),
            SortSpec::new(vec![
                SortKey::ascending("Rank"),
                SortKey::descending("Name"),
                SortKey::descending("Date"),
            ])
        );
        assert!(spec("").is_empty());
        assert!(spec(" , <").is_empty());
    }

    #[test]
    fn test_display_round_trip() {
        let parsed = spec("<Rank,Name");
        assert_eq!(parsed.to_string(), "<Rank,>Name");
        assert_eq!(spec(&parsed.to_string()), parsed);
    }

    #[test]
    fn test_empty_spec_uses_manual_sort() {
        let raw = table();
        assert_eq!(SortEngine::order(&raw, &SortSpec::default(), raw.all_indices()), vec![1, 3, 0, 4, 2]);
    }

    #[test]
    fn test_numeric_ascending_is_stable() {
        let raw = table();
        let order = SortEngine::order(&raw, &spec("<Rank"), raw.all_indices());
        assert_eq!(order, vec![1, 4, 0, 2, 3]);
        let ranks: Vec<i64> = order
            .iter()
            .map(|&row| raw.value("Rank", row).and_then(CellValue::as_i64).unwrap())
            .collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_bare_key_sorts_descending() {
        let raw = table();
        assert_eq!(SortEngine::order(&raw, &spec("Rank"), raw.all_indices()), vec![3, 0, 2, 1, 4]);
        assert_eq!(
            SortEngine::order(&raw, &spec(">Rank"), raw.all_indices()),
            SortEngine::order(&raw, &spec("Rank"), raw.all_indices())
        );
    }

    #[test]
    fn test_text_ascending_is_honored() {
        let raw = table();
        // case-insensitive first, code point order breaks the Alpha/alpha tie
        assert_eq!(SortEngine::order(&raw, &spec("<Name"), raw.all_indices()), vec![1, 2, 0, 4, 3]);
        assert_eq!(SortEngine::order(&raw, &spec(">Name"), raw.all_indices()), vec![3, 0, 4, 2, 1]);
    }

    #[test]
    fn test_later_keys_break_ties() {
        let raw = table();
        assert_eq!(
            SortEngine::order(&raw, &spec("<Rank,<Name"), raw.all_indices()),
            vec![1, 4, 2, 0, 3]
        );
        assert_eq!(
            SortEngine::order(&raw, &spec("<Rank,>Name"), raw.all_indices()),
            vec![4, 1, 0, 2, 3]
        );
    }

    #[test]
    fn test_mixed_kinds_tie() {
        let raw = table();
        // text against number ties and keeps input order
        assert_eq!(SortEngine::order(&raw, &spec("<Mixed"), [0, 1]), vec![0, 1]);
        assert_eq!(SortEngine::order(&raw, &spec("<Mixed"), [1, 0]), vec![1, 0]);
        // integers and floats compare as numbers
        assert_eq!(SortEngine::order(&raw, &spec("<Mixed"), [0, 4, 2]), vec![2, 4, 0]);
        // a tie falls through to the next key
        assert_eq!(SortEngine::order(&raw, &spec("<Mixed,<Rank"), [0, 1]), vec![1, 0]);
        assert_eq!(SortEngine::order(&raw, &spec("<Mixed,<Rank"), [3, 0]), vec![0, 3]);
    }

    #[test]
    fn test_unknown_column_keeps_order() {
        let raw = table();
        assert_eq!(SortEngine::order(&raw, &spec("<Gone"), [4, 0, 2]), vec![4, 0, 2]);
    }
}
