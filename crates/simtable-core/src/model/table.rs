//! In-memory tables: a shared row index plus ordered float columns.
//!
//! [`Table`] is the unit exchanged at every boundary of this crate: the
//! parser hands one in per source table, the chunk codec encodes and
//! decodes them, and frame reads assemble one back out of chunk subsets.
//! The validated constructor enforces the invariants the rest of the crate
//! relies on: every column matches the row index length, ids are unique,
//! and identities are homogeneous in arity (all-simple or all-full).

use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::model::identity::{ColumnId, ColumnIdentity};

/// The ordered row index shared by every chunk of a frame.
///
/// Either a timestamp sequence (monotonic non-decreasing, not required
/// strictly increasing) or a plain integer sequence for tables without a
/// time axis.
#[derive(Clone, Debug, PartialEq)]
pub enum RowIndex {
    /// Time-indexed rows, millisecond precision.
    Timestamps(Vec<DateTime<Utc>>),
    /// Plain sequential labels.
    Range(Vec<i64>),
}

impl RowIndex {
    /// A `Range` index `0..len`.
    pub fn sequential(len: usize) -> Self {
        RowIndex::Range((0..len as i64).collect())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            RowIndex::Timestamps(v) => v.len(),
            RowIndex::Range(v) => v.len(),
        }
    }

    /// Whether the index has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sub-index covering `range`.
    pub(crate) fn slice(&self, range: std::ops::Range<usize>) -> RowIndex {
        match self {
            RowIndex::Timestamps(v) => RowIndex::Timestamps(v[range].to_vec()),
            RowIndex::Range(v) => RowIndex::Range(v[range].to_vec()),
        }
    }
}

/// One logical column: its identity plus the values aligned to a row index.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    /// The identity tuple naming this column.
    pub identity: ColumnIdentity,
    /// Values, one per row of the owning table's index.
    pub values: Vec<f64>,
}

impl Column {
    /// Create a column from an identity and values.
    pub fn new(identity: ColumnIdentity, values: Vec<f64>) -> Self {
        Self { identity, values }
    }
}

/// A validated in-memory table: one row index, ordered columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    index: RowIndex,
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, validating column lengths, id uniqueness, and
    /// identity-arity homogeneity.
    pub fn new(index: RowIndex, columns: Vec<Column>) -> Result<Self, TableShapeError> {
        let rows = index.len();
        let mut seen = std::collections::HashSet::new();
        let mut arity: Option<bool> = None;

        for col in &columns {
            ensure!(
                col.values.len() == rows,
                LengthMismatchSnafu {
                    id: col.identity.id,
                    expected: rows,
                    actual: col.values.len(),
                }
            );
            ensure!(seen.insert(col.identity.id), DuplicateIdSnafu { id: col.identity.id });
            match arity {
                None => arity = Some(col.identity.is_full()),
                Some(full) => ensure!(
                    full == col.identity.is_full(),
                    MixedAritySnafu { id: col.identity.id }
                ),
            }
        }

        Ok(Self { index, columns })
    }

    /// A table with no columns, only a row index.
    pub fn empty(index: RowIndex) -> Self {
        Self { index, columns: Vec::new() }
    }

    /// The shared row index.
    pub fn index(&self) -> &RowIndex {
        &self.index
    }

    /// The columns in logical order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// The column identities in logical order.
    pub fn identities(&self) -> Vec<ColumnIdentity> {
        self.columns.iter().map(|c| c.identity.clone()).collect()
    }

    /// Look up a column by id.
    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| c.identity.id == id)
    }

    /// Mutable column lookup by id.
    pub(crate) fn column_mut(&mut self, id: ColumnId) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.identity.id == id)
    }

    /// Decompose into index and columns.
    pub fn into_parts(self) -> (RowIndex, Vec<Column>) {
        (self.index, self.columns)
    }

    /// The sub-table covering the row positions in `range`.
    pub fn slice_rows(&self, range: std::ops::Range<usize>) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.identity.clone(), c.values[range.clone()].to_vec()))
            .collect();
        Table { index: self.index.slice(range), columns }
    }

    pub(crate) fn push_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    pub(crate) fn retain_columns(&mut self, keep: impl Fn(&ColumnIdentity) -> bool) {
        self.columns.retain(|c| keep(&c.identity));
    }

    pub(crate) fn replace_index(self, index: RowIndex) -> Table {
        Table { index, columns: self.columns }
    }
}

/// Shape violations rejected by [`Table::new`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableShapeError {
    /// A column's value count differs from the row index length.
    #[snafu(display("Column {id} has {actual} values, expected {expected}"))]
    LengthMismatch {
        /// Id of the offending column.
        id: ColumnId,
        /// Row index length.
        expected: usize,
        /// Actual value count.
        actual: usize,
    },

    /// Two columns share the same id.
    #[snafu(display("Duplicate column id {id}"))]
    DuplicateId {
        /// The duplicated id.
        id: ColumnId,
    },

    /// Simple and full identities mixed in one table.
    #[snafu(display("Column {id} mixes simple and full identities in one table"))]
    MixedArity {
        /// Id of the column whose arity differs from the first column's.
        id: ColumnId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(id: i64) -> ColumnIdentity {
        ColumnIdentity::simple(id, "T", format!("K{id}"), "u")
    }

    #[test]
    fn validates_lengths() {
        let err = Table::new(
            RowIndex::sequential(3),
            vec![Column::new(ident(1), vec![1.0, 2.0])],
        )
        .unwrap_err();
        assert!(matches!(err, TableShapeError::LengthMismatch { .. }));
    }

    #[test]
    fn validates_unique_ids() {
        let err = Table::new(
            RowIndex::sequential(1),
            vec![
                Column::new(ident(1), vec![1.0]),
                Column::new(ident(1), vec![2.0]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, TableShapeError::DuplicateId { .. }));
    }

    #[test]
    fn validates_homogeneous_arity() {
        let err = Table::new(
            RowIndex::sequential(1),
            vec![
                Column::new(ident(1), vec![1.0]),
                Column::new(ColumnIdentity::full(2, "T", "K", "rate", "u"), vec![2.0]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, TableShapeError::MixedArity { .. }));
    }

    #[test]
    fn slice_rows_narrows_index_and_values() {
        let t = Table::new(
            RowIndex::Range(vec![10, 11, 12, 13]),
            vec![Column::new(ident(1), vec![1.0, 2.0, 3.0, 4.0])],
        )
        .unwrap();
        let s = t.slice_rows(1..3);
        assert_eq!(s.index(), &RowIndex::Range(vec![11, 12]));
        assert_eq!(s.columns()[0].values, vec![2.0, 3.0]);
    }
}
