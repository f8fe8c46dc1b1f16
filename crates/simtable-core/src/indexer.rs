//! Get/set façade over a frame.
//!
//! Callers address data with the selector unions from `model::selectors`
//! and receive either a table or a single series, whichever shape the call
//! implies. All resolution is delegated to the frame; this layer only
//! adapts shapes and validates the obvious mismatches early.

use snafu::prelude::*;

use crate::frame::error::{FrameResult, ValueCountSnafu};
use crate::frame::Frame;
use crate::model::identity::{ColumnId, ColumnIdentity};
use crate::model::selectors::{ColumnSelector, RowSelector};
use crate::model::table::{RowIndex, Table};

/// One column materialized on its own: identity, row index, values.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    /// The column's identity.
    pub identity: ColumnIdentity,
    /// The row index covering `values`.
    pub index: RowIndex,
    /// The column's values.
    pub values: Vec<f64>,
}

/// Borrowing façade providing get/set semantics over a [`Frame`].
#[derive(Debug)]
pub struct Indexer<'a> {
    frame: &'a mut Frame,
}

impl Frame {
    /// The get/set façade for this frame.
    pub fn indexer(&mut self) -> Indexer<'_> {
        Indexer { frame: self }
    }
}

impl Indexer<'_> {
    /// Table-shaped get: the selected rows and columns as one table.
    pub fn table(&self, rows: &RowSelector, columns: &ColumnSelector) -> FrameResult<Table> {
        self.frame.read(rows, columns)
    }

    /// Series-shaped get: one column by id, optionally row-sliced.
    pub fn series(&self, rows: &RowSelector, id: ColumnId) -> FrameResult<Series> {
        let table = self.frame.read(rows, &ColumnSelector::ByIds(vec![id]))?;
        let (index, mut columns) = table.into_parts();
        // read() returns exactly the one requested column here.
        let column = columns.pop().context(ValueCountSnafu { expected: 1usize, actual: 0usize })?;
        Ok(Series { identity: column.identity, index, values: column.values })
    }

    /// Table-shaped set: overwrite the selected cells, one value vector
    /// per selected column.
    pub fn set(
        &mut self,
        rows: &RowSelector,
        columns: &ColumnSelector,
        values: &[Vec<f64>],
    ) -> FrameResult<()> {
        self.frame.write(rows, columns, values)
    }

    /// Series-shaped set: overwrite one column's selected rows.
    pub fn set_series(
        &mut self,
        rows: &RowSelector,
        id: ColumnId,
        values: Vec<f64>,
    ) -> FrameResult<()> {
        self.frame
            .write(rows, &ColumnSelector::ByIds(vec![id]), &[values])
    }
}
