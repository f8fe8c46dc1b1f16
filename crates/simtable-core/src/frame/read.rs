//! Read path: column resolution, per-chunk projected reads, reassembly.

use std::collections::HashMap;

use snafu::prelude::*;

use crate::frame::Frame;
use crate::frame::error::{ColumnNotFoundSnafu, FrameResult, SelectorSnafu, ShapeSnafu, StoreSnafu};
use crate::model::identity::ColumnId;
use crate::model::selectors::{ColumnSelector, RowSelector};
use crate::model::table::{Column, Table};
use crate::store::ChunkName;

impl Frame {
    /// Materialize the selected rows and columns as one table.
    ///
    /// Columns are resolved once against the lookup index, grouped by
    /// owning chunk, and each chunk is read restricted to the needed
    /// columns only. The combined result carries the frame's shared row
    /// index, is reordered to the caller's requested column order, and is
    /// row-sliced last.
    pub fn read(&self, rows: &RowSelector, columns: &ColumnSelector) -> FrameResult<Table> {
        let targets = self.lookup.resolve(columns)?;

        let mut order: Vec<ChunkName> = Vec::new();
        let mut groups: HashMap<ChunkName, Vec<String>> = HashMap::new();
        for target in &targets {
            groups
                .entry(target.chunk.clone())
                .or_insert_with(|| {
                    order.push(target.chunk.clone());
                    Vec::new()
                })
                .push(target.identity.to_header());
        }

        let mut fetched: HashMap<ColumnId, Column> = HashMap::with_capacity(targets.len());
        for chunk in &order {
            let part = self.store.read(chunk, Some(&groups[chunk])).context(StoreSnafu)?;
            let (_, part_columns) = part.into_parts();
            for column in part_columns {
                fetched.insert(column.identity.id, column);
            }
        }

        let mut assembled = Vec::with_capacity(targets.len());
        for target in &targets {
            let column = fetched.remove(&target.identity.id).context(ColumnNotFoundSnafu {
                missing: vec![target.identity.to_string()],
            })?;
            // The lookup identity is canonical, not the stored header.
            assembled.push(Column::new(target.identity.clone(), column.values));
        }

        let table = Table::new(self.index.clone(), assembled).context(ShapeSnafu)?;

        let range = rows.resolve(&self.index).context(SelectorSnafu)?;
        if range == (0..self.index.len()) {
            Ok(table)
        } else {
            Ok(table.slice_rows(range))
        }
    }

    /// Materialize the whole frame.
    pub fn read_all(&self) -> FrameResult<Table> {
        self.read(&RowSelector::All, &ColumnSelector::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::test_util::{count_capped, sample_table, ts};
    use crate::model::identity::ColumnIdentity;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn read_reorders_to_requested_order_across_chunks() -> TestResult {
        let tmp = TempDir::new()?;
        let frame = Frame::from_table(sample_table(4, 9), "t", tmp.path(), count_capped(3))?;
        assert_eq!(frame.chunk_count(), 3);

        // Ids from three different chunks, deliberately scrambled.
        let sel = ColumnSelector::ByIds(vec![ColumnId(8), ColumnId(1), ColumnId(5)]);
        let out = frame.read(&RowSelector::All, &sel)?;
        let keys: Vec<&str> = out.columns().iter().map(|c| c.identity.key.as_str()).collect();
        assert_eq!(keys, vec!["KEY8", "KEY1", "KEY5"]);
        assert_eq!(out.columns()[0].values[0], 8000.0);
        Ok(())
    }

    #[test]
    fn read_applies_row_slicing_after_assembly() -> TestResult {
        let tmp = TempDir::new()?;
        let frame = Frame::from_table(sample_table(5, 2), "t", tmp.path(), count_capped(3))?;

        let out = frame.read(&RowSelector::Positions(1..3), &ColumnSelector::All)?;
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.columns()[0].values, vec![1001.0, 1002.0]);

        let window = RowSelector::TimeRange { start: Some(ts(60)), end: Some(ts(180)) };
        let out = frame.read(&window, &ColumnSelector::All)?;
        assert_eq!(out.row_count(), 3);
        Ok(())
    }

    #[test]
    fn read_unknown_identity_lists_it() -> TestResult {
        let tmp = TempDir::new()?;
        let frame = Frame::from_table(sample_table(2, 2), "t", tmp.path(), count_capped(3))?;

        let ghost = ColumnIdentity::simple(77, "SUMMARY", "GHOST", "unit");
        let err = frame
            .read(&RowSelector::All, &ColumnSelector::ByIdentities(vec![ghost]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("GHOST"), "message should list the identity: {msg}");
        Ok(())
    }

    #[test]
    fn read_empty_frame_yields_index_only() -> TestResult {
        let tmp = TempDir::new()?;
        let frame = Frame::from_table(sample_table(3, 0), "t", tmp.path(), count_capped(3))?;
        let out = frame.read_all()?;
        assert_eq!(out.column_count(), 0);
        assert_eq!(out.row_count(), 3);
        Ok(())
    }
}
