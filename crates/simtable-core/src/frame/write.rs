//! Mutation paths: cell writes, column insert/drop, row-index replacement,
//! and column renames.
//!
//! Every operation validates its inputs fully before touching storage.
//! Multi-chunk rewrites that replace shared state (row index, headers) run
//! in two phases: compute every (chunk, new content) pair first, then
//! commit the rewrites, so a mid-operation IO failure is explicit and
//! auditable rather than interleaved with planning. There is still no
//! multi-chunk atomicity: a failure between commits leaves the frame
//! inconsistent, and callers must treat it as fatal to this instance.

use std::collections::{HashMap, HashSet};

use log::warn;
use snafu::prelude::*;

use crate::frame::Frame;
use crate::frame::error::{
    ArityMismatchSnafu, ColumnNotFoundSnafu, DuplicateColumnSnafu, FrameResult,
    InvalidPositionSnafu, InvalidRenameSnafu, LengthMismatchSnafu, SelectorSnafu, ShapeSnafu,
    StoreSnafu, ValueCountSnafu,
};
use crate::model::identity::{ColumnId, ColumnIdentity};
use crate::model::selectors::{ColumnSelector, DropSelector, RowSelector};
use crate::model::table::{Column, RowIndex, Table};
use crate::store::ChunkName;

impl Frame {
    /// Overwrite cells of existing columns.
    ///
    /// `values` holds one vector per addressed column, each matching the
    /// addressed row count. Affected chunks are read in full, patched, and
    /// rewritten with replace semantics.
    pub fn write(
        &mut self,
        rows: &RowSelector,
        columns: &ColumnSelector,
        values: &[Vec<f64>],
    ) -> FrameResult<()> {
        let targets = self.lookup.resolve(columns)?;
        let range = rows.resolve(&self.index).context(SelectorSnafu)?;

        ensure!(
            values.len() == targets.len(),
            ValueCountSnafu { expected: targets.len(), actual: values.len() }
        );
        for vals in values {
            ensure!(
                vals.len() == range.len(),
                LengthMismatchSnafu { expected: range.len(), actual: vals.len() }
            );
        }

        let mut order: Vec<ChunkName> = Vec::new();
        let mut groups: HashMap<ChunkName, Vec<(ColumnId, usize)>> = HashMap::new();
        for (i, target) in targets.iter().enumerate() {
            groups
                .entry(target.chunk.clone())
                .or_insert_with(|| {
                    order.push(target.chunk.clone());
                    Vec::new()
                })
                .push((target.identity.id, i));
        }

        for chunk in &order {
            let mut table = self.store.read(chunk, None).context(StoreSnafu)?;
            for (id, value_idx) in &groups[chunk] {
                let column = table.column_mut(*id).context(ColumnNotFoundSnafu {
                    missing: vec![id.to_string()],
                })?;
                column.values[range.clone()].copy_from_slice(&values[*value_idx]);
            }
            self.store.write(chunk, &table).context(StoreSnafu)?;
        }

        Ok(())
    }

    /// Insert a new column at a logical position.
    ///
    /// `position` of `None` (or equal to the current column count) appends
    /// at the end; anything larger is an error. A value count that does
    /// not match the row count is logged and skipped rather than failing
    /// the caller, matching the severity of "skip a bad column".
    ///
    /// Placement is a greedy best-fit by column count: the chunk with the
    /// fewest columns takes the new one, and a fresh chunk is only created
    /// when every existing chunk is at capacity (or none exists). Chunks
    /// may therefore drift past the construction-time byte budget.
    pub fn insert_column(
        &mut self,
        position: Option<usize>,
        identity: ColumnIdentity,
        values: Vec<f64>,
    ) -> FrameResult<()> {
        ensure!(
            !self.lookup.contains(identity.id),
            DuplicateColumnSnafu { id: identity.id }
        );
        if let Some(full) = self.lookup.arity_full() {
            ensure!(identity.is_full() == full, ArityMismatchSnafu { id: identity.id });
        }

        let columns = self.lookup.len();
        let position = position.unwrap_or(columns);
        ensure!(position <= columns, InvalidPositionSnafu { position, columns });

        if values.len() != self.index.len() {
            warn!(
                "skipping insert of column {}: {} values for {} rows",
                identity,
                values.len(),
                self.index.len()
            );
            return Ok(());
        }

        let target = self
            .lookup
            .chunk_counts()
            .into_iter()
            .filter(|(_, count)| *count < self.columns_per_chunk)
            .min_by_key(|(_, count)| *count)
            .map(|(chunk, _)| chunk);

        let chunk = match target {
            Some(chunk) => {
                let mut table = self.store.read(&chunk, None).context(StoreSnafu)?;
                table.push_column(Column::new(identity.clone(), values));
                self.store.write(&chunk, &table).context(StoreSnafu)?;
                chunk
            }
            None => {
                let chunk = self.fresh_chunk_name();
                let table = Table::new(
                    self.index.clone(),
                    vec![Column::new(identity.clone(), values)],
                )
                .context(ShapeSnafu)?;
                self.store.write(&chunk, &table).context(StoreSnafu)?;
                chunk
            }
        };

        self.lookup.insert(position, identity, chunk);
        self.persist_lookup()
    }

    /// Drop columns by identity, id, or an identity-field value set.
    ///
    /// Chunks left empty are deleted from storage entirely. Explicitly
    /// named ids and identities must exist; a field-value filter matching
    /// nothing is a no-op.
    pub fn drop_columns(&mut self, selector: &DropSelector) -> FrameResult<()> {
        let ids = self.resolve_drop(selector)?;
        if ids.is_empty() {
            return Ok(());
        }
        let id_set: HashSet<ColumnId> = ids.into_iter().collect();

        let affected: Vec<ChunkName> = {
            let mut seen = HashSet::new();
            self.lookup
                .entries()
                .iter()
                .filter(|e| id_set.contains(&e.identity.id))
                .filter(|e| seen.insert(e.chunk.clone()))
                .map(|e| e.chunk.clone())
                .collect()
        };

        for chunk in &affected {
            let remaining = self
                .lookup
                .entries()
                .iter()
                .filter(|e| &e.chunk == chunk)
                .filter(|e| !id_set.contains(&e.identity.id))
                .count();

            if remaining == 0 {
                self.store.delete(chunk).context(StoreSnafu)?;
            } else {
                let mut table = self.store.read(chunk, None).context(StoreSnafu)?;
                table.retain_columns(|identity| !id_set.contains(&identity.id));
                self.store.write(chunk, &table).context(StoreSnafu)?;
            }
        }

        self.lookup.remove_ids(&id_set);
        self.persist_lookup()
    }

    fn resolve_drop(&self, selector: &DropSelector) -> FrameResult<Vec<ColumnId>> {
        match selector {
            DropSelector::ByIds(ids) => {
                let missing: Vec<String> = ids
                    .iter()
                    .filter(|id| !self.lookup.contains(**id))
                    .map(|id| id.to_string())
                    .collect();
                ensure!(missing.is_empty(), ColumnNotFoundSnafu { missing });
                Ok(ids.clone())
            }
            DropSelector::ByIdentities(identities) => {
                let resolved = self
                    .lookup
                    .resolve(&ColumnSelector::ByIdentities(identities.clone()))?;
                Ok(resolved.into_iter().map(|e| e.identity.id).collect())
            }
            DropSelector::ByField { field, values } => Ok(self
                .lookup
                .entries()
                .iter()
                .filter(|e| values.iter().any(|v| field.matches(&e.identity, v)))
                .map(|e| e.identity.id)
                .collect()),
        }
    }

    /// Replace the shared row index across every chunk.
    ///
    /// A length mismatch is a hard failure before any IO: accepting it
    /// would leave the whole table inconsistent.
    pub fn set_row_index(&mut self, new_index: RowIndex) -> FrameResult<()> {
        ensure!(
            new_index.len() == self.index.len(),
            LengthMismatchSnafu { expected: self.index.len(), actual: new_index.len() }
        );

        let chunks = self.lookup.chunks();
        let mut rewrites = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let table = self.store.read(&chunk, None).context(StoreSnafu)?;
            rewrites.push((chunk, table.replace_index(new_index.clone())));
        }

        for (chunk, table) in &rewrites {
            self.store.write(chunk, table).context(StoreSnafu)?;
        }

        self.index = new_index;
        self.persist_row_index()
    }

    /// Rewrite column identities according to `mapping`, preserving
    /// logical order. Each mapping entry must reference an existing id,
    /// keep that id, and keep the frame's identity arity.
    pub fn rename_columns(
        &mut self,
        mapping: &HashMap<ColumnId, ColumnIdentity>,
    ) -> FrameResult<()> {
        let mut missing: Vec<String> = mapping
            .keys()
            .filter(|id| !self.lookup.contains(**id))
            .map(|id| id.to_string())
            .collect();
        missing.sort();
        ensure!(missing.is_empty(), ColumnNotFoundSnafu { missing });

        let arity = self.lookup.arity_full();
        for (id, identity) in mapping {
            ensure!(identity.id == *id, InvalidRenameSnafu { id: *id });
            if let Some(full) = arity {
                ensure!(identity.is_full() == full, ArityMismatchSnafu { id: *id });
            }
        }

        let affected: Vec<ChunkName> = {
            let mut seen = HashSet::new();
            self.lookup
                .entries()
                .iter()
                .filter(|e| mapping.contains_key(&e.identity.id))
                .filter(|e| seen.insert(e.chunk.clone()))
                .map(|e| e.chunk.clone())
                .collect()
        };

        let mut rewrites = Vec::with_capacity(affected.len());
        for chunk in affected {
            let table = self.store.read(&chunk, None).context(StoreSnafu)?;
            let (index, columns) = table.into_parts();
            let renamed = columns
                .into_iter()
                .map(|mut column| {
                    if let Some(identity) = mapping.get(&column.identity.id) {
                        column.identity = identity.clone();
                    }
                    column
                })
                .collect();
            rewrites.push((chunk, Table::new(index, renamed).context(ShapeSnafu)?));
        }

        for (chunk, table) in &rewrites {
            self.store.write(chunk, table).context(StoreSnafu)?;
        }

        for (id, identity) in mapping {
            self.lookup.rename(*id, identity.clone());
        }
        self.persist_lookup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::test_util::{count_capped, sample_table};
    use crate::model::identity::IdentityField;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn ident(id: i64, key: &str) -> ColumnIdentity {
        ColumnIdentity::simple(id, "SUMMARY", key, "unit")
    }

    #[test]
    fn write_patches_only_addressed_cells() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(4, 4), "t", tmp.path(), count_capped(2))?;

        frame.write(
            &RowSelector::Positions(1..3),
            &ColumnSelector::ByIds(vec![ColumnId(2)]),
            &[vec![-1.0, -2.0]],
        )?;

        let out = frame.read_all()?;
        assert_eq!(out.column(ColumnId(2)).unwrap().values, vec![2000.0, -1.0, -2.0, 2003.0]);
        // Neighbor in the same chunk untouched.
        assert_eq!(out.column(ColumnId(1)).unwrap().values[1], 1001.0);
        Ok(())
    }

    #[test]
    fn write_rejects_bad_shapes_before_io() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(3, 2), "t", tmp.path(), count_capped(2))?;

        let err = frame
            .write(
                &RowSelector::All,
                &ColumnSelector::ByIds(vec![ColumnId(1)]),
                &[vec![0.0; 3], vec![0.0; 3]],
            )
            .unwrap_err();
        assert!(matches!(err, crate::frame::FrameError::ValueCount { .. }));

        let err = frame
            .write(
                &RowSelector::All,
                &ColumnSelector::ByIds(vec![ColumnId(1)]),
                &[vec![0.0; 2]],
            )
            .unwrap_err();
        assert!(matches!(err, crate::frame::FrameError::LengthMismatch { .. }));
        Ok(())
    }

    #[test]
    fn insert_into_full_chunks_creates_exactly_one_new_chunk() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(2, 4), "t", tmp.path(), count_capped(2))?;
        assert_eq!(frame.chunk_count(), 2);

        frame.insert_column(None, ident(10, "NEW"), vec![1.0, 2.0])?;
        assert_eq!(frame.chunk_count(), 3);
        assert_eq!(frame.column_count(), 5);
        Ok(())
    }

    #[test]
    fn insert_prefers_smallest_chunk_without_new_file() -> TestResult {
        let tmp = TempDir::new()?;
        // 5 columns at width 2 -> chunks of 2, 2, 1.
        let mut frame = Frame::from_table(sample_table(2, 5), "t", tmp.path(), count_capped(2))?;
        assert_eq!(frame.chunk_count(), 3);

        frame.insert_column(None, ident(10, "NEW"), vec![1.0, 2.0])?;
        assert_eq!(frame.chunk_count(), 3);

        // The short chunk took the column and is now at capacity.
        let counts: Vec<usize> = frame.lookup().chunk_counts().iter().map(|(_, n)| *n).collect();
        assert_eq!(counts, vec![2, 2, 2]);
        Ok(())
    }

    #[test]
    fn insert_at_position_changes_logical_order_only() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(2, 3), "t", tmp.path(), count_capped(2))?;

        frame.insert_column(Some(1), ident(10, "NEW"), vec![1.0, 2.0])?;
        let keys: Vec<String> =
            frame.column_identities().iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec!["KEY1", "NEW", "KEY2", "KEY3"]);

        let out = frame.read_all()?;
        assert_eq!(out.columns()[1].identity.key, "NEW");

        let err = frame
            .insert_column(Some(99), ident(11, "BAD"), vec![1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, crate::frame::FrameError::InvalidPosition { .. }));
        Ok(())
    }

    #[test]
    fn insert_with_wrong_length_is_a_logged_noop() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(3, 2), "t", tmp.path(), count_capped(2))?;

        frame.insert_column(None, ident(10, "SHORT"), vec![1.0])?;
        assert_eq!(frame.column_count(), 2);
        assert!(!frame.lookup().contains(ColumnId(10)));
        Ok(())
    }

    #[test]
    fn insert_duplicate_id_is_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(2, 2), "t", tmp.path(), count_capped(2))?;

        let err = frame
            .insert_column(None, ident(1, "DUP"), vec![1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, crate::frame::FrameError::DuplicateColumn { .. }));
        Ok(())
    }

    #[test]
    fn drop_to_empty_removes_chunk_file() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(2, 5), "t", tmp.path(), count_capped(2))?;
        // Chunks: (1,2), (3,4), (5).
        let chunk_dir = tmp.path().join("t");
        let before = std::fs::read_dir(&chunk_dir)?.count();

        frame.drop_columns(&DropSelector::ByIds(vec![ColumnId(5)]))?;
        assert_eq!(frame.chunk_count(), 2);
        assert_eq!(frame.column_count(), 4);
        assert_eq!(std::fs::read_dir(&chunk_dir)?.count(), before - 1);

        // Sibling chunks still readable.
        let out = frame.read_all()?;
        assert_eq!(out.column_count(), 4);
        Ok(())
    }

    #[test]
    fn drop_by_field_matches_value_set() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(2, 4), "t", tmp.path(), count_capped(2))?;

        frame.drop_columns(&DropSelector::ByField {
            field: IdentityField::Key,
            values: vec!["KEY1".to_string(), "KEY3".to_string()],
        })?;
        let keys: Vec<String> =
            frame.column_identities().iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec!["KEY2", "KEY4"]);

        // No matches: a no-op, not an error.
        frame.drop_columns(&DropSelector::ByField {
            field: IdentityField::Key,
            values: vec!["ABSENT".to_string()],
        })?;
        assert_eq!(frame.column_count(), 2);
        Ok(())
    }

    #[test]
    fn drop_unknown_id_is_an_error() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(2, 2), "t", tmp.path(), count_capped(2))?;

        let err = frame
            .drop_columns(&DropSelector::ByIds(vec![ColumnId(99)]))
            .unwrap_err();
        assert!(matches!(err, crate::frame::FrameError::ColumnNotFound { .. }));
        assert_eq!(frame.column_count(), 2);
        Ok(())
    }

    #[test]
    fn set_row_index_rewrites_every_chunk() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(3, 4), "t", tmp.path(), count_capped(2))?;

        frame.set_row_index(RowIndex::Range(vec![100, 200, 300]))?;
        let out = frame.read_all()?;
        assert_eq!(out.index(), &RowIndex::Range(vec![100, 200, 300]));
        assert_eq!(out.column(ColumnId(4)).unwrap().values, vec![4000.0, 4001.0, 4002.0]);

        let err = frame.set_row_index(RowIndex::Range(vec![1, 2])).unwrap_err();
        assert!(matches!(err, crate::frame::FrameError::LengthMismatch { .. }));
        Ok(())
    }

    #[test]
    fn rename_updates_headers_and_lookup_in_order() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(2, 3), "t", tmp.path(), count_capped(2))?;

        let mut mapping = HashMap::new();
        mapping.insert(ColumnId(2), ident(2, "RENAMED"));
        frame.rename_columns(&mapping)?;

        let keys: Vec<String> =
            frame.column_identities().iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec!["KEY1", "RENAMED", "KEY3"]);

        // The stored header changed too: reading by the new identity works.
        let out = frame.read(
            &RowSelector::All,
            &ColumnSelector::ByIdentities(vec![ident(2, "RENAMED")]),
        )?;
        assert_eq!(out.columns()[0].values, vec![2000.0, 2001.0]);
        Ok(())
    }

    #[test]
    fn rename_validates_before_any_rewrite() -> TestResult {
        let tmp = TempDir::new()?;
        let mut frame = Frame::from_table(sample_table(2, 2), "t", tmp.path(), count_capped(2))?;

        let mut mapping = HashMap::new();
        mapping.insert(ColumnId(1), ident(7, "CHANGED_ID"));
        let err = frame.rename_columns(&mapping).unwrap_err();
        assert!(matches!(err, crate::frame::FrameError::InvalidRename { .. }));

        let mut mapping = HashMap::new();
        mapping.insert(ColumnId(99), ident(99, "GHOST"));
        let err = frame.rename_columns(&mapping).unwrap_err();
        assert!(matches!(err, crate::frame::FrameError::ColumnNotFound { .. }));
        Ok(())
    }
}
