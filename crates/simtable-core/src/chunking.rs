//! Chunk sizing and placement math.
//!
//! Pure layout decisions, no IO: how many columns fit one chunk under the
//! byte budget, and how a column range is partitioned into contiguous runs
//! at bulk-construction time.

/// Chunk sizing configuration, passed at frame construction.
///
/// These were process-wide constants in earlier designs; carrying them on
/// the frame keeps tests and callers from mutating global state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkingPolicy {
    /// Byte budget per chunk, in KiB.
    pub max_chunk_kb: usize,
    /// Hard cap on columns per chunk, regardless of byte budget.
    pub max_columns_per_chunk: usize,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self { max_chunk_kb: 1024, max_columns_per_chunk: 100 }
    }
}

impl ChunkingPolicy {
    /// A policy that never splits: everything lands in one chunk.
    pub fn monolithic() -> Self {
        Self { max_chunk_kb: usize::MAX / 1024, max_columns_per_chunk: usize::MAX }
    }

    /// Columns per chunk for a table with `rows` rows, assuming 8-byte
    /// float values: `ceil(max_kb * 1024 / (rows * 8))`, capped at
    /// `max_columns_per_chunk` and never below 1. A zero-row table
    /// degenerates to the column cap.
    pub fn columns_per_chunk(&self, rows: usize) -> usize {
        if rows == 0 {
            return self.max_columns_per_chunk.max(1);
        }
        let per_column = rows * 8;
        let budget = self.max_chunk_kb.saturating_mul(1024);
        let by_bytes = budget.div_ceil(per_column);
        by_bytes.clamp(1, self.max_columns_per_chunk.max(1))
    }

    /// Number of chunks bulk construction will produce for `rows` x
    /// `columns`: `ceil(columns / columns_per_chunk)`, zero for an empty
    /// column set.
    pub fn predicted_chunk_count(&self, rows: usize, columns: usize) -> usize {
        if columns == 0 {
            return 0;
        }
        columns.div_ceil(self.columns_per_chunk(rows))
    }
}

/// Partition `0..count` into contiguous runs of at most `width`.
pub(crate) fn contiguous_runs(count: usize, width: usize) -> Vec<std::ops::Range<usize>> {
    let width = width.max(1);
    let mut runs = Vec::with_capacity(count.div_ceil(width));
    let mut start = 0;
    while start < count {
        let end = (start + width).min(count);
        runs.push(start..end);
        start = end;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_budget_drives_width_for_tall_tables() {
        let policy = ChunkingPolicy::default();
        // 1 MiB budget / (1_000_000 rows * 8 bytes) rounds up to 1 column.
        assert_eq!(policy.columns_per_chunk(1_000_000), 1);
        // 16 KiB per column -> 64 columns fit the budget.
        assert_eq!(policy.columns_per_chunk(2048), 64);
    }

    #[test]
    fn column_cap_wins_for_short_tables() {
        let policy = ChunkingPolicy::default();
        // 3 rows: the byte budget would allow tens of thousands.
        assert_eq!(policy.columns_per_chunk(3), 100);
        assert_eq!(policy.columns_per_chunk(0), 100);
    }

    #[test]
    fn predicted_chunk_count_edges() {
        let policy = ChunkingPolicy::default();
        assert_eq!(policy.predicted_chunk_count(10, 0), 0);
        assert_eq!(policy.predicted_chunk_count(10, 1), 1);
        assert_eq!(policy.predicted_chunk_count(3, 1000), 10);

        let narrow = ChunkingPolicy { max_chunk_kb: 1024, max_columns_per_chunk: 3 };
        assert_eq!(narrow.predicted_chunk_count(3, 14), 5);
    }

    #[test]
    fn runs_cover_without_overlap() {
        assert_eq!(contiguous_runs(14, 3), vec![0..3, 3..6, 6..9, 9..12, 12..14]);
        assert_eq!(contiguous_runs(0, 3), Vec::<std::ops::Range<usize>>::new());
        assert_eq!(contiguous_runs(2, 5), vec![0..2]);
    }
}
