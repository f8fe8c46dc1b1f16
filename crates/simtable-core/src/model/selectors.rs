//! Row and column selectors.
//!
//! Callers address columns in four interchangeable shapes and rows in
//! three; each selector is resolved once to canonical positions or
//! identities before any IO happens, so chunk reads never see selector
//! polymorphism.

use chrono::{DateTime, Utc};
use snafu::prelude::*;

use crate::model::identity::{ColumnId, ColumnIdentity, IdentityField};
use crate::model::table::RowIndex;

/// Column selection, resolved against the lookup index before IO.
#[derive(Clone, Debug)]
pub enum ColumnSelector {
    /// Every column, in lookup-index order.
    All,
    /// Columns by id, in the given order.
    ByIds(Vec<ColumnId>),
    /// A boolean mask aligned to the current column order.
    ByMask(Vec<bool>),
    /// Columns by full identity tuple, in the given order.
    ByIdentities(Vec<ColumnIdentity>),
}

/// Column selection for drops.
#[derive(Clone, Debug)]
pub enum DropSelector {
    /// Drop exactly these identities.
    ByIdentities(Vec<ColumnIdentity>),
    /// Drop the columns with these ids.
    ByIds(Vec<ColumnId>),
    /// Drop every column whose `field` value is in `values`.
    ByField {
        /// The identity field to match on.
        field: IdentityField,
        /// Values to match; columns matching any of them are dropped.
        values: Vec<String>,
    },
}

/// Row selection, applied after column assembly.
#[derive(Clone, Debug, Default)]
pub enum RowSelector {
    /// Every row.
    #[default]
    All,
    /// A half-open positional range.
    Positions(std::ops::Range<usize>),
    /// An inclusive label range over a timestamp index; `None` bounds are
    /// unbounded on that side.
    TimeRange {
        /// Inclusive lower bound.
        start: Option<DateTime<Utc>>,
        /// Inclusive upper bound.
        end: Option<DateTime<Utc>>,
    },
}

impl RowSelector {
    /// Resolve to a positional range over `index`.
    pub fn resolve(&self, index: &RowIndex) -> Result<std::ops::Range<usize>, SelectorError> {
        match self {
            RowSelector::All => Ok(0..index.len()),
            RowSelector::Positions(range) => {
                ensure!(
                    range.start <= range.end && range.end <= index.len(),
                    PositionsOutOfRangeSnafu { start: range.start, end: range.end, rows: index.len() }
                );
                Ok(range.clone())
            }
            RowSelector::TimeRange { start, end } => {
                let ts = match index {
                    RowIndex::Timestamps(ts) => ts,
                    RowIndex::Range(_) => return NotTimeIndexedSnafu.fail(),
                };
                // Monotonic non-decreasing index: binary search the bounds.
                let lo = match start {
                    Some(s) => ts.partition_point(|t| t < s),
                    None => 0,
                };
                let hi = match end {
                    Some(e) => ts.partition_point(|t| t <= e),
                    None => ts.len(),
                };
                Ok(lo..hi.max(lo))
            }
        }
    }
}

/// Selector inputs rejected before any IO.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SelectorError {
    /// A positional row range does not fit the current index.
    #[snafu(display("Row positions {start}..{end} out of range for {rows} rows"))]
    PositionsOutOfRange {
        /// Requested start position.
        start: usize,
        /// Requested end position.
        end: usize,
        /// Current row count.
        rows: usize,
    },

    /// A time-label range was used against a plain range index.
    #[snafu(display("Time-label selection requires a timestamp row index"))]
    NotTimeIndexed,

    /// A boolean mask's length differs from the current column count.
    #[snafu(display("Column mask has {actual} entries, expected {expected}"))]
    MaskLength {
        /// Current column count.
        expected: usize,
        /// Mask length supplied.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn positions_validated_against_len() {
        let idx = RowIndex::sequential(4);
        assert_eq!(RowSelector::Positions(1..3).resolve(&idx).unwrap(), 1..3);
        let err = RowSelector::Positions(2..5).resolve(&idx).unwrap_err();
        assert!(matches!(err, SelectorError::PositionsOutOfRange { .. }));
    }

    #[test]
    fn time_range_is_inclusive_both_ends() {
        let idx = RowIndex::Timestamps(vec![ts(10), ts(20), ts(30), ts(40)]);
        let sel = RowSelector::TimeRange { start: Some(ts(20)), end: Some(ts(30)) };
        assert_eq!(sel.resolve(&idx).unwrap(), 1..3);

        let open = RowSelector::TimeRange { start: None, end: Some(ts(25)) };
        assert_eq!(open.resolve(&idx).unwrap(), 0..2);
    }

    #[test]
    fn time_range_rejected_on_range_index() {
        let idx = RowIndex::sequential(3);
        let sel = RowSelector::TimeRange { start: None, end: None };
        assert!(matches!(
            sel.resolve(&idx).unwrap_err(),
            SelectorError::NotTimeIndexed
        ));
    }

    #[test]
    fn empty_time_window_resolves_to_empty_range() {
        let idx = RowIndex::Timestamps(vec![ts(10), ts(20)]);
        let sel = RowSelector::TimeRange { start: Some(ts(12)), end: Some(ts(15)) };
        let r = sel.resolve(&idx).unwrap();
        assert!(r.is_empty());
    }
}
