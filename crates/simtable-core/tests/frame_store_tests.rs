//! Integration tests for the chunked frame store.
//!
//! These validate the end-to-end properties the store promises:
//! - round-trips across 1, 2, and >10 chunks,
//! - persistence round-trips through the on-disk layout,
//! - column conservation under insert/drop sequences,
//! - chunk-count prediction and insert placement,
//! - the load-time integrity check.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use simtable_core::chunking::ChunkingPolicy;
use simtable_core::frame::{Frame, FrameError};
use simtable_core::model::{
    Column, ColumnId, ColumnIdentity, ColumnSelector, DropSelector, RowIndex, RowSelector, Table,
};
use simtable_core::storage::StoreLocation;

type TestResult = Result<(), Box<dyn std::error::Error>>;

// =============================================================================
// Test Helpers
// =============================================================================

fn utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid UTC timestamp")
}

fn make_table(rows: usize, cols: usize) -> Table {
    let index = RowIndex::Timestamps((0..rows as i64).map(|r| utc(3600 * r)).collect());
    let columns = (1..=cols as i64)
        .map(|c| {
            Column::new(
                ColumnIdentity::full(c, "SUMMARY", format!("WVAR:{c}"), "rate", "SM3/DAY"),
                (0..rows as i64).map(|r| c as f64 + r as f64 / 10.0).collect(),
            )
        })
        .collect();
    Table::new(index, columns).expect("valid table")
}

fn capped(max_columns: usize) -> ChunkingPolicy {
    ChunkingPolicy { max_chunk_kb: 1024, max_columns_per_chunk: max_columns }
}

// =============================================================================
// Round-trip
// =============================================================================

/// Test: read(from_table(T)) reproduces T exactly for frames spanning
/// zero, one, and many chunks.
#[test]
fn roundtrip_across_chunk_counts() -> TestResult {
    for (rows, cols, max_columns) in [
        (3, 0, 3),   // zero chunks
        (3, 2, 100), // one chunk
        (4, 5, 3),   // two chunks
        (2, 37, 3),  // >10 chunks
    ] {
        let tmp = TempDir::new()?;
        let table = make_table(rows, cols);
        let frame = Frame::from_table(table.clone(), "t", tmp.path(), capped(max_columns))?;
        assert_eq!(frame.read_all()?, table, "rows={rows} cols={cols} cap={max_columns}");
    }
    Ok(())
}

/// Test: the in-memory and degenerate single-chunk variants satisfy the
/// same contract as the file-backed store.
#[test]
fn storage_variants_agree() -> TestResult {
    let tmp = TempDir::new()?;
    let table = make_table(4, 7);

    let file = Frame::from_table(table.clone(), "t", tmp.path(), capped(3))?;
    let mut mem = Frame::from_table_in_memory(table.clone(), "t", capped(3))?;
    let mut direct = Frame::from_table_direct(table.clone(), "t")?;

    assert_eq!(file.read_all()?, table);
    assert_eq!(mem.read_all()?, table);
    assert_eq!(direct.read_all()?, table);
    assert_eq!(direct.chunk_count(), 1);

    // Same mutation contract everywhere.
    for frame in [&mut mem, &mut direct] {
        frame.insert_column(
            Some(0),
            ColumnIdentity::full(100, "SUMMARY", "NEW", "rate", "SM3/DAY"),
            vec![1.0, 2.0, 3.0, 4.0],
        )?;
        frame.drop_columns(&DropSelector::ByIds(vec![ColumnId(3)]))?;
        assert_eq!(frame.column_count(), 7);
        assert_eq!(frame.read_all()?.columns()[0].identity.key, "NEW");
    }
    Ok(())
}

// =============================================================================
// Persistence round-trip
// =============================================================================

/// Test: from_location(save(frame)) yields a frame whose read() output
/// equals the original's.
#[test]
fn persistence_roundtrip() -> TestResult {
    let tmp = TempDir::new()?;
    let table = make_table(5, 11);
    let frame = Frame::from_table(table, "wells", tmp.path(), capped(4))?;
    let expected = frame.read_all()?;
    drop(frame);

    let reloaded = Frame::from_location(StoreLocation::local(tmp.path().join("wells")), capped(4))?;
    assert_eq!(reloaded.read_all()?, expected);
    assert_eq!(reloaded.name(), "wells");
    Ok(())
}

// =============================================================================
// Column conservation
// =============================================================================

/// Test: after any sequence of inserts and drops, the identities
/// recoverable via read() equal the lookup index's set, with no
/// duplicates and no omissions.
#[test]
fn column_conservation_under_insert_and_drop() -> TestResult {
    let tmp = TempDir::new()?;
    let mut frame = Frame::from_table(make_table(3, 8), "t", tmp.path(), capped(3))?;

    frame.insert_column(
        Some(2),
        ColumnIdentity::full(50, "SUMMARY", "A", "rate", "SM3/DAY"),
        vec![0.1, 0.2, 0.3],
    )?;
    frame.drop_columns(&DropSelector::ByIds(vec![ColumnId(1), ColumnId(7)]))?;
    frame.insert_column(
        None,
        ColumnIdentity::full(51, "SUMMARY", "B", "rate", "SM3/DAY"),
        vec![1.1, 1.2, 1.3],
    )?;
    frame.drop_columns(&DropSelector::ByIds(vec![ColumnId(50)]))?;

    let read_identities = frame.read_all()?.identities();
    assert_eq!(read_identities, frame.column_identities());

    let mut ids: Vec<i64> = read_identities.iter().map(|i| i.id.0).collect();
    let unique: std::collections::HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len(), "no duplicate ids");
    ids.sort();
    assert_eq!(ids, vec![2, 3, 4, 5, 6, 8, 51]);
    Ok(())
}

// =============================================================================
// Chunk-count bound and placement
// =============================================================================

/// Test: predicted_chunk_count matches the chunk count from_table
/// actually produces, including edge cases.
#[test]
fn predicted_chunk_count_matches_actual() -> TestResult {
    let policy = ChunkingPolicy::default();
    for (rows, cols) in [(3, 0), (3, 1), (3, 100), (3, 101), (3, 1000), (2048, 130), (10_000, 7)] {
        let tmp = TempDir::new()?;
        let frame = Frame::from_table(make_table(rows, cols), "t", tmp.path(), policy)?;
        assert_eq!(
            frame.chunk_count(),
            policy.predicted_chunk_count(rows, cols),
            "rows={rows} cols={cols}"
        );
    }
    Ok(())
}

/// Test: inserting into a frame whose chunks are all at capacity creates
/// exactly one new chunk; a frame with a non-full chunk takes the column
/// into its smallest chunk without a new file.
#[test]
fn insert_placement() -> TestResult {
    let tmp = TempDir::new()?;
    // 6 columns at cap 3: two full chunks.
    let mut frame = Frame::from_table(make_table(2, 6), "full", tmp.path(), capped(3))?;
    assert_eq!(frame.chunk_count(), 2);
    frame.insert_column(
        None,
        ColumnIdentity::full(70, "SUMMARY", "N1", "rate", "SM3/DAY"),
        vec![1.0, 2.0],
    )?;
    assert_eq!(frame.chunk_count(), 3);

    // 7 columns at cap 3: chunks of 3, 3, 1. The next insert lands in the
    // one-column chunk.
    let mut frame = Frame::from_table(make_table(2, 7), "short", tmp.path(), capped(3))?;
    assert_eq!(frame.chunk_count(), 3);
    frame.insert_column(
        None,
        ColumnIdentity::full(71, "SUMMARY", "N2", "rate", "SM3/DAY"),
        vec![1.0, 2.0],
    )?;
    assert_eq!(frame.chunk_count(), 3);
    Ok(())
}

// =============================================================================
// Concrete scenario
// =============================================================================

/// Test: 3 timestamps x 14 columns at 3 columns per chunk produces 5
/// chunks (3,3,3,3,2); dropping the two columns of the last chunk removes
/// its file and leaves 4 chunks with 12 columns.
#[test]
fn fourteen_column_scenario() -> TestResult {
    let tmp = TempDir::new()?;
    let mut frame = Frame::from_table(make_table(3, 14), "t", tmp.path(), capped(3))?;

    assert_eq!(frame.chunk_count(), 5);
    let counts: Vec<usize> = frame
        .lookup()
        .chunks()
        .iter()
        .map(|chunk| {
            frame
                .lookup()
                .entries()
                .iter()
                .filter(|e| &e.chunk == chunk)
                .count()
        })
        .collect();
    assert_eq!(counts, vec![3, 3, 3, 3, 2]);

    let last_chunk = frame.lookup().chunks()[4].clone();
    let chunk_file = tmp.path().join("t").join(last_chunk.as_str());
    assert!(chunk_file.exists());

    // Ids 13 and 14 land alone in the last chunk.
    frame.drop_columns(&DropSelector::ByIds(vec![ColumnId(13), ColumnId(14)]))?;
    assert_eq!(frame.chunk_count(), 4);
    assert_eq!(frame.column_count(), 12);
    assert!(!chunk_file.exists());

    let out = frame.read_all()?;
    assert_eq!(out.column_count(), 12);
    Ok(())
}

// =============================================================================
// Integrity check
// =============================================================================

/// Test: deleting a chunk file referenced by a saved lookup index makes
/// from_location raise CorruptedData, with no half-open frame handle.
#[test]
fn integrity_check_on_missing_chunk() -> TestResult {
    let tmp = TempDir::new()?;
    let frame = Frame::from_table(make_table(3, 6), "t", tmp.path(), capped(2))?;
    let victim = frame.lookup().chunks()[1].clone();
    drop(frame);

    std::fs::remove_file(tmp.path().join("t").join(victim.as_str()))?;

    let result = Frame::from_location(StoreLocation::local(tmp.path().join("t")), capped(2));
    assert!(matches!(result, Err(FrameError::CorruptedData { .. })));
    Ok(())
}

// =============================================================================
// Read shapes
// =============================================================================

/// Test: row label slicing composes with column selection and preserves
/// requested column order across chunks.
#[test]
fn sliced_and_reordered_read() -> TestResult {
    let tmp = TempDir::new()?;
    let frame = Frame::from_table(make_table(6, 9), "t", tmp.path(), capped(3))?;

    let out = frame.read(
        &RowSelector::TimeRange { start: Some(utc(3600)), end: Some(utc(3600 * 3)) },
        &ColumnSelector::ByIds(vec![ColumnId(9), ColumnId(2)]),
    )?;

    assert_eq!(out.row_count(), 3);
    let ids: Vec<i64> = out.identities().iter().map(|i| i.id.0).collect();
    assert_eq!(ids, vec![9, 2]);
    assert_eq!(out.columns()[0].values, vec![9.1, 9.2, 9.3]);
    Ok(())
}
