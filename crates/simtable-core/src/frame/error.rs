//! Error types and SNAFU context selectors for frame operations.
//!
//! This module centralizes the `FrameError` enum used by the public frame
//! API and exposes context selectors with crate visibility so the sibling
//! read/write/persist modules can attach context without re-exporting
//! everything at the crate root.

use snafu::prelude::*;

use crate::codec::CodecError;
use crate::model::identity::ColumnId;
use crate::model::selectors::SelectorError;
use crate::model::table::TableShapeError;
use crate::storage::StorageError;
use crate::store::StoreError;

/// Result type for frame operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Errors from high-level frame operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FrameError {
    /// A read, drop, or rename referenced identities absent from the
    /// lookup index. Recoverable: retry with fewer columns.
    #[snafu(display("Columns not found: {}", missing.join(", ")))]
    ColumnNotFound {
        /// Display forms of the missing ids or identities.
        missing: Vec<String>,
    },

    /// A selector was malformed for the current frame shape.
    #[snafu(display("Invalid selector: {source}"))]
    Selector {
        /// Underlying selector error.
        source: SelectorError,
    },

    /// A value vector's length does not match the addressed row count, or
    /// a replacement row index does not match the current row count.
    #[snafu(display("Length mismatch: expected {expected}, got {actual}"))]
    LengthMismatch {
        /// Expected length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// The number of value vectors does not match the number of addressed
    /// columns.
    #[snafu(display("Expected values for {expected} columns, got {actual}"))]
    ValueCount {
        /// Number of addressed columns.
        expected: usize,
        /// Number of value vectors supplied.
        actual: usize,
    },

    /// An insert position is outside `0..=column_count`.
    #[snafu(display("Invalid column position {position} for {columns} columns"))]
    InvalidPosition {
        /// The requested position.
        position: usize,
        /// Current column count.
        columns: usize,
    },

    /// An inserted column's id already exists in the frame.
    #[snafu(display("Column id {id} already exists"))]
    DuplicateColumn {
        /// The duplicated id.
        id: ColumnId,
    },

    /// An inserted or renamed identity's arity (simple vs full) differs
    /// from the frame's.
    #[snafu(display("Column {id} does not match the frame's identity arity"))]
    ArityMismatch {
        /// Id of the offending column.
        id: ColumnId,
    },

    /// A rename mapping entry tries to change the column's id.
    #[snafu(display("Rename for column {id} must keep the same id"))]
    InvalidRename {
        /// The id whose mapping is invalid.
        id: ColumnId,
    },

    /// A side file or a chunk file referenced by the lookup index is
    /// absent at load time. Not recoverable; the partially constructed
    /// frame is discarded before this propagates.
    #[snafu(display("Corrupted data: missing {}", missing.join(", ")))]
    CorruptedData {
        /// Paths of the missing files.
        missing: Vec<String>,
    },

    /// A side file exists but its contents do not parse.
    #[snafu(display("Malformed side file {path}: {detail}"))]
    SideFileFormat {
        /// Path of the malformed file.
        path: String,
        /// What failed to parse.
        detail: String,
    },

    /// Chunk storage failure during a read or rewrite. Mid-operation
    /// failures leave the frame inconsistent; callers must treat them as
    /// fatal to this frame instance.
    #[snafu(display("Chunk store error: {source}"))]
    Store {
        /// Underlying store error.
        #[snafu(source, backtrace)]
        source: StoreError,
    },

    /// Filesystem failure while handling side files.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(source, backtrace)]
        source: StorageError,
    },

    /// Codec failure while decoding a side file.
    #[snafu(display("Side-file codec error: {source}"))]
    Codec {
        /// Underlying codec error.
        #[snafu(source, backtrace)]
        source: CodecError,
    },

    /// Assembled columns violated table shape invariants.
    #[snafu(display("Table shape error: {source}"))]
    Shape {
        /// Underlying shape error.
        source: TableShapeError,
    },

    /// The operation requires a file-backed frame.
    #[snafu(display("Frame {name} is not file-backed"))]
    NotFileBacked {
        /// Name of the frame.
        name: String,
    },

    /// Archive writing failure.
    #[snafu(display("Archive error at {path}: {source}"))]
    Archive {
        /// Path or entry being written.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
}
