//! The chunk codec: one column group to one Parquet file and back.
//!
//! A chunk file stores the frame's shared row index in a reserved leading
//! column plus one `Float64` column per logical column, named by the
//! identity's stable text header. The codec is stateless, pure IO:
//!
//! - [`encode_table`] builds a single `RecordBatch` and writes it through
//!   `ArrowWriter` into an in-memory buffer; callers persist the bytes
//!   however their storage medium requires.
//! - [`decode_table`] reads through `ParquetRecordBatchReaderBuilder` over
//!   `Bytes` with a `ProjectionMask`, so a read restricted to a column
//!   subset never materializes the chunk's unrequested columns.
//!
//! The row-index column's Arrow type distinguishes time-indexed tables
//! (millisecond timestamps) from plain range-indexed ones, so no extra
//! metadata is needed to reconstruct the index kind.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, RecordBatch, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use snafu::{Backtrace, prelude::*};

use crate::model::identity::{ColumnIdentity, IdentityError};
use crate::model::table::{Column, RowIndex, Table, TableShapeError};

/// Reserved name of the row-index column inside every chunk file.
///
/// Identity headers are JSON arrays and always start with `[`, so this name
/// cannot collide with a data column.
pub const INDEX_COLUMN: &str = "__index";

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors from encoding or decoding a chunk file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    /// Parquet reader/writer failure.
    #[snafu(display("Parquet error: {source}"))]
    Parquet {
        /// Underlying Parquet error.
        source: ParquetError,
        /// Backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// Arrow batch construction or iteration failure.
    #[snafu(display("Arrow error: {source}"))]
    Arrow {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// The reserved row-index column is absent from the file.
    #[snafu(display("Chunk file has no {INDEX_COLUMN} column"))]
    MissingIndexColumn,

    /// A requested column header is absent from the file.
    #[snafu(display("Chunk file has no column {header:?}"))]
    MissingColumn {
        /// The header that was requested but not found.
        header: String,
    },

    /// A column's physical type does not match the expected layout.
    #[snafu(display("Column {column:?} has unexpected type {datatype}"))]
    UnexpectedType {
        /// Name of the offending column.
        column: String,
        /// The Arrow type actually found.
        datatype: String,
    },

    /// A stored column header does not parse back to an identity.
    #[snafu(display("Bad column header in chunk file: {source}"))]
    Identity {
        /// Underlying header parse error.
        source: IdentityError,
    },

    /// A stored timestamp is outside the representable range.
    #[snafu(display("Stored timestamp {value} (ms) out of range"))]
    TimestampRange {
        /// The raw millisecond value.
        value: i64,
    },

    /// Decoded columns violate table shape invariants.
    #[snafu(display("Decoded chunk is not a valid table: {source}"))]
    Shape {
        /// Underlying shape error.
        source: TableShapeError,
    },
}

fn index_field(index: &RowIndex) -> (Field, ArrayRef) {
    match index {
        RowIndex::Timestamps(ts) => {
            let millis: Vec<i64> = ts.iter().map(|t| t.timestamp_millis()).collect();
            (
                Field::new(
                    INDEX_COLUMN,
                    DataType::Timestamp(TimeUnit::Millisecond, None),
                    false,
                ),
                Arc::new(TimestampMillisecondArray::from(millis)) as ArrayRef,
            )
        }
        RowIndex::Range(values) => (
            Field::new(INDEX_COLUMN, DataType::Int64, false),
            Arc::new(Int64Array::from(values.clone())) as ArrayRef,
        ),
    }
}

/// Encode one column group (row index plus columns) as Parquet bytes.
pub fn encode_table(table: &Table) -> CodecResult<Vec<u8>> {
    let (idx_field, idx_array) = index_field(table.index());

    let mut fields = Vec::with_capacity(table.column_count() + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.column_count() + 1);
    fields.push(idx_field);
    arrays.push(idx_array);

    for col in table.columns() {
        fields.push(Field::new(col.identity.to_header(), DataType::Float64, false));
        arrays.push(Arc::new(Float64Array::from(col.values.clone())) as ArrayRef);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context(ArrowSnafu)?;

    let mut buf = Vec::new();
    let props = WriterProperties::builder().build();
    let mut writer =
        ArrowWriter::try_new(&mut buf, schema, Some(props)).context(ParquetSnafu)?;
    writer.write(&batch).context(ParquetSnafu)?;
    writer.close().context(ParquetSnafu)?;

    Ok(buf)
}

fn float_values(name: &str, col: &ArrayRef) -> CodecResult<Vec<f64>> {
    let arr = col
        .as_any()
        .downcast_ref::<Float64Array>()
        .with_context(|| UnexpectedTypeSnafu {
            column: name.to_string(),
            datatype: col.data_type().to_string(),
        })?;
    let mut out = Vec::with_capacity(arr.len());
    for i in 0..arr.len() {
        out.push(if arr.is_null(i) { f64::NAN } else { arr.value(i) });
    }
    Ok(out)
}

/// Decode Parquet bytes back into a table.
///
/// `columns` restricts the read to the given identity headers (in the given
/// order) via projection pushdown; `None` reads every column in file order.
/// The row-index column is always read.
pub fn decode_table(bytes: Bytes, columns: Option<&[String]>) -> CodecResult<Table> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).context(ParquetSnafu)?;
    let schema = builder.schema().clone();

    let index_pos = schema.index_of(INDEX_COLUMN).ok().context(MissingIndexColumnSnafu)?;
    let index_type = schema.field(index_pos).data_type().clone();

    let headers: Vec<String> = match columns {
        Some(requested) => requested.to_vec(),
        None => schema
            .fields()
            .iter()
            .filter(|f| f.name() != INDEX_COLUMN)
            .map(|f| f.name().clone())
            .collect(),
    };

    let mut projection = vec![index_pos];
    for header in &headers {
        let pos = schema
            .index_of(header)
            .ok()
            .with_context(|| MissingColumnSnafu { header: header.clone() })?;
        projection.push(pos);
    }
    projection.sort_unstable();
    projection.dedup();

    let mask = ProjectionMask::roots(builder.parquet_schema(), projection);
    let reader = builder.with_projection(mask).build().context(ParquetSnafu)?;

    let mut raw_index: Vec<i64> = Vec::new();
    let mut values: HashMap<String, Vec<f64>> =
        headers.iter().map(|h| (h.clone(), Vec::new())).collect();

    for batch in reader {
        let batch = batch.context(ArrowSnafu)?;

        let idx_col = batch
            .column_by_name(INDEX_COLUMN)
            .context(MissingIndexColumnSnafu)?;
        match &index_type {
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                let arr = idx_col
                    .as_any()
                    .downcast_ref::<TimestampMillisecondArray>()
                    .with_context(|| UnexpectedTypeSnafu {
                        column: INDEX_COLUMN.to_string(),
                        datatype: idx_col.data_type().to_string(),
                    })?;
                raw_index.extend((0..arr.len()).map(|i| arr.value(i)));
            }
            DataType::Int64 => {
                let arr = idx_col
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .with_context(|| UnexpectedTypeSnafu {
                        column: INDEX_COLUMN.to_string(),
                        datatype: idx_col.data_type().to_string(),
                    })?;
                raw_index.extend((0..arr.len()).map(|i| arr.value(i)));
            }
            other => {
                return UnexpectedTypeSnafu {
                    column: INDEX_COLUMN.to_string(),
                    datatype: other.to_string(),
                }
                .fail();
            }
        }

        for header in &headers {
            let col = batch
                .column_by_name(header)
                .with_context(|| MissingColumnSnafu { header: header.clone() })?;
            let mut vals = float_values(header, col)?;
            values
                .get_mut(header)
                .with_context(|| MissingColumnSnafu { header: header.clone() })?
                .append(&mut vals);
        }
    }

    let index = match &index_type {
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            let mut ts: Vec<DateTime<Utc>> = Vec::with_capacity(raw_index.len());
            for millis in raw_index {
                let dt = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .context(TimestampRangeSnafu { value: millis })?;
                ts.push(dt);
            }
            RowIndex::Timestamps(ts)
        }
        _ => RowIndex::Range(raw_index),
    };

    let mut cols = Vec::with_capacity(headers.len());
    for header in &headers {
        let identity = ColumnIdentity::from_header(header).context(IdentitySnafu)?;
        let vals = values.remove(header).unwrap_or_default();
        cols.push(Column::new(identity, vals));
    }

    Table::new(index, cols).context(ShapeSnafu)
}
