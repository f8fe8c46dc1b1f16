//! Persistence envelope: side files, reload, integrity check, archiving.
//!
//! A file-backed frame's directory holds its chunk files plus three small
//! fixed-name side files:
//!
//! - [`ROW_INDEX_FILE`]: the shared row index, encoded through the chunk
//!   codec as a zero-column table.
//! - [`COLUMNS_FILE`]: the lookup index as a Parquet table of text columns
//!   (the numeric id stringified for the homogeneous-text header form and
//!   destringified on load), ordered to reflect logical column order.
//! - [`FRAME_META_FILE`]: a small JSON record with the owning table name
//!   and the frame's logical position within its collection.
//!
//! Reload reads the side files first and validates the *presence* of every
//! chunk the lookup index references before exposing any data; a missing
//! file raises `CorruptedData` and the partially constructed frame is
//! dropped. Presence is all the check promises: a truncated chunk is only
//! detected when its first read fails to parse. Chunk reads stay lazy.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use snafu::{Backtrace, prelude::*};

use crate::chunking::ChunkingPolicy;
use crate::codec::{self, CodecError};
use crate::frame::error::{
    ArchiveSnafu, CodecSnafu, CorruptedDataSnafu, FrameError, FrameResult, NotFileBackedSnafu,
    StorageSnafu,
};
use crate::frame::lookup::{LookupEntry, LookupIndex};
use crate::frame::Frame;
use crate::model::table::Table;
use crate::storage::{self, StoreLocation};
use crate::store::{ChunkName, FileChunkStore};

/// Fixed name of the row-index side file.
pub const ROW_INDEX_FILE: &str = "_row_index.parquet";
/// Fixed name of the lookup-index side file.
pub const COLUMNS_FILE: &str = "_columns.parquet";
/// Fixed name of the frame metadata record.
pub const FRAME_META_FILE: &str = "_frame.json";

/// The JSON metadata record accompanying a frame on disk.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FrameMeta {
    /// Owning table name.
    pub table: String,
    /// Logical position within the table collection.
    pub position: usize,
}

fn parquet_err(source: parquet::errors::ParquetError) -> FrameError {
    FrameError::Codec {
        source: CodecError::Parquet { source, backtrace: Backtrace::capture() },
    }
}

fn arrow_err(source: arrow::error::ArrowError) -> FrameError {
    FrameError::Codec { source: CodecError::Arrow { source } }
}

fn side_file_err(path: &str, detail: impl Into<String>) -> FrameError {
    FrameError::SideFileFormat { path: path.to_string(), detail: detail.into() }
}

fn encode_lookup(lookup: &LookupIndex) -> FrameResult<Vec<u8>> {
    let full = lookup.arity_full().unwrap_or(false);
    let entries = lookup.entries();

    let mut fields = vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("table", DataType::Utf8, false),
        Field::new("key", DataType::Utf8, false),
    ];
    if full {
        fields.push(Field::new("type", DataType::Utf8, false));
    }
    fields.push(Field::new("units", DataType::Utf8, false));
    fields.push(Field::new("chunk", DataType::Utf8, false));

    let ids: Vec<String> = entries.iter().map(|e| e.identity.id.0.to_string()).collect();
    let tables: Vec<String> = entries.iter().map(|e| e.identity.table.clone()).collect();
    let keys: Vec<String> = entries.iter().map(|e| e.identity.key.clone()).collect();
    let units: Vec<String> = entries.iter().map(|e| e.identity.units.clone()).collect();
    let chunks: Vec<String> = entries.iter().map(|e| e.chunk.as_str().to_string()).collect();

    let mut arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(tables)),
        Arc::new(StringArray::from(keys)),
    ];
    if full {
        let kinds: Vec<String> = entries
            .iter()
            .map(|e| e.identity.kind.clone().unwrap_or_default())
            .collect();
        arrays.push(Arc::new(StringArray::from(kinds)));
    }
    arrays.push(Arc::new(StringArray::from(units)));
    arrays.push(Arc::new(StringArray::from(chunks)));

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).map_err(arrow_err)?;

    let mut buf = Vec::new();
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(props)).map_err(parquet_err)?;
    writer.write(&batch).map_err(parquet_err)?;
    writer.close().map_err(parquet_err)?;
    Ok(buf)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> FrameResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| side_file_err(COLUMNS_FILE, format!("missing text column {name:?}")))
}

fn decode_lookup(bytes: Bytes) -> FrameResult<Vec<LookupEntry>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).map_err(parquet_err)?;
    let schema = builder.schema().clone();
    let full = schema.index_of("type").is_ok();
    let reader = builder.build().map_err(parquet_err)?;

    let mut entries = Vec::new();
    for batch in reader {
        let batch = batch.map_err(arrow_err)?;
        let ids = string_column(&batch, "id")?;
        let tables = string_column(&batch, "table")?;
        let keys = string_column(&batch, "key")?;
        let kinds = if full { Some(string_column(&batch, "type")?) } else { None };
        let units = string_column(&batch, "units")?;
        let chunks = string_column(&batch, "chunk")?;

        for row in 0..batch.num_rows() {
            let id: i64 = ids.value(row).parse().map_err(|_| {
                side_file_err(COLUMNS_FILE, format!("non-numeric id {:?}", ids.value(row)))
            })?;
            let identity = crate::model::identity::ColumnIdentity {
                id: crate::model::identity::ColumnId(id),
                table: tables.value(row).to_string(),
                key: keys.value(row).to_string(),
                kind: kinds.map(|k| k.value(row).to_string()),
                units: units.value(row).to_string(),
            };
            entries.push(LookupEntry {
                identity,
                chunk: ChunkName::from_raw(chunks.value(row)),
            });
        }
    }
    Ok(entries)
}

fn append_entry<W: std::io::Write>(
    archive: &mut tar::Builder<W>,
    path: &Path,
    bytes: &[u8],
) -> FrameResult<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    archive
        .append_data(&mut header, path, bytes)
        .context(ArchiveSnafu { path: path.display().to_string() })
}

impl Frame {
    /// Reload a frame from its on-disk layout.
    ///
    /// Reads the side files, then validates that every chunk the lookup
    /// index references exists. Any absent file raises
    /// [`FrameError::CorruptedData`] before data is exposed; chunk
    /// contents are not read until first access.
    pub fn from_location(location: StoreLocation, policy: ChunkingPolicy) -> FrameResult<Frame> {
        let side_files = [ROW_INDEX_FILE, COLUMNS_FILE, FRAME_META_FILE];
        let missing: Vec<String> = side_files
            .into_iter()
            .filter(|f| !storage::file_exists(&location, Path::new(f)))
            .map(|f| location.join(f).display().to_string())
            .collect();
        ensure!(missing.is_empty(), CorruptedDataSnafu { missing });

        let index_bytes =
            storage::read_all_bytes(&location, Path::new(ROW_INDEX_FILE)).context(StorageSnafu)?;
        let index_table =
            codec::decode_table(Bytes::from(index_bytes), Some(&[])).context(CodecSnafu)?;
        let (index, _) = index_table.into_parts();

        let lookup_bytes =
            storage::read_all_bytes(&location, Path::new(COLUMNS_FILE)).context(StorageSnafu)?;
        let entries = decode_lookup(Bytes::from(lookup_bytes))?;
        let lookup = LookupIndex::from_entries(entries)?;

        let meta_text =
            storage::read_to_string(&location, Path::new(FRAME_META_FILE)).context(StorageSnafu)?;
        let meta: FrameMeta = serde_json::from_str(&meta_text)
            .map_err(|e| side_file_err(FRAME_META_FILE, e.to_string()))?;

        let missing: Vec<String> = lookup
            .chunks()
            .iter()
            .filter(|c| !storage::file_exists(&location, Path::new(c.as_str())))
            .map(|c| location.join(c.as_str()).display().to_string())
            .collect();
        ensure!(missing.is_empty(), CorruptedDataSnafu { missing });

        let next_chunk = lookup
            .chunks()
            .iter()
            .filter_map(|c| c.counter())
            .max()
            .map_or(1, |n| n + 1);
        let columns_per_chunk = policy.columns_per_chunk(index.len());

        Ok(Frame {
            name: meta.table,
            position: meta.position,
            location: Some(location.clone()),
            store: Box::new(FileChunkStore::new(location)),
            index,
            lookup,
            policy,
            columns_per_chunk,
            next_chunk,
        })
    }

    pub(crate) fn persist_row_index(&self) -> FrameResult<()> {
        let Some(location) = &self.location else { return Ok(()) };
        let bytes = codec::encode_table(&Table::empty(self.index.clone())).context(CodecSnafu)?;
        storage::write_atomic(location, Path::new(ROW_INDEX_FILE), &bytes).context(StorageSnafu)
    }

    pub(crate) fn persist_lookup(&self) -> FrameResult<()> {
        let Some(location) = &self.location else { return Ok(()) };
        let bytes = encode_lookup(&self.lookup)?;
        storage::write_atomic(location, Path::new(COLUMNS_FILE), &bytes).context(StorageSnafu)
    }

    pub(crate) fn persist_meta(&self) -> FrameResult<()> {
        let Some(location) = &self.location else { return Ok(()) };
        let meta = FrameMeta { table: self.name.clone(), position: self.position };
        let text = serde_json::to_string_pretty(&meta)
            .map_err(|e| side_file_err(FRAME_META_FILE, e.to_string()))?;
        storage::write_atomic(location, Path::new(FRAME_META_FILE), text.as_bytes())
            .context(StorageSnafu)
    }

    pub(crate) fn persist_all(&self) -> FrameResult<()> {
        self.persist_row_index()?;
        self.persist_lookup()?;
        self.persist_meta()
    }

    /// Record this frame's logical position within its collection and
    /// persist the metadata record.
    pub fn set_position(&mut self, position: usize) -> FrameResult<()> {
        self.position = position;
        self.persist_meta()
    }

    /// Append this frame's files (side files plus chunks) to a tar
    /// archive under `relative_root`, with deterministic entry headers.
    ///
    /// Requires a file-backed frame.
    pub fn save_to<W: std::io::Write>(
        &self,
        archive: &mut tar::Builder<W>,
        relative_root: &Path,
    ) -> FrameResult<()> {
        let location = self
            .location
            .as_ref()
            .context(NotFileBackedSnafu { name: self.name.clone() })?;

        for file in storage::list_files(location).context(StorageSnafu)? {
            let bytes =
                storage::read_all_bytes(location, Path::new(&file)).context(StorageSnafu)?;
            append_entry(archive, &relative_root.join(&file), &bytes)?;
        }
        Ok(())
    }

    /// Deep-copy this frame's files to `parent/new_name/` and open the
    /// copy. The copy records `new_name` and `position` in its metadata.
    pub fn copy_as(&self, parent: &Path, new_name: &str, position: usize) -> FrameResult<Frame> {
        let location = self
            .location
            .as_ref()
            .context(NotFileBackedSnafu { name: self.name.clone() })?;
        let dest = StoreLocation::local(parent.join(new_name));

        for file in storage::list_files(location).context(StorageSnafu)? {
            let bytes =
                storage::read_all_bytes(location, Path::new(&file)).context(StorageSnafu)?;
            storage::write_atomic(&dest, Path::new(&file), &bytes).context(StorageSnafu)?;
        }

        let meta = FrameMeta { table: new_name.to_string(), position };
        let text = serde_json::to_string_pretty(&meta)
            .map_err(|e| side_file_err(FRAME_META_FILE, e.to_string()))?;
        storage::write_atomic(&dest, Path::new(FRAME_META_FILE), text.as_bytes())
            .context(StorageSnafu)?;

        Frame::from_location(dest, self.policy)
    }

    /// Release this frame's storage: the backing directory for file-backed
    /// frames, nothing for in-memory ones (their buffers drop with the
    /// frame).
    pub fn clean_up(self) -> FrameResult<()> {
        match &self.location {
            Some(location) => storage::remove_root(location).context(StorageSnafu),
            None => Ok(()),
        }
    }
}
