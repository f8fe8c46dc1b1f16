//! Interchangeable chunk storage backends.
//!
//! A frame talks to its chunks through [`ChunkStore`], a minimal
//! capability set (`read`, `write`, `delete`) chosen at construction time:
//!
//! - [`FileChunkStore`]: the production backend. Chunks are Parquet files
//!   in the frame's directory; every write goes through the atomic
//!   replace path in `storage`.
//! - [`MemChunkStore`]: identical semantics over in-memory buffers, for
//!   ephemeral and merge scenarios that never touch the filesystem.
//! - [`DirectChunkStore`]: the degenerate variant for small tables. It
//!   holds decoded tables directly, skipping the codec entirely, and is
//!   normally paired with a monolithic chunking policy so the whole frame
//!   lives in a single chunk.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use bytes::Bytes;
use snafu::prelude::*;

use crate::codec::{self, CodecError};
use crate::model::table::{Table, TableShapeError};
use crate::storage::{self, StorageError, StoreLocation};

/// Generated name of one chunk, doubling as its file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkName(String);

impl ChunkName {
    const PREFIX: &'static str = "chunk-";
    const SUFFIX: &'static str = ".parquet";

    /// The name for chunk number `counter`.
    pub fn from_counter(counter: u64) -> Self {
        Self(format!("{}{counter:06}{}", Self::PREFIX, Self::SUFFIX))
    }

    /// The name as a string (and file name).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A name read back from a persisted lookup index.
    pub(crate) fn from_raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parse the counter back out of a generated name, if it matches the
    /// generated form. Used to recover the next free counter on reload.
    pub(crate) fn counter(&self) -> Option<u64> {
        self.0
            .strip_prefix(Self::PREFIX)?
            .strip_suffix(Self::SUFFIX)?
            .parse()
            .ok()
    }
}

impl fmt::Display for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result type for chunk store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from a chunk storage backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The named chunk does not exist in this store.
    #[snafu(display("Unknown chunk {name}"))]
    UnknownChunk {
        /// The chunk name that was requested.
        name: String,
    },

    /// Filesystem failure underneath a file-backed store.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(source, backtrace)]
        source: StorageError,
    },

    /// Encode/decode failure for a chunk's bytes.
    #[snafu(display("Chunk codec error: {source}"))]
    Codec {
        /// Underlying codec error.
        #[snafu(source, backtrace)]
        source: CodecError,
    },

    /// A projection over a directly-held table failed shape validation.
    #[snafu(display("Chunk projection error: {source}"))]
    Shape {
        /// Underlying shape error.
        source: TableShapeError,
    },
}

fn map_read_error(name: &ChunkName, err: StorageError) -> StoreError {
    if err.is_not_found() {
        StoreError::UnknownChunk { name: name.as_str().to_string() }
    } else {
        StoreError::Storage { source: err }
    }
}

/// The capability set a frame needs from its chunk storage.
pub trait ChunkStore: fmt::Debug {
    /// Read a chunk, optionally restricted to the given identity headers.
    fn read(&self, name: &ChunkName, columns: Option<&[String]>) -> StoreResult<Table>;

    /// Write (or replace) a chunk's full contents.
    fn write(&mut self, name: &ChunkName, table: &Table) -> StoreResult<()>;

    /// Delete a chunk.
    fn delete(&mut self, name: &ChunkName) -> StoreResult<()>;
}

/// Production backend: one Parquet file per chunk under a directory.
#[derive(Debug)]
pub struct FileChunkStore {
    location: StoreLocation,
}

impl FileChunkStore {
    /// A file store rooted at `location`.
    pub fn new(location: StoreLocation) -> Self {
        Self { location }
    }

    /// The directory this store writes into.
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Raw bytes of a chunk file, for archive packaging.
    pub(crate) fn read_bytes(&self, name: &ChunkName) -> StoreResult<Vec<u8>> {
        storage::read_all_bytes(&self.location, Path::new(name.as_str()))
            .map_err(|e| map_read_error(name, e))
    }
}

impl ChunkStore for FileChunkStore {
    fn read(&self, name: &ChunkName, columns: Option<&[String]>) -> StoreResult<Table> {
        let bytes = self.read_bytes(name)?;
        codec::decode_table(Bytes::from(bytes), columns).context(CodecSnafu)
    }

    fn write(&mut self, name: &ChunkName, table: &Table) -> StoreResult<()> {
        let bytes = codec::encode_table(table).context(CodecSnafu)?;
        storage::write_atomic(&self.location, Path::new(name.as_str()), &bytes)
            .context(StorageSnafu)
    }

    fn delete(&mut self, name: &ChunkName) -> StoreResult<()> {
        storage::remove_file(&self.location, Path::new(name.as_str()))
            .map_err(|e| map_read_error(name, e))
    }
}

/// In-memory backend with file semantics: chunks are encoded Parquet
/// buffers, so reads exercise the same codec and projection paths.
#[derive(Debug, Default)]
pub struct MemChunkStore {
    chunks: HashMap<ChunkName, Bytes>,
}

impl MemChunkStore {
    /// An empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkStore for MemChunkStore {
    fn read(&self, name: &ChunkName, columns: Option<&[String]>) -> StoreResult<Table> {
        let bytes = self
            .chunks
            .get(name)
            .with_context(|| UnknownChunkSnafu { name: name.as_str().to_string() })?;
        codec::decode_table(bytes.clone(), columns).context(CodecSnafu)
    }

    fn write(&mut self, name: &ChunkName, table: &Table) -> StoreResult<()> {
        let bytes = codec::encode_table(table).context(CodecSnafu)?;
        self.chunks.insert(name.clone(), Bytes::from(bytes));
        Ok(())
    }

    fn delete(&mut self, name: &ChunkName) -> StoreResult<()> {
        self.chunks
            .remove(name)
            .map(|_| ())
            .with_context(|| UnknownChunkSnafu { name: name.as_str().to_string() })
    }
}

/// Degenerate backend holding decoded tables, no codec involved.
#[derive(Debug, Default)]
pub struct DirectChunkStore {
    chunks: HashMap<ChunkName, Table>,
}

impl DirectChunkStore {
    /// An empty direct store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkStore for DirectChunkStore {
    fn read(&self, name: &ChunkName, columns: Option<&[String]>) -> StoreResult<Table> {
        let table = self
            .chunks
            .get(name)
            .with_context(|| UnknownChunkSnafu { name: name.as_str().to_string() })?;
        match columns {
            None => Ok(table.clone()),
            Some(headers) => {
                let mut cols = Vec::with_capacity(headers.len());
                for header in headers {
                    let col = table
                        .columns()
                        .iter()
                        .find(|c| c.identity.to_header() == *header)
                        .with_context(|| UnknownChunkSnafu {
                            name: format!("{}:{header}", name.as_str()),
                        })?;
                    cols.push(col.clone());
                }
                Table::new(table.index().clone(), cols).context(ShapeSnafu)
            }
        }
    }

    fn write(&mut self, name: &ChunkName, table: &Table) -> StoreResult<()> {
        self.chunks.insert(name.clone(), table.clone());
        Ok(())
    }

    fn delete(&mut self, name: &ChunkName) -> StoreResult<()> {
        self.chunks
            .remove(name)
            .map(|_| ())
            .with_context(|| UnknownChunkSnafu { name: name.as_str().to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::identity::ColumnIdentity;
    use crate::model::table::{Column, RowIndex};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn sample_table() -> Table {
        Table::new(
            RowIndex::sequential(2),
            vec![
                Column::new(ColumnIdentity::simple(1, "T", "A", "u"), vec![1.0, 2.0]),
                Column::new(ColumnIdentity::simple(2, "T", "B", "u"), vec![3.0, 4.0]),
            ],
        )
        .expect("valid table")
    }

    fn exercise_contract(store: &mut dyn ChunkStore) -> TestResult {
        let name = ChunkName::from_counter(1);
        let table = sample_table();

        store.write(&name, &table)?;
        assert_eq!(store.read(&name, None)?, table);

        let header = table.columns()[1].identity.to_header();
        let projected = store.read(&name, Some(&[header]))?;
        assert_eq!(projected.column_count(), 1);
        assert_eq!(projected.columns()[0].values, vec![3.0, 4.0]);

        store.delete(&name)?;
        assert!(matches!(
            store.read(&name, None).unwrap_err(),
            StoreError::UnknownChunk { .. }
        ));
        assert!(matches!(
            store.delete(&name).unwrap_err(),
            StoreError::UnknownChunk { .. }
        ));
        Ok(())
    }

    #[test]
    fn file_store_contract() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = FileChunkStore::new(StoreLocation::local(tmp.path()));
        exercise_contract(&mut store)
    }

    #[test]
    fn mem_store_contract() -> TestResult {
        exercise_contract(&mut MemChunkStore::new())
    }

    #[test]
    fn direct_store_contract() -> TestResult {
        exercise_contract(&mut DirectChunkStore::new())
    }

    #[test]
    fn chunk_name_counter_roundtrip() {
        let name = ChunkName::from_counter(42);
        assert_eq!(name.as_str(), "chunk-000042.parquet");
        assert_eq!(name.counter(), Some(42));
        assert_eq!(ChunkName::from_raw("other.bin").counter(), None);
    }
}
