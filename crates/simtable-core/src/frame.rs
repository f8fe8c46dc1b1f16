//! The chunked table: one shared row index, one lookup index, many chunks.
//!
//! A [`Frame`] owns the authoritative row index and the [`LookupIndex`]
//! mapping every column identity to the chunk that currently holds it.
//! Construction partitions an in-memory table into contiguous column runs
//! (`chunking` math) and writes each run through the chunk store; reads and
//! writes afterwards consult the lookup index and touch only the relevant
//! chunks. Persistence and the load-time integrity check live in the
//! `persist` submodule; the read and mutation paths in `read` and `write`.

pub mod error;
mod lookup;
mod persist;
mod read;
mod write;

pub use error::{FrameError, FrameResult};
pub use lookup::{LookupEntry, LookupIndex};
pub use persist::{COLUMNS_FILE, FRAME_META_FILE, ROW_INDEX_FILE};

use std::path::Path;

use snafu::prelude::*;

use crate::chunking::{ChunkingPolicy, contiguous_runs};
use crate::model::identity::ColumnIdentity;
use crate::model::table::{RowIndex, Table};
use crate::storage::StoreLocation;
use crate::store::{ChunkName, ChunkStore, DirectChunkStore, FileChunkStore, MemChunkStore};

use error::{ShapeSnafu, StoreSnafu};

/// One logical table stored as a set of bounded-size column-group chunks.
#[derive(Debug)]
pub struct Frame {
    name: String,
    position: usize,
    location: Option<StoreLocation>,
    store: Box<dyn ChunkStore>,
    index: RowIndex,
    lookup: LookupIndex,
    policy: ChunkingPolicy,
    columns_per_chunk: usize,
    next_chunk: u64,
}

impl Frame {
    /// Bulk-construct a file-backed frame from an in-memory table,
    /// partitioning its columns into chunks under `parent/name/` and
    /// persisting the side files.
    ///
    /// On any failure the partially written directory is removed before
    /// the error propagates.
    pub fn from_table(
        table: Table,
        name: impl Into<String>,
        parent: &Path,
        policy: ChunkingPolicy,
    ) -> FrameResult<Frame> {
        let name = name.into();
        let location = StoreLocation::local(parent.join(&name));
        let store = Box::new(FileChunkStore::new(location.clone()));

        let built = Self::build(store, Some(location.clone()), name, table, policy)
            .and_then(|frame| {
                frame.persist_all()?;
                Ok(frame)
            });

        if built.is_err() {
            let _ = crate::storage::remove_root(&location);
        }
        built
    }

    /// Construct a frame over in-memory chunk buffers: identical chunking
    /// and codec behavior, no filesystem IO. Used for ephemeral and merge
    /// scenarios; such frames cannot be saved or reloaded.
    pub fn from_table_in_memory(
        table: Table,
        name: impl Into<String>,
        policy: ChunkingPolicy,
    ) -> FrameResult<Frame> {
        Self::build(Box::new(MemChunkStore::new()), None, name.into(), table, policy)
    }

    /// Construct a degenerate single-chunk in-memory frame for small
    /// tables: no chunk splitting, no codec, same read/write/insert/drop
    /// contract.
    pub fn from_table_direct(table: Table, name: impl Into<String>) -> FrameResult<Frame> {
        Self::build(
            Box::new(DirectChunkStore::new()),
            None,
            name.into(),
            table,
            ChunkingPolicy::monolithic(),
        )
    }

    fn build(
        store: Box<dyn ChunkStore>,
        location: Option<StoreLocation>,
        name: String,
        table: Table,
        policy: ChunkingPolicy,
    ) -> FrameResult<Frame> {
        let width = policy.columns_per_chunk(table.row_count());
        let (index, columns) = table.into_parts();

        let mut frame = Frame {
            name,
            position: 0,
            location,
            store,
            index,
            lookup: LookupIndex::new(),
            policy,
            columns_per_chunk: width,
            next_chunk: 1,
        };

        let runs = contiguous_runs(columns.len(), width);
        let mut remaining = columns.into_iter();
        for run in runs {
            let chunk_columns: Vec<_> = remaining.by_ref().take(run.len()).collect();
            let identities: Vec<ColumnIdentity> =
                chunk_columns.iter().map(|c| c.identity.clone()).collect();

            let chunk_name = frame.fresh_chunk_name();
            let chunk_table =
                Table::new(frame.index.clone(), chunk_columns).context(ShapeSnafu)?;
            frame.store.write(&chunk_name, &chunk_table).context(StoreSnafu)?;

            for identity in identities {
                let position = frame.lookup.len();
                frame.lookup.insert(position, identity, chunk_name.clone());
            }
        }

        Ok(frame)
    }

    fn fresh_chunk_name(&mut self) -> ChunkName {
        let name = ChunkName::from_counter(self.next_chunk);
        self.next_chunk += 1;
        name
    }

    /// The owning table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical position of this frame within its collection.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The shared row index.
    pub fn row_index(&self) -> &RowIndex {
        &self.index
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    /// Number of logical columns.
    pub fn column_count(&self) -> usize {
        self.lookup.len()
    }

    /// The column identities in logical order, as observed on full
    /// materialization. This is what the search-index collaborator
    /// consumes.
    pub fn column_identities(&self) -> Vec<ColumnIdentity> {
        self.lookup.identities()
    }

    /// The lookup index.
    pub fn lookup(&self) -> &LookupIndex {
        &self.lookup
    }

    /// Number of physical chunks currently backing this frame.
    pub fn chunk_count(&self) -> usize {
        self.lookup.chunks().len()
    }

    /// The on-disk location, if this frame is file-backed.
    pub fn location(&self) -> Option<&StoreLocation> {
        self.location.as_ref()
    }

    /// The chunking policy this frame was constructed with.
    pub fn policy(&self) -> &ChunkingPolicy {
        &self.policy
    }

    /// The column-count capacity per chunk, fixed at construction/reload.
    pub fn columns_per_chunk(&self) -> usize {
        self.columns_per_chunk
    }
}
