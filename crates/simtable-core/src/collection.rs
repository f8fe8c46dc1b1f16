//! A name-keyed collection of frames persisted and archived together.
//!
//! The collection owns one frame per source-table name under a common root
//! directory. Bulk construction takes an already-finished in-memory table
//! per name (the parser collaborator's output); reload walks the root and
//! rehydrates every frame directory, validating completeness. For
//! transport, the whole collection is packaged as a gzip tar archive with
//! deterministic entries (sorted paths, fixed header fields), one
//! directory per table plus a single JSON metadata record describing the
//! owning source file. The archive extension and the metadata field names
//! are a compatibility surface; treat them as frozen.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use snafu::{Backtrace, prelude::*};

use crate::chunking::ChunkingPolicy;
use crate::frame::{Frame, FrameError};
use crate::model::table::Table;
use crate::storage::{self, StorageError, StoreLocation};

/// File extension for collection archives.
pub const ARCHIVE_EXT: &str = "tsar";

/// Fixed name of the collection metadata record inside an archive.
pub const COLLECTION_META_FILE: &str = "_collection.json";

/// Metadata describing the simulation source file a collection came from.
///
/// Serialized as `_collection.json`; the field names are part of the
/// archive format.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SourceInfo {
    /// Stable identifier of the owning file.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Creation time of the archive's contents.
    pub created: DateTime<Utc>,
    /// Path of the simulation source file the tables were parsed from.
    pub source_file: String,
    /// Type of the source file (for example, text or binary dialect).
    pub source_type: String,
}

/// Result type for collection operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Errors from collection-level operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CollectionError {
    /// A table name is already present in the collection.
    #[snafu(display("Table {name} already exists in the collection"))]
    DuplicateTable {
        /// The conflicting name.
        name: String,
    },

    /// A table name is not present in the collection.
    #[snafu(display("No table named {name} in the collection"))]
    UnknownTable {
        /// The requested name.
        name: String,
    },

    /// A frame-level failure while building, loading, or mutating.
    #[snafu(display("Frame error for table {name}: {source}"))]
    Frame {
        /// Name of the affected table.
        name: String,
        /// Underlying frame error.
        #[snafu(source, backtrace)]
        source: FrameError,
    },

    /// Filesystem failure at the collection root.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(source, backtrace)]
        source: StorageError,
    },

    /// IO failure while writing or reading an archive.
    #[snafu(display("Archive error at {path}: {source}"))]
    Archive {
        /// The archive path or entry involved.
        path: String,
        /// Underlying IO error.
        source: io::Error,
        /// Backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The collection metadata record is missing or does not parse.
    #[snafu(display("Malformed collection metadata: {detail}"))]
    Metadata {
        /// What failed to parse.
        detail: String,
    },
}

/// A named set of frames rooted at one directory.
#[derive(Debug)]
pub struct TableCollection {
    root: PathBuf,
    policy: ChunkingPolicy,
    frames: BTreeMap<String, Frame>,
}

impl TableCollection {
    /// Bulk-construct a collection: one file-backed frame per named table,
    /// positioned in input order, persisted under `root/<name>/`.
    pub fn build(
        root: impl Into<PathBuf>,
        tables: Vec<(String, Table)>,
        policy: ChunkingPolicy,
    ) -> CollectionResult<Self> {
        let root = root.into();
        let mut collection = Self { root, policy, frames: BTreeMap::new() };

        for (position, (name, table)) in tables.into_iter().enumerate() {
            ensure!(
                !collection.frames.contains_key(&name),
                DuplicateTableSnafu { name: name.clone() }
            );
            let mut frame = Frame::from_table(table, &name, &collection.root, policy)
                .context(FrameSnafu { name: name.clone() })?;
            frame.set_position(position).context(FrameSnafu { name: name.clone() })?;
            collection.frames.insert(name, frame);
        }
        Ok(collection)
    }

    /// Reload a collection from a root directory, rehydrating every frame
    /// subdirectory. Any incomplete frame fails the whole load.
    pub fn load(root: impl Into<PathBuf>, policy: ChunkingPolicy) -> CollectionResult<Self> {
        let root = root.into();
        let location = StoreLocation::local(&root);
        let mut frames = BTreeMap::new();

        for dir in storage::list_dirs(&location).context(StorageSnafu)? {
            let frame = Frame::from_location(StoreLocation::local(root.join(&dir)), policy)
                .context(FrameSnafu { name: dir.clone() })?;
            frames.insert(frame.name().to_string(), frame);
        }

        Ok(Self { root, policy, frames })
    }

    /// The collection's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Table names in logical position order.
    pub fn names(&self) -> Vec<String> {
        let mut named: Vec<(&String, usize)> =
            self.frames.iter().map(|(name, frame)| (name, frame.position())).collect();
        named.sort_by_key(|(name, position)| (*position, (*name).clone()));
        named.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the collection holds no tables.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frame for a table name.
    pub fn get(&self, name: &str) -> Option<&Frame> {
        self.frames.get(name)
    }

    /// Mutable access to a table's frame.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Frame> {
        self.frames.get_mut(name)
    }

    /// Add one more table to the collection, appended at the end of the
    /// logical order.
    pub fn insert_table(&mut self, name: impl Into<String>, table: Table) -> CollectionResult<()> {
        let name = name.into();
        ensure!(
            !self.frames.contains_key(&name),
            DuplicateTableSnafu { name: name.clone() }
        );
        let position = self.frames.len();
        let mut frame = Frame::from_table(table, &name, &self.root, self.policy)
            .context(FrameSnafu { name: name.clone() })?;
        frame.set_position(position).context(FrameSnafu { name: name.clone() })?;
        self.frames.insert(name, frame);
        Ok(())
    }

    /// Remove a table and release its storage.
    pub fn remove(&mut self, name: &str) -> CollectionResult<()> {
        let frame = self
            .frames
            .remove(name)
            .with_context(|| UnknownTableSnafu { name: name.to_string() })?;
        frame.clean_up().context(FrameSnafu { name: name.to_string() })
    }

    /// Deep-copy a table under a new name, appended at the end of the
    /// logical order.
    pub fn copy(&mut self, name: &str, new_name: impl Into<String>) -> CollectionResult<()> {
        let new_name = new_name.into();
        ensure!(
            !self.frames.contains_key(&new_name),
            DuplicateTableSnafu { name: new_name.clone() }
        );
        let frame = self
            .frames
            .get(name)
            .with_context(|| UnknownTableSnafu { name: name.to_string() })?;
        let copy = frame
            .copy_as(&self.root, &new_name, self.frames.len())
            .context(FrameSnafu { name: new_name.clone() })?;
        self.frames.insert(new_name, copy);
        Ok(())
    }

    /// Package every frame plus the collection metadata record into a
    /// gzip tar archive at `path`.
    ///
    /// Entries are emitted in sorted order with fixed header fields, so
    /// identical collections produce identical archives.
    pub fn save_archive(&self, path: &Path, source: &SourceInfo) -> CollectionResult<()> {
        let archive_path = path.display().to_string();
        let file = File::create(path).context(ArchiveSnafu { path: archive_path.clone() })?;
        let gz = GzEncoder::new(file, Compression::default());
        let mut tar = tar::Builder::new(gz);

        let meta = serde_json::to_vec_pretty(source)
            .map_err(|e| CollectionError::Metadata { detail: e.to_string() })?;
        append_archive_entry(&mut tar, Path::new(COLLECTION_META_FILE), &meta)?;

        for (name, frame) in &self.frames {
            frame
                .save_to(&mut tar, Path::new(name))
                .context(FrameSnafu { name: name.clone() })?;
        }

        let gz = tar
            .into_inner()
            .context(ArchiveSnafu { path: archive_path.clone() })?;
        gz.finish().context(ArchiveSnafu { path: archive_path })?;
        Ok(())
    }

    /// Extract an archive into `dest_root` and load the collection from
    /// it, returning the collection and its source metadata.
    pub fn load_archive(
        archive: &Path,
        dest_root: impl Into<PathBuf>,
        policy: ChunkingPolicy,
    ) -> CollectionResult<(Self, SourceInfo)> {
        let dest_root = dest_root.into();
        let archive_path = archive.display().to_string();

        let file = File::open(archive).context(ArchiveSnafu { path: archive_path.clone() })?;
        let gz = GzDecoder::new(file);
        tar::Archive::new(gz)
            .unpack(&dest_root)
            .context(ArchiveSnafu { path: archive_path })?;

        let meta_text =
            storage::read_to_string(&StoreLocation::local(&dest_root), Path::new(COLLECTION_META_FILE))
                .context(StorageSnafu)?;
        let source: SourceInfo = serde_json::from_str(&meta_text)
            .map_err(|e| CollectionError::Metadata { detail: e.to_string() })?;

        let collection = Self::load(dest_root, policy)?;
        Ok((collection, source))
    }
}

fn append_archive_entry<W: io::Write>(
    archive: &mut tar::Builder<W>,
    path: &Path,
    bytes: &[u8],
) -> CollectionResult<()> {
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
