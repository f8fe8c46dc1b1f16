//! Chunked columnar store for simulation-output tables.
//!
//! This crate stores time-indexed numeric tables whose columns carry a
//! multi-part identity `(id, table, key, [type], units)`. Wide tables (tens
//! of thousands of columns) are split into bounded-size column groups
//! ("chunks"), each persisted as an independent Parquet file, so any column
//! subset can be located and reassembled without touching unrelated chunks.
//!
//! The pieces, leaf first:
//!
//! - Pure data model: column identities, row indexes, in-memory tables and
//!   the selector unions used to address them (`model` module).
//! - Chunk sizing and placement math (`chunking` module).
//! - A synchronous storage layer with atomic write-then-rename file
//!   replacement (`storage` module).
//! - The Parquet codec that maps one column group to one binary file with
//!   column-level projection pushdown (`codec` module).
//! - Interchangeable chunk storage backends behind one trait (`store`
//!   module).
//! - `Frame`, the chunked table itself: one shared row index, one lookup
//!   index, and the read/write/persistence paths over its chunks (`frame`
//!   module), plus the `indexer` get/set façade.
//! - `TableCollection`, a name-keyed set of frames persisted and archived
//!   together (`collection` module).
#![deny(missing_docs)]
pub mod chunking;
pub mod codec;
pub mod collection;
pub mod frame;
pub mod indexer;
pub mod model;
pub mod storage;
pub mod store;
