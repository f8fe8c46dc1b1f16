//! The lookup index: the authoritative map from column identity to chunk.
//!
//! One entry per logical column, in logical order (the order callers
//! observe on full materialization). Physical chunk placement order is
//! independent of this ordering. The index is the single source of truth
//! for column existence, ordering, and location; selector resolution
//! happens here, once, before any IO.

use std::collections::{HashMap, HashSet};

use snafu::prelude::*;

use crate::frame::error::{FrameError, FrameResult};
use crate::model::identity::{ColumnId, ColumnIdentity};
use crate::model::selectors::{ColumnSelector, SelectorError};
use crate::store::ChunkName;

/// One row of the lookup index.
#[derive(Clone, Debug, PartialEq)]
pub struct LookupEntry {
    /// The column's identity tuple.
    pub identity: ColumnIdentity,
    /// Name of the chunk currently holding this column.
    pub chunk: ChunkName,
}

/// Ordered identity-to-chunk map for one frame.
#[derive(Clone, Debug, Default)]
pub struct LookupIndex {
    entries: Vec<LookupEntry>,
    by_id: HashMap<ColumnId, usize>,
}

impl LookupIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries, validating id uniqueness.
    pub(crate) fn from_entries(entries: Vec<LookupEntry>) -> FrameResult<Self> {
        let mut index = Self { entries, by_id: HashMap::new() };
        index.reindex();
        ensure!(
            index.by_id.len() == index.entries.len(),
            crate::frame::error::SideFileFormatSnafu {
                path: crate::frame::COLUMNS_FILE.to_string(),
                detail: "duplicate column ids".to_string(),
            }
        );
        Ok(index)
    }

    fn reindex(&mut self) {
        self.by_id = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.identity.id, i))
            .collect();
    }

    /// Number of logical columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no columns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in logical order.
    pub fn entries(&self) -> &[LookupEntry] {
        &self.entries
    }

    /// The identities in logical order.
    pub fn identities(&self) -> Vec<ColumnIdentity> {
        self.entries.iter().map(|e| e.identity.clone()).collect()
    }

    /// Whether a column with this id exists.
    pub fn contains(&self, id: ColumnId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// The entry for a column id, if present.
    pub fn get(&self, id: ColumnId) -> Option<&LookupEntry> {
        self.by_id.get(&id).map(|&i| &self.entries[i])
    }

    /// Whether the frame's identities carry a type (5-tuple form).
    /// `None` when the frame has no columns yet.
    pub fn arity_full(&self) -> Option<bool> {
        self.entries.first().map(|e| e.identity.is_full())
    }

    /// Insert an identity at a logical position. The caller validates the
    /// position and id uniqueness.
    pub(crate) fn insert(&mut self, position: usize, identity: ColumnIdentity, chunk: ChunkName) {
        self.entries.insert(position, LookupEntry { identity, chunk });
        self.reindex();
    }

    /// Remove every entry whose id is in `ids`, preserving the order of
    /// the remainder.
    pub(crate) fn remove_ids(&mut self, ids: &HashSet<ColumnId>) {
        self.entries.retain(|e| !ids.contains(&e.identity.id));
        self.reindex();
    }

    /// Replace the identity of the entry with this id, in place.
    pub(crate) fn rename(&mut self, id: ColumnId, identity: ColumnIdentity) {
        if let Some(&i) = self.by_id.get(&id) {
            self.entries[i].identity = identity;
        }
    }

    /// The distinct chunk names, in first-seen logical order.
    pub fn chunks(&self) -> Vec<ChunkName> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for e in &self.entries {
            if seen.insert(&e.chunk) {
                out.push(e.chunk.clone());
            }
        }
        out
    }

    /// Distinct chunks with their column counts, in first-seen order.
    pub(crate) fn chunk_counts(&self) -> Vec<(ChunkName, usize)> {
        let mut order: Vec<ChunkName> = Vec::new();
        let mut counts: HashMap<ChunkName, usize> = HashMap::new();
        for e in &self.entries {
            let n = counts.entry(e.chunk.clone()).or_insert_with(|| {
                order.push(e.chunk.clone());
                0
            });
            *n += 1;
        }
        order
            .into_iter()
            .map(|c| {
                let n = counts[&c];
                (c, n)
            })
            .collect()
    }

    /// Identity headers of the columns held by `chunk`, in logical order.
    pub(crate) fn headers_for_chunk(&self, chunk: &ChunkName) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| &e.chunk == chunk)
            .map(|e| e.identity.to_header())
            .collect()
    }

    /// Resolve a column selector to an ordered entry list, failing with
    /// `ColumnNotFound` when a requested id or identity is absent.
    pub fn resolve(&self, selector: &ColumnSelector) -> FrameResult<Vec<LookupEntry>> {
        match selector {
            ColumnSelector::All => Ok(self.entries.clone()),

            ColumnSelector::ByIds(ids) => {
                let mut out = Vec::with_capacity(ids.len());
                let mut missing = Vec::new();
                for id in ids {
                    match self.get(*id) {
                        Some(entry) => out.push(entry.clone()),
                        None => missing.push(id.to_string()),
                    }
                }
                ensure!(missing.is_empty(), crate::frame::error::ColumnNotFoundSnafu { missing });
                Ok(out)
            }

            ColumnSelector::ByMask(mask) => {
                if mask.len() != self.entries.len() {
                    return Err(FrameError::Selector {
                        source: SelectorError::MaskLength {
                            expected: self.entries.len(),
                            actual: mask.len(),
                        },
                    });
                }
                Ok(self
                    .entries
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(e, _)| e.clone())
                    .collect())
            }

            ColumnSelector::ByIdentities(identities) => {
                let mut out = Vec::with_capacity(identities.len());
                let mut missing = Vec::new();
                for identity in identities {
                    match self.get(identity.id).filter(|e| &e.identity == identity) {
                        Some(entry) => out.push(entry.clone()),
                        None => missing.push(identity.to_string()),
                    }
                }
                ensure!(missing.is_empty(), crate::frame::error::ColumnNotFoundSnafu { missing });
                Ok(out)
            }
        }
    }
}
