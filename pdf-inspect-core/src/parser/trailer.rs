//! Trailer registry
//!
//! Trailers (ISO 32000-1 Section 7.5.5) and cross-reference streams (Section 7.5.8)
//! are indexed by the byte offset a `/Prev` entry would use to point at them, which
//! is how the previous revision of an incremental update is found.

use super::objects::ObjectId;
use std::collections::BTreeMap;

/// A trailer-like object and the revision it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TrailerRef {
    pub id: ObjectId,
    pub revision: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TrailerRegistry {
    by_offset: BTreeMap<usize, TrailerRef>,
}

impl TrailerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trailer found at `offset`. The first registration of an offset is kept.
    pub fn register(&mut self, offset: usize, trailer: TrailerRef) -> bool {
        if self.by_offset.contains_key(&offset) {
            return false;
        }
        self.by_offset.insert(offset, trailer);
        true
    }

    /// Point `offset` at `trailer`, replacing any earlier registration.
    ///
    /// Used for `startxref` values, which are authoritative for the `/Prev` entries of
    /// the next revision even when the file was shifted by leading junk.
    pub fn alias(&mut self, offset: usize, trailer: TrailerRef) {
        self.by_offset.insert(offset, trailer);
    }

    pub fn get(&self, offset: usize) -> Option<TrailerRef> {
        self.by_offset.get(&offset).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, TrailerRef)> + '_ {
        self.by_offset.iter().map(|(offset, trailer)| (*offset, *trailer))
    }

    /// Distinct trailers, ordered by revision then id
    pub fn trailers(&self) -> Vec<TrailerRef> {
        let mut trailers: Vec<TrailerRef> = self.by_offset.values().copied().collect();
        trailers.sort_by_key(|trailer| (trailer.revision, trailer.id));
        trailers.dedup();
        trailers
    }

    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }
}
