//! In-memory revision store — single writer during the fetch phase, frozen
//! once, then read by every downstream stage.
//!
//! Pagination order is not entity-grouped, so revisions for one entity can
//! arrive interleaved across pages. `finalize()` sorts every entity's list
//! ascending by sequence number; no read may happen before it runs.

use std::collections::HashMap;

use crate::models::revision::Revision;

#[derive(Debug, Default)]
pub struct RevisionStore {
    histories: HashMap<i64, Vec<Revision>>,
    finalized: bool,
}

impl RevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, revision: Revision) {
        debug_assert!(!self.finalized, "append after finalize");
        self.histories
            .entry(revision.entity_id)
            .or_default()
            .push(revision);
    }

    /// Sorts every entity's revision list ascending by sequence and freezes
    /// the store. Must run before any reader starts.
    pub fn finalize(&mut self) {
        for revisions in self.histories.values_mut() {
            revisions.sort_by_key(|r| r.sequence);
        }
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn entity_count(&self) -> usize {
        self.histories.len()
    }

    pub fn revision_count(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }

    /// Ordered revision list for one entity. Empty slice for unknown ids.
    pub fn history(&self, entity_id: i64) -> &[Revision] {
        debug_assert!(self.finalized, "read before finalize");
        self.histories
            .get(&entity_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The terminal revision — its field snapshot is the entity's current
    /// state, which saves a per-entity "fetch current" round trip.
    pub fn latest(&self, entity_id: i64) -> Option<&Revision> {
        debug_assert!(self.finalized, "read before finalize");
        self.histories.get(&entity_id).and_then(|revs| revs.last())
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &[Revision])> {
        debug_assert!(self.finalized, "read before finalize");
        self.histories.iter().map(|(id, revs)| (*id, revs.as_slice()))
    }
}
