//! Bundle ledger - the net history of bundle adds and drops on a pool.

use std::sync::Arc;

use crate::candidate::{BundleId, CandidateBundle};

#[derive(Debug, Clone)]
pub struct BundleLogEntry {
    pub bundle: Arc<CandidateBundle>,
    pub is_adding: bool,
}

/// Recorded bundle operations, at most one entry per bundle.
///
/// An operation that is the inverse of the pending entry for the same bundle
/// cancels it instead of being recorded. Repeating the pending operation is a
/// no-op.
#[derive(Debug, Clone, Default)]
pub struct BundleLedger {
    entries: Vec<BundleLogEntry>,
}

impl BundleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation. Returns `true` if it cancelled a pending inverse.
    pub fn record(&mut self, bundle: Arc<CandidateBundle>, is_adding: bool) -> bool {
        match self.position_of(bundle.id) {
            Some(index) if self.entries[index].is_adding != is_adding => {
                self.entries.remove(index);
                log::debug!("bundle '{}' cancelled out of the ledger", bundle.name);
                true
            }
            Some(_) => false,
            None => {
                self.entries.push(BundleLogEntry { bundle, is_adding });
                false
            }
        }
    }

    /// Entries in recorded order.
    pub fn entries(&self) -> &[BundleLogEntry] {
        &self.entries
    }

    pub fn contains(&self, id: BundleId) -> bool {
        self.position_of(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position_of(&self, id: BundleId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.bundle.id == id)
    }
}
