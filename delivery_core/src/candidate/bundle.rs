//! Candidate bundles - temporary sets of candidates added and dropped as a unit.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{Candidate, CandidateId};

/// Unique identifier for bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(pub Uuid);

impl BundleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BundleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateBundle {
    pub id: BundleId,
    pub name: String,
    pub candidates: Vec<Arc<Candidate>>,
}

impl CandidateBundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BundleId::new(),
            name: name.into(),
            candidates: Vec::new(),
        }
    }

    pub fn with_candidate(mut self, candidate: Arc<Candidate>) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn with_candidates(mut self, candidates: impl IntoIterator<Item = Arc<Candidate>>) -> Self {
        self.candidates.extend(candidates);
        self
    }

    pub fn contains(&self, id: CandidateId) -> bool {
        self.candidates.iter().any(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
