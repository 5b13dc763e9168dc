//! Ordered buckets - candidates sorted by descending priority with parallel
//! insertion stamps.

use rand::Rng;
use std::sync::Arc;

use crate::candidate::{Candidate, CandidateId};

/// A priority-ordered run of candidates.
///
/// `stamps[i]` is the insertion stamp of `candidates[i]`. Among equal
/// priorities the stored order is the selection order: oldest first without
/// recency bias, newest first with it.
#[derive(Debug, Clone, Default)]
pub struct OrderedBucket {
    candidates: Vec<Arc<Candidate>>,
    stamps: Vec<u32>,
}

impl OrderedBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Candidate>> {
        self.candidates.get(index)
    }

    pub fn stamp(&self, index: usize) -> Option<u32> {
        self.stamps.get(index).copied()
    }

    pub fn candidates(&self) -> &[Arc<Candidate>] {
        &self.candidates
    }

    /// Iterate over candidates with their insertion stamps.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<Candidate>, u32)> {
        self.candidates.iter().zip(self.stamps.iter().copied())
    }

    pub fn position_of(&self, id: CandidateId) -> Option<usize> {
        self.candidates.iter().position(|c| c.id == id)
    }

    /// Insert a candidate at its ordered position and return that position.
    ///
    /// Priority-tier candidates go before the first entry with a strictly lower
    /// priority, or before the first entry with a lower-or-equal priority when
    /// `newest_first` is set. Default-tier candidates land at a uniformly random
    /// position inside the run of priority-0 entries, end inclusive.
    pub fn insert<R: Rng + ?Sized>(
        &mut self,
        candidate: Arc<Candidate>,
        stamp: u32,
        newest_first: bool,
        rng: &mut R,
    ) -> usize {
        let index = if candidate.is_priority_tier() {
            let priority = candidate.priority();
            self.candidates
                .iter()
                .position(|c| {
                    if newest_first {
                        c.priority() <= priority
                    } else {
                        c.priority() < priority
                    }
                })
                .unwrap_or(self.candidates.len())
        } else {
            let (start, end) = self.default_tier_run();
            rng.gen_range(start..=end)
        };

        log::trace!(
            "inserting {} (priority {}, stamp {}) at {}",
            candidate.name,
            candidate.priority(),
            stamp,
            index
        );
        self.candidates.insert(index, candidate);
        self.stamps.insert(index, stamp);
        index
    }

    /// Append without searching. The caller guarantees ordering is preserved.
    pub(crate) fn push(&mut self, candidate: Arc<Candidate>, stamp: u32) {
        debug_assert!(self
            .candidates
            .last()
            .map_or(true, |last| last.priority() >= candidate.priority()));
        self.candidates.push(candidate);
        self.stamps.push(stamp);
    }

    pub fn remove_at(&mut self, index: usize) -> (Arc<Candidate>, u32) {
        (self.candidates.remove(index), self.stamps.remove(index))
    }

    /// Remove the first entry with the given id.
    pub fn remove(&mut self, id: CandidateId) -> Option<Arc<Candidate>> {
        self.position_of(id).map(|index| self.remove_at(index).0)
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
        self.stamps.clear();
    }

    /// Reverse every maximal run of equal priority in place, stamps included.
    ///
    /// Turns oldest-first runs into newest-first runs and back without touching
    /// the ordering between priorities.
    pub fn flip_runs(&mut self) {
        let mut start = 0;
        while start < self.candidates.len() {
            let priority = self.candidates[start].priority();
            let end = self.candidates[start..]
                .iter()
                .position(|c| c.priority() != priority)
                .map_or(self.candidates.len(), |offset| start + offset);
            self.candidates[start..end].reverse();
            self.stamps[start..end].reverse();
            start = end;
        }
    }

    /// Replace stamps with their rank, keeping their relative order. Returns the
    /// next free stamp.
    pub(crate) fn renumber(&mut self) -> u32 {
        let mut order: Vec<usize> = (0..self.stamps.len()).collect();
        order.sort_by_key(|&index| self.stamps[index]);
        for (rank, index) in order.into_iter().enumerate() {
            self.stamps[index] = rank as u32;
        }
        self.stamps.len() as u32
    }

    /// Whether priorities are non-increasing along the bucket.
    pub fn is_sorted(&self) -> bool {
        self.candidates
            .windows(2)
            .all(|pair| pair[0].priority() >= pair[1].priority())
    }

    /// Bounds of the priority-0 run, or the empty run where it would start.
    fn default_tier_run(&self) -> (usize, usize) {
        let start = self
            .candidates
            .iter()
            .position(|c| c.priority() <= 0)
            .unwrap_or(self.candidates.len());
        let length = self.candidates[start..]
            .iter()
            .take_while(|c| !c.is_priority_tier())
            .count();
        (start, start + length)
    }
}
