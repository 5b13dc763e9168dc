//! Partition index - shards a pool by the values of designated symbol flags.

use flag_rules::{FlagCatalog, FlagId, FlagResolver, FlagValueType, SymbolDomain, UNRESOLVED_VALUE};
use std::collections::BTreeMap;
use std::fmt::Write;

use super::bucket::OrderedBucket;
use crate::candidate::Candidate;

/// Bucket key: `<value>#` per partitioning flag, in flag order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn from_values(values: impl IntoIterator<Item = i64>) -> Self {
        let mut key = String::new();
        for value in values {
            // Writing to a String cannot fail.
            let _ = write!(key, "{}#", value);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which buckets a request scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    /// The unpartitioned master pool.
    Master,
    /// Existing partition buckets, scanned jointly. May be empty.
    Partitions(Vec<PartitionKey>),
}

/// Normalise requested partitioning flags: dedupe, drop the invalid id, keep
/// only symbol flags, sort.
pub fn validate_partitioning_flags<C>(requested: &[FlagId], catalog: &C) -> Vec<FlagId>
where
    C: FlagCatalog + ?Sized,
{
    let mut flags: Vec<FlagId> = requested
        .iter()
        .copied()
        .filter(|id| id.is_valid())
        .filter(|id| {
            let symbol = catalog.value_type(*id) == Some(FlagValueType::Symbol);
            if !symbol {
                log::debug!("flag {} is not a symbol flag, not partitioning on it", id);
            }
            symbol
        })
        .collect();
    flags.sort();
    flags.dedup();
    flags
}

fn key_value(value: f32) -> i64 {
    value as i64
}

/// Buckets keyed by the resolved values of the partitioning flags.
#[derive(Debug, Clone, Default)]
pub struct PartitionIndex {
    flags: Vec<FlagId>,
    buckets: BTreeMap<PartitionKey, OrderedBucket>,
}

impl PartitionIndex {
    /// Create an empty index over already validated flags.
    pub fn new(flags: Vec<FlagId>) -> Self {
        Self {
            flags,
            buckets: BTreeMap::new(),
        }
    }

    pub fn flags(&self) -> &[FlagId] {
        &self.flags
    }

    /// Whether any partitioning flag is set.
    pub fn is_active(&self) -> bool {
        !self.flags.is_empty()
    }

    /// The bucket key for a candidate: the bound of its `Equals` criterion on
    /// each partitioning flag, or the unresolved sentinel.
    pub fn key_for(&self, candidate: &Candidate) -> PartitionKey {
        PartitionKey::from_values(self.flags.iter().map(|flag| {
            key_value(
                candidate
                    .conditions
                    .equals_value(*flag)
                    .unwrap_or(UNRESOLVED_VALUE),
            )
        }))
    }

    pub fn bucket(&self, key: &PartitionKey) -> Option<&OrderedBucket> {
        self.buckets.get(key)
    }

    pub(crate) fn bucket_entry(&mut self, key: PartitionKey) -> &mut OrderedBucket {
        self.buckets.entry(key).or_default()
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&PartitionKey, &OrderedBucket)> {
        self.buckets.iter()
    }

    pub(crate) fn buckets_mut(&mut self) -> impl Iterator<Item = &mut OrderedBucket> {
        self.buckets.values_mut()
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total candidates across all buckets.
    pub fn candidate_count(&self) -> usize {
        self.buckets.values().map(OrderedBucket::len).sum()
    }

    /// Drop every bucket, keeping the flags.
    pub fn clear_buckets(&mut self) {
        self.buckets.clear();
    }

    /// Remove a candidate from its bucket. Empty buckets are dropped.
    pub fn remove(&mut self, candidate: &Candidate) -> bool {
        let key = self.key_for(candidate);
        let Some(bucket) = self.buckets.get_mut(&key) else {
            return false;
        };
        let removed = bucket.remove(candidate.id).is_some();
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        removed
    }

    /// Work out which buckets a request scans.
    ///
    /// Flags listed in `all` match every value of their symbol domain; the
    /// remaining flags resolve through `resolver` once, and the Cartesian
    /// product of the ALL domains fills in the rest of each key. Only keys with
    /// an existing bucket are returned.
    pub fn resolve_targets<D>(
        &self,
        resolver: &FlagResolver<'_>,
        domain: &D,
        all: &[FlagId],
    ) -> Targets
    where
        D: SymbolDomain + ?Sized,
    {
        if self.flags.is_empty() {
            return Targets::Master;
        }

        let alled: Vec<usize> = self
            .flags
            .iter()
            .enumerate()
            .filter(|(_, flag)| all.contains(flag))
            .map(|(position, _)| position)
            .collect();
        if alled.len() == self.flags.len() {
            return Targets::Master;
        }

        let mut template: Vec<i64> = self
            .flags
            .iter()
            .map(|flag| key_value(resolver.resolve_or_sentinel(*flag)))
            .collect();

        if alled.is_empty() {
            let key = PartitionKey::from_values(template);
            let keys = if self.buckets.contains_key(&key) {
                vec![key]
            } else {
                Vec::new()
            };
            return Targets::Partitions(keys);
        }

        let domains: Vec<Vec<i32>> = alled
            .iter()
            .map(|position| domain.all_values(self.flags[*position]))
            .collect();
        let combinations: usize = domains.iter().map(Vec::len).product();

        let mut keys = Vec::new();
        for combination in 0..combinations {
            let mut scratch = combination;
            for (values, position) in domains.iter().zip(&alled) {
                template[*position] = i64::from(values[scratch % values.len()]);
                scratch /= values.len();
            }
            let key = PartitionKey::from_values(template.iter().copied());
            if self.buckets.contains_key(&key) {
                keys.push(key);
            }
        }
        log::debug!(
            "ALL expansion over {} flag(s) produced {} of {} keys",
            alled.len(),
            keys.len(),
            combinations
        );
        Targets::Partitions(keys)
    }
}
