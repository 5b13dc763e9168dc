//! Delivery pools - priority-ordered, partitioned candidate pools.
//!
//! A pool holds a master bucket with every live candidate and, when
//! partitioning flags are active, a [`PartitionIndex`] sharding the same
//! candidates by the values of those flags. A delivery attempt:
//! 1. **Targets**: resolve which bucket(s) the request context points at
//! 2. **Scan**: find the best eligible priority-tier candidate, falling back to
//!    the default tier
//! 3. **Fire**: hand it to the [`FiringHook`] and, on success, discard it
//! 4. **Loop**: refill from the default contents once the pool runs dry

mod bucket;
mod config;
mod ledger;
mod partition;
mod scan;

pub use bucket::*;
pub use config::*;
pub use ledger::*;
pub use partition::*;

use flag_rules::{FlagBundle, FlagCatalog, FlagId, FlagRegistry};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::candidate::{Candidate, CandidateBundle, CandidateId};

/// Unique identifier for pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId(pub Uuid);

impl PoolId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whatever acts on a selected candidate.
pub trait FiringHook {
    /// Try to fire `candidate` on behalf of the pool `origin`. Returns whether
    /// it was accepted.
    fn fire(
        &mut self,
        origin: PoolId,
        candidate: &Arc<Candidate>,
        imported: &[FlagBundle],
        all: &[FlagId],
    ) -> bool;
}

/// Context for one delivery attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryRequest<'a> {
    /// Caller-supplied flag bundles, consulted after the global bundles.
    pub imported: &'a [FlagBundle],
    /// Flags that match every value for this request.
    pub all: &'a [FlagId],
}

impl<'a> DeliveryRequest<'a> {
    pub fn new(imported: &'a [FlagBundle]) -> Self {
        Self { imported, all: &[] }
    }

    pub fn with_all(mut self, all: &'a [FlagId]) -> Self {
        self.all = all;
        self
    }
}

pub struct DeliveryPool {
    id: PoolId,
    config: PoolConfig,
    master: OrderedBucket,
    partitions: PartitionIndex,
    insertion_counter: u32,
    recency_bias: bool,
    default_contents: Vec<Arc<Candidate>>,
    ledger: BundleLedger,
    rng: StdRng,
}

impl DeliveryPool {
    /// Create an empty pool over the given default contents.
    ///
    /// Nothing is inserted until [`DeliveryPool::init`]; partitioning flags in
    /// the config take effect on [`DeliveryPool::repartition`].
    pub fn new(config: PoolConfig, default_contents: Vec<Arc<Candidate>>) -> Self {
        Self::with_rng(config, default_contents, StdRng::from_entropy())
    }

    /// Like [`DeliveryPool::new`] with a reproducible random source.
    pub fn with_seed(config: PoolConfig, default_contents: Vec<Arc<Candidate>>, seed: u64) -> Self {
        Self::with_rng(config, default_contents, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PoolConfig, default_contents: Vec<Arc<Candidate>>, rng: StdRng) -> Self {
        let recency_bias = config.tie_break == TieBreakPolicy::Stack;
        Self {
            id: PoolId::new(),
            config,
            master: OrderedBucket::new(),
            partitions: PartitionIndex::default(),
            insertion_counter: 0,
            recency_bias,
            default_contents,
            ledger: BundleLedger::new(),
            rng,
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of live candidates.
    pub fn len(&self) -> usize {
        self.master.len()
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty()
    }

    pub fn master(&self) -> &OrderedBucket {
        &self.master
    }

    pub fn partitions(&self) -> &PartitionIndex {
        &self.partitions
    }

    /// The validated partitioning flags currently in use.
    pub fn partitioning_flags(&self) -> &[FlagId] {
        self.partitions.flags()
    }

    pub fn bundle_history(&self) -> &[BundleLogEntry] {
        self.ledger.entries()
    }

    pub fn recency_bias(&self) -> bool {
        self.recency_bias
    }

    pub fn tie_break_policy(&self) -> TieBreakPolicy {
        self.config.tie_break
    }

    pub fn default_contents(&self) -> &[Arc<Candidate>] {
        &self.default_contents
    }

    /// First-time population with every default candidate. Forgets the bundle
    /// history.
    pub fn init(&mut self) {
        self.refresh(true, false);
    }

    /// Rebuild the pool the way a loop refill does.
    pub fn set_to_looped_state(&mut self) {
        self.refresh(
            self.config.include_priority_tier_in_loop,
            self.config.include_bundles_in_loop,
        );
    }

    /// Rebuild from the default contents. The default tier always comes back;
    /// the priority tier only when `include_priority_tier` is set. The bundle
    /// history is replayed when `include_bundles` is set and dropped otherwise.
    fn refresh(&mut self, include_priority_tier: bool, include_bundles: bool) {
        self.insertion_counter = 0;
        self.master.clear();
        self.partitions.clear_buckets();

        let defaults = std::mem::take(&mut self.default_contents);
        for candidate in &defaults {
            if include_priority_tier || !candidate.is_priority_tier() {
                self.receive(candidate.clone(), false);
            }
        }
        self.default_contents = defaults;

        if include_bundles {
            let history = self.ledger.entries().to_vec();
            for entry in &history {
                if entry.is_adding {
                    self.dump_candidates(&entry.bundle, include_priority_tier);
                } else {
                    self.drop_candidates(&entry.bundle);
                }
            }
        } else {
            self.ledger.clear();
        }

        log::debug!(
            "pool {} refreshed with {} candidates ({} bundle entries kept)",
            self.id,
            self.master.len(),
            self.ledger.len()
        );
    }

    /// Insert a candidate into the master bucket and its partition bucket.
    ///
    /// A returning candidate goes ahead of its equal-priority peers.
    pub fn receive(&mut self, candidate: Arc<Candidate>, is_returning: bool) {
        let stamp = self.insertion_counter;
        self.insertion_counter = self.insertion_counter.wrapping_add(1);
        let newest_first = self.recency_bias || is_returning;

        if self.partitions.is_active() {
            let key = self.partitions.key_for(&candidate);
            self.partitions
                .bucket_entry(key)
                .insert(candidate.clone(), stamp, newest_first, &mut self.rng);
        }
        self.master
            .insert(candidate, stamp, newest_first, &mut self.rng);
        self.debug_check();
    }

    /// Give back a candidate that fired but was not used. Only discarding pools
    /// take it back; the others never let it go.
    pub fn return_candidate(&mut self, candidate: Arc<Candidate>) {
        if self.config.discard_after_use {
            self.receive(candidate, true);
        }
    }

    /// Switch the tie-break policy. QUEUE and STACK reorder equal-priority runs
    /// in place to match.
    pub fn set_tie_break_policy(&mut self, policy: TieBreakPolicy) {
        self.config.tie_break = policy;
        if (policy == TieBreakPolicy::Queue && self.recency_bias)
            || (policy == TieBreakPolicy::Stack && !self.recency_bias)
        {
            self.flip_recency_bias();
        }
    }

    fn flip_recency_bias(&mut self) {
        self.recency_bias = !self.recency_bias;
        self.master.flip_runs();
        for bucket in self.partitions.buckets_mut() {
            bucket.flip_runs();
        }
        log::debug!("pool {} recency bias now {}", self.id, self.recency_bias);
    }

    /// Request new partitioning flags. They take effect on the next repartition.
    pub fn set_partitioning_flags(&mut self, flags: impl IntoIterator<Item = FlagId>) {
        self.config.partitioning_flags = flags.into_iter().collect();
    }

    /// Validate the requested partitioning flags and rebuild every partition
    /// bucket from the master bucket. Stamps restart from zero.
    pub fn repartition<C>(&mut self, catalog: &C)
    where
        C: FlagCatalog + ?Sized,
    {
        let flags = validate_partitioning_flags(&self.config.partitioning_flags, catalog);
        self.config.partitioning_flags = flags.clone();
        self.partitions = PartitionIndex::new(flags);
        self.insertion_counter = self.master.renumber();

        if self.partitions.is_active() {
            for (candidate, stamp) in self.master.iter() {
                let key = self.partitions.key_for(candidate);
                self.partitions
                    .bucket_entry(key)
                    .push(candidate.clone(), stamp);
            }
        }

        log::debug!(
            "pool {} repartitioned on {:?} into {} buckets",
            self.id,
            self.partitions.flags(),
            self.partitions.len()
        );
        self.debug_check();
    }

    /// Add every candidate of a bundle and record the add.
    pub fn dump_bundle(&mut self, bundle: &Arc<CandidateBundle>) {
        self.dump_candidates(bundle, true);
        self.ledger.record(bundle.clone(), true);
    }

    /// Remove every candidate of a bundle and record the drop.
    pub fn drop_bundle(&mut self, bundle: &Arc<CandidateBundle>) {
        self.drop_candidates(bundle);
        self.ledger.record(bundle.clone(), false);
    }

    fn dump_candidates(&mut self, bundle: &CandidateBundle, include_priority_tier: bool) {
        for candidate in &bundle.candidates {
            if include_priority_tier || !candidate.is_priority_tier() {
                self.receive(candidate.clone(), false);
            }
        }
    }

    fn drop_candidates(&mut self, bundle: &CandidateBundle) {
        for candidate in &bundle.candidates {
            self.remove_everywhere(candidate);
        }
    }

    /// Remove one instance of the candidate from the master bucket and its
    /// partition bucket.
    fn remove_everywhere(&mut self, candidate: &Candidate) -> bool {
        if self.master.remove(candidate.id).is_none() {
            return false;
        }
        if self.partitions.is_active() {
            self.partitions.remove(candidate);
        }
        self.debug_check();
        true
    }

    /// Select the best eligible candidate for the request and fire it.
    ///
    /// Returns whether a candidate fired. An empty pool never fires; if it loops
    /// it is refilled before returning.
    pub fn attempt_delivery(
        &mut self,
        registry: &FlagRegistry,
        request: DeliveryRequest<'_>,
        hook: &mut dyn FiringHook,
    ) -> bool {
        if self.master.is_empty() {
            if self.config.loops {
                self.set_to_looped_state();
            }
            return false;
        }

        let resolver = registry.resolver(request.imported);
        let targets = self
            .partitions
            .resolve_targets(&resolver, registry, request.all);
        let buckets: Vec<&OrderedBucket> = match &targets {
            Targets::Master => vec![&self.master],
            Targets::Partitions(keys) => keys
                .iter()
                .filter_map(|key| self.partitions.bucket(key))
                .collect(),
        };

        let selection = scan::select_candidate(
            &buckets,
            self.config.tie_break,
            self.recency_bias,
            |candidate: &Candidate| candidate.conditions.is_met(&resolver, request.all),
            &mut self.rng,
        );
        let chosen = selection
            .and_then(|selection| buckets[selection.bucket].get(selection.index))
            .cloned();

        let Some(candidate) = chosen else {
            log::debug!(
                "pool {}: nothing eligible across {} bucket(s)",
                self.id,
                buckets.len()
            );
            return false;
        };

        let fired = hook.fire(self.id, &candidate, request.imported, request.all);
        log::debug!(
            "pool {} selected {} (priority {}), fired: {}",
            self.id,
            candidate.name,
            candidate.priority(),
            fired
        );

        if fired && self.config.discard_after_use {
            self.remove_everywhere(&candidate);
        }
        if self.master.is_empty() && self.config.loops {
            self.set_to_looped_state();
        }
        fired
    }

    fn debug_check(&self) {
        debug_assert!(self.master.is_sorted());
        debug_assert!(self
            .partitions
            .buckets()
            .all(|(_, bucket)| bucket.is_sorted()));
        debug_assert!(
            self.partitions_mirror_master(),
            "partition buckets out of sync with the master bucket"
        );
    }

    /// Whether the partition buckets hold exactly the master bucket's candidates.
    fn partitions_mirror_master(&self) -> bool {
        if !self.partitions.is_active() {
            return true;
        }
        let mut counts: HashMap<CandidateId, isize> = HashMap::new();
        for candidate in self.master.candidates() {
            *counts.entry(candidate.id).or_default() += 1;
        }
        for (_, bucket) in self.partitions.buckets() {
            for candidate in bucket.candidates() {
                *counts.entry(candidate.id).or_default() -= 1;
            }
        }
        counts.values().all(|&count| count == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flag_rules::{Criterion, FlagValueType};
    use std::collections::BTreeSet;

    const SPEAKER: FlagId = FlagId(1);
    const MOOD: FlagId = FlagId(2);
    const AWAKE: FlagId = FlagId(3);

    fn registry() -> FlagRegistry {
        let mut registry = FlagRegistry::new();
        registry
            .define_symbol(SPEAKER, "speaker", ["guard", "merchant", "priest"])
            .unwrap();
        registry
            .define_symbol(MOOD, "mood", ["calm", "angry"])
            .unwrap();
        registry.define(AWAKE, "awake", FlagValueType::Bool).unwrap();
        registry
    }

    /// Records every firing and accepts them unless told otherwise.
    #[derive(Default)]
    struct Recorder {
        fired: Vec<String>,
        refuse: bool,
    }

    impl FiringHook for Recorder {
        fn fire(
            &mut self,
            _origin: PoolId,
            candidate: &Arc<Candidate>,
            _imported: &[FlagBundle],
            _all: &[FlagId],
        ) -> bool {
            if self.refuse {
                return false;
            }
            self.fired.push(candidate.name.clone());
            true
        }
    }

    fn candidate(name: &str, priority: i32) -> Arc<Candidate> {
        Arc::new(Candidate::new(name).with_priority(priority))
    }

    fn line(name: &str, priority: i32, speaker: i32, mood: i32) -> Arc<Candidate> {
        Arc::new(
            Candidate::new(name)
                .with_priority(priority)
                .with_criterion(Criterion::is_symbol(SPEAKER, speaker))
                .with_criterion(Criterion::is_symbol(MOOD, mood)),
        )
    }

    fn deliver(pool: &mut DeliveryPool, registry: &FlagRegistry, hook: &mut Recorder) -> bool {
        pool.attempt_delivery(registry, DeliveryRequest::default(), hook)
    }

    fn multiset(ids: impl Iterator<Item = CandidateId>) -> HashMap<CandidateId, usize> {
        let mut counts = HashMap::new();
        for id in ids {
            *counts.entry(id).or_insert(0) += 1;
        }
        counts
    }

    fn assert_partitions_cover_master(pool: &DeliveryPool) {
        let master = multiset(pool.master().candidates().iter().map(|c| c.id));
        let partitioned = multiset(
            pool.partitions()
                .buckets()
                .flat_map(|(_, bucket)| bucket.candidates().iter().map(|c| c.id)),
        );
        assert_eq!(master, partitioned);
    }

    fn assert_sorted(pool: &DeliveryPool) {
        assert!(pool.master().is_sorted());
        for (_, bucket) in pool.partitions().buckets() {
            assert!(bucket.is_sorted());
        }
    }

    #[test]
    fn test_queue_then_stack_scenario() {
        let registry = registry();
        let c1 = candidate("c1", 5);
        let c2 = candidate("c2", 5);

        let mut pool = DeliveryPool::with_seed(PoolConfig::default(), vec![], 1);
        pool.receive(c1.clone(), false);
        pool.receive(c2.clone(), false);
        let mut hook = Recorder::default();
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert!(!deliver(&mut pool, &registry, &mut hook));
        assert_eq!(hook.fired, vec!["c1", "c2"]);

        let config = PoolConfig::default().with_tie_break(TieBreakPolicy::Stack);
        let mut pool = DeliveryPool::with_seed(config, vec![], 1);
        pool.receive(c1, false);
        pool.receive(c2, false);
        let mut hook = Recorder::default();
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert!(!deliver(&mut pool, &registry, &mut hook));
        assert_eq!(hook.fired, vec!["c2", "c1"]);
    }

    #[test]
    fn test_switching_policy_flips_existing_order() {
        let registry = registry();
        let mut pool = DeliveryPool::with_seed(PoolConfig::default(), vec![], 1);
        pool.receive(candidate("c1", 5), false);
        pool.receive(candidate("c2", 5), false);

        pool.set_tie_break_policy(TieBreakPolicy::Stack);
        assert!(pool.recency_bias());
        pool.set_tie_break_policy(TieBreakPolicy::Stack);
        assert!(pool.recency_bias());

        let mut hook = Recorder::default();
        deliver(&mut pool, &registry, &mut hook);
        assert_eq!(hook.fired, vec!["c2"]);

        pool.set_tie_break_policy(TieBreakPolicy::Random);
        assert!(pool.recency_bias());
        pool.set_tie_break_policy(TieBreakPolicy::Queue);
        assert!(!pool.recency_bias());
    }

    #[test]
    fn test_partitioned_queue_and_stack_use_stamps() {
        let registry = registry();
        let config = PoolConfig::default().with_partitioning_flags([SPEAKER, MOOD]);
        let mut pool = DeliveryPool::with_seed(config, vec![], 2);
        pool.repartition(&registry);
        pool.receive(line("guard-first", 4, 0, 0), false);
        pool.receive(line("merchant-second", 4, 1, 0), false);
        pool.receive(line("guard-third", 4, 0, 1), false);

        let imported = vec![FlagBundle::new("scene").with_symbol(MOOD, 0)];
        let request = DeliveryRequest::new(&imported).with_all(&[SPEAKER]);

        let mut hook = Recorder::default();
        pool.set_tie_break_policy(TieBreakPolicy::Stack);
        assert!(pool.attempt_delivery(&registry, request, &mut hook));
        pool.set_tie_break_policy(TieBreakPolicy::Queue);
        assert!(pool.attempt_delivery(&registry, request, &mut hook));
        assert!(!pool.attempt_delivery(&registry, request, &mut hook));

        assert_eq!(hook.fired, vec!["merchant-second", "guard-first"]);
        assert_partitions_cover_master(&pool);
    }

    #[test]
    fn test_returned_candidate_does_not_shadow_older_peer() {
        let registry = registry();
        let config = PoolConfig::default().with_partitioning_flags([SPEAKER, MOOD]);
        let mut pool = DeliveryPool::with_seed(config, vec![], 17);
        pool.repartition(&registry);
        pool.receive(line("oldest", 4, 0, 0), false);
        pool.receive(line("middle", 4, 1, 0), false);
        pool.return_candidate(line("returned", 4, 0, 0));

        let imported = vec![FlagBundle::new("scene").with_symbol(MOOD, 0)];
        let request = DeliveryRequest::new(&imported).with_all(&[SPEAKER]);
        let mut hook = Recorder::default();
        assert!(pool.attempt_delivery(&registry, request, &mut hook));
        assert!(pool.attempt_delivery(&registry, request, &mut hook));
        assert!(pool.attempt_delivery(&registry, request, &mut hook));

        assert_eq!(hook.fired, vec!["oldest", "middle", "returned"]);
    }

    #[test]
    fn test_priority_monotonicity_after_mixed_inserts() {
        let registry = registry();
        let config = PoolConfig::default().with_partitioning_flags([SPEAKER, MOOD]);
        let mut pool = DeliveryPool::with_seed(config, vec![], 3);
        pool.repartition(&registry);

        let priorities = [3, 0, -2, 7, 0, 3, 1, 0, -2, 9];
        for (i, priority) in priorities.iter().enumerate() {
            let name = format!("line-{}", i);
            pool.receive(line(&name, *priority, (i % 3) as i32, (i % 2) as i32), i % 4 == 0);
            assert_sorted(&pool);
        }
        pool.set_tie_break_policy(TieBreakPolicy::Stack);
        assert_sorted(&pool);
        assert_partitions_cover_master(&pool);
    }

    #[test]
    fn test_partition_coverage_through_lifecycle() {
        let registry = registry();
        let bundle = Arc::new(
            CandidateBundle::new("market")
                .with_candidates([line("haggle", 2, 1, 0), line("shout", 2, 1, 1)]),
        );
        let defaults = vec![
            line("halt", 3, 0, 1),
            line("bless", 1, 2, 0),
            line("idle", 0, 0, 0),
            candidate("generic", 1),
        ];
        let config = PoolConfig::default().with_partitioning_flags([MOOD, SPEAKER, AWAKE]);
        let mut pool = DeliveryPool::with_seed(config, defaults, 4);
        pool.init();
        pool.repartition(&registry);
        assert_eq!(pool.partitioning_flags(), &[SPEAKER, MOOD]);
        assert_partitions_cover_master(&pool);

        pool.dump_bundle(&bundle);
        assert_partitions_cover_master(&pool);

        let imported = vec![FlagBundle::new("scene")
            .with_symbol(SPEAKER, 1)
            .with_symbol(MOOD, 1)];
        let mut hook = Recorder::default();
        assert!(pool.attempt_delivery(&registry, DeliveryRequest::new(&imported), &mut hook));
        assert_eq!(hook.fired, vec!["shout"]);
        assert_partitions_cover_master(&pool);

        pool.drop_bundle(&bundle);
        assert_partitions_cover_master(&pool);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn test_unmatched_partition_fires_nothing() {
        let registry = registry();
        let config = PoolConfig::default().with_partitioning_flags([SPEAKER]);
        let mut pool = DeliveryPool::with_seed(config, vec![line("halt", 3, 0, 1)], 5);
        pool.init();
        pool.repartition(&registry);

        let imported = vec![FlagBundle::new("scene").with_symbol(SPEAKER, 2)];
        let mut hook = Recorder::default();
        assert!(!pool.attempt_delivery(&registry, DeliveryRequest::new(&imported), &mut hook));
        assert!(hook.fired.is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_all_on_every_partition_flag_scans_master() {
        let registry = registry();
        let config = PoolConfig::default().with_partitioning_flags([SPEAKER]);
        let mut pool = DeliveryPool::with_seed(
            config,
            vec![line("halt", 3, 0, 1), line("bless", 5, 2, 1)],
            6,
        );
        pool.init();
        pool.repartition(&registry);

        let imported = vec![FlagBundle::new("scene").with_symbol(MOOD, 1)];
        let request = DeliveryRequest::new(&imported).with_all(&[SPEAKER]);
        let mut hook = Recorder::default();
        assert!(pool.attempt_delivery(&registry, request, &mut hook));
        assert_eq!(hook.fired, vec!["bless"]);
        assert_partitions_cover_master(&pool);
    }

    #[test]
    fn test_random_fairness() {
        let registry = registry();
        let tied = ["a", "b", "c", "d"];
        let config = PoolConfig::default()
            .with_tie_break(TieBreakPolicy::Random)
            .with_discard_after_use(false);
        let mut contents: Vec<_> = tied.iter().map(|name| candidate(name, 6)).collect();
        contents.push(candidate("lower", 2));
        let mut pool = DeliveryPool::with_seed(config, contents, 7);
        pool.init();

        let trials = 10_000;
        let mut hook = Recorder::default();
        for _ in 0..trials {
            assert!(deliver(&mut pool, &registry, &mut hook));
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for name in &hook.fired {
            *counts.entry(name.as_str()).or_insert(0) += 1;
        }
        assert_eq!(counts.get("lower"), None);
        let expected = trials as f64 / tied.len() as f64;
        for name in tied {
            let observed = counts.get(name).copied().unwrap_or(0) as f64;
            assert!(
                (observed - expected).abs() < expected * 0.08,
                "{} fired {} times, expected about {}",
                name,
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_default_tier_suppressed_by_any_eligible_priority() {
        let registry = registry();
        let night = FlagBundle::new("night").with_bool(AWAKE, false);
        let gated = Arc::new(
            Candidate::new("snore")
                .with_priority(-1)
                .with_criterion(Criterion::is_false(AWAKE)),
        );
        let mut pool = DeliveryPool::with_seed(
            PoolConfig::default().with_discard_after_use(false),
            vec![candidate("idle-a", 0), gated, candidate("idle-b", 0)],
            8,
        );
        pool.init();

        let mut hook = Recorder::default();
        let imported = vec![night];
        for _ in 0..20 {
            pool.attempt_delivery(&registry, DeliveryRequest::new(&imported), &mut hook);
        }
        assert!(hook.fired.iter().all(|name| name == "snore"));

        hook.fired.clear();
        pool.attempt_delivery(&registry, DeliveryRequest::default(), &mut hook);
        assert_eq!(hook.fired.len(), 1);
        assert!(hook.fired[0].starts_with("idle"));
    }

    #[test]
    fn test_ledger_cancellation_restores_pool() {
        let registry = registry();
        let defaults = vec![candidate("base-a", 2), candidate("base-b", 1)];
        let bundle = Arc::new(
            CandidateBundle::new("festival")
                .with_candidates([candidate("fest-a", 4), candidate("fest-b", 3)]),
        );
        let config = PoolConfig::default().looping(true, true);
        let mut pool = DeliveryPool::with_seed(config, defaults, 9);
        pool.init();

        pool.dump_bundle(&bundle);
        pool.drop_bundle(&bundle);
        assert!(pool.bundle_history().is_empty());

        pool.drop_bundle(&bundle);
        pool.dump_bundle(&bundle);
        assert!(pool.bundle_history().is_empty());

        pool.set_to_looped_state();
        let names: BTreeSet<_> = pool.master().candidates().iter().map(|c| c.name.clone()).collect();
        let expected: BTreeSet<_> = ["base-a", "base-b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names, expected);

        let mut hook = Recorder::default();
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert_eq!(hook.fired, vec!["base-a"]);
    }

    #[test]
    fn test_bundle_replay_on_loop() {
        let registry = registry();
        let bundle = Arc::new(CandidateBundle::new("festival").with_candidate(candidate("fest", 4)));
        let config = PoolConfig::default().looping(true, true);
        let mut pool = DeliveryPool::with_seed(config, vec![candidate("base", 1)], 10);
        pool.init();
        pool.dump_bundle(&bundle);
        assert_eq!(pool.bundle_history().len(), 1);

        let mut hook = Recorder::default();
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert_eq!(hook.fired, vec!["fest", "base"]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.bundle_history().len(), 1);
    }

    #[test]
    fn test_loop_without_bundles_forgets_history() {
        let registry = registry();
        let bundle = Arc::new(CandidateBundle::new("festival").with_candidate(candidate("fest", 4)));
        let config = PoolConfig::default().looping(true, false);
        let mut pool = DeliveryPool::with_seed(config, vec![candidate("base", 1)], 10);
        pool.init();
        pool.dump_bundle(&bundle);

        let mut hook = Recorder::default();
        deliver(&mut pool, &registry, &mut hook);
        deliver(&mut pool, &registry, &mut hook);
        assert!(pool.bundle_history().is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_bundle_replay_skips_priority_tier_when_excluded() {
        let registry = registry();
        let bundle = Arc::new(
            CandidateBundle::new("festival")
                .with_candidates([candidate("fest-high", 3), candidate("fest-filler", 0)]),
        );
        let config = PoolConfig::default().looping(false, true);
        let mut pool = DeliveryPool::with_seed(
            config,
            vec![candidate("base-high", 2), candidate("base-filler", 0)],
            18,
        );
        pool.init();
        pool.dump_bundle(&bundle);
        assert_eq!(pool.len(), 4);

        pool.set_to_looped_state();
        let names: BTreeSet<_> = pool.master().candidates().iter().map(|c| c.name.clone()).collect();
        let expected: BTreeSet<_> = ["base-filler", "fest-filler"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names, expected);
        assert_eq!(pool.bundle_history().len(), 1);

        let mut hook = Recorder::default();
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert!(hook.fired[0].ends_with("filler"));
    }

    #[test]
    fn test_loop_refresh_restarts_stamps() {
        let registry = registry();
        let config = PoolConfig::default()
            .with_discard_after_use(false)
            .looping(true, false);
        let mut pool = DeliveryPool::with_seed(
            config,
            vec![candidate("a", 3), candidate("b", 2), candidate("c", 0)],
            19,
        );
        pool.init();
        for name in ["extra-1", "extra-2", "extra-3"] {
            pool.receive(candidate(name, 1), false);
        }
        let before: BTreeSet<u32> = pool.master().iter().map(|(_, stamp)| stamp).collect();
        assert_eq!(before, (0..6).collect::<BTreeSet<u32>>());

        pool.set_to_looped_state();
        let after: Vec<u32> = pool.master().iter().map(|(_, stamp)| stamp).collect();
        assert_eq!(after, vec![0, 1, 2]);

        pool.receive(candidate("late", 1), false);
        assert_eq!(pool.master().iter().map(|(_, stamp)| stamp).max(), Some(3));

        let mut hook = Recorder::default();
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert_eq!(hook.fired, vec!["a"]);
    }

    #[test]
    fn test_repartition_bucket_count() {
        let registry = registry();
        let defaults = vec![
            line("a", 1, 0, 0),
            line("b", 2, 0, 0),
            line("c", 3, 1, 0),
            line("d", 1, 1, 1),
            line("e", 5, 2, 1),
            line("f", 0, 2, 1),
        ];
        let config = PoolConfig::default().with_partitioning_flags([MOOD, SPEAKER]);
        let mut pool = DeliveryPool::with_seed(config, defaults, 11);
        pool.init();
        pool.repartition(&registry);

        assert_eq!(pool.partitions().len(), 4);
        assert_partitions_cover_master(&pool);

        let stamps: BTreeSet<u32> = pool.master().iter().map(|(_, stamp)| stamp).collect();
        assert_eq!(stamps, (0..6).collect::<BTreeSet<u32>>());
    }

    #[test]
    fn test_loop_refill() {
        let registry = registry();
        let config = PoolConfig::default().looping(false, false);
        let mut pool = DeliveryPool::with_seed(
            config,
            vec![candidate("only", 0), candidate("priority", 2)],
            12,
        );
        pool.init();

        let mut hook = Recorder::default();
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert_eq!(hook.fired, vec!["priority", "only"]);

        // The loop refill skips the priority tier.
        assert_eq!(pool.len(), 1);
        assert!(deliver(&mut pool, &registry, &mut hook));
        assert_eq!(hook.fired.last().map(String::as_str), Some("only"));
    }

    #[test]
    fn test_empty_looping_pool_refills_before_failing() {
        let registry = registry();
        let config = PoolConfig::default().looping(true, false);
        let mut pool = DeliveryPool::with_seed(config, vec![candidate("only", 0)], 13);

        let mut hook = Recorder::default();
        assert!(!deliver(&mut pool, &registry, &mut hook));
        assert_eq!(pool.len(), 1);
        assert!(deliver(&mut pool, &registry, &mut hook));
    }

    #[test]
    fn test_refused_firing_keeps_candidate() {
        let registry = registry();
        let mut pool = DeliveryPool::with_seed(PoolConfig::default(), vec![candidate("a", 1)], 14);
        pool.init();

        let mut hook = Recorder {
            refuse: true,
            ..Recorder::default()
        };
        assert!(!deliver(&mut pool, &registry, &mut hook));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_return_candidate_only_when_discarding() {
        let returned = candidate("back", 2);

        let mut pool = DeliveryPool::with_seed(PoolConfig::default(), vec![], 15);
        pool.receive(candidate("peer", 2), false);
        pool.return_candidate(returned.clone());
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.master().get(0).map(|c| c.id), Some(returned.id));

        let config = PoolConfig::default().with_discard_after_use(false);
        let mut pool = DeliveryPool::with_seed(config, vec![], 15);
        pool.return_candidate(returned);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_unresolved_condition_blocks_candidate() {
        let registry = registry();
        let gated = Arc::new(
            Candidate::new("gated")
                .with_priority(2)
                .with_criterion(Criterion::is_true(AWAKE)),
        );
        let mut pool = DeliveryPool::with_seed(PoolConfig::default(), vec![gated], 16);
        pool.init();

        let mut hook = Recorder::default();
        assert!(!deliver(&mut pool, &registry, &mut hook));
        let imported = vec![FlagBundle::new("scene").with_bool(AWAKE, true)];
        assert!(pool.attempt_delivery(&registry, DeliveryRequest::new(&imported), &mut hook));
    }
}
