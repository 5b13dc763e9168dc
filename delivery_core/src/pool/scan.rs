//! Candidate selection over one or more target buckets.
//!
//! The priority tier is scanned first. A lone bucket's stored order is the
//! preference order; across buckets ties are settled by stamps or at random.
//! The default tier is only considered when no priority-tier candidate is
//! eligible anywhere.

use rand::seq::SliceRandom;
use rand::Rng;

use super::bucket::OrderedBucket;
use super::config::TieBreakPolicy;
use crate::candidate::Candidate;

/// Location of the chosen candidate: target bucket and index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Selection {
    pub bucket: usize,
    pub index: usize,
}

pub(crate) fn select_candidate<F, R>(
    buckets: &[&OrderedBucket],
    policy: TieBreakPolicy,
    recency_bias: bool,
    mut eligible: F,
    rng: &mut R,
) -> Option<Selection>
where
    F: FnMut(&Candidate) -> bool,
    R: Rng + ?Sized,
{
    let found = match policy {
        TieBreakPolicy::Random => scan_random(buckets, &mut eligible, rng),
        TieBreakPolicy::Queue | TieBreakPolicy::Stack => {
            scan_ordered(buckets, recency_bias, &mut eligible)
        }
    };
    found.or_else(|| scan_default_tier(buckets, &mut eligible, rng))
}

/// Keep a single best. A lone bucket yields its first eligible entry, since its
/// stored order already encodes FIFO/LIFO. Across buckets every eligible entry
/// at the best priority is compared, and the preferred stamp wins.
fn scan_ordered<F>(buckets: &[&OrderedBucket], recency_bias: bool, eligible: &mut F) -> Option<Selection>
where
    F: FnMut(&Candidate) -> bool,
{
    let single = buckets.len() == 1;
    let mut best: Option<(i32, u32, Selection)> = None;

    for (bucket_index, bucket) in buckets.iter().enumerate() {
        for (index, (candidate, stamp)) in bucket.iter().enumerate() {
            if !candidate.is_priority_tier() {
                continue;
            }
            let priority = candidate.priority();
            if let Some((best_priority, best_stamp, _)) = best {
                if priority < best_priority {
                    break;
                }
                // Returned candidates sit ahead of older peers, so a losing
                // stamp says nothing about the entries behind it.
                if priority == best_priority && (stamp > best_stamp) != recency_bias {
                    continue;
                }
            }
            if eligible(candidate) {
                best = Some((
                    priority,
                    stamp,
                    Selection {
                        bucket: bucket_index,
                        index,
                    },
                ));
                if single {
                    break;
                }
            }
        }
    }

    best.map(|(_, _, selection)| selection)
}

/// Collect every eligible candidate tied at the best priority, then pick uniformly.
fn scan_random<F, R>(buckets: &[&OrderedBucket], eligible: &mut F, rng: &mut R) -> Option<Selection>
where
    F: FnMut(&Candidate) -> bool,
    R: Rng + ?Sized,
{
    let mut best_priority: Option<i32> = None;
    let mut tied: Vec<Selection> = Vec::new();

    for (bucket_index, bucket) in buckets.iter().enumerate() {
        for (index, candidate) in bucket.candidates().iter().enumerate() {
            if !candidate.is_priority_tier() {
                continue;
            }
            let priority = candidate.priority();
            if best_priority.is_some_and(|best| priority < best) {
                break;
            }
            if !eligible(candidate) {
                continue;
            }
            if best_priority.map_or(true, |best| priority > best) {
                best_priority = Some(priority);
                tied.clear();
            }
            tied.push(Selection {
                bucket: bucket_index,
                index,
            });
        }
    }

    if tied.len() > 1 {
        log::debug!("random tie-break among {} candidates", tied.len());
    }
    tied.choose(rng).copied()
}

/// First eligible default-tier entry of a single bucket, or a uniform pick over
/// every eligible default-tier entry of several.
fn scan_default_tier<F, R>(buckets: &[&OrderedBucket], eligible: &mut F, rng: &mut R) -> Option<Selection>
where
    F: FnMut(&Candidate) -> bool,
    R: Rng + ?Sized,
{
    if let [bucket] = buckets {
        return default_tier(bucket)
            .into_iter()
            .find(|&index| bucket.get(index).is_some_and(|c| eligible(c)))
            .map(|index| Selection { bucket: 0, index });
    }

    let mut found = Vec::new();
    for (bucket_index, bucket) in buckets.iter().enumerate() {
        for index in default_tier(bucket) {
            if bucket.get(index).is_some_and(|c| eligible(c)) {
                found.push(Selection {
                    bucket: bucket_index,
                    index,
                });
            }
        }
    }
    found.choose(rng).copied()
}

fn default_tier(bucket: &OrderedBucket) -> Vec<usize> {
    bucket
        .candidates()
        .iter()
        .enumerate()
        .filter(|(_, candidate)| !candidate.is_priority_tier())
        .map(|(index, _)| index)
        .collect()
}
