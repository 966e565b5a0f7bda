//! Static conflict-graph bucket planner.
//!
//! Systems are partitioned, in submission order, into an ordered list of
//! buckets. Systems sharing a bucket never conflict on any (world, type)
//! pair, so the dispatcher may run them concurrently; bucket order is the
//! authoritative execution order within a frame.

use std::collections::HashMap;

use crate::access::{AccessMask, SystemAccess};
use crate::names::NameId;

/// One phase of a frame: systems that can run concurrently, plus the
/// merged access sets that decide whether further systems still fit.
pub(crate) struct Bucket {
    /// Indices into the submission-ordered system list.
    pub systems: Vec<usize>,
    reads: HashMap<NameId, AccessMask>,
    writes: HashMap<NameId, AccessMask>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            systems: Vec::new(),
            reads: HashMap::new(),
            writes: HashMap::new(),
        }
    }

    fn insert(&mut self, index: usize, access: &SystemAccess) {
        self.systems.push(index);
        for (world, mask) in &access.reads {
            merge(&mut self.reads, *world, mask);
        }
        for (world, mask) in &access.writes {
            merge(&mut self.writes, *world, mask);
        }
    }
}

fn merge(map: &mut HashMap<NameId, AccessMask>, world: NameId, mask: &AccessMask) {
    match map.entry(world) {
        std::collections::hash_map::Entry::Occupied(mut entry) => entry.get_mut().merge(mask),
        std::collections::hash_map::Entry::Vacant(entry) => {
            entry.insert(mask.clone());
        }
    }
}

enum Fitness {
    /// The candidate conflicts with the bucket; it must be placed later.
    Invalid,
    /// The candidate fits; `shared_reads` counts read types already read
    /// by the bucket, used to co-locate readers of the same data.
    Allowed { shared_reads: usize },
}

/// Conflict check of a candidate system against a bucket.
///
/// A write conflicts with any prior read or write of the same (world,
/// type); wildcards conflict with any opposing entry, and a bucket that
/// already claims a whole world admits no further system touching it.
fn fitness(candidate: &SystemAccess, bucket: &Bucket) -> Fitness {
    let mut shared_reads = 0;

    for world in candidate.worlds() {
        let bucket_reads = bucket.reads.get(&world);
        let bucket_writes = bucket.writes.get(&world);

        if matches!(bucket_reads, Some(AccessMask::Whole))
            || matches!(bucket_writes, Some(AccessMask::Whole))
        {
            return Fitness::Invalid;
        }

        if let Some(writes) = candidate.writes.get(&world) {
            match writes {
                AccessMask::Whole => {
                    if bucket_reads.is_some() || bucket_writes.is_some() {
                        return Fitness::Invalid;
                    }
                }
                AccessMask::Types(types) => {
                    if bucket_reads.is_some_and(|m| m.intersects_types(types))
                        || bucket_writes.is_some_and(|m| m.intersects_types(types))
                    {
                        return Fitness::Invalid;
                    }
                }
            }
        }

        if let Some(reads) = candidate.reads.get(&world) {
            match reads {
                AccessMask::Whole => {
                    if bucket_writes.is_some() {
                        return Fitness::Invalid;
                    }
                }
                AccessMask::Types(types) => {
                    if bucket_writes.is_some_and(|m| m.intersects_types(types)) {
                        return Fitness::Invalid;
                    }
                    if let Some(AccessMask::Types(bucket_types)) = bucket_reads {
                        shared_reads += types.intersection(bucket_types).count();
                    }
                }
            }
        }
    }

    Fitness::Allowed { shared_reads }
}

/// Assigns each system to a bucket, preserving data-dependency order.
///
/// For each system in submission order the earliest legal bucket is one
/// past the last conflicting bucket, so a write always lands after every
/// earlier read or write of the same (world, type). Among the legal
/// buckets the one sharing the most read types wins, ties breaking to the
/// lowest index; if none fits, a new bucket is appended. The result is
/// deterministic for a given submission sequence.
pub(crate) fn plan(accesses: &[SystemAccess]) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();

    for (index, access) in accesses.iter().enumerate() {
        let metrics: Vec<Fitness> = buckets.iter().map(|b| fitness(access, b)).collect();
        let lo = metrics
            .iter()
            .rposition(|m| matches!(m, Fitness::Invalid))
            .map_or(0, |last_invalid| last_invalid + 1);

        let mut best: Option<(usize, usize)> = None;
        for (bucket_index, metric) in metrics.iter().enumerate().skip(lo) {
            if let Fitness::Allowed { shared_reads } = metric {
                if best.map_or(true, |(_, s)| *shared_reads > s) {
                    best = Some((bucket_index, *shared_reads));
                }
            }
        }

        let target = match best {
            Some((bucket_index, _)) => bucket_index,
            None => {
                buckets.push(Bucket::new());
                buckets.len() - 1
            }
        };
        buckets[target].insert(index, access);
    }

    buckets
}
