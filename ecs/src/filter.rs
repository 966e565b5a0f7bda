use std::collections::HashMap;

use fixedbitset::FixedBitSet;

use crate::entity::{Entity, EntityTable};
use crate::mask::Mask;

/// Handle to a filter owned by a [`World`](crate::World).
///
/// Filters are deduplicated by mask, so building the same include/exclude
/// combination twice yields the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(pub(crate) u32);

/// The live set of entities satisfying a mask.
///
/// Kept up to date incrementally by [`FilterStore::on_pool_changed`];
/// membership always mirrors the current pool contents.
pub(crate) struct Filter {
    pub mask: Mask,
    /// `entity index -> dense position + 1`. 0 means not in the filter.
    sparse: Vec<u32>,
    /// Matching entities, unordered.
    dense: Vec<Entity>,
}

impl Filter {
    fn new(mask: Mask, capacity: usize) -> Self {
        Self {
            mask,
            sparse: vec![0; capacity],
            dense: Vec::new(),
        }
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.sparse
            .get(entity.index() as usize)
            .is_some_and(|&pos| pos != 0)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.dense
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    fn add(&mut self, entity: Entity) {
        let idx = entity.index() as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, 0);
        }
        debug_assert_eq!(self.sparse[idx], 0, "{entity} inserted into filter twice");
        self.dense.push(entity);
        self.sparse[idx] = self.dense.len() as u32;
    }

    fn remove(&mut self, entity: Entity) {
        let idx = entity.index() as usize;
        let pos = self.sparse.get(idx).copied().unwrap_or(0);
        debug_assert_ne!(pos, 0, "{entity} removed from filter it is not in");
        if pos == 0 {
            return;
        }

        let pos = (pos - 1) as usize;
        self.sparse[idx] = 0;
        self.dense.swap_remove(pos);
        if pos < self.dense.len() {
            let moved = self.dense[pos];
            self.sparse[moved.index() as usize] = pos as u32 + 1;
        }
    }

    fn resize(&mut self, capacity: usize) {
        if capacity > self.sparse.len() {
            self.sparse.resize(capacity, 0);
        }
    }
}

/// All filters of one world, indexed by mask hash and by the pool ids they
/// watch.
///
/// Every registered pool has a slot in `by_included` and `by_excluded`
/// even when no filter watches it, so pool-change notification is a plain
/// index.
pub(crate) struct FilterStore {
    filters: Vec<Filter>,
    by_hash: HashMap<i64, u32>,
    /// `pool id -> filters including that pool`.
    by_included: Vec<Vec<u32>>,
    /// `pool id -> filters excluding that pool`.
    by_excluded: Vec<Vec<u32>>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            by_hash: HashMap::new(),
            by_included: Vec::new(),
            by_excluded: Vec::new(),
        }
    }

    /// Adds the per-pool filter-list slots for a newly registered pool.
    pub fn register_pool(&mut self) {
        self.by_included.push(Vec::new());
        self.by_excluded.push(Vec::new());
    }

    /// Returns the filter already built for this mask hash, if any.
    pub fn find_by_hash(&self, hash: i64) -> Option<FilterId> {
        self.by_hash.get(&hash).copied().map(FilterId)
    }

    /// Creates a filter for the mask and populates it with every alive
    /// entity currently matching.
    pub fn insert(
        &mut self,
        mask: Mask,
        capacity: usize,
        entities: &EntityTable,
        memberships: &[FixedBitSet],
    ) -> FilterId {
        let id = self.filters.len() as u32;
        self.by_hash.insert(mask.hash, id);
        for &pool in &mask.include {
            self.by_included[pool as usize].push(id);
        }
        for &pool in &mask.exclude {
            self.by_excluded[pool as usize].push(id);
        }

        let mut filter = Filter::new(mask, capacity);
        for entity in entities.iter_alive() {
            if compatible(&filter.mask, entity.index() as usize, memberships) {
                filter.add(entity);
            }
        }
        self.filters.push(filter);
        FilterId(id)
    }

    /// Incremental maintenance after a pool gained or lost a component for
    /// an entity.
    ///
    /// The caller guarantees the membership bit for `pool` reflects the
    /// post-add state on addition and the pre-removal state on removal, so
    /// a plain compatibility check resolves both directions for included
    /// pools.
    pub fn on_pool_changed(
        &mut self,
        pool: usize,
        entity: Entity,
        added: bool,
        memberships: &[FixedBitSet],
    ) {
        let idx = entity.index() as usize;

        for k in 0..self.by_included[pool].len() {
            let f = self.by_included[pool][k] as usize;
            if compatible(&self.filters[f].mask, idx, memberships) {
                if added {
                    self.filters[f].add(entity);
                } else {
                    self.filters[f].remove(entity);
                }
            }
        }

        for k in 0..self.by_excluded[pool].len() {
            let f = self.by_excluded[pool][k] as usize;
            if compatible_without(&self.filters[f].mask, idx, pool as u32, memberships) {
                if added {
                    self.filters[f].remove(entity);
                } else {
                    self.filters[f].add(entity);
                }
            }
        }
    }

    pub fn get(&self, id: FilterId) -> &Filter {
        &self.filters[id.0 as usize]
    }

    /// Grows every filter's sparse index to the new entity capacity.
    pub fn resize(&mut self, capacity: usize) {
        for filter in &mut self.filters {
            filter.resize(capacity);
        }
    }
}

fn bit(memberships: &[FixedBitSet], pool: u32, idx: usize) -> bool {
    let bits = &memberships[pool as usize];
    idx < bits.len() && bits.contains(idx)
}

/// An entity satisfies a mask iff every included pool holds it and no
/// excluded pool holds it.
pub(crate) fn compatible(mask: &Mask, idx: usize, memberships: &[FixedBitSet]) -> bool {
    mask.include.iter().all(|&pool| bit(memberships, pool, idx))
        && !mask.exclude.iter().any(|&pool| bit(memberships, pool, idx))
}

/// Mask compatibility with one pool id ignored on the exclude side.
/// A mask including the skipped pool never matches.
pub(crate) fn compatible_without(
    mask: &Mask,
    idx: usize,
    skip: u32,
    memberships: &[FixedBitSet],
) -> bool {
    mask.include
        .iter()
        .all(|&pool| pool != skip && bit(memberships, pool, idx))
        && !mask
            .exclude
            .iter()
            .any(|&pool| pool != skip && bit(memberships, pool, idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memberships(n: usize) -> Vec<FixedBitSet> {
        (0..n).map(|_| FixedBitSet::with_capacity(64)).collect()
    }

    fn mask(include: Vec<u32>, exclude: Vec<u32>) -> Mask {
        Mask::build(include, exclude).unwrap()
    }

    #[test]
    fn compatible_requires_all_includes() {
        let mut bits = memberships(2);
        bits[0].insert(3);
        let m = mask(vec![0, 1], vec![]);
        assert!(!compatible(&m, 3, &bits));
        bits[1].insert(3);
        assert!(compatible(&m, 3, &bits));
    }

    #[test]
    fn compatible_rejects_excluded() {
        let mut bits = memberships(2);
        bits[0].insert(3);
        bits[1].insert(3);
        let m = mask(vec![0], vec![1]);
        assert!(!compatible(&m, 3, &bits));
    }

    #[test]
    fn compatible_without_skips_the_excluded_pool() {
        let mut bits = memberships(2);
        bits[0].insert(3);
        bits[1].insert(3);
        let m = mask(vec![0], vec![1]);
        // Pool 1 ignored, so the entity counts as matching
        assert!(compatible_without(&m, 3, 1, &bits));
    }

    #[test]
    fn compatible_without_never_matches_skipped_include() {
        let mut bits = memberships(2);
        bits[0].insert(3);
        let m = mask(vec![0], vec![]);
        assert!(!compatible_without(&m, 3, 0, &bits));
    }

    #[test]
    fn filter_add_remove_swap_remove() {
        let mut filter = Filter::new(mask(vec![0], vec![]), 8);
        let (a, b, c) = (Entity::new(0), Entity::new(1), Entity::new(2));
        filter.add(a);
        filter.add(b);
        filter.add(c);
        assert_eq!(filter.len(), 3);

        // Removing the middle entity swaps the last one into its place
        filter.remove(b);
        assert_eq!(filter.len(), 2);
        assert!(filter.contains(a));
        assert!(!filter.contains(b));
        assert!(filter.contains(c));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "inserted into filter twice")]
    fn duplicate_insert_is_fatal_in_debug() {
        let mut filter = Filter::new(mask(vec![0], vec![]), 8);
        filter.add(Entity::new(0));
        filter.add(Entity::new(0));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "removed from filter it is not in")]
    fn absent_remove_is_fatal_in_debug() {
        let mut filter = Filter::new(mask(vec![0], vec![]), 8);
        filter.remove(Entity::new(0));
    }

    #[test]
    fn store_initial_scan_picks_up_matches() {
        let mut entities = EntityTable::new(8);
        let e0 = entities.allocate().0;
        let e1 = entities.allocate().0;
        entities.inc_count(e0);
        entities.inc_count(e1);

        let mut bits = memberships(1);
        bits[0].insert(e0.index() as usize);

        let mut store = FilterStore::new();
        store.register_pool();
        let id = store.insert(mask(vec![0], vec![]), 8, &entities, &bits);

        assert_eq!(store.get(id).entities(), &[e0]);
        assert!(!store.get(id).contains(e1));
    }

    #[test]
    fn store_incremental_update_included() {
        let entities = EntityTable::new(8);
        let mut bits = memberships(1);
        let mut store = FilterStore::new();
        store.register_pool();
        let id = store.insert(mask(vec![0], vec![]), 8, &entities, &bits);

        let e = Entity::new(4);
        bits[0].insert(4);
        store.on_pool_changed(0, e, true, &bits);
        assert!(store.get(id).contains(e));

        // Removal notification runs while the bit is still set
        store.on_pool_changed(0, e, false, &bits);
        bits[0].set(4, false);
        assert!(!store.get(id).contains(e));
    }

    #[test]
    fn store_incremental_update_excluded() {
        let mut entities = EntityTable::new(8);
        let e = entities.allocate().0;
        entities.inc_count(e);

        let mut bits = memberships(2);
        bits[0].insert(e.index() as usize);

        let mut store = FilterStore::new();
        store.register_pool();
        store.register_pool();
        let id = store.insert(mask(vec![0], vec![1]), 8, &entities, &bits);
        assert!(store.get(id).contains(e));

        // Excluded component arrives: entity leaves the filter
        bits[1].insert(e.index() as usize);
        store.on_pool_changed(1, e, true, &bits);
        assert!(!store.get(id).contains(e));

        // Excluded component removed again: entity comes back
        store.on_pool_changed(1, e, false, &bits);
        bits[1].set(e.index() as usize, false);
        assert!(store.get(id).contains(e));
    }
}
