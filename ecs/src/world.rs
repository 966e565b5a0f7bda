use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use fixedbitset::FixedBitSet;

use crate::entity::{Entity, EntityTable, PackedEntity, PackedEntityWithWorld};
use crate::error::EcsError;
use crate::filter::{FilterId, FilterStore};
use crate::mask::Mask;
use crate::pool::{PoolMut, PoolRef, PoolStorage};

#[cfg(feature = "world-events")]
use crate::events::WorldEventListener;

/// Default entity capacity for [`World::new`].
const DEFAULT_CAPACITY: usize = 256;

/// An isolated collection of entities, component pools, and filters.
///
/// Pools are permission-listed with [`allow_pool`](World::allow_pool)
/// before first use. Structural changes (entity lifecycle, component
/// add/del/transfer/clone/swap) go through `World` methods so the entity's
/// component count and every affected filter stay consistent; component
/// values are read and mutated through [`pool`](World::pool) /
/// [`pool_mut`](World::pool_mut) guards.
///
/// Methods take `&self`: pool data sits behind per-pool `RwLock`s and the
/// world metadata behind a mutex, so a scheduler that guarantees
/// non-conflicting access may drive systems on several threads against the
/// same world. The mutation API itself is still single-writer per
/// component type by contract; conflicting writers panic on the pool lock
/// instead of racing.
///
/// # Example
///
/// ```
/// use tessera_ecs::World;
///
/// #[derive(Default)]
/// struct Position { x: f32, y: f32 }
/// #[derive(Default)]
/// struct Velocity { x: f32, y: f32 }
///
/// let mut world = World::new();
/// world.allow_pool::<Position>().unwrap();
/// world.allow_pool::<Velocity>().unwrap();
///
/// let entity = world.new_entity();
/// world.add_with(entity, Position { x: 0.0, y: 0.0 }).unwrap();
/// world.add_with(entity, Velocity { x: 1.0, y: 0.0 }).unwrap();
///
/// let moving = world.filter().inc::<Position>().inc::<Velocity>().end().unwrap();
/// for entity in world.filter_entities(moving) {
///     let velocity = { world.pool::<Velocity>().unwrap().get(entity).unwrap().x };
///     let mut positions = world.pool_mut::<Position>().unwrap();
///     positions.get_mut(entity).unwrap().x += velocity;
/// }
/// ```
pub struct World {
    name: String,
    pools: Vec<PoolStorage>,
    pool_ids: HashMap<TypeId, usize>,
    meta: Mutex<WorldMeta>,
}

/// Cross-pool state: the entity table, one membership bitset per pool, and
/// the filter store. Guarded by a single mutex that is never held across
/// user code; the global lock order is pool lock first, then metadata.
struct WorldMeta {
    entities: EntityTable,
    /// `pool id -> bit per entity index`, set while the entity has the
    /// component. Mask matching reads only these bits, never pool locks.
    memberships: Vec<FixedBitSet>,
    filters: FilterStore,
    /// Recycled include/exclude vectors for filter builders.
    mask_pool: Vec<(Vec<u32>, Vec<u32>)>,
    #[cfg(feature = "world-events")]
    listeners: Vec<Box<dyn WorldEventListener>>,
}

impl WorldMeta {
    /// Membership bookkeeping plus filter maintenance for one pool change.
    ///
    /// On removal the membership bit is cleared only after the filters ran
    /// their compatibility checks, which therefore observe the pre-removal
    /// state.
    fn pool_changed(&mut self, pool: usize, entity: Entity, added: bool) {
        let idx = entity.index() as usize;
        if added {
            let bits = &mut self.memberships[pool];
            if idx >= bits.len() {
                bits.grow(idx + 1);
            }
            bits.insert(idx);
        }
        self.filters
            .on_pool_changed(pool, entity, added, &self.memberships);
        if !added {
            let bits = &mut self.memberships[pool];
            if idx < bits.len() {
                bits.set(idx, false);
            }
        }
    }

    fn has_membership(&self, pool: usize, entity: Entity) -> bool {
        let bits = &self.memberships[pool];
        let idx = entity.index() as usize;
        idx < bits.len() && bits.contains(idx)
    }

    #[cfg(feature = "world-events")]
    fn emit(&self, f: impl Fn(&dyn WorldEventListener)) {
        for listener in &self.listeners {
            f(&**listener);
        }
    }
}

impl World {
    /// Creates a world with the default entity capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a world pre-sized for `capacity` entities. Capacity doubles
    /// automatically when exceeded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            name: String::new(),
            pools: Vec::new(),
            pool_ids: HashMap::new(),
            meta: Mutex::new(WorldMeta {
                entities: EntityTable::new(capacity),
                memberships: Vec::new(),
                filters: FilterStore::new(),
                mask_pool: Vec::new(),
                #[cfg(feature = "world-events")]
                listeners: Vec::new(),
            }),
        }
    }

    /// The name assigned by the builder, empty for standalone worlds.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn meta(&self) -> MutexGuard<'_, WorldMeta> {
        self.meta.lock().unwrap()
    }

    // ---- Entity lifecycle ----

    /// Allocates a new entity, recycling a dead slot when possible.
    ///
    /// A freshly created entity has zero components; attach one before the
    /// next dispatcher hook boundary or the debug leak check reports it.
    pub fn new_entity(&self) -> Entity {
        let (entity, grown_capacity) = {
            let mut meta = self.meta();
            let (entity, grew) = meta.entities.allocate();
            let grown_capacity = if grew {
                let capacity = meta.entities.capacity();
                meta.filters.resize(capacity);
                #[cfg(feature = "world-events")]
                meta.emit(|l| l.world_resized(capacity));
                Some(capacity)
            } else {
                None
            };
            #[cfg(feature = "world-events")]
            meta.emit(|l| l.entity_created(entity));
            (entity, grown_capacity)
        };

        if let Some(capacity) = grown_capacity {
            for pool in &self.pools {
                pool.resize(capacity);
            }
        }
        entity
    }

    /// Destroys an entity: removes all its components (running destroy
    /// hooks), bumps the slot generation, and recycles the slot. No-op if
    /// the entity is already dead.
    pub fn del_entity(&self, entity: Entity) {
        {
            let mut meta = self.meta();
            if !meta.entities.is_alive(entity) {
                return;
            }
            if meta.entities.count(entity) == 0 {
                meta.entities.kill(entity);
                #[cfg(feature = "world-events")]
                meta.emit(|l| l.entity_destroyed(entity));
                return;
            }
        }

        // Drain components pool by pool; removing the last one cascades
        // back into the zero-count branch above via apply_removal.
        let mut next_pool = 0;
        loop {
            let found = {
                let meta = self.meta();
                if !meta.entities.is_alive(entity) || meta.entities.count(entity) == 0 {
                    None
                } else {
                    (next_pool..self.pools.len()).find(|&p| meta.has_membership(p, entity))
                }
            };
            let Some(pool) = found else { break };
            if self.pools[pool].del(entity) {
                self.apply_removal(pool, entity);
            }
            next_pool = pool + 1;
        }
    }

    /// Returns whether the entity is currently alive.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.meta().entities.is_alive(entity)
    }

    /// Number of alive entities.
    pub fn entity_count(&self) -> u32 {
        self.meta().entities.alive_count()
    }

    /// Snapshot of all currently alive entities.
    pub fn alive_entities(&self) -> Vec<Entity> {
        self.meta().entities.iter_alive().collect()
    }

    // ---- Pool registration ----

    /// Registers a component pool for `T` with no lifecycle hooks.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::PoolAlreadyExists`] on duplicate registration.
    pub fn allow_pool<T: Default + Send + Sync + 'static>(&mut self) -> Result<(), EcsError> {
        self.allow_pool_with::<T>(None, None)
    }

    /// Registers a component pool for `T` with optional init and destroy
    /// hooks.
    ///
    /// The init hook runs on the slot value at every allocation (fresh or
    /// recycled); the destroy hook runs at removal, before the value is
    /// reset to default.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::PoolAlreadyExists`] on duplicate registration.
    pub fn allow_pool_with<T: Default + Send + Sync + 'static>(
        &mut self,
        init: Option<fn(&mut T)>,
        destroy: Option<fn(&mut T)>,
    ) -> Result<(), EcsError> {
        let type_id = TypeId::of::<T>();
        if self.pool_ids.contains_key(&type_id) {
            return Err(EcsError::PoolAlreadyExists {
                type_name: std::any::type_name::<T>(),
            });
        }

        let meta = self.meta.get_mut().unwrap();
        let capacity = meta.entities.capacity();
        meta.memberships.push(FixedBitSet::with_capacity(capacity));
        meta.filters.register_pool();

        self.pool_ids.insert(type_id, self.pools.len());
        self.pools.push(PoolStorage::new::<T>(capacity, init, destroy));
        Ok(())
    }

    /// The dense pool id assigned to `T` in registration order.
    pub(crate) fn pool_id<T: 'static>(&self) -> Result<usize, EcsError> {
        self.pool_ids
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or(EcsError::PoolNotRegistered {
                type_name: std::any::type_name::<T>(),
            })
    }

    /// Number of registered pools.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    // ---- Component access ----

    /// Shared read access to the pool for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::PoolNotRegistered`] if `T` has no pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool is exclusively borrowed.
    pub fn pool<T: Default + Send + Sync + 'static>(&self) -> Result<PoolRef<'_, T>, EcsError> {
        let id = self.pool_id::<T>()?;
        Ok(PoolRef::new(self.pools[id].lock_read::<T>()))
    }

    /// Exclusive write access to the pool for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::PoolNotRegistered`] if `T` has no pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool is borrowed in any way.
    pub fn pool_mut<T: Default + Send + Sync + 'static>(&self) -> Result<PoolMut<'_, T>, EcsError> {
        let id = self.pool_id::<T>()?;
        Ok(PoolMut::new(self.pools[id].lock_write::<T>()))
    }

    /// Returns whether the entity has a `T` component. False for
    /// unregistered types.
    pub fn has<T: Default + Send + Sync + 'static>(&self, entity: Entity) -> bool {
        match self.pool_id::<T>() {
            Ok(id) => self.pools[id].lock_read::<T>().has(entity),
            Err(_) => false,
        }
    }

    /// Attaches a default-constructed `T` to the entity and runs the init
    /// hook.
    ///
    /// # Errors
    ///
    /// [`EcsError::PoolNotRegistered`], [`EcsError::AlreadyPresent`], and
    /// in debug builds [`EcsError::InvalidEntity`] for a dead entity.
    pub fn add<T: Default + Send + Sync + 'static>(&self, entity: Entity) -> Result<(), EcsError> {
        let id = self.pool_id::<T>()?;
        self.check_alive(entity)?;
        {
            let mut set = self.pools[id].lock_write::<T>();
            if set.has(entity) {
                return Err(EcsError::AlreadyPresent {
                    type_name: std::any::type_name::<T>(),
                });
            }
            set.alloc(entity);
        }
        self.apply_insertion(id, entity);
        Ok(())
    }

    /// Attaches `value` to the entity. The init hook runs first on the
    /// slot; the provided value then replaces its contents.
    ///
    /// # Errors
    ///
    /// Same as [`add`](World::add).
    pub fn add_with<T: Default + Send + Sync + 'static>(
        &self,
        entity: Entity,
        value: T,
    ) -> Result<(), EcsError> {
        let id = self.pool_id::<T>()?;
        self.check_alive(entity)?;
        {
            let mut set = self.pools[id].lock_write::<T>();
            if set.has(entity) {
                return Err(EcsError::AlreadyPresent {
                    type_name: std::any::type_name::<T>(),
                });
            }
            *set.alloc(entity) = value;
        }
        self.apply_insertion(id, entity);
        Ok(())
    }

    /// Attaches a default-constructed `T` if the entity does not already
    /// have one.
    pub fn get_or_add<T: Default + Send + Sync + 'static>(
        &self,
        entity: Entity,
    ) -> Result<(), EcsError> {
        match self.add::<T>(entity) {
            Err(EcsError::AlreadyPresent { .. }) | Ok(()) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Removes the entity's `T` component, running the destroy hook.
    /// No-op if the component is absent. If this was the entity's last
    /// component, the entity is destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::PoolNotRegistered`] if `T` has no pool.
    pub fn del<T: Default + Send + Sync + 'static>(&self, entity: Entity) -> Result<(), EcsError> {
        let id = self.pool_id::<T>()?;
        let removed = { self.pools[id].lock_write::<T>().free(entity) };
        if removed {
            self.apply_removal(id, entity);
        }
        Ok(())
    }

    /// Moves the existing `T` component from `src` to `dst` without
    /// copying the value. If this was `src`'s last component, `src` is
    /// destroyed.
    ///
    /// # Errors
    ///
    /// [`EcsError::NotPresent`] if `src` lacks the component,
    /// [`EcsError::AlreadyPresent`] if `dst` already has one.
    pub fn transfer<T: Default + Send + Sync + 'static>(
        &self,
        src: Entity,
        dst: Entity,
    ) -> Result<(), EcsError> {
        let id = self.pool_id::<T>()?;
        self.check_alive(src)?;
        self.check_alive(dst)?;
        {
            let mut set = self.pools[id].lock_write::<T>();
            if !set.has(src) {
                return Err(EcsError::NotPresent {
                    type_name: std::any::type_name::<T>(),
                });
            }
            if set.has(dst) {
                return Err(EcsError::AlreadyPresent {
                    type_name: std::any::type_name::<T>(),
                });
            }
            set.transfer(src, dst);
        }
        self.apply_insertion(id, dst);
        self.apply_removal(id, src);
        Ok(())
    }

    /// Copies `src`'s `T` component into a fresh slot owned by `dst`.
    /// Neither the init nor the destroy hook runs.
    ///
    /// # Errors
    ///
    /// Same as [`transfer`](World::transfer).
    pub fn clone_component<T: Clone + Default + Send + Sync + 'static>(
        &self,
        src: Entity,
        dst: Entity,
    ) -> Result<(), EcsError> {
        let id = self.pool_id::<T>()?;
        self.check_alive(src)?;
        self.check_alive(dst)?;
        {
            let mut set = self.pools[id].lock_write::<T>();
            if !set.has(src) {
                return Err(EcsError::NotPresent {
                    type_name: std::any::type_name::<T>(),
                });
            }
            if set.has(dst) {
                return Err(EcsError::AlreadyPresent {
                    type_name: std::any::type_name::<T>(),
                });
            }
            set.duplicate(src, dst);
        }
        self.apply_insertion(id, dst);
        Ok(())
    }

    /// Exchanges the `T` components of two entities. Both must have one.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NotPresent`] if either entity lacks the
    /// component.
    pub fn swap<T: Default + Send + Sync + 'static>(
        &self,
        a: Entity,
        b: Entity,
    ) -> Result<(), EcsError> {
        let id = self.pool_id::<T>()?;
        {
            let mut set = self.pools[id].lock_write::<T>();
            if !set.has(a) || !set.has(b) {
                return Err(EcsError::NotPresent {
                    type_name: std::any::type_name::<T>(),
                });
            }
            set.swap_slots(a, b);
        }
        #[cfg(feature = "world-events")]
        {
            let meta = self.meta();
            meta.emit(|l| l.entity_changed(a, id));
            meta.emit(|l| l.entity_changed(b, id));
        }
        Ok(())
    }

    fn apply_insertion(&self, pool: usize, entity: Entity) {
        let mut meta = self.meta();
        meta.pool_changed(pool, entity, true);
        meta.entities.inc_count(entity);
        #[cfg(feature = "world-events")]
        meta.emit(|l| l.entity_changed(entity, pool));
    }

    fn apply_removal(&self, pool: usize, entity: Entity) {
        let mut meta = self.meta();
        meta.pool_changed(pool, entity, false);
        #[cfg(feature = "world-events")]
        meta.emit(|l| l.entity_changed(entity, pool));
        if meta.entities.dec_count(entity) == 0 {
            meta.entities.kill(entity);
            #[cfg(feature = "world-events")]
            meta.emit(|l| l.entity_destroyed(entity));
        }
    }

    fn check_alive(&self, entity: Entity) -> Result<(), EcsError> {
        if cfg!(debug_assertions) && !self.is_alive(entity) {
            return Err(EcsError::InvalidEntity {
                index: entity.index(),
            });
        }
        Ok(())
    }

    // ---- Filters ----

    /// Starts building a filter over this world's pools.
    pub fn filter(&self) -> FilterBuilder<'_> {
        let (include, exclude) = self.meta().mask_pool.pop().unwrap_or_default();
        FilterBuilder {
            world: self,
            include,
            exclude,
            error: None,
        }
    }

    /// Snapshot of the entities currently matching the filter.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this world.
    pub fn filter_entities(&self, id: FilterId) -> Vec<Entity> {
        self.meta().filters.get(id).entities().to_vec()
    }

    /// Number of entities currently matching the filter.
    pub fn filter_len(&self, id: FilterId) -> usize {
        self.meta().filters.get(id).len()
    }

    /// Returns whether the entity currently matches the filter.
    pub fn filter_contains(&self, id: FilterId, entity: Entity) -> bool {
        self.meta().filters.get(id).contains(entity)
    }

    fn end_filter(&self, include: Vec<u32>, exclude: Vec<u32>) -> Result<FilterId, EcsError> {
        let mask = Mask::build(include, exclude)?;
        let mut meta = self.meta();
        if let Some(id) = meta.filters.find_by_hash(mask.hash) {
            let Mask {
                mut include,
                mut exclude,
                ..
            } = mask;
            include.clear();
            exclude.clear();
            meta.mask_pool.push((include, exclude));
            return Ok(id);
        }

        let capacity = meta.entities.capacity();
        let meta = &mut *meta;
        let id = meta
            .filters
            .insert(mask, capacity, &meta.entities, &meta.memberships);
        #[cfg(feature = "world-events")]
        meta.emit(|l| l.filter_created(id));
        Ok(id)
    }

    // ---- Packed handles ----

    /// Packs the entity together with its current generation.
    ///
    /// Packing a dead entity yields a handle that never unpacks.
    pub fn pack_entity(&self, entity: Entity) -> PackedEntity {
        let generation = self.entity_generation(entity).unwrap_or(0);
        PackedEntity {
            index: entity.index(),
            generation,
        }
    }

    /// Packs the entity with its generation and a weak reference to this
    /// world, so the handle also fails to unpack once the world is gone.
    pub fn pack_entity_with_world(self: &Arc<Self>, entity: Entity) -> PackedEntityWithWorld {
        self.pack_entity(entity).with_world(self)
    }

    // ---- Debug accessors ----

    /// Raw slot generation: positive while alive, negative while dead,
    /// `None` for never-allocated indices.
    pub fn entity_generation(&self, entity: Entity) -> Option<i16> {
        self.meta().entities.generation(entity)
    }

    /// Number of components currently attached to the entity.
    pub fn component_count(&self, entity: Entity) -> u16 {
        self.meta().entities.count(entity)
    }

    /// Current entity capacity.
    pub fn capacity(&self) -> usize {
        self.meta().entities.capacity()
    }

    /// Finds an alive entity with zero components, if any. Used by the
    /// dispatcher's debug leak check after user hooks.
    pub fn find_leaked(&self) -> Option<Entity> {
        self.meta().entities.find_leaked()
    }

    /// Registers a debug event listener.
    #[cfg(feature = "world-events")]
    pub fn add_event_listener(&mut self, listener: Box<dyn WorldEventListener>) {
        self.meta.get_mut().unwrap().listeners.push(listener);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "world-events")]
impl Drop for World {
    fn drop(&mut self) {
        if let Ok(meta) = self.meta.lock() {
            meta.emit(|l| l.world_disposed());
        }
    }
}

/// Fluent include/exclude filter builder returned by [`World::filter`].
///
/// Lookup errors from unregistered pools are deferred to
/// [`end`](FilterBuilder::end) so the chain stays uninterrupted.
pub struct FilterBuilder<'w> {
    world: &'w World,
    include: Vec<u32>,
    exclude: Vec<u32>,
    error: Option<EcsError>,
}

impl FilterBuilder<'_> {
    /// Requires entities to have a `T` component.
    pub fn inc<T: Default + Send + Sync + 'static>(mut self) -> Self {
        match self.world.pool_id::<T>() {
            Ok(id) => self.include.push(id as u32),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    /// Requires entities to not have a `T` component.
    pub fn exc<T: Default + Send + Sync + 'static>(mut self) -> Self {
        match self.world.pool_id::<T>() {
            Ok(id) => self.exclude.push(id as u32),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    /// Finalizes the mask and returns the (possibly shared) filter.
    ///
    /// # Errors
    ///
    /// [`EcsError::PoolNotRegistered`] from an `inc`/`exc` call, or
    /// [`EcsError::InvalidMask`] for duplicated or overlapping types.
    pub fn end(self) -> Result<FilterId, EcsError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.world.end_filter(self.include, self.exclude)
    }
}
