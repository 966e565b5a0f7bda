use std::sync::{Arc, Weak};

use crate::world::World;

/// A lightweight entity identifier.
///
/// An `Entity` is a bare slot index into its world's entity table. The
/// generation that proves the slot still refers to the same logical entity
/// lives in the table, not in the handle; use [`World::pack_entity`] to
/// obtain a handle that survives slot recycling.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u32);

impl Entity {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the slot index of this entity.
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// An entity handle carrying the generation it was packed with.
///
/// Unpacking succeeds only while the entity is alive with the same
/// generation, so a `PackedEntity` can be stored across frames without
/// risking slot reuse handing back an unrelated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedEntity {
    pub(crate) index: u32,
    pub(crate) generation: i16,
}

impl PackedEntity {
    /// Resolves the handle against a world.
    ///
    /// Returns `None` if the entity died or the slot was recycled since
    /// packing.
    pub fn unpack(&self, world: &World) -> Option<Entity> {
        let entity = Entity::new(self.index);
        if world.entity_generation(entity) == Some(self.generation) && self.generation > 0 {
            Some(entity)
        } else {
            None
        }
    }

    /// Upgrades the handle to one that also tracks its world's liveness.
    pub fn with_world(&self, world: &Arc<World>) -> PackedEntityWithWorld {
        PackedEntityWithWorld {
            index: self.index,
            generation: self.generation,
            world: Arc::downgrade(world),
        }
    }
}

/// An entity handle that additionally remembers which world it came from.
///
/// Holds a weak reference, so unpacking fails once the world itself is
/// dropped.
#[derive(Debug, Clone)]
pub struct PackedEntityWithWorld {
    pub(crate) index: u32,
    pub(crate) generation: i16,
    pub(crate) world: Weak<World>,
}

impl PackedEntityWithWorld {
    /// Resolves the handle, returning the owning world and the entity.
    ///
    /// Returns `None` if the world was dropped, the entity died, or the
    /// slot was recycled.
    pub fn unpack(&self) -> Option<(Arc<World>, Entity)> {
        let world = self.world.upgrade()?;
        let entity = self.local().unpack(&world)?;
        Some((world, entity))
    }

    /// Drops the world reference, keeping index and generation.
    pub fn local(&self) -> PackedEntity {
        PackedEntity {
            index: self.index,
            generation: self.generation,
        }
    }
}

/// Slot storage for one world's entities.
///
/// Generations are signed 16-bit values with the sign encoding liveness:
/// positive while alive, negative while the slot sits on the recycled
/// stack. Component counts track how many pools currently hold a component
/// for the slot; an alive entity whose count drops to zero is destroyed by
/// the world immediately.
pub(crate) struct EntityTable {
    /// Generation per slot, sign-encoded. `gens[i] > 0` iff slot i is alive.
    gens: Vec<i16>,
    /// Number of components attached to each slot.
    counts: Vec<u16>,
    /// Recyclable slot indices (LIFO).
    recycled: Vec<u32>,
    /// Allocated slot capacity; doubles when exceeded.
    capacity: usize,
    /// Number of currently alive entities.
    alive: u32,
}

impl EntityTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            gens: Vec::new(),
            counts: Vec::new(),
            recycled: Vec::new(),
            capacity: capacity.max(1),
            alive: 0,
        }
    }

    /// Allocates an entity, reusing a recycled slot if one is available.
    ///
    /// Returns the entity and whether the table's capacity grew, in which
    /// case the caller must resize pool and filter sparse arrays.
    pub fn allocate(&mut self) -> (Entity, bool) {
        self.alive += 1;

        if let Some(index) = self.recycled.pop() {
            let idx = index as usize;
            debug_assert!(self.gens[idx] < 0, "recycled slot {index} is not dead");
            self.gens[idx] = -self.gens[idx];
            self.counts[idx] = 0;
            return (Entity::new(index), false);
        }

        let index = self.gens.len() as u32;
        self.gens.push(1);
        self.counts.push(0);

        let mut grew = false;
        while self.gens.len() > self.capacity {
            self.capacity *= 2;
            grew = true;
        }
        (Entity::new(index), grew)
    }

    /// Marks an alive entity dead and pushes its slot onto the recycled
    /// stack. The caller must have removed all components first.
    pub fn kill(&mut self, entity: Entity) {
        let idx = entity.index() as usize;
        debug_assert!(self.gens[idx] > 0, "killing a dead entity {entity}");
        debug_assert_eq!(self.counts[idx], 0, "killing {entity} with components attached");

        let gen = self.gens[idx];
        self.gens[idx] = if gen == i16::MAX { -1 } else { -(gen + 1) };
        self.recycled.push(entity.index());
        self.alive -= 1;
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        let idx = entity.index() as usize;
        idx < self.gens.len() && self.gens[idx] > 0
    }

    pub fn generation(&self, entity: Entity) -> Option<i16> {
        self.gens.get(entity.index() as usize).copied()
    }

    pub fn count(&self, entity: Entity) -> u16 {
        self.counts.get(entity.index() as usize).copied().unwrap_or(0)
    }

    pub fn inc_count(&mut self, entity: Entity) {
        self.counts[entity.index() as usize] += 1;
    }

    /// Decrements the component count and returns the new value.
    pub fn dec_count(&mut self, entity: Entity) -> u16 {
        let idx = entity.index() as usize;
        debug_assert!(self.counts[idx] > 0, "component count underflow for {entity}");
        self.counts[idx] -= 1;
        self.counts[idx]
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of allocated slots (alive or recycled).
    pub fn len(&self) -> usize {
        self.gens.len()
    }

    pub fn alive_count(&self) -> u32 {
        self.alive
    }

    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.gens
            .iter()
            .enumerate()
            .filter(|(_, &gen)| gen > 0)
            .map(|(idx, _)| Entity::new(idx as u32))
    }

    /// Finds an alive entity with zero components, if any.
    pub fn find_leaked(&self) -> Option<Entity> {
        self.iter_alive()
            .find(|e| self.counts[e.index() as usize] == 0)
    }
}
