use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entity::Entity;

/// Typed sparse set storing components of type `T` for one world.
///
/// Dense storage is 1-based: slot 0 is reserved as "absent" so the sparse
/// array can use 0 as its null value. Freed dense slots are recycled
/// through a LIFO stack and their contents reset to `T::default()`.
///
/// Structural changes (allocation, freeing, transfer) are only reachable
/// through [`World`](crate::World) methods, which keep the owning entity's
/// component count and the world's filters in sync. The set itself exposes
/// lookups, iteration-free raw access, and in-place value mutation.
pub struct SparseSet<T> {
    /// Dense component values. Index 0 is a reserved default slot.
    dense: Vec<T>,
    /// `entity index -> dense slot`. 0 means the entity has no component.
    sparse: Vec<u32>,
    /// Dense slots freed by removal, ready for reuse.
    recycled: Vec<u32>,
    /// Invoked on the slot value at allocation (fresh or recycled).
    init: Option<fn(&mut T)>,
    /// Invoked on the slot value at removal, before the reset to default.
    destroy: Option<fn(&mut T)>,
}

impl<T: Default + Send + Sync + 'static> SparseSet<T> {
    pub(crate) fn new(
        capacity: usize,
        init: Option<fn(&mut T)>,
        destroy: Option<fn(&mut T)>,
    ) -> Self {
        Self {
            dense: vec![T::default()],
            sparse: vec![0; capacity],
            recycled: Vec::new(),
            init,
            destroy,
        }
    }

    /// Returns whether the entity has a component in this set.
    pub fn has(&self, entity: Entity) -> bool {
        self.sparse
            .get(entity.index() as usize)
            .is_some_and(|&slot| slot != 0)
    }

    /// Returns a reference to the entity's component.
    pub fn get(&self, entity: Entity) -> Option<&T> {
        let slot = *self.sparse.get(entity.index() as usize)?;
        if slot == 0 {
            return None;
        }
        Some(&self.dense[slot as usize])
    }

    /// Returns a mutable reference to the entity's component.
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        let slot = *self.sparse.get(entity.index() as usize)?;
        if slot == 0 {
            return None;
        }
        Some(&mut self.dense[slot as usize])
    }

    /// Number of live components in the set.
    pub fn len(&self) -> usize {
        self.dense.len() - 1 - self.recycled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocates a dense slot for the entity and runs the init hook.
    ///
    /// The caller must have verified the entity is absent.
    pub(crate) fn alloc(&mut self, entity: Entity) -> &mut T {
        let idx = entity.index() as usize;
        debug_assert!(!self.has(entity), "{entity} already present in pool");
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, 0);
        }

        let slot = self.recycled.pop().unwrap_or_else(|| {
            self.dense.push(T::default());
            (self.dense.len() - 1) as u32
        });
        if let Some(init) = self.init {
            init(&mut self.dense[slot as usize]);
        }
        self.sparse[idx] = slot;
        &mut self.dense[slot as usize]
    }

    /// Frees the entity's dense slot, running the destroy hook and
    /// resetting the value to default. Returns false if the entity had no
    /// component.
    pub(crate) fn free(&mut self, entity: Entity) -> bool {
        let idx = entity.index() as usize;
        let Some(&slot) = self.sparse.get(idx) else {
            return false;
        };
        if slot == 0 {
            return false;
        }

        if let Some(destroy) = self.destroy {
            destroy(&mut self.dense[slot as usize]);
        }
        self.dense[slot as usize] = T::default();
        self.recycled.push(slot);
        self.sparse[idx] = 0;
        true
    }

    /// Reassigns ownership of `src`'s slot to `dst` without touching the
    /// value. The caller must have verified `src` present and `dst` absent.
    pub(crate) fn transfer(&mut self, src: Entity, dst: Entity) {
        let dst_idx = dst.index() as usize;
        if dst_idx >= self.sparse.len() {
            self.sparse.resize(dst_idx + 1, 0);
        }
        self.sparse[dst_idx] = self.sparse[src.index() as usize];
        self.sparse[src.index() as usize] = 0;
    }

    /// Materializes a new slot for `dst` holding a copy of `src`'s value.
    /// Runs neither the init nor the destroy hook.
    pub(crate) fn duplicate(&mut self, src: Entity, dst: Entity)
    where
        T: Clone,
    {
        let dst_idx = dst.index() as usize;
        if dst_idx >= self.sparse.len() {
            self.sparse.resize(dst_idx + 1, 0);
        }
        let value = self.dense[self.sparse[src.index() as usize] as usize].clone();
        let slot = self.recycled.pop().unwrap_or_else(|| {
            self.dense.push(T::default());
            (self.dense.len() - 1) as u32
        });
        self.dense[slot as usize] = value;
        self.sparse[dst_idx] = slot;
    }

    /// Exchanges the two entities' sparse entries. Both must be present.
    pub(crate) fn swap_slots(&mut self, a: Entity, b: Entity) {
        self.sparse.swap(a.index() as usize, b.index() as usize);
    }

    /// Grows the sparse array to cover the new entity capacity.
    /// Dense storage is untouched.
    pub fn resize(&mut self, capacity: usize) {
        if capacity > self.sparse.len() {
            self.sparse.resize(capacity, 0);
        }
    }

    // ---- Raw access for debugging and serialization paths ----

    /// The dense value array, including the reserved slot 0.
    pub fn raw_dense(&self) -> &[T] {
        &self.dense
    }

    /// The sparse entity-index → dense-slot array.
    pub fn raw_sparse(&self) -> &[u32] {
        &self.sparse
    }

    /// Dense slots currently on the recycled stack.
    pub fn raw_recycled(&self) -> &[u32] {
        &self.recycled
    }
}

// Type-erased operation signatures, stored per pool so the world can reach
// pools discovered by integer id.
type ErasedStorage = dyn Any + Send + Sync;
type DelFn = fn(&ErasedStorage, Entity) -> bool;
type ResizeFn = fn(&ErasedStorage, usize);

/// A type-erased component pool: the typed sparse set behind its `RwLock`,
/// plus function pointers for the operations the world invokes without
/// knowing `T`.
pub(crate) struct PoolStorage {
    inner: Box<ErasedStorage>,
    /// Human-readable type name for error messages.
    type_name: &'static str,
    del_fn: DelFn,
    resize_fn: ResizeFn,
}

impl PoolStorage {
    pub fn new<T: Default + Send + Sync + 'static>(
        capacity: usize,
        init: Option<fn(&mut T)>,
        destroy: Option<fn(&mut T)>,
    ) -> Self {
        Self {
            inner: Box::new(RwLock::new(SparseSet::<T>::new(capacity, init, destroy))),
            type_name: std::any::type_name::<T>(),
            del_fn: |any, entity| {
                let lock = any.downcast_ref::<RwLock<SparseSet<T>>>().unwrap();
                let mut set = lock.try_write().unwrap_or_else(|_| {
                    panic!(
                        "Cannot borrow `{}` mutably: already borrowed",
                        std::any::type_name::<T>()
                    )
                });
                set.free(entity)
            },
            resize_fn: |any, capacity| {
                let lock = any.downcast_ref::<RwLock<SparseSet<T>>>().unwrap();
                let mut set = lock.try_write().unwrap_or_else(|_| {
                    panic!(
                        "Cannot borrow `{}` mutably: already borrowed",
                        std::any::type_name::<T>()
                    )
                });
                set.resize(capacity);
            },
        }
    }

    /// Downcasts to the typed lock.
    pub fn typed<T: 'static>(&self) -> &RwLock<SparseSet<T>> {
        self.inner.downcast_ref::<RwLock<SparseSet<T>>>().unwrap()
    }

    /// Removes the entity's component (type-erased). Returns true if it
    /// was present. Runs the destroy hook.
    pub fn del(&self, entity: Entity) -> bool {
        (self.del_fn)(self.inner.as_ref(), entity)
    }

    /// Grows the sparse array (type-erased).
    pub fn resize(&self, capacity: usize) {
        (self.resize_fn)(self.inner.as_ref(), capacity)
    }

    /// Acquires a shared read lock. Panics immediately if a write lock is
    /// held; instant conflict detection instead of a deadlock.
    pub fn lock_read<T: 'static>(&self) -> RwLockReadGuard<'_, SparseSet<T>> {
        self.typed::<T>().try_read().unwrap_or_else(|_| {
            panic!(
                "Cannot borrow `{}` immutably: already borrowed mutably",
                self.type_name
            )
        })
    }

    /// Acquires an exclusive write lock. Panics immediately if any lock is
    /// held.
    pub fn lock_write<T: 'static>(&self) -> RwLockWriteGuard<'_, SparseSet<T>> {
        self.typed::<T>().try_write().unwrap_or_else(|_| {
            panic!(
                "Cannot borrow `{}` mutably: already borrowed",
                self.type_name
            )
        })
    }
}

/// Shared read access to a component pool.
///
/// Releases the pool's read lock when dropped. Dereferences to
/// [`SparseSet<T>`] for lookups and raw access.
pub struct PoolRef<'a, T: 'static> {
    guard: RwLockReadGuard<'a, SparseSet<T>>,
}

impl<'a, T: 'static> PoolRef<'a, T> {
    pub(crate) fn new(guard: RwLockReadGuard<'a, SparseSet<T>>) -> Self {
        Self { guard }
    }
}

impl<T: 'static> Deref for PoolRef<'_, T> {
    type Target = SparseSet<T>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

/// Exclusive write access to a component pool.
///
/// Releases the pool's write lock when dropped. Dereferences to
/// [`SparseSet<T>`] for lookups and in-place value mutation. Do not call
/// structural `World` methods for the same component type while holding
/// this guard.
pub struct PoolMut<'a, T: 'static> {
    guard: RwLockWriteGuard<'a, SparseSet<T>>,
}

impl<'a, T: 'static> PoolMut<'a, T> {
    pub(crate) fn new(guard: RwLockWriteGuard<'a, SparseSet<T>>) -> Self {
        Self { guard }
    }
}

impl<T: 'static> Deref for PoolMut<'_, T> {
    type Target = SparseSet<T>;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T: 'static> DerefMut for PoolMut<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}
