use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::group::GroupTable;
use crate::names::{NameId, NameTable};
use crate::world::World;

/// Build-time wiring shared by the dispatcher and every system: named
/// worlds, singletons, named injected values, and the group table.
///
/// Written only while the builder runs; read-only during dispatch.
pub(crate) struct Registry {
    pub names: NameTable,
    pub worlds: Vec<Arc<World>>,
    pub worlds_by_name: HashMap<NameId, usize>,
    pub singletons: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    pub injected: HashMap<String, Arc<dyn Any + Send + Sync>>,
    pub groups: GroupTable,
}

impl Registry {
    pub fn world(&self, name: &str) -> Option<Arc<World>> {
        let id = self.names.find(name)?;
        self.worlds_by_name
            .get(&id)
            .map(|&index| Arc::clone(&self.worlds[index]))
    }

    pub fn default_world(&self) -> Option<Arc<World>> {
        self.worlds.first().cloned()
    }

    pub fn singleton<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let any = self.singletons.get(&TypeId::of::<T>())?.clone();
        any.downcast::<T>().ok()
    }

    pub fn injected<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let any = self.injected.get(name)?.clone();
        any.downcast::<T>().ok()
    }
}
