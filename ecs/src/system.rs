use std::sync::Arc;

use crate::access::AccessDecl;
use crate::group::GroupHandle;
use crate::registry::Registry;
use crate::world::World;

/// A unit of work scheduled by the dispatcher.
///
/// Systems are enqueued by type through
/// [`EngineBuilder::add`](crate::EngineBuilder::add) and constructed at
/// [`finish`](crate::EngineBuilder::finish) via [`build`](System::build),
/// which receives a [`BuildContext`] for resolving worlds, singletons,
/// injected values, and a group handle. The static [`reads`](System::reads)
/// and [`writes`](System::writes) functions declare the access sets the
/// planner partitions buckets with; they must cover everything
/// [`run`](System::run) touches, or systems sharing a bucket will contend
/// on pool locks instead of running in parallel.
///
/// Lifecycle: `pre_init` and `init` run on the host thread in submission
/// order before the first frame; `destroy` and `post_destroy` run in
/// reverse submission order at shutdown. `run` executes once per frame
/// invocation (subject to the system's tick mode) on whichever worker
/// claimed it.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tessera_ecs::{AccessDecl, BuildContext, System, World};
///
/// #[derive(Default)]
/// struct Position { x: f32 }
/// #[derive(Default)]
/// struct Velocity { x: f32 }
///
/// struct Movement {
///     world: Arc<World>,
///     moving: tessera_ecs::FilterId,
/// }
///
/// impl System for Movement {
///     fn build(ctx: &BuildContext<'_>) -> Self {
///         let world = ctx.world("main");
///         let moving = world.filter().inc::<Position>().inc::<Velocity>().end().unwrap();
///         Self { world, moving }
///     }
///
///     fn reads() -> Vec<AccessDecl> {
///         vec![AccessDecl::of::<Velocity>("main")]
///     }
///
///     fn writes() -> Vec<AccessDecl> {
///         vec![AccessDecl::of::<Position>("main")]
///     }
///
///     fn run(&mut self, dt: f32, _worker_id: usize) {
///         for entity in self.world.filter_entities(self.moving) {
///             let dx = self.world.pool::<Velocity>().unwrap().get(entity).unwrap().x;
///             let mut positions = self.world.pool_mut::<Position>().unwrap();
///             positions.get_mut(entity).unwrap().x += dx * dt;
///         }
///     }
/// }
/// ```
pub trait System: Send + 'static {
    /// Constructs the system once buckets are planned and all worlds,
    /// singletons, and injected values are registered.
    fn build(ctx: &BuildContext<'_>) -> Self
    where
        Self: Sized;

    /// Component types this system reads, per world. Empty by default.
    fn reads() -> Vec<AccessDecl>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Component types this system writes, per world. Empty by default.
    /// A written type is not implicitly readable; declare both when
    /// needed.
    fn writes() -> Vec<AccessDecl>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// First init phase, host thread, submission order.
    fn pre_init(&mut self) {}

    /// Second init phase, host thread, submission order.
    fn init(&mut self) {}

    /// Per-frame work. `dt` depends on the system's tick mode;
    /// `worker_id` identifies the executing worker (0 is the host
    /// thread).
    fn run(&mut self, dt: f32, worker_id: usize) {
        let _ = (dt, worker_id);
    }

    /// First shutdown phase, host thread, reverse submission order.
    fn destroy(&mut self) {}

    /// Second shutdown phase, host thread, reverse submission order.
    fn post_destroy(&mut self) {}
}

/// Resolution context handed to [`System::build`].
///
/// Lookups panic on missing names or types: a system that cannot resolve
/// its dependencies is a wiring bug, reported at build time.
pub struct BuildContext<'a> {
    pub(crate) registry: &'a Registry,
    pub(crate) groups: GroupHandle,
}

impl BuildContext<'_> {
    /// Resolves a world registered under `name`.
    ///
    /// # Panics
    ///
    /// Panics if no world with this name was added to the builder.
    pub fn world(&self, name: &str) -> Arc<World> {
        self.registry
            .world(name)
            .unwrap_or_else(|| panic!("World `{name}` is not registered"))
    }

    /// Resolves the default world (the first one added to the builder).
    ///
    /// # Panics
    ///
    /// Panics if the builder registered no worlds.
    pub fn default_world(&self) -> Arc<World> {
        self.registry
            .default_world()
            .expect("no worlds registered with the builder")
    }

    /// Resolves the singleton of type `T`.
    ///
    /// # Panics
    ///
    /// Panics if no singleton of this type was injected.
    pub fn singleton<T: Send + Sync + 'static>(&self) -> Arc<T> {
        self.registry.singleton::<T>().unwrap_or_else(|| {
            panic!(
                "Singleton `{}` was not injected",
                std::any::type_name::<T>()
            )
        })
    }

    /// Resolves the named injected value as type `T`.
    ///
    /// # Panics
    ///
    /// Panics if nothing was injected under `name` or its type is not `T`.
    pub fn injected<T: Send + Sync + 'static>(&self, name: &str) -> Arc<T> {
        self.registry.injected::<T>(name).unwrap_or_else(|| {
            panic!(
                "No `{}` injected under `{name}`",
                std::any::type_name::<T>()
            )
        })
    }

    /// A handle for enqueuing group toggles from this system at run time.
    pub fn groups(&self) -> GroupHandle {
        self.groups.clone()
    }
}
