use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, mpsc};

use crate::access::SystemAccess;
use crate::dispatcher::Dispatcher;
use crate::error::EcsError;
use crate::group::{GroupHandle, GroupInfo, GroupTable};
use crate::names::{NameId, NameTable};
use crate::planner;
use crate::registry::Registry;
use crate::system::{BuildContext, System};
use crate::ticked::{TickMode, TickedSystem};
use crate::world::World;

type SystemCtor = Box<dyn FnOnce(&BuildContext<'_>) -> Box<dyn System>>;

struct QueuedSystem {
    name: &'static str,
    ctor: SystemCtor,
    access: SystemAccess,
    mode: TickMode,
    delay: f32,
    group: Option<usize>,
    enabled: bool,
}

/// Fluent configuration surface producing a [`Dispatcher`].
///
/// Per-system parameters (tick mode, tick delay, active group) are sticky:
/// once set they apply to every subsequent [`add`](EngineBuilder::add)
/// until changed.
///
/// # Example
///
/// ```no_run
/// use tessera_ecs::{EngineBuilder, TickMode, World};
/// # use tessera_ecs::{AccessDecl, BuildContext, System};
/// # struct Physics; impl System for Physics {
/// #     fn build(_ctx: &BuildContext<'_>) -> Self { Physics }
/// # }
/// # struct Ai; impl System for Ai {
/// #     fn build(_ctx: &BuildContext<'_>) -> Self { Ai }
/// # }
///
/// let mut builder = EngineBuilder::new();
/// builder
///     .add_world("main", World::new())
///     .set_tick_mode(TickMode::Fixed)
///     .set_tick_delay(1.0 / 60.0)
///     .add::<Physics>()
///     .set_tick_mode(TickMode::Loose)
///     .set_group("ai", true)
///     .add::<Ai>()
///     .clear_group();
///
/// let mut dispatcher = builder.finish(4).unwrap();
/// dispatcher.init().unwrap();
/// dispatcher.run(0.016);
/// dispatcher.shutdown().unwrap();
/// ```
pub struct EngineBuilder {
    names: NameTable,
    worlds: Vec<Arc<World>>,
    worlds_by_name: HashMap<NameId, usize>,
    singletons: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    injected: HashMap<String, Arc<dyn Any + Send + Sync>>,
    group_seeds: Vec<(String, bool)>,
    group_ids: HashMap<String, usize>,
    queued: Vec<QueuedSystem>,
    tick_mode: TickMode,
    tick_delay: f32,
    current_group: Option<usize>,
    error: Option<EcsError>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            names: NameTable::new(),
            worlds: Vec::new(),
            worlds_by_name: HashMap::new(),
            singletons: HashMap::new(),
            injected: HashMap::new(),
            group_seeds: Vec::new(),
            group_ids: HashMap::new(),
            queued: Vec::new(),
            tick_mode: TickMode::Loose,
            tick_delay: 0.0,
            current_group: None,
            error: None,
        }
    }

    fn fail(&mut self, reason: String) {
        self.error.get_or_insert(EcsError::Misconfigured { reason });
    }

    /// Registers a world under `name`. The first world added becomes the
    /// default world.
    pub fn add_world(&mut self, name: &str, mut world: World) -> &mut Self {
        if name.is_empty() {
            self.fail("world name must not be empty".to_string());
            return self;
        }
        let id = self.names.intern(name);
        if self.worlds_by_name.contains_key(&id) {
            self.fail(format!("world `{name}` registered twice"));
            return self;
        }
        world.set_name(name);
        self.worlds_by_name.insert(id, self.worlds.len());
        self.worlds.push(Arc::new(world));
        self
    }

    /// Sets the tick mode for subsequently added systems.
    pub fn set_tick_mode(&mut self, mode: TickMode) -> &mut Self {
        self.tick_mode = mode;
        self
    }

    /// Sets the tick delay (seconds) for subsequently added systems.
    /// Negative delays are clamped to zero.
    pub fn set_tick_delay(&mut self, seconds: f32) -> &mut Self {
        debug_assert!(seconds >= 0.0, "tick delay must be non-negative");
        self.tick_delay = seconds.max(0.0);
        self
    }

    /// Activates a named group for subsequently added systems, creating it
    /// with `default_state` if it does not exist yet. Re-activating an
    /// existing group keeps its original default state.
    pub fn set_group(&mut self, name: &str, default_state: bool) -> &mut Self {
        let id = match self.group_ids.get(name) {
            Some(&id) => id,
            None => {
                let id = self.group_seeds.len();
                self.group_seeds.push((name.to_string(), default_state));
                self.group_ids.insert(name.to_string(), id);
                id
            }
        };
        self.current_group = Some(id);
        self
    }

    /// Returns to the "no group" state; subsequent systems start enabled.
    pub fn clear_group(&mut self) -> &mut Self {
        self.current_group = None;
        self
    }

    /// Enqueues a system of type `S` with the currently set tick mode,
    /// tick delay, and group. The system is constructed at
    /// [`finish`](EngineBuilder::finish), after bucket planning.
    pub fn add<S: System>(&mut self) -> &mut Self {
        let enabled = self
            .current_group
            .map_or(true, |group| self.group_seeds[group].1);
        let access = SystemAccess::new(&S::reads(), &S::writes(), &mut self.names);
        self.queued.push(QueuedSystem {
            name: std::any::type_name::<S>(),
            ctor: Box::new(|ctx| Box::new(S::build(ctx)) as Box<dyn System>),
            access,
            mode: self.tick_mode,
            delay: self.tick_delay,
            group: self.current_group,
            enabled,
        });
        self
    }

    /// Stores a value retrievable by name via
    /// [`BuildContext::injected`](crate::BuildContext::injected).
    pub fn inject<T: Send + Sync + 'static>(&mut self, name: &str, value: T) -> &mut Self {
        self.injected.insert(name.to_string(), Arc::new(value));
        self
    }

    /// Stores a value retrievable by type via
    /// [`BuildContext::singleton`](crate::BuildContext::singleton).
    /// Replaces any earlier singleton of the same type.
    pub fn inject_singleton<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.singletons.insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    /// Plans buckets, constructs all queued systems in submission order,
    /// and materializes the dispatcher with `threads` workers (the calling
    /// thread counts as worker 0, so `threads - 1` background threads are
    /// spawned at [`init`](Dispatcher::init)).
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Misconfigured`] for zero threads, empty or
    /// duplicated world names, or a system declaring access to a world
    /// that was never added.
    pub fn finish(mut self, threads: usize) -> Result<Dispatcher, EcsError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if threads == 0 {
            return Err(EcsError::Misconfigured {
                reason: "at least one thread is required".to_string(),
            });
        }
        for queued in &self.queued {
            for world in queued.access.worlds() {
                if !self.worlds_by_name.contains_key(&world) {
                    return Err(EcsError::Misconfigured {
                        reason: format!(
                            "system `{}` declares access to unregistered world `{}`",
                            queued.name,
                            self.names.get(world)
                        ),
                    });
                }
            }
        }

        let accesses: Vec<SystemAccess> =
            self.queued.iter().map(|q| q.access.clone()).collect();
        let buckets = planner::plan(&accesses);

        let mut groups: Vec<GroupInfo> = self
            .group_seeds
            .into_iter()
            .map(|(name, state)| GroupInfo {
                name,
                state: AtomicBool::new(state),
                members: Vec::new(),
            })
            .collect();
        for (index, queued) in self.queued.iter().enumerate() {
            if let Some(group) = queued.group {
                groups[group].members.push(index);
            }
        }

        let registry = Arc::new(Registry {
            names: self.names,
            worlds: self.worlds,
            worlds_by_name: self.worlds_by_name,
            singletons: self.singletons,
            injected: self.injected,
            groups: GroupTable::new(groups),
        });

        let (group_tx, group_rx) = mpsc::channel();
        let mut slots = Vec::with_capacity(self.queued.len());
        let mut names = Vec::with_capacity(self.queued.len());
        {
            let ctx = BuildContext {
                registry: &registry,
                groups: GroupHandle::new(group_tx.clone()),
            };
            for queued in self.queued {
                let system = (queued.ctor)(&ctx);
                slots.push(std::sync::Mutex::new(TickedSystem::new(
                    system,
                    queued.mode,
                    queued.delay,
                    queued.enabled,
                )));
                names.push(queued.name);
            }
        }

        Ok(Dispatcher::new(
            registry, slots, names, buckets, group_tx, group_rx, threads,
        ))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
