use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, mpsc};
use std::thread::JoinHandle;

use crate::entity::Entity;
use crate::error::EcsError;
use crate::group::{GroupCommand, GroupHandle};
use crate::planner::Bucket;
use crate::registry::Registry;
use crate::ticked::TickedSystem;
use crate::world::World;

/// State shared between the host thread and the worker threads.
///
/// Workers rendezvous with the host at two barriers per bucket: the start
/// barrier releases everyone into the bucket's work loop, the done barrier
/// confirms the bucket drained before the host publishes the next bucket
/// index. Two barriers keep the host from advancing `current_bucket`
/// before every worker has observed the previous value.
struct DispatchShared {
    slots: Vec<Mutex<TickedSystem>>,
    names: Vec<&'static str>,
    buckets: Vec<Bucket>,
    /// Index of the bucket currently being drained.
    current_bucket: AtomicUsize,
    /// Work-claim cursor into the current bucket's system list. The only
    /// contended writable state in the hot loop.
    current_system: AtomicUsize,
    /// Frame dt, broadcast as raw f32 bits.
    dt_bits: AtomicU32,
    disposed: AtomicBool,
    start: Barrier,
    done: Barrier,
}

impl DispatchShared {
    /// Claims and runs systems from the current bucket until the cursor
    /// passes the end. Runs on every worker, host included.
    fn drain_bucket(&self, worker_id: usize) {
        let bucket = &self.buckets[self.current_bucket.load(Ordering::Acquire)];
        let dt = f32::from_bits(self.dt_bits.load(Ordering::Acquire));
        loop {
            let claimed = self.current_system.fetch_add(1, Ordering::AcqRel);
            if claimed >= bucket.systems.len() {
                break;
            }
            let slot = bucket.systems[claimed];
            tessera_core::profile_scope_dynamic!(self.names[slot]);
            self.slots[slot].lock().unwrap().dispatch(dt, worker_id);
        }
    }
}

/// The per-frame engine: drives the worker pool through the ordered
/// bucket list and applies deferred group toggles between frames.
///
/// Produced by [`EngineBuilder::finish`](crate::EngineBuilder::finish).
/// Call [`init`](Dispatcher::init) once, then [`run`](Dispatcher::run)
/// every frame from the same host thread, and
/// [`shutdown`](Dispatcher::shutdown) when done (`Drop` shuts down as a
/// fallback).
pub struct Dispatcher {
    registry: Arc<Registry>,
    shared: Arc<DispatchShared>,
    group_tx: mpsc::Sender<GroupCommand>,
    group_rx: mpsc::Receiver<GroupCommand>,
    workers: Vec<JoinHandle<()>>,
    threads: usize,
    started: bool,
    disposed: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("threads", &self.threads)
            .field("started", &self.started)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<Registry>,
        slots: Vec<Mutex<TickedSystem>>,
        names: Vec<&'static str>,
        buckets: Vec<Bucket>,
        group_tx: mpsc::Sender<GroupCommand>,
        group_rx: mpsc::Receiver<GroupCommand>,
        threads: usize,
    ) -> Self {
        Self {
            registry,
            shared: Arc::new(DispatchShared {
                slots,
                names,
                buckets,
                current_bucket: AtomicUsize::new(0),
                current_system: AtomicUsize::new(0),
                dt_bits: AtomicU32::new(0),
                disposed: AtomicBool::new(false),
                start: Barrier::new(threads),
                done: Barrier::new(threads),
            }),
            group_tx,
            group_rx,
            workers: Vec::new(),
            threads,
            started: false,
            disposed: false,
        }
    }

    /// Runs the pre-init and init hooks of every system in submission
    /// order, then starts the worker threads.
    ///
    /// # Errors
    ///
    /// In debug builds, returns [`EcsError::LeakedEntity`] if any user
    /// hook left an alive entity with zero components.
    pub fn init(&mut self) -> Result<(), EcsError> {
        assert!(!self.started, "Dispatcher::init called twice");

        for slot in &self.shared.slots {
            slot.lock().unwrap().system.pre_init();
            self.check_leaks()?;
        }
        for slot in &self.shared.slots {
            slot.lock().unwrap().system.init();
            self.check_leaks()?;
        }

        for worker_id in 1..self.threads {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("tessera-worker-{worker_id}"))
                .spawn(move || {
                    tessera_core::set_thread_name!("ecs: worker");
                    loop {
                        shared.start.wait();
                        if shared.disposed.load(Ordering::Acquire) {
                            break;
                        }
                        shared.drain_bucket(worker_id);
                        shared.done.wait();
                    }
                })
                .expect("failed to spawn worker thread");
            self.workers.push(handle);
        }

        self.started = true;
        Ok(())
    }

    /// Dispatches one frame: applies pending group toggles, then drains
    /// every bucket in order, with all workers (this thread included)
    /// claiming systems inside each bucket.
    pub fn run(&mut self, dt: f32) {
        debug_assert!(self.started, "Dispatcher::run called before init()");
        tessera_core::profile_scope!("ecs: frame");

        while let Ok(command) = self.group_rx.try_recv() {
            self.registry.groups.apply(command, &self.shared.slots);
        }

        self.shared.dt_bits.store(dt.to_bits(), Ordering::Release);
        for bucket in 0..self.shared.buckets.len() {
            self.shared.current_bucket.store(bucket, Ordering::Release);
            self.shared.current_system.store(0, Ordering::Release);
            self.shared.start.wait();
            self.shared.drain_bucket(0);
            self.shared.done.wait();
        }

        tessera_core::frame_mark!();
    }

    /// Runs the destroy and post-destroy hooks in reverse submission
    /// order on this thread, then stops and joins the workers. Idempotent.
    ///
    /// # Errors
    ///
    /// In debug builds, returns [`EcsError::LeakedEntity`] if a destroy
    /// hook left an alive entity with zero components. Shutdown still
    /// completes; the first error is reported.
    pub fn shutdown(&mut self) -> Result<(), EcsError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let mut result = Ok(());
        for slot in self.shared.slots.iter().rev() {
            slot.lock().unwrap().system.destroy();
            if result.is_ok() {
                result = self.check_leaks();
            }
        }
        for slot in self.shared.slots.iter().rev() {
            slot.lock().unwrap().system.post_destroy();
            if result.is_ok() {
                result = self.check_leaks();
            }
        }

        if !self.workers.is_empty() {
            self.shared.disposed.store(true, Ordering::Release);
            // Release the workers from the start barrier so they can
            // observe the disposed flag and exit.
            self.shared.start.wait();
            for worker in self.workers.drain(..) {
                let _ = worker.join();
            }
        }
        result
    }

    fn check_leaks(&self) -> Result<(), EcsError> {
        if cfg!(debug_assertions) {
            for world in &self.registry.worlds {
                if let Some(entity) = world.find_leaked() {
                    return Err(EcsError::LeakedEntity {
                        world: world.name().to_string(),
                        index: entity.index(),
                    });
                }
            }
        }
        Ok(())
    }

    // ---- Groups ----

    /// Enables the group at the start of the next frame.
    pub fn enable_group_next_frame(&self, name: &str) {
        let _ = self.group_tx.send(GroupCommand::Enable(name.to_string()));
    }

    /// Disables the group at the start of the next frame.
    pub fn disable_group_next_frame(&self, name: &str) {
        let _ = self.group_tx.send(GroupCommand::Disable(name.to_string()));
    }

    /// Sets the group state at the start of the next frame.
    pub fn set_group_next_frame(&self, name: &str, state: bool) {
        let _ = self
            .group_tx
            .send(GroupCommand::Set(name.to_string(), state));
    }

    /// Inverts the group state at the start of the next frame.
    pub fn toggle_group_next_frame(&self, name: &str) {
        let _ = self.group_tx.send(GroupCommand::Toggle(name.to_string()));
    }

    /// Current state of the named group.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownGroup`] for a name the builder never
    /// created.
    pub fn group_state(&self, name: &str) -> Result<bool, EcsError> {
        self.registry.groups.state(name)
    }

    /// A handle for enqueuing group toggles from outside the dispatcher.
    pub fn group_handle(&self) -> GroupHandle {
        GroupHandle::new(self.group_tx.clone())
    }

    // ---- Lookups ----

    /// Resolves a world by name.
    pub fn world(&self, name: &str) -> Option<Arc<World>> {
        self.registry.world(name)
    }

    /// The default world (the first one added to the builder).
    pub fn default_world(&self) -> Option<Arc<World>> {
        self.registry.default_world()
    }

    /// Resolves the singleton of type `T`.
    pub fn singleton<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.registry.singleton::<T>()
    }

    /// Resolves the named injected value as type `T`.
    pub fn injected<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.registry.injected::<T>(name)
    }

    // ---- Introspection ----

    /// Number of planned buckets.
    pub fn bucket_count(&self) -> usize {
        self.shared.buckets.len()
    }

    /// System type names per bucket, in execution order.
    pub fn bucket_layout(&self) -> Vec<Vec<&'static str>> {
        self.shared
            .buckets
            .iter()
            .map(|bucket| {
                bucket
                    .systems
                    .iter()
                    .map(|&slot| self.shared.names[slot])
                    .collect()
            })
            .collect()
    }

    /// Configured worker count, the host thread included.
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Entities leaked across all worlds, for debug tooling.
    pub fn leaked_entities(&self) -> Vec<(String, Entity)> {
        self.registry
            .worlds
            .iter()
            .filter_map(|world| {
                world
                    .find_leaked()
                    .map(|entity| (world.name().to_string(), entity))
            })
            .collect()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if !self.disposed {
            if let Err(error) = self.shutdown() {
                log::warn!("error during dispatcher shutdown: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessDecl;
    use crate::builder::EngineBuilder;
    use crate::system::{BuildContext, System};
    use crate::ticked::TickMode;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct Position(f32);
    #[derive(Default)]
    struct Velocity(f32);

    fn world() -> World {
        let mut world = World::new();
        world.allow_pool::<Position>().unwrap();
        world.allow_pool::<Velocity>().unwrap();
        world
    }

    struct Movement {
        world: Arc<World>,
        moving: crate::filter::FilterId,
    }
    impl System for Movement {
        fn build(ctx: &BuildContext<'_>) -> Self {
            let world = ctx.world("main");
            let moving = world
                .filter()
                .inc::<Position>()
                .inc::<Velocity>()
                .end()
                .unwrap();
            Self { world, moving }
        }
        fn reads() -> Vec<AccessDecl> {
            vec![AccessDecl::of::<Velocity>("main")]
        }
        fn writes() -> Vec<AccessDecl> {
            vec![AccessDecl::of::<Position>("main")]
        }
        fn run(&mut self, dt: f32, _worker_id: usize) {
            for entity in self.world.filter_entities(self.moving) {
                let dx = self.world.pool::<Velocity>().unwrap().get(entity).unwrap().0;
                let mut positions = self.world.pool_mut::<Position>().unwrap();
                positions.get_mut(entity).unwrap().0 += dx * dt;
            }
        }
    }

    #[test]
    fn frame_moves_entities() {
        let world = world();
        let entity = world.new_entity();
        world.add_with(entity, Position(0.0)).unwrap();
        world.add_with(entity, Velocity(2.0)).unwrap();

        let mut builder = EngineBuilder::new();
        builder.add_world("main", world).add::<Movement>();
        let mut dispatcher = builder.finish(2).unwrap();
        dispatcher.init().unwrap();
        dispatcher.run(0.5);
        dispatcher.run(0.5);
        dispatcher.shutdown().unwrap();

        let world = dispatcher.world("main").unwrap();
        assert_eq!(world.pool::<Position>().unwrap().get(entity).unwrap().0, 2.0);
    }

    #[test]
    fn parallel_bucket_runs_all_systems() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        struct CountA;
        impl System for CountA {
            fn build(_ctx: &BuildContext<'_>) -> Self {
                CountA
            }
            fn run(&mut self, _dt: f32, _worker_id: usize) {
                COUNTER.fetch_add(1, Ordering::SeqCst);
            }
        }
        struct CountB;
        impl System for CountB {
            fn build(_ctx: &BuildContext<'_>) -> Self {
                CountB
            }
            fn run(&mut self, _dt: f32, _worker_id: usize) {
                COUNTER.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut builder = EngineBuilder::new();
        builder.add_world("main", world()).add::<CountA>().add::<CountB>();
        let mut dispatcher = builder.finish(4).unwrap();
        assert_eq!(dispatcher.bucket_count(), 1);

        dispatcher.init().unwrap();
        for _ in 0..10 {
            dispatcher.run(0.016);
        }
        dispatcher.shutdown().unwrap();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn buckets_run_in_order_within_a_frame() {
        static STAGE: AtomicU32 = AtomicU32::new(0);

        struct Writer;
        impl System for Writer {
            fn build(_ctx: &BuildContext<'_>) -> Self {
                Writer
            }
            fn writes() -> Vec<AccessDecl> {
                vec![AccessDecl::of::<Position>("main")]
            }
            fn run(&mut self, _dt: f32, _worker_id: usize) {
                STAGE.store(1, Ordering::SeqCst);
            }
        }
        struct Reader;
        impl System for Reader {
            fn build(_ctx: &BuildContext<'_>) -> Self {
                Reader
            }
            fn reads() -> Vec<AccessDecl> {
                vec![AccessDecl::of::<Position>("main")]
            }
            fn run(&mut self, _dt: f32, _worker_id: usize) {
                // The writer's bucket completed before this one started
                assert_eq!(STAGE.load(Ordering::SeqCst), 1);
                STAGE.store(2, Ordering::SeqCst);
            }
        }

        let mut builder = EngineBuilder::new();
        builder.add_world("main", world()).add::<Writer>().add::<Reader>();
        let mut dispatcher = builder.finish(4).unwrap();
        assert_eq!(dispatcher.bucket_count(), 2);

        dispatcher.init().unwrap();
        dispatcher.run(0.016);
        dispatcher.shutdown().unwrap();
        assert_eq!(STAGE.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lifecycle_hooks_run_in_order() {
        use std::sync::Mutex as StdMutex;
        static LOG: StdMutex<Vec<&'static str>> = StdMutex::new(Vec::new());

        struct First;
        impl System for First {
            fn build(_ctx: &BuildContext<'_>) -> Self {
                First
            }
            fn pre_init(&mut self) {
                LOG.lock().unwrap().push("first.pre_init");
            }
            fn init(&mut self) {
                LOG.lock().unwrap().push("first.init");
            }
            fn destroy(&mut self) {
                LOG.lock().unwrap().push("first.destroy");
            }
            fn post_destroy(&mut self) {
                LOG.lock().unwrap().push("first.post_destroy");
            }
        }
        struct Second;
        impl System for Second {
            fn build(_ctx: &BuildContext<'_>) -> Self {
                Second
            }
            fn pre_init(&mut self) {
                LOG.lock().unwrap().push("second.pre_init");
            }
            fn init(&mut self) {
                LOG.lock().unwrap().push("second.init");
            }
            fn destroy(&mut self) {
                LOG.lock().unwrap().push("second.destroy");
            }
            fn post_destroy(&mut self) {
                LOG.lock().unwrap().push("second.post_destroy");
            }
        }

        let mut builder = EngineBuilder::new();
        builder.add_world("main", world()).add::<First>().add::<Second>();
        let mut dispatcher = builder.finish(1).unwrap();
        dispatcher.init().unwrap();
        dispatcher.shutdown().unwrap();

        assert_eq!(
            *LOG.lock().unwrap(),
            vec![
                "first.pre_init",
                "second.pre_init",
                "first.init",
                "second.init",
                // Destroy phases run in reverse submission order
                "second.destroy",
                "first.destroy",
                "second.post_destroy",
                "first.post_destroy",
            ]
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    fn leaked_entity_detected_after_init_hook() {
        struct Leaker {
            world: Arc<World>,
        }
        impl System for Leaker {
            fn build(ctx: &BuildContext<'_>) -> Self {
                Self {
                    world: ctx.world("main"),
                }
            }
            fn init(&mut self) {
                self.world.new_entity();
            }
        }

        let mut builder = EngineBuilder::new();
        builder.add_world("main", world()).add::<Leaker>();
        let mut dispatcher = builder.finish(1).unwrap();
        let err = dispatcher.init().unwrap_err();
        assert!(matches!(err, EcsError::LeakedEntity { world, .. } if world == "main"));
    }

    #[test]
    fn tick_modes_apply_per_system() {
        static FIXED_RUNS: AtomicU32 = AtomicU32::new(0);

        struct FixedStep;
        impl System for FixedStep {
            fn build(_ctx: &BuildContext<'_>) -> Self {
                FixedStep
            }
            fn run(&mut self, dt: f32, _worker_id: usize) {
                assert!((dt - 0.01).abs() < 1e-6);
                FIXED_RUNS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut builder = EngineBuilder::new();
        builder
            .add_world("main", world())
            .set_tick_mode(TickMode::Fixed)
            .set_tick_delay(0.01)
            .add::<FixedStep>();
        let mut dispatcher = builder.finish(1).unwrap();
        dispatcher.init().unwrap();
        dispatcher.run(0.025);
        dispatcher.shutdown().unwrap();

        // 0.025 / 0.01 -> two invocations, 0.005 residue
        assert_eq!(FIXED_RUNS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shutdown_is_idempotent_and_drop_safe() {
        struct Noop;
        impl System for Noop {
            fn build(_ctx: &BuildContext<'_>) -> Self {
                Noop
            }
        }

        let mut builder = EngineBuilder::new();
        builder.add_world("main", world()).add::<Noop>();
        let mut dispatcher = builder.finish(3).unwrap();
        dispatcher.init().unwrap();
        dispatcher.run(0.016);
        dispatcher.shutdown().unwrap();
        dispatcher.shutdown().unwrap();
        // Drop after shutdown must not re-run hooks or hang
    }
}
