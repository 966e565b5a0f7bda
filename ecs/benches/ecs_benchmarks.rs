#![allow(dead_code)]

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use tessera_ecs::{AccessDecl, BuildContext, EngineBuilder, FilterId, System, World};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helper component types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Default)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Default)]
struct Health(f32);

fn world_with_pools() -> World {
    let mut world = World::with_capacity(16_384);
    world.allow_pool::<Position>().unwrap();
    world.allow_pool::<Velocity>().unwrap();
    world.allow_pool::<Health>().unwrap();
    world
}

// ---------------------------------------------------------------------------
// Entity allocation and recycling
// ---------------------------------------------------------------------------

fn bench_new_entity_10k(c: &mut Criterion) {
    c.bench_function("new_entity_10k", |b| {
        b.iter_batched(
            world_with_pools,
            |world| {
                for _ in 0..10_000 {
                    black_box(world.new_entity());
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_entity_recycling_1k(c: &mut Criterion) {
    c.bench_function("entity_recycle_1k", |b| {
        b.iter_batched(
            || {
                let world = world_with_pools();
                for _ in 0..1_000 {
                    let e = world.new_entity();
                    world.add::<Health>(e).unwrap();
                    world.del_entity(e);
                }
                world
            },
            |world| {
                // Re-allocating runs entirely through the recycled stack
                for _ in 0..1_000 {
                    black_box(world.new_entity());
                }
            },
            BatchSize::SmallInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Component add / del
// ---------------------------------------------------------------------------

fn bench_add_del_component_1k(c: &mut Criterion) {
    c.bench_function("add_del_component_1k", |b| {
        b.iter_batched(
            || {
                let world = world_with_pools();
                let entities: Vec<_> = (0..1_000)
                    .map(|_| {
                        let e = world.new_entity();
                        world.add::<Position>(e).unwrap();
                        e
                    })
                    .collect();
                (world, entities)
            },
            |(world, entities)| {
                for &e in &entities {
                    world.add::<Velocity>(e).unwrap();
                }
                for &e in &entities {
                    world.del::<Velocity>(e).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

// ---------------------------------------------------------------------------
// Filter iteration
// ---------------------------------------------------------------------------

fn bench_filter_iteration_8k(c: &mut Criterion) {
    let world = world_with_pools();
    let filter = world
        .filter()
        .inc::<Position>()
        .inc::<Velocity>()
        .end()
        .unwrap();
    for i in 0..8_192u32 {
        let e = world.new_entity();
        world.add::<Position>(e).unwrap();
        if i % 2 == 0 {
            world.add::<Velocity>(e).unwrap();
        }
    }

    c.bench_function("filter_iterate_8k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for entity in world.filter_entities(filter) {
                sum += world.pool::<Position>().unwrap().get(entity).unwrap().x;
            }
            black_box(sum)
        });
    });
}

// ---------------------------------------------------------------------------
// Full dispatch frame
// ---------------------------------------------------------------------------

struct Movement {
    world: Arc<World>,
    moving: FilterId,
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
        let entities = self.world.filter_entities(self.moving);
        let mut positions = self.world.pool_mut::<Position>().unwrap();
        let velocities = self.world.pool::<Velocity>().unwrap();
        for entity in entities {
            let vel = velocities.get(entity).unwrap();
            let pos = positions.get_mut(entity).unwrap();
            pos.x += vel.x * dt;
            pos.y += vel.y * dt;
            pos.z += vel.z * dt;
        }
    }
}

struct Decay {
    world: Arc<World>,
    living: FilterId,
}
impl System for Decay {
    fn build(ctx: &BuildContext<'_>) -> Self {
        let world = ctx.world("main");
        let living = world.filter().inc::<Health>().end().unwrap();
        Self { world, living }
    }
    fn writes() -> Vec<AccessDecl> {
        vec![AccessDecl::of::<Health>("main")]
    }
    fn run(&mut self, dt: f32, _worker_id: usize) {
        let entities = self.world.filter_entities(self.living);
        let mut healths = self.world.pool_mut::<Health>().unwrap();
        for entity in entities {
            healths.get_mut(entity).unwrap().0 -= dt;
        }
    }
}

fn bench_dispatch_frame_4k(c: &mut Criterion) {
    let world = world_with_pools();
    for _ in 0..4_096 {
        let e = world.new_entity();
        world
            .add_with(e, Position { x: 0.0, y: 0.0, z: 0.0 })
            .unwrap();
        world
            .add_with(e, Velocity { x: 1.0, y: 0.5, z: 0.0 })
            .unwrap();
        world.add_with(e, Health(100.0)).unwrap();
    }

    let mut builder = EngineBuilder::new();
    builder.add_world("main", world).add::<Movement>().add::<Decay>();
    let mut dispatcher = builder.finish(2).unwrap();
    dispatcher.init().unwrap();

    c.bench_function("dispatch_frame_4k", |b| {
        b.iter(|| dispatcher.run(black_box(0.016)));
    });

    dispatcher.shutdown().unwrap();
}

criterion_group!(
    benches,
    bench_new_entity_10k,
    bench_entity_recycling_1k,
    bench_add_del_component_1k,
    bench_filter_iteration_8k,
    bench_dispatch_frame_4k,
);
criterion_main!(benches);
