//! # Tessera ECS
//!
//! A sparse-set Entity-Component-System runtime with a static
//! conflict-graph scheduler and a barrier-driven frame dispatcher.
//!
//! ## Core Types
//!
//! - [`Entity`] — Bare slot index; [`PackedEntity`] adds the generation
//! - [`World`] — Entities, permission-listed component pools, and filters
//! - [`PoolRef`] / [`PoolMut`] — Borrow-checked access to pool storage
//! - [`FilterId`] — Handle to an incrementally maintained include/exclude set
//!
//! ## Systems & Scheduling
//!
//! - [`System`] — Run-system trait with static access declarations
//! - [`AccessDecl`] — Declared (world, component types) read/write sets
//! - [`EngineBuilder`] — Fluent registration; plans conflict-free buckets
//! - [`Dispatcher`] — Barrier-coordinated per-frame bucket execution
//! - [`TickMode`] — Loose / SemiLoose / SemiFixed / Fixed tick policies
//! - [`GroupHandle`] — Deferred enable/disable of named system groups
//!
//! Systems declare which component types they read and write per named
//! world. The builder partitions them, in submission order, into ordered
//! buckets whose members never conflict; each frame the dispatcher drains
//! the buckets with a fixed worker pool, systems within a bucket running
//! concurrently and buckets strictly sequentially.
//!
//! See `DESIGN.md` at the workspace root for architecture decisions.

mod access;
mod builder;
mod dispatcher;
mod entity;
mod error;
#[cfg(feature = "world-events")]
pub mod events;
mod filter;
mod group;
mod mask;
mod names;
mod planner;
mod pool;
mod registry;
mod system;
mod ticked;
mod world;

pub use access::AccessDecl;
pub use builder::EngineBuilder;
pub use dispatcher::Dispatcher;
pub use entity::{Entity, PackedEntity, PackedEntityWithWorld};
pub use error::EcsError;
#[cfg(feature = "world-events")]
pub use events::WorldEventListener;
pub use filter::FilterId;
pub use group::GroupHandle;
pub use pool::{PoolMut, PoolRef, SparseSet};
pub use system::{BuildContext, System};
pub use ticked::TickMode;
pub use world::{FilterBuilder, World};
