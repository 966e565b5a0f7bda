//! Debug event listeners for world mutations.
//!
//! Only compiled with the `world-events` feature. Listeners observe
//! structural changes for tooling (inspectors, loggers, invariant
//! checkers); they must not mutate the world from a callback.

use crate::entity::Entity;
use crate::filter::FilterId;

/// Observer for world lifecycle and structural changes.
///
/// All methods have empty default bodies; implement only the ones you
/// care about. Callbacks run inside the world's metadata critical
/// section, so they should be cheap and must not call back into the
/// world.
pub trait WorldEventListener: Send {
    /// A new entity was allocated.
    fn entity_created(&self, _entity: Entity) {}

    /// A component was added to or removed from the entity's pool `pool`.
    fn entity_changed(&self, _entity: Entity, _pool: usize) {}

    /// The entity was destroyed and its slot recycled.
    fn entity_destroyed(&self, _entity: Entity) {}

    /// A new filter was created (deduplicated rebuilds do not fire this).
    fn filter_created(&self, _filter: FilterId) {}

    /// Entity capacity doubled; sparse arrays were resized.
    fn world_resized(&self, _capacity: usize) {}

    /// The world is being dropped.
    fn world_disposed(&self) {}
}
