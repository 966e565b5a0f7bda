use std::fmt;

/// Errors reported by the data-plane and the builder.
///
/// All preconditions these errors describe are programming mistakes; there
/// is no retry or recovery. Fallible operations return them through
/// `Result` and abort the current operation, leaving the world in the
/// state it had before the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A pool for this component type was never registered via
    /// [`World::allow_pool`](crate::World::allow_pool).
    PoolNotRegistered {
        /// Name of the unregistered component type.
        type_name: &'static str,
    },
    /// [`World::allow_pool`](crate::World::allow_pool) was called twice for
    /// the same component type.
    PoolAlreadyExists {
        /// Name of the duplicated component type.
        type_name: &'static str,
    },
    /// The entity is out of range or dead.
    InvalidEntity {
        /// Index of the offending entity.
        index: u32,
    },
    /// The entity already has a component of this type.
    AlreadyPresent {
        /// Name of the component type.
        type_name: &'static str,
    },
    /// The entity does not have a component of this type.
    NotPresent {
        /// Name of the component type.
        type_name: &'static str,
    },
    /// A filter mask contains a duplicated type or a type that is both
    /// included and excluded.
    InvalidMask,
    /// A post-hook check found an alive entity with zero components.
    LeakedEntity {
        /// Name of the world containing the leaked entity.
        world: String,
        /// Index of the leaked entity.
        index: u32,
    },
    /// A group toggle or query referenced a group the builder never created.
    UnknownGroup {
        /// The unknown group name.
        name: String,
    },
    /// The builder was configured in a way that cannot produce a dispatcher.
    Misconfigured {
        /// Human-readable description of the problem.
        reason: String,
    },
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolNotRegistered { type_name } => {
                write!(
                    f,
                    "Pool for `{type_name}` has never been registered. Call allow_pool() first."
                )
            }
            Self::PoolAlreadyExists { type_name } => {
                write!(f, "Pool for `{type_name}` is already registered")
            }
            Self::InvalidEntity { index } => {
                write!(f, "Entity {index} is out of range or dead")
            }
            Self::AlreadyPresent { type_name } => {
                write!(f, "Entity already has a `{type_name}` component")
            }
            Self::NotPresent { type_name } => {
                write!(f, "Entity has no `{type_name}` component")
            }
            Self::InvalidMask => {
                write!(f, "Filter mask has duplicated or overlapping include/exclude types")
            }
            Self::LeakedEntity { world, index } => {
                write!(f, "Entity {index} in world `{world}` is alive with zero components")
            }
            Self::UnknownGroup { name } => {
                write!(f, "Group `{name}` was never created by the builder")
            }
            Self::Misconfigured { reason } => {
                write!(f, "Builder misconfiguration: {reason}")
            }
        }
    }
}

impl std::error::Error for EcsError {}
