use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use crate::names::{NameId, NameTable};

/// One declared access of a system: a world name plus the component types
/// touched in it. An empty type list claims the whole world.
///
/// Declarations are produced by the static
/// [`System::reads`](crate::System::reads) /
/// [`System::writes`](crate::System::writes) functions, so the planner can
/// see them before any system is constructed.
///
/// # Example
///
/// ```
/// use tessera_ecs::AccessDecl;
///
/// struct Position;
/// struct Velocity;
///
/// // Reads Position and Velocity in the "main" world
/// let decl = AccessDecl::of::<Position>("main").and::<Velocity>();
/// // Writes everything in the "log" world
/// let wildcard = AccessDecl::whole("log");
/// # let _ = (decl, wildcard);
/// ```
#[derive(Debug, Clone)]
pub struct AccessDecl {
    pub(crate) world: &'static str,
    pub(crate) types: Vec<TypeId>,
}

impl AccessDecl {
    /// Declares access to every pool of the world (wildcard).
    pub fn whole(world: &'static str) -> Self {
        Self {
            world,
            types: Vec::new(),
        }
    }

    /// Declares access to a single component type in the world.
    pub fn of<T: 'static>(world: &'static str) -> Self {
        Self {
            world,
            types: vec![TypeId::of::<T>()],
        }
    }

    /// Adds another component type to this declaration.
    pub fn and<T: 'static>(mut self) -> Self {
        self.types.push(TypeId::of::<T>());
        self
    }
}

/// The set of component types a system touches in one world: either the
/// whole world or an explicit type set. Wildcards absorb everything they
/// are merged with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AccessMask {
    Whole,
    Types(HashSet<TypeId>),
}

impl AccessMask {
    fn from_types(types: &[TypeId]) -> Self {
        if types.is_empty() {
            Self::Whole
        } else {
            Self::Types(types.iter().copied().collect())
        }
    }

    pub fn merge(&mut self, other: &AccessMask) {
        match (&mut *self, other) {
            (Self::Whole, _) => {}
            (_, Self::Whole) => *self = Self::Whole,
            (Self::Types(mine), Self::Types(theirs)) => {
                mine.extend(theirs.iter().copied());
            }
        }
    }

    /// Whether any of the given types appears in this mask.
    pub fn intersects_types(&self, types: &HashSet<TypeId>) -> bool {
        match self {
            Self::Whole => true,
            Self::Types(mine) => types.iter().any(|t| mine.contains(t)),
        }
    }
}

/// A system's merged read and write sets, keyed by interned world name.
#[derive(Debug, Clone, Default)]
pub(crate) struct SystemAccess {
    pub reads: HashMap<NameId, AccessMask>,
    pub writes: HashMap<NameId, AccessMask>,
}

impl SystemAccess {
    /// Normalizes raw declarations: world names are interned, multiple
    /// declarations for the same world merge, and empty type lists become
    /// wildcards.
    pub fn new(reads: &[AccessDecl], writes: &[AccessDecl], names: &mut NameTable) -> Self {
        let mut access = Self::default();
        for decl in reads {
            let world = names.intern(decl.world);
            merge_into(&mut access.reads, world, &decl.types);
        }
        for decl in writes {
            let world = names.intern(decl.world);
            merge_into(&mut access.writes, world, &decl.types);
        }
        access
    }

    /// All worlds this system declares any access to.
    pub fn worlds(&self) -> HashSet<NameId> {
        self.reads.keys().chain(self.writes.keys()).copied().collect()
    }
}

fn merge_into(map: &mut HashMap<NameId, AccessMask>, world: NameId, types: &[TypeId]) {
    let mask = AccessMask::from_types(types);
    match map.entry(world) {
        std::collections::hash_map::Entry::Occupied(mut entry) => entry.get_mut().merge(&mask),
        std::collections::hash_map::Entry::Vacant(entry) => {
            entry.insert(mask);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn empty_types_become_wildcard() {
        let mut names = NameTable::new();
        let access = SystemAccess::new(&[], &[AccessDecl::whole("log")], &mut names);
        let world = names.find("log").unwrap();
        assert_eq!(access.writes[&world], AccessMask::Whole);
    }

    #[test]
    fn multiple_decls_same_world_merge() {
        let mut names = NameTable::new();
        let access = SystemAccess::new(
            &[AccessDecl::of::<A>("main"), AccessDecl::of::<B>("main")],
            &[],
            &mut names,
        );
        let world = names.find("main").unwrap();
        match &access.reads[&world] {
            AccessMask::Types(types) => {
                assert!(types.contains(&TypeId::of::<A>()));
                assert!(types.contains(&TypeId::of::<B>()));
            }
            AccessMask::Whole => panic!("expected explicit types"),
        }
    }

    #[test]
    fn wildcard_absorbs_types_on_merge() {
        let mut names = NameTable::new();
        let access = SystemAccess::new(
            &[AccessDecl::of::<A>("main"), AccessDecl::whole("main")],
            &[],
            &mut names,
        );
        let world = names.find("main").unwrap();
        assert_eq!(access.reads[&world], AccessMask::Whole);
    }

    #[test]
    fn writes_are_not_implicit_reads() {
        let mut names = NameTable::new();
        let access = SystemAccess::new(&[], &[AccessDecl::of::<A>("main")], &mut names);
        let world = names.find("main").unwrap();
        assert!(access.reads.get(&world).is_none());
        assert!(access.writes.contains_key(&world));
    }

    #[test]
    fn worlds_is_union_of_reads_and_writes() {
        let mut names = NameTable::new();
        let access = SystemAccess::new(
            &[AccessDecl::of::<A>("main")],
            &[AccessDecl::whole("log")],
            &mut names,
        );
        assert_eq!(access.worlds().len(), 2);
    }

    #[test]
    fn mask_intersection() {
        let types: HashSet<TypeId> = [TypeId::of::<A>()].into_iter().collect();
        assert!(AccessMask::Whole.intersects_types(&types));
        assert!(AccessMask::from_types(&[TypeId::of::<A>()]).intersects_types(&types));
        assert!(!AccessMask::from_types(&[TypeId::of::<B>()]).intersects_types(&types));
    }
}
