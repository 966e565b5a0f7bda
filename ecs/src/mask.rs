use crate::error::EcsError;

/// Hash multiplier for mask identity. Include ids are folded in with
/// addition, exclude ids with subtraction, so `inc<A>.exc<B>` and
/// `inc<B>.exc<A>` hash differently.
const HASH_MULTIPLIER: i64 = 314_159;

/// An immutable include/exclude constraint over pool ids.
///
/// Both lists are sorted and validated at construction: duplicated ids or
/// an id present on both sides make the mask invalid. Two masks built from
/// the same sets in any insertion order are identical and share a hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mask {
    pub include: Vec<u32>,
    pub exclude: Vec<u32>,
    pub hash: i64,
}

impl Mask {
    pub fn build(mut include: Vec<u32>, mut exclude: Vec<u32>) -> Result<Self, EcsError> {
        include.sort_unstable();
        exclude.sort_unstable();

        let has_duplicates = |ids: &[u32]| ids.windows(2).any(|w| w[0] == w[1]);
        if has_duplicates(&include) || has_duplicates(&exclude) {
            return Err(EcsError::InvalidMask);
        }
        if include.iter().any(|id| exclude.binary_search(id).is_ok()) {
            return Err(EcsError::InvalidMask);
        }

        let mut hash = (include.len() + exclude.len()) as i64;
        for &id in &include {
            hash = hash.wrapping_mul(HASH_MULTIPLIER).wrapping_add(id as i64);
        }
        for &id in &exclude {
            hash = hash.wrapping_mul(HASH_MULTIPLIER).wrapping_sub(id as i64);
        }

        Ok(Self {
            include,
            exclude,
            hash,
        })
    }
}
