//! Path filters: the cheap dirtiness guard.

use serde::{Deserialize, Serialize};

use super::{PathBitSet, PathOrdinal, PathOrdinals, PropertyPath};
use crate::{Error, Result};

/// Immutable predicate over a dirtiness state.
///
/// - `test(None)` is always `true`: unknown dirtiness means "everything
///   changed", and a resolver must never skip reindexing on a guess.
/// - `test(Some(state))` is `true` iff `state` shares an ordinal with the
///   filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathFilter {
    ordinals: PathBitSet,
}

impl PathFilter {
    pub fn new(ordinals: PathBitSet) -> Self {
        Self { ordinals }
    }

    /// A filter that accepts only unknown dirtiness.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(ordinals: impl IntoIterator<Item = PathOrdinal>) -> Self {
        Self { ordinals: ordinals.into_iter().collect() }
    }

    /// Build a filter from paths, resolving them against `registry`.
    ///
    /// Every path must be registered; all unknown paths are reported together.
    pub fn from_paths<'p>(
        registry: &PathOrdinals,
        paths: impl IntoIterator<Item = &'p PropertyPath>,
    ) -> Result<Self> {
        let mut ordinals = PathBitSet::new();
        let mut unknown = Vec::new();
        for path in paths {
            match registry.to_ordinal(path) {
                Some(ordinal) => {
                    ordinals.insert(ordinal);
                }
                None => unknown.push(Error::UnknownPath(path.to_string())),
            }
        }
        match unknown.len() {
            0 => Ok(Self { ordinals }),
            1 => Err(unknown.remove(0)),
            _ => Err(Error::Build(unknown)),
        }
    }

    #[inline]
    pub fn test(&self, dirtiness: Option<&PathBitSet>) -> bool {
        match dirtiness {
            None => true,
            Some(state) => self.ordinals.intersects(state),
        }
    }

    /// The part of `dirtiness` this filter cares about. Unknown dirtiness
    /// stays unknown.
    pub fn filter(&self, dirtiness: Option<&PathBitSet>) -> Option<PathBitSet> {
        dirtiness.map(|state| self.ordinals.intersection(state))
    }

    pub fn union(&self, other: &PathFilter) -> PathFilter {
        let mut ordinals = self.ordinals.clone();
        ordinals.union_with(&other.ordinals);
        Self { ordinals }
    }

    pub fn ordinals(&self) -> &PathBitSet {
        &self.ordinals
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
