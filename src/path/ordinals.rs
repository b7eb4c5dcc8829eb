//! Path ordinal registry.

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{PathBitSet, PropertyPath};

/// Dense integer id of a [`PropertyPath`] within one root type's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathOrdinal(pub u32);

impl PathOrdinal {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Display for PathOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bijection between the structural paths of one root type and dense ordinals.
///
/// Ordinals are assigned in registration order, starting at 0. The registry is
/// only mutable through `&mut self`; once bootstrap wraps it in an `Arc` it is
/// read-only and can be shared freely.
#[derive(Debug, Clone, Default)]
pub struct PathOrdinals {
    paths: Vec<PropertyPath>,
    ordinals: HashMap<PropertyPath, PathOrdinal>,
}

impl PathOrdinals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`, returning its ordinal. Registering a known path
    /// returns the ordinal it already has.
    pub fn register(&mut self, path: PropertyPath) -> PathOrdinal {
        if let Some(&ordinal) = self.ordinals.get(&path) {
            return ordinal;
        }
        let ordinal = PathOrdinal::from_index(self.paths.len());
        self.paths.push(path.clone());
        self.ordinals.insert(path, ordinal);
        ordinal
    }

    pub fn to_path(&self, ordinal: PathOrdinal) -> Option<&PropertyPath> {
        self.paths.get(ordinal.index())
    }

    pub fn to_ordinal(&self, path: &PropertyPath) -> Option<PathOrdinal> {
        self.ordinals.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Registered paths with their ordinals, in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (PathOrdinal, &PropertyPath)> {
        self.paths.iter().enumerate().map(|(idx, path)| (PathOrdinal::from_index(idx), path))
    }

    /// Build the dirtiness state of one changed instance from its dirty paths.
    ///
    /// Paths this registry never saw are not part of any indexed mapping and
    /// are dropped.
    pub fn dirtiness_state<I>(&self, dirty_paths: I) -> PathBitSet
    where
        I: IntoIterator,
        I::Item: std::borrow::Borrow<PropertyPath>,
    {
        use std::borrow::Borrow;

        let mut state = PathBitSet::new();
        for path in dirty_paths {
            let path = path.borrow();
            match self.to_ordinal(path) {
                Some(ordinal) => {
                    state.insert(ordinal);
                }
                None => tracing::trace!(path = %path, "dirty path is not mapped, ignoring"),
            }
        }
        state
    }

    /// Render the ordinals of `bits` as path strings, for diagnostics.
    pub fn describe(&self, bits: &PathBitSet) -> Vec<String> {
        bits.iter()
            .map(|ordinal| match self.to_path(ordinal) {
                Some(path) => path.to_string(),
                None => format!("#{ordinal}"),
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> PropertyPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_registration_order_is_dense() {
        let mut ordinals = PathOrdinals::new();
        assert_eq!(ordinals.register(path("name")), PathOrdinal(0));
        assert_eq!(ordinals.register(path("children")), PathOrdinal(1));
        assert_eq!(ordinals.register(path("children<collection>.name")), PathOrdinal(2));
        assert_eq!(ordinals.len(), 3);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut ordinals = PathOrdinals::new();
        let first = ordinals.register(path("children"));
        ordinals.register(path("name"));
        assert_eq!(ordinals.register(path("children")), first);
        assert_eq!(ordinals.len(), 2);
    }

    #[test]
    fn test_bijection() {
        let mut ordinals = PathOrdinals::new();
        for p in ["a", "b", "b<collection>.c"] {
            ordinals.register(path(p));
        }
        for (ordinal, p) in ordinals.iter() {
            assert_eq!(ordinals.to_ordinal(p), Some(ordinal));
            assert_eq!(ordinals.to_path(ordinal), Some(p));
        }
        assert_eq!(ordinals.to_path(PathOrdinal(3)), None);
    }

    #[test]
    fn test_dirtiness_state_drops_unmapped_paths() {
        let mut ordinals = PathOrdinals::new();
        ordinals.register(path("name"));
        let children = ordinals.register(path("children"));

        let state = ordinals.dirtiness_state([path("children"), path("unmapped")]);
        assert_eq!(state.iter().collect::<Vec<_>>(), vec![children]);
        assert_eq!(ordinals.describe(&state), vec!["children".to_string()]);
    }
}
