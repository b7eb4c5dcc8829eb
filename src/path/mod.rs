//! # Property Paths
//!
//! Structural paths from a root type down to a property, their dense
//! per-root-type ordinals, and the bitset machinery built on those ordinals.
//!
//! Dirtiness is never compared by path string at runtime: the registry turns
//! every mapped path into a [`PathOrdinal`] at bootstrap, and a dirtiness
//! state is then just a [`PathBitSet`] tested against [`PathFilter`]s.

pub mod ordinals;
pub mod bitset;
pub mod filter;

pub use ordinals::{PathOrdinal, PathOrdinals};
pub use bitset::PathBitSet;
pub use filter::PathFilter;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Path steps
// ============================================================================

/// One step of a [`PropertyPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum PathStep {
    /// Read a named property.
    Property(String),
    /// Descend into the elements of a container, using the named extractor.
    Container(String),
}

// ============================================================================
// PropertyPath
// ============================================================================

/// A structural property-access path from a root type.
///
/// The textual form joins property steps with `.` and appends container steps
/// as `<extractor>`: `children<collection>.parent.name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyPath {
    steps: Vec<PathStep>,
}

impl PropertyPath {
    /// The empty path (the root value itself).
    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.steps.push(PathStep::Property(name.into()));
        self
    }

    pub fn container(mut self, extractor: impl Into<String>) -> Self {
        self.steps.push(PathStep::Container(extractor.into()));
        self
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The path without its last step, or `None` for the root path.
    pub fn parent(&self) -> Option<PropertyPath> {
        let (_, init) = self.steps.split_last()?;
        Some(Self { steps: init.to_vec() })
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &PropertyPath) -> bool {
        other.steps.starts_with(&self.steps)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for step in &self.steps {
            match step {
                PathStep::Property(name) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathStep::Container(extractor) => write!(f, "<{extractor}>")?,
            }
            first = false;
        }
        Ok(())
    }
}

impl FromStr for PropertyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidPath(s.to_string());
        let mut path = PropertyPath::root();
        if s.is_empty() {
            return Ok(path);
        }

        for segment in s.split('.') {
            let (name, mut rest) = match segment.find('<') {
                Some(idx) => segment.split_at(idx),
                None => (segment, ""),
            };
            if name.is_empty() || !name.chars().all(is_name_char) {
                return Err(invalid());
            }
            path = path.property(name);

            while !rest.is_empty() {
                let close = rest.find('>').ok_or_else(invalid)?;
                let extractor = &rest[1..close];
                if extractor.is_empty() || !extractor.chars().all(is_name_char) {
                    return Err(invalid());
                }
                path = path.container(extractor);
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('<') {
                    return Err(invalid());
                }
            }
        }
        Ok(path)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let path = PropertyPath::root()
            .property("children")
            .container("collection")
            .property("parent")
            .property("name");
        assert_eq!(path.to_string(), "children<collection>.parent.name");
        assert_eq!("children<collection>.parent.name".parse::<PropertyPath>().unwrap(), path);
    }

    #[test]
    fn test_nested_containers() {
        let path: PropertyPath = "tags<map_values><collection>".parse().unwrap();
        assert_eq!(path.steps(), &[
            PathStep::Property("tags".into()),
            PathStep::Container("map_values".into()),
            PathStep::Container("collection".into()),
        ]);
        assert_eq!(path.to_string(), "tags<map_values><collection>");
    }

    #[test]
    fn test_invalid_paths() {
        for bad in ["a..b", ".a", "a<", "a<>", "<collection>", "a<x>b", "a b"] {
            assert!(bad.parse::<PropertyPath>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_prefix_and_parent() {
        let parent: PropertyPath = "children".parse().unwrap();
        let child: PropertyPath = "children<collection>.name".parse().unwrap();
        assert!(parent.is_prefix_of(&child));
        assert!(!child.is_prefix_of(&parent));
        assert_eq!(child.parent().unwrap().to_string(), "children<collection>");
        assert!(PropertyPath::root().parent().is_none());
    }
}
