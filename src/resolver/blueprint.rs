//! Blueprints: serializable resolver-tree descriptions and their
//! materialization into [`ResolverNode`]s.
//!
//! The metadata compiler that derives blueprints from mapping annotations is
//! not part of this crate. Materialization is: every capability is acquired
//! exactly once, every sibling branch is attempted so all broken bindings are
//! reported together, and whatever was already acquired is closed before the
//! aggregated [`Error::Build`] propagates.

use serde::{Deserialize, Serialize};

use super::ResolverNode;
use crate::capability::{CapabilityFactory, TypeIdentifier};
use crate::close::{build_failure, Closer};
use crate::path::{PathFilter, PathOrdinals, PropertyPath};
use crate::{Error, Result};

/// Serializable description of a [`ResolverNode`] tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum NodeBlueprint {
    OriginalType {
        nested: Box<NodeBlueprint>,
    },
    CastedType {
        target: TypeIdentifier,
        nested: Box<NodeBlueprint>,
    },
    Property {
        owner: TypeIdentifier,
        name: String,
        nested: Box<NodeBlueprint>,
    },
    ContainerElement {
        extractor: String,
        nested: Box<NodeBlueprint>,
    },
    Multi {
        nested: Vec<NodeBlueprint>,
    },
    /// Paths in the textual [`PropertyPath`] form, relative to the root type.
    DirtinessFilter {
        paths: Vec<String>,
        nested: Box<NodeBlueprint>,
    },
    Marking,
    NoOp,
}

impl NodeBlueprint {
    pub fn original_type(nested: NodeBlueprint) -> Self {
        NodeBlueprint::OriginalType { nested: Box::new(nested) }
    }

    pub fn casted_type(target: impl Into<TypeIdentifier>, nested: NodeBlueprint) -> Self {
        NodeBlueprint::CastedType { target: target.into(), nested: Box::new(nested) }
    }

    pub fn property(owner: impl Into<TypeIdentifier>, name: impl Into<String>, nested: NodeBlueprint) -> Self {
        NodeBlueprint::Property {
            owner: owner.into(),
            name: name.into(),
            nested: Box::new(nested),
        }
    }

    pub fn container(extractor: impl Into<String>, nested: NodeBlueprint) -> Self {
        NodeBlueprint::ContainerElement { extractor: extractor.into(), nested: Box::new(nested) }
    }

    pub fn multi(nested: impl IntoIterator<Item = NodeBlueprint>) -> Self {
        NodeBlueprint::Multi { nested: nested.into_iter().collect() }
    }

    pub fn dirtiness_filter<P: Into<String>>(paths: impl IntoIterator<Item = P>, nested: NodeBlueprint) -> Self {
        NodeBlueprint::DirtinessFilter {
            paths: paths.into_iter().map(Into::into).collect(),
            nested: Box::new(nested),
        }
    }
}

impl<V> ResolverNode<V> {
    /// Materialize `blueprint`, resolving filter paths against `ordinals` and
    /// capabilities through `factory`.
    ///
    /// Failures are always reported as one flattened [`Error::Build`].
    pub fn build<F>(blueprint: &NodeBlueprint, ordinals: &PathOrdinals, factory: &F) -> Result<Self>
    where
        F: CapabilityFactory<V> + ?Sized,
    {
        build_node(blueprint, ordinals, factory).map_err(|error| match error {
            Error::Build(errors) => Error::Build(errors),
            other => Error::Build(vec![other]),
        })
    }
}

fn build_node<V, F>(blueprint: &NodeBlueprint, ordinals: &PathOrdinals, factory: &F) -> Result<ResolverNode<V>>
where
    F: CapabilityFactory<V> + ?Sized,
{
    match blueprint {
        NodeBlueprint::OriginalType { nested } => {
            Ok(ResolverNode::original_type(build_node(nested, ordinals, factory)?))
        }
        NodeBlueprint::CastedType { target, nested } => combine(
            factory.caster(target),
            build_node(nested, ordinals, factory),
            |caster| caster.close(),
            ResolverNode::casted_type,
        ),
        NodeBlueprint::Property { owner, name, nested } => combine(
            factory.read_handle(owner, name),
            build_node(nested, ordinals, factory),
            |handle| handle.close(),
            ResolverNode::property,
        ),
        NodeBlueprint::ContainerElement { extractor, nested } => combine(
            factory.extractor(extractor),
            build_node(nested, ordinals, factory),
            |extractor| extractor.close(),
            ResolverNode::container_element,
        ),
        NodeBlueprint::Multi { nested } => {
            let mut built = Vec::with_capacity(nested.len());
            let mut errors = Vec::new();
            for child in nested {
                match build_node(child, ordinals, factory) {
                    Ok(node) => built.push(node),
                    Err(error) => errors.push(error),
                }
            }
            if errors.is_empty() {
                return Ok(ResolverNode::multi(built));
            }
            let mut closer = Closer::new();
            for node in built {
                node.close_into(&mut closer);
            }
            Err(build_failure(errors, closer))
        }
        NodeBlueprint::DirtinessFilter { paths, nested } => combine(
            parse_filter(paths, ordinals),
            build_node(nested, ordinals, factory),
            |_| Ok(()),
            ResolverNode::dirtiness_filter,
        ),
        NodeBlueprint::Marking => Ok(ResolverNode::Marking),
        NodeBlueprint::NoOp => Ok(ResolverNode::NoOp),
    }
}

/// Build a [`PathFilter`] from textual paths; every invalid or unregistered
/// path is reported.
pub(crate) fn parse_filter(paths: &[String], ordinals: &PathOrdinals) -> Result<PathFilter> {
    let mut parsed = Vec::with_capacity(paths.len());
    let mut errors = Vec::new();
    for raw in paths {
        match raw.parse::<PropertyPath>() {
            Ok(path) => parsed.push(path),
            Err(error) => errors.push(error),
        }
    }
    match PathFilter::from_paths(ordinals, parsed.iter()) {
        Ok(filter) if errors.is_empty() => Ok(filter),
        Ok(_) => Err(build_failure(errors, Closer::new())),
        Err(error) => {
            errors.push(error);
            Err(build_failure(errors, Closer::new()))
        }
    }
}

/// Join a capability and its already-built nested node into one node, or
/// release whichever half succeeded and report every failure.
///
/// `inverse::blueprint` has the same helper over `InverseSideNode`; the two
/// node families share no type, so each keeps its own.
fn combine<V, C>(
    capability: Result<C>,
    nested: Result<ResolverNode<V>>,
    close_capability: impl FnOnce(C) -> Result<()>,
    wrap: impl FnOnce(C, ResolverNode<V>) -> ResolverNode<V>,
) -> Result<ResolverNode<V>> {
    match (capability, nested) {
        (Ok(capability), Ok(nested)) => Ok(wrap(capability, nested)),
        (capability, nested) => {
            let mut errors = Vec::new();
            let mut closer = Closer::new();
            match capability {
                Ok(capability) => closer.push(close_capability(capability)),
                Err(error) => errors.push(error),
            }
            match nested {
                Ok(nested) => nested.close_into(&mut closer),
                Err(error) => errors.push(error),
            }
            Err(build_failure(errors, closer))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
