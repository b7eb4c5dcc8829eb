//! Serializable inverse-side descriptions and their materialization.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{AssociationInverseSideResolver, InverseSideEntry, InverseSideNode};
use crate::capability::{CapabilityFactory, TypeIdentifier};
use crate::close::{build_failure, Closer};
use crate::path::{PathOrdinal, PathOrdinals, PropertyPath};
use crate::{Error, Result};

/// Serializable description of an [`InverseSideNode`] walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum InverseSideBlueprint {
    CastedType {
        target: TypeIdentifier,
        nested: Box<InverseSideBlueprint>,
    },
    Property {
        owner: TypeIdentifier,
        name: String,
        nested: Box<InverseSideBlueprint>,
    },
    ContainerElement {
        extractor: String,
        nested: Box<InverseSideBlueprint>,
    },
    /// `inverse_side_path` is resolved in the registry of `inverse_side_type`.
    Marking {
        inverse_side_type: TypeIdentifier,
        inverse_side_path: String,
    },
}

impl InverseSideBlueprint {
    pub fn casted_type(target: impl Into<TypeIdentifier>, nested: InverseSideBlueprint) -> Self {
        InverseSideBlueprint::CastedType { target: target.into(), nested: Box::new(nested) }
    }

    pub fn property(owner: impl Into<TypeIdentifier>, name: impl Into<String>, nested: InverseSideBlueprint) -> Self {
        InverseSideBlueprint::Property {
            owner: owner.into(),
            name: name.into(),
            nested: Box::new(nested),
        }
    }

    pub fn container(extractor: impl Into<String>, nested: InverseSideBlueprint) -> Self {
        InverseSideBlueprint::ContainerElement { extractor: extractor.into(), nested: Box::new(nested) }
    }

    pub fn marking(inverse_side_type: impl Into<TypeIdentifier>, inverse_side_path: impl Into<String>) -> Self {
        InverseSideBlueprint::Marking {
            inverse_side_type: inverse_side_type.into(),
            inverse_side_path: inverse_side_path.into(),
        }
    }
}

/// The inverse-side walks of one association of the holder type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationBlueprint {
    /// Association path in the holder's registry.
    pub path: String,
    /// Position of the association in the holder's state arrays.
    pub state_index: usize,
    pub nodes: Vec<InverseSideBlueprint>,
}

impl AssociationBlueprint {
    pub fn new(path: impl Into<String>, state_index: usize, nodes: impl IntoIterator<Item = InverseSideBlueprint>) -> Self {
        Self { path: path.into(), state_index, nodes: nodes.into_iter().collect() }
    }
}

impl<V> AssociationInverseSideResolver<V> {
    /// Materialize the inverse-side table of `holder_type`.
    ///
    /// `ordinals_by_type` must hold the registry of the holder and of every
    /// type named by a marking blueprint. All failures are reported together
    /// in one [`Error::Build`], after releasing what was built.
    pub fn build<F>(
        holder_type: &TypeIdentifier,
        associations: &[AssociationBlueprint],
        ordinals_by_type: &HashMap<TypeIdentifier, std::sync::Arc<PathOrdinals>>,
        factory: &F,
    ) -> Result<Self>
    where
        F: CapabilityFactory<V> + ?Sized,
    {
        let holder_ordinals = ordinals_by_type
            .get(holder_type)
            .ok_or_else(|| Error::Build(vec![Error::UnknownType(holder_type.clone())]))?;

        let mut entries = Vec::with_capacity(associations.len());
        let mut state_indices: HashMap<PathOrdinal, usize> = HashMap::new();
        let mut errors = Vec::new();
        let mut closer = Closer::new();
        for association in associations {
            let mut nodes = Vec::with_capacity(association.nodes.len());
            for blueprint in &association.nodes {
                match build_node(blueprint, ordinals_by_type, factory) {
                    Ok(node) => nodes.push(node),
                    Err(error) => errors.push(error),
                }
            }
            let bound = association_ordinal(&association.path, holder_ordinals).and_then(|ordinal| {
                let first = *state_indices.entry(ordinal).or_insert(association.state_index);
                if first != association.state_index {
                    return Err(Error::ConflictingStateIndex {
                        association: association.path.clone(),
                        first,
                        second: association.state_index,
                    });
                }
                Ok(ordinal)
            });
            match bound {
                Ok(ordinal) => entries.push((ordinal, InverseSideEntry::new(association.state_index, nodes))),
                Err(error) => {
                    errors.push(error);
                    for node in nodes {
                        node.close_into(&mut closer);
                    }
                }
            }
        }

        if errors.is_empty() {
            return Self::new(entries);
        }
        for (_, entry) in entries {
            for node in entry.nodes {
                node.close_into(&mut closer);
            }
        }
        Err(build_failure(errors, closer))
    }
}

fn association_ordinal(path: &str, ordinals: &PathOrdinals) -> Result<PathOrdinal> {
    let parsed: PropertyPath = path.parse()?;
    ordinals
        .to_ordinal(&parsed)
        .ok_or_else(|| Error::UnknownPath(parsed.to_string()))
}

fn build_node<V, F>(
    blueprint: &InverseSideBlueprint,
    ordinals_by_type: &HashMap<TypeIdentifier, std::sync::Arc<PathOrdinals>>,
    factory: &F,
) -> Result<InverseSideNode<V>>
where
    F: CapabilityFactory<V> + ?Sized,
{
    match blueprint {
        InverseSideBlueprint::CastedType { target, nested } => combine(
            factory.caster(target),
            build_node(nested, ordinals_by_type, factory),
            |caster| caster.close(),
            InverseSideNode::casted_type,
        ),
        InverseSideBlueprint::Property { owner, name, nested } => combine(
            factory.read_handle(owner, name),
            build_node(nested, ordinals_by_type, factory),
            |handle| handle.close(),
            InverseSideNode::property,
        ),
        InverseSideBlueprint::ContainerElement { extractor, nested } => combine(
            factory.extractor(extractor),
            build_node(nested, ordinals_by_type, factory),
            |extractor| extractor.close(),
            InverseSideNode::container_element,
        ),
        InverseSideBlueprint::Marking { inverse_side_type, inverse_side_path } => {
            let ordinals = ordinals_by_type
                .get(inverse_side_type)
                .ok_or_else(|| Error::UnknownType(inverse_side_type.clone()))?;
            Ok(InverseSideNode::marking(association_ordinal(inverse_side_path, ordinals)?))
        }
    }
}

/// [`InverseSideNode`] counterpart of the forward builder's `combine`: join a
/// capability and its nested node, or release the built half and report
/// every failure.
fn combine<V, C>(
    capability: Result<C>,
    nested: Result<InverseSideNode<V>>,
    close_capability: impl FnOnce(C) -> Result<()>,
    wrap: impl FnOnce(C, InverseSideNode<V>) -> InverseSideNode<V>,
) -> Result<InverseSideNode<V>> {
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
