//! # Root Resolvers
//!
//! One [`RootResolver`] per indexed root type bundles everything the session
//! integration needs for a dirty instance of that type:
//!
//! | Part | Role |
//! |------|------|
//! | `dirty_self_filter` | does the instance's own document need reindexing? |
//! | `dirty_self_or_containing_filter` | is any resolution worth doing at all? |
//! | node tree | walk to containing entities |
//! | association inverse-side resolver | walk from changed associations to the other side |
//!
//! [`ResolverRegistry`] owns the resolvers of a whole mapping: created at
//! bootstrap, closed once at shutdown.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::capability::{CapabilityFactory, TypeIdentifier};
use crate::close::{build_failure, Closer};
use crate::collector::ReindexingCollector;
use crate::context::RootContext;
use crate::inverse::{AssociationBlueprint, AssociationInverseSideResolver};
use crate::path::{PathFilter, PathOrdinals};
use crate::resolver::blueprint::parse_filter;
use crate::resolver::{NodeBlueprint, ResolverNode};
use crate::{Error, Result};

// ============================================================================
// RootResolver
// ============================================================================

/// Implicit reindexing resolver of one indexed root type.
#[derive(Debug)]
pub struct RootResolver<V> {
    root_type: TypeIdentifier,
    path_ordinals: Arc<PathOrdinals>,
    dirty_self_filter: PathFilter,
    dirty_self_or_containing_filter: PathFilter,
    containing_entities_resolver: ResolverNode<V>,
    association_inverse_side_resolver: AssociationInverseSideResolver<V>,
}

impl<V> RootResolver<V> {
    pub fn new(
        root_type: TypeIdentifier,
        path_ordinals: Arc<PathOrdinals>,
        dirty_self_filter: PathFilter,
        dirty_self_or_containing_filter: PathFilter,
        containing_entities_resolver: ResolverNode<V>,
        association_inverse_side_resolver: AssociationInverseSideResolver<V>,
    ) -> Self {
        Self {
            root_type,
            path_ordinals,
            dirty_self_filter,
            dirty_self_or_containing_filter,
            containing_entities_resolver,
            association_inverse_side_resolver,
        }
    }

    pub fn root_type(&self) -> &TypeIdentifier {
        &self.root_type
    }

    pub fn path_ordinals(&self) -> &Arc<PathOrdinals> {
        &self.path_ordinals
    }

    /// Accepts dirtiness states that require reindexing the dirty instance
    /// itself.
    pub fn dirty_self_filter(&self) -> &PathFilter {
        &self.dirty_self_filter
    }

    /// Accepts dirtiness states that require reindexing the dirty instance or
    /// walking to its containing entities. Rejection means no resolution is
    /// needed at all.
    pub fn dirty_self_or_containing_filter(&self) -> &PathFilter {
        &self.dirty_self_or_containing_filter
    }

    pub fn association_inverse_side_resolver(&self) -> &AssociationInverseSideResolver<V> {
        &self.association_inverse_side_resolver
    }

    /// Walk the node tree from `dirty`.
    pub fn resolve_entities_to_reindex(
        &self,
        collector: &mut dyn ReindexingCollector<V>,
        dirty: &V,
        context: &RootContext<'_, V>,
    ) -> Result<()> {
        self.containing_entities_resolver
            .resolve_entities_to_reindex(collector, dirty, context)
    }

    /// The standard sequence for one dirty instance: gate on
    /// `dirty_self_or_containing_filter`, mark the instance itself when
    /// `dirty_self_filter` accepts, then walk the node tree.
    pub fn resolve_dirty_entity(
        &self,
        collector: &mut dyn ReindexingCollector<V>,
        dirty: &V,
        context: &RootContext<'_, V>,
    ) -> Result<()> {
        let dirtiness = context.dirtiness();
        if !self.dirty_self_or_containing_filter.test(dirtiness) {
            tracing::trace!(root_type = %self.root_type, "no mapped path is dirty, skipping resolution");
            return Ok(());
        }
        if self.dirty_self_filter.test(dirtiness) {
            collector.mark_for_reindexing(dirty);
        }
        self.resolve_entities_to_reindex(collector, dirty, context)
    }

    pub fn describe(&self) -> serde_json::Value {
        json!({
            "root_type": self.root_type.name(),
            "dirty_self": self.path_ordinals.describe(self.dirty_self_filter.ordinals()),
            "dirty_self_or_containing": self.path_ordinals.describe(self.dirty_self_or_containing_filter.ordinals()),
            "containing": self.containing_entities_resolver.describe(&self.path_ordinals),
            "association_inverse_side": self.association_inverse_side_resolver.describe(&self.path_ordinals),
        })
    }

    /// Release the node tree and inverse-side table; failures are aggregated.
    pub fn close(self) -> Result<()> {
        let mut closer = Closer::new();
        self.close_into(&mut closer);
        closer.finish()
    }

    pub(crate) fn close_into(self, closer: &mut Closer) {
        tracing::debug!(root_type = %self.root_type, "closing implicit reindexing resolver");
        self.containing_entities_resolver.close_into(closer);
        self.association_inverse_side_resolver.close_into(closer);
    }

    /// Materialize `blueprint`. The root type's registry, and the registry of
    /// every type an inverse-side marking names, must be in `ordinals_by_type`.
    pub fn build<F>(
        blueprint: &RootBlueprint,
        ordinals_by_type: &HashMap<TypeIdentifier, Arc<PathOrdinals>>,
        factory: &F,
    ) -> Result<Self>
    where
        F: CapabilityFactory<V> + ?Sized,
    {
        let root_type = &blueprint.root_type;
        let Some(path_ordinals) = ordinals_by_type.get(root_type) else {
            return Err(Error::Build(vec![Error::UnknownType(root_type.clone())]));
        };

        let dirty_self = parse_filter(&blueprint.dirty_self_paths, path_ordinals);
        let dirty_self_or_containing = parse_filter(&blueprint.dirty_self_or_containing_paths, path_ordinals)
            .map(|filter| match &dirty_self {
                // Whatever reindexes the instance itself is also worth resolving.
                Ok(dirty_self) => filter.union(dirty_self),
                Err(_) => filter,
            });
        let containing = ResolverNode::build(&blueprint.containing, path_ordinals, factory);
        let inverse = AssociationInverseSideResolver::build(
            root_type,
            &blueprint.associations,
            ordinals_by_type,
            factory,
        );

        match (dirty_self, dirty_self_or_containing, containing, inverse) {
            (Ok(dirty_self), Ok(dirty_self_or_containing), Ok(containing), Ok(inverse)) => {
                tracing::debug!(
                    root_type = %root_type,
                    associations = inverse.len(),
                    "built implicit reindexing resolver"
                );
                Ok(Self::new(
                    root_type.clone(),
                    Arc::clone(path_ordinals),
                    dirty_self,
                    dirty_self_or_containing,
                    containing,
                    inverse,
                ))
            }
            (dirty_self, dirty_self_or_containing, containing, inverse) => {
                let mut errors = Vec::new();
                let mut closer = Closer::new();
                if let Err(error) = dirty_self {
                    errors.push(error);
                }
                if let Err(error) = dirty_self_or_containing {
                    errors.push(error);
                }
                match containing {
                    Ok(node) => node.close_into(&mut closer),
                    Err(error) => errors.push(error),
                }
                match inverse {
                    Ok(resolver) => resolver.close_into(&mut closer),
                    Err(error) => errors.push(error),
                }
                Err(build_failure(errors, closer))
            }
        }
    }
}

// ============================================================================
// RootBlueprint
// ============================================================================

/// Serializable description of a [`RootResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBlueprint {
    pub root_type: TypeIdentifier,
    /// Paths whose change requires reindexing the instance itself.
    #[serde(default)]
    pub dirty_self_paths: Vec<String>,
    /// Paths whose change requires walking to containing entities. The
    /// dirty-self paths are always added.
    #[serde(default)]
    pub dirty_self_or_containing_paths: Vec<String>,
    pub containing: NodeBlueprint,
    #[serde(default)]
    pub associations: Vec<AssociationBlueprint>,
}

impl RootBlueprint {
    pub fn new(root_type: impl Into<TypeIdentifier>) -> Self {
        Self {
            root_type: root_type.into(),
            dirty_self_paths: Vec::new(),
            dirty_self_or_containing_paths: Vec::new(),
            containing: NodeBlueprint::NoOp,
            associations: Vec::new(),
        }
    }

    pub fn dirty_self<P: Into<String>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.dirty_self_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn dirty_containing<P: Into<String>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.dirty_self_or_containing_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn containing(mut self, tree: NodeBlueprint) -> Self {
        self.containing = tree;
        self
    }

    pub fn association(mut self, association: AssociationBlueprint) -> Self {
        self.associations.push(association);
        self
    }
}

// ============================================================================
// ResolverRegistry
// ============================================================================

/// The root resolvers of one mapping, keyed by indexed root type.
///
/// Share it behind an `Arc` once built; [`ResolverRegistry::close`] consumes
/// it, so every resolver is released exactly once.
#[derive(Debug)]
pub struct ResolverRegistry<V> {
    resolvers: HashMap<TypeIdentifier, RootResolver<V>>,
}

impl<V> Default for ResolverRegistry<V> {
    fn default() -> Self {
        Self { resolvers: HashMap::new() }
    }
}

impl<V> ResolverRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one resolver per blueprint. Every blueprint is attempted; on any
    /// failure the resolvers that did build are closed and all failures are
    /// reported together.
    pub fn build<F>(
        blueprints: &[RootBlueprint],
        ordinals_by_type: &HashMap<TypeIdentifier, Arc<PathOrdinals>>,
        factory: &F,
    ) -> Result<Self>
    where
        F: CapabilityFactory<V> + ?Sized,
    {
        let mut registry = Self::new();
        let mut errors = Vec::new();
        for blueprint in blueprints {
            match RootResolver::build(blueprint, ordinals_by_type, factory) {
                Ok(resolver) => {
                    if let Err(error) = registry.insert(resolver) {
                        errors.push(error);
                    }
                }
                Err(error) => errors.push(error),
            }
        }
        if errors.is_empty() {
            return Ok(registry);
        }
        let mut closer = Closer::new();
        for (_, resolver) in registry.resolvers {
            resolver.close_into(&mut closer);
        }
        Err(build_failure(errors, closer))
    }

    /// Register `resolver`. A second resolver for the same root type is
    /// rejected and closed.
    pub fn insert(&mut self, resolver: RootResolver<V>) -> Result<()> {
        let root_type = resolver.root_type().clone();
        if self.resolvers.contains_key(&root_type) {
            let mut closer = Closer::new();
            resolver.close_into(&mut closer);
            let mut errors = vec![Error::DuplicateRootType(root_type)];
            errors.extend(closer.into_errors());
            return Err(if errors.len() == 1 { errors.remove(0) } else { Error::Build(errors) });
        }
        self.resolvers.insert(root_type, resolver);
        Ok(())
    }

    pub fn get(&self, root_type: &TypeIdentifier) -> Option<&RootResolver<V>> {
        self.resolvers.get(root_type)
    }

    pub fn root_types(&self) -> impl Iterator<Item = &TypeIdentifier> {
        self.resolvers.keys()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Close every resolver; failures are aggregated.
    pub fn close(self) -> Result<()> {
        let mut closer = Closer::new();
        for (_, resolver) in self.resolvers {
            resolver.close_into(&mut closer);
        }
        closer.finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
