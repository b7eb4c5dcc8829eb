//! # Forward Resolver Tree
//!
//! A [`ResolverNode`] tree is built once per mapped type at bootstrap and
//! interpreted against a dirty value: it reads properties, extracts container
//! elements, casts, prunes subtrees whose paths did not change, and reports
//! every containing entity that must be reindexed.
//!
//! ```text
//! DirtinessFilter {name}
//!   └─ Property children
//!        └─ ContainerElement <collection>
//!             └─ Marking            → update_because_of_contained(Child, c)
//! ```
//!
//! Trees hold no mutable state; one tree serves any number of concurrent
//! calls. Ownership is plain `Box`: the mapping graph compiled into a tree is
//! acyclic.

pub mod blueprint;

pub use blueprint::NodeBlueprint;

use std::fmt;

use serde_json::json;

use crate::capability::{Extractor, ReadHandle, TypeCaster};
use crate::close::Closer;
use crate::collector::ReindexingCollector;
use crate::context::RootContext;
use crate::path::{PathFilter, PathOrdinals};
use crate::Result;

// ============================================================================
// ResolverNode
// ============================================================================

/// One node of the forward resolver tree.
pub enum ResolverNode<V> {
    /// Replace a runtime proxy with the instance behind it.
    OriginalType { nested: Box<ResolverNode<V>> },

    /// Continue only for instances of the caster's target type.
    CastedType {
        caster: Box<dyn TypeCaster<V>>,
        nested: Box<ResolverNode<V>>,
    },

    /// Read one property and continue with its non-null value.
    Property {
        handle: Box<dyn ReadHandle<V>>,
        nested: Box<ResolverNode<V>>,
    },

    /// Continue with every non-null element of a container.
    ContainerElement {
        extractor: Box<dyn Extractor<V>>,
        nested: Box<ResolverNode<V>>,
    },

    /// Apply several nodes, in order, to the same value.
    Multi { nested: Vec<ResolverNode<V>> },

    /// Continue only if the dirtiness state intersects the filter.
    DirtinessFilter {
        filter: PathFilter,
        nested: Box<ResolverNode<V>>,
    },

    /// Report the current value as a containing entity to reindex.
    Marking,

    /// Statically empty branch.
    NoOp,
}

impl<V> ResolverNode<V> {
    // ========================================================================
    // Construction
    // ========================================================================

    pub fn original_type(nested: ResolverNode<V>) -> Self {
        ResolverNode::OriginalType { nested: Box::new(nested) }
    }

    pub fn casted_type(caster: Box<dyn TypeCaster<V>>, nested: ResolverNode<V>) -> Self {
        ResolverNode::CastedType { caster, nested: Box::new(nested) }
    }

    pub fn property(handle: Box<dyn ReadHandle<V>>, nested: ResolverNode<V>) -> Self {
        ResolverNode::Property { handle, nested: Box::new(nested) }
    }

    pub fn container_element(extractor: Box<dyn Extractor<V>>, nested: ResolverNode<V>) -> Self {
        ResolverNode::ContainerElement { extractor, nested: Box::new(nested) }
    }

    /// Fan out to `nested`. `NoOp` members are dropped; zero remaining nodes
    /// yield `NoOp` and a single one is returned as is.
    pub fn multi(nested: impl IntoIterator<Item = ResolverNode<V>>) -> Self {
        let mut nested: Vec<_> = nested.into_iter().filter(|node| !node.is_noop()).collect();
        match nested.len() {
            0 => ResolverNode::NoOp,
            1 => nested.pop().unwrap_or(ResolverNode::NoOp),
            _ => ResolverNode::Multi { nested },
        }
    }

    pub fn dirtiness_filter(filter: PathFilter, nested: ResolverNode<V>) -> Self {
        ResolverNode::DirtinessFilter { filter, nested: Box::new(nested) }
    }

    pub fn marking() -> Self {
        ResolverNode::Marking
    }

    pub const fn noop() -> Self {
        ResolverNode::NoOp
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, ResolverNode::NoOp)
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Report to `collector` every entity that must be reindexed because
    /// `value` changed as described by `context.dirtiness()`.
    pub fn resolve_entities_to_reindex(
        &self,
        collector: &mut dyn ReindexingCollector<V>,
        value: &V,
        context: &RootContext<'_, V>,
    ) -> Result<()> {
        match self {
            ResolverNode::OriginalType { nested } => {
                let original = context.introspector().unproxy(value);
                nested.resolve_entities_to_reindex(collector, &original, context)
            }
            ResolverNode::CastedType { caster, nested } => {
                let original = context.introspector().unproxy(value);
                match caster.cast_or_none(&original) {
                    Some(casted) => nested.resolve_entities_to_reindex(collector, &casted, context),
                    None => {
                        tracing::trace!(caster = ?caster, "not an instance of the cast target, skipping");
                        Ok(())
                    }
                }
            }
            ResolverNode::Property { handle, nested } => match handle.get(value) {
                Ok(Some(property)) => nested.resolve_entities_to_reindex(collector, &property, context),
                Ok(None) => Ok(()),
                Err(error) => context.propagate_or_ignore_property_access_error(error),
            },
            ResolverNode::ContainerElement { extractor, nested } => {
                extractor.extract(value, &mut |element| match element {
                    Some(element) => nested.resolve_entities_to_reindex(collector, element, context),
                    None => Ok(()),
                })
            }
            ResolverNode::Multi { nested } => {
                for node in nested {
                    node.resolve_entities_to_reindex(collector, value, context)?;
                }
                Ok(())
            }
            ResolverNode::DirtinessFilter { filter, nested } => {
                if filter.test(context.dirtiness()) {
                    nested.resolve_entities_to_reindex(collector, value, context)
                } else {
                    tracing::trace!(filter = ?filter.ordinals(), "no relevant path is dirty, pruning");
                    Ok(())
                }
            }
            ResolverNode::Marking => {
                match context.introspector().detect_containing_entity_type(value) {
                    Some(type_id) => collector.update_because_of_contained(&type_id, value),
                    None => tracing::trace!("value is not an entity, nothing to mark"),
                }
                Ok(())
            }
            ResolverNode::NoOp => Ok(()),
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Release every capability in the tree. All nodes are closed even when
    /// some fail; failures come back aggregated in [`crate::Error::Close`].
    pub fn close(self) -> Result<()> {
        let mut closer = Closer::new();
        self.close_into(&mut closer);
        closer.finish()
    }

    pub(crate) fn close_into(self, closer: &mut Closer) {
        match self {
            ResolverNode::OriginalType { nested } | ResolverNode::DirtinessFilter { nested, .. } => {
                nested.close_into(closer);
            }
            ResolverNode::CastedType { caster, nested } => {
                closer.push(caster.close());
                nested.close_into(closer);
            }
            ResolverNode::Property { handle, nested } => {
                closer.push(handle.close());
                nested.close_into(closer);
            }
            ResolverNode::ContainerElement { extractor, nested } => {
                closer.push(extractor.close());
                nested.close_into(closer);
            }
            ResolverNode::Multi { nested } => {
                for node in nested {
                    node.close_into(closer);
                }
            }
            ResolverNode::Marking | ResolverNode::NoOp => {}
        }
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Render the tree as JSON, naming filter paths through `ordinals`.
    pub fn describe(&self, ordinals: &PathOrdinals) -> serde_json::Value {
        match self {
            ResolverNode::OriginalType { nested } => json!({
                "operation": "unproxy",
                "nested": nested.describe(ordinals),
            }),
            ResolverNode::CastedType { caster, nested } => json!({
                "operation": "cast",
                "caster": format!("{caster:?}"),
                "nested": nested.describe(ordinals),
            }),
            ResolverNode::Property { handle, nested } => json!({
                "operation": "read_property",
                "handle": format!("{handle:?}"),
                "nested": nested.describe(ordinals),
            }),
            ResolverNode::ContainerElement { extractor, nested } => json!({
                "operation": "extract_elements",
                "extractor": format!("{extractor:?}"),
                "nested": nested.describe(ordinals),
            }),
            ResolverNode::Multi { nested } => json!({
                "operation": "multi",
                "nested": nested.iter().map(|node| node.describe(ordinals)).collect::<Vec<_>>(),
            }),
            ResolverNode::DirtinessFilter { filter, nested } => json!({
                "operation": "dirtiness_filter",
                "paths": ordinals.describe(filter.ordinals()),
                "nested": nested.describe(ordinals),
            }),
            ResolverNode::Marking => json!({ "operation": "mark_for_reindexing" }),
            ResolverNode::NoOp => json!({ "operation": "no_op" }),
        }
    }
}

impl<V> fmt::Debug for ResolverNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverNode::OriginalType { nested } => f.debug_tuple("OriginalType").field(nested).finish(),
            ResolverNode::CastedType { caster, nested } => {
                f.debug_tuple("CastedType").field(caster).field(nested).finish()
            }
            ResolverNode::Property { handle, nested } => {
                f.debug_tuple("Property").field(handle).field(nested).finish()
            }
            ResolverNode::ContainerElement { extractor, nested } => {
                f.debug_tuple("ContainerElement").field(extractor).field(nested).finish()
            }
            ResolverNode::Multi { nested } => f.debug_list().entries(nested).finish(),
            ResolverNode::DirtinessFilter { filter, nested } => {
                f.debug_tuple("DirtinessFilter").field(filter.ordinals()).field(nested).finish()
            }
            ResolverNode::Marking => f.write_str("Marking"),
            ResolverNode::NoOp => f.write_str("NoOp"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
