//! # Association Inverse-Side Resolution
//!
//! Removing `c` from `parent.children` dirties the `children` association on
//! `parent`, but `c` itself never changes. If `c`'s document embeds data
//! reached through `c.parent`, it is now stale. The forward tree cannot see
//! this: it walks from the dirty value *towards* containing entities, and `c`
//! is no longer reachable from `parent`.
//!
//! [`AssociationInverseSideResolver`] maps each association ordinal of the
//! holder type to the nodes that walk from the association's old and new
//! values to the entities on the other side, and reports them through
//! [`AssociationInverseSideCollector`] with the ordinal of the association
//! path *in their own* root type.
//!
//! This family mirrors the forward one but stays a separate type: casts here
//! do not unproxy (the other side is often an uninitialized proxy, described
//! only by its type), and there is no dirtiness pruning below the table.

pub mod blueprint;

pub use blueprint::{AssociationBlueprint, InverseSideBlueprint};

use std::fmt;

use hashbrown::HashMap;
use serde_json::json;
use smallvec::SmallVec;

use crate::capability::{Extractor, ReadHandle, TypeCaster};
use crate::close::{build_failure, Closer};
use crate::collector::AssociationInverseSideCollector;
use crate::context::RootContext;
use crate::path::{PathBitSet, PathFilter, PathOrdinal, PathOrdinals};
use crate::{Error, Result};

// ============================================================================
// InverseSideNode
// ============================================================================

/// One node of an inverse-side walk.
pub enum InverseSideNode<V> {
    /// Continue only for instances of the caster's target type. The value is
    /// cast as is, without unproxying.
    CastedType {
        caster: Box<dyn TypeCaster<V>>,
        nested: Box<InverseSideNode<V>>,
    },

    /// Read one property and continue with its non-null value.
    Property {
        handle: Box<dyn ReadHandle<V>>,
        nested: Box<InverseSideNode<V>>,
    },

    /// Continue with every non-null element of a container.
    ContainerElement {
        extractor: Box<dyn Extractor<V>>,
        nested: Box<InverseSideNode<V>>,
    },

    /// Report the current value as an entity whose association at
    /// `inverse_side_path_ordinal` (in its own root type) changed.
    Marking { inverse_side_path_ordinal: PathOrdinal },
}

impl<V> InverseSideNode<V> {
    pub fn casted_type(caster: Box<dyn TypeCaster<V>>, nested: InverseSideNode<V>) -> Self {
        InverseSideNode::CastedType { caster, nested: Box::new(nested) }
    }

    pub fn property(handle: Box<dyn ReadHandle<V>>, nested: InverseSideNode<V>) -> Self {
        InverseSideNode::Property { handle, nested: Box::new(nested) }
    }

    pub fn container_element(extractor: Box<dyn Extractor<V>>, nested: InverseSideNode<V>) -> Self {
        InverseSideNode::ContainerElement { extractor, nested: Box::new(nested) }
    }

    pub fn marking(inverse_side_path_ordinal: PathOrdinal) -> Self {
        InverseSideNode::Marking { inverse_side_path_ordinal }
    }

    pub fn resolve_entities_to_reindex(
        &self,
        collector: &mut dyn AssociationInverseSideCollector<V>,
        value: &V,
        context: &RootContext<'_, V>,
    ) -> Result<()> {
        match self {
            InverseSideNode::CastedType { caster, nested } => match caster.cast_or_none(value) {
                Some(casted) => nested.resolve_entities_to_reindex(collector, &casted, context),
                None => {
                    tracing::trace!(caster = ?caster, "inverse side is not an instance of the cast target, skipping");
                    Ok(())
                }
            },
            InverseSideNode::Property { handle, nested } => match handle.get(value) {
                Ok(Some(property)) => nested.resolve_entities_to_reindex(collector, &property, context),
                Ok(None) => Ok(()),
                Err(error) => context.propagate_or_ignore_property_access_error(error),
            },
            InverseSideNode::ContainerElement { extractor, nested } => {
                extractor.extract(value, &mut |element| match element {
                    Some(element) => nested.resolve_entities_to_reindex(collector, element, context),
                    None => Ok(()),
                })
            }
            InverseSideNode::Marking { inverse_side_path_ordinal } => {
                match context.introspector().detect_containing_entity_type(value) {
                    Some(type_id) => collector.update_because_of_contained_association(
                        &type_id,
                        value,
                        *inverse_side_path_ordinal,
                    ),
                    None => tracing::trace!(
                        ordinal = %inverse_side_path_ordinal,
                        "inverse side is not an entity, nothing to mark"
                    ),
                }
                Ok(())
            }
        }
    }

    pub(crate) fn close_into(self, closer: &mut Closer) {
        match self {
            InverseSideNode::CastedType { caster, nested } => {
                closer.push(caster.close());
                nested.close_into(closer);
            }
            InverseSideNode::Property { handle, nested } => {
                closer.push(handle.close());
                nested.close_into(closer);
            }
            InverseSideNode::ContainerElement { extractor, nested } => {
                closer.push(extractor.close());
                nested.close_into(closer);
            }
            InverseSideNode::Marking { .. } => {}
        }
    }

    pub fn describe(&self) -> serde_json::Value {
        match self {
            InverseSideNode::CastedType { caster, nested } => json!({
                "operation": "cast",
                "caster": format!("{caster:?}"),
                "nested": nested.describe(),
            }),
            InverseSideNode::Property { handle, nested } => json!({
                "operation": "read_property",
                "handle": format!("{handle:?}"),
                "nested": nested.describe(),
            }),
            InverseSideNode::ContainerElement { extractor, nested } => json!({
                "operation": "extract_elements",
                "extractor": format!("{extractor:?}"),
                "nested": nested.describe(),
            }),
            InverseSideNode::Marking { inverse_side_path_ordinal } => json!({
                "operation": "mark_association_inverse_side",
                "inverse_side_path_ordinal": inverse_side_path_ordinal.0,
            }),
        }
    }
}

impl<V> fmt::Debug for InverseSideNode<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InverseSideNode::CastedType { caster, nested } => {
                f.debug_tuple("CastedType").field(caster).field(nested).finish()
            }
            InverseSideNode::Property { handle, nested } => {
                f.debug_tuple("Property").field(handle).field(nested).finish()
            }
            InverseSideNode::ContainerElement { extractor, nested } => {
                f.debug_tuple("ContainerElement").field(extractor).field(nested).finish()
            }
            InverseSideNode::Marking { inverse_side_path_ordinal } => {
                f.debug_tuple("Marking").field(inverse_side_path_ordinal).finish()
            }
        }
    }
}

// ============================================================================
// InverseSideEntry
// ============================================================================

/// The inverse-side walks registered for one association ordinal.
#[derive(Debug)]
pub struct InverseSideEntry<V> {
    /// Position of the association's value in the holder's state arrays.
    pub state_index: usize,
    pub nodes: SmallVec<[InverseSideNode<V>; 1]>,
}

impl<V> InverseSideEntry<V> {
    pub fn new(state_index: usize, nodes: impl IntoIterator<Item = InverseSideNode<V>>) -> Self {
        Self { state_index, nodes: nodes.into_iter().collect() }
    }
}

// ============================================================================
// AssociationInverseSideResolver
// ============================================================================

/// Per-holder-type table: association ordinal → inverse-side walks.
///
/// Every key must be the ordinal of an association path in the holder's
/// forward mapping, and every node must follow the same cast/property/container
/// shape as the matching forward branch. Both are bootstrap contracts and are
/// not checked here.
#[derive(Debug)]
pub struct AssociationInverseSideResolver<V> {
    entries: HashMap<PathOrdinal, InverseSideEntry<V>>,
    dirty_association_filter: PathFilter,
}

impl<V> Default for AssociationInverseSideResolver<V> {
    fn default() -> Self {
        Self { entries: HashMap::new(), dirty_association_filter: PathFilter::empty() }
    }
}

impl<V> AssociationInverseSideResolver<V> {
    /// Build the table. Entries given twice for one ordinal are merged when
    /// they read the same state index. An ordinal bound to two state indices
    /// fails with [`Error::ConflictingStateIndex`], after releasing every node.
    pub fn new(entries: impl IntoIterator<Item = (PathOrdinal, InverseSideEntry<V>)>) -> Result<Self> {
        let mut table: HashMap<PathOrdinal, InverseSideEntry<V>> = HashMap::new();
        let mut errors = Vec::new();
        let mut closer = Closer::new();
        for (ordinal, entry) in entries {
            match table.get_mut(&ordinal) {
                Some(existing) if existing.state_index != entry.state_index => {
                    errors.push(Error::ConflictingStateIndex {
                        association: ordinal.to_string(),
                        first: existing.state_index,
                        second: entry.state_index,
                    });
                    for node in entry.nodes {
                        node.close_into(&mut closer);
                    }
                }
                Some(existing) => existing.nodes.extend(entry.nodes),
                None => {
                    table.insert(ordinal, entry);
                }
            }
        }
        if !errors.is_empty() {
            for (_, entry) in table {
                for node in entry.nodes {
                    node.close_into(&mut closer);
                }
            }
            return Err(build_failure(errors, closer));
        }
        let dirty_association_filter = PathFilter::of(table.keys().copied());
        Ok(Self { entries: table, dirty_association_filter })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Every association ordinal this resolver has walks for.
    pub fn dirty_association_filter(&self) -> &PathFilter {
        &self.dirty_association_filter
    }

    pub fn entry(&self, ordinal: PathOrdinal) -> Option<&InverseSideEntry<V>> {
        self.entries.get(&ordinal)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walk from the old and new values of every dirty association to the
    /// entities on its inverse side.
    ///
    /// `old_state` is `None` for inserts and `new_state` is `None` for
    /// deletes. Ordinals without a registered entry are skipped.
    pub fn resolve_entities_to_reindex(
        &self,
        collector: &mut dyn AssociationInverseSideCollector<V>,
        dirty_association_ordinals: &PathBitSet,
        old_state: Option<&[Option<V>]>,
        new_state: Option<&[Option<V>]>,
        context: &RootContext<'_, V>,
    ) -> Result<()> {
        for ordinal in dirty_association_ordinals.iter() {
            let Some(entry) = self.entries.get(&ordinal) else {
                tracing::trace!(%ordinal, "no inverse side registered for ordinal");
                continue;
            };
            let old_value = state_value(old_state, entry.state_index);
            let new_value = state_value(new_state, entry.state_index);
            for node in &entry.nodes {
                for value in [old_value, new_value].into_iter().flatten() {
                    node.resolve_entities_to_reindex(collector, value, context)?;
                }
            }
        }
        Ok(())
    }

    /// Restrict `dirtiness` to the associations this resolver knows, then
    /// resolve. Unknown dirtiness walks every association.
    pub fn resolve_from_dirtiness(
        &self,
        collector: &mut dyn AssociationInverseSideCollector<V>,
        dirtiness: Option<&PathBitSet>,
        old_state: Option<&[Option<V>]>,
        new_state: Option<&[Option<V>]>,
        context: &RootContext<'_, V>,
    ) -> Result<()> {
        let dirty = self
            .dirty_association_filter
            .filter(dirtiness)
            .unwrap_or_else(|| self.dirty_association_filter.ordinals().clone());
        if dirty.is_empty() {
            return Ok(());
        }
        self.resolve_entities_to_reindex(collector, &dirty, old_state, new_state, context)
    }

    pub fn close(self) -> Result<()> {
        let mut closer = Closer::new();
        self.close_into(&mut closer);
        closer.finish()
    }

    pub(crate) fn close_into(self, closer: &mut Closer) {
        for (_, entry) in self.entries {
            for node in entry.nodes {
                node.close_into(closer);
            }
        }
    }

    /// Render the table as JSON, keyed by association path.
    pub fn describe(&self, ordinals: &PathOrdinals) -> serde_json::Value {
        let mut keys: Vec<_> = self.entries.keys().copied().collect();
        keys.sort();
        let mut table = serde_json::Map::new();
        for ordinal in keys {
            let entry = &self.entries[&ordinal];
            let name = match ordinals.to_path(ordinal) {
                Some(path) => path.to_string(),
                None => format!("#{ordinal}"),
            };
            table.insert(name, json!({
                "state_index": entry.state_index,
                "nodes": entry.nodes.iter().map(InverseSideNode::describe).collect::<Vec<_>>(),
            }));
        }
        serde_json::Value::Object(table)
    }
}

fn state_value<V>(state: Option<&[Option<V>]>, index: usize) -> Option<&V> {
    state?.get(index)?.as_ref()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{FnCaster, FnExtractor, RuntimeIntrospector};
    use crate::collector::{CollectorCall, RecordingCollector};
    use crate::context::PropertyAccessPolicy;
    use crate::TypeIdentifier;

    /// Values are ids; even ids are entities of type `Child`, odd ids are not
    /// entities at all.
    struct Ids;

    impl RuntimeIntrospector<u32> for Ids {
        fn unproxy(&self, value: &u32) -> u32 {
            *value
        }

        fn detect_containing_entity_type(&self, value: &u32) -> Option<TypeIdentifier> {
            (value % 2 == 0).then(|| "Child".into())
        }
    }

    fn context() -> RootContext<'static, u32> {
        RootContext::new(&Ids, None, PropertyAccessPolicy::Propagate)
    }

    fn bits(ordinals: &[u32]) -> PathBitSet {
        ordinals.iter().map(|o| PathOrdinal(*o)).collect()
    }

    fn marked(collector: &RecordingCollector<u32>) -> Vec<u32> {
        collector.calls().iter().map(|call| *call.entity()).collect()
    }

    #[test]
    fn test_old_and_new_values_are_both_walked() {
        let resolver = AssociationInverseSideResolver::new([(
            PathOrdinal(1),
            InverseSideEntry::new(0, [InverseSideNode::marking(PathOrdinal(7))]),
        )])
        .unwrap();
        let old = [Some(2u32)];
        let new = [Some(4u32)];

        let mut collector = RecordingCollector::new();
        resolver
            .resolve_entities_to_reindex(&mut collector, &bits(&[1]), Some(&old), Some(&new), &context())
            .unwrap();
        assert_eq!(collector.calls(), &[
            CollectorCall::UpdateBecauseOfContainedAssociation {
                type_id: "Child".into(),
                entity: 2,
                path_ordinal: PathOrdinal(7),
            },
            CollectorCall::UpdateBecauseOfContainedAssociation {
                type_id: "Child".into(),
                entity: 4,
                path_ordinal: PathOrdinal(7),
            },
        ]);
    }

    #[test]
    fn test_missing_state_and_unregistered_ordinals_are_skipped() {
        let resolver = AssociationInverseSideResolver::new([(
            PathOrdinal(0),
            InverseSideEntry::new(1, [InverseSideNode::marking(PathOrdinal(0))]),
        )])
        .unwrap();
        let new = [None, Some(6u32)];

        let mut collector = RecordingCollector::new();
        resolver
            .resolve_entities_to_reindex(&mut collector, &bits(&[0, 3]), None, Some(&new), &context())
            .unwrap();
        assert_eq!(marked(&collector), vec![6]);

        collector.take();
        let short = [Some(8u32)];
        resolver
            .resolve_entities_to_reindex(&mut collector, &bits(&[0]), Some(&short), None, &context())
            .unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_container_and_cast_without_unproxy() {
        let node = InverseSideNode::container_element(
            Box::new(FnExtractor::<u32>::new("digits", |v, visit| {
                for digit in v.to_string().chars().filter_map(|c| c.to_digit(10)) {
                    visit(Some(&digit))?;
                }
                Ok(())
            })),
            InverseSideNode::casted_type(
                Box::new(FnCaster::new("Big", |v: &u32| (*v >= 4).then_some(*v))),
                InverseSideNode::marking(PathOrdinal(2)),
            ),
        );
        let resolver = AssociationInverseSideResolver::new([(PathOrdinal(0), InverseSideEntry::new(0, [node]))])
        .unwrap();
        let old = [Some(2468u32)];

        let mut collector = RecordingCollector::new();
        resolver
            .resolve_entities_to_reindex(&mut collector, &bits(&[0]), Some(&old), None, &context())
            .unwrap();
        assert_eq!(marked(&collector), vec![4, 6, 8]);
    }

    #[test]
    fn test_non_entities_are_not_marked() {
        let resolver = AssociationInverseSideResolver::new([(
            PathOrdinal(0),
            InverseSideEntry::new(0, [InverseSideNode::marking(PathOrdinal(0))]),
        )])
        .unwrap();
        let mut collector = RecordingCollector::new();
        resolver
            .resolve_entities_to_reindex(&mut collector, &bits(&[0]), Some(&[Some(3u32)]), None, &context())
            .unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_resolve_from_dirtiness_uses_filter() {
        let resolver = AssociationInverseSideResolver::new([
            (PathOrdinal(1), InverseSideEntry::new(0, [InverseSideNode::marking(PathOrdinal(0))])),
            (PathOrdinal(2), InverseSideEntry::new(1, [InverseSideNode::marking(PathOrdinal(0))])),
        ])
        .unwrap();
        assert_eq!(resolver.dirty_association_filter().ordinals(), &bits(&[1, 2]));
        let old = [Some(10u32), Some(20u32)];

        let mut collector = RecordingCollector::new();
        resolver
            .resolve_from_dirtiness(&mut collector, Some(&bits(&[2, 5])), Some(&old), None, &context())
            .unwrap();
        assert_eq!(marked(&collector), vec![20]);

        collector.take();
        resolver
            .resolve_from_dirtiness(&mut collector, None, Some(&old), None, &context())
            .unwrap();
        assert_eq!(marked(&collector), vec![10, 20]);

        collector.take();
        resolver
            .resolve_from_dirtiness(&mut collector, Some(&bits(&[0])), Some(&old), None, &context())
            .unwrap();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_duplicate_ordinals_with_one_state_index_merge() {
        let resolver = AssociationInverseSideResolver::<u32>::new([
            (PathOrdinal(1), InverseSideEntry::new(0, [InverseSideNode::marking(PathOrdinal(0))])),
            (PathOrdinal(1), InverseSideEntry::new(0, [InverseSideNode::marking(PathOrdinal(3))])),
        ])
        .unwrap();
        assert_eq!(resolver.len(), 1);
        assert_eq!(resolver.entry(PathOrdinal(1)).unwrap().nodes.len(), 2);
    }

    #[test]
    fn test_ordinal_bound_to_two_state_indices_is_rejected() {
        let result = AssociationInverseSideResolver::<u32>::new([
            (PathOrdinal(1), InverseSideEntry::new(0, [InverseSideNode::marking(PathOrdinal(0))])),
            (PathOrdinal(2), InverseSideEntry::new(1, [InverseSideNode::marking(PathOrdinal(0))])),
            (PathOrdinal(1), InverseSideEntry::new(2, [InverseSideNode::marking(PathOrdinal(3))])),
        ]);
        match result {
            Err(Error::Build(errors)) => {
                assert_eq!(errors.len(), 1, "{errors:?}");
                assert!(matches!(
                    &errors[0],
                    Error::ConflictingStateIndex { association, first: 0, second: 2 } if association == "1"
                ));
            }
            other => panic!("expected conflicting state index, got {other:?}"),
        }
    }
}
