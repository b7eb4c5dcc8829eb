//! Reindexing collectors: the sinks resolution reports into.
//!
//! Collectors are implemented by the caller (typically a session-scoped
//! indexing plan). Nothing in the resolver deduplicates: the same entity may
//! be reported several times through different branches, and the caller's
//! identity-aware accumulator is expected to absorb that.

use crate::capability::TypeIdentifier;
use crate::path::PathOrdinal;

/// Sink for the forward resolver tree.
pub trait ReindexingCollector<V> {
    /// The dirty entity itself must be reindexed.
    fn mark_for_reindexing(&mut self, entity: &V);

    /// `entity` embeds data from a changed entity and must be reindexed.
    fn update_because_of_contained(&mut self, type_id: &TypeIdentifier, entity: &V);
}

/// Sink for the association inverse-side resolver.
///
/// The entity on the other side of an association is often not loaded yet,
/// so it is reported together with its raw type and the ordinal (in *its*
/// root type's registry) of the association path that changed.
pub trait AssociationInverseSideCollector<V> {
    fn update_because_of_contained_association(
        &mut self,
        type_id: &TypeIdentifier,
        containing_entity: &V,
        path_ordinal: PathOrdinal,
    );
}

// ============================================================================
// RecordingCollector
// ============================================================================

/// One collector call, as recorded by [`RecordingCollector`].
#[derive(Debug, Clone, PartialEq)]
pub enum CollectorCall<V> {
    MarkForReindexing(V),
    UpdateBecauseOfContained {
        type_id: TypeIdentifier,
        entity: V,
    },
    UpdateBecauseOfContainedAssociation {
        type_id: TypeIdentifier,
        entity: V,
        path_ordinal: PathOrdinal,
    },
}

impl<V> CollectorCall<V> {
    pub fn entity(&self) -> &V {
        match self {
            CollectorCall::MarkForReindexing(entity)
            | CollectorCall::UpdateBecauseOfContained { entity, .. }
            | CollectorCall::UpdateBecauseOfContainedAssociation { entity, .. } => entity,
        }
    }
}

/// Collector that records every call, in order, without deduplication.
#[derive(Debug, Clone)]
pub struct RecordingCollector<V> {
    calls: Vec<CollectorCall<V>>,
}

impl<V> Default for RecordingCollector<V> {
    fn default() -> Self {
        Self { calls: Vec::new() }
    }
}

impl<V> RecordingCollector<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[CollectorCall<V>] {
        &self.calls
    }

    pub fn take(&mut self) -> Vec<CollectorCall<V>> {
        std::mem::take(&mut self.calls)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl<V: Clone> ReindexingCollector<V> for RecordingCollector<V> {
    fn mark_for_reindexing(&mut self, entity: &V) {
        self.calls.push(CollectorCall::MarkForReindexing(entity.clone()));
    }

    fn update_because_of_contained(&mut self, type_id: &TypeIdentifier, entity: &V) {
        self.calls.push(CollectorCall::UpdateBecauseOfContained {
            type_id: type_id.clone(),
            entity: entity.clone(),
        });
    }
}

impl<V: Clone> AssociationInverseSideCollector<V> for RecordingCollector<V> {
    fn update_because_of_contained_association(
        &mut self,
        type_id: &TypeIdentifier,
        containing_entity: &V,
        path_ordinal: PathOrdinal,
    ) {
        self.calls.push(CollectorCall::UpdateBecauseOfContainedAssociation {
            type_id: type_id.clone(),
            entity: containing_entity.clone(),
            path_ordinal,
        });
    }
}
