//! # reindex-resolver: Implicit Reindexing Resolution
//!
//! When a mutable object graph changes, documents built from *other* entities
//! can go stale: renaming a parent invalidates every child document that
//! embeds the parent's name. This crate computes, for one dirty entity and the
//! set of its properties that changed, every indexed root entity that must be
//! reindexed.
//!
//! ## Design Principles
//!
//! 1. **Built once, walked often**: resolver trees are materialized at
//!    bootstrap from [`NodeBlueprint`]s and shared read-only afterwards
//! 2. **Conservative by default**: unknown dirtiness (`None`) always resolves
//! 3. **Prune early**: [`PathFilter`]s are bitset tests, checked before any
//!    property is read or container extracted
//! 4. **Capabilities, not reflection**: property reads, container extraction,
//!    casts and proxy handling are resolved once into capability objects
//!
//! ## Quick Start
//!
//! ```rust
//! use reindex_resolver::model::{Entity, ModelIntrospector, ModelSchema, Value};
//! use reindex_resolver::{
//!     NodeBlueprint, PathOrdinals, PropertyPath, RecordingCollector,
//!     ResolverNode, RootContext, PropertyAccessPolicy,
//! };
//!
//! # fn main() -> reindex_resolver::Result<()> {
//! let schema = ModelSchema::new()
//!     .entity("Parent", &[], &["name", "children"])
//!     .entity("Child", &[], &["name", "parent"]);
//!
//! // Child documents embed `parent.name`: a parent rename reindexes its children.
//! let mut ordinals = PathOrdinals::new();
//! let name = ordinals.register("name".parse::<PropertyPath>()?);
//!
//! let blueprint = NodeBlueprint::dirtiness_filter(
//!     ["name"],
//!     NodeBlueprint::property(
//!         "Parent",
//!         "children",
//!         NodeBlueprint::container("collection", NodeBlueprint::Marking),
//!     ),
//! );
//! let tree = ResolverNode::<Value>::build(&blueprint, &ordinals, &schema)?;
//!
//! let child = Entity::new("Child", 2);
//! let parent = Entity::new("Parent", 1)
//!     .with_property("children", Value::list([Value::from(&child)]));
//!
//! let introspector = ModelIntrospector::new(&schema);
//! let dirty = ordinals.dirtiness_state(["name".parse::<PropertyPath>()?]);
//! let context = RootContext::new(&introspector, Some(&dirty), PropertyAccessPolicy::Propagate);
//!
//! let mut collector = RecordingCollector::new();
//! tree.resolve_entities_to_reindex(&mut collector, &Value::from(&parent), &context)?;
//! assert_eq!(collector.calls().len(), 1);
//! # let _ = name;
//! tree.close()
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod path;
pub mod capability;
pub mod context;
pub mod collector;
pub mod resolver;
pub mod inverse;
pub mod root;
pub mod model;
mod close;

// ============================================================================
// Re-exports: Paths and filters
// ============================================================================

pub use path::{
    PathStep, PropertyPath, PathOrdinal, PathOrdinals,
    PathBitSet, PathFilter,
};

// ============================================================================
// Re-exports: Capabilities and context
// ============================================================================

pub use capability::{
    ReadHandle, Extractor, TypeCaster, RuntimeIntrospector, CapabilityFactory,
    FnReadHandle, FnExtractor, FnCaster,
    PropertyAccessError, TypeIdentifier,
};
pub use context::{RootContext, PropertyAccessPolicy, PropertyAccessConfig, ChangeKind};
pub use collector::{
    ReindexingCollector, AssociationInverseSideCollector,
    RecordingCollector, CollectorCall,
};

// ============================================================================
// Re-exports: Resolvers
// ============================================================================

pub use resolver::{ResolverNode, NodeBlueprint};
pub use inverse::{
    AssociationInverseSideResolver, InverseSideNode, InverseSideEntry,
    InverseSideBlueprint, AssociationBlueprint,
};
pub use root::{RootResolver, RootBlueprint, ResolverRegistry};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    PropertyAccess(#[from] PropertyAccessError),

    #[error("Container extraction error: {0}")]
    Extraction(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Invalid property path '{0}'")]
    InvalidPath(String),

    #[error("Path '{0}' is not registered for this root type")]
    UnknownPath(String),

    #[error("Unknown container extractor '{0}'")]
    UnknownExtractor(String),

    #[error("Unknown type '{0}'")]
    UnknownType(TypeIdentifier),

    #[error("Type '{owner}' has no property '{property}'")]
    UnknownProperty { owner: TypeIdentifier, property: String },

    #[error("Association '{association}' is bound to state index {first} and {second}")]
    ConflictingStateIndex { association: String, first: usize, second: usize },

    #[error("A resolver is already registered for root type '{0}'")]
    DuplicateRootType(TypeIdentifier),

    #[error("{} resolver build failure(s): {}", .0.len(), join_errors(.0))]
    Build(Vec<Error>),

    #[error("{} failure(s) while closing resolvers: {}", .0.len(), join_errors(.0))]
    Close(Vec<Error>),
}

fn join_errors(errors: &[Error]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
