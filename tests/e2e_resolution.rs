//! End-to-end resolution scenarios against the in-memory object model.
//!
//! Each test builds resolvers from blueprints (as bootstrap would), wires a
//! small object graph, and checks exactly which collector calls come out.

use std::sync::Arc;

use hashbrown::HashMap;
use pretty_assertions::assert_eq;
use reindex_resolver::model::{Entity, EntityProxy, ModelIntrospector, ModelSchema, Value};
use reindex_resolver::{
    AssociationBlueprint, CollectorCall, InverseSideBlueprint, NodeBlueprint, PathBitSet,
    PathOrdinal, PathOrdinals, PropertyAccessPolicy, PropertyPath, RecordingCollector,
    ResolverNode, RootBlueprint, RootContext, RootResolver, TypeIdentifier,
};

fn family_schema() -> ModelSchema {
    ModelSchema::new()
        .entity("Parent", &[], &["name", "children"])
        .entity("Child", &[], &["name", "parent"])
}

fn zoo_schema() -> ModelSchema {
    ModelSchema::new()
        .entity("Animal", &[], &["name", "owner"])
        .entity("Dog", &["Animal"], &["kennel"])
        .entity("Cat", &["Animal"], &[])
        .entity("Kennel", &[], &["dogs"])
        .entity("Person", &[], &["pets"])
}

fn registry(paths: &[&str]) -> Arc<PathOrdinals> {
    let mut ordinals = PathOrdinals::new();
    for path in paths {
        ordinals.register(path.parse().unwrap());
    }
    Arc::new(ordinals)
}

fn dirty(ordinals: &PathOrdinals, paths: &[&str]) -> PathBitSet {
    ordinals.dirtiness_state(paths.iter().map(|p| p.parse::<PropertyPath>().unwrap()))
}

fn ordinal(ordinals: &PathOrdinals, path: &str) -> PathOrdinal {
    ordinals.to_ordinal(&path.parse().unwrap()).unwrap()
}

/// Parent documents embed `children.name`, child documents embed
/// `parent.name`.
fn family_registries() -> HashMap<TypeIdentifier, Arc<PathOrdinals>> {
    let mut map = HashMap::new();
    map.insert(TypeIdentifier::from("Parent"), registry(&["name", "children", "children.name"]));
    map.insert(TypeIdentifier::from("Child"), registry(&["name", "parent", "parent.name"]));
    map
}

fn parent_blueprint() -> RootBlueprint {
    RootBlueprint::new("Parent")
        .dirty_self(["name", "children"])
        .dirty_containing(["name"])
        .containing(NodeBlueprint::dirtiness_filter(
            ["name"],
            NodeBlueprint::property(
                "Parent",
                "children",
                NodeBlueprint::container("collection", NodeBlueprint::Marking),
            ),
        ))
        .association(AssociationBlueprint::new(
            "children",
            1,
            [InverseSideBlueprint::container(
                "collection",
                InverseSideBlueprint::marking("Child", "parent"),
            )],
        ))
}

fn child_blueprint() -> RootBlueprint {
    RootBlueprint::new("Child")
        .dirty_self(["name", "parent"])
        .dirty_containing(["name"])
        .containing(NodeBlueprint::dirtiness_filter(
            ["name"],
            NodeBlueprint::property("Child", "parent", NodeBlueprint::Marking),
        ))
        .association(AssociationBlueprint::new(
            "parent",
            1,
            [InverseSideBlueprint::marking("Parent", "children")],
        ))
}

// ============================================================================
// 1. Renaming a parent reindexes its children
// ============================================================================

#[test]
fn test_parent_rename_reindexes_children() {
    let schema = family_schema();
    let resolver = RootResolver::<Value>::build(&parent_blueprint(), &family_registries(), &schema).unwrap();

    let parent = Entity::new("Parent", 1);
    let alice = Entity::new("Child", 10).with_property("parent", &parent);
    let bob = Entity::new("Child", 11).with_property("parent", &parent);
    parent.set("children", Value::list([Value::from(&alice), Value::Null, Value::from(&bob)]));

    let introspector = ModelIntrospector::new(&schema);
    let state = dirty(resolver.path_ordinals(), &["name"]);
    let context = RootContext::new(&introspector, Some(&state), PropertyAccessPolicy::Propagate);

    let mut collector = RecordingCollector::new();
    resolver.resolve_dirty_entity(&mut collector, &Value::from(&parent), &context).unwrap();

    assert_eq!(collector.take(), vec![
        CollectorCall::MarkForReindexing(Value::from(&parent)),
        CollectorCall::UpdateBecauseOfContained { type_id: "Child".into(), entity: Value::from(&alice) },
        CollectorCall::UpdateBecauseOfContained { type_id: "Child".into(), entity: Value::from(&bob) },
    ]);
}

// ============================================================================
// 2. Bidirectional association: both inverse sides are reported
// ============================================================================

#[test]
fn test_moving_a_child_marks_old_and_new_parent() {
    let schema = family_schema();
    let registries = family_registries();
    let resolver = RootResolver::<Value>::build(&child_blueprint(), &registries, &schema).unwrap();

    let old_parent = Entity::new("Parent", 1);
    let new_parent = Entity::new("Parent", 2);
    let child = Entity::new("Child", 10).with_property("parent", &new_parent);

    let introspector = ModelIntrospector::new(&schema);
    let state = dirty(resolver.path_ordinals(), &["parent"]);
    let context = RootContext::new(&introspector, Some(&state), PropertyAccessPolicy::Propagate);
    let old = [Some(Value::from("c")), Some(Value::from(&old_parent))];
    let new = [Some(Value::from("c")), Some(Value::from(&new_parent))];

    let mut collector = RecordingCollector::new();
    resolver
        .association_inverse_side_resolver()
        .resolve_from_dirtiness(&mut collector, Some(&state), Some(&old), Some(&new), &context)
        .unwrap();

    let children = ordinal(&registries[&TypeIdentifier::from("Parent")], "children");
    assert_eq!(collector.take(), vec![
        CollectorCall::UpdateBecauseOfContainedAssociation {
            type_id: "Parent".into(),
            entity: Value::from(&old_parent),
            path_ordinal: children,
        },
        CollectorCall::UpdateBecauseOfContainedAssociation {
            type_id: "Parent".into(),
            entity: Value::from(&new_parent),
            path_ordinal: children,
        },
    ]);

    // Only `parent` changed: the child's own document, not its containers.
    resolver.resolve_dirty_entity(&mut collector, &Value::from(&child), &context).unwrap();
    assert_eq!(collector.take(), vec![CollectorCall::MarkForReindexing(Value::from(&child))]);
}

#[test]
fn test_changing_children_marks_every_child_on_both_sides() {
    let schema = family_schema();
    let registries = family_registries();
    let resolver = RootResolver::<Value>::build(&parent_blueprint(), &registries, &schema).unwrap();

    let kept = Entity::new("Child", 10);
    let added = Entity::new("Child", 11);
    let old = [None, Some(Value::list([Value::from(&kept)]))];
    let new = [None, Some(Value::list([Value::from(&kept), Value::from(&added)]))];

    let introspector = ModelIntrospector::new(&schema);
    let state = dirty(resolver.path_ordinals(), &["children"]);
    let context = RootContext::new(&introspector, Some(&state), PropertyAccessPolicy::Propagate);

    let mut collector = RecordingCollector::new();
    resolver
        .association_inverse_side_resolver()
        .resolve_from_dirtiness(&mut collector, Some(&state), Some(&old), Some(&new), &context)
        .unwrap();

    // No deduplication: `kept` shows up once per state.
    let parent_path = ordinal(&registries[&TypeIdentifier::from("Child")], "parent");
    let marked: Vec<(Value, PathOrdinal)> = collector
        .calls()
        .iter()
        .map(|call| match call {
            CollectorCall::UpdateBecauseOfContainedAssociation { entity, path_ordinal, .. } => {
                (entity.clone(), *path_ordinal)
            }
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(marked, vec![
        (Value::from(&kept), parent_path),
        (Value::from(&kept), parent_path),
        (Value::from(&added), parent_path),
    ]);
}

#[test]
fn test_removing_a_child_marks_the_removed_child() {
    let schema = family_schema();
    let registries = family_registries();
    let resolver = RootResolver::<Value>::build(&parent_blueprint(), &registries, &schema).unwrap();

    let kept = Entity::new("Child", 10);
    let removed = Entity::new("Child", 11);
    let parent = Entity::new("Parent", 1).with_property("children", Value::list([Value::from(&kept)]));
    kept.set("parent", Value::from(&parent));

    let old = [None, Some(Value::list([Value::from(&kept), Value::from(&removed)]))];
    let new = [None, Some(Value::list([Value::from(&kept)]))];

    let introspector = ModelIntrospector::new(&schema);
    let state = dirty(resolver.path_ordinals(), &["children"]);
    let context = RootContext::new(&introspector, Some(&state), PropertyAccessPolicy::Propagate);

    let mut collector = RecordingCollector::new();
    resolver
        .association_inverse_side_resolver()
        .resolve_from_dirtiness(&mut collector, Some(&state), Some(&old), Some(&new), &context)
        .unwrap();

    let parent_path = ordinal(&registries[&TypeIdentifier::from("Child")], "parent");
    let removed_marks = collector
        .calls()
        .iter()
        .filter(|call| *call.entity() == Value::from(&removed))
        .count();
    assert_eq!(removed_marks, 1);
    assert!(collector.calls().contains(&CollectorCall::UpdateBecauseOfContainedAssociation {
        type_id: "Child".into(),
        entity: Value::from(&removed),
        path_ordinal: parent_path,
    }));

    // The forward tree no longer reaches the removed child.
    collector.take();
    resolver.resolve_dirty_entity(&mut collector, &Value::from(&parent), &context).unwrap();
    assert_eq!(collector.take(), vec![CollectorCall::MarkForReindexing(Value::from(&parent))]);
}

#[test]
fn test_inverse_side_ignores_unrelated_dirtiness() {
    let schema = family_schema();
    let resolver = RootResolver::<Value>::build(&child_blueprint(), &family_registries(), &schema).unwrap();
    let parent = Entity::new("Parent", 1);
    let state = [None, Some(Value::from(&parent))];

    let introspector = ModelIntrospector::new(&schema);
    let name_only = dirty(resolver.path_ordinals(), &["name"]);
    let context = RootContext::new(&introspector, Some(&name_only), PropertyAccessPolicy::Propagate);

    let inverse = resolver.association_inverse_side_resolver();
    let mut collector = RecordingCollector::new();
    inverse
        .resolve_from_dirtiness(&mut collector, Some(&name_only), None, Some(&state), &context)
        .unwrap();
    assert!(collector.is_empty());

    // Unknown dirtiness walks every association.
    inverse
        .resolve_from_dirtiness(&mut collector, None, None, Some(&state), &context)
        .unwrap();
    assert_eq!(collector.len(), 1);
}

// ============================================================================
// 3. Polymorphism: casts that do not apply yield nothing
// ============================================================================

fn kennel_tree() -> NodeBlueprint {
    NodeBlueprint::casted_type("Dog", NodeBlueprint::property("Dog", "kennel", NodeBlueprint::Marking))
}

#[test]
fn test_cat_is_not_a_dog() {
    let schema = zoo_schema();
    let ordinals = registry(&["name"]);
    let tree = ResolverNode::<Value>::build(&kennel_tree(), &ordinals, &schema).unwrap();

    let kennel = Entity::new("Kennel", 100);
    let cat = Entity::new("Cat", 1).with_property("kennel", &kennel);
    let dog = Entity::new("Dog", 2).with_property("kennel", &kennel);

    let introspector = ModelIntrospector::new(&schema);
    let context = RootContext::new(&introspector, None, PropertyAccessPolicy::Propagate);
    let mut collector = RecordingCollector::new();

    tree.resolve_entities_to_reindex(&mut collector, &Value::from(&cat), &context).unwrap();
    assert!(collector.is_empty());

    tree.resolve_entities_to_reindex(&mut collector, &Value::from(&dog), &context).unwrap();
    assert_eq!(collector.take(), vec![CollectorCall::UpdateBecauseOfContained {
        type_id: "Kennel".into(),
        entity: Value::from(&kennel),
    }]);
}

#[test]
fn test_cast_sees_through_proxies() {
    let schema = zoo_schema();
    let tree = ResolverNode::<Value>::build(&kennel_tree(), &registry(&[]), &schema).unwrap();

    let kennel = Entity::new("Kennel", 100);
    let dog = Entity::new("Dog", 2).with_property("kennel", &kennel);
    // A proxy typed by the association's declared type hides the subtype.
    let proxy = EntityProxy::new("Animal", &dog);

    let introspector = ModelIntrospector::new(&schema);
    let context = RootContext::new(&introspector, None, PropertyAccessPolicy::Propagate);
    let mut collector = RecordingCollector::new();
    tree.resolve_entities_to_reindex(&mut collector, &Value::from(&proxy), &context).unwrap();

    assert_eq!(collector.len(), 1);
    assert!(proxy.is_initialized());
}

// ============================================================================
// 4. Multi nodes fan out independently
// ============================================================================

#[test]
fn test_multi_branches_are_independent() {
    let schema = zoo_schema();
    let blueprint = NodeBlueprint::multi([
        kennel_tree(),
        NodeBlueprint::property("Animal", "owner", NodeBlueprint::Marking),
    ]);
    let tree = ResolverNode::<Value>::build(&blueprint, &registry(&[]), &schema).unwrap();

    let owner = Entity::new("Person", 7);
    let kennel = Entity::new("Kennel", 100);
    let cat = Entity::new("Cat", 1).with_property("owner", &owner);
    let dog = Entity::new("Dog", 2).with_property("owner", &owner).with_property("kennel", &kennel);

    let introspector = ModelIntrospector::new(&schema);
    let context = RootContext::new(&introspector, None, PropertyAccessPolicy::Propagate);
    let mut collector = RecordingCollector::new();

    // The failed cast in the first branch does not stop the second.
    tree.resolve_entities_to_reindex(&mut collector, &Value::from(&cat), &context).unwrap();
    assert_eq!(collector.take(), vec![CollectorCall::UpdateBecauseOfContained {
        type_id: "Person".into(),
        entity: Value::from(&owner),
    }]);

    // Branches run in declaration order.
    tree.resolve_entities_to_reindex(&mut collector, &Value::from(&dog), &context).unwrap();
    assert_eq!(collector.take(), vec![
        CollectorCall::UpdateBecauseOfContained { type_id: "Kennel".into(), entity: Value::from(&kennel) },
        CollectorCall::UpdateBecauseOfContained { type_id: "Person".into(), entity: Value::from(&owner) },
    ]);
}

// ============================================================================
// 5. Pruning keeps lazy containers untouched
// ============================================================================

#[test]
fn test_pruned_subtree_leaves_lazy_collection_uninitialized() {
    let schema = family_schema();
    let registries = family_registries();
    let resolver = RootResolver::<Value>::build(&parent_blueprint(), &registries, &schema).unwrap();

    let child = Entity::new("Child", 10);
    let children = Value::lazy([Value::from(&child)]);
    let parent = Entity::new("Parent", 1).with_property("children", children.clone());
    let Value::Lazy(lazy) = &children else { unreachable!() };

    let introspector = ModelIntrospector::new(&schema);
    let mut collector = RecordingCollector::new();

    // `children.name` is mapped but not part of what the tree filters on.
    let state = dirty(resolver.path_ordinals(), &["children.name"]);
    let context = RootContext::new(&introspector, Some(&state), PropertyAccessPolicy::Propagate);
    resolver.resolve_entities_to_reindex(&mut collector, &Value::from(&parent), &context).unwrap();
    assert!(collector.is_empty());
    assert!(!lazy.is_initialized());

    let state = dirty(resolver.path_ordinals(), &["name"]);
    let context = context.with_dirtiness(Some(&state));
    resolver.resolve_entities_to_reindex(&mut collector, &Value::from(&parent), &context).unwrap();
    assert_eq!(collector.len(), 1);
    assert!(lazy.is_initialized());
}

// ============================================================================
// 6. Map values and embeddables
// ============================================================================

#[test]
fn test_map_values_through_embeddable() {
    // Embeddables have no documents of their own: marking one reports nothing.
    let schema = ModelSchema::new()
        .entity("Library", &[], &["branches"])
        .entity("Branch", &[], &["library", "address"])
        .embeddable("Address", &["city"]);
    let blueprint = NodeBlueprint::property(
        "Branch",
        "address",
        NodeBlueprint::multi([
            NodeBlueprint::Marking,
            NodeBlueprint::original_type(NodeBlueprint::Marking),
        ]),
    );
    let tree = ResolverNode::<Value>::build(&blueprint, &registry(&[]), &schema).unwrap();

    let address = Entity::new("Address", 5).with_property("city", "Lyon");
    let branch = Entity::new("Branch", 2).with_property("address", &address);

    let introspector = ModelIntrospector::new(&schema);
    let context = RootContext::new(&introspector, None, PropertyAccessPolicy::Propagate);
    let mut collector = RecordingCollector::new();
    tree.resolve_entities_to_reindex(&mut collector, &Value::from(&branch), &context).unwrap();
    // An embeddable is not a containing entity.
    assert!(collector.is_empty());

    let library_tree = ResolverNode::<Value>::build(
        &NodeBlueprint::property(
            "Library",
            "branches",
            NodeBlueprint::container("map_values", NodeBlueprint::Marking),
        ),
        &registry(&[]),
        &schema,
    )
    .unwrap();
    let library = Entity::new("Library", 1).with_property(
        "branches",
        Value::map([("north", Value::from(&branch)), ("closed", Value::Null)]),
    );
    library_tree.resolve_entities_to_reindex(&mut collector, &Value::from(&library), &context).unwrap();
    assert_eq!(collector.take(), vec![CollectorCall::UpdateBecauseOfContained {
        type_id: "Branch".into(),
        entity: Value::from(&branch),
    }]);
}
