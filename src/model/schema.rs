//! Type metadata of the in-memory object graph, and the capabilities derived
//! from it.

use hashbrown::{HashMap, HashSet};

use super::Value;
use crate::capability::{
    CapabilityFactory, Extractor, PropertyAccessError, ReadHandle, RuntimeIntrospector,
    TypeCaster, TypeIdentifier,
};
use crate::{Error, Result};

/// Whether instances of a type are entities (own identity, may be a
/// containing entity) or embeddables (live inside an entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Entity,
    Embeddable,
}

#[derive(Debug, Clone)]
struct TypeInfo {
    kind: TypeKind,
    supertypes: Vec<TypeIdentifier>,
    properties: Vec<String>,
}

/// Declared types, their supertypes and properties.
///
/// Implements [`CapabilityFactory<Value>`]: read handles are checked against
/// declared properties (inherited ones included), casters against declared
/// types. Built-in extractors:
///
/// | Name | Container | Elements |
/// |------|-----------|----------|
/// | `collection` | `List` or `Lazy` | each element |
/// | `map_values` | `Map` | each value, in key order |
/// | `optional` | any | the value itself |
#[derive(Debug, Clone, Default)]
pub struct ModelSchema {
    types: HashMap<TypeIdentifier, TypeInfo>,
}

impl ModelSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(self, name: &str, supertypes: &[&str], properties: &[&str]) -> Self {
        self.declare(name, TypeKind::Entity, supertypes, properties)
    }

    pub fn embeddable(self, name: &str, properties: &[&str]) -> Self {
        self.declare(name, TypeKind::Embeddable, &[], properties)
    }

    fn declare(mut self, name: &str, kind: TypeKind, supertypes: &[&str], properties: &[&str]) -> Self {
        self.types.insert(
            TypeIdentifier::from(name),
            TypeInfo {
                kind,
                supertypes: supertypes.iter().copied().map(TypeIdentifier::from).collect(),
                properties: properties.iter().map(|p| (*p).to_owned()).collect(),
            },
        );
        self
    }

    pub fn kind(&self, type_id: &TypeIdentifier) -> Option<TypeKind> {
        self.types.get(type_id).map(|info| info.kind)
    }

    /// Reflexive and transitive. Cyclic supertype declarations terminate.
    pub fn is_subtype_of(&self, type_id: &TypeIdentifier, target: &TypeIdentifier) -> bool {
        self.ancestors(type_id).contains(target)
    }

    /// Declared on the type or inherited from any of its supertypes.
    pub fn has_property(&self, type_id: &TypeIdentifier, property: &str) -> bool {
        self.ancestors(type_id).iter().any(|ancestor| {
            self.types
                .get(*ancestor)
                .is_some_and(|info| info.properties.iter().any(|p| p == property))
        })
    }

    /// `type_id` and every type reachable through its supertypes, each once.
    fn ancestors<'a>(&'a self, type_id: &'a TypeIdentifier) -> HashSet<&'a TypeIdentifier> {
        let mut visited = HashSet::new();
        let mut pending = vec![type_id];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(info) = self.types.get(current) {
                pending.extend(info.supertypes.iter());
            }
        }
        visited
    }

    /// Fails when `type_id` is its own supertype through some chain.
    fn check_acyclic(&self, type_id: &TypeIdentifier) -> Result<()> {
        let cyclic = self.types.get(type_id).is_some_and(|info| {
            info.supertypes.iter().any(|sup| self.ancestors(sup).contains(type_id))
        });
        if cyclic {
            return Err(Error::Capability(format!("type '{type_id}' is its own supertype")));
        }
        Ok(())
    }

    fn subtypes_of(&self, target: &TypeIdentifier) -> HashSet<TypeIdentifier> {
        self.types
            .keys()
            .filter(|type_id| self.is_subtype_of(type_id, target))
            .cloned()
            .collect()
    }
}

impl CapabilityFactory<Value> for ModelSchema {
    fn read_handle(&self, owner: &TypeIdentifier, property: &str) -> Result<Box<dyn ReadHandle<Value>>> {
        if !self.types.contains_key(owner) {
            return Err(Error::UnknownType(owner.clone()));
        }
        self.check_acyclic(owner)?;
        if !self.has_property(owner, property) {
            return Err(Error::UnknownProperty { owner: owner.clone(), property: property.to_owned() });
        }
        Ok(Box::new(PropertyReader { owner: owner.clone(), property: property.to_owned() }))
    }

    fn extractor(&self, name: &str) -> Result<Box<dyn Extractor<Value>>> {
        let kind = match name {
            "collection" => ContainerKind::Collection,
            "map_values" => ContainerKind::MapValues,
            "optional" => ContainerKind::Optional,
            other => return Err(Error::UnknownExtractor(other.to_owned())),
        };
        Ok(Box::new(ContainerExtractor { kind }))
    }

    fn caster(&self, target: &TypeIdentifier) -> Result<Box<dyn TypeCaster<Value>>> {
        if !self.types.contains_key(target) {
            return Err(Error::UnknownType(target.clone()));
        }
        self.check_acyclic(target)?;
        Ok(Box::new(SubtypeCaster { target: target.clone(), accepted: self.subtypes_of(target) }))
    }
}

// ============================================================================
// Capabilities
// ============================================================================

#[derive(Debug)]
struct PropertyReader {
    owner: TypeIdentifier,
    property: String,
}

impl ReadHandle<Value> for PropertyReader {
    fn get(&self, holder: &Value) -> std::result::Result<Option<Value>, PropertyAccessError> {
        let value = match holder {
            Value::Entity(entity) => entity.get(&self.property),
            Value::Proxy(proxy) => proxy.initialize(&self.property)?.get(&self.property),
            other => {
                return Err(PropertyAccessError::new(
                    self.property.as_str(),
                    format!("expected an instance of '{}', got {}", self.owner, other.type_name()),
                ));
            }
        };
        Ok((!value.is_null()).then_some(value))
    }
}

#[derive(Debug, Clone, Copy)]
enum ContainerKind {
    Collection,
    MapValues,
    Optional,
}

#[derive(Debug)]
struct ContainerExtractor {
    kind: ContainerKind,
}

impl Extractor<Value> for ContainerExtractor {
    fn extract(&self, container: &Value, visit: &mut dyn FnMut(Option<&Value>) -> Result<()>) -> Result<()> {
        let elements: &[Value] = match (self.kind, container) {
            (_, Value::Null) => return Ok(()),
            (ContainerKind::Optional, value) => return visit(Some(value)),
            (ContainerKind::Collection, Value::List(elements)) => elements,
            (ContainerKind::Collection, Value::Lazy(lazy)) => lazy.elements(),
            (ContainerKind::MapValues, Value::Map(map)) => {
                for value in map.values() {
                    visit(non_null(value))?;
                }
                return Ok(());
            }
            (kind, other) => {
                return Err(Error::Extraction(format!("{kind:?} extractor cannot read {}", other.type_name())));
            }
        };
        for element in elements {
            visit(non_null(element))?;
        }
        Ok(())
    }
}

fn non_null(value: &Value) -> Option<&Value> {
    (!value.is_null()).then_some(value)
}

struct SubtypeCaster {
    target: TypeIdentifier,
    accepted: HashSet<TypeIdentifier>,
}

impl std::fmt::Debug for SubtypeCaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "as {}", self.target)
    }
}

impl TypeCaster<Value> for SubtypeCaster {
    fn cast_or_none(&self, value: &Value) -> Option<Value> {
        let type_id = match value {
            Value::Entity(entity) => entity.type_id(),
            // Decided from the declared type; the proxy stays uninitialized.
            Value::Proxy(proxy) => proxy.declared_type(),
            _ => return None,
        };
        self.accepted.contains(type_id).then(|| value.clone())
    }
}

// ============================================================================
// ModelIntrospector
// ============================================================================

/// [`RuntimeIntrospector`] over [`Value`]s of one schema.
#[derive(Debug, Clone, Copy)]
pub struct ModelIntrospector<'s> {
    schema: &'s ModelSchema,
}

impl<'s> ModelIntrospector<'s> {
    pub fn new(schema: &'s ModelSchema) -> Self {
        Self { schema }
    }
}

impl RuntimeIntrospector<Value> for ModelIntrospector<'_> {
    fn unproxy(&self, value: &Value) -> Value {
        match value {
            Value::Proxy(proxy) => match proxy.load() {
                Some(target) => Value::Entity(target.clone()),
                // A stale proxy is handed on as is; reads through it fail later.
                None => value.clone(),
            },
            other => other.clone(),
        }
    }

    fn detect_containing_entity_type(&self, value: &Value) -> Option<TypeIdentifier> {
        let type_id = match value {
            Value::Entity(entity) => entity.type_id(),
            Value::Proxy(proxy) => proxy.declared_type(),
            _ => return None,
        };
        (self.schema.kind(type_id) == Some(TypeKind::Entity)).then(|| type_id.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
