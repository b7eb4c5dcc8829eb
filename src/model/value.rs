//! Dynamic value type of the in-memory object graph.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{Entity, EntityProxy, LazyCollection};

/// A value in the object graph.
///
/// Object-valued variants are shared handles: cloning a `Value` never copies
/// an entity, so bidirectional associations can point at each other.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    String(String),

    // Object types
    Entity(Arc<Entity>),
    Proxy(Arc<EntityProxy>),

    // Containers
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Lazy(Arc<LazyCollection>),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::String(_) => "STRING",
            Value::Entity(_) => "ENTITY",
            Value::Proxy(_) => "PROXY",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Lazy(_) => "LAZY_COLLECTION",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    pub fn as_entity(&self) -> Option<&Arc<Entity>> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn list(elements: impl IntoIterator<Item = Value>) -> Self {
        Value::List(elements.into_iter().collect())
    }

    /// An uninitialized lazy collection holding `elements`.
    pub fn lazy(elements: impl IntoIterator<Item = Value>) -> Self {
        Value::Lazy(LazyCollection::new(elements))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Scalars compare by value, entities by (type, id), proxies and lazy
/// collections by handle identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => a.type_id() == b.type_id() && a.id() == b.id(),
            (Value::Proxy(a), Value::Proxy(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Lazy(a), Value::Lazy(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl From<Arc<Entity>> for Value { fn from(v: Arc<Entity>) -> Self { Value::Entity(v) } }
impl From<&Arc<Entity>> for Value { fn from(v: &Arc<Entity>) -> Self { Value::Entity(Arc::clone(v)) } }
impl From<Arc<EntityProxy>> for Value { fn from(v: Arc<EntityProxy>) -> Self { Value::Proxy(v) } }
impl From<&Arc<EntityProxy>> for Value { fn from(v: &Arc<EntityProxy>) -> Self { Value::Proxy(Arc::clone(v)) } }
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::Entity(e) => write!(f, "{}#{}", e.type_id(), e.id()),
            Value::Proxy(p) => write!(f, "{p:?}"),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Lazy(c) => write!(f, "{c:?}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
