//! Entities, proxies and lazy collections.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use parking_lot::RwLock;

use super::Value;
use crate::capability::{PropertyAccessError, TypeIdentifier};

// ============================================================================
// Entity
// ============================================================================

/// An instance of an entity or embeddable type.
///
/// Properties sit behind a lock so that associations can be wired after
/// construction and mutated while resolvers read them.
pub struct Entity {
    type_id: TypeIdentifier,
    id: u64,
    properties: RwLock<HashMap<String, Value>>,
}

impl Entity {
    pub fn new(type_id: impl Into<TypeIdentifier>, id: u64) -> Arc<Self> {
        Arc::new(Self {
            type_id: type_id.into(),
            id,
            properties: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_property(self: Arc<Self>, name: impl Into<String>, value: impl Into<Value>) -> Arc<Self> {
        self.set(name, value);
        self
    }

    pub fn type_id(&self) -> &TypeIdentifier {
        &self.type_id
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The property value; absent properties read as `Null`.
    pub fn get(&self, name: &str) -> Value {
        self.properties.read().get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.write().insert(name.into(), value.into());
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.properties.write().remove(name)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Properties are left out: associations are usually cyclic.
        write!(f, "{}#{}", self.type_id, self.id)
    }
}

// ============================================================================
// EntityProxy
// ============================================================================

/// Runtime proxy standing in for an entity that may not be loaded yet.
///
/// The declared type is known without initialization. A proxy without a
/// target is stale (its entity was deleted or its session is gone): reading
/// through it fails.
pub struct EntityProxy {
    declared_type: TypeIdentifier,
    target: Option<Arc<Entity>>,
    initialized: AtomicBool,
}

impl EntityProxy {
    pub fn new(declared_type: impl Into<TypeIdentifier>, target: &Arc<Entity>) -> Arc<Self> {
        Arc::new(Self {
            declared_type: declared_type.into(),
            target: Some(Arc::clone(target)),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn stale(declared_type: impl Into<TypeIdentifier>) -> Arc<Self> {
        Arc::new(Self {
            declared_type: declared_type.into(),
            target: None,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn declared_type(&self) -> &TypeIdentifier {
        &self.declared_type
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Load the target; `None` for a stale proxy.
    pub fn load(&self) -> Option<&Arc<Entity>> {
        let target = self.target.as_ref()?;
        self.initialized.store(true, Ordering::Release);
        Some(target)
    }

    /// Like [`EntityProxy::load`], but a stale proxy fails the property read
    /// named by `property`.
    pub fn initialize(&self, property: &str) -> Result<&Arc<Entity>, PropertyAccessError> {
        match self.load() {
            Some(target) => Ok(target),
            None => Err(PropertyAccessError::new(
                property,
                format!("proxy of '{}' could not be initialized: no target", self.declared_type),
            )),
        }
    }
}

impl fmt::Debug for EntityProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "Proxy<{}>({}#{})", self.declared_type, target.type_id(), target.id()),
            None => write!(f, "Proxy<{}>(stale)", self.declared_type),
        }
    }
}

// ============================================================================
// LazyCollection
// ============================================================================

/// Collection whose elements are loaded on first access.
pub struct LazyCollection {
    elements: Vec<Value>,
    initialized: AtomicBool,
}

impl LazyCollection {
    pub fn new(elements: impl IntoIterator<Item = Value>) -> Arc<Self> {
        Arc::new(Self {
            elements: elements.into_iter().collect(),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Initializes the collection.
    pub fn elements(&self) -> &[Value] {
        self.initialized.store(true, Ordering::Release);
        &self.elements
    }
}

impl fmt::Debug for LazyCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_initialized() {
            write!(f, "Lazy[{} element(s)]", self.elements.len())
        } else {
            f.write_str("Lazy[uninitialized]")
        }
    }
}
