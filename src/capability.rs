//! # Capabilities
//!
//! The resolver never inspects values itself. Everything it needs from the
//! caller's object model goes through four capabilities, resolved once at
//! bootstrap:
//!
//! | Capability | Used by | Contract |
//! |------------|---------|----------|
//! | [`ReadHandle`] | property nodes | read one property; may fail (stale lazy proxies) |
//! | [`Extractor`] | container-element nodes | visit container elements without over-materializing |
//! | [`TypeCaster`] | casted-type nodes | checked downcast; `None` is normal polymorphism |
//! | [`RuntimeIntrospector`] | original-type and marking nodes | unproxy, detect entity type |
//!
//! [`CapabilityFactory`] is how blueprints get materialized into capabilities.
//! The closure adapters ([`FnReadHandle`], [`FnExtractor`], [`FnCaster`]) cover
//! object models that can express access as plain functions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Result;

// ============================================================================
// Type identifiers
// ============================================================================

/// Raw type identifier of an entity or embeddable type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeIdentifier(String);

impl TypeIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeIdentifier {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for TypeIdentifier {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// ============================================================================
// Property access failures
// ============================================================================

/// A property read failed, typically because a lazy association could not be
/// initialized anymore (e.g. its target was deleted in the same change set).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot read property '{property}': {message}")]
pub struct PropertyAccessError {
    pub property: String,
    pub message: String,
}

impl PropertyAccessError {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self { property: property.into(), message: message.into() }
    }
}

// ============================================================================
// Capability traits
// ============================================================================

/// Reads one property from a holder value.
pub trait ReadHandle<V>: fmt::Debug + Send + Sync {
    /// `Ok(None)` means the property is null.
    fn get(&self, holder: &V) -> std::result::Result<Option<V>, PropertyAccessError>;

    /// Release whatever the handle acquired at build time.
    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Visits the elements of a container value (collection, map values, array,
/// or a single wrapped value).
///
/// `visit` receives `None` for null elements. Implementations must only touch
/// as much of a lazy container as enumerating its elements requires, and must
/// propagate the first error returned by `visit`.
pub trait Extractor<V>: fmt::Debug + Send + Sync {
    fn extract(&self, container: &V, visit: &mut dyn FnMut(Option<&V>) -> Result<()>) -> Result<()>;

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Checked cast to one target type.
pub trait TypeCaster<V>: fmt::Debug + Send + Sync {
    /// The value as the target type, or `None` when it is not an instance of it.
    fn cast_or_none(&self, value: &V) -> Option<V>;

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Runtime knowledge about values: proxies and entity types.
pub trait RuntimeIntrospector<V> {
    /// The concrete instance behind a runtime proxy, or the value itself.
    fn unproxy(&self, value: &V) -> V;

    /// The entity type of `value`, or `None` when it is not an entity.
    /// Must not initialize proxies.
    fn detect_containing_entity_type(&self, value: &V) -> Option<crate::TypeIdentifier>;
}

/// Turns blueprint names into capabilities at bootstrap.
///
/// Every method fails fast on a broken binding (unknown type, property or
/// extractor) so that materialization can report it.
pub trait CapabilityFactory<V> {
    fn read_handle(&self, owner: &TypeIdentifier, property: &str) -> Result<Box<dyn ReadHandle<V>>>;

    fn extractor(&self, name: &str) -> Result<Box<dyn Extractor<V>>>;

    fn caster(&self, target: &TypeIdentifier) -> Result<Box<dyn TypeCaster<V>>>;
}

// ============================================================================
// Closure adapters
// ============================================================================

type ReadFn<V> = dyn Fn(&V) -> std::result::Result<Option<V>, PropertyAccessError> + Send + Sync;
type ExtractFn<V> = dyn Fn(&V, &mut dyn FnMut(Option<&V>) -> Result<()>) -> Result<()> + Send + Sync;
type CastFn<V> = dyn Fn(&V) -> Option<V> + Send + Sync;

/// [`ReadHandle`] backed by a closure.
pub struct FnReadHandle<V> {
    name: String,
    read: Box<ReadFn<V>>,
}

impl<V> FnReadHandle<V> {
    pub fn new<F>(name: impl Into<String>, read: F) -> Self
    where
        F: Fn(&V) -> std::result::Result<Option<V>, PropertyAccessError> + Send + Sync + 'static,
    {
        Self { name: name.into(), read: Box::new(read) }
    }
}

impl<V> fmt::Debug for FnReadHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl<V> ReadHandle<V> for FnReadHandle<V> {
    fn get(&self, holder: &V) -> std::result::Result<Option<V>, PropertyAccessError> {
        (self.read)(holder)
    }
}

/// [`Extractor`] backed by a closure.
pub struct FnExtractor<V> {
    name: String,
    extract: Box<ExtractFn<V>>,
}

impl<V> FnExtractor<V> {
    pub fn new<F>(name: impl Into<String>, extract: F) -> Self
    where
        F: Fn(&V, &mut dyn FnMut(Option<&V>) -> Result<()>) -> Result<()> + Send + Sync + 'static,
    {
        Self { name: name.into(), extract: Box::new(extract) }
    }
}

impl<V> fmt::Debug for FnExtractor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name)
    }
}

impl<V> Extractor<V> for FnExtractor<V> {
    fn extract(&self, container: &V, visit: &mut dyn FnMut(Option<&V>) -> Result<()>) -> Result<()> {
        (self.extract)(container, visit)
    }
}

/// [`TypeCaster`] backed by a closure.
pub struct FnCaster<V> {
    target: TypeIdentifier,
    cast: Box<CastFn<V>>,
}

impl<V> FnCaster<V> {
    pub fn new<F>(target: impl Into<TypeIdentifier>, cast: F) -> Self
    where
        F: Fn(&V) -> Option<V> + Send + Sync + 'static,
    {
        Self { target: target.into(), cast: Box::new(cast) }
    }
}

impl<V> fmt::Debug for FnCaster<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "as {}", self.target)
    }
}

impl<V> TypeCaster<V> for FnCaster<V> {
    fn cast_or_none(&self, value: &V) -> Option<V> {
        (self.cast)(value)
    }
}

// ============================================================================
// Tests
// ============================================================================
