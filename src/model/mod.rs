//! # In-Memory Object Model
//!
//! A small dynamic object graph implementing every capability the resolvers
//! consume. Embedders with their own object model implement the capability
//! traits directly; this one backs the tests and serves as a reference.
//!
//! Pure data plus interior mutability for properties: no I/O, no session.

pub mod value;
pub mod entity;
pub mod schema;

pub use value::Value;
pub use entity::{Entity, EntityProxy, LazyCollection};
pub use schema::{ModelIntrospector, ModelSchema, TypeKind};
