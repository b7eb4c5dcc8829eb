//! Per-invocation resolution context.

use serde::{Deserialize, Serialize};

use crate::capability::{PropertyAccessError, RuntimeIntrospector};
use crate::path::PathBitSet;
use crate::Result;

// ============================================================================
// Property access policy
// ============================================================================

/// What to do when a property read fails mid-resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyAccessPolicy {
    /// Fail the whole resolution call.
    #[default]
    Propagate,
    /// Skip the subtree below the failing property.
    Ignore,
}

/// The kind of change being resolved, used to pick a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Caller configuration for property access failures.
///
/// During cascading deletes, lazy associations of the deleted graph can no
/// longer be initialized; the default ignores those failures there and
/// propagates them everywhere else.
///
/// ```
/// use reindex_resolver::{PropertyAccessConfig, PropertyAccessPolicy};
///
/// let config: PropertyAccessConfig = serde_json::from_str(r#"{"during_delete": "propagate"}"#).unwrap();
/// assert_eq!(config.default, PropertyAccessPolicy::Propagate);
/// assert_eq!(config.during_delete, PropertyAccessPolicy::Propagate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyAccessConfig {
    pub default: PropertyAccessPolicy,
    pub during_delete: PropertyAccessPolicy,
}

impl Default for PropertyAccessConfig {
    fn default() -> Self {
        Self {
            default: PropertyAccessPolicy::Propagate,
            during_delete: PropertyAccessPolicy::Ignore,
        }
    }
}

impl PropertyAccessConfig {
    pub fn policy_for(&self, change: ChangeKind) -> PropertyAccessPolicy {
        match change {
            ChangeKind::Delete => self.during_delete,
            ChangeKind::Insert | ChangeKind::Update => self.default,
        }
    }
}

// ============================================================================
// RootContext
// ============================================================================

/// Everything a resolution call needs besides the collector and the value:
/// the runtime introspector, the dirtiness state of the changed instance, and
/// the property access policy.
///
/// Built by the caller for one top-level call (or one batch of them) and
/// passed by reference down the tree; nodes never mutate it.
pub struct RootContext<'a, V> {
    introspector: &'a dyn RuntimeIntrospector<V>,
    dirtiness: Option<&'a PathBitSet>,
    policy: PropertyAccessPolicy,
}

impl<'a, V> RootContext<'a, V> {
    /// `dirtiness == None` means "unknown: every path may have changed".
    pub fn new(
        introspector: &'a dyn RuntimeIntrospector<V>,
        dirtiness: Option<&'a PathBitSet>,
        policy: PropertyAccessPolicy,
    ) -> Self {
        Self { introspector, dirtiness, policy }
    }

    pub fn for_change(
        introspector: &'a dyn RuntimeIntrospector<V>,
        dirtiness: Option<&'a PathBitSet>,
        config: &PropertyAccessConfig,
        change: ChangeKind,
    ) -> Self {
        Self::new(introspector, dirtiness, config.policy_for(change))
    }

    /// Same introspector and policy, different dirtiness state.
    pub fn with_dirtiness(&self, dirtiness: Option<&'a PathBitSet>) -> Self {
        Self { introspector: self.introspector, dirtiness, policy: self.policy }
    }

    pub fn introspector(&self) -> &'a dyn RuntimeIntrospector<V> {
        self.introspector
    }

    pub fn dirtiness(&self) -> Option<&'a PathBitSet> {
        self.dirtiness
    }

    pub fn policy(&self) -> PropertyAccessPolicy {
        self.policy
    }

    /// Apply the configured policy to a failed property read.
    pub fn propagate_or_ignore_property_access_error(&self, error: PropertyAccessError) -> Result<()> {
        match self.policy {
            PropertyAccessPolicy::Propagate => Err(error.into()),
            PropertyAccessPolicy::Ignore => {
                tracing::debug!(
                    property = %error.property,
                    reason = %error.message,
                    "ignoring property access failure, skipping subtree"
                );
                Ok(())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
