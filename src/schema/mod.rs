//! # Schema Descriptors
//!
//! The schema collaborator, rendered as plain descriptor types: a
//! [`Kind`] names the attributes an item may carry, and each
//! [`Attribute`] holds the aspects that drive repository behavior —
//! cardinality, the inverse attribute name, inheritance, persistence,
//! and the delete/count policies used by cascading deletion.
//!
//! An item without a Kind (or an attribute its Kind does not declare)
//! runs schema-less: every aspect lookup falls back to its default.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::Value;

// ============================================================================
// Aspect value types
// ============================================================================

/// Declared shape of an attribute's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    #[default]
    Single,
    List,
    Dict,
}

/// What happens to referenced items when the referring item is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletePolicy {
    /// Drop the link silently.
    #[default]
    Remove,
    /// Queue referenced items for deletion, gated on their counted
    /// reference count reaching zero.
    Cascade,
}

/// Whether a reference attribute contributes to its item's aggregate
/// reference count used for cascade gating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountPolicy {
    #[default]
    None,
    Count,
}

/// Names of the per-attribute aspects, for existence probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aspect {
    Cardinality,
    OtherName,
    InheritFrom,
    Persist,
    DeletePolicy,
    CountPolicy,
    DefaultValue,
}

// ============================================================================
// Attribute
// ============================================================================

/// A declared attribute: the aspect holder.
///
/// Every aspect is optional; accessors apply the documented defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attribute {
    cardinality: Option<Cardinality>,
    other_name: Option<String>,
    inherit_from: Option<String>,
    persist: Option<bool>,
    delete_policy: Option<DeletePolicy>,
    count_policy: Option<CountPolicy>,
    default_value: Option<Value>,
}

impl Attribute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }

    /// Declare the inverse attribute name on referenced items.
    pub fn with_other_name(mut self, other_name: impl Into<String>) -> Self {
        self.other_name = Some(other_name.into());
        self
    }

    /// Declare a dotted attribute path to inherit a value from when the
    /// attribute is unset.
    pub fn with_inherit_from(mut self, inherit_from: impl Into<String>) -> Self {
        self.inherit_from = Some(inherit_from.into());
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = Some(policy);
        self
    }

    pub fn with_count_policy(mut self, policy: CountPolicy) -> Self {
        self.count_policy = Some(policy);
        self
    }

    pub fn with_default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality.unwrap_or_default()
    }

    pub fn other_name(&self) -> Option<&str> {
        self.other_name.as_deref()
    }

    pub fn inherit_from(&self) -> Option<&str> {
        self.inherit_from.as_deref()
    }

    pub fn persist(&self) -> bool {
        self.persist.unwrap_or(true)
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy.unwrap_or_default()
    }

    pub fn count_policy(&self) -> CountPolicy {
        self.count_policy.unwrap_or_default()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Whether the aspect was explicitly declared (defaults don't count).
    pub fn has_aspect(&self, aspect: Aspect) -> bool {
        match aspect {
            Aspect::Cardinality => self.cardinality.is_some(),
            Aspect::OtherName => self.other_name.is_some(),
            Aspect::InheritFrom => self.inherit_from.is_some(),
            Aspect::Persist => self.persist.is_some(),
            Aspect::DeletePolicy => self.delete_policy.is_some(),
            Aspect::CountPolicy => self.count_policy.is_some(),
            Aspect::DefaultValue => self.default_value.is_some(),
        }
    }
}

// ============================================================================
// Kind
// ============================================================================

/// A schema descriptor: the attributes an item of this kind may carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kind {
    name: String,
    attributes: HashMap<String, Attribute>,
    display_attribute: Option<String>,
}

impl Kind {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: HashMap::new(), display_attribute: None }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    /// The attribute whose value stands in for an instance's display
    /// name when the instance has no `displayName` of its own.
    pub fn with_display_attribute(mut self, name: impl Into<String>) -> Self {
        self.display_attribute = Some(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn display_attribute(&self) -> Option<&str> {
        self.display_attribute.as_deref()
    }
}
