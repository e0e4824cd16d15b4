//! Attribute operations: the two-store dispatch, aspect lookups, and
//! the bidirectional reference machinery.
//!
//! Every attribute name lives in at most one of an item's two stores —
//! literal Values or item References. Setting routes by the supplied
//! value: an item id goes to References, anything else to Values, and
//! crossing over evicts (and for references, detaches) the old entry
//! first.

use std::collections::HashMap;

use crate::model::{ItemId, RefCollection, RefValue, SingleRef, Status, Value};
use crate::schema::{Aspect, Attribute, Cardinality, CountPolicy, DeletePolicy};
use crate::store::Store;
use crate::{Error, Result};

use super::Repository;

/// Hops allowed along an `inheritFrom` chain before giving up; a
/// self-referential configuration would otherwise recurse forever.
const MAX_INHERIT_DEPTH: usize = 32;

// ============================================================================
// AttrValue
// ============================================================================

/// An attribute value as seen at the repository boundary: a literal, a
/// single referenced item, or the ordered members of a reference
/// collection.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Value(Value),
    Item(ItemId),
    Items(Vec<ItemId>),
}

impl AttrValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Value(value) => value.type_name(),
            AttrValue::Item(_) => "ITEM",
            AttrValue::Items(_) => "ITEM COLLECTION",
        }
    }

    pub fn as_item(&self) -> Option<ItemId> {
        match self {
            AttrValue::Item(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            AttrValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[ItemId]> {
        match self {
            AttrValue::Items(ids) => Some(ids),
            _ => None,
        }
    }
}

impl From<Value> for AttrValue {
    fn from(value: Value) -> Self {
        AttrValue::Value(value)
    }
}

impl From<ItemId> for AttrValue {
    fn from(id: ItemId) -> Self {
        AttrValue::Item(id)
    }
}

impl From<Vec<ItemId>> for AttrValue {
    fn from(ids: Vec<ItemId>) -> Self {
        AttrValue::Items(ids)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Value(Value::from(value))
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Value(Value::from(value))
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Value(Value::from(value))
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Value(Value::from(value))
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Value(Value::from(value))
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Value(Value::from(value))
    }
}

// ============================================================================
// Collection keys
// ============================================================================

/// A key into a multi-valued attribute: a list index, a map key or
/// collection alias, or a referenced item's id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectionKey<'a> {
    Index(usize),
    Name(&'a str),
    Id(ItemId),
}

impl From<usize> for CollectionKey<'_> {
    fn from(index: usize) -> Self {
        CollectionKey::Index(index)
    }
}

impl<'a> From<&'a str> for CollectionKey<'a> {
    fn from(name: &'a str) -> Self {
        CollectionKey::Name(name)
    }
}

impl From<ItemId> for CollectionKey<'_> {
    fn from(id: ItemId) -> Self {
        CollectionKey::Id(id)
    }
}

// ============================================================================
// Repository: aspects
// ============================================================================

impl<S: Store> Repository<S> {
    fn attr_descriptor(&self, item: ItemId, name: &str) -> Option<&Attribute> {
        self.kind_of(item).and_then(|kind| kind.attribute(name))
    }

    /// Whether the named aspect is explicitly declared for an attribute.
    /// Absent kind means no aspects: schema-less items answer false.
    pub fn has_aspect(&self, item: ItemId, name: &str, aspect: Aspect) -> bool {
        self.attr_descriptor(item, name).is_some_and(|attr| attr.has_aspect(aspect))
    }

    pub fn aspect_cardinality(&self, item: ItemId, name: &str) -> Cardinality {
        self.attr_descriptor(item, name).map(Attribute::cardinality).unwrap_or_default()
    }

    pub fn aspect_persist(&self, item: ItemId, name: &str) -> bool {
        self.attr_descriptor(item, name).map(Attribute::persist).unwrap_or(true)
    }

    pub fn aspect_delete_policy(&self, item: ItemId, name: &str) -> DeletePolicy {
        self.attr_descriptor(item, name).map(Attribute::delete_policy).unwrap_or_default()
    }

    pub fn aspect_count_policy(&self, item: ItemId, name: &str) -> CountPolicy {
        self.attr_descriptor(item, name).map(Attribute::count_policy).unwrap_or_default()
    }

    pub fn aspect_inherit_from(&self, item: ItemId, name: &str) -> Option<String> {
        self.attr_descriptor(item, name)
            .and_then(Attribute::inherit_from)
            .map(str::to_owned)
    }

    pub fn aspect_default_value(&self, item: ItemId, name: &str) -> Option<Value> {
        self.attr_descriptor(item, name).and_then(Attribute::default_value).cloned()
    }

    /// The inverse attribute name for a reference attribute. A declared
    /// attribute must carry the `otherName` aspect; an undeclared
    /// (schema-less) attribute derives `<name>__for`, and `<name>__for`
    /// maps back to `<name>`.
    fn derived_other_name(&self, item: ItemId, name: &str) -> Result<String> {
        if let Some(attr) = self.attr_descriptor(item, name) {
            return match attr.other_name() {
                Some(other_name) => Ok(other_name.to_owned()),
                None => Err(Error::TypeError {
                    expected: "declared inverse (otherName aspect)".into(),
                    got: format!("attribute {name} without one"),
                }),
            };
        }
        Ok(match name.strip_suffix("__for") {
            Some(base) => base.to_owned(),
            None => format!("{name}__for"),
        })
    }
}

// ============================================================================
// Repository: attribute access
// ============================================================================

impl<S: Store> Repository<S> {
    /// The named attribute's value. Resolution order: literal value,
    /// dereferenced reference, `inheritFrom` chain, `defaultValue`
    /// aspect, else `AttributeNotFound`.
    pub fn attribute_value(&self, item: ItemId, name: &str) -> Result<AttrValue> {
        self.attribute_value_inner(item, name, None, 0)
    }

    /// As `attribute_value`, but a missing attribute yields `default`
    /// (taking precedence over the `defaultValue` aspect).
    pub fn attribute_value_or(
        &self,
        item: ItemId,
        name: &str,
        default: impl Into<AttrValue>,
    ) -> Result<AttrValue> {
        self.attribute_value_inner(item, name, Some(default.into()), 0)
    }

    fn attribute_value_inner(
        &self,
        item: ItemId,
        name: &str,
        default: Option<AttrValue>,
        depth: usize,
    ) -> Result<AttrValue> {
        if depth > MAX_INHERIT_DEPTH {
            return Err(Error::Schema(format!(
                "inheritFrom chain exceeds {MAX_INHERIT_DEPTH} hops resolving {name}"
            )));
        }

        let entry = self.entry(item)?;
        if entry.is_deleted() {
            return Err(Error::Deleted(item));
        }

        if let Some(value) = entry.values.get(name) {
            return Ok(AttrValue::Value(value.clone()));
        }
        if let Some(value) = entry.references.get(name) {
            return Ok(match value {
                RefValue::Single(link) => AttrValue::Item(link.other),
                RefValue::Collection(refs) => AttrValue::Items(refs.others().collect()),
            });
        }

        if let Some(inherit) = self.aspect_inherit_from(item, name) {
            let mut cursor = item;
            let segments: Vec<&str> = inherit.split('.').collect();
            for (index, segment) in segments.iter().enumerate() {
                let value = self.attribute_value_inner(cursor, segment, None, depth + 1)?;
                if index + 1 == segments.len() {
                    return Ok(value);
                }
                match value {
                    AttrValue::Item(next) => cursor = next,
                    other => {
                        return Err(Error::TypeError {
                            expected: "item reference along inheritFrom path".into(),
                            got: other.type_name().into(),
                        });
                    }
                }
            }
        }

        if let Some(default) = default {
            return Ok(default);
        }
        if let Some(value) = self.aspect_default_value(item, name) {
            return Ok(AttrValue::Value(value));
        }
        Err(Error::AttributeNotFound { item, name: name.to_owned() })
    }

    /// Whether the attribute has a value in either store. False for
    /// unknown or deleted items.
    pub fn has_attribute(&self, item: ItemId, name: &str) -> bool {
        match self.items.get(&item) {
            Some(entry) if !entry.is_deleted() => {
                entry.values.contains_key(name) || entry.references.contains_key(name)
            }
            _ => false,
        }
    }

    /// Set an attribute, routing to the Values or References store by
    /// the supplied value. Overwriting a single reference reattaches
    /// the existing edge; both endpoints of any changed edge are marked
    /// dirty. Returns the stored shape.
    pub fn set_attribute(
        &mut self,
        item: ItemId,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> Result<AttrValue> {
        let value = value.into();
        self.live(item)?;
        self.mark_dirty(item);

        let in_values = self.entry(item)?.values.contains_key(name);

        match value {
            AttrValue::Value(value) => {
                if !in_values {
                    self.detach_reference(item, name)?;
                }
                if let Some(entry) = self.items.get_mut(&item) {
                    entry.values.insert(name.to_owned(), value.clone());
                }
                Ok(AttrValue::Value(value))
            }
            AttrValue::Item(other) => {
                self.live(other)?;
                if in_values {
                    if let Some(entry) = self.items.get_mut(&item) {
                        entry.values.remove(name);
                    }
                }
                match self.aspect_cardinality(item, name) {
                    Cardinality::Single => self.set_single_ref(item, name, other),
                    Cardinality::List | Cardinality::Dict => {
                        self.detach_reference(item, name)?;
                        self.append_ref(item, name, other, None)?;
                        Ok(AttrValue::Items(vec![other]))
                    }
                }
            }
            AttrValue::Items(others) => {
                if self.aspect_cardinality(item, name) == Cardinality::Single {
                    return Err(Error::TypeError {
                        expected: "multi-valued attribute".into(),
                        got: "single cardinality".into(),
                    });
                }
                for other in &others {
                    self.live(*other)?;
                }
                if in_values {
                    if let Some(entry) = self.items.get_mut(&item) {
                        entry.values.remove(name);
                    }
                }
                self.detach_reference(item, name)?;
                for other in &others {
                    self.append_ref(item, name, *other, None)?;
                }
                Ok(AttrValue::Items(others))
            }
        }
    }

    /// Remove an attribute's value; references are detached on both
    /// sides first. Returns whether anything was removed.
    pub fn remove_attribute(&mut self, item: ItemId, name: &str) -> Result<bool> {
        self.live(item)?;
        self.mark_dirty(item);

        let removed = self
            .items
            .get_mut(&item)
            .and_then(|entry| entry.values.remove(name))
            .is_some();
        if removed {
            return Ok(true);
        }
        self.detach_reference(item, name)
    }

    /// All attributes as (name, value) pairs, literals first, both in
    /// insertion order. References are dereferenced.
    pub fn iter_attributes(&self, item: ItemId) -> impl Iterator<Item = (&str, AttrValue)> + '_ {
        self.iter_values(item).chain(self.iter_references(item))
    }

    pub fn iter_values(&self, item: ItemId) -> impl Iterator<Item = (&str, AttrValue)> + '_ {
        self.items
            .get(&item)
            .into_iter()
            .flat_map(|entry| entry.values())
            .map(|(name, value)| (name, AttrValue::Value(value.clone())))
    }

    pub fn iter_references(&self, item: ItemId) -> impl Iterator<Item = (&str, AttrValue)> + '_ {
        self.items
            .get(&item)
            .into_iter()
            .flat_map(|entry| entry.references())
            .map(|(name, value)| {
                let value = match value {
                    RefValue::Single(link) => AttrValue::Item(link.other),
                    RefValue::Collection(refs) => AttrValue::Items(refs.others().collect()),
                };
                (name, value)
            })
    }

    /// Consistency pass: every reference edge must be mirrored on its
    /// far item, and collection alias tables must be in sync.
    pub fn check(&self, item: ItemId) -> Result<()> {
        let entry = self.live(item)?;
        for (name, value) in entry.references() {
            match value {
                RefValue::Single(link) => {
                    self.check_inverse(item, name, link.other, &link.other_name)?;
                }
                RefValue::Collection(refs) => {
                    if !refs.check() {
                        return Err(Error::ConstraintViolation(format!(
                            "alias table out of sync for {name} on {item}"
                        )));
                    }
                    for other in refs.others() {
                        self.check_inverse(item, name, other, refs.other_name())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_inverse(&self, item: ItemId, name: &str, other: ItemId, other_name: &str) -> Result<()> {
        let far = self.entry(other)?;
        let mirrored = match far.references.get(other_name) {
            Some(RefValue::Single(link)) => link.other == item,
            Some(RefValue::Collection(refs)) => refs.contains(&item),
            None => false,
        };
        if mirrored {
            Ok(())
        } else {
            Err(Error::ConstraintViolation(format!(
                "missing inverse {other_name} on {other} for {name} on {item}"
            )))
        }
    }
}

// ============================================================================
// Repository: multi-valued accessors
// ============================================================================

/// What a literal multi-value mutation should do, decided before any
/// mutable borrow is taken.
enum LiteralPlan {
    MapInsert,
    ListSet,
    CreateMap,
    CreateList,
    Scalar,
}

impl<S: Store> Repository<S> {
    /// Set a value under a key of a multi-valued attribute, creating
    /// the collection per the attribute's cardinality when absent. For
    /// reference attributes a `Name` key aliases the entry.
    pub fn set_value(
        &mut self,
        item: ItemId,
        attribute: &str,
        key: CollectionKey<'_>,
        value: impl Into<AttrValue>,
    ) -> Result<()> {
        let value = value.into();
        self.live(item)?;

        match value {
            AttrValue::Item(other) => {
                self.live(other)?;
                self.mark_dirty(item);
                let alias = match key {
                    CollectionKey::Name(alias) => Some(alias.to_owned()),
                    _ => None,
                };
                let has_collection = matches!(
                    self.entry(item)?.references.get(attribute),
                    Some(RefValue::Collection(_))
                );
                if self.aspect_cardinality(item, attribute) == Cardinality::Single && !has_collection
                {
                    self.set_attribute(item, attribute, other)?;
                    Ok(())
                } else {
                    self.append_ref(item, attribute, other, alias)
                }
            }
            AttrValue::Items(_) => Err(Error::TypeError {
                expected: "a single value per key".into(),
                got: "item collection".into(),
            }),
            AttrValue::Value(value) => {
                self.mark_dirty(item);
                let plan = match self.entry(item)?.values.get(attribute) {
                    Some(Value::Map(_)) => LiteralPlan::MapInsert,
                    Some(Value::List(_)) => LiteralPlan::ListSet,
                    Some(other) => {
                        return Err(Error::TypeError {
                            expected: "multi-valued attribute".into(),
                            got: other.type_name().into(),
                        });
                    }
                    None => match self.aspect_cardinality(item, attribute) {
                        Cardinality::Dict => LiteralPlan::CreateMap,
                        Cardinality::List => LiteralPlan::CreateList,
                        Cardinality::Single => LiteralPlan::Scalar,
                    },
                };
                self.apply_literal_plan(item, attribute, key, value, plan)
            }
        }
    }

    /// Append a value to a multi-valued attribute, creating it when
    /// absent. A single-cardinality attribute degrades to a plain set.
    pub fn add_value(
        &mut self,
        item: ItemId,
        attribute: &str,
        value: impl Into<AttrValue>,
    ) -> Result<()> {
        let value = value.into();
        self.live(item)?;

        match value {
            AttrValue::Item(other) => {
                self.live(other)?;
                self.mark_dirty(item);
                let has_collection = matches!(
                    self.entry(item)?.references.get(attribute),
                    Some(RefValue::Collection(_))
                );
                if self.aspect_cardinality(item, attribute) == Cardinality::Single && !has_collection
                {
                    self.set_attribute(item, attribute, other)?;
                    Ok(())
                } else {
                    self.append_ref(item, attribute, other, None)
                }
            }
            AttrValue::Items(others) => {
                for other in others {
                    self.add_value(item, attribute, other)?;
                }
                Ok(())
            }
            AttrValue::Value(value) => {
                self.mark_dirty(item);
                enum Plan {
                    Push,
                    NeedsKey,
                    CreateList,
                    Scalar,
                }
                let plan = match self.entry(item)?.values.get(attribute) {
                    Some(Value::List(_)) => Plan::Push,
                    Some(Value::Map(_)) => Plan::NeedsKey,
                    Some(_) => Plan::Scalar,
                    None => match self.aspect_cardinality(item, attribute) {
                        Cardinality::Dict => Plan::NeedsKey,
                        Cardinality::List => Plan::CreateList,
                        Cardinality::Single => Plan::Scalar,
                    },
                };
                match plan {
                    Plan::Push => {
                        if let Some(Value::List(list)) =
                            self.items.get_mut(&item).and_then(|entry| entry.values.get_mut(attribute))
                        {
                            list.push(value);
                        }
                        Ok(())
                    }
                    Plan::CreateList => {
                        // the name may currently hold references; evict them first
                        self.detach_reference(item, attribute)?;
                        if let Some(entry) = self.items.get_mut(&item) {
                            entry.values.insert(attribute.to_owned(), Value::List(vec![value]));
                        }
                        Ok(())
                    }
                    Plan::Scalar => {
                        self.set_attribute(item, attribute, value)?;
                        Ok(())
                    }
                    Plan::NeedsKey => Err(Error::TypeError {
                        expected: "a key for a keyed collection".into(),
                        got: "unkeyed add".into(),
                    }),
                }
            }
        }
    }

    fn apply_literal_plan(
        &mut self,
        item: ItemId,
        attribute: &str,
        key: CollectionKey<'_>,
        value: Value,
        plan: LiteralPlan,
    ) -> Result<()> {
        match plan {
            LiteralPlan::MapInsert => {
                let CollectionKey::Name(key) = key else {
                    return Err(Error::TypeError {
                        expected: "string key for a keyed collection".into(),
                        got: format!("{key:?}"),
                    });
                };
                if let Some(Value::Map(map)) =
                    self.items.get_mut(&item).and_then(|entry| entry.values.get_mut(attribute))
                {
                    map.insert(key.to_owned(), value);
                }
                Ok(())
            }
            LiteralPlan::ListSet => {
                let CollectionKey::Index(index) = key else {
                    return Err(Error::TypeError {
                        expected: "integer key for an ordered collection".into(),
                        got: format!("{key:?}"),
                    });
                };
                if let Some(Value::List(list)) =
                    self.items.get_mut(&item).and_then(|entry| entry.values.get_mut(attribute))
                {
                    if index < list.len() {
                        list[index] = value;
                    } else if index == list.len() {
                        list.push(value);
                    } else {
                        return Err(Error::NotFound(format!(
                            "index {index} in {attribute} (len {})",
                            list.len()
                        )));
                    }
                }
                Ok(())
            }
            LiteralPlan::CreateMap => {
                let CollectionKey::Name(key) = key else {
                    return Err(Error::TypeError {
                        expected: "string key for a keyed collection".into(),
                        got: format!("{key:?}"),
                    });
                };
                // the name may currently hold references; evict them first
                self.detach_reference(item, attribute)?;
                let mut map = HashMap::new();
                map.insert(key.to_owned(), value);
                if let Some(entry) = self.items.get_mut(&item) {
                    entry.values.insert(attribute.to_owned(), Value::Map(map));
                }
                Ok(())
            }
            LiteralPlan::CreateList => {
                self.detach_reference(item, attribute)?;
                if let Some(entry) = self.items.get_mut(&item) {
                    entry.values.insert(attribute.to_owned(), Value::List(vec![value]));
                }
                Ok(())
            }
            LiteralPlan::Scalar => {
                self.set_attribute(item, attribute, value)?;
                Ok(())
            }
        }
    }

    /// Look up one member of a multi-valued attribute. `None` when the
    /// attribute or the key is absent; wrong-shape access errors.
    pub fn get_value(
        &self,
        item: ItemId,
        attribute: &str,
        key: CollectionKey<'_>,
    ) -> Result<Option<AttrValue>> {
        let entry = self.live(item)?;

        if let Some(value) = entry.values.get(attribute) {
            return match (value, key) {
                (Value::Map(map), CollectionKey::Name(key)) => {
                    Ok(map.get(key).cloned().map(AttrValue::Value))
                }
                (Value::List(list), CollectionKey::Index(index)) => {
                    Ok(list.get(index).cloned().map(AttrValue::Value))
                }
                (Value::Map(_), key) => Err(Error::TypeError {
                    expected: "string key for a keyed collection".into(),
                    got: format!("{key:?}"),
                }),
                (Value::List(_), key) => Err(Error::TypeError {
                    expected: "integer key for an ordered collection".into(),
                    got: format!("{key:?}"),
                }),
                (other, _) => Err(Error::TypeError {
                    expected: "multi-valued attribute".into(),
                    got: other.type_name().into(),
                }),
            };
        }

        if let Some(value) = entry.references.get(attribute) {
            return match value {
                RefValue::Collection(refs) => Ok(match key {
                    CollectionKey::Id(id) => refs.contains(&id).then_some(AttrValue::Item(id)),
                    CollectionKey::Name(alias) => refs.by_alias(alias).map(AttrValue::Item),
                    CollectionKey::Index(index) => refs.others().nth(index).map(AttrValue::Item),
                }),
                RefValue::Single(_) => Err(Error::TypeError {
                    expected: "multi-valued attribute".into(),
                    got: "single reference".into(),
                }),
            };
        }

        Ok(None)
    }

    /// Whether a multi-valued attribute has a member under the key.
    pub fn has_key(&self, item: ItemId, attribute: &str, key: CollectionKey<'_>) -> Result<bool> {
        Ok(self.get_value(item, attribute, key)?.is_some())
    }

    /// Whether a multi-valued attribute contains the given member.
    pub fn has_value(
        &self,
        item: ItemId,
        attribute: &str,
        value: impl Into<AttrValue>,
    ) -> Result<bool> {
        let entry = self.live(item)?;
        match value.into() {
            AttrValue::Value(value) => match entry.values.get(attribute) {
                Some(Value::List(list)) => Ok(list.contains(&value)),
                Some(Value::Map(map)) => Ok(map.values().any(|member| member == &value)),
                Some(other) => Err(Error::TypeError {
                    expected: "multi-valued attribute".into(),
                    got: other.type_name().into(),
                }),
                None => Ok(false),
            },
            AttrValue::Item(id) => match entry.references.get(attribute) {
                Some(RefValue::Collection(refs)) => Ok(refs.contains(&id)),
                Some(RefValue::Single(_)) => Err(Error::TypeError {
                    expected: "multi-valued attribute".into(),
                    got: "single reference".into(),
                }),
                None => Ok(false),
            },
            AttrValue::Items(_) => Err(Error::TypeError {
                expected: "a single member".into(),
                got: "item collection".into(),
            }),
        }
    }

    /// Remove one member of a multi-valued attribute. Reference members
    /// are detached on both sides. A missing attribute or key errors
    /// with `NotFound`.
    pub fn remove_value(
        &mut self,
        item: ItemId,
        attribute: &str,
        key: CollectionKey<'_>,
    ) -> Result<()> {
        self.live(item)?;

        enum Plan {
            MapRemove(String),
            ListRemove(usize),
            RefRemove(ItemId, String),
        }

        let plan = {
            let entry = self.entry(item)?;
            if let Some(value) = entry.values.get(attribute) {
                match (value, key) {
                    (Value::Map(map), CollectionKey::Name(key)) => {
                        if !map.contains_key(key) {
                            return Err(Error::NotFound(format!("key {key} in {attribute}")));
                        }
                        Plan::MapRemove(key.to_owned())
                    }
                    (Value::List(list), CollectionKey::Index(index)) => {
                        if index >= list.len() {
                            return Err(Error::NotFound(format!("index {index} in {attribute}")));
                        }
                        Plan::ListRemove(index)
                    }
                    (Value::Map(_) | Value::List(_), key) => {
                        return Err(Error::TypeError {
                            expected: "matching key shape".into(),
                            got: format!("{key:?}"),
                        });
                    }
                    (other, _) => {
                        return Err(Error::TypeError {
                            expected: "multi-valued attribute".into(),
                            got: other.type_name().into(),
                        });
                    }
                }
            } else if let Some(RefValue::Collection(refs)) = entry.references.get(attribute) {
                let other = match key {
                    CollectionKey::Id(id) => refs.contains(&id).then_some(id),
                    CollectionKey::Name(alias) => refs.by_alias(alias),
                    CollectionKey::Index(index) => refs.others().nth(index),
                };
                match other {
                    Some(other) => Plan::RefRemove(other, refs.other_name().to_owned()),
                    None => {
                        return Err(Error::NotFound(format!("member {key:?} in {attribute}")));
                    }
                }
            } else if entry.references.contains_key(attribute) {
                return Err(Error::TypeError {
                    expected: "multi-valued attribute".into(),
                    got: "single reference".into(),
                });
            } else {
                return Err(Error::NotFound(format!("no value for attribute {attribute}")));
            }
        };

        match plan {
            Plan::MapRemove(key) => {
                if let Some(Value::Map(map)) =
                    self.items.get_mut(&item).and_then(|entry| entry.values.get_mut(attribute))
                {
                    map.remove(&key);
                }
            }
            Plan::ListRemove(index) => {
                if let Some(Value::List(list)) =
                    self.items.get_mut(&item).and_then(|entry| entry.values.get_mut(attribute))
                {
                    list.remove(index);
                }
            }
            Plan::RefRemove(other, other_name) => {
                if let Some(RefValue::Collection(refs)) =
                    self.items.get_mut(&item).and_then(|entry| entry.references.get_mut(attribute))
                {
                    refs.remove(&other);
                }
                self.detach_inverse(item, other, &other_name);
            }
        }
        self.mark_dirty(item);
        Ok(())
    }
}

// ============================================================================
// Repository: reference machinery (internal)
// ============================================================================

impl<S: Store> Repository<S> {
    /// Set a single-cardinality reference. An existing single edge is
    /// reattached — the far endpoint swaps without destroying the
    /// forward entry; an existing collection is cleared first.
    fn set_single_ref(&mut self, item: ItemId, name: &str, other: ItemId) -> Result<AttrValue> {
        let other_name = self.derived_other_name(item, name)?;
        if self.entry(other)?.values.contains_key(other_name.as_str()) {
            return Err(Error::TypeError {
                expected: format!("reference-valued inverse attribute {other_name}"),
                got: "literal value".into(),
            });
        }

        enum Existing {
            Single(ItemId, String),
            Collection,
            Absent,
        }
        let existing = match self.entry(item)?.references.get(name) {
            Some(RefValue::Single(link)) => Existing::Single(link.other, link.other_name.clone()),
            Some(RefValue::Collection(_)) => Existing::Collection,
            None => Existing::Absent,
        };

        match existing {
            Existing::Single(old_other, _) if old_other == other => {
                return Ok(AttrValue::Item(other));
            }
            Existing::Single(old_other, old_other_name) => {
                self.detach_inverse(item, old_other, &old_other_name);
            }
            Existing::Collection => {
                self.detach_reference(item, name)?;
            }
            Existing::Absent => {}
        }

        if let Some(entry) = self.items.get_mut(&item) {
            entry
                .references
                .insert(name.to_owned(), RefValue::Single(SingleRef::new(other, other_name.clone())));
        }
        self.attach_inverse(item, name, other, &other_name, None, None)?;
        Ok(AttrValue::Item(other))
    }

    /// Append one edge to a reference collection, creating the
    /// collection when absent, and mirror it on the far item.
    pub(crate) fn append_ref(
        &mut self,
        item: ItemId,
        name: &str,
        other: ItemId,
        alias: Option<String>,
    ) -> Result<()> {
        let other_name = match self.entry(item)?.references.get(name) {
            Some(RefValue::Collection(refs)) => refs.other_name().to_owned(),
            Some(RefValue::Single(_)) => {
                return Err(Error::TypeError {
                    expected: "reference collection".into(),
                    got: "single reference".into(),
                });
            }
            None => self.derived_other_name(item, name)?,
        };
        if self.entry(other)?.values.contains_key(other_name.as_str()) {
            return Err(Error::TypeError {
                expected: format!("reference-valued inverse attribute {other_name}"),
                got: "literal value".into(),
            });
        }
        let persist = self.aspect_persist(item, name);

        if let Some(entry) = self.items.get_mut(&item) {
            // a literal under the same name moves out of the Values store
            entry.values.remove(name);
            if !entry.references.contains_key(name) {
                entry.references.insert(
                    name.to_owned(),
                    RefValue::Collection(RefCollection::new(other_name.clone(), persist)),
                );
            }
            if let Some(RefValue::Collection(refs)) = entry.references.get_mut(name) {
                refs.insert(other, alias);
            }
        }
        self.attach_inverse(item, name, other, &other_name, None, None)
    }

    /// Install the inverse entry for an edge on the far item, under
    /// `other_name`, shaped by the far attribute's declared cardinality
    /// (overridable, e.g. the kind/items edge is always list-valued).
    ///
    /// Each side installs its peer's entry through this same path: after
    /// the mirror lands on `other`, the call recurses with the endpoints
    /// swapped to install (or verify) the forward entry. An edge that is
    /// already mirrored ends the recursion; the `ATTACHING` bit on the
    /// far item stops reentrant attach loops that never reach that
    /// point (e.g. inconsistently declared inverse pairs).
    pub(crate) fn attach_inverse(
        &mut self,
        owner: ItemId,
        name: &str,
        other: ItemId,
        other_name: &str,
        cardinality: Option<Cardinality>,
        persist: Option<bool>,
    ) -> Result<()> {
        if self.entry(other)?.is_attaching() {
            return Ok(());
        }
        if let Some(entry) = self.items.get_mut(&other) {
            entry.status.insert(Status::ATTACHING);
        }
        let result = self.attach_inverse_inner(owner, name, other, other_name, cardinality, persist);
        if let Some(entry) = self.items.get_mut(&other) {
            entry.status.remove(Status::ATTACHING);
        }
        self.mark_dirty(other);
        result
    }

    fn attach_inverse_inner(
        &mut self,
        owner: ItemId,
        name: &str,
        other: ItemId,
        other_name: &str,
        cardinality: Option<Cardinality>,
        persist: Option<bool>,
    ) -> Result<()> {
        // already mirrored on this side: the recursion has come full
        // circle, nothing left to install
        let mirrored = match self.entry(other)?.references.get(other_name) {
            Some(RefValue::Single(link)) => link.other == owner,
            Some(RefValue::Collection(refs)) => refs.contains(&owner),
            None => false,
        };
        if mirrored {
            return Ok(());
        }

        if self.entry(other)?.values.contains_key(other_name) {
            return Err(Error::TypeError {
                expected: format!("reference-valued inverse attribute {other_name}"),
                got: "literal value".into(),
            });
        }

        let cardinality = cardinality.unwrap_or_else(|| self.aspect_cardinality(other, other_name));
        match cardinality {
            Cardinality::Single => {
                let prior = match self.entry(other)?.references.get(other_name) {
                    Some(RefValue::Single(link)) if link.other != owner => {
                        Some((link.other, link.other_name.clone()))
                    }
                    _ => None,
                };
                if let Some((prior_owner, prior_name)) = prior {
                    // the far slot held another edge; drop its mirror
                    self.detach_inverse(other, prior_owner, &prior_name);
                    self.mark_dirty(prior_owner);
                }
                if let Some(entry) = self.items.get_mut(&other) {
                    entry.references.insert(
                        other_name.to_owned(),
                        RefValue::Single(SingleRef::new(owner, name.to_owned())),
                    );
                }
            }
            Cardinality::List | Cardinality::Dict => {
                if matches!(
                    self.entry(other)?.references.get(other_name),
                    Some(RefValue::Single(_))
                ) {
                    return Err(Error::TypeError {
                        expected: format!("collection-valued inverse attribute {other_name}"),
                        got: "single reference".into(),
                    });
                }
                let persist = persist.unwrap_or_else(|| self.aspect_persist(other, other_name));
                let entry = self
                    .items
                    .get_mut(&other)
                    .ok_or_else(|| Error::NotFound(format!("item {other}")))?;
                if !entry.references.contains_key(other_name) {
                    entry.references.insert(
                        other_name.to_owned(),
                        RefValue::Collection(RefCollection::new(name, persist)),
                    );
                }
                if let Some(RefValue::Collection(refs)) = entry.references.get_mut(other_name) {
                    refs.insert(owner, None);
                }
            }
        }

        // install the opposite direction through the same path; the
        // mirrored check above (or the ATTACHING guard) ends it
        self.attach_inverse(other, other_name, owner, name, None, None)
    }

    /// Remove the mirror of an edge from the far item's inverse
    /// attribute: a single slot is dropped, a collection entry is
    /// removed (an emptied collection stays in place).
    pub(crate) fn detach_inverse(&mut self, owner: ItemId, far: ItemId, far_name: &str) {
        let mut changed = false;
        if let Some(entry) = self.items.get_mut(&far) {
            let drop_entry = match entry.references.get_mut(far_name) {
                Some(RefValue::Single(link)) if link.other == owner => true,
                Some(RefValue::Collection(refs)) => {
                    changed = refs.remove(&owner);
                    false
                }
                _ => false,
            };
            if drop_entry {
                entry.references.remove(far_name);
                changed = true;
            }
        }
        if changed {
            self.mark_dirty(far);
        }
    }

    /// Remove a whole reference attribute, detaching every contained
    /// edge on both sides. Returns whether the attribute existed.
    pub(crate) fn detach_reference(&mut self, item: ItemId, name: &str) -> Result<bool> {
        let taken = self
            .items
            .get_mut(&item)
            .and_then(|entry| entry.references.remove(name));
        let Some(value) = taken else {
            return Ok(false);
        };

        match value {
            RefValue::Single(link) => {
                self.detach_inverse(item, link.other, &link.other_name);
            }
            RefValue::Collection(refs) => {
                let other_name = refs.other_name().to_owned();
                let others: Vec<ItemId> = refs.others().collect();
                for other in others {
                    self.detach_inverse(item, other, &other_name);
                }
            }
        }
        Ok(true)
    }

    /// Append an aliased member to a reference collection.
    pub fn add_value_with_alias(
        &mut self,
        item: ItemId,
        attribute: &str,
        other: ItemId,
        alias: &str,
    ) -> Result<()> {
        self.live(item)?;
        self.live(other)?;
        self.mark_dirty(item);
        self.append_ref(item, attribute, other, Some(alias.to_owned()))
    }
}
