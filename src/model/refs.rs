//! Reference wrappers — one endpoint's view of bidirectional edges.
//!
//! A `SingleRef` is one item's half of a single bidirectional edge; the
//! far item holds a mirrored entry under `other_name`. A
//! `RefCollection` holds many outgoing edges sharing one forward
//! attribute name, keyed by the referenced item's id, in insertion
//! order, with an optional alias per entry.
//!
//! These are pure data. Keeping the two directions in sync is the
//! repository's job (`crate::repo`).

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{ItemId, LinkedMap};

/// One endpoint's view of a single bidirectional edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleRef {
    /// The far endpoint.
    pub other: ItemId,
    /// The attribute name under which the far item mirrors this edge.
    pub other_name: String,
}

impl SingleRef {
    pub fn new(other: ItemId, other_name: impl Into<String>) -> Self {
        Self { other, other_name: other_name.into() }
    }
}

/// An ordered, keyed collection of outgoing references sharing one
/// forward attribute name.
#[derive(Debug, Clone, PartialEq)]
pub struct RefCollection {
    other_name: String,
    persist: bool,
    refs: LinkedMap<ItemId, Option<String>>,
    aliases: HashMap<String, ItemId>,
}

impl RefCollection {
    pub fn new(other_name: impl Into<String>, persist: bool) -> Self {
        Self {
            other_name: other_name.into(),
            persist,
            refs: LinkedMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// The shared inverse attribute name on referenced items.
    pub fn other_name(&self) -> &str {
        &self.other_name
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn contains(&self, other: &ItemId) -> bool {
        self.refs.contains_key(other)
    }

    /// Insert or re-alias an entry. Returns true when the entry is new.
    pub fn insert(&mut self, other: ItemId, alias: Option<String>) -> bool {
        if let Some(old) = self.refs.get(&other).cloned() {
            if let Some(old_alias) = old {
                self.aliases.remove(&old_alias);
            }
            if let Some(alias) = &alias {
                self.aliases.insert(alias.clone(), other);
            }
            self.refs.insert(other, alias);
            false
        } else {
            if let Some(alias) = &alias {
                self.aliases.insert(alias.clone(), other);
            }
            self.refs.insert(other, alias);
            true
        }
    }

    pub fn remove(&mut self, other: &ItemId) -> bool {
        match self.refs.remove(other) {
            Some(alias) => {
                if let Some(alias) = alias {
                    self.aliases.remove(&alias);
                }
                true
            }
            None => false,
        }
    }

    pub fn by_alias(&self, alias: &str) -> Option<ItemId> {
        self.aliases.get(alias).copied()
    }

    pub fn alias_of(&self, other: &ItemId) -> Option<&str> {
        self.refs.get(other).and_then(|alias| alias.as_deref())
    }

    /// Referenced items, in insertion order.
    pub fn others(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.refs.keys().copied()
    }

    pub fn first(&self) -> Option<ItemId> {
        self.refs.first_key().copied()
    }

    pub fn last(&self) -> Option<ItemId> {
        self.refs.last_key().copied()
    }

    pub fn previous_of(&self, other: &ItemId) -> Option<ItemId> {
        self.refs.previous_key(other).copied()
    }

    pub fn next_of(&self, other: &ItemId) -> Option<ItemId> {
        self.refs.next_key(other).copied()
    }

    /// Internal consistency: every alias points at a contained entry and
    /// every aliased entry is in the alias table.
    pub fn check(&self) -> bool {
        self.aliases.iter().all(|(alias, id)| self.alias_of(id) == Some(alias))
            && self.refs.iter().filter_map(|(id, alias)| alias.as_ref().map(|a| (id, a)))
                .all(|(id, alias)| self.aliases.get(alias) == Some(id))
    }
}

/// What a reference attribute holds: a lone edge or a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum RefValue {
    Single(SingleRef),
    Collection(RefCollection),
}

impl RefValue {
    /// Number of edges held.
    pub fn ref_count(&self) -> usize {
        match self {
            RefValue::Single(_) => 1,
            RefValue::Collection(refs) => refs.len(),
        }
    }

    /// Referenced items, in order for collections.
    pub fn others(&self) -> SmallVec<[ItemId; 4]> {
        match self {
            RefValue::Single(link) => SmallVec::from_slice(&[link.other]),
            RefValue::Collection(refs) => refs.others().collect(),
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, RefValue::Single(_))
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, RefValue::Collection(_))
    }
}
