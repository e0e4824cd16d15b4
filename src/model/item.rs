//! Item — the fundamental addressable entity.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use super::{ItemId, LinkedMap, RefValue, Value};

/// Item status bitset. Bits are non-exclusive except `RAW`, which is
/// the construction precursor to all others, and `DELETED`, which is
/// absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status(u8);

impl Status {
    /// Terminal: no further mutation or attribute access permitted.
    pub const DELETED: Status = Status(0x01);
    /// Has pending mutations not yet captured by a transaction.
    pub const DIRTY: Status = Status(0x02);
    /// Transient: set for the duration of a recursive delete.
    pub const DELETING: Status = Status(0x04);
    /// Constructed from storage, not yet fully filled in.
    pub const RAW: Status = Status(0x08);
    /// Transient: guards against reentrant reference attach loops.
    pub const ATTACHING: Status = Status(0x10);
    /// Cached: reachable from the namespace root named "Schema".
    pub const SCHEMA: Status = Status(0x20);

    pub fn contains(self, other: Status) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Status) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Status) {
        self.0 &= !other.0;
    }
}

/// A parent's named children: the ordered map of loaded children plus
/// a negative cache of names known not to exist in the store, so a
/// failed lazy load is attempted once.
#[derive(Debug, Clone, Default)]
pub struct Children {
    pub(crate) map: LinkedMap<String, ItemId>,
    pub(crate) known_absent: HashSet<String>,
}

impl Children {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ItemId> {
        self.map.get(name).copied()
    }

    pub fn is_known_absent(&self, name: &str) -> bool {
        self.known_absent.contains(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// An item in the graph: identity, namespace position, status, and the
/// two attribute stores.
///
/// Items are arena-held and addressed by [`ItemId`]; all edges between
/// items (parent, root, kind, references) are id lookups. Mutation
/// happens through [`crate::Repository`], which owns inverse-reference
/// bookkeeping and dirty marking.
#[derive(Debug, Clone)]
pub struct Item {
    pub(crate) id: ItemId,
    pub(crate) name: String,
    pub(crate) status: Status,
    pub(crate) kind: Option<ItemId>,
    pub(crate) parent: Option<ItemId>,
    pub(crate) root: Option<ItemId>,
    pub(crate) values: LinkedMap<String, Value>,
    pub(crate) references: LinkedMap<String, RefValue>,
    pub(crate) children: Option<Children>,
}

impl Item {
    pub(crate) fn new(id: ItemId, name: Option<&str>, kind: Option<ItemId>) -> Self {
        let name = match name {
            Some(name) => name.to_owned(),
            None => id.to_compact(),
        };
        Self {
            id,
            name,
            status: Status::default(),
            kind,
            parent: None,
            root: None,
            values: LinkedMap::new(),
            references: LinkedMap::new(),
            children: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    /// The item's name, unique among siblings.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn kind(&self) -> Option<ItemId> {
        self.kind
    }

    /// The container parent; `None` for namespace roots.
    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    /// The namespace root this item lives under; a root is its own root.
    pub fn root(&self) -> Option<ItemId> {
        self.root
    }

    pub fn is_deleted(&self) -> bool {
        self.status.contains(Status::DELETED)
    }

    pub fn is_deleting(&self) -> bool {
        self.status.contains(Status::DELETING)
    }

    pub fn is_dirty(&self) -> bool {
        self.status.contains(Status::DIRTY)
    }

    pub(crate) fn is_attaching(&self) -> bool {
        self.status.contains(Status::ATTACHING)
    }

    /// Literal attributes, in insertion order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Reference attributes, in insertion order.
    pub fn references(&self) -> impl Iterator<Item = (&str, &RefValue)> {
        self.references.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn first_child_name(&self) -> Option<&str> {
        self.children
            .as_ref()
            .and_then(|children| children.map.first_key())
            .map(String::as_str)
    }

    pub fn last_child_name(&self) -> Option<&str> {
        self.children
            .as_ref()
            .and_then(|children| children.map.last_key())
            .map(String::as_str)
    }

    /// Whether any children are loaded in memory.
    pub fn has_loaded_children(&self) -> bool {
        self.children.as_ref().is_some_and(|children| !children.is_empty())
    }

    /// Loaded children, in link order.
    pub fn loaded_children(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.children
            .iter()
            .flat_map(|children| children.map.values().copied())
    }

    pub(crate) fn children_mut(&mut self) -> &mut Children {
        self.children.get_or_insert_with(Children::new)
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_deleted() {
            write!(f, "<{} (deleted) {}>", self.name, self.id.to_compact())
        } else {
            write!(f, "<{} {}>", self.name, self.id.to_compact())
        }
    }
}
