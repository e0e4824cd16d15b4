//! # Repository
//!
//! The transactional item graph. Items are arena-held, addressed by
//! [`ItemId`]; every edge between items (parent, root, kind, reference)
//! is an id lookup into the arena, so the cyclic graph needs no owning
//! pointers. All mutation flows through repository methods, which own
//! the inverse-reference bookkeeping and the dirty protocol.
//!
//! The repository is generic over its [`Store`] collaborator, the way
//! a query engine is generic over its storage backend: the graph calls
//! `add_transaction` on first mutation after a clean boundary and
//! `load_child` when a child lookup misses the in-memory map.

mod attrs;
mod lifecycle;

pub use attrs::{AttrValue, CollectionKey};

use hashbrown::HashMap;

use crate::model::{
    Item, ItemId, ItemPath, LinkedMap, PathAnchor, RefCollection, RefValue, SingleRef, Status,
};
use crate::schema::{Cardinality, Kind};
use crate::store::{RawItem, RawRef, Store};
use crate::{Error, Result};

// ============================================================================
// Parent designation
// ============================================================================

/// Where a new or moved item lives: as a namespace root, or under
/// another item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// A namespace root, held directly by the repository.
    Root,
    Under(ItemId),
}

impl From<ItemId> for Parent {
    fn from(id: ItemId) -> Self {
        Parent::Under(id)
    }
}

// ============================================================================
// Find specification
// ============================================================================

/// What `find` accepts: a path, an id, or a string classified
/// heuristically (id-shaped strings resolve as ids, the rest as paths).
#[derive(Debug, Clone, Copy)]
pub enum FindSpec<'a> {
    Path(&'a ItemPath),
    Id(ItemId),
    Text(&'a str),
}

impl<'a> From<&'a ItemPath> for FindSpec<'a> {
    fn from(path: &'a ItemPath) -> Self {
        FindSpec::Path(path)
    }
}

impl From<ItemId> for FindSpec<'_> {
    fn from(id: ItemId) -> Self {
        FindSpec::Id(id)
    }
}

impl<'a> From<&'a str> for FindSpec<'a> {
    fn from(text: &'a str) -> Self {
        FindSpec::Text(text)
    }
}

/// Path-walk cursor: either at the repository level (above the roots)
/// or at an item.
#[derive(Clone, Copy)]
enum Cursor {
    Repo,
    At(ItemId),
}

// ============================================================================
// Repository
// ============================================================================

/// The item graph, generic over its persistence/transaction
/// collaborator.
pub struct Repository<S: Store> {
    pub(crate) items: HashMap<ItemId, Item>,
    roots: LinkedMap<String, ItemId>,
    kinds: HashMap<ItemId, Kind>,
    pub(crate) store: S,
    repository_id: ItemId,
}

impl<S: Store> Repository<S> {
    pub fn new(store: S) -> Self {
        Self {
            items: HashMap::new(),
            roots: LinkedMap::new(),
            kinds: HashMap::new(),
            store,
            repository_id: ItemId::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The repository's own id, standing in as the container of roots
    /// in exports.
    pub fn repository_id(&self) -> ItemId {
        self.repository_id
    }

    // ========================================================================
    // Schema registry
    // ========================================================================

    /// Register the schema descriptor for a kind item. Items whose
    /// `kind` points at that item resolve their aspects through it.
    pub fn register_kind(&mut self, kind_item: ItemId, kind: Kind) -> Result<()> {
        self.live(kind_item)?;
        self.kinds.insert(kind_item, kind);
        Ok(())
    }

    pub fn kind_descriptor(&self, kind_item: ItemId) -> Option<&Kind> {
        self.kinds.get(&kind_item)
    }

    /// The schema descriptor governing an item, if any. Absent kind or
    /// unregistered descriptor means schema-less operation.
    pub fn kind_of(&self, item: ItemId) -> Option<&Kind> {
        self.items.get(&item)?.kind.and_then(|kind| self.kinds.get(&kind))
    }

    // ========================================================================
    // Entry access
    // ========================================================================

    /// Raw entry access, tombstones included.
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn item_name(&self, id: ItemId) -> Option<&str> {
        self.items.get(&id).map(|entry| entry.name.as_str())
    }

    pub fn item_parent(&self, id: ItemId) -> Option<ItemId> {
        self.items.get(&id).and_then(|entry| entry.parent)
    }

    pub fn item_root(&self, id: ItemId) -> Option<ItemId> {
        self.items.get(&id).and_then(|entry| entry.root)
    }

    pub(crate) fn entry(&self, id: ItemId) -> Result<&Item> {
        self.items.get(&id).ok_or_else(|| Error::NotFound(format!("item {id}")))
    }

    pub(crate) fn live(&self, id: ItemId) -> Result<&Item> {
        let entry = self.entry(id)?;
        if entry.is_deleted() {
            return Err(Error::Deleted(id));
        }
        Ok(entry)
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Create a fresh item. `name` defaults to the new id's compact
    /// encoding; `kind` installs the `kind` reference whose inverse is
    /// the `items` collection on the kind item.
    pub fn new_item(
        &mut self,
        name: Option<&str>,
        parent: Parent,
        kind: Option<ItemId>,
    ) -> Result<ItemId> {
        if let Some(kind) = kind {
            self.live(kind)?;
        }
        if let Parent::Under(parent) = parent {
            self.live(parent)?;
        }

        let id = ItemId::new();
        let item = Item::new(id, name, None);
        self.items.insert(id, item);

        match parent {
            Parent::Root => {
                self.container_insert(None, id, None, None)?;
                self.propagate_root(id, Some(id));
            }
            Parent::Under(parent) => {
                self.container_insert(Some(parent), id, None, None)?;
                if let Some(entry) = self.items.get_mut(&id) {
                    entry.parent = Some(parent);
                }
                let root = self.items.get(&parent).and_then(|entry| entry.root);
                self.propagate_root(id, root);
            }
        }

        if kind.is_some() {
            self.set_kind(id, kind)?;
        }
        self.mark_dirty(id);
        Ok(id)
    }

    /// Change an item's kind: detaches the old `kind`/`items` edge and
    /// installs the new one. The inverse `items` collection on the kind
    /// item is list-valued and not persisted.
    pub fn set_kind(&mut self, item: ItemId, kind: Option<ItemId>) -> Result<()> {
        let old = self.live(item)?.kind;
        if old == kind {
            return Ok(());
        }
        if old.is_some() {
            self.detach_reference(item, "kind")?;
        }
        if let Some(entry) = self.items.get_mut(&item) {
            entry.kind = kind;
        }
        if let Some(kind) = kind {
            self.live(kind)?;
            if let Some(entry) = self.items.get_mut(&item) {
                entry
                    .references
                    .insert("kind".to_owned(), RefValue::Single(SingleRef::new(kind, "items")));
            }
            self.attach_inverse(item, "kind", kind, "items", Some(Cardinality::List), Some(false))?;
        }
        self.mark_dirty(item);
        Ok(())
    }

    /// Reconstitute an item from its persisted payload, as a child of
    /// `parent`. The entry carries `RAW` until filled in; reference
    /// entries are installed verbatim (the far side persisted its own
    /// mirror) and nothing is marked dirty.
    fn materialize(&mut self, parent: ItemId, raw: RawItem) -> Result<ItemId> {
        let RawItem { id, name, kind, values, references, previous, next } = raw;

        let mut item = Item::new(id, Some(name.as_str()), kind);
        item.status.insert(Status::RAW);
        for (name, value) in values {
            item.values.insert(name, value);
        }
        for (name, raw_ref) in references {
            let value = match raw_ref {
                RawRef::Single { other, other_name } => {
                    RefValue::Single(SingleRef::new(other, other_name))
                }
                RawRef::Collection { other_name, others } => {
                    let mut refs = RefCollection::new(other_name, true);
                    for other in others {
                        refs.insert(other, None);
                    }
                    RefValue::Collection(refs)
                }
            };
            item.references.insert(name, value);
        }
        item.parent = Some(parent);
        self.items.insert(id, item);

        self.container_insert(Some(parent), id, previous, next)?;
        let root = self.items.get(&parent).and_then(|entry| entry.root);
        self.propagate_root(id, root);

        if let Some(entry) = self.items.get_mut(&id) {
            entry.status.remove(Status::RAW);
        }
        Ok(id)
    }

    // ========================================================================
    // Children
    // ========================================================================

    /// The named child, loading it from the store on an in-memory miss.
    /// A load that comes back empty is negative-cached so the store is
    /// asked once per name.
    pub fn child(&mut self, parent: ItemId, name: &str) -> Result<Option<ItemId>> {
        {
            let entry = self.entry(parent)?;
            if let Some(children) = entry.children.as_ref() {
                if let Some(id) = children.get(name) {
                    return Ok(Some(id));
                }
                if children.is_known_absent(name) {
                    return Ok(None);
                }
            }
        }

        tracing::debug!(parent = %parent, name, "loading child from store");
        match self.store.load_child(parent, name)? {
            Some(raw) => {
                let id = self.materialize(parent, raw)?;
                Ok(Some(id))
            }
            None => {
                if let Some(entry) = self.items.get_mut(&parent) {
                    entry.children_mut().known_absent.insert(name.to_owned());
                }
                Ok(None)
            }
        }
    }

    /// The named child if already loaded; never consults the store.
    pub fn child_no_load(&self, parent: ItemId, name: &str) -> Option<ItemId> {
        self.items
            .get(&parent)?
            .children
            .as_ref()
            .and_then(|children| children.get(name))
    }

    pub fn has_child(&mut self, parent: ItemId, name: &str) -> Result<bool> {
        Ok(self.child(parent, name)?.is_some())
    }

    /// Whether any children are loaded in memory.
    pub fn has_children(&self, parent: ItemId) -> bool {
        self.items.get(&parent).is_some_and(Item::has_loaded_children)
    }

    /// Loaded children in link order; does not consult the store.
    pub fn iter_children(&self, parent: ItemId) -> impl Iterator<Item = ItemId> + '_ {
        self.items.get(&parent).into_iter().flat_map(Item::loaded_children)
    }

    /// Relocate a child immediately after another child of the same
    /// parent, or to the head when `after` is `None`.
    pub fn place_child(&mut self, parent: ItemId, child: ItemId, after: Option<ItemId>) -> Result<()> {
        {
            let entry = self.entry(child)?;
            if entry.parent != Some(parent) {
                return Err(Error::ConstraintViolation(format!(
                    "{} is not a child of {parent}",
                    entry.name
                )));
            }
        }
        if let Some(after) = after {
            let entry = self.entry(after)?;
            if entry.parent != Some(parent) {
                return Err(Error::ConstraintViolation(format!(
                    "{} is not a child of {parent}",
                    entry.name
                )));
            }
        }

        let child_name = self.entry(child)?.name.clone();
        let after_name = match after {
            Some(after) => Some(self.entry(after)?.name.clone()),
            None => None,
        };
        let parent_entry = self
            .items
            .get_mut(&parent)
            .ok_or_else(|| Error::NotFound(format!("item {parent}")))?;
        parent_entry.children_mut().map.place(&child_name, after_name.as_ref())?;
        self.mark_dirty(child);
        Ok(())
    }

    // ========================================================================
    // Roots
    // ========================================================================

    pub fn root(&self, name: &str) -> Option<ItemId> {
        self.roots.get(name).copied()
    }

    pub fn iter_roots(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.roots.values().copied()
    }

    // ========================================================================
    // Paths and display
    // ========================================================================

    /// The absolute path of an item, composed of its ancestors' names.
    pub fn item_path(&self, id: ItemId) -> Result<ItemPath> {
        let mut segments: Vec<String> = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let entry = self.entry(current)?;
            segments.push(entry.name.clone());
            cursor = entry.parent;
        }
        segments.reverse();

        let mut path = ItemPath::new(PathAnchor::Absolute);
        for segment in segments {
            path.push(segment);
        }
        Ok(path)
    }

    /// Display name precedence: the `displayName` attribute, the value
    /// of the Kind's display attribute, the item's own name.
    pub fn display_name(&self, id: ItemId) -> Result<String> {
        let entry = self.live(id)?;

        if let Some(value) = entry.values.get("displayName") {
            if let Some(s) = value.as_str() {
                return Ok(s.to_owned());
            }
        }
        if let Some(kind) = self.kind_of(id) {
            if let Some(display_attr) = kind.display_attribute() {
                if let Some(value) = entry.values.get(display_attr) {
                    return Ok(match value.as_str() {
                        Some(s) => s.to_owned(),
                        None => value.to_string(),
                    });
                }
            }
        }
        Ok(entry.name.clone())
    }

    /// Sibling-order hints for an item: the names of the entries linked
    /// immediately before and after it in its container.
    pub fn sibling_names(&self, id: ItemId) -> (Option<String>, Option<String>) {
        let Some(entry) = self.items.get(&id) else { return (None, None) };
        let name = entry.name.as_str();
        let map = match entry.parent {
            None => &self.roots,
            Some(parent) => match self.items.get(&parent).and_then(|p| p.children.as_ref()) {
                Some(children) => &children.map,
                None => return (None, None),
            },
        };
        (
            map.previous_key(name).cloned(),
            map.next_key(name).cloned(),
        )
    }

    // ========================================================================
    // Find
    // ========================================================================

    /// Resolve a path, id, or string relative to `origin`. Returns
    /// `None` on any failed segment rather than erroring.
    pub fn find<'a>(&mut self, origin: ItemId, spec: impl Into<FindSpec<'a>>) -> Option<ItemId> {
        match spec.into() {
            FindSpec::Id(id) => self.find_by_id(id),
            FindSpec::Path(path) => self.find_path(Some(origin), path),
            FindSpec::Text(text) => self.find_text(Some(origin), text),
        }
    }

    /// Repository-level resolution: absolute paths and ids. Relative
    /// paths resolve from the root registry.
    pub fn resolve<'a>(&mut self, spec: impl Into<FindSpec<'a>>) -> Option<ItemId> {
        match spec.into() {
            FindSpec::Id(id) => self.find_by_id(id),
            FindSpec::Path(path) => self.find_path(None, path),
            FindSpec::Text(text) => self.find_text(None, text),
        }
    }

    fn find_text(&mut self, origin: Option<ItemId>, text: &str) -> Option<ItemId> {
        if !text.starts_with('/') && ItemId::looks_like_id(text) {
            if let Ok(id) = ItemId::parse(text) {
                return self.find_by_id(id);
            }
        }
        let path = ItemPath::parse(text);
        self.find_path(origin, &path)
    }

    fn find_by_id(&self, id: ItemId) -> Option<ItemId> {
        match self.items.get(&id) {
            Some(entry) if !entry.is_deleted() => Some(id),
            _ => None,
        }
    }

    fn find_path(&mut self, origin: Option<ItemId>, path: &ItemPath) -> Option<ItemId> {
        if path.is_empty() {
            return None;
        }

        let mut cursor = match path.anchor() {
            PathAnchor::Absolute => Cursor::Repo,
            PathAnchor::RootRelative => Cursor::At(self.items.get(&origin?)?.root?),
            PathAnchor::Relative => match origin {
                Some(origin) => Cursor::At(origin),
                None => Cursor::Repo,
            },
        };

        for segment in path.segments() {
            cursor = match (cursor, segment.as_str()) {
                (cursor, ".") => cursor,
                (Cursor::At(id), "..") => match self.items.get(&id)?.parent {
                    Some(parent) => Cursor::At(parent),
                    None => Cursor::Repo,
                },
                (Cursor::Repo, "..") => return None,
                (Cursor::Repo, name) => Cursor::At(self.roots.get(name).copied()?),
                (Cursor::At(id), name) => Cursor::At(self.child(id, name).ok()??),
            };
        }

        match cursor {
            Cursor::At(id) => self.find_by_id(id),
            Cursor::Repo => None,
        }
    }

    // ========================================================================
    // Containers (internal)
    // ========================================================================

    /// Insert `child` into a container (a parent's children map, or the
    /// root registry for `parent = None`) under its current name.
    ///
    /// An existing same-named entry is deleted and replaced, with a
    /// warning. Sibling-order hints naming entries that aren't present
    /// degrade to plain appends.
    pub(crate) fn container_insert(
        &mut self,
        parent: Option<ItemId>,
        child: ItemId,
        previous: Option<String>,
        next: Option<String>,
    ) -> Result<()> {
        let name = self.entry(child)?.name.clone();

        let existing = match parent {
            None => self.roots.get(name.as_str()).copied(),
            Some(parent) => self
                .entry(parent)?
                .children
                .as_ref()
                .and_then(|children| children.get(&name)),
        };
        if let Some(existing) = existing {
            if existing != child {
                tracing::warn!(name = %name, existing = %existing, "replacing existing child");
                self.delete(existing, true)?;
            }
        }

        match parent {
            None => {
                let previous = previous.filter(|key| self.roots.contains_key(key.as_str()));
                let next = next.filter(|key| self.roots.contains_key(key.as_str()));
                self.roots.insert_between(name, child, previous.as_ref(), next.as_ref())?;
            }
            Some(parent) => {
                let entry = self
                    .items
                    .get_mut(&parent)
                    .ok_or_else(|| Error::NotFound(format!("item {parent}")))?;
                let children = entry.children_mut();
                children.known_absent.remove(name.as_str());
                let previous = previous.filter(|key| children.map.contains_key(key.as_str()));
                let next = next.filter(|key| children.map.contains_key(key.as_str()));
                children.map.insert_between(name, child, previous.as_ref(), next.as_ref())?;
            }
        }
        Ok(())
    }

    pub(crate) fn container_remove(&mut self, parent: Option<ItemId>, name: &str) {
        match parent {
            None => {
                self.roots.remove(name);
            }
            Some(parent) => {
                if let Some(entry) = self.items.get_mut(&parent) {
                    if let Some(children) = entry.children.as_mut() {
                        children.map.remove(name);
                    }
                }
            }
        }
    }

    /// Propagate a new namespace root to an item and its already-loaded
    /// descendants; lazy children are not force-loaded for this. The
    /// `SCHEMA` bit tracks whether the new root is named "Schema".
    pub(crate) fn propagate_root(&mut self, item: ItemId, root: Option<ItemId>) {
        let schema = root
            .and_then(|root| self.items.get(&root))
            .is_some_and(|entry| entry.name == "Schema");

        let mut stack = vec![item];
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.items.get_mut(&id) {
                entry.root = root;
                if root.is_some() {
                    if schema {
                        entry.status.insert(Status::SCHEMA);
                    } else {
                        entry.status.remove(Status::SCHEMA);
                    }
                }
                stack.extend(entry.loaded_children());
            }
        }
    }
}
