//! Item lifecycle: deletion with cascade gating, moves, renames, and
//! the dirty protocol.

use smallvec::SmallVec;

use crate::model::{ItemId, Status};
use crate::schema::{CountPolicy, DeletePolicy};
use crate::store::Store;
use crate::{Error, Result};

use super::{Parent, Repository};

impl<S: Store> Repository<S> {
    // ========================================================================
    // Dirty protocol
    // ========================================================================

    /// Register the item's pending changes with the transaction
    /// manager. The bit flips only if the manager accepts; returns
    /// whether it transitioned from unset to set. Repeated mutations
    /// before a clean boundary do not re-register.
    pub fn mark_dirty(&mut self, item: ItemId) -> bool {
        match self.items.get(&item) {
            Some(entry) if !entry.status.contains(Status::DIRTY) => {}
            _ => return false,
        }
        if self.store.add_transaction(item) {
            if let Some(entry) = self.items.get_mut(&item) {
                entry.status.insert(Status::DIRTY);
            }
            true
        } else {
            false
        }
    }

    /// Clear the dirty bit at a transaction boundary.
    pub fn mark_clean(&mut self, item: ItemId) {
        if let Some(entry) = self.items.get_mut(&item) {
            entry.status.remove(Status::DIRTY);
        }
    }

    pub fn is_dirty(&self, item: ItemId) -> bool {
        self.items.get(&item).is_some_and(|entry| entry.is_dirty())
    }

    pub fn is_deleted(&self, item: ItemId) -> bool {
        self.items.get(&item).is_some_and(|entry| entry.is_deleted())
    }

    // ========================================================================
    // Reference counting
    // ========================================================================

    /// The aggregate reference count: the number of edges held under
    /// reference attributes whose count policy is `Count`. Zero for
    /// deleted items.
    pub fn ref_count(&self, item: ItemId) -> usize {
        let Some(entry) = self.items.get(&item) else { return 0 };
        if entry.is_deleted() {
            return 0;
        }
        entry
            .references()
            .filter(|(name, _)| self.aspect_count_policy(item, name) == CountPolicy::Count)
            .map(|(_, value)| value.ref_count())
            .sum()
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Delete an item: recursively delete children, clear literal
    /// values, detach every reference (queueing `Cascade`-policy
    /// targets), unlink from the parent, and flip `DELETED`. Queued
    /// targets are deleted afterwards, each only once its counted
    /// reference count has reached zero.
    ///
    /// Idempotent: deleting a deleted or currently-deleting item is a
    /// no-op. With `recursive` false, an item with loaded children is
    /// refused before anything is touched.
    pub fn delete(&mut self, item: ItemId, recursive: bool) -> Result<()> {
        {
            let entry = self.entry(item)?;
            if entry.is_deleted() || entry.is_deleting() {
                return Ok(());
            }
            if !recursive && entry.has_loaded_children() {
                return Err(Error::ConstraintViolation(format!(
                    "item {} has children, delete must be recursive",
                    entry.name
                )));
            }
        }

        self.mark_dirty(item);
        if let Some(entry) = self.items.get_mut(&item) {
            entry.status.insert(Status::DELETING);
        }

        let children: Vec<ItemId> = self.entry(item)?.loaded_children().collect();
        for child in children {
            self.delete(child, true)?;
        }

        if let Some(entry) = self.items.get_mut(&item) {
            entry.values.clear();
        }

        let ref_names: Vec<String> = {
            let entry = self.entry(item)?;
            entry.references().map(|(name, _)| name.to_owned()).collect()
        };
        let mut cascade: SmallVec<[ItemId; 8]> = SmallVec::new();
        for name in ref_names {
            if self.aspect_delete_policy(item, &name) == DeletePolicy::Cascade {
                if let Some(value) = self.entry(item)?.references.get(name.as_str()) {
                    cascade.extend(value.others());
                }
            }
            self.detach_reference(item, &name)?;
        }

        let (parent, name) = {
            let entry = self.entry(item)?;
            (entry.parent, entry.name.clone())
        };
        self.container_remove(parent, &name);
        self.propagate_root(item, None);

        if let Some(entry) = self.items.get_mut(&item) {
            entry.status.insert(Status::DELETED);
            entry.status.remove(Status::DELETING);
        }

        for other in cascade {
            let live = self
                .items
                .get(&other)
                .is_some_and(|entry| !entry.is_deleted() && !entry.is_deleting());
            if live && self.ref_count(other) == 0 {
                tracing::debug!(target_item = %other, "cascade delete");
                self.delete(other, false)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Move and rename
    // ========================================================================

    /// Move an item under another container or make it a root. A no-op
    /// when already there. `previous`/`next` pick the position among
    /// the new siblings. The new namespace root propagates to the item
    /// and its already-loaded descendants only.
    pub fn move_item(
        &mut self,
        item: ItemId,
        new_parent: Parent,
        previous: Option<ItemId>,
        next: Option<ItemId>,
    ) -> Result<()> {
        {
            let entry = self.live(item)?;
            let same = match (entry.parent, new_parent) {
                (Some(current), Parent::Under(target)) => current == target,
                (None, Parent::Root) => true,
                _ => false,
            };
            if same {
                return Ok(());
            }
        }
        if let Parent::Under(target) = new_parent {
            self.live(target)?;
            let mut cursor = Some(target);
            while let Some(current) = cursor {
                if current == item {
                    return Err(Error::ConstraintViolation(format!(
                        "cannot move {item} under its own descendant"
                    )));
                }
                cursor = self.entry(current)?.parent;
            }
        }

        let (old_parent, name) = {
            let entry = self.entry(item)?;
            (entry.parent, entry.name.clone())
        };
        self.container_remove(old_parent, &name);

        let previous = match previous {
            Some(id) => Some(self.entry(id)?.name.clone()),
            None => None,
        };
        let next = match next {
            Some(id) => Some(self.entry(id)?.name.clone()),
            None => None,
        };

        match new_parent {
            Parent::Root => {
                if let Some(entry) = self.items.get_mut(&item) {
                    entry.parent = None;
                }
                self.container_insert(None, item, previous, next)?;
                self.propagate_root(item, Some(item));
            }
            Parent::Under(target) => {
                if let Some(entry) = self.items.get_mut(&item) {
                    entry.parent = Some(target);
                }
                self.container_insert(Some(target), item, previous, next)?;
                let root = self.entry(target)?.root;
                self.propagate_root(item, root);
            }
        }
        self.mark_dirty(item);
        Ok(())
    }

    /// Rename an item within its container. An existing same-named
    /// sibling is replaced (deleted), with a warning.
    pub fn rename(&mut self, item: ItemId, name: &str) -> Result<()> {
        {
            let entry = self.live(item)?;
            if entry.name == name {
                return Ok(());
            }
        }
        let (parent, old_name) = {
            let entry = self.entry(item)?;
            (entry.parent, entry.name.clone())
        };
        self.container_remove(parent, &old_name);
        if let Some(entry) = self.items.get_mut(&item) {
            entry.name = name.to_owned();
        }
        self.container_insert(parent, item, None, None)?;
        self.mark_dirty(item);
        Ok(())
    }
}
