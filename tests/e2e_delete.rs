//! End-to-end tests for deletion: idempotence, recursive children,
//! delete policies, and counted cascade gating.

use itemgraph::{
    Attribute, Cardinality, CountPolicy, DeletePolicy, Error, ItemId, Kind, MemoryStore, Parent,
    Repository,
};
use pretty_assertions::assert_eq;

fn repo_with_root() -> (Repository<MemoryStore>, ItemId) {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
    (repo, root)
}

// ============================================================================
// 1. Delete is idempotent
// ============================================================================

#[test]
fn test_delete_idempotent() {
    let (mut repo, root) = repo_with_root();
    let note = repo.new_item(Some("note"), Parent::Under(root), None).unwrap();

    repo.delete(note, false).unwrap();
    assert!(repo.is_deleted(note));
    repo.delete(note, false).unwrap();
    assert!(repo.is_deleted(note));
}

// ============================================================================
// 2. Children require a recursive delete
// ============================================================================

#[test]
fn test_delete_requires_recursive() {
    let (mut repo, root) = repo_with_root();
    let folder = repo.new_item(Some("folder"), Parent::Under(root), None).unwrap();
    let note = repo.new_item(Some("note"), Parent::Under(folder), None).unwrap();

    let err = repo.delete(folder, false).unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation(_)));
    assert!(!repo.is_deleted(folder));
    assert!(!repo.is_deleted(note));

    repo.delete(folder, true).unwrap();
    assert!(repo.is_deleted(folder));
    assert!(repo.is_deleted(note));
    assert_eq!(repo.child_no_load(root, "folder"), None);
}

// ============================================================================
// 3. Deleted items leave the namespace
// ============================================================================

#[test]
fn test_deleted_items_unreachable() {
    let (mut repo, root) = repo_with_root();
    let note = repo.new_item(Some("note"), Parent::Under(root), None).unwrap();

    assert_eq!(repo.find(root, note), Some(note));
    repo.delete(note, false).unwrap();

    assert_eq!(repo.find(root, note), None);
    assert_eq!(repo.resolve("//data/note"), None);
    assert!(!repo.iter_children(root).any(|child| child == note));
}

// ============================================================================
// 4. The remove delete policy drops links silently
// ============================================================================

#[test]
fn test_remove_policy_leaves_target() {
    let (mut repo, root) = repo_with_root();
    let a = repo.new_item(Some("a"), Parent::Under(root), None).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), None).unwrap();

    repo.set_attribute(a, "friend", b).unwrap();
    repo.delete(a, false).unwrap();

    assert!(repo.is_deleted(a));
    assert!(!repo.is_deleted(b));
    assert!(!repo.has_attribute(b, "friend__for"));
}

// ============================================================================
// 5. Cascade over a counted chain deletes the whole chain
// ============================================================================

fn chain_kind(repo: &mut Repository<MemoryStore>, root: ItemId) -> ItemId {
    let kind_item = repo.new_item(Some("Link"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        kind_item,
        Kind::new("Link")
            .with_attribute(
                "next",
                Attribute::new()
                    .with_other_name("prev")
                    .with_delete_policy(DeletePolicy::Cascade),
            )
            .with_attribute(
                "prev",
                Attribute::new()
                    .with_other_name("next")
                    .with_count_policy(CountPolicy::Count),
            ),
    )
    .unwrap();
    kind_item
}

#[test]
fn test_cascade_chain() {
    let (mut repo, root) = repo_with_root();
    let kind_item = chain_kind(&mut repo, root);

    let a = repo.new_item(Some("a"), Parent::Under(root), Some(kind_item)).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), Some(kind_item)).unwrap();
    let c = repo.new_item(Some("c"), Parent::Under(root), Some(kind_item)).unwrap();

    repo.set_attribute(a, "next", b).unwrap();
    repo.set_attribute(b, "next", c).unwrap();
    assert_eq!(repo.ref_count(b), 1);
    assert_eq!(repo.ref_count(c), 1);

    repo.delete(a, true).unwrap();

    assert!(repo.is_deleted(a));
    assert!(repo.is_deleted(b));
    assert!(repo.is_deleted(c));
}

// ============================================================================
// 6. A non-last referrer leaves the target alive
// ============================================================================

#[test]
fn test_counted_cascade_gating() {
    let (mut repo, root) = repo_with_root();

    let referrer_kind = repo.new_item(Some("Referrer"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        referrer_kind,
        Kind::new("Referrer").with_attribute(
            "target",
            Attribute::new()
                .with_other_name("sources")
                .with_delete_policy(DeletePolicy::Cascade),
        ),
    )
    .unwrap();

    let target_kind = repo.new_item(Some("Target"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        target_kind,
        Kind::new("Target").with_attribute(
            "sources",
            Attribute::new()
                .with_cardinality(Cardinality::List)
                .with_other_name("target")
                .with_count_policy(CountPolicy::Count),
        ),
    )
    .unwrap();

    let a1 = repo.new_item(Some("a1"), Parent::Under(root), Some(referrer_kind)).unwrap();
    let a2 = repo.new_item(Some("a2"), Parent::Under(root), Some(referrer_kind)).unwrap();
    let t = repo.new_item(Some("t"), Parent::Under(root), Some(target_kind)).unwrap();

    repo.set_attribute(a1, "target", t).unwrap();
    repo.set_attribute(a2, "target", t).unwrap();
    assert_eq!(repo.ref_count(t), 2);

    repo.delete(a1, false).unwrap();
    assert!(!repo.is_deleted(t));
    assert_eq!(repo.ref_count(t), 1);

    repo.delete(a2, false).unwrap();
    assert!(repo.is_deleted(t));
}

// ============================================================================
// 7. Uncounted references never contribute to the count
// ============================================================================

#[test]
fn test_ref_count_ignores_uncounted() {
    let (mut repo, root) = repo_with_root();
    let a = repo.new_item(Some("a"), Parent::Under(root), None).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), None).unwrap();

    repo.set_attribute(a, "friend", b).unwrap();
    assert_eq!(repo.ref_count(b), 0);
    assert_eq!(repo.ref_count(a), 0);
}

// ============================================================================
// 8. Deleting a root item removes it from the root registry
// ============================================================================

#[test]
fn test_delete_root() {
    let (mut repo, _root) = repo_with_root();
    let extra = repo.new_item(Some("scratch"), Parent::Root, None).unwrap();

    assert_eq!(repo.root("scratch"), Some(extra));
    repo.delete(extra, false).unwrap();
    assert_eq!(repo.root("scratch"), None);
    assert_eq!(repo.resolve("//scratch"), None);
}

// ============================================================================
// 9. Delete clears values and detaches every reference
// ============================================================================

#[test]
fn test_delete_clears_attributes() {
    let (mut repo, root) = repo_with_root();
    let a = repo.new_item(Some("a"), Parent::Under(root), None).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), None).unwrap();

    repo.set_attribute(a, "title", "x").unwrap();
    repo.set_attribute(a, "friend", b).unwrap();

    repo.delete(a, false).unwrap();
    assert!(!repo.has_attribute(b, "friend__for"));
    // b is still alive and consistent
    repo.check(b).unwrap();
}
