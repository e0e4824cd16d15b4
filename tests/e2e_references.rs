//! End-to-end tests for bidirectional references: single links,
//! collections, reattach, aliases, and the kind/items edge.

use itemgraph::{
    Attribute, AttrValue, Cardinality, CollectionKey, Error, ItemId, Kind, MemoryStore, Parent,
    Repository,
};
use pretty_assertions::assert_eq;

fn repo_with_root() -> (Repository<MemoryStore>, ItemId) {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
    (repo, root)
}

/// A kind declaring `owner` (single) with inverse `owned`.
fn owner_kind(repo: &mut Repository<MemoryStore>, root: ItemId) -> ItemId {
    let kind_item = repo.new_item(Some("Owned"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        kind_item,
        Kind::new("Owned").with_attribute("owner", Attribute::new().with_other_name("owned")),
    )
    .unwrap();
    kind_item
}

// ============================================================================
// 1. Single reference maintains its inverse both ways
// ============================================================================

#[test]
fn test_single_reference_inverse() {
    let (mut repo, root) = repo_with_root();
    let kind_item = owner_kind(&mut repo, root);
    let a = repo.new_item(Some("a"), Parent::Under(root), Some(kind_item)).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), None).unwrap();

    repo.set_attribute(a, "owner", b).unwrap();
    assert_eq!(repo.attribute_value(a, "owner").unwrap(), AttrValue::Item(b));
    assert_eq!(repo.attribute_value(b, "owned").unwrap(), AttrValue::Item(a));

    assert!(repo.remove_attribute(a, "owner").unwrap());
    assert!(!repo.has_attribute(a, "owner"));
    assert!(!repo.has_attribute(b, "owned"));
}

// ============================================================================
// 2. Schema-less inverse naming: <name>__for
// ============================================================================

#[test]
fn test_schemaless_inverse_naming() {
    let (mut repo, root) = repo_with_root();
    let a = repo.new_item(Some("a"), Parent::Under(root), None).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), None).unwrap();

    repo.set_attribute(a, "friend", b).unwrap();
    assert_eq!(repo.attribute_value(b, "friend__for").unwrap(), AttrValue::Item(a));
}

// ============================================================================
// 3. Overwriting a single reference reattaches the edge
// ============================================================================

#[test]
fn test_reattach_on_overwrite() {
    let (mut repo, root) = repo_with_root();
    let kind_item = owner_kind(&mut repo, root);
    let a = repo.new_item(Some("a"), Parent::Under(root), Some(kind_item)).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), None).unwrap();
    let c = repo.new_item(Some("c"), Parent::Under(root), None).unwrap();

    repo.set_attribute(a, "owner", b).unwrap();
    repo.set_attribute(a, "owner", c).unwrap();

    assert_eq!(repo.attribute_value(a, "owner").unwrap(), AttrValue::Item(c));
    assert_eq!(repo.attribute_value(c, "owned").unwrap(), AttrValue::Item(a));
    assert!(!repo.has_attribute(b, "owned"));
    repo.check(a).unwrap();
    repo.check(c).unwrap();
}

// ============================================================================
// 4. Reference collections keep order and mirror every member
// ============================================================================

#[test]
fn test_reference_collection() {
    let (mut repo, root) = repo_with_root();
    let kind_item = repo.new_item(Some("Group"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        kind_item,
        Kind::new("Group").with_attribute(
            "members",
            Attribute::new()
                .with_cardinality(Cardinality::List)
                .with_other_name("memberOf"),
        ),
    )
    .unwrap();

    let group = repo.new_item(Some("g"), Parent::Under(root), Some(kind_item)).unwrap();
    let m1 = repo.new_item(Some("m1"), Parent::Under(root), None).unwrap();
    let m2 = repo.new_item(Some("m2"), Parent::Under(root), None).unwrap();
    let m3 = repo.new_item(Some("m3"), Parent::Under(root), None).unwrap();

    repo.add_value(group, "members", m1).unwrap();
    repo.add_value(group, "members", m2).unwrap();
    repo.add_value(group, "members", m3).unwrap();

    assert_eq!(
        repo.attribute_value(group, "members").unwrap(),
        AttrValue::Items(vec![m1, m2, m3])
    );
    assert!(repo.has_value(group, "members", m2).unwrap());
    assert_eq!(repo.attribute_value(m1, "memberOf").unwrap(), AttrValue::Item(group));

    repo.remove_value(group, "members", CollectionKey::Id(m2)).unwrap();
    assert_eq!(
        repo.attribute_value(group, "members").unwrap(),
        AttrValue::Items(vec![m1, m3])
    );
    assert!(!repo.has_attribute(m2, "memberOf"));
    assert_eq!(repo.attribute_value(m3, "memberOf").unwrap(), AttrValue::Item(group));
    repo.check(group).unwrap();
}

// ============================================================================
// 5. Collection aliases
// ============================================================================

#[test]
fn test_collection_alias() {
    let (mut repo, root) = repo_with_root();
    let kind_item = repo.new_item(Some("Group"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        kind_item,
        Kind::new("Group").with_attribute(
            "members",
            Attribute::new()
                .with_cardinality(Cardinality::List)
                .with_other_name("memberOf"),
        ),
    )
    .unwrap();
    let group = repo.new_item(Some("g"), Parent::Under(root), Some(kind_item)).unwrap();
    let m1 = repo.new_item(Some("m1"), Parent::Under(root), None).unwrap();

    repo.add_value_with_alias(group, "members", m1, "primary").unwrap();
    assert_eq!(
        repo.get_value(group, "members", CollectionKey::Name("primary")).unwrap(),
        Some(AttrValue::Item(m1))
    );
    assert_eq!(
        repo.get_value(group, "members", CollectionKey::Id(m1)).unwrap(),
        Some(AttrValue::Item(m1))
    );
    repo.check(group).unwrap();
}

// ============================================================================
// 6. Setting a multi-valued reference attribute replaces the collection
// ============================================================================

#[test]
fn test_set_replaces_collection() {
    let (mut repo, root) = repo_with_root();
    let kind_item = repo.new_item(Some("Group"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        kind_item,
        Kind::new("Group").with_attribute(
            "members",
            Attribute::new()
                .with_cardinality(Cardinality::List)
                .with_other_name("memberOf"),
        ),
    )
    .unwrap();
    let group = repo.new_item(Some("g"), Parent::Under(root), Some(kind_item)).unwrap();
    let m1 = repo.new_item(Some("m1"), Parent::Under(root), None).unwrap();
    let m2 = repo.new_item(Some("m2"), Parent::Under(root), None).unwrap();

    repo.add_value(group, "members", m1).unwrap();
    repo.set_attribute(group, "members", m2).unwrap();

    assert_eq!(
        repo.attribute_value(group, "members").unwrap(),
        AttrValue::Items(vec![m2])
    );
    assert!(!repo.has_attribute(m1, "memberOf"));
    assert_eq!(repo.attribute_value(m2, "memberOf").unwrap(), AttrValue::Item(group));
}

// ============================================================================
// 7. A declared reference without an inverse is malformed
// ============================================================================

#[test]
fn test_missing_other_name_declaration() {
    let (mut repo, root) = repo_with_root();
    let kind_item = repo.new_item(Some("Broken"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        kind_item,
        // declared, but no otherName aspect
        Kind::new("Broken").with_attribute("link", Attribute::new()),
    )
    .unwrap();
    let a = repo.new_item(Some("a"), Parent::Under(root), Some(kind_item)).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), None).unwrap();

    assert!(matches!(
        repo.set_attribute(a, "link", b),
        Err(Error::TypeError { .. })
    ));
    assert!(!repo.has_attribute(a, "link"));
    assert!(!repo.has_attribute(b, "link__for"));
}

// ============================================================================
// 8. An inverse name already holding a literal is a structural conflict
// ============================================================================

#[test]
fn test_inverse_literal_conflict() {
    let (mut repo, root) = repo_with_root();
    let a = repo.new_item(Some("a"), Parent::Under(root), None).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), None).unwrap();

    repo.set_attribute(b, "friend__for", "a literal").unwrap();

    assert!(matches!(
        repo.set_attribute(a, "friend", b),
        Err(Error::TypeError { .. })
    ));
    // nothing was installed on either side
    assert!(!repo.has_attribute(a, "friend"));
    assert_eq!(
        repo.attribute_value(b, "friend__for").unwrap(),
        AttrValue::Value("a literal".into())
    );
}

// ============================================================================
// 9. Items reach their kind, and the kind reaches its items
// ============================================================================

#[test]
fn test_kind_items_edge() {
    let (mut repo, root) = repo_with_root();
    let kind_item = repo.new_item(Some("Note"), Parent::Under(root), None).unwrap();
    repo.register_kind(kind_item, Kind::new("Note")).unwrap();

    let n1 = repo.new_item(Some("n1"), Parent::Under(root), Some(kind_item)).unwrap();
    let n2 = repo.new_item(Some("n2"), Parent::Under(root), Some(kind_item)).unwrap();

    assert_eq!(repo.attribute_value(n1, "kind").unwrap(), AttrValue::Item(kind_item));
    assert_eq!(
        repo.attribute_value(kind_item, "items").unwrap(),
        AttrValue::Items(vec![n1, n2])
    );

    // dropping the kind also leaves the items collection
    repo.set_kind(n1, None).unwrap();
    assert!(!repo.has_attribute(n1, "kind"));
    assert_eq!(
        repo.attribute_value(kind_item, "items").unwrap(),
        AttrValue::Items(vec![n2])
    );
}

// ============================================================================
// 10. Display name precedence
// ============================================================================

#[test]
fn test_display_name() {
    let (mut repo, root) = repo_with_root();
    let kind_item = repo.new_item(Some("Note"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        kind_item,
        Kind::new("Note")
            .with_attribute("title", Attribute::new())
            .with_display_attribute("title"),
    )
    .unwrap();
    let note = repo.new_item(Some("n"), Parent::Under(root), Some(kind_item)).unwrap();

    assert_eq!(repo.display_name(note).unwrap(), "n");

    repo.set_attribute(note, "title", "Shopping list").unwrap();
    assert_eq!(repo.display_name(note).unwrap(), "Shopping list");

    repo.set_attribute(note, "displayName", "Override").unwrap();
    assert_eq!(repo.display_name(note).unwrap(), "Override");
}
