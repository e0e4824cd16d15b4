//! End-to-end tests for the XML export surface.

use itemgraph::export::{save_item, to_xml};
use itemgraph::{
    Attribute, Cardinality, Kind, MemoryStore, Parent, Repository, Value,
};

// ============================================================================
// 1. Document shape: header, identity, name, container
// ============================================================================

#[test]
fn test_document_shape() {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
    let note = repo.new_item(Some("note"), Parent::Under(root), None).unwrap();
    repo.set_attribute(note, "title", "groceries").unwrap();

    let xml = to_xml(&repo, note).unwrap();

    assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
    assert!(xml.contains(&format!(r#"<item uuid="{}""#, note.to_compact())));
    assert!(xml.contains("<name>note</name>"));
    assert!(xml.contains(&format!("<container>{}</container>", root.to_compact())));
    assert!(xml.contains(r#"<attribute name="title" type="str">groceries</attribute>"#));
    assert!(xml.ends_with("</item>\n"));
}

// ============================================================================
// 2. save_item is the partial hook: no document header
// ============================================================================

#[test]
fn test_save_item_partial() {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
    let note = repo.new_item(Some("note"), Parent::Under(root), None).unwrap();

    let mut out = Vec::new();
    save_item(&repo, note, &mut out).unwrap();
    let xml = String::from_utf8(out).unwrap();

    assert!(xml.starts_with("<item uuid="));
    assert!(!xml.contains("<?xml"));
}

// ============================================================================
// 3. Roots are contained by the repository itself
// ============================================================================

#[test]
fn test_root_container() {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();

    let xml = to_xml(&repo, root).unwrap();
    assert!(xml.contains(&format!(
        "<container>{}</container>",
        repo.repository_id().to_compact()
    )));
}

// ============================================================================
// 4. Sibling and child order hints
// ============================================================================

#[test]
fn test_order_hints() {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
    repo.new_item(Some("a"), Parent::Under(root), None).unwrap();
    let b = repo.new_item(Some("b"), Parent::Under(root), None).unwrap();
    repo.new_item(Some("c"), Parent::Under(root), None).unwrap();

    let xml = to_xml(&repo, b).unwrap();
    assert!(xml.contains(r#"previous="a""#));
    assert!(xml.contains(r#"next="c""#));

    let xml = to_xml(&repo, root).unwrap();
    assert!(xml.contains(r#"first="a""#));
    assert!(xml.contains(r#"last="c""#));
}

// ============================================================================
// 5. References carry their inverse name; the kind edge is its own tag
// ============================================================================

#[test]
fn test_reference_export() {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
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
    repo.add_value(group, "members", m2).unwrap();

    let xml = to_xml(&repo, group).unwrap();
    assert!(xml.contains(&format!(r#"<kind type="uuid">{}</kind>"#, kind_item.to_compact())));
    assert!(xml.contains(r#"<ref name="members" otherName="memberOf">"#));
    assert!(xml.contains(&m1.to_compact()));
    assert!(xml.contains(&m2.to_compact()));
    // the kind edge is not repeated as a generic ref
    assert!(!xml.contains(r#"<ref name="kind""#));

    // the single inverse on a member
    let xml = to_xml(&repo, m1).unwrap();
    assert!(xml.contains(&format!(
        r#"<ref name="memberOf" otherName="members" type="uuid">{}</ref>"#,
        group.to_compact()
    )));
}

// ============================================================================
// 6. persist=false attributes are skipped
// ============================================================================

#[test]
fn test_persist_aspect_filters() {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
    let kind_item = repo.new_item(Some("Note"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        kind_item,
        Kind::new("Note")
            .with_attribute("title", Attribute::new())
            .with_attribute("scratch", Attribute::new().with_persist(false)),
    )
    .unwrap();
    let note = repo.new_item(Some("n"), Parent::Under(root), Some(kind_item)).unwrap();
    repo.set_attribute(note, "title", "kept").unwrap();
    repo.set_attribute(note, "scratch", "dropped").unwrap();

    let xml = to_xml(&repo, note).unwrap();
    assert!(xml.contains("kept"));
    assert!(!xml.contains("dropped"));
    assert!(!xml.contains("scratch"));
}

// ============================================================================
// 7. The withSchema marker follows the SCHEMA bit
// ============================================================================

#[test]
fn test_with_schema_marker() {
    let mut repo = Repository::new(MemoryStore::new());
    let schema_root = repo.new_item(Some("Schema"), Parent::Root, None).unwrap();
    let data_root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
    let kind = repo.new_item(Some("Note"), Parent::Under(schema_root), None).unwrap();
    let note = repo.new_item(Some("n"), Parent::Under(data_root), None).unwrap();

    assert!(to_xml(&repo, kind).unwrap().contains(r#"withSchema="True""#));
    assert!(!to_xml(&repo, note).unwrap().contains("withSchema"));
}

// ============================================================================
// 8. Markup in values is escaped
// ============================================================================

#[test]
fn test_escaping() {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
    let note = repo.new_item(Some("note"), Parent::Under(root), None).unwrap();
    repo.set_attribute(note, "title", "<b> & \"quotes\"").unwrap();

    let xml = to_xml(&repo, note).unwrap();
    assert!(xml.contains("&lt;b&gt; &amp; &quot;quotes&quot;"));
    assert!(!xml.contains("<b>"));
}

// ============================================================================
// 9. Multi-valued literals nest value elements
// ============================================================================

#[test]
fn test_multi_valued_export() {
    let mut repo = Repository::new(MemoryStore::new());
    let root = repo.new_item(Some("data"), Parent::Root, None).unwrap();
    let kind_item = repo.new_item(Some("Tagged"), Parent::Under(root), None).unwrap();
    repo.register_kind(
        kind_item,
        Kind::new("Tagged")
            .with_attribute("tags", Attribute::new().with_cardinality(Cardinality::List)),
    )
    .unwrap();
    let item = repo.new_item(Some("i"), Parent::Under(root), Some(kind_item)).unwrap();
    repo.add_value(item, "tags", "urgent").unwrap();
    repo.add_value(item, "tags", Value::Int(7)).unwrap();

    let xml = to_xml(&repo, item).unwrap();
    assert!(xml.contains(r#"<attribute name="tags" cardinality="list">"#));
    assert!(xml.contains(r#"<value type="str">urgent</value>"#));
    assert!(xml.contains(r#"<value type="int">7</value>"#));
}
