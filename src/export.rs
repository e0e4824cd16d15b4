//! XML export — serialize items in the repository document format.
//!
//! Produces the element schema the on-disk writer consumes:
//!
//! ```text
//! <item uuid=".." withSchema="True">
//!   <name>..</name>
//!   <kind type="uuid">..</kind>
//!   <container previous=".." next=".." first=".." last="..">parent-uuid</container>
//!   <attribute name=".." ..>..</attribute>
//!   <ref name=".." otherName=".." ..>..</ref>
//! </item>
//! ```
//!
//! [`to_xml`] wraps one item as a full document; [`save_item`] is the
//! partial hook an external writer calls per item. Attributes whose
//! `persist` aspect is false are skipped.

use std::io::Write;

use crate::model::{ItemId, RefValue, Status, Value};
use crate::repo::Repository;
use crate::store::Store;
use crate::{Error, Result};

/// Export one item as a full XML document.
pub fn to_xml<S: Store>(repo: &Repository<S>, item: ItemId) -> Result<String> {
    let mut out = Vec::new();
    writeln!(&mut out, r#"<?xml version="1.0" encoding="utf-8"?>"#)?;
    write_item(repo, item, &mut out)?;
    String::from_utf8(out)
        .map_err(|err| Error::ConstraintViolation(format!("export produced invalid utf-8: {err}")))
}

/// Partial export hook: write one item element, no document wrapper.
pub fn save_item<S: Store>(repo: &Repository<S>, item: ItemId, writer: &mut dyn Write) -> Result<()> {
    write_item(repo, item, writer)
}

fn write_item<S: Store>(repo: &Repository<S>, item: ItemId, w: &mut dyn Write) -> Result<()> {
    let entry = repo
        .item(item)
        .ok_or_else(|| Error::NotFound(format!("item {item}")))?;
    if entry.is_deleted() {
        return Err(Error::Deleted(item));
    }

    write!(w, r#"<item uuid="{}""#, entry.id().to_compact())?;
    if entry.status().contains(Status::SCHEMA) {
        write!(w, r#" withSchema="True""#)?;
    }
    writeln!(w, ">")?;

    writeln!(w, "  <name>{}</name>", escape(entry.name()))?;

    if let Some(kind) = entry.kind() {
        writeln!(w, r#"  <kind type="uuid">{}</kind>"#, kind.to_compact())?;
    }

    // container: parent uuid plus sibling- and child-order hints
    let (previous, next) = repo.sibling_names(item);
    write!(w, "  <container")?;
    if let Some(previous) = previous {
        write!(w, r#" previous="{}""#, escape(&previous))?;
    }
    if let Some(next) = next {
        write!(w, r#" next="{}""#, escape(&next))?;
    }
    if let Some(first) = entry.first_child_name() {
        write!(w, r#" first="{}""#, escape(first))?;
    }
    if let Some(last) = entry.last_child_name() {
        write!(w, r#" last="{}""#, escape(last))?;
    }
    let parent = match entry.parent() {
        Some(parent) => parent,
        None => repo.repository_id(),
    };
    writeln!(w, ">{}</container>", parent.to_compact())?;

    for (name, value) in entry.values() {
        if repo.aspect_persist(item, name) {
            write_attribute(w, name, value)?;
        }
    }
    for (name, value) in entry.references() {
        // the kind edge is rendered by the <kind> element above
        if name == "kind" {
            continue;
        }
        if repo.aspect_persist(item, name) {
            write_ref(w, name, value)?;
        }
    }

    writeln!(w, "</item>")?;
    Ok(())
}

fn write_attribute(w: &mut dyn Write, name: &str, value: &Value) -> Result<()> {
    match value {
        Value::List(list) => {
            writeln!(w, r#"  <attribute name="{}" cardinality="list">"#, escape(name))?;
            for member in list {
                write_nested_value(w, None, member)?;
            }
            writeln!(w, "  </attribute>")?;
        }
        Value::Map(map) => {
            writeln!(w, r#"  <attribute name="{}" cardinality="dict">"#, escape(name))?;
            for (key, member) in map {
                write_nested_value(w, Some(key), member)?;
            }
            writeln!(w, "  </attribute>")?;
        }
        scalar => {
            writeln!(
                w,
                r#"  <attribute name="{}" type="{}">{}</attribute>"#,
                escape(name),
                scalar_type(scalar),
                escape(&scalar_text(scalar)),
            )?;
        }
    }
    Ok(())
}

fn write_nested_value(w: &mut dyn Write, key: Option<&str>, value: &Value) -> Result<()> {
    write!(w, "    <value")?;
    if let Some(key) = key {
        write!(w, r#" name="{}""#, escape(key))?;
    }
    writeln!(
        w,
        r#" type="{}">{}</value>"#,
        scalar_type(value),
        escape(&scalar_text(value)),
    )?;
    Ok(())
}

fn write_ref(w: &mut dyn Write, name: &str, value: &RefValue) -> Result<()> {
    match value {
        RefValue::Single(link) => {
            writeln!(
                w,
                r#"  <ref name="{}" otherName="{}" type="uuid">{}</ref>"#,
                escape(name),
                escape(&link.other_name),
                link.other.to_compact(),
            )?;
        }
        RefValue::Collection(refs) => {
            writeln!(
                w,
                r#"  <ref name="{}" otherName="{}">"#,
                escape(name),
                escape(refs.other_name()),
            )?;
            for other in refs.others() {
                write!(w, r#"    <ref type="uuid""#)?;
                if let Some(alias) = refs.alias_of(&other) {
                    write!(w, r#" alias="{}""#, escape(alias))?;
                }
                if let Some(previous) = refs.previous_of(&other) {
                    write!(w, r#" previous="{}""#, previous.to_compact())?;
                }
                if let Some(next) = refs.next_of(&other) {
                    write!(w, r#" next="{}""#, next.to_compact())?;
                }
                writeln!(w, ">{}</ref>", other.to_compact())?;
            }
            writeln!(w, "  </ref>")?;
        }
    }
    Ok(())
}

fn scalar_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "none",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::String(_) => "str",
        Value::Bytes(_) => "bytes",
        Value::Date(_) => "date",
        Value::DateTime(_) => "datetime",
        Value::List(_) => "list",
        Value::Map(_) => "dict",
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::Bytes(bytes) => bytes.iter().map(|b| format!("{b:02x}")).collect(),
        Value::Date(d) => d.to_string(),
        Value::DateTime(dt) => dt.to_rfc3339(),
        // nested containers flatten to their display form
        Value::List(_) | Value::Map(_) => value.to_string(),
    }
}

/// Escape text for element content and attribute values.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
