//! # itemgraph — Schema-Aware Transactional Item Graph
//!
//! An in-memory object graph for schema-driven items: dynamic attributes
//! split between literal values and bidirectional item references, a
//! hierarchical namespace with lazy child loading, dirty tracking against
//! an external transaction manager, and cascading/counted deletion.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `Store` is the contract between the graph and any
//!    persistence/transaction engine
//! 2. **Clean DTOs**: `ItemId`, `Value`, `ItemPath` cross all boundaries
//! 3. **Arena-held items**: items are addressed by stable id, references
//!    are id lookups — no ownership cycles
//! 4. **Both directions, always**: every reference edge keeps its inverse
//!    attribute in sync on the far item
//!
//! ## Quick Start
//!
//! ```rust
//! use itemgraph::{Repository, MemoryStore, Parent, Value};
//!
//! # fn example() -> itemgraph::Result<()> {
//! let mut repo = Repository::new(MemoryStore::new());
//!
//! let root = repo.new_item(Some("data"), Parent::Root, None)?;
//! let note = repo.new_item(Some("note"), Parent::Under(root), None)?;
//!
//! repo.set_attribute(note, "title", Value::from("groceries"))?;
//! let title = repo.attribute_value(note, "title")?;
//! assert_eq!(title.as_value().and_then(Value::as_str), Some("groceries"));
//!
//! let again = repo.find(root, "note");
//! assert_eq!(again, Some(note));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ## Collaborators
//!
//! | Contract | Trait / type | Description |
//! |----------|--------------|-------------|
//! | Persistence + transactions | `Store` | lazy child loads, dirty registration |
//! | Schema | `Kind` / `Attribute` | per-attribute aspects (cardinality, inverse, policies) |
//! | Serialization | `export` | XML document export and per-item save hook |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod schema;
pub mod store;
pub mod repo;
pub mod export;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Item, ItemId, ItemPath, PathAnchor, Status, Value,
    LinkedMap, RefCollection, RefValue, SingleRef,
};

// ============================================================================
// Re-exports: Schema
// ============================================================================

pub use schema::{Aspect, Attribute, Cardinality, CountPolicy, DeletePolicy, Kind};

// ============================================================================
// Re-exports: Store
// ============================================================================

pub use store::{MemoryStore, RawItem, RawRef, Store};

// ============================================================================
// Re-exports: Repository
// ============================================================================

pub use repo::{AttrValue, CollectionKey, FindSpec, Parent, Repository};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("attribute not found: {name} on {item}")]
    AttributeNotFound { item: ItemId, name: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("item is deleted: {0}")]
    Deleted(ItemId),

    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
