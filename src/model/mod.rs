//! # Item Graph Model
//!
//! Clean DTOs that define the item graph: identity, paths, literal
//! values, the ordered map, reference wrappers, and the item entry.
//! These types cross every boundary: repository ↔ store ↔ export ↔ user.
//!
//! Design rule: this module is pure data — no I/O, no collaborator
//! calls, no dirty marking. All graph-level bookkeeping (inverse
//! references, transaction registration) lives in `crate::repo`.

pub mod id;
pub mod path;
pub mod value;
pub mod linked_map;
pub mod refs;
pub mod item;

pub use id::ItemId;
pub use path::{ItemPath, PathAnchor};
pub use value::Value;
pub use linked_map::LinkedMap;
pub use refs::{RefCollection, RefValue, SingleRef};
pub use item::{Children, Item, Status};
