//! Component tree model
//!
//! Typed description of a form: each node carries a type tag, an optional
//! data key, its children and its constraint metadata. Pure data plus a
//! depth-first walk that reports each node with its data path.

mod path;
mod types;
mod walk;

pub use path::{lookup, DataPath, PathSegment};
pub use types::{ComponentKind, ComponentNode, Conditional, Constraints, Form};
pub use walk::{each_component, path_index, walk_components};
