//! knob config tree
//!
//! Hierarchical key/value document addressed by slash-separated entries.
//!
//! # Core Concepts
//!
//! - [`ConfigTree`]: ordered element tree with `node` branches and `value` leaves
//! - [`NodeRef`]: handle to one element of a tree
//! - [`ConfigPath`]: composition of scope fragments into entries
//! - [`DocumentNode`] / [`DocumentFormat`]: persisted form (JSON or YAML)
//!
//! # Example
//!
//! ```rust
//! use knob_tree::ConfigTree;
//!
//! let mut tree = ConfigTree::new();
//! let leaf = tree.create_entry("/robot/arm/speed", true);
//! tree.set_text(leaf, "0.5");
//! assert_eq!(tree.string_entry("robot/arm/speed"), "0.5");
//! ```

mod document;
mod error;
mod path;
mod tree;

pub use document::{DocumentFormat, DocumentNode};
pub use error::TreeError;
pub use path::{ConfigPath, SEPARATOR};
pub use tree::{ConfigTree, NodeRef, BRANCH_TAG, LEAF_TAG, NAME_ATTRIBUTE};
