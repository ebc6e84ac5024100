//! Static parameters
//!
//! Values that determine an element's structure. They are evaluated per
//! element subtree instead of being published through ports:
//! - [`StaticParameterGraph`]: arena of all nodes with attachment edges
//! - [`StaticParameterGroup`]: ordered parameters of one element and the
//!   recursive evaluation
//! - [`StaticParameter`]: typed handle declared by a component

mod graph;
mod group;
mod node;
mod typed;

pub use graph::{ParamId, StaticParameterGraph};
pub use group::{StaticParameterGroup, PARAMETER_TAG};
pub use node::{ATTACH_OUTER_ATTRIBUTE, ENFORCE_VALUE_ATTRIBUTE, TYPE_ATTRIBUTE};
pub use typed::{StaticParameter, StaticParameterSpec};
