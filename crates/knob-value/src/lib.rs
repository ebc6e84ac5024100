//! knob value layer
//!
//! Type-erased values for parameters whose concrete type is only known at
//! runtime.
//!
//! # Core Concepts
//!
//! - [`ParameterValue`]: Rust types a parameter can hold (`i32`, `i64`,
//!   `f32`, `f64`, `bool`, `String`)
//! - [`GenericValue`]: object-safe value buffer with deep copy, equality and (de)serialization
//! - [`DataType`]: runtime type tag, transferred by name
//! - [`TypeRegistry`]: resolves transferred names back to data types
//! - [`OutputStream`] / [`InputStream`]: little-endian binary wire form
//! - [`Bounds`]: numeric ranges with an out-of-bounds policy
//!
//! # Example
//!
//! ```rust
//! use knob_value::{DataType, GenericValue};
//!
//! let mut value = DataType::of::<i32>().create_instance();
//! value.set_text("42").unwrap();
//! assert_eq!(value.downcast_ref::<i32>(), Some(&42));
//! ```

mod bounds;
mod data_type;
mod error;
mod generic;
mod registry;
mod stream;

pub use bounds::{Bounds, OutOfBoundsAction, ValueConstraint};
pub use data_type::{DataType, ParameterValue};
pub use error::{StreamError, ValueError};
pub use generic::{GenericValue, TypedValue};
pub use registry::TypeRegistry;
pub use stream::{InputStream, OutputStream};
