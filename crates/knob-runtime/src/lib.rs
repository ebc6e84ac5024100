//! knob runtime
//!
//! Minimal host component tree that parameters live in.
//!
//! # Core Concepts
//!
//! - [`Runtime`]: elements, primary/secondary links, structure lock, readiness, annotations
//! - [`ComponentId`]: element identity
//! - [`Component`]: reconfiguration and initialization hooks
//! - [`DataPort`]: typed value slot with default, listeners and an optional constraint
//! - [`RuntimeConfig`] / [`CommandLine`]: startup configuration
//!
//! # Example
//!
//! ```rust
//! use knob_runtime::{DataPort, ElementKind, Runtime};
//!
//! let runtime = Runtime::new();
//! let module = runtime
//!     .create_element(runtime.root(), "camera", ElementKind::Module, None)
//!     .unwrap();
//! let (_, port) = runtime
//!     .create_port(module, "exposure", DataPort::with_default(10i32))
//!     .unwrap();
//! runtime.init(runtime.root());
//! port.publish_value(20i32).unwrap();
//! assert_eq!(port.get_as::<i32>(), Some(20));
//! ```

mod config;
mod element;
mod error;
mod port;
mod runtime;

pub use config::{CommandLine, RuntimeConfig};
pub use element::{
    Component, ComponentId, ElementKind, ElementState, InitializationListener, LinkKind,
};
pub use error::RuntimeError;
pub use port::{DataPort, PortListener};
pub use runtime::{Runtime, ROOT_NAME, SETTINGS_NAME};
