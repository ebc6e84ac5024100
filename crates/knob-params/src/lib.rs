//! knob parameters
//!
//! Dynamically reconfigurable parameters bound to hierarchical config files.
//!
//! # Core Concepts
//!
//! - [`Parameter`]: runtime parameter port, loaded from command line, config
//!   entry or tool default
//! - [`ConfigFile`]: config document serving every parameter of a subtree
//! - [`ConfigScope`]: path fragment that prefixes relative config entries
//! - [`StaticParameter`]: structure-determining parameter, evaluated per
//!   element subtree and shareable through attachment
//! - [`PluginHost`]: two-phase registration of plugin parameters
//!
//! # Example
//!
//! ```rust
//! use knob_params::{ConfigFile, ConfigScope, Parameter, ParameterSpec};
//! use knob_runtime::{ElementKind, Runtime};
//!
//! let runtime = Runtime::new();
//! let file = ConfigFile::empty().attach(&runtime, runtime.root());
//! file.with_tree_mut(|tree| {
//!     let node = tree.get_or_recreate_entry("/camera/exposure");
//!     tree.set_text(node, "25");
//! });
//!
//! let camera = runtime
//!     .create_element(runtime.root(), "camera", ElementKind::Module, None)
//!     .unwrap();
//! ConfigScope::set(&runtime, camera, "camera");
//! let exposure = Parameter::create(
//!     &runtime,
//!     camera,
//!     &ParameterSpec::new("exposure").default_value(10i32).config_entry("exposure"),
//! )
//! .unwrap();
//! runtime.init(runtime.root());
//! assert_eq!(exposure.get(), 25);
//! ```

mod config_file;
mod config_scope;
mod error;
mod hooks;
mod parameter;
mod parameter_info;
mod plugin;
pub mod static_parameter;

pub use config_file::ConfigFile;
pub use config_scope::ConfigScope;
pub use error::ParameterError;
pub use parameter::{Parameter, ParameterSpec};
pub use parameter_info::{
    is_group_responsible_for_config_file_connections, ParameterInfo, COMMAND_LINE_ATTRIBUTE,
    CONFIG_ATTRIBUTE, DEFAULT_ATTRIBUTE,
};
pub use plugin::{
    ConfigurablePlugin, PendingHandle, PluginConfig, PluginHost, PluginParameters, PLUGINS_SCOPE,
};
pub use static_parameter::{
    ParamId, StaticParameter, StaticParameterGraph, StaticParameterGroup, StaticParameterSpec,
};
