//! Runtime parameter info
//!
//! [`ParameterInfo`] is annotated on a data port and decides where the
//! port's value comes from. Sources are tried in order:
//! 1. command-line argument of the registered option
//! 2. config entry, resolved through the config scopes
//! 3. default assigned by the structuring tool
//!
//! A source that cannot be parsed is logged and the next one is tried; a
//! value the port rejects ends the chain with a warning.

use std::sync::Arc;

use knob_runtime::{ComponentId, DataPort, ElementKind, Runtime, RuntimeError};
use knob_tree::{ConfigTree, NodeRef};
use knob_value::{InputStream, OutputStream};
use parking_lot::RwLock;

use crate::config_file::ConfigFile;
use crate::config_scope::ConfigScope;
use crate::error::ParameterError;
use crate::hooks;

/// Tree attribute holding the config entry
pub const CONFIG_ATTRIBUTE: &str = "config";

/// Tree attribute holding the command-line option
pub const COMMAND_LINE_ATTRIBUTE: &str = "cmdline";

/// Tree attribute holding the structuring tool's default
pub const DEFAULT_ATTRIBUTE: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InfoState {
    config_entry: String,
    entry_set_by_tool: bool,
    command_line_option: String,
    tool_default: String,
}

enum Attempt {
    Published,
    Rejected,
    Unparsable,
}

/// Value sources of one runtime parameter
#[derive(Debug)]
pub struct ParameterInfo {
    port: ComponentId,
    state: RwLock<InfoState>,
}

impl ParameterInfo {
    /// Info annotated on `port`, created if missing
    pub fn attach(runtime: &Runtime, port: ComponentId) -> Arc<Self> {
        hooks::ensure_installed(runtime);
        runtime.annotation_or_insert_with(port, || Self {
            port,
            state: RwLock::new(InfoState::default()),
        })
    }

    /// Info annotated on `port`
    #[must_use]
    pub fn of(runtime: &Runtime, port: ComponentId) -> Option<Arc<Self>> {
        runtime.annotation::<Self>(port)
    }

    /// Port this info belongs to
    #[inline]
    #[must_use]
    pub fn port(&self) -> ComponentId {
        self.port
    }

    /// Config entry, relative to the port's scope unless absolute
    #[must_use]
    pub fn config_entry(&self) -> String {
        self.state.read().config_entry.clone()
    }

    /// Check if the structuring tool assigned the config entry
    #[must_use]
    pub fn is_config_entry_set_by_tool(&self) -> bool {
        self.state.read().entry_set_by_tool
    }

    /// Registered command-line option
    #[must_use]
    pub fn command_line_option(&self) -> String {
        self.state.read().command_line_option.clone()
    }

    /// Register a command-line option; empty disables the source
    pub fn set_command_line_option(&self, option: &str) {
        self.state.write().command_line_option = option.to_string();
    }

    /// Default assigned by the structuring tool
    #[must_use]
    pub fn tool_default(&self) -> String {
        self.state.read().tool_default.clone()
    }

    /// Set the structuring tool's default; empty disables the source
    pub fn set_tool_default(&self, default: &str) {
        self.state.write().tool_default = default.to_string();
    }

    /// Change the config entry and reload the value if it differs
    pub fn set_config_entry(&self, runtime: &Runtime, entry: &str, set_by_tool: bool) {
        {
            let mut state = self.state.write();
            if state.config_entry == entry {
                return;
            }
            state.config_entry = entry.to_string();
            state.entry_set_by_tool = set_by_tool;
        }
        if let Err(e) = self.load_value(runtime, false) {
            tracing::error!(
                parameter = %runtime.qualified_name(self.port),
                error = %e,
                "reloading parameter failed"
            );
        }
    }

    /// Load the value on initialization of the port
    pub fn on_initialization(&self, runtime: &Runtime) {
        if let Err(e) = self.load_value(runtime, true) {
            tracing::error!(
                parameter = %runtime.qualified_name(self.port),
                error = %e,
                "loading parameter failed"
            );
        }
    }

    /// Load the value from the first usable source
    ///
    /// Skipped for ports that are not ready unless `ignore_ready` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::TypeMismatch`] if the annotated element is
    /// not a data port.
    pub fn load_value(&self, runtime: &Runtime, ignore_ready: bool) -> Result<(), ParameterError> {
        let _structure = runtime.structure_lock();
        let port = match runtime.port(self.port) {
            Ok(port) => port,
            Err(RuntimeError::NotAPort(_)) => {
                return Err(ParameterError::TypeMismatch {
                    expected: "data port".to_string(),
                    actual: format!("{:?}", runtime.kind(self.port).unwrap_or(ElementKind::Group)),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if !ignore_ready && !runtime.is_ready(self.port) {
            return Ok(());
        }
        let state = self.state.read().clone();
        let name = runtime.qualified_name(self.port);

        if !state.command_line_option.is_empty() {
            let argument = runtime.command_line_argument(&state.command_line_option);
            if !argument.is_empty() {
                match Self::try_publish(&port, &name, "command line", &argument) {
                    Attempt::Published | Attempt::Rejected => return Ok(()),
                    Attempt::Unparsable => {}
                }
            }
        }

        if !state.config_entry.is_empty() {
            if let Some(file) = ConfigFile::find(runtime, self.port) {
                let entry = ConfigScope::full_config_entry(runtime, self.port, &state.config_entry);
                if file.has_entry(&entry) {
                    let text = file.string_entry(&entry);
                    match Self::try_publish(&port, &name, "config entry", &text) {
                        Attempt::Published | Attempt::Rejected => return Ok(()),
                        Attempt::Unparsable => {}
                    }
                }
            }
        }

        if !state.tool_default.is_empty() {
            Self::try_publish(&port, &name, "tool default", &state.tool_default);
        }
        Ok(())
    }

    fn try_publish(port: &DataPort, name: &str, origin: &'static str, text: &str) -> Attempt {
        let mut buffer = port.unused_buffer();
        if let Err(source) = buffer.set_text(text) {
            let e = ParameterError::ParseFailure {
                origin,
                input: text.to_string(),
                source,
            };
            tracing::error!(parameter = name, error = %e, "cannot parse parameter value");
            return Attempt::Unparsable;
        }
        match port.publish(buffer) {
            Ok(()) => {
                tracing::debug!(parameter = name, origin, value = text, "loaded parameter");
                Attempt::Published
            }
            Err(e) => {
                tracing::warn!(
                    parameter = name,
                    origin,
                    value = text,
                    error = %e,
                    "parameter value rejected"
                );
                Attempt::Rejected
            }
        }
    }

    /// Write the current value into `file`
    ///
    /// The entry is written only if it already exists or the value differs
    /// from the port's default.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Runtime`] if the port is gone.
    pub fn save_value(&self, runtime: &Runtime, file: &ConfigFile) -> Result<(), ParameterError> {
        let entry = self.config_entry();
        if entry.is_empty() {
            return Ok(());
        }
        let port = runtime.port(self.port)?;
        let full = ConfigScope::full_config_entry(runtime, self.port, &entry);
        let text = port.get().to_text();
        let holds_default = port.holds_default();
        file.with_tree_mut(|tree| {
            if tree.find_entry(&full).is_some() || !holds_default {
                let node = tree.get_or_recreate_entry(&full);
                tree.set_text(node, text);
            }
        });
        Ok(())
    }

    // ----- tree form -----

    /// Store the sources as attributes of `node`
    ///
    /// A config entry assigned outside the structuring tool is omitted in
    /// tool context.
    pub fn serialize_tree(
        &self,
        tree: &mut ConfigTree,
        node: NodeRef,
        tool_context: bool,
        include_command_line: bool,
    ) {
        debug_assert!(
            [CONFIG_ATTRIBUTE, COMMAND_LINE_ATTRIBUTE, DEFAULT_ATTRIBUTE]
                .iter()
                .all(|a| !tree.has_attribute(node, a)),
            "parameter attributes already present"
        );
        let state = self.state.read();
        if !state.config_entry.is_empty() && (state.entry_set_by_tool || !tool_context) {
            tree.set_attribute(node, CONFIG_ATTRIBUTE, state.config_entry.as_str());
        }
        if include_command_line && !state.command_line_option.is_empty() {
            tree.set_attribute(node, COMMAND_LINE_ATTRIBUTE, state.command_line_option.as_str());
        }
        if !state.tool_default.is_empty() {
            tree.set_attribute(node, DEFAULT_ATTRIBUTE, state.tool_default.as_str());
        }
    }

    /// Read the sources from the attributes of `node`
    pub fn deserialize_tree(
        &self,
        tree: &ConfigTree,
        node: NodeRef,
        tool_context: bool,
        include_command_line: bool,
    ) {
        let mut state = self.state.write();
        match tree.attribute(node, CONFIG_ATTRIBUTE) {
            Some(entry) => {
                state.config_entry = entry.to_string();
                state.entry_set_by_tool = tool_context;
            }
            None => state.config_entry.clear(),
        }
        if include_command_line {
            state.command_line_option = tree
                .attribute(node, COMMAND_LINE_ATTRIBUTE)
                .unwrap_or_default()
                .to_string();
        }
        state.tool_default = tree
            .attribute(node, DEFAULT_ATTRIBUTE)
            .unwrap_or_default()
            .to_string();
    }

    // ----- binary form -----

    /// Write the sources
    pub fn write_to(&self, out: &mut OutputStream) {
        let state = self.state.read();
        out.write_bool(state.entry_set_by_tool);
        out.write_string(&state.config_entry);
        out.write_string(&state.command_line_option);
        out.write_string(&state.tool_default);
    }

    /// Read the sources and reload the value if any of them changed
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Stream`] for a truncated stream.
    pub fn read_from(
        &self,
        runtime: &Runtime,
        input: &mut InputStream,
    ) -> Result<(), ParameterError> {
        let incoming = InfoState {
            entry_set_by_tool: input.read_bool()?,
            config_entry: input.read_string()?,
            command_line_option: input.read_string()?,
            tool_default: input.read_string()?,
        };
        let same = {
            let mut state = self.state.write();
            let same = state.config_entry == incoming.config_entry
                && state.command_line_option == incoming.command_line_option
                && state.tool_default == incoming.tool_default;
            *state = incoming;
            same
        };
        if !same {
            if let Err(e) = self.load_value(runtime, false) {
                tracing::error!(
                    parameter = %runtime.qualified_name(self.port),
                    error = %e,
                    "reloading parameter failed"
                );
            }
        }
        Ok(())
    }
}

/// Check if structuring-tool group `group` manages config-file connections
/// for `element`
///
/// The responsible group is the one carrying the element's config file or
/// the nearest tool group enclosing that element. A file attached outside
/// of any tool group makes the outermost tool group responsible.
#[must_use]
pub fn is_group_responsible_for_config_file_connections(
    runtime: &Runtime,
    group: ComponentId,
    element: ComponentId,
) -> bool {
    let tool_group_above =
        |id: ComponentId| runtime.parent_with_kind(id, ElementKind::StructuringGroup);
    let config_element = ConfigFile::find(runtime, element).and_then(|f| f.element());
    let Some(config_element) = config_element else {
        return tool_group_above(group).is_none();
    };

    let responsible = if runtime.kind(config_element) == Some(ElementKind::StructuringGroup) {
        Some(config_element)
    } else {
        tool_group_above(config_element)
    };
    let responsible = responsible.unwrap_or_else(|| {
        let mut outermost = group;
        while let Some(next) = tool_group_above(outermost) {
            outermost = next;
        }
        outermost
    });
    responsible == group
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port_with_info(rt: &Runtime) -> (ComponentId, Arc<DataPort>, Arc<ParameterInfo>) {
        let (id, port) = rt
            .create_port(rt.root(), "p", DataPort::with_default(1i32))
            .unwrap();
        let info = ParameterInfo::attach(rt, id);
        (id, port, info)
    }

    #[test]
    fn test_non_port_is_type_mismatch() {
        let rt = Runtime::new();
        let module = rt.create_element(rt.root(), "m", ElementKind::Module, None).unwrap();
        let info = ParameterInfo::attach(&rt, module);
        assert!(matches!(
            info.load_value(&rt, true),
            Err(ParameterError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_unparsable_command_line_falls_through_to_default() {
        let rt = Runtime::new();
        rt.set_command_line_argument("speed", "fast");
        let (_, port, info) = port_with_info(&rt);
        info.set_command_line_option("speed");
        info.set_tool_default("9");
        info.load_value(&rt, true).unwrap();
        assert_eq!(port.get_as::<i32>(), Some(9));
    }

    #[test]
    fn test_not_ready_port_is_skipped() {
        let rt = Runtime::new();
        let (_, port, info) = port_with_info(&rt);
        info.set_tool_default("9");
        info.load_value(&rt, false).unwrap();
        assert_eq!(port.get_as::<i32>(), Some(1));
    }

    #[test]
    fn test_tree_form_hides_foreign_entry_in_tool_context() {
        let rt = Runtime::new();
        let (_, _, info) = port_with_info(&rt);
        info.set_config_entry(&rt, "a/b", false);
        info.set_command_line_option("opt");

        let mut tree = ConfigTree::new();
        let node = tree.add_child(tree.root(), "parameter");
        info.serialize_tree(&mut tree, node, true, true);
        assert!(!tree.has_attribute(node, CONFIG_ATTRIBUTE));
        assert_eq!(tree.attribute(node, COMMAND_LINE_ATTRIBUTE), Some("opt"));

        let mut plain = ConfigTree::new();
        let node = plain.add_child(plain.root(), "parameter");
        info.serialize_tree(&mut plain, node, false, false);
        assert_eq!(plain.attribute(node, CONFIG_ATTRIBUTE), Some("a/b"));

        let copy = ParameterInfo::attach(
            &rt,
            rt.create_port(rt.root(), "q", DataPort::with_default(0i32)).unwrap().0,
        );
        copy.deserialize_tree(&plain, node, true, false);
        assert_eq!(copy.config_entry(), "a/b");
        assert!(copy.is_config_entry_set_by_tool());
    }

    #[test]
    fn test_responsibility_without_config_file() {
        let rt = Runtime::new();
        let outer = rt
            .create_element(rt.root(), "outer", ElementKind::StructuringGroup, None)
            .unwrap();
        let inner = rt.create_element(outer, "inner", ElementKind::StructuringGroup, None).unwrap();
        let module = rt.create_element(inner, "m", ElementKind::Module, None).unwrap();

        assert!(is_group_responsible_for_config_file_connections(&rt, outer, module));
        assert!(!is_group_responsible_for_config_file_connections(&rt, inner, module));
    }

    #[test]
    fn test_responsibility_follows_config_file() {
        let rt = Runtime::new();
        let outer = rt
            .create_element(rt.root(), "outer", ElementKind::StructuringGroup, None)
            .unwrap();
        let inner = rt.create_element(outer, "inner", ElementKind::StructuringGroup, None).unwrap();
        let module = rt.create_element(inner, "m", ElementKind::Module, None).unwrap();

        ConfigFile::empty().attach(&rt, rt.root());
        assert!(is_group_responsible_for_config_file_connections(&rt, outer, module));

        ConfigFile::empty().attach(&rt, inner);
        assert!(is_group_responsible_for_config_file_connections(&rt, inner, module));
        assert!(!is_group_responsible_for_config_file_connections(&rt, outer, module));
    }
}
