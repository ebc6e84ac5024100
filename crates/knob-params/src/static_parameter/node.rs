//! Static parameter nodes in their runtime context
//!
//! Operations that need the component tree: loading values from the
//! command line and config files, outer attachment across structuring-tool
//! groups, and the tree and binary forms exchanged with the tool.

use knob_runtime::{ElementKind, Runtime};
use knob_tree::{ConfigTree, NodeRef};
use knob_value::{InputStream, OutputStream};

use super::graph::{ParamId, StaticParameterGraph};
use super::group::StaticParameterGroup;
use crate::config_file::ConfigFile;
use crate::config_scope::ConfigScope;
use crate::error::ParameterError;
use crate::parameter_info::{
    is_group_responsible_for_config_file_connections, COMMAND_LINE_ATTRIBUTE, CONFIG_ATTRIBUTE,
};

/// Tree attribute naming a value type other than the declared one
pub const TYPE_ATTRIBUTE: &str = "type";

/// Tree attribute marking a value that must not be reloaded
pub const ENFORCE_VALUE_ATTRIBUTE: &str = "enforcevalue";

/// Tree attribute naming the outer parameter to attach to
pub const ATTACH_OUTER_ATTRIBUTE: &str = "attachouter";

impl StaticParameterGraph {
    /// Load the value of an owning node from its sources
    ///
    /// Nodes sharing another node's value or enforcing their current value
    /// are left alone. The command line applies only outside of nested
    /// structuring-tool groups; entries assigned by the tool apply only if
    /// the enclosing tool group manages config-file connections. Parse
    /// failures are logged.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unknown node.
    pub fn load_value(&self, runtime: &Runtime, id: ParamId) -> Result<(), ParameterError> {
        let (name, group, enforce, option, entry, by_tool) = self.read_node(id, |n| {
            (
                n.name.clone(),
                n.group,
                n.enforce_current_value,
                n.command_line_option.clone(),
                n.config_entry.clone(),
                n.config_entry_set_by_tool,
            )
        })?;
        if enforce || self.buffer_owner(id) != Some(id) {
            return Ok(());
        }
        let Some(element) = group else {
            return Ok(());
        };
        let tool_group = runtime.parent_with_kind(element, ElementKind::StructuringGroup);

        let top_level = tool_group.map_or(true, |g| runtime.parent(g) == Some(runtime.root()));
        if !option.is_empty() && top_level {
            let argument = runtime.command_line_argument(&option);
            if !argument.is_empty() {
                match self.set_from_text(id, &argument) {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::error!(
                            parameter = %name,
                            option = %option,
                            error = %e,
                            "cannot load static parameter from command line"
                        );
                    }
                }
            }
        }

        if entry.is_empty() {
            return Ok(());
        }
        if by_tool
            && !tool_group
                .is_some_and(|g| {
                    is_group_responsible_for_config_file_connections(runtime, g, element)
                })
        {
            return Ok(());
        }
        if let Some(file) = ConfigFile::find(runtime, element) {
            let full = ConfigScope::full_config_entry(runtime, element, &entry);
            if file.has_entry(&full) {
                let text = file.string_entry(&full);
                if let Err(e) = self.load_text(id, "config entry", &text) {
                    tracing::error!(
                        parameter = %name,
                        entry = %full,
                        error = %e,
                        "cannot load static parameter from config entry"
                    );
                }
            }
        }
        Ok(())
    }

    /// Apply new sources and reload an owning node if they changed
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unknown node.
    pub fn update_and_possibly_load(
        &self,
        runtime: &Runtime,
        id: ParamId,
        command_line_option: &str,
        config_entry: &str,
    ) -> Result<(), ParameterError> {
        let changed = self.write_node(id, |n| {
            let changed =
                n.command_line_option != command_line_option || n.config_entry != config_entry;
            n.command_line_option = command_line_option.to_string();
            n.config_entry = config_entry.to_string();
            changed
        })?;
        if changed && self.buffer_owner(id) == Some(id) {
            self.load_value(runtime, id)?;
        }
        Ok(())
    }

    /// Register a command-line option without reloading
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unknown node.
    pub fn set_command_line_option(&self, id: ParamId, option: &str) -> Result<(), ParameterError> {
        self.write_node(id, |n| n.command_line_option = option.to_string())
    }

    /// Change the config entry from code
    ///
    /// Reloads the value if the entry differs and the owning element is
    /// ready.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unknown node.
    pub fn set_config_entry(
        &self,
        runtime: &Runtime,
        id: ParamId,
        entry: &str,
    ) -> Result<(), ParameterError> {
        let (changed, group) = self.write_node(id, |n| {
            n.config_entry_set_by_tool = false;
            let changed = n.config_entry != entry;
            n.config_entry = entry.to_string();
            (changed, n.group)
        })?;
        if changed && group.is_some_and(|g| runtime.is_ready(g)) {
            self.load_value(runtime, id)?;
        }
        Ok(())
    }

    /// Attach to the outer parameter called `name`; empty detaches
    ///
    /// With `create`, a missing outer parameter is created as proxy.
    ///
    /// # Errors
    ///
    /// See [`StaticParameterGraph::update_outer_attachment`].
    pub fn set_outer_attachment(
        &self,
        runtime: &Runtime,
        id: ParamId,
        name: &str,
        create: bool,
    ) -> Result<(), ParameterError> {
        self.write_node(id, |n| {
            n.outer_attachment = name.to_string();
            n.create_outer = create;
        })?;
        self.update_outer_attachment(runtime, id)
    }

    /// Re-establish the attachment named by the node's outer attachment
    ///
    /// The outer parameter is looked up in the group of the nearest
    /// structuring-tool group above the node's element.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvariantViolation`] if the attachment
    /// would form a cycle.
    pub fn update_outer_attachment(
        &self,
        runtime: &Runtime,
        id: ParamId,
    ) -> Result<(), ParameterError> {
        let (group, outer, create, data_type) = self.read_node(id, |n| {
            (n.group, n.outer_attachment.clone(), n.create_outer, n.data_type)
        })?;
        let Some(element) = group else {
            return Ok(());
        };

        if outer.is_empty() {
            if self.delegate(id).is_some() {
                self.attach_to(id, None)?;
            }
            return Ok(());
        }

        let owner = self.buffer_owner(id);
        let owner_name = owner.and_then(|o| self.name(o));
        if owner != Some(id) && owner_name.as_deref() == Some(outer.as_str()) {
            return Ok(());
        }

        let Some(tool_group) = runtime.parent_with_kind(element, ElementKind::StructuringGroup)
        else {
            tracing::error!(
                parameter = %outer,
                "no enclosing structuring-tool group; outer attachment ignored"
            );
            return Ok(());
        };
        let outer_group = StaticParameterGroup::get_or_create(runtime, tool_group);
        if let Some(target) = outer_group.find(&outer) {
            return self.attach_to(id, Some(target));
        }

        if create {
            let proxy = self.insert(&outer, data_type, None, true);
            outer_group.add(proxy)?;
            self.attach_to(id, Some(proxy))?;
            tracing::debug!(
                parameter = %outer,
                group = %runtime.qualified_name(tool_group),
                "created proxy parameter"
            );
        } else {
            tracing::error!(
                parameter = %outer,
                group = %runtime.qualified_name(tool_group),
                "no outer parameter with this name"
            );
        }
        Ok(())
    }

    // ----- tree form -----

    /// Store the node as attributes and text of `node`
    pub fn serialize_tree(
        &self,
        id: ParamId,
        tree: &mut ConfigTree,
        node: NodeRef,
        tool_context: bool,
    ) {
        debug_assert!(
            [TYPE_ATTRIBUTE, COMMAND_LINE_ATTRIBUTE, CONFIG_ATTRIBUTE, ATTACH_OUTER_ATTRIBUTE]
                .iter()
                .all(|a| !tree.has_attribute(node, a)),
            "static parameter attributes already present"
        );
        let Ok((declared, proxy, enforce, option, outer, entry, by_tool)) = self.read_node(id, |n| {
            (
                n.data_type,
                n.proxy,
                n.enforce_current_value,
                n.command_line_option.clone(),
                n.outer_attachment.clone(),
                n.config_entry.clone(),
                n.config_entry_set_by_tool,
            )
        }) else {
            return;
        };

        if let Some(value) = self.value(id) {
            if value.data_type() != declared || proxy {
                tree.set_attribute(node, TYPE_ATTRIBUTE, value.data_type().name());
            }
            tree.set_text(node, value.to_text());
        }
        if enforce {
            tree.set_attribute(node, ENFORCE_VALUE_ATTRIBUTE, "true");
        }
        if !option.is_empty() {
            tree.set_attribute(node, COMMAND_LINE_ATTRIBUTE, option);
        }
        if !outer.is_empty() {
            tree.set_attribute(node, ATTACH_OUTER_ATTRIBUTE, outer);
        }
        if !entry.is_empty() && (by_tool || !tool_context) {
            tree.set_attribute(node, CONFIG_ATTRIBUTE, entry);
        }
    }

    /// Read the node from attributes and text of `node`
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unregistered value type
    /// and [`ParameterError::ParseFailure`] for an unparsable value.
    pub fn deserialize_tree(
        &self,
        runtime: &Runtime,
        id: ParamId,
        tree: &ConfigTree,
        node: NodeRef,
        tool_context: bool,
    ) -> Result<(), ParameterError> {
        let declared = self.read_node(id, |n| n.data_type)?;
        let data_type = match tree.attribute(node, TYPE_ATTRIBUTE) {
            Some(name) => runtime
                .types()
                .find(name)
                .ok_or_else(|| ParameterError::NotFound(format!("value type '{name}'")))?,
            None => declared,
        };
        let enforce = tree
            .attribute(node, ENFORCE_VALUE_ATTRIBUTE)
            .is_some_and(|v| matches!(v.trim(), "true" | "1"));
        self.set_enforce_current_value(id, enforce)?;

        let mut value = data_type.create_instance();
        if let Some(text) = tree.text(node) {
            value.set_text(text).map_err(|source| ParameterError::ParseFailure {
                origin: "tree",
                input: text.to_string(),
                source,
            })?;
        }
        self.set_value(id, value)?;

        let option = tree.attribute(node, COMMAND_LINE_ATTRIBUTE).unwrap_or_default().to_string();
        let outer = tree.attribute(node, ATTACH_OUTER_ATTRIBUTE).unwrap_or_default().to_string();
        self.write_node(id, |n| n.outer_attachment = outer)?;
        self.update_outer_attachment(runtime, id)?;

        let entry = match tree.attribute(node, CONFIG_ATTRIBUTE) {
            Some(entry) => {
                self.write_node(id, |n| n.config_entry_set_by_tool = tool_context)?;
                entry.to_string()
            }
            None => String::new(),
        };
        self.update_and_possibly_load(runtime, id, &option, &entry)
    }

    // ----- binary form -----

    /// Write the node
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unknown node.
    pub fn write_to(&self, id: ParamId, out: &mut OutputStream) -> Result<(), ParameterError> {
        self.read_node(id, |n| {
            out.write_string(&n.name);
            out.write_type(n.data_type);
            out.write_string(&n.command_line_option);
            out.write_string(&n.outer_attachment);
            out.write_bool(n.create_outer);
            out.write_string(&n.config_entry);
            out.write_bool(n.config_entry_set_by_tool);
            out.write_bool(n.enforce_current_value);
        })?;
        match self.value(id) {
            Some(value) => {
                out.write_bool(true);
                out.write_type(value.data_type());
                value.write_binary(out);
            }
            None => out.write_bool(false),
        }
        Ok(())
    }

    /// Read the node
    ///
    /// The outer attachment is applied and the value possibly reloaded
    /// before the transferred value is read; a value that cannot be read
    /// is logged.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Stream`] for a truncated stream or unknown
    /// type and [`ParameterError::InvariantViolation`] for a cyclic outer
    /// attachment.
    pub fn read_from(
        &self,
        runtime: &Runtime,
        id: ParamId,
        input: &mut InputStream,
    ) -> Result<(), ParameterError> {
        let _name = input.read_string()?;
        let _declared = input.read_type(runtime.types())?;
        let option = input.read_string()?;
        let outer = input.read_string()?;
        let create = input.read_bool()?;
        let entry = input.read_string()?;
        let by_tool = input.read_bool()?;
        let enforce = input.read_bool()?;
        self.write_node(id, |n| {
            n.outer_attachment = outer;
            n.create_outer = create;
            n.config_entry_set_by_tool = by_tool;
            n.enforce_current_value = enforce;
        })?;
        self.update_outer_attachment(runtime, id)?;
        self.update_and_possibly_load(runtime, id, &option, &entry)?;

        if input.read_bool()? {
            let data_type = input.read_type(runtime.types())?;
            let mut value = data_type.create_instance();
            match value.read_binary(input) {
                Ok(()) => self.set_value(id, value)?,
                Err(e) => {
                    tracing::error!(
                        parameter = ?self.name(id),
                        error = %e,
                        "cannot read static parameter value"
                    );
                }
            }
        }
        Ok(())
    }
}
