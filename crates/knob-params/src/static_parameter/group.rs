//! Static parameter groups
//!
//! A [`StaticParameterGroup`] is annotated on an element and lists the
//! static parameters declared by it, in declaration order. Evaluation of a
//! group reloads its parameters and reconfigures the element when any of
//! them changed.

use std::sync::Arc;

use knob_runtime::{ComponentId, Runtime};
use knob_tree::{ConfigTree, NodeRef, NAME_ATTRIBUTE};
use knob_value::{InputStream, OutputStream};
use parking_lot::RwLock;

use super::graph::{ParamId, StaticParameterGraph};
use crate::error::ParameterError;
use crate::hooks;

/// Tag of the elements a group serializes its parameters into
pub const PARAMETER_TAG: &str = "parameter";

/// Ordered static parameters of one element
#[derive(Debug)]
pub struct StaticParameterGroup {
    element: ComponentId,
    graph: Arc<StaticParameterGraph>,
    parameters: RwLock<Vec<ParamId>>,
    creation_action: RwLock<Option<i32>>,
}

impl StaticParameterGroup {
    /// Group annotated on `element`, created if missing
    pub fn get_or_create(runtime: &Runtime, element: ComponentId) -> Arc<Self> {
        hooks::ensure_installed(runtime);
        let graph = StaticParameterGraph::of(runtime);
        runtime.annotation_or_insert_with(element, || Self {
            element,
            graph,
            parameters: RwLock::new(Vec::new()),
            creation_action: RwLock::new(None),
        })
    }

    /// Group annotated on `element`
    #[must_use]
    pub fn of(runtime: &Runtime, element: ComponentId) -> Option<Arc<Self>> {
        runtime.annotation::<Self>(element)
    }

    /// Element the group belongs to
    #[inline]
    #[must_use]
    pub fn element(&self) -> ComponentId {
        self.element
    }

    /// Append a node; the group now decides its lifetime
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unknown node.
    pub fn add(&self, id: ParamId) -> Result<(), ParameterError> {
        let mut parameters = self.parameters.write();
        let index = parameters.len();
        let element = self.element;
        self.graph.write_node(id, |n| {
            n.group = Some(element);
            n.index = index;
        })?;
        parameters.push(id);
        Ok(())
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.read().len()
    }

    /// Check if the group has no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.read().is_empty()
    }

    /// Parameter at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ParamId> {
        self.parameters.read().get(index).copied()
    }

    /// All parameters in declaration order
    #[must_use]
    pub fn parameters(&self) -> Vec<ParamId> {
        self.parameters.read().clone()
    }

    /// First parameter called `name`
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ParamId> {
        self.parameters()
            .into_iter()
            .find(|id| self.graph.name(*id).as_deref() == Some(name))
    }

    /// Id of the action that created the element, if any
    #[must_use]
    pub fn creation_action(&self) -> Option<i32> {
        *self.creation_action.read()
    }

    /// Record the action that created the element
    pub fn set_creation_action(&self, action: Option<i32>) {
        *self.creation_action.write() = action;
    }

    // ----- evaluation -----

    /// Re-evaluate static parameters of `element` and everything below it
    ///
    /// Every parameter is reloaded. If any changed, the element's
    /// reconfiguration hook runs once, change tracking is reset and a ready
    /// element is re-initialized so that children created by the hook get
    /// initialized. Primary children are evaluated next, then the groups of
    /// attached parameters that still report a change.
    pub fn evaluate(runtime: &Runtime, element: ComponentId) {
        let _structure = runtime.structure_lock();
        let graph = StaticParameterGraph::of(runtime);
        let mut attached = Vec::new();

        if let Some(group) = Self::of(runtime, element) {
            let parameters = group.parameters();
            let mut changed = false;
            for id in &parameters {
                if let Err(e) = graph.load_value(runtime, *id) {
                    tracing::error!(
                        parameter = ?graph.name(*id),
                        error = %e,
                        "loading static parameter failed"
                    );
                }
                changed |= graph.has_changed(*id);
                for other in graph.all_attached(*id) {
                    if !attached.contains(&other) {
                        attached.push(other);
                    }
                }
            }

            if changed {
                tracing::debug!(
                    element = %runtime.qualified_name(element),
                    "static parameters changed"
                );
                if let Some(component) = runtime.component(element) {
                    component.on_static_parameter_change(runtime, element);
                }
                for id in &parameters {
                    graph.reset_changed(*id);
                }
                if runtime.is_ready(element) {
                    runtime.init(element);
                }
            }
        }

        for child in runtime.children(element) {
            if !runtime.is_deleted(child) {
                Self::evaluate(runtime, child);
            }
        }

        for id in attached {
            if graph.has_changed(id) {
                if let Some(owner) = graph.group(id) {
                    Self::evaluate(runtime, owner);
                }
            }
        }
    }

    // ----- tree form -----

    /// Append one `parameter` child per parameter to `node`
    pub fn serialize_tree(&self, tree: &mut ConfigTree, node: NodeRef, tool_context: bool) {
        for id in self.parameters() {
            let name = self.graph.name(id).unwrap_or_default();
            let child = tree.add_named_child(node, PARAMETER_TAG, &name);
            self.graph.serialize_tree(id, tree, child, tool_context);
        }
    }

    /// Read parameters from the children of `node`
    ///
    /// A differing number of children is logged and as many parameters as
    /// possible are read; failures are logged per parameter.
    pub fn deserialize_tree(
        &self,
        runtime: &Runtime,
        tree: &ConfigTree,
        node: NodeRef,
        tool_context: bool,
    ) {
        let children = tree.children(node).to_vec();
        let parameters = self.parameters();
        if children.len() != parameters.len() {
            tracing::warn!(
                element = %runtime.qualified_name(self.element),
                stored = children.len(),
                declared = parameters.len(),
                "static parameter count differs; reading anyway"
            );
        }
        for (id, child) in parameters.into_iter().zip(children) {
            debug_assert_eq!(
                tree.attribute(child, NAME_ATTRIBUTE).map(str::to_string),
                self.graph.name(id),
                "static parameter order differs"
            );
            if let Err(e) = self.graph.deserialize_tree(runtime, id, tree, child, tool_context) {
                tracing::error!(
                    parameter = ?self.graph.name(id),
                    error = %e,
                    "reading static parameter failed"
                );
            }
        }
    }

    // ----- binary form -----

    /// Write creation action, count and all parameters
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] if a parameter vanished.
    pub fn write_to(&self, out: &mut OutputStream) -> Result<(), ParameterError> {
        let parameters = self.parameters();
        out.write_i32(self.creation_action().unwrap_or(-1));
        out.write_i32(i32::try_from(parameters.len()).unwrap_or(i32::MAX));
        for id in parameters {
            self.graph.write_to(id, out)?;
        }
        Ok(())
    }

    /// Read all parameters and evaluate the element
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvariantViolation`] if creation action or
    /// parameter count differ from this group; nothing is read then.
    pub fn read_from(
        &self,
        runtime: &Runtime,
        input: &mut InputStream,
    ) -> Result<(), ParameterError> {
        let action = input.read_i32()?;
        let expected_action = self.creation_action().unwrap_or(-1);
        if action != expected_action {
            return Err(ParameterError::InvariantViolation(format!(
                "creation action {action} does not match {expected_action}"
            )));
        }
        let count = input.read_i32()?;
        let parameters = self.parameters();
        if usize::try_from(count).ok() != Some(parameters.len()) {
            return Err(ParameterError::InvariantViolation(format!(
                "parameter count {count} does not match {}",
                parameters.len()
            )));
        }
        for id in parameters {
            self.graph.read_from(runtime, id, input)?;
        }
        Self::evaluate(runtime, self.element);
        Ok(())
    }
}

impl Drop for StaticParameterGroup {
    fn drop(&mut self) {
        for id in self.parameters.get_mut().drain(..).rev() {
            self.graph.remove(id);
        }
    }
}
