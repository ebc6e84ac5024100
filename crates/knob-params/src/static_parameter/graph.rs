//! Static parameter arena
//!
//! All static parameter nodes of a runtime live in one
//! [`StaticParameterGraph`]. Nodes share values through attachment:
//! - a node either owns its buffer or delegates to another node
//! - following delegation always ends at exactly one owner
//! - delegation never forms a cycle; this is checked on every attach
//! - `attached` lists are the exact inverse of delegation edges

use std::fmt;
use std::sync::Arc;

use knob_runtime::{ComponentId, Runtime};
use knob_value::{DataType, GenericValue};
use parking_lot::RwLock;

use crate::error::ParameterError;

/// Handle to a static parameter node
///
/// Slots of removed nodes are reused; the generation tells a stale handle
/// apart from the node that took its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamId {
    index: usize,
    generation: u32,
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug)]
pub(crate) enum Buffer {
    Owns(Option<Box<dyn GenericValue>>),
    DelegatesTo(ParamId),
}

#[derive(Debug)]
pub(crate) struct NodeData {
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    pub(crate) buffer: Buffer,
    pub(crate) snapshot: Option<Box<dyn GenericValue>>,
    pub(crate) attached: Vec<ParamId>,
    pub(crate) group: Option<ComponentId>,
    pub(crate) index: usize,
    pub(crate) command_line_option: String,
    pub(crate) outer_attachment: String,
    pub(crate) create_outer: bool,
    pub(crate) config_entry: String,
    pub(crate) config_entry_set_by_tool: bool,
    pub(crate) enforce_current_value: bool,
    pub(crate) proxy: bool,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

#[derive(Debug, Default)]
struct GraphInner {
    nodes: Vec<Slot>,
    free: Vec<usize>,
}

impl GraphInner {
    fn node(&self, id: ParamId) -> Result<&NodeData, ParameterError> {
        self.nodes
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
            .ok_or_else(|| ParameterError::NotFound(format!("static parameter {id}")))
    }

    fn node_mut(&mut self, id: ParamId) -> Result<&mut NodeData, ParameterError> {
        self.nodes
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
            .ok_or_else(|| ParameterError::NotFound(format!("static parameter {id}")))
    }

    fn owner(&self, id: ParamId) -> Option<ParamId> {
        let mut current = id;
        for _ in 0..=self.nodes.len() {
            match self.node(current).ok()?.buffer {
                Buffer::Owns(_) => return Some(current),
                Buffer::DelegatesTo(next) => current = next,
            }
        }
        None
    }

    fn value(&self, id: ParamId) -> Option<&dyn GenericValue> {
        let owner = self.owner(id)?;
        match &self.node(owner).ok()?.buffer {
            Buffer::Owns(value) => value.as_deref(),
            Buffer::DelegatesTo(_) => None,
        }
    }

    fn owner_buffer_mut(
        &mut self,
        id: ParamId,
    ) -> Result<&mut Option<Box<dyn GenericValue>>, ParameterError> {
        self.node(id)?;
        let owner = self
            .owner(id)
            .ok_or_else(|| no_owner(id))?;
        match &mut self.node_mut(owner)?.buffer {
            Buffer::Owns(value) => Ok(value),
            Buffer::DelegatesTo(_) => Err(ParameterError::InvariantViolation(format!(
                "owner {owner} delegates"
            ))),
        }
    }
}

fn no_owner(id: ParamId) -> ParameterError {
    ParameterError::InvariantViolation(format!("no buffer owner for {id}"))
}

/// Arena of all static parameter nodes of a runtime
#[derive(Debug, Default)]
pub struct StaticParameterGraph {
    inner: RwLock<GraphInner>,
}

impl StaticParameterGraph {
    /// Empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph of `runtime`, created on first use
    #[must_use]
    pub fn of(runtime: &Runtime) -> Arc<Self> {
        runtime.annotation_or_insert_with(runtime.root(), Self::new)
    }

    /// Add a self-owning node
    ///
    /// `value` of `None` creates a node without buffer; it receives one on
    /// its first attachment.
    pub fn insert(
        &self,
        name: &str,
        data_type: DataType,
        value: Option<Box<dyn GenericValue>>,
        proxy: bool,
    ) -> ParamId {
        let data = NodeData {
            name: name.to_string(),
            data_type,
            buffer: Buffer::Owns(value),
            snapshot: None,
            attached: Vec::new(),
            group: None,
            index: 0,
            command_line_option: String::new(),
            outer_attachment: String::new(),
            create_outer: false,
            config_entry: String::new(),
            config_entry_set_by_tool: false,
            enforce_current_value: false,
            proxy,
        };
        let mut inner = self.inner.write();
        if let Some(index) = inner.free.pop() {
            if let Some(slot) = inner.nodes.get_mut(index) {
                slot.data = Some(data);
                return ParamId {
                    index,
                    generation: slot.generation,
                };
            }
        }
        inner.nodes.push(Slot {
            generation: 0,
            data: Some(data),
        });
        ParamId {
            index: inner.nodes.len() - 1,
            generation: 0,
        }
    }

    /// Remove a node
    ///
    /// Nodes attached to it become owners of a copy of the shared value.
    pub fn remove(&self, id: ParamId) {
        let mut inner = self.inner.write();
        let shared = inner.value(id).map(|v| v.clone_boxed());
        if inner.node(id).is_err() {
            return;
        }
        let Some(data) = inner.nodes.get_mut(id.index).and_then(|slot| {
            slot.generation = slot.generation.wrapping_add(1);
            slot.data.take()
        }) else {
            return;
        };
        inner.free.push(id.index);

        if let Buffer::DelegatesTo(target) = data.buffer {
            if let Ok(target) = inner.node_mut(target) {
                target.attached.retain(|a| *a != id);
            }
        }
        for attached in data.attached {
            if let Ok(node) = inner.node_mut(attached) {
                node.buffer = Buffer::Owns(shared.clone());
            }
        }
        tracing::debug!(parameter = %data.name, "removed static parameter");
    }

    /// Check if `id` refers to a live node
    #[must_use]
    pub fn contains(&self, id: ParamId) -> bool {
        self.inner.read().node(id).is_ok()
    }

    /// Number of live nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().nodes.iter().filter(|slot| slot.data.is_some()).count()
    }

    /// Check if the graph has no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn read_node<R>(
        &self,
        id: ParamId,
        f: impl FnOnce(&NodeData) -> R,
    ) -> Result<R, ParameterError> {
        Ok(f(self.inner.read().node(id)?))
    }

    pub(crate) fn write_node<R>(
        &self,
        id: ParamId,
        f: impl FnOnce(&mut NodeData) -> R,
    ) -> Result<R, ParameterError> {
        Ok(f(self.inner.write().node_mut(id)?))
    }

    // ----- attachment -----

    /// Node holding the value `id` uses
    #[must_use]
    pub fn buffer_owner(&self, id: ParamId) -> Option<ParamId> {
        self.inner.read().owner(id)
    }

    /// Node `id` delegates to directly, if any
    #[must_use]
    pub fn delegate(&self, id: ParamId) -> Option<ParamId> {
        match self.inner.read().node(id).ok()?.buffer {
            Buffer::DelegatesTo(target) => Some(target),
            Buffer::Owns(_) => None,
        }
    }

    /// Nodes delegating directly to `id`
    #[must_use]
    pub fn attached(&self, id: ParamId) -> Vec<ParamId> {
        self.read_node(id, |n| n.attached.clone()).unwrap_or_default()
    }

    /// Make `id` use the value of `target`, or its own with `None`
    ///
    /// A resulting owner without buffer receives the node's previous value;
    /// a node detached from a shared value keeps a copy of it.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvariantViolation`] if `target` already
    /// uses the value of `id`, and [`ParameterError::NotFound`] for unknown
    /// nodes.
    pub fn attach_to(&self, id: ParamId, target: Option<ParamId>) -> Result<(), ParameterError> {
        let mut inner = self.inner.write();
        inner.node(id)?;
        let target = target.filter(|t| *t != id);
        if let Some(target) = target {
            inner.node(target)?;
            let mut current = target;
            loop {
                if current == id {
                    return Err(ParameterError::InvariantViolation(format!(
                        "attaching {id} to {target} would create a cycle"
                    )));
                }
                match inner.node(current)?.buffer {
                    Buffer::DelegatesTo(next) => current = next,
                    Buffer::Owns(_) => break,
                }
            }
        }

        let shared = inner.value(id).map(|v| v.clone_boxed());
        let node = inner.node_mut(id)?;
        let declared = node.data_type;
        let name = node.name.clone();
        let previous_delegate = match &mut node.buffer {
            Buffer::DelegatesTo(old) => Some(*old),
            Buffer::Owns(own) => {
                own.take();
                None
            }
        };
        node.buffer = match target {
            Some(target) => Buffer::DelegatesTo(target),
            None => Buffer::Owns(None),
        };
        if let Some(old) = previous_delegate {
            inner.node_mut(old)?.attached.retain(|a| *a != id);
        }
        if let Some(target) = target {
            inner.node_mut(target)?.attached.push(id);
        }

        let owner = inner
            .owner(id)
            .ok_or_else(|| no_owner(id))?;
        let owner_node = inner.node_mut(owner)?;
        if owner_node.data_type != declared {
            tracing::warn!(
                parameter = %name,
                expected = %declared,
                actual = %owner_node.data_type,
                "attached static parameter of different type"
            );
        }
        let owner_type = owner_node.data_type;
        if let Buffer::Owns(slot) = &mut owner_node.buffer {
            if slot.is_none() {
                *slot = Some(shared.unwrap_or_else(|| owner_type.create_instance()));
            }
        }
        Ok(())
    }

    /// `id` and every node sharing a value with it through attachment
    #[must_use]
    pub fn all_attached(&self, id: ParamId) -> Vec<ParamId> {
        let inner = self.inner.read();
        let mut result = vec![id];
        let mut i = 0;
        while i < result.len() {
            if let Ok(node) = inner.node(result[i]) {
                if let Buffer::DelegatesTo(target) = node.buffer {
                    if !result.contains(&target) {
                        result.push(target);
                    }
                }
                for attached in &node.attached {
                    if !result.contains(attached) {
                        result.push(*attached);
                    }
                }
            }
            i += 1;
        }
        result
    }

    // ----- values -----

    /// Copy of the value `id` uses
    #[must_use]
    pub fn value(&self, id: ParamId) -> Option<Box<dyn GenericValue>> {
        self.inner.read().value(id).map(|v| v.clone_boxed())
    }

    /// Run `f` on the value `id` uses
    pub fn with_value<R>(&self, id: ParamId, f: impl FnOnce(&dyn GenericValue) -> R) -> Option<R> {
        self.inner.read().value(id).map(f)
    }

    /// Replace the value `id` uses
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unknown node.
    pub fn set_value(
        &self,
        id: ParamId,
        value: Box<dyn GenericValue>,
    ) -> Result<(), ParameterError> {
        *self.inner.write().owner_buffer_mut(id)? = Some(value);
        Ok(())
    }

    /// Parse `text` as the declared type and store it as the shared value
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::ParseFailure`] if `text` does not parse;
    /// the value is unchanged then.
    pub fn set_from_text(&self, id: ParamId, text: &str) -> Result<(), ParameterError> {
        let mut value = self.read_node(id, |n| n.data_type.create_instance())?;
        value.set_text(text).map_err(|source| ParameterError::ParseFailure {
            origin: "text",
            input: text.to_string(),
            source,
        })?;
        self.set_value(id, value)
    }

    /// Parse `text` into the type of the current buffer
    pub(crate) fn load_text(
        &self,
        id: ParamId,
        origin: &'static str,
        text: &str,
    ) -> Result<(), ParameterError> {
        let mut value = match self.value(id) {
            Some(current) => current.data_type().create_instance(),
            None => self.read_node(id, |n| n.data_type.create_instance())?,
        };
        value.set_text(text).map_err(|source| ParameterError::ParseFailure {
            origin,
            input: text.to_string(),
            source,
        })?;
        self.set_value(id, value)
    }

    /// Check if the shared value differs from the node's last snapshot
    #[must_use]
    pub fn has_changed(&self, id: ParamId) -> bool {
        let inner = self.inner.read();
        let Ok(node) = inner.node(id) else {
            return false;
        };
        match (inner.value(id), node.snapshot.as_deref()) {
            (None, None) => false,
            (Some(current), Some(snapshot)) => !current.equals(snapshot),
            _ => true,
        }
    }

    /// Take a snapshot of the shared value
    pub fn reset_changed(&self, id: ParamId) {
        let mut inner = self.inner.write();
        let snapshot = inner.value(id).map(|v| v.clone_boxed());
        if let Ok(node) = inner.node_mut(id) {
            tracing::trace!(parameter = %node.name, "reset static parameter change");
            node.snapshot = snapshot;
        }
    }

    // ----- properties -----

    /// Node name
    #[must_use]
    pub fn name(&self, id: ParamId) -> Option<String> {
        self.read_node(id, |n| n.name.clone()).ok()
    }

    /// Declared type
    #[must_use]
    pub fn data_type(&self, id: ParamId) -> Option<DataType> {
        self.read_node(id, |n| n.data_type).ok()
    }

    /// Element of the group holding the node
    #[must_use]
    pub fn group(&self, id: ParamId) -> Option<ComponentId> {
        self.read_node(id, |n| n.group).ok().flatten()
    }

    /// Position in its group
    #[must_use]
    pub fn index(&self, id: ParamId) -> Option<usize> {
        self.read_node(id, |n| n.index).ok()
    }

    /// Check if the node was created as a proxy for an inner parameter
    #[must_use]
    pub fn is_proxy(&self, id: ParamId) -> bool {
        self.read_node(id, |n| n.proxy).unwrap_or(false)
    }

    /// Config entry
    #[must_use]
    pub fn config_entry(&self, id: ParamId) -> String {
        self.read_node(id, |n| n.config_entry.clone()).unwrap_or_default()
    }

    /// Check if the structuring tool assigned the config entry
    #[must_use]
    pub fn is_config_entry_set_by_tool(&self, id: ParamId) -> bool {
        self.read_node(id, |n| n.config_entry_set_by_tool).unwrap_or(false)
    }

    /// Command-line option
    #[must_use]
    pub fn command_line_option(&self, id: ParamId) -> String {
        self.read_node(id, |n| n.command_line_option.clone()).unwrap_or_default()
    }

    /// Name of the outer parameter to attach to
    #[must_use]
    pub fn outer_attachment(&self, id: ParamId) -> String {
        self.read_node(id, |n| n.outer_attachment.clone()).unwrap_or_default()
    }

    /// Check if the node keeps its value instead of loading
    #[must_use]
    pub fn enforces_current_value(&self, id: ParamId) -> bool {
        self.read_node(id, |n| n.enforce_current_value).unwrap_or(false)
    }

    /// Keep the current value instead of loading from sources
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unknown node.
    pub fn set_enforce_current_value(
        &self,
        id: ParamId,
        enforce: bool,
    ) -> Result<(), ParameterError> {
        self.write_node(id, |n| n.enforce_current_value = enforce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knob_value::TypedValue;

    fn int_node(graph: &StaticParameterGraph, name: &str, value: i32) -> ParamId {
        graph.insert(name, DataType::of::<i32>(), Some(TypedValue::boxed(value)), false)
    }

    fn int_value(graph: &StaticParameterGraph, id: ParamId) -> Option<i32> {
        graph.with_value(id, |v| v.downcast_ref::<i32>().copied()).flatten()
    }

    #[test]
    fn test_attach_shares_owner_value() {
        let graph = StaticParameterGraph::new();
        let a = int_node(&graph, "a", 1);
        let b = int_node(&graph, "b", 2);

        graph.attach_to(a, Some(b)).unwrap();
        assert_eq!(graph.buffer_owner(a), Some(b));
        assert_eq!(graph.attached(b), vec![a]);
        assert_eq!(int_value(&graph, a), Some(2));

        graph.set_from_text(a, "7").unwrap();
        assert_eq!(int_value(&graph, b), Some(7));
    }

    #[test]
    fn test_attach_rejects_cycle() {
        let graph = StaticParameterGraph::new();
        let a = int_node(&graph, "a", 1);
        let b = int_node(&graph, "b", 2);
        let c = int_node(&graph, "c", 3);
        graph.attach_to(a, Some(b)).unwrap();
        graph.attach_to(b, Some(c)).unwrap();

        assert!(matches!(
            graph.attach_to(c, Some(a)),
            Err(ParameterError::InvariantViolation(_))
        ));
        assert_eq!(graph.buffer_owner(a), Some(c));
    }

    #[test]
    fn test_detach_keeps_copy_of_shared_value() {
        let graph = StaticParameterGraph::new();
        let a = int_node(&graph, "a", 1);
        let b = int_node(&graph, "b", 5);
        graph.attach_to(a, Some(b)).unwrap();

        graph.attach_to(a, None).unwrap();
        assert_eq!(graph.buffer_owner(a), Some(a));
        assert!(graph.attached(b).is_empty());
        assert_eq!(int_value(&graph, a), Some(5));
    }

    #[test]
    fn test_bufferless_owner_takes_previous_value() {
        let graph = StaticParameterGraph::new();
        let inner = int_node(&graph, "inner", 4);
        let proxy = graph.insert("outer", DataType::of::<i32>(), None, true);

        graph.attach_to(inner, Some(proxy)).unwrap();
        assert_eq!(int_value(&graph, proxy), Some(4));
    }

    #[test]
    fn test_remove_promotes_attached_nodes() {
        let graph = StaticParameterGraph::new();
        let owner = int_node(&graph, "owner", 3);
        let a = int_node(&graph, "a", 0);
        graph.attach_to(a, Some(owner)).unwrap();

        graph.remove(owner);
        assert!(!graph.contains(owner));
        assert_eq!(graph.buffer_owner(a), Some(a));
        assert_eq!(int_value(&graph, a), Some(3));
    }

    #[test]
    fn test_removed_slot_reuse_rejects_stale_id() {
        let graph = StaticParameterGraph::new();
        let old = int_node(&graph, "old", 1);
        graph.remove(old);
        let fresh = int_node(&graph, "fresh", 2);

        assert_ne!(old, fresh);
        assert!(!graph.contains(old));
        assert!(matches!(
            graph.set_from_text(old, "99"),
            Err(ParameterError::NotFound(_))
        ));
        assert_eq!(graph.name(old), None);
        assert_eq!(int_value(&graph, fresh), Some(2));

        graph.remove(old);
        assert!(graph.contains(fresh));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_change_tracking_against_snapshot() {
        let graph = StaticParameterGraph::new();
        let a = int_node(&graph, "a", 1);
        assert!(graph.has_changed(a));
        graph.reset_changed(a);
        assert!(!graph.has_changed(a));
        graph.set_from_text(a, "1").unwrap();
        assert!(!graph.has_changed(a));
        graph.set_from_text(a, "2").unwrap();
        assert!(graph.has_changed(a));
    }

    #[test]
    fn test_all_attached_closure() {
        let graph = StaticParameterGraph::new();
        let owner = int_node(&graph, "owner", 0);
        let a = int_node(&graph, "a", 0);
        let b = int_node(&graph, "b", 0);
        let lone = int_node(&graph, "lone", 0);
        graph.attach_to(a, Some(owner)).unwrap();
        graph.attach_to(b, Some(a)).unwrap();

        let mut closure = graph.all_attached(b);
        closure.sort();
        assert_eq!(closure, vec![owner, a, b]);
        assert_eq!(graph.all_attached(lone), vec![lone]);
    }

    #[test]
    fn test_failed_parse_keeps_value() {
        let graph = StaticParameterGraph::new();
        let a = int_node(&graph, "a", 6);
        assert!(matches!(
            graph.set_from_text(a, "six"),
            Err(ParameterError::ParseFailure { .. })
        ));
        assert_eq!(int_value(&graph, a), Some(6));
    }
}
