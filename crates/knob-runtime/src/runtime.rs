//! The component tree
//!
//! [`Runtime`] owns every element, the parent/child links between them, the
//! structure lock and the annotation side-table:
//! - elements are addressed by [`ComponentId`]
//! - primary links form a tree rooted at [`Runtime::root`]; secondary links
//!   add aliases; the link graph never contains a cycle
//! - annotations attach arbitrary `Send + Sync` values to an element, one
//!   per type
//! - hooks are always invoked with no internal lock held except the
//!   reentrant structure lock

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use petgraph::graphmap::DiGraphMap;

use crate::config::{CommandLine, RuntimeConfig};
use crate::element::{
    Component, ComponentId, ElementKind, ElementState, InitializationListener, LinkKind,
};
use crate::error::RuntimeError;
use crate::port::DataPort;
use knob_value::TypeRegistry;

/// Name of the runtime root element
pub const ROOT_NAME: &str = "Runtime";

/// Name of the lazily created settings group below the root
pub const SETTINGS_NAME: &str = "Settings";

type Annotation = Arc<dyn Any + Send + Sync>;

struct ElementEntry {
    name: String,
    kind: ElementKind,
    state: ElementState,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
    component: Option<Arc<dyn Component>>,
    port: Option<Arc<DataPort>>,
}

/// Host component tree
pub struct Runtime {
    types: TypeRegistry,
    command_line: RwLock<CommandLine>,
    elements: RwLock<HashMap<ComponentId, ElementEntry>>,
    links: RwLock<DiGraphMap<ComponentId, LinkKind>>,
    structure: ReentrantMutex<()>,
    annotations: DashMap<(ComponentId, TypeId), Annotation>,
    init_listeners: RwLock<Vec<Arc<dyn InitializationListener>>>,
    root: ComponentId,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Create a runtime with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with custom configuration
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        let root = ComponentId::new();
        let mut elements = HashMap::new();
        elements.insert(
            root,
            ElementEntry {
                name: ROOT_NAME.to_string(),
                kind: ElementKind::Group,
                state: ElementState::Ready,
                parent: None,
                children: Vec::new(),
                component: None,
                port: None,
            },
        );
        let mut links = DiGraphMap::new();
        links.add_node(root);

        Self {
            types: config.types,
            command_line: RwLock::new(config.command_line),
            elements: RwLock::new(elements),
            links: RwLock::new(links),
            structure: ReentrantMutex::new(()),
            annotations: DashMap::new(),
            init_listeners: RwLock::new(Vec::new()),
            root,
        }
    }

    // ----- configuration -----

    /// Known value types
    #[inline]
    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Command-line argument for `option`, or an empty string
    #[must_use]
    pub fn command_line_argument(&self, option: &str) -> String {
        self.command_line.read().argument(option)
    }

    /// Set a command-line argument
    pub fn set_command_line_argument(&self, option: &str, value: &str) {
        self.command_line.write().set(option, value);
    }

    /// Remove a command-line argument
    pub fn remove_command_line_argument(&self, option: &str) -> Option<String> {
        self.command_line.write().remove(option)
    }

    // ----- structure -----

    /// Acquire the structure lock
    ///
    /// Reentrant: the holding thread may acquire it again.
    pub fn structure_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.structure.lock()
    }

    /// Root element
    #[inline]
    #[must_use]
    pub fn root(&self) -> ComponentId {
        self.root
    }

    /// Create an element below `parent`
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ElementNotFound`] or
    /// [`RuntimeError::ElementDeleted`] for an unusable parent.
    pub fn create_element(
        &self,
        parent: ComponentId,
        name: &str,
        kind: ElementKind,
        component: Option<Arc<dyn Component>>,
    ) -> Result<ComponentId, RuntimeError> {
        self.insert_element(parent, name, kind, component, None)
    }

    /// Create a data port below `parent`
    ///
    /// # Errors
    ///
    /// See [`Runtime::create_element`].
    pub fn create_port(
        &self,
        parent: ComponentId,
        name: &str,
        port: DataPort,
    ) -> Result<(ComponentId, Arc<DataPort>), RuntimeError> {
        let port = Arc::new(port);
        let id = self.insert_element(parent, name, ElementKind::Port, None, Some(port.clone()))?;
        Ok((id, port))
    }

    fn insert_element(
        &self,
        parent: ComponentId,
        name: &str,
        kind: ElementKind,
        component: Option<Arc<dyn Component>>,
        port: Option<Arc<DataPort>>,
    ) -> Result<ComponentId, RuntimeError> {
        let _structure = self.structure_lock();
        let id = ComponentId::new();
        {
            let mut elements = self.elements.write();
            let parent_entry = elements
                .get_mut(&parent)
                .ok_or(RuntimeError::ElementNotFound(parent))?;
            if parent_entry.state == ElementState::Deleted {
                return Err(RuntimeError::ElementDeleted(parent));
            }
            parent_entry.children.push(id);
            elements.insert(
                id,
                ElementEntry {
                    name: name.to_string(),
                    kind,
                    state: ElementState::Constructing,
                    parent: Some(parent),
                    children: Vec::new(),
                    component,
                    port,
                },
            );
        }
        self.links.write().add_edge(parent, id, LinkKind::Primary);
        tracing::debug!(element = name, ?kind, "created element");
        Ok(id)
    }

    /// Settings group below the root, created on first use
    #[must_use]
    pub fn settings(&self) -> ComponentId {
        let _structure = self.structure_lock();
        if let Some(existing) = self.find_child(self.root, SETTINGS_NAME) {
            return existing;
        }
        match self.create_element(self.root, SETTINGS_NAME, ElementKind::Group, None) {
            Ok(id) => id,
            Err(e) => unreachable!("runtime root is always present: {e}"),
        }
    }

    /// Add a secondary link from `parent` to `child`
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CycleDetected`] if the link would close a
    /// cycle and [`RuntimeError::ElementNotFound`] for unknown elements.
    pub fn add_link(&self, parent: ComponentId, child: ComponentId) -> Result<(), RuntimeError> {
        let _structure = self.structure_lock();
        for id in [parent, child] {
            if self.state(id).is_none() {
                return Err(RuntimeError::ElementNotFound(id));
            }
        }
        let mut links = self.links.write();
        if parent == child || links.contains_edge(parent, child) {
            return Err(RuntimeError::CycleDetected { parent, child });
        }
        links.add_edge(parent, child, LinkKind::Secondary);
        if petgraph::algo::is_cyclic_directed(&*links) {
            links.remove_edge(parent, child);
            return Err(RuntimeError::CycleDetected { parent, child });
        }
        Ok(())
    }

    /// Children reachable from `id` with the kind of link used
    #[must_use]
    pub fn linked_children(&self, id: ComponentId) -> Vec<(ComponentId, LinkKind)> {
        let links = self.links.read();
        if !links.contains_node(id) {
            return Vec::new();
        }
        links
            .edges(id)
            .map(|(_, child, kind)| (child, *kind))
            .collect()
    }

    /// Delete `id` and its primary subtree
    ///
    /// Annotations of the deleted elements are dropped after all internal
    /// locks are released.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::RootDeletion`] for the root and
    /// [`RuntimeError::ElementNotFound`] for unknown ids.
    pub fn delete(&self, id: ComponentId) -> Result<(), RuntimeError> {
        if id == self.root {
            return Err(RuntimeError::RootDeletion);
        }
        let _structure = self.structure_lock();
        let doomed = self.subtree(id);
        if doomed.is_empty() {
            return Err(RuntimeError::ElementNotFound(id));
        }
        {
            let mut elements = self.elements.write();
            if let Some(parent) = elements.get(&id).and_then(|e| e.parent) {
                if let Some(parent_entry) = elements.get_mut(&parent) {
                    parent_entry.children.retain(|c| *c != id);
                }
            }
            for element in &doomed {
                if let Some(entry) = elements.get_mut(element) {
                    entry.state = ElementState::Deleted;
                    entry.children.clear();
                    entry.component = None;
                    entry.port = None;
                }
            }
        }
        {
            let mut links = self.links.write();
            for element in &doomed {
                links.remove_node(*element);
            }
        }

        let keys: Vec<_> = self
            .annotations
            .iter()
            .filter(|a| doomed.contains(&a.key().0))
            .map(|a| *a.key())
            .collect();
        let dropped: Vec<Annotation> = keys
            .into_iter()
            .filter_map(|k| self.annotations.remove(&k).map(|(_, v)| v))
            .collect();
        drop(dropped);

        tracing::debug!(element = %id, removed = doomed.len(), "deleted element subtree");
        Ok(())
    }

    // ----- queries -----

    /// Element name
    #[must_use]
    pub fn name(&self, id: ComponentId) -> Option<String> {
        self.elements.read().get(&id).map(|e| e.name.clone())
    }

    /// Element kind
    #[must_use]
    pub fn kind(&self, id: ComponentId) -> Option<ElementKind> {
        self.elements.read().get(&id).map(|e| e.kind)
    }

    /// Lifecycle state
    #[must_use]
    pub fn state(&self, id: ComponentId) -> Option<ElementState> {
        self.elements.read().get(&id).map(|e| e.state)
    }

    /// Check if the element is initialized
    #[must_use]
    pub fn is_ready(&self, id: ComponentId) -> bool {
        self.state(id) == Some(ElementState::Ready)
    }

    /// Check if the element is deleted or unknown
    #[must_use]
    pub fn is_deleted(&self, id: ComponentId) -> bool {
        matches!(self.state(id), None | Some(ElementState::Deleted))
    }

    /// Check if the element is a data port
    #[must_use]
    pub fn is_port(&self, id: ComponentId) -> bool {
        self.kind(id) == Some(ElementKind::Port)
    }

    /// Primary parent; `None` for the root
    #[must_use]
    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.elements.read().get(&id).and_then(|e| e.parent)
    }

    /// Primary children in creation order
    #[must_use]
    pub fn children(&self, id: ComponentId) -> Vec<ComponentId> {
        self.elements
            .read()
            .get(&id)
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }

    /// First primary child called `name`
    #[must_use]
    pub fn find_child(&self, parent: ComponentId, name: &str) -> Option<ComponentId> {
        let elements = self.elements.read();
        elements.get(&parent).and_then(|p| {
            p.children
                .iter()
                .copied()
                .find(|c| elements.get(c).is_some_and(|e| e.name == name))
        })
    }

    /// Primary ancestors, nearest first, excluding `id`
    #[must_use]
    pub fn ancestors(&self, id: ComponentId) -> Vec<ComponentId> {
        let elements = self.elements.read();
        let mut out = Vec::new();
        let mut current = elements.get(&id).and_then(|e| e.parent);
        while let Some(ancestor) = current {
            out.push(ancestor);
            current = elements.get(&ancestor).and_then(|e| e.parent);
        }
        out
    }

    /// Nearest ancestor of the given kind, excluding `id`
    #[must_use]
    pub fn parent_with_kind(&self, id: ComponentId, kind: ElementKind) -> Option<ComponentId> {
        self.ancestors(id)
            .into_iter()
            .find(|a| self.kind(*a) == Some(kind))
    }

    /// `id` and all primary descendants, pre-order
    #[must_use]
    pub fn subtree(&self, id: ComponentId) -> Vec<ComponentId> {
        let elements = self.elements.read();
        let mut out = Vec::new();
        if !elements.contains_key(&id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(entry) = elements.get(&current) {
                stack.extend(entry.children.iter().rev().copied());
            }
        }
        out
    }

    /// Slash-separated names from the root down to `id`
    #[must_use]
    pub fn qualified_name(&self, id: ComponentId) -> String {
        let mut names: Vec<String> = self
            .ancestors(id)
            .into_iter()
            .rev()
            .filter_map(|a| self.name(a))
            .collect();
        names.extend(self.name(id));
        format!("/{}", names.join("/"))
    }

    /// Component hooks of the element, if any
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<Arc<dyn Component>> {
        self.elements.read().get(&id).and_then(|e| e.component.clone())
    }

    /// Data port of the element
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotAPort`] if the element has no port.
    pub fn port(&self, id: ComponentId) -> Result<Arc<DataPort>, RuntimeError> {
        let elements = self.elements.read();
        let entry = elements
            .get(&id)
            .ok_or(RuntimeError::ElementNotFound(id))?;
        entry
            .port
            .clone()
            .ok_or_else(|| RuntimeError::NotAPort(entry.name.clone()))
    }

    // ----- lifecycle -----

    /// Register an initialization observer
    pub fn add_init_listener(&self, listener: Arc<dyn InitializationListener>) {
        self.init_listeners.write().push(listener);
    }

    /// Initialize `id` and its primary subtree
    ///
    /// Every element still under construction has its component hook and
    /// the initialization listeners invoked, then becomes ready. Children
    /// are collected after their parent's hooks ran, so elements created by
    /// those hooks are initialized in the same pass.
    pub fn init(&self, id: ComponentId) {
        let _structure = self.structure_lock();
        self.init_element(id);
    }

    fn init_element(&self, id: ComponentId) {
        if self.state(id) == Some(ElementState::Constructing) {
            if let Some(component) = self.component(id) {
                component.on_initialize(self, id);
            }
            let listeners = self.init_listeners.read().clone();
            for listener in listeners {
                listener.on_element_initialized(self, id);
            }
            if let Some(entry) = self.elements.write().get_mut(&id) {
                if entry.state == ElementState::Constructing {
                    entry.state = ElementState::Ready;
                }
            }
        }
        for child in self.children(id) {
            if !self.is_deleted(child) {
                self.init_element(child);
            }
        }
    }

    // ----- annotations -----

    /// Attach `value` to `id`, replacing any annotation of the same type
    pub fn annotate<T: Any + Send + Sync>(&self, id: ComponentId, value: Arc<T>) -> Option<Arc<T>> {
        self.annotations
            .insert((id, TypeId::of::<T>()), value)
            .and_then(|old| old.downcast::<T>().ok())
    }

    /// Annotation of type `T` on `id`
    #[must_use]
    pub fn annotation<T: Any + Send + Sync>(&self, id: ComponentId) -> Option<Arc<T>> {
        let value = self
            .annotations
            .get(&(id, TypeId::of::<T>()))
            .map(|a| a.value().clone())?;
        value.downcast::<T>().ok()
    }

    /// Annotation of type `T` on `id`, created with `create` if missing
    pub fn annotation_or_insert_with<T, F>(&self, id: ComponentId, create: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let value = self
            .annotations
            .entry((id, TypeId::of::<T>()))
            .or_insert_with(|| Arc::new(create()))
            .value()
            .clone();
        match value.downcast::<T>() {
            Ok(typed) => typed,
            Err(_) => unreachable!("annotations are keyed by their type id"),
        }
    }

    /// Check if `id` carries an annotation of type `T`
    #[must_use]
    pub fn has_annotation<T: Any + Send + Sync>(&self, id: ComponentId) -> bool {
        self.annotations.contains_key(&(id, TypeId::of::<T>()))
    }

    /// Detach the annotation of type `T` from `id`
    pub fn remove_annotation<T: Any + Send + Sync>(&self, id: ComponentId) -> Option<Arc<T>> {
        self.annotations
            .remove(&(id, TypeId::of::<T>()))
            .and_then(|(_, v)| v.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("root", &self.root)
            .field("elements", &self.elements.read().len())
            .field("annotations", &self.annotations.len())
            .finish_non_exhaustive()
    }
}
