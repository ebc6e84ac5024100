//! Element identity, kinds and the hooks components implement

use std::fmt::{self, Display, Formatter};

use uuid::Uuid;

use crate::runtime::Runtime;

/// Identity of an element in the component tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub Uuid);

impl ComponentId {
    /// Fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ComponentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// What an element is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Plain container
    Group,

    /// Group edited by the structuring tool; scopes outer parameter
    /// attachment and config-file responsibility
    StructuringGroup,

    /// Data-processing component
    Module,

    /// Data port holding a single value
    Port,
}

/// Lifecycle state of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementState {
    /// Created, not yet initialized
    Constructing,

    /// Initialized
    Ready,

    /// Removed from the tree
    Deleted,
}

/// Kind of a parent to child link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Structural ownership; every element but the root has exactly one
    Primary,

    /// Additional alias
    Secondary,
}

/// Hooks a component exposes to the runtime
pub trait Component: Send + Sync {
    /// Static parameters of this component changed; re-derive its structure
    fn on_static_parameter_change(&self, runtime: &Runtime, id: ComponentId) {
        let _ = (runtime, id);
    }

    /// Element is being initialized; must tolerate being called again after
    /// static parameter changes
    fn on_initialize(&self, runtime: &Runtime, id: ComponentId) {
        let _ = (runtime, id);
    }
}

/// Observer of element initialization
pub trait InitializationListener: Send + Sync {
    /// `id` was initialized and is about to become ready
    fn on_element_initialized(&self, runtime: &Runtime, id: ComponentId);
}
