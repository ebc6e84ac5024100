//! Runtime error types

use knob_value::ValueError;

use crate::element::ComponentId;

/// Errors raised by the component tree and its ports
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// No element with this id
    #[error("element not found: {0}")]
    ElementNotFound(ComponentId),

    /// Element was deleted
    #[error("element deleted: {0}")]
    ElementDeleted(ComponentId),

    /// Element is not a data port
    #[error("element '{0}' is not a port")]
    NotAPort(String),

    /// Link would close a cycle
    #[error("linking {child} below {parent} would create a cycle")]
    CycleDetected {
        /// Intended parent
        parent: ComponentId,
        /// Intended child
        child: ComponentId,
    },

    /// Root element cannot be removed
    #[error("the runtime root cannot be deleted")]
    RootDeletion,

    /// Published value has the wrong type
    #[error("port type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Port data type
        expected: String,
        /// Published data type
        actual: String,
    },

    /// Value rejected by the port's constraint
    #[error("value rejected: {0}")]
    Rejected(#[from] ValueError),
}
