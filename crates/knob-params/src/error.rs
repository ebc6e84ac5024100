//! Parameter error taxonomy

use knob_runtime::RuntimeError;
use knob_tree::TreeError;
use knob_value::{StreamError, ValueError};

/// Errors raised by parameter operations
///
/// Loading and evaluation log and isolate per-parameter failures; only
/// structural problems reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    /// Config entry, parameter or element absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Element or value of an unsupported type
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Type required
        expected: String,
        /// Type encountered
        actual: String,
    },

    /// Unusable input that could not be recovered
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Text could not be converted into the parameter type
    #[error("cannot load '{input}' from {origin}: {source}")]
    ParseFailure {
        /// Where the text came from (command line, config entry, default)
        origin: &'static str,
        /// Offending text
        input: String,
        /// Conversion error
        #[source]
        source: ValueError,
    },

    /// Backing store could not be read or written
    #[error("config file I/O: {0}")]
    Io(#[source] TreeError),

    /// Transferred parameter list does not fit the local one
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Value conversion error
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Binary stream error
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Config tree error
    #[error(transparent)]
    Tree(TreeError),

    /// Component tree error
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<TreeError> for ParameterError {
    fn from(error: TreeError) -> Self {
        match error {
            TreeError::Io { .. } => Self::Io(error),
            other => Self::Tree(other),
        }
    }
}
