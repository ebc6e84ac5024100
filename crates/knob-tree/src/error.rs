//! Error types for config tree access and persistence

use std::path::PathBuf;

/// Errors raised by [`ConfigTree`](crate::ConfigTree)
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// No entry at the given path
    #[error("config node not found: {0}")]
    NotFound(String),

    /// Entry exists but is a branch
    #[error("config node is no leaf: {0}")]
    NotALeaf(String),

    /// Backing store could not be read or written
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// File that was accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON document malformed
    #[error("JSON document error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML document malformed
    #[error("YAML document error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
