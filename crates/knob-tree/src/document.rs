//! Serialized form of a config tree

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// One element of a persisted config document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNode {
    /// Element tag (`node`, `value`, `parameter`, ...)
    pub tag: String,

    /// Attributes in document order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, String>,

    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Child elements in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    /// Element without attributes, text or children
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
        }
    }
}

/// Text encoding of a persisted document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    /// Pretty-printed JSON
    #[default]
    Json,

    /// YAML
    Yaml,
}

impl DocumentFormat {
    /// Format implied by the file extension; JSON unless `.yaml`/`.yml`
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }

    pub(crate) fn encode(self, node: &DocumentNode) -> Result<String, TreeError> {
        Ok(match self {
            Self::Json => serde_json::to_string_pretty(node)?,
            Self::Yaml => serde_yaml::to_string(node)?,
        })
    }

    pub(crate) fn decode(self, text: &str) -> Result<DocumentNode, TreeError> {
        Ok(match self {
            Self::Json => serde_json::from_str(text)?,
            Self::Yaml => serde_yaml::from_str(text)?,
        })
    }
}
