//! Slash-separated config paths
//!
//! Provides [`ConfigPath`] for composing config entries from scope fragments.

use std::convert::Infallible;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Separator between path segments
pub const SEPARATOR: char = '/';

/// Path into a config document
///
/// Kept as the raw string so that absolute/relative form and trailing
/// separators survive composition unchanged.
///
/// # Examples
/// - `/root/a/b/x` → absolute, segments `["root", "a", "b", "x"]`
/// - `a/b/` → relative, segments `["a", "b"]`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigPath(String);

impl ConfigPath {
    /// Create path from its string form
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// String form
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the path is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if the path starts at the document root
    #[inline]
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.0.starts_with(SEPARATOR)
    }

    /// Check if the path ends with a separator
    #[inline]
    #[must_use]
    pub fn has_trailing_separator(&self) -> bool {
        self.0.ends_with(SEPARATOR)
    }

    /// Append `relative`, inserting a single separator unless this path
    /// already ends with one
    #[must_use]
    pub fn join(&self, relative: &str) -> Self {
        if self.0.is_empty() {
            return Self::new(relative);
        }
        let mut joined = self.0.clone();
        if !self.has_trailing_separator() {
            joined.push(SEPARATOR);
        }
        joined.push_str(relative);
        Self(joined)
    }

    /// Non-empty segments; repeated separators are skipped
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Last segment, if any
    #[must_use]
    pub fn last_segment(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Path without its last segment
    ///
    /// Returns `None` for a path with no segments. The parent of a
    /// single-segment absolute path is `/`.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.0.trim_end_matches(SEPARATOR);
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rfind(SEPARATOR) {
            Some(0) => Some(Self::new("/")),
            Some(idx) => Some(Self::new(trimmed[..idx].trim_end_matches(SEPARATOR))),
            None => Some(Self::default()),
        }
    }
}

impl Display for ConfigPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConfigPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for ConfigPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ConfigPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ConfigPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_inserts_single_separator() {
        assert_eq!(ConfigPath::new("/root").join("a/b").as_str(), "/root/a/b");
        assert_eq!(ConfigPath::new("/root/").join("x").as_str(), "/root/x");
        assert_eq!(ConfigPath::default().join("x").as_str(), "x");
    }

    #[test]
    fn test_segments_skip_repeated_separators() {
        let path = ConfigPath::new("/a//b/");
        assert!(path.is_absolute());
        assert_eq!(path.segments().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(path.last_segment(), Some("b"));
    }

    #[test]
    fn test_parent() {
        assert_eq!(ConfigPath::new("/a/b").parent(), Some(ConfigPath::new("/a")));
        assert_eq!(ConfigPath::new("/a").parent(), Some(ConfigPath::new("/")));
        assert_eq!(ConfigPath::new("a").parent(), Some(ConfigPath::default()));
        assert_eq!(ConfigPath::new("/").parent(), None);
    }
}
