//! In-memory config document
//!
//! [`ConfigTree`] is an ordered element tree stored in an arena and
//! addressed by slash-separated entries:
//! - branches are `node` elements, leaves are `value` elements
//! - both carry a `name` attribute that forms one path segment
//! - other tags (e.g. embedded `parameter` elements) are never matched by paths

use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::document::{DocumentFormat, DocumentNode};
use crate::error::TreeError;
use crate::path::{ConfigPath, SEPARATOR};

/// Tag of branch elements
pub const BRANCH_TAG: &str = "node";

/// Tag of leaf elements
pub const LEAF_TAG: &str = "value";

/// Attribute holding an element's path segment
pub const NAME_ATTRIBUTE: &str = "name";

/// Handle to an element of one [`ConfigTree`]
///
/// Handles of removed elements stay invalid, even after their slot is
/// reused by a new element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attributes: IndexMap<String, String>,
    text: Option<String>,
    children: Vec<NodeRef>,
    parent: Option<NodeRef>,
}

impl Element {
    fn new(tag: &str, parent: Option<NodeRef>) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
            parent,
        }
    }

    fn is_addressable(&self) -> bool {
        self.tag == BRANCH_TAG || self.tag == LEAF_TAG
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    element: Option<Element>,
}

/// Ordered, slash-addressed element tree
#[derive(Debug, Clone)]
pub struct ConfigTree {
    nodes: Vec<Slot>,
    free: Vec<usize>,
    root: NodeRef,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTree {
    /// Empty tree with a `node` root
    #[must_use]
    pub fn new() -> Self {
        Self::with_root_tag(BRANCH_TAG)
    }

    /// Empty tree whose root element has the given tag
    #[must_use]
    pub fn with_root_tag(tag: &str) -> Self {
        Self {
            nodes: vec![Slot {
                generation: 0,
                element: Some(Element::new(tag, None)),
            }],
            free: Vec::new(),
            root: NodeRef {
                index: 0,
                generation: 0,
            },
        }
    }

    // ----- element access -----

    /// Root element
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeRef {
        self.root
    }

    fn element(&self, node: NodeRef) -> Option<&Element> {
        self.nodes
            .get(node.index)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.element.as_ref())
    }

    fn element_mut(&mut self, node: NodeRef) -> &mut Element {
        let element = self
            .nodes
            .get_mut(node.index)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.element.as_mut());
        match element {
            Some(element) => element,
            None => panic!("stale config node reference {node:?}"),
        }
    }

    /// Check if `node` refers to a live element
    #[inline]
    #[must_use]
    pub fn contains(&self, node: NodeRef) -> bool {
        self.element(node).is_some()
    }

    /// Number of live elements, root included
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.element.is_some()).count()
    }

    /// Check if the tree holds nothing but its root
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// Element tag
    #[must_use]
    pub fn tag(&self, node: NodeRef) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    /// Check if `node` is a `value` element
    #[must_use]
    pub fn is_leaf(&self, node: NodeRef) -> bool {
        self.tag(node) == Some(LEAF_TAG)
    }

    /// The `name` attribute
    #[must_use]
    pub fn name(&self, node: NodeRef) -> Option<&str> {
        self.attribute(node, NAME_ATTRIBUTE)
    }

    /// Attribute value
    #[must_use]
    pub fn attribute(&self, node: NodeRef, key: &str) -> Option<&str> {
        self.element(node)
            .and_then(|e| e.attributes.get(key))
            .map(String::as_str)
    }

    /// Check if an attribute is present
    #[must_use]
    pub fn has_attribute(&self, node: NodeRef, key: &str) -> bool {
        self.attribute(node, key).is_some()
    }

    /// All attributes in document order
    pub fn attributes(&self, node: NodeRef) -> impl Iterator<Item = (&str, &str)> {
        self.element(node)
            .into_iter()
            .flat_map(|e| e.attributes.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set an attribute, keeping its position if it already exists
    ///
    /// # Panics
    ///
    /// Panics if `node` was removed from the tree.
    pub fn set_attribute(&mut self, node: NodeRef, key: &str, value: impl Into<String>) {
        self.element_mut(node)
            .attributes
            .insert(key.to_string(), value.into());
    }

    /// Remove an attribute, returning its value
    ///
    /// # Panics
    ///
    /// Panics if `node` was removed from the tree.
    pub fn remove_attribute(&mut self, node: NodeRef, key: &str) -> Option<String> {
        self.element_mut(node).attributes.shift_remove(key)
    }

    /// Text content
    #[must_use]
    pub fn text(&self, node: NodeRef) -> Option<&str> {
        self.element(node).and_then(|e| e.text.as_deref())
    }

    /// Replace text content
    ///
    /// # Panics
    ///
    /// Panics if `node` was removed from the tree.
    pub fn set_text(&mut self, node: NodeRef, text: impl Into<String>) {
        self.element_mut(node).text = Some(text.into());
    }

    /// Children in document order
    #[must_use]
    pub fn children(&self, node: NodeRef) -> &[NodeRef] {
        self.element(node).map_or(&[], |e| e.children.as_slice())
    }

    /// Parent element; `None` for the root
    #[must_use]
    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.element(node).and_then(|e| e.parent)
    }

    /// Append a new child element
    ///
    /// # Panics
    ///
    /// Panics if `parent` was removed from the tree.
    pub fn add_child(&mut self, parent: NodeRef, tag: &str) -> NodeRef {
        let node = self.allocate(tag, parent);
        self.element_mut(parent).children.push(node);
        node
    }

    /// Append a new child element carrying a `name`
    ///
    /// # Panics
    ///
    /// Panics if `parent` was removed from the tree.
    pub fn add_named_child(&mut self, parent: NodeRef, tag: &str, name: &str) -> NodeRef {
        let node = self.add_child(parent, tag);
        self.set_attribute(node, NAME_ATTRIBUTE, name);
        node
    }

    /// Remove `child` and its subtree from `parent`
    ///
    /// Returns `false` if `child` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeRef, child: NodeRef) -> bool {
        let Some(index) = self.children(parent).iter().position(|c| *c == child) else {
            return false;
        };
        self.element_mut(parent).children.remove(index);
        self.release(child);
        true
    }

    /// Remove every child of `node`
    ///
    /// # Panics
    ///
    /// Panics if `node` was removed from the tree.
    pub fn clear_children(&mut self, node: NodeRef) {
        let children = std::mem::take(&mut self.element_mut(node).children);
        for child in children {
            self.release(child);
        }
    }

    fn allocate(&mut self, tag: &str, parent: NodeRef) -> NodeRef {
        let element = Some(Element::new(tag, Some(parent)));
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.nodes.get_mut(index) {
                slot.element = element;
                return NodeRef {
                    index,
                    generation: slot.generation,
                };
            }
        }
        self.nodes.push(Slot {
            generation: 0,
            element,
        });
        NodeRef {
            index: self.nodes.len() - 1,
            generation: 0,
        }
    }

    fn release(&mut self, node: NodeRef) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(slot) = self
                .nodes
                .get_mut(current.index)
                .filter(|slot| slot.generation == current.generation)
            else {
                continue;
            };
            if let Some(element) = slot.element.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(current.index);
                stack.extend(element.children);
            }
        }
    }

    /// Number of element slots, live and free
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Swap `old` for a fresh `tag` element with the same name at the same position
    fn replace_child(&mut self, old: NodeRef, tag: &str) -> NodeRef {
        let name = self.name(old).unwrap_or_default().to_string();
        let Some(parent) = self.parent(old) else {
            return old;
        };
        let fresh = self.allocate(tag, parent);
        self.set_attribute(fresh, NAME_ATTRIBUTE, name);
        let children = &mut self.element_mut(parent).children;
        if let Some(slot) = children.iter_mut().find(|c| **c == old) {
            *slot = fresh;
        }
        self.release(old);
        fresh
    }

    // ----- path addressing -----

    /// All elements matching `entry`, in document order
    ///
    /// A leading `/` is accepted. A trailing `/` and sequential separators
    /// are skipped once with a warning. Unnamed `node`/`value` elements are
    /// skipped.
    #[must_use]
    pub fn resolve(&self, entry: &str) -> Vec<NodeRef> {
        let entry = match entry.strip_suffix(SEPARATOR) {
            Some(trimmed) if !trimmed.is_empty() => {
                tracing::warn!(entry, "entry ends with a separator; ignoring it");
                trimmed
            }
            _ => entry,
        };
        let mut found = Vec::new();
        self.resolve_from(self.root, entry, 0, &mut found);
        found
    }

    fn resolve_from(&self, node: NodeRef, entry: &str, mut index: usize, found: &mut Vec<NodeRef>) {
        if index >= entry.len() {
            return;
        }
        if entry[index..].starts_with(SEPARATOR) {
            if index == 0 {
                tracing::debug!(entry, "skipping leading separator");
            } else {
                tracing::warn!(entry, "entry has sequential separators; skipping one");
            }
            index += 1;
        }

        let rest = &entry[index..];
        for &child in self.children(node) {
            let Some(element) = self.element(child) else {
                continue;
            };
            if !element.is_addressable() {
                continue;
            }
            let Some(name) = element.attributes.get(NAME_ATTRIBUTE) else {
                tracing::warn!(entry, "config node without name");
                continue;
            };
            let Some(after) = rest.strip_prefix(name.as_str()) else {
                continue;
            };
            if after.is_empty() {
                found.push(child);
            } else if after.starts_with(SEPARATOR) {
                self.resolve_from(child, entry, index + name.len() + 1, found);
            }
        }
    }

    /// First element matching `entry`; warns when the entry is ambiguous
    #[must_use]
    pub fn find_entry(&self, entry: &str) -> Option<NodeRef> {
        let found = self.resolve(entry);
        if found.len() > 1 {
            tracing::warn!(
                entry,
                matches = found.len(),
                "ambiguous config entry; using first match"
            );
        }
        found.first().copied()
    }

    /// Check if `entry` exists and is a leaf
    #[must_use]
    pub fn has_entry(&self, entry: &str) -> bool {
        self.find_entry(entry).is_some_and(|n| self.is_leaf(n))
    }

    /// Leaf at `entry`
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] if nothing matches and
    /// [`TreeError::NotALeaf`] if the match is a branch.
    pub fn get_entry(&self, entry: &str) -> Result<NodeRef, TreeError> {
        let node = self
            .find_entry(entry)
            .ok_or_else(|| TreeError::NotFound(entry.to_string()))?;
        if !self.is_leaf(node) {
            return Err(TreeError::NotALeaf(entry.to_string()));
        }
        Ok(node)
    }

    /// Fresh, empty leaf at `entry`
    ///
    /// An element already at `entry` is destroyed and replaced in place by a
    /// leaf with the same name; otherwise the entry is created.
    pub fn get_or_recreate_entry(&mut self, entry: &str) -> NodeRef {
        match self.find_entry(entry) {
            Some(existing) => self.replace_child(existing, LEAF_TAG),
            None => self.create_entry(entry, true),
        }
    }

    /// Create `entry` as leaf or branch
    ///
    /// Missing branches along the path are created, existing ones reused. A
    /// leaf replaces any same-named element at its position; a branch that
    /// already exists is returned as is.
    pub fn create_entry(&mut self, entry: &str, leaf: bool) -> NodeRef {
        if !leaf {
            if let Some(existing) = self.find_entry(entry) {
                return existing;
            }
        }

        let path = ConfigPath::new(entry);
        let segments: Vec<&str> = path.segments().collect();
        let Some((last, parents)) = segments.split_last() else {
            return self.root;
        };

        let mut parent = self.root;
        for segment in parents {
            parent = match self.named_child(parent, segment, Some(BRANCH_TAG)) {
                Some(branch) => branch,
                None => self.add_named_child(parent, BRANCH_TAG, segment),
            };
        }

        let tag = if leaf { LEAF_TAG } else { BRANCH_TAG };
        match self.named_child(parent, last, None) {
            Some(existing) => self.replace_child(existing, tag),
            None => self.add_named_child(parent, tag, last),
        }
    }

    fn named_child(&self, parent: NodeRef, name: &str, tag: Option<&str>) -> Option<NodeRef> {
        self.children(parent).iter().copied().find(|&c| {
            self.element(c).is_some_and(|e| {
                e.is_addressable()
                    && tag.map_or(true, |t| e.tag == t)
                    && e.attributes.get(NAME_ATTRIBUTE).map(String::as_str) == Some(name)
            })
        })
    }

    /// Text of the element at `entry`, or an empty string
    #[must_use]
    pub fn string_entry(&self, entry: &str) -> String {
        self.find_entry(entry)
            .and_then(|n| self.text(n))
            .unwrap_or_default()
            .to_string()
    }

    /// Absolute paths and texts of all leaves, in document order
    #[must_use]
    pub fn leaf_entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.collect_leaves(self.root, String::new(), &mut out);
        out
    }

    fn collect_leaves(&self, node: NodeRef, prefix: String, out: &mut Vec<(String, String)>) {
        for &child in self.children(node) {
            let Some(element) = self.element(child) else {
                continue;
            };
            let Some(name) = element.attributes.get(NAME_ATTRIBUTE) else {
                continue;
            };
            let path = format!("{prefix}/{name}");
            match element.tag.as_str() {
                LEAF_TAG => out.push((path, element.text.clone().unwrap_or_default())),
                BRANCH_TAG => self.collect_leaves(child, path, out),
                _ => {}
            }
        }
    }

    // ----- tree combination -----

    /// Deep-copy `source` from `other` as the last child of `parent`
    ///
    /// # Panics
    ///
    /// Panics if `parent` was removed from the tree.
    pub fn copy_subtree(
        &mut self,
        parent: NodeRef,
        other: &ConfigTree,
        source: NodeRef,
    ) -> NodeRef {
        let Some(element) = other.element(source) else {
            return parent;
        };
        let node = self.add_child(parent, &element.tag);
        {
            let target = self.element_mut(node);
            target.attributes.clone_from(&element.attributes);
            target.text.clone_from(&element.text);
        }
        for &child in &element.children {
            self.copy_subtree(node, other, child);
        }
        node
    }

    /// Merge the top-level elements of `other` into this tree
    ///
    /// Branches with an equal name merge recursively, a leaf with an equal
    /// name is replaced by the incoming one, everything else is appended.
    pub fn merge_append(&mut self, other: &ConfigTree) {
        self.merge_children(self.root, other, other.root);
    }

    fn merge_children(&mut self, target: NodeRef, other: &ConfigTree, source: NodeRef) {
        for &child in other.children(source) {
            let Some(element) = other.element(child) else {
                continue;
            };
            let existing = element
                .attributes
                .get(NAME_ATTRIBUTE)
                .filter(|_| element.is_addressable())
                .and_then(|name| self.named_child(target, name, Some(element.tag.as_str())));

            match existing {
                Some(branch) if element.tag == BRANCH_TAG => {
                    self.merge_children(branch, other, child);
                }
                Some(leaf) => {
                    let copy = self.copy_subtree(target, other, child);
                    let children = &mut self.element_mut(target).children;
                    children.pop();
                    if let Some(slot) = children.iter_mut().find(|c| **c == leaf) {
                        *slot = copy;
                    }
                    self.release(leaf);
                }
                None => {
                    self.copy_subtree(target, other, child);
                }
            }
        }
    }

    // ----- persistence -----

    /// Convert to the serializable form
    #[must_use]
    pub fn to_document(&self) -> DocumentNode {
        self.node_to_document(self.root)
    }

    fn node_to_document(&self, node: NodeRef) -> DocumentNode {
        let Some(element) = self.element(node) else {
            return DocumentNode::new(BRANCH_TAG);
        };
        DocumentNode {
            tag: element.tag.clone(),
            attributes: element.attributes.clone(),
            text: element.text.clone(),
            children: element
                .children
                .iter()
                .map(|c| self.node_to_document(*c))
                .collect(),
        }
    }

    /// Build a tree from the serializable form
    #[must_use]
    pub fn from_document(document: &DocumentNode) -> Self {
        if document.tag != BRANCH_TAG {
            tracing::warn!(
                tag = %document.tag,
                "config document root is not a '{BRANCH_TAG}' element"
            );
        }
        let mut tree = Self::with_root_tag(&document.tag);
        let root = tree.root;
        {
            let element = tree.element_mut(root);
            element.attributes.clone_from(&document.attributes);
            element.text.clone_from(&document.text);
        }
        for child in &document.children {
            tree.append_document(root, child);
        }
        tree
    }

    fn append_document(&mut self, parent: NodeRef, document: &DocumentNode) {
        let node = self.add_child(parent, &document.tag);
        {
            let element = self.element_mut(node);
            element.attributes.clone_from(&document.attributes);
            element.text.clone_from(&document.text);
        }
        for child in &document.children {
            self.append_document(node, child);
        }
    }

    /// Subtree rooted at `node` as serializable form
    #[must_use]
    pub fn subtree_document(&self, node: NodeRef) -> DocumentNode {
        self.node_to_document(node)
    }

    /// Encode the whole tree as text
    ///
    /// # Errors
    ///
    /// Returns a format error if encoding fails.
    pub fn to_document_string(&self, format: DocumentFormat) -> Result<String, TreeError> {
        format.encode(&self.to_document())
    }

    /// Decode a tree from text
    ///
    /// # Errors
    ///
    /// Returns a format error for malformed input.
    pub fn from_document_str(text: &str, format: DocumentFormat) -> Result<Self, TreeError> {
        Ok(Self::from_document(&format.decode(text)?))
    }

    /// Load from a backing store; format by file extension
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Io`] if the file cannot be read, or a format
    /// error for malformed content.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TreeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tree = Self::from_document_str(&text, DocumentFormat::from_path(path))?;
        tracing::debug!(path = %path.display(), elements = tree.len(), "loaded config document");
        Ok(tree)
    }

    /// Write to a backing store; format by file extension
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Io`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TreeError> {
        let path = path.as_ref();
        let text = self.to_document_string(DocumentFormat::from_path(path))?;
        fs::write(path, text).map_err(|source| TreeError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigTree {
        let mut tree = ConfigTree::new();
        let a = tree.create_entry("/a", false);
        let b = tree.add_named_child(a, LEAF_TAG, "b");
        tree.set_text(b, "1");
        tree.create_entry("/a/c/d", true);
        tree
    }

    #[test]
    fn test_resolve_absolute_and_relative() {
        let tree = sample();
        assert_eq!(tree.resolve("/a/b"), tree.resolve("a/b"));
        assert_eq!(tree.resolve("a/b").len(), 1);
        assert!(tree.resolve("a/bb").is_empty());
        assert!(tree.resolve("").is_empty());
    }

    #[test]
    fn test_sequential_separators_are_tolerated() {
        let tree = sample();
        assert_eq!(tree.string_entry("a//b"), "1");
        assert!(tree.has_entry("/a/c/d"));
    }

    #[test]
    fn test_prefix_must_end_at_segment_boundary() {
        let mut tree = ConfigTree::new();
        tree.create_entry("ab", true);
        assert!(tree.find_entry("a").is_none());
        assert!(tree.find_entry("ab").is_some());
    }

    #[test]
    fn test_ambiguous_entry_collects_all_matches() {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let first = tree.add_named_child(root, BRANCH_TAG, "x");
        let second = tree.add_named_child(root, BRANCH_TAG, "x");
        let y1 = tree.add_named_child(first, LEAF_TAG, "y");
        let y2 = tree.add_named_child(second, LEAF_TAG, "y");
        assert_eq!(tree.resolve("x/y"), vec![y1, y2]);
        assert_eq!(tree.find_entry("x/y"), Some(y1));
    }

    #[test]
    fn test_unnamed_and_foreign_elements_are_skipped() {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        tree.add_child(root, BRANCH_TAG);
        let foreign = tree.add_child(root, "parameter");
        tree.set_attribute(foreign, NAME_ATTRIBUTE, "p");
        assert!(tree.find_entry("p").is_none());
    }

    #[test]
    fn test_trailing_separator_addresses_created_leaf() {
        let mut tree = ConfigTree::new();
        let created = tree.create_entry("a/b/", true);
        assert_eq!(tree.name(created), Some("b"));
        assert_eq!(tree.get_entry("a/b/").ok(), Some(created));
        assert!(tree.has_entry("/a/b/"));
        assert!(tree.resolve("/").is_empty());
    }

    #[test]
    fn test_recreate_reuses_released_slots() {
        let mut tree = sample();
        tree.get_or_recreate_entry("/a/b");
        let slots = tree.capacity();
        for _ in 0..10 {
            let leaf = tree.get_or_recreate_entry("/a/b");
            tree.set_text(leaf, "2");
        }
        assert_eq!(tree.capacity(), slots);
        assert_eq!(tree.string_entry("/a/b"), "2");
    }

    #[test]
    fn test_stale_ref_does_not_reach_reused_slot() {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let old = tree.add_named_child(root, LEAF_TAG, "old");
        assert!(tree.remove_child(root, old));
        let fresh = tree.add_named_child(root, LEAF_TAG, "fresh");

        assert_ne!(old, fresh);
        assert!(!tree.contains(old));
        assert_eq!(tree.name(old), None);
        assert_eq!(tree.name(fresh), Some("fresh"));
    }

    #[test]
    fn test_get_entry_errors() {
        let tree = sample();
        assert!(matches!(tree.get_entry("/a"), Err(TreeError::NotALeaf(_))));
        assert!(matches!(tree.get_entry("/zz"), Err(TreeError::NotFound(_))));
        assert!(tree.get_entry("/a/b").is_ok());
    }

    #[test]
    fn test_recreate_replaces_in_place() {
        let mut tree = sample();
        let before = tree.get_entry("/a/b").unwrap();
        let a = tree.find_entry("/a").unwrap();
        let fresh = tree.get_or_recreate_entry("/a/b");
        assert_ne!(before, fresh);
        assert!(!tree.contains(before));
        assert_eq!(tree.children(a)[0], fresh);
        assert_eq!(tree.name(fresh), Some("b"));
        assert_eq!(tree.text(fresh), None);
    }

    #[test]
    fn test_recreate_turns_branch_into_leaf() {
        let mut tree = sample();
        let leaf = tree.get_or_recreate_entry("/a/c");
        assert!(tree.is_leaf(leaf));
        assert!(tree.find_entry("/a/c/d").is_none());
    }

    #[test]
    fn test_create_branch_returns_existing() {
        let mut tree = sample();
        let a = tree.find_entry("/a").unwrap();
        assert_eq!(tree.create_entry("a", false), a);
    }

    #[test]
    fn test_merge_append() {
        let mut base = sample();
        let mut other = ConfigTree::new();
        let b = other.create_entry("/a/b", true);
        other.set_text(b, "2");
        let e = other.create_entry("/a/e", true);
        other.set_text(e, "3");
        other.create_entry("/f", true);

        base.merge_append(&other);
        assert_eq!(base.string_entry("/a/b"), "2");
        assert_eq!(base.string_entry("/a/e"), "3");
        assert!(base.has_entry("/a/c/d"));
        assert!(base.has_entry("/f"));
        assert_eq!(base.resolve("/a/b").len(), 1);
    }

    #[test]
    fn test_leaf_entries_lists_paths() {
        let tree = sample();
        assert_eq!(
            tree.leaf_entries(),
            vec![
                ("/a/b".to_string(), "1".to_string()),
                ("/a/c/d".to_string(), String::new())
            ]
        );
    }

    #[test]
    fn test_document_roundtrip_preserves_order() {
        let tree = sample();
        let text = tree.to_document_string(DocumentFormat::Json).unwrap();
        let back = ConfigTree::from_document_str(&text, DocumentFormat::Json).unwrap();
        assert_eq!(back.to_document(), tree.to_document());
    }
}
