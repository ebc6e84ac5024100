//! Config files
//!
//! A [`ConfigFile`] is annotated on an element and serves every parameter
//! below it:
//! - lookup walks the element and its primary ancestors for an active file
//! - loading pushes entries into runtime parameters of a subtree
//! - saving writes the current parameter values back and persists the tree

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use knob_runtime::{ComponentId, Runtime};
use knob_tree::{ConfigTree, DocumentFormat, NodeRef, SEPARATOR};
use knob_value::{InputStream, OutputStream};
use parking_lot::RwLock;

use crate::error::ParameterError;
use crate::parameter_info::ParameterInfo;

/// Config document backing the parameters of a subtree
#[derive(Debug)]
pub struct ConfigFile {
    element: Option<ComponentId>,
    tree: RwLock<ConfigTree>,
    filename: RwLock<String>,
    active: AtomicBool,
}

impl ConfigFile {
    /// Active file with an empty tree and no filename
    #[must_use]
    pub fn empty() -> Self {
        Self {
            element: None,
            tree: RwLock::new(ConfigTree::new()),
            filename: RwLock::new(String::new()),
            active: AtomicBool::new(true),
        }
    }

    /// Active file loaded from `filename`
    ///
    /// A file that cannot be read or parsed is logged and yields an empty
    /// tree; the filename is kept for saving.
    #[must_use]
    pub fn open(filename: &str) -> Self {
        let tree = match ConfigTree::load(filename) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::error!(
                    file = filename,
                    error = %e,
                    "cannot load config file; starting empty"
                );
                ConfigTree::new()
            }
        };
        Self {
            element: None,
            tree: RwLock::new(tree),
            filename: RwLock::new(filename.to_string()),
            active: AtomicBool::new(true),
        }
    }

    /// Annotate `element` with this file
    pub fn attach(mut self, runtime: &Runtime, element: ComponentId) -> Arc<Self> {
        self.element = Some(element);
        let file = Arc::new(self);
        runtime.annotate(element, file.clone());
        tracing::debug!(
            element = %runtime.qualified_name(element),
            file = %file.filename(),
            "attached config file"
        );
        file
    }

    /// Nearest active file on `element` or its primary ancestors
    #[must_use]
    pub fn find(runtime: &Runtime, element: ComponentId) -> Option<Arc<Self>> {
        std::iter::once(element)
            .chain(runtime.ancestors(element))
            .filter_map(|id| runtime.annotation::<Self>(id))
            .find(|file| file.is_active())
    }

    /// Element the file is annotated on
    #[inline]
    #[must_use]
    pub fn element(&self) -> Option<ComponentId> {
        self.element
    }

    fn is_found_from(&self, runtime: &Runtime, element: ComponentId) -> bool {
        Self::find(runtime, element).is_some_and(|found| std::ptr::eq(Arc::as_ptr(&found), self))
    }

    // ----- state -----

    /// Check if the file participates in lookup
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Enable or disable the file for lookup
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Current filename; empty for an unnamed file
    #[must_use]
    pub fn filename(&self) -> String {
        self.filename.read().clone()
    }

    // ----- tree access -----

    /// Check if `entry` exists and is a leaf
    #[must_use]
    pub fn has_entry(&self, entry: &str) -> bool {
        self.tree.read().has_entry(entry)
    }

    /// Text at `entry`, or an empty string
    #[must_use]
    pub fn string_entry(&self, entry: &str) -> String {
        self.tree.read().string_entry(entry)
    }

    /// Leaf at `entry`
    ///
    /// With `create`, any element at `entry` is replaced by an empty leaf
    /// of the same name, creating missing branches.
    ///
    /// # Errors
    ///
    /// Without `create`, returns [`ParameterError::Tree`] for a missing
    /// entry or a branch.
    pub fn get_entry(&self, entry: &str, create: bool) -> Result<NodeRef, ParameterError> {
        if create {
            return Ok(self.tree.write().get_or_recreate_entry(entry));
        }
        Ok(self.tree.read().get_entry(entry)?)
    }

    /// Create `entry` as leaf or branch
    pub fn create_entry(&self, entry: &str, leaf: bool) -> NodeRef {
        self.tree.write().create_entry(entry, leaf)
    }

    /// Read access to the tree
    pub fn with_tree<R>(&self, f: impl FnOnce(&ConfigTree) -> R) -> R {
        f(&self.tree.read())
    }

    /// Write access to the tree
    pub fn with_tree_mut<R>(&self, f: impl FnOnce(&mut ConfigTree) -> R) -> R {
        f(&mut self.tree.write())
    }

    /// Merge `other` into this file's tree
    pub fn append_tree(&self, other: &ConfigTree) {
        self.tree.write().merge_append(other);
    }

    // ----- parameters -----

    fn served_ports(
        &self,
        runtime: &Runtime,
        element: ComponentId,
    ) -> Vec<(ComponentId, Arc<ParameterInfo>)> {
        runtime
            .subtree(element)
            .into_iter()
            .filter(|id| runtime.is_port(*id) && runtime.is_ready(*id))
            .filter(|id| self.is_found_from(runtime, *id))
            .filter_map(|id| ParameterInfo::of(runtime, id).map(|info| (id, info)))
            .collect()
    }

    /// Reload every runtime parameter served by this file
    pub fn load_parameter_values(&self, runtime: &Runtime) {
        if let Some(element) = self.element {
            self.load_parameter_values_below(runtime, element);
        }
    }

    /// Reload runtime parameters below `element` served by this file
    ///
    /// Failures are logged per parameter.
    pub fn load_parameter_values_below(&self, runtime: &Runtime, element: ComponentId) {
        let _structure = runtime.structure_lock();
        for (id, info) in self.served_ports(runtime, element) {
            if let Err(e) = info.load_value(runtime, false) {
                tracing::error!(
                    parameter = %runtime.qualified_name(id),
                    error = %e,
                    "loading parameter value failed"
                );
            }
        }
    }

    /// Write current parameter values into the tree and persist it
    ///
    /// With `new_filename` the file is renamed first. If the target cannot
    /// be written, the filename with separators replaced by `_` is used in
    /// the working directory instead.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] for an unnamed, unattached file
    /// and [`ParameterError::Io`] if neither location can be written.
    pub fn save_file(
        &self,
        runtime: &Runtime,
        new_filename: Option<&str>,
    ) -> Result<PathBuf, ParameterError> {
        let _structure = runtime.structure_lock();
        if let Some(name) = new_filename {
            *self.filename.write() = name.to_string();
        }
        let filename = self.filename();
        if filename.is_empty() {
            return Err(ParameterError::NotFound("config file has no filename".to_string()));
        }

        if let Some(element) = self.element {
            for (id, info) in self.served_ports(runtime, element) {
                if let Err(e) = info.save_value(runtime, self) {
                    tracing::error!(
                        parameter = %runtime.qualified_name(id),
                        error = %e,
                        "saving parameter value failed"
                    );
                }
            }
        }

        let tree = self.tree.read();
        let target = PathBuf::from(&filename);
        match tree.save(&target) {
            Ok(()) => {
                tracing::info!(file = %target.display(), "saved config file");
                Ok(target)
            }
            Err(e) => {
                let fallback = PathBuf::from(filename.replace(SEPARATOR, "_"));
                tracing::error!(
                    file = %target.display(),
                    fallback = %fallback.display(),
                    error = %e,
                    "cannot write config file; saving to working directory"
                );
                tree.save(&fallback)?;
                Ok(fallback)
            }
        }
    }

    // ----- stream form -----

    /// Write active flag, filename and tree content
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Tree`] if the tree cannot be encoded.
    pub fn write_to(&self, out: &mut OutputStream) -> Result<(), ParameterError> {
        out.write_bool(self.is_active());
        out.write_string(&self.filename());
        let content = self.tree.read().to_document_string(DocumentFormat::Json)?;
        out.write_string(&content);
        Ok(())
    }

    /// Apply a transferred file state
    ///
    /// Without content, a changed filename reloads the tree from that file;
    /// otherwise the content replaces the tree.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Stream`] for a truncated stream and
    /// [`ParameterError::Tree`] for unparsable content.
    pub fn read_from(&self, input: &mut InputStream) -> Result<(), ParameterError> {
        let active = input.read_bool()?;
        let filename = input.read_string()?;
        let content = input.read_string()?;
        self.set_active(active);

        if content.is_empty() {
            if filename != self.filename() {
                *self.tree.write() = match ConfigTree::load(Path::new(&filename)) {
                    Ok(tree) => tree,
                    Err(e) => {
                        tracing::error!(
                            file = %filename,
                            error = %e,
                            "cannot load config file; starting empty"
                        );
                        ConfigTree::new()
                    }
                };
            }
        } else {
            *self.tree.write() = ConfigTree::from_document_str(&content, DocumentFormat::Json)?;
        }
        *self.filename.write() = filename;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knob_runtime::ElementKind;

    #[test]
    fn test_find_skips_inactive_files() {
        let rt = Runtime::new();
        let group = rt.create_element(rt.root(), "g", ElementKind::Group, None).unwrap();
        let outer = ConfigFile::empty().attach(&rt, rt.root());
        let inner = ConfigFile::empty().attach(&rt, group);

        assert!(Arc::ptr_eq(&ConfigFile::find(&rt, group).unwrap(), &inner));
        inner.set_active(false);
        assert!(Arc::ptr_eq(&ConfigFile::find(&rt, group).unwrap(), &outer));
    }

    #[test]
    fn test_get_entry_create_recreates_leaf() {
        let file = ConfigFile::empty();
        let node = file.create_entry("a/b", false);
        file.with_tree_mut(|t| {
            let child = t.add_named_child(node, "value", "c");
            t.set_text(child, "1");
        });
        assert!(file.get_entry("a/b", false).is_err());

        let leaf = file.get_entry("a/b", true).unwrap();
        file.with_tree(|t| {
            assert!(t.is_leaf(leaf));
            assert_eq!(t.name(leaf), Some("b"));
        });
        assert!(file.has_entry("/a/b"));
    }

    #[test]
    fn test_stream_form_transfers_content() {
        let source = ConfigFile::empty();
        let leaf = source.create_entry("x/y", true);
        source.with_tree_mut(|t| t.set_text(leaf, "42"));

        let mut out = OutputStream::new();
        source.write_to(&mut out).unwrap();

        let target = ConfigFile::empty();
        target.read_from(&mut InputStream::from(out)).unwrap();
        assert_eq!(target.string_entry("x/y"), "42");
        assert!(target.is_active());
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let file = ConfigFile::open("/definitely/not/here.json");
        assert_eq!(file.filename(), "/definitely/not/here.json");
        assert!(file.with_tree(|t| t.children(t.root()).is_empty()));
    }
}
