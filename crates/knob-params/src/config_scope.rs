//! Config scopes
//!
//! A [`ConfigScope`] annotates an element with a path fragment. Parameters
//! below it resolve relative config entries against the concatenation of
//! all fragments up to the nearest absolute one or the element carrying
//! the config file.

use std::sync::Arc;

use knob_runtime::{ComponentId, Runtime};
use knob_tree::ConfigPath;
use parking_lot::RwLock;

use crate::config_file::ConfigFile;
use crate::static_parameter::StaticParameterGroup;

/// Path fragment annotated on an element
#[derive(Debug)]
pub struct ConfigScope {
    fragment: RwLock<String>,
}

impl ConfigScope {
    fn new(fragment: &str) -> Self {
        Self {
            fragment: RwLock::new(fragment.to_string()),
        }
    }

    /// The fragment, absolute when it starts with `/`
    #[must_use]
    pub fn fragment(&self) -> String {
        self.fragment.read().clone()
    }

    /// Scope annotated on `element`
    #[must_use]
    pub fn of(runtime: &Runtime, element: ComponentId) -> Option<Arc<Self>> {
        runtime.annotation::<Self>(element)
    }

    /// Set the scope of `element`
    ///
    /// A changed scope re-runs static parameter evaluation of the subtree
    /// and, for a ready element, reloads runtime parameters from the config
    /// file.
    pub fn set(runtime: &Runtime, element: ComponentId, fragment: &str) {
        let _structure = runtime.structure_lock();
        match Self::of(runtime, element) {
            Some(scope) => {
                let mut current = scope.fragment.write();
                if *current == fragment {
                    return;
                }
                *current = fragment.to_string();
            }
            None => {
                runtime.annotate(element, Arc::new(Self::new(fragment)));
            }
        }
        tracing::debug!(
            element = %runtime.qualified_name(element),
            scope = fragment,
            "config scope set"
        );

        StaticParameterGroup::evaluate(runtime, element);

        if runtime.is_ready(element) {
            if let Some(file) = ConfigFile::find(runtime, element) {
                file.load_parameter_values_below(runtime, element);
            }
        }
    }

    /// Scope path that relative entries of `element` resolve against
    ///
    /// Empty when no config file is reachable from `element`.
    #[must_use]
    pub fn config_node(runtime: &Runtime, element: ComponentId) -> ConfigPath {
        let Some(file) = ConfigFile::find(runtime, element) else {
            return ConfigPath::default();
        };
        let file_element = file.element();

        let mut result = ConfigPath::default();
        let mut current = Some(element);
        while let Some(id) = current {
            if let Some(scope) = Self::of(runtime, id) {
                let fragment = ConfigPath::new(scope.fragment());
                if !fragment.is_empty() {
                    let mut prefix = fragment.clone();
                    if !prefix.has_trailing_separator() {
                        prefix = ConfigPath::new(format!("{prefix}/"));
                    }
                    result = ConfigPath::new(format!("{prefix}{result}"));
                    if fragment.is_absolute() {
                        return result;
                    }
                }
            }
            if Some(id) == file_element {
                return result;
            }
            current = runtime.parent(id);
        }
        result
    }

    /// Absolute form of `entry` for a parameter below `element`
    ///
    /// Absolute entries are returned unchanged.
    #[must_use]
    pub fn full_config_entry(runtime: &Runtime, element: ComponentId, entry: &str) -> String {
        if ConfigPath::new(entry).is_absolute() {
            return entry.to_string();
        }
        Self::config_node(runtime, element).join(entry).to_string()
    }
}
