//! Configurable plugins
//!
//! Plugins declare runtime parameters before any element exists for them.
//! Registration with a [`PluginHost`] happens in two phases:
//! 1. [`ConfigurablePlugin::declare_parameters`] returns pending handles
//! 2. the host creates `Settings/<plugin>` with scope
//!    `/Runtime/Plugins/<plugin>`, materializes every pending parameter,
//!    seeds values from the plugin config file, initializes the element and
//!    hands the plugin its config section

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use knob_runtime::{ComponentId, ElementKind, Runtime};
use knob_tree::{ConfigTree, SEPARATOR};
use knob_value::ParameterValue;

use crate::config_file::ConfigFile;
use crate::config_scope::ConfigScope;
use crate::error::ParameterError;
use crate::parameter::{Parameter, ParameterSpec};
use crate::parameter_info::ParameterInfo;
use crate::static_parameter::StaticParameterGroup;

/// Config scope below which plugin settings live
pub const PLUGINS_SCOPE: &str = "/Runtime/Plugins";

struct Materialized {
    element: ComponentId,
    name: String,
    entry: String,
}

trait PendingParameter: Send + Sync {
    fn materialize_erased(
        &self,
        runtime: &Runtime,
        parent: ComponentId,
    ) -> Result<Materialized, ParameterError>;
}

/// Parameter declared by a plugin, created on registration
pub struct PendingHandle<T: ParameterValue> {
    spec: ParameterSpec<T>,
    live: Arc<OnceLock<Parameter<T>>>,
}

impl<T: ParameterValue> Clone for PendingHandle<T> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            live: self.live.clone(),
        }
    }
}

impl<T: ParameterValue> PendingHandle<T> {
    /// Declared parameter
    #[inline]
    #[must_use]
    pub fn spec(&self) -> &ParameterSpec<T> {
        &self.spec
    }

    /// Create the parameter below `parent`; later calls return it again
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Runtime`] for an unusable parent.
    pub fn materialize(
        &self,
        runtime: &Runtime,
        parent: ComponentId,
    ) -> Result<Parameter<T>, ParameterError> {
        if let Some(live) = self.live.get() {
            return Ok(live.clone());
        }
        let parameter = Parameter::create(runtime, parent, &self.spec)?;
        Ok(self.live.get_or_init(|| parameter).clone())
    }

    /// The parameter, once materialized
    #[must_use]
    pub fn live(&self) -> Option<Parameter<T>> {
        self.live.get().cloned()
    }

    /// Check if the parameter was materialized
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.get().is_some()
    }
}

impl<T: ParameterValue> PendingParameter for PendingHandle<T> {
    fn materialize_erased(
        &self,
        runtime: &Runtime,
        parent: ComponentId,
    ) -> Result<Materialized, ParameterError> {
        let parameter = self.materialize(runtime, parent)?;
        Ok(Materialized {
            element: parameter.element(),
            name: self.spec.name().to_string(),
            entry: self.spec.entry().to_string(),
        })
    }
}

/// Parameters declared by one plugin
#[derive(Default)]
pub struct PluginParameters {
    pending: Vec<Box<dyn PendingParameter>>,
}

impl PluginParameters {
    /// Empty declaration list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a runtime parameter
    pub fn declare<T: ParameterValue>(&mut self, spec: ParameterSpec<T>) -> PendingHandle<T> {
        let handle = PendingHandle {
            spec,
            live: Arc::new(OnceLock::new()),
        };
        self.pending.push(Box::new(handle.clone()));
        handle
    }

    /// Number of declared parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing was declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn materialize_all(
        &self,
        runtime: &Runtime,
        parent: ComponentId,
    ) -> Result<Vec<Materialized>, ParameterError> {
        self.pending
            .iter()
            .map(|p| p.materialize_erased(runtime, parent))
            .collect()
    }
}

impl std::fmt::Debug for PluginParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginParameters")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Plugin with runtime parameters
pub trait ConfigurablePlugin: Send + Sync {
    /// Unique plugin name
    fn name(&self) -> &str;

    /// Declare the plugin's parameters
    fn declare_parameters(&self, parameters: &mut PluginParameters);

    /// Parameters are live; `config` is the plugin's config section, if any
    fn initialize(&self, runtime: &Runtime, config: Option<&ConfigTree>) {
        let _ = (runtime, config);
    }
}

/// Plugin host configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginConfig {
    /// Config document with one section per plugin
    pub file: Option<PathBuf>,
}

impl PluginConfig {
    /// Configuration without plugin file
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration reading plugin settings from `file`
    #[must_use]
    pub fn with_file(file: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(file.into()),
        }
    }
}

/// Registers plugins and wires up their parameters
#[derive(Debug)]
pub struct PluginHost {
    config: PluginConfig,
    tree: Option<ConfigTree>,
    registered: Vec<String>,
}

impl PluginHost {
    /// Host reading plugin settings as configured
    ///
    /// An unreadable plugin file is logged and ignored.
    #[must_use]
    pub fn new(config: PluginConfig) -> Self {
        let tree = config.file.as_ref().and_then(|path| match ConfigTree::load(path) {
            Ok(tree) => Some(tree),
            Err(e) => {
                tracing::error!(
                    file = %path.display(),
                    error = %e,
                    "cannot load plugin config file"
                );
                None
            }
        });
        Self {
            config,
            tree,
            registered: Vec::new(),
        }
    }

    /// Host configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Names of registered plugins in registration order
    #[must_use]
    pub fn plugins(&self) -> &[String] {
        &self.registered
    }

    /// Register `plugin`, returning its settings element
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Runtime`] if the settings element or a
    /// parameter port cannot be created.
    pub fn register(
        &mut self,
        runtime: &Runtime,
        plugin: &dyn ConfigurablePlugin,
    ) -> Result<ComponentId, ParameterError> {
        let name = plugin.name().to_string();
        let element = runtime.create_element(runtime.settings(), &name, ElementKind::Group, None)?;
        ConfigScope::set(runtime, element, &format!("{PLUGINS_SCOPE}/{name}"));

        let mut parameters = PluginParameters::new();
        plugin.declare_parameters(&mut parameters);
        let created = parameters.materialize_all(runtime, element)?;
        if let Some(tree) = &self.tree {
            for parameter in &created {
                self.seed(runtime, tree, &name, parameter)?;
            }
        }

        runtime.init(element);
        StaticParameterGroup::evaluate(runtime, element);

        let section = Self::config_section(runtime, element)
            .or_else(|| self.tree.as_ref().and_then(|t| Self::section_of(t, &name)));
        plugin.initialize(runtime, section.as_ref());

        tracing::info!(plugin = %name, parameters = created.len(), "registered plugin");
        self.registered.push(name);
        Ok(element)
    }

    fn seed(
        &self,
        runtime: &Runtime,
        tree: &ConfigTree,
        plugin: &str,
        parameter: &Materialized,
    ) -> Result<(), ParameterError> {
        let key = if parameter.entry.is_empty() {
            &parameter.name
        } else {
            &parameter.entry
        };
        let path = format!("{plugin}{SEPARATOR}{key}");
        if !tree.has_entry(&path) {
            return Ok(());
        }
        let text = tree.string_entry(&path);
        let port = runtime.port(parameter.element)?;
        let mut value = port.unused_buffer();
        if let Err(e) = value.set_text(&text) {
            tracing::error!(plugin, entry = %path, error = %e, "cannot parse plugin setting");
            return Ok(());
        }
        port.publish(value)?;
        if let Some(info) = ParameterInfo::of(runtime, parameter.element) {
            info.set_config_entry(runtime, "", false);
        }
        Ok(())
    }

    fn config_section(runtime: &Runtime, element: ComponentId) -> Option<ConfigTree> {
        let file = ConfigFile::find(runtime, element)?;
        let node = ConfigScope::config_node(runtime, element);
        let path = node.as_str().trim_end_matches(SEPARATOR);
        file.with_tree(|t| Self::section_of(t, path))
    }

    fn section_of(tree: &ConfigTree, path: &str) -> Option<ConfigTree> {
        tree.find_entry(path)
            .filter(|n| !tree.is_leaf(*n))
            .map(|n| ConfigTree::from_document(&tree.subtree_document(n)))
    }
}
