//! Testing utilities for knob workspace
//!
//! Shared runtime fixtures, recording components and config documents.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use knob_runtime::{CommandLine, Component, ComponentId, ElementKind, Runtime, RuntimeConfig};
use knob_tree::ConfigTree;
use tempfile::TempDir;

type Hook = Box<dyn Fn(&Runtime, ComponentId) + Send + Sync>;

/// Component counting its hook invocations
#[derive(Default)]
pub struct RecordingComponent {
    reconfigurations: AtomicUsize,
    initializations: AtomicUsize,
    on_reconfigure: Option<Hook>,
}

impl RecordingComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` on every reconfiguration, after counting it
    pub fn with_reconfigure_hook(
        hook: impl Fn(&Runtime, ComponentId) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_reconfigure: Some(Box::new(hook)),
            ..Self::default()
        }
    }

    pub fn reconfigurations(&self) -> usize {
        self.reconfigurations.load(Ordering::SeqCst)
    }

    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::SeqCst)
    }
}

impl Component for RecordingComponent {
    fn on_static_parameter_change(&self, runtime: &Runtime, id: ComponentId) {
        self.reconfigurations.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.on_reconfigure {
            hook(runtime, id);
        }
    }

    fn on_initialize(&self, _runtime: &Runtime, _id: ComponentId) {
        self.initializations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runtime whose command line carries `arguments`
pub fn runtime_with_args(arguments: &[(&str, &str)]) -> Runtime {
    let command_line = arguments
        .iter()
        .fold(CommandLine::new(), |cl, (name, value)| cl.with(*name, *value));
    Runtime::with_config(RuntimeConfig::with_command_line(command_line))
}

/// Module element with a recording component
pub fn add_module(
    runtime: &Runtime,
    parent: ComponentId,
    name: &str,
) -> (ComponentId, Arc<RecordingComponent>) {
    add_recorded(runtime, parent, name, ElementKind::Module, RecordingComponent::new())
}

/// Element of `kind` backed by `component`
pub fn add_recorded(
    runtime: &Runtime,
    parent: ComponentId,
    name: &str,
    kind: ElementKind,
    component: RecordingComponent,
) -> (ComponentId, Arc<RecordingComponent>) {
    let component = Arc::new(component);
    let id = runtime
        .create_element(parent, name, kind, Some(component.clone() as Arc<dyn Component>))
        .unwrap();
    (id, component)
}

/// Group created by the structuring tool
pub fn add_structuring_group(runtime: &Runtime, parent: ComponentId, name: &str) -> ComponentId {
    runtime
        .create_element(parent, name, ElementKind::StructuringGroup, None)
        .unwrap()
}

/// Config tree with `entries` set as leaf values
pub fn config_tree(entries: &[(&str, &str)]) -> ConfigTree {
    let mut tree = ConfigTree::new();
    for (entry, value) in entries {
        let node = tree.get_or_recreate_entry(entry);
        tree.set_text(node, *value);
    }
    tree
}

/// Temporary directory with a config document `name` holding `entries`
pub fn temp_config_file(name: &str, entries: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(name);
    config_tree(entries).save(&path).unwrap();
    (dir, path)
}
