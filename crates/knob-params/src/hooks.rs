//! Initialization hooks
//!
//! Parameters react to element initialization: runtime parameter ports load
//! their value, elements with static parameters get evaluated.

use std::sync::Arc;

use knob_runtime::{ComponentId, InitializationListener, Runtime};

use crate::parameter_info::ParameterInfo;
use crate::static_parameter::StaticParameterGroup;

struct ParameterLifecycle;

impl InitializationListener for ParameterLifecycle {
    fn on_element_initialized(&self, runtime: &Runtime, id: ComponentId) {
        if let Some(info) = ParameterInfo::of(runtime, id) {
            info.on_initialization(runtime);
        }
        if runtime.has_annotation::<StaticParameterGroup>(id) {
            StaticParameterGroup::evaluate(runtime, id);
        }
    }
}

struct Installed;

/// Register the parameter lifecycle listener once per runtime
pub(crate) fn ensure_installed(runtime: &Runtime) {
    let _structure = runtime.structure_lock();
    if runtime.has_annotation::<Installed>(runtime.root()) {
        return;
    }
    runtime.annotate(runtime.root(), Arc::new(Installed));
    runtime.add_init_listener(Arc::new(ParameterLifecycle));
    tracing::debug!("installed parameter lifecycle listener");
}
