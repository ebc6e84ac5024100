//! Typed runtime parameters

use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use knob_runtime::{ComponentId, DataPort, PortListener, Runtime};
use knob_value::{Bounds, GenericValue, ParameterValue, ValueConstraint};

use crate::error::ParameterError;
use crate::parameter_info::ParameterInfo;

/// Declaration of a runtime parameter
#[derive(Clone)]
pub struct ParameterSpec<T: ParameterValue> {
    name: String,
    default: T,
    config_entry: String,
    command_line_option: String,
    tool_default: String,
    constraint: Option<Arc<dyn ValueConstraint>>,
}

impl<T: ParameterValue> ParameterSpec<T> {
    /// Parameter `name` with the type's default value
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: T::default(),
            config_entry: String::new(),
            command_line_option: String::new(),
            tool_default: String::new(),
            constraint: None,
        }
    }

    /// Hard-coded default value
    #[must_use]
    pub fn default_value(mut self, value: T) -> Self {
        self.default = value;
        self
    }

    /// Config entry, relative to the enclosing scope unless absolute
    #[must_use]
    pub fn config_entry(mut self, entry: impl Into<String>) -> Self {
        self.config_entry = entry.into();
        self
    }

    /// Command-line option overriding the config entry
    #[must_use]
    pub fn command_line_option(mut self, option: impl Into<String>) -> Self {
        self.command_line_option = option.into();
        self
    }

    /// Structuring tool default, used when no other source applies
    #[must_use]
    pub fn tool_default(mut self, text: impl Into<String>) -> Self {
        self.tool_default = text.into();
        self
    }

    /// Parameter name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured config entry
    #[inline]
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.config_entry
    }
}

impl<T: ParameterValue + PartialOrd> ParameterSpec<T> {
    /// Restrict published values to `bounds`
    #[must_use]
    pub fn bounds(mut self, bounds: Bounds<T>) -> Self {
        self.constraint = Some(Arc::new(bounds));
        self
    }
}

impl<T: ParameterValue> Debug for ParameterSpec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSpec")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("config_entry", &self.config_entry)
            .field("command_line_option", &self.command_line_option)
            .field("tool_default", &self.tool_default)
            .field("constraint", &self.constraint)
            .finish()
    }
}

/// Lock-free copy of a numeric or boolean port value
struct ValueCache<T> {
    bits: AtomicU64,
    marker: PhantomData<fn() -> T>,
}

impl<T: ParameterValue> ValueCache<T> {
    fn new(bits: u64) -> Self {
        Self {
            bits: AtomicU64::new(bits),
            marker: PhantomData,
        }
    }

    fn get(&self) -> Option<T> {
        T::decode_bits(self.bits.load(Ordering::Acquire))
    }
}

impl<T: ParameterValue> PortListener for ValueCache<T> {
    fn on_port_change(&self, value: &dyn GenericValue) {
        if let Some(bits) = value.to_bits() {
            self.bits.store(bits, Ordering::Release);
        }
    }
}

/// Handle to a runtime parameter port
pub struct Parameter<T: ParameterValue> {
    element: ComponentId,
    port: Arc<DataPort>,
    info: Arc<ParameterInfo>,
    cache: Option<Arc<ValueCache<T>>>,
}

impl<T: ParameterValue> Clone for Parameter<T> {
    fn clone(&self) -> Self {
        Self {
            element: self.element,
            port: self.port.clone(),
            info: self.info.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<T: ParameterValue> Parameter<T> {
    /// Create the parameter port below `parent`
    ///
    /// The value is loaded when the port is initialized.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Runtime`] for an unusable parent.
    pub fn create(
        runtime: &Runtime,
        parent: ComponentId,
        spec: &ParameterSpec<T>,
    ) -> Result<Self, ParameterError> {
        let mut port = DataPort::with_default(spec.default.clone());
        if let Some(constraint) = &spec.constraint {
            port = port.with_shared_constraint(constraint.clone());
        }
        let (element, port) = runtime.create_port(parent, &spec.name, port)?;

        let cache = spec.default.encode_bits().map(|bits| {
            let cache = Arc::new(ValueCache::new(bits));
            port.add_listener(cache.clone());
            cache
        });

        let info = ParameterInfo::attach(runtime, element);
        info.set_command_line_option(&spec.command_line_option);
        info.set_tool_default(&spec.tool_default);
        info.set_config_entry(runtime, &spec.config_entry, false);

        Ok(Self {
            element,
            port,
            info,
            cache,
        })
    }

    /// Current value
    #[must_use]
    pub fn get(&self) -> T {
        self.cache
            .as_ref()
            .and_then(|c| c.get())
            .or_else(|| self.port.get_as::<T>())
            .unwrap_or_default()
    }

    /// Publish a new value
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Runtime`] if the port's constraint rejects
    /// the value.
    pub fn set(&self, value: T) -> Result<(), ParameterError> {
        Ok(self.port.publish_value(value)?)
    }

    /// Config entry of the parameter
    #[must_use]
    pub fn config_entry(&self) -> String {
        self.info.config_entry()
    }

    /// Change the config entry; reloads the value if ready
    pub fn set_config_entry(&self, runtime: &Runtime, entry: &str) {
        self.info.set_config_entry(runtime, entry, false);
    }

    /// Port element
    #[inline]
    #[must_use]
    pub fn element(&self) -> ComponentId {
        self.element
    }

    /// Underlying port
    #[inline]
    #[must_use]
    pub fn port(&self) -> &Arc<DataPort> {
        &self.port
    }

    /// Value sources
    #[inline]
    #[must_use]
    pub fn info(&self) -> &Arc<ParameterInfo> {
        &self.info
    }
}

impl<T: ParameterValue> Debug for Parameter<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("element", &self.element)
            .field("value", &self.get())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knob_value::OutOfBoundsAction;

    #[test]
    fn test_cache_follows_published_value() {
        let rt = Runtime::new();
        let p = Parameter::create(
            &rt,
            rt.root(),
            &ParameterSpec::new("gain").default_value(1.5f64),
        )
        .unwrap();
        assert!(p.cache.is_some());
        assert_eq!(p.get(), 1.5);
        p.set(2.25).unwrap();
        assert_eq!(p.get(), 2.25);
    }

    #[test]
    fn test_string_parameter_has_no_cache() {
        let rt = Runtime::new();
        let p = Parameter::create(
            &rt,
            rt.root(),
            &ParameterSpec::new("label").default_value(String::from("a")),
        )
        .unwrap();
        assert!(p.cache.is_none());
        p.set(String::from("b")).unwrap();
        assert_eq!(p.get(), "b");
    }

    #[test]
    fn test_bounds_discard_keeps_value() {
        let rt = Runtime::new();
        let spec = ParameterSpec::new("limit")
            .default_value(5i32)
            .bounds(Bounds::with_action(0, 10, OutOfBoundsAction::Discard));
        let p = Parameter::create(&rt, rt.root(), &spec).unwrap();
        assert!(p.set(11).is_err());
        assert_eq!(p.get(), 5);
    }

    #[test]
    fn test_tool_default_applied_on_init() {
        let rt = Runtime::new();
        let p = Parameter::create(
            &rt,
            rt.root(),
            &ParameterSpec::<i32>::new("n").tool_default("9"),
        )
        .unwrap();
        rt.init(rt.root());
        assert_eq!(p.get(), 9);
    }
}
