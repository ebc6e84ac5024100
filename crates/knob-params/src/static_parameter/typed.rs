//! Typed static parameters

use std::fmt::{self, Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

use knob_runtime::{ComponentId, Runtime};
use knob_value::{Bounds, DataType, ParameterValue, TypedValue};

use super::graph::{ParamId, StaticParameterGraph};
use super::group::StaticParameterGroup;
use crate::error::ParameterError;

type BoundsCheck<T> = Arc<dyn Fn(T) -> Option<T> + Send + Sync>;

/// Declaration of a static parameter
pub struct StaticParameterSpec<T: ParameterValue> {
    name: String,
    default: T,
    config_entry: String,
    command_line_option: String,
    outer_attachment: String,
    create_outer: bool,
    bounds: Option<BoundsCheck<T>>,
}

impl<T: ParameterValue> StaticParameterSpec<T> {
    /// Parameter `name` with the type's default value
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: T::default(),
            config_entry: String::new(),
            command_line_option: String::new(),
            outer_attachment: String::new(),
            create_outer: false,
            bounds: None,
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

    /// Command-line option
    #[must_use]
    pub fn command_line_option(mut self, option: impl Into<String>) -> Self {
        self.command_line_option = option.into();
        self
    }

    /// Share the value of parameter `name` of the enclosing
    /// structuring-tool group, creating it with `create`
    #[must_use]
    pub fn attach_outer(mut self, name: impl Into<String>, create: bool) -> Self {
        self.outer_attachment = name.into();
        self.create_outer = create;
        self
    }
}

impl<T: ParameterValue + PartialOrd> StaticParameterSpec<T> {
    /// Restrict values set through the handle to `bounds`
    #[must_use]
    pub fn bounds(mut self, bounds: Bounds<T>) -> Self {
        self.bounds = Some(Arc::new(move |value| bounds.apply(value)));
        self
    }
}

impl<T: ParameterValue> Debug for StaticParameterSpec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticParameterSpec")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("config_entry", &self.config_entry)
            .field("command_line_option", &self.command_line_option)
            .field("outer_attachment", &self.outer_attachment)
            .field("bounded", &self.bounds.is_some())
            .finish()
    }
}

/// Handle to a static parameter of type `T`
pub struct StaticParameter<T: ParameterValue> {
    id: ParamId,
    graph: Arc<StaticParameterGraph>,
    bounds: Option<BoundsCheck<T>>,
    marker: PhantomData<fn() -> T>,
}

impl<T: ParameterValue> Clone for StaticParameter<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            graph: self.graph.clone(),
            bounds: self.bounds.clone(),
            marker: PhantomData,
        }
    }
}

impl<T: ParameterValue> StaticParameter<T> {
    /// Declare a static parameter of `element`
    ///
    /// The value is loaded on the next evaluation of the element.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvariantViolation`] if the outer
    /// attachment would form a cycle.
    pub fn declare(
        runtime: &Runtime,
        element: ComponentId,
        spec: StaticParameterSpec<T>,
    ) -> Result<Self, ParameterError> {
        let graph = StaticParameterGraph::of(runtime);
        let id = graph.insert(
            &spec.name,
            DataType::of::<T>(),
            Some(TypedValue::boxed(spec.default)),
            false,
        );
        StaticParameterGroup::get_or_create(runtime, element).add(id)?;
        graph.write_node(id, |n| {
            n.command_line_option = spec.command_line_option;
            n.config_entry = spec.config_entry;
        })?;
        if !spec.outer_attachment.is_empty() {
            graph.set_outer_attachment(runtime, id, &spec.outer_attachment, spec.create_outer)?;
        }
        Ok(Self {
            id,
            graph,
            bounds: spec.bounds,
            marker: PhantomData,
        })
    }

    /// Node id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ParamId {
        self.id
    }

    /// Parameter name
    #[must_use]
    pub fn name(&self) -> String {
        self.graph.name(self.id).unwrap_or_default()
    }

    /// Current value, or the type's default if it holds another type
    #[must_use]
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_default()
    }

    /// Current value if it holds a `T`
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.graph
            .with_value(self.id, |v| v.downcast_ref::<T>().cloned())
            .flatten()
    }

    /// Set the shared value; takes effect on the next evaluation
    ///
    /// Returns `false` if the bounds discard the value.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] if the node was removed.
    pub fn set(&self, value: T) -> Result<bool, ParameterError> {
        let value = match &self.bounds {
            Some(check) => match check(value) {
                Some(adjusted) => adjusted,
                None => return Ok(false),
            },
            None => value,
        };
        self.graph.set_value(self.id, TypedValue::boxed(value))?;
        Ok(true)
    }

    /// Share the value of `other`
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvariantViolation`] for a cyclic
    /// attachment.
    pub fn attach_to<U: ParameterValue>(
        &self,
        other: &StaticParameter<U>,
    ) -> Result<(), ParameterError> {
        self.graph.attach_to(self.id, Some(other.id))
    }

    /// Stop sharing; keeps a copy of the shared value
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] if the node was removed.
    pub fn detach(&self) -> Result<(), ParameterError> {
        self.graph.attach_to(self.id, None)
    }

    /// Share the value of parameter `name` of the enclosing
    /// structuring-tool group
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvariantViolation`] for a cyclic
    /// attachment.
    pub fn attach_to_outer(
        &self,
        runtime: &Runtime,
        name: &str,
        create: bool,
    ) -> Result<(), ParameterError> {
        self.graph.set_outer_attachment(runtime, self.id, name, create)
    }

    /// Check if the value changed since the last evaluation
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.graph.has_changed(self.id)
    }

    /// Mark the current value as seen
    pub fn reset_changed(&self) {
        self.graph.reset_changed(self.id);
    }

    /// Config entry
    #[must_use]
    pub fn config_entry(&self) -> String {
        self.graph.config_entry(self.id)
    }

    /// Change the config entry; reloads the value if the element is ready
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::NotFound`] if the node was removed.
    pub fn set_config_entry(&self, runtime: &Runtime, entry: &str) -> Result<(), ParameterError> {
        self.graph.set_config_entry(runtime, self.id, entry)
    }
}

impl<T: ParameterValue> Debug for StaticParameter<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticParameter")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("value", &self.try_get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knob_runtime::ElementKind;
    use knob_value::OutOfBoundsAction;

    #[test]
    fn test_bounds_policies() {
        let rt = Runtime::new();
        let m = rt.create_element(rt.root(), "m", ElementKind::Module, None).unwrap();
        let clamp = StaticParameter::declare(
            &rt,
            m,
            StaticParameterSpec::new("clamp").bounds(Bounds::new(0, 10)),
        )
        .unwrap();
        let discard = StaticParameter::declare(
            &rt,
            m,
            StaticParameterSpec::new("discard")
                .default_value(4)
                .bounds(Bounds::with_action(0, 10, OutOfBoundsAction::Discard)),
        )
        .unwrap();
        let fallback = StaticParameter::declare(
            &rt,
            m,
            StaticParameterSpec::new("fallback").bounds(Bounds::with_action(
                0,
                10,
                OutOfBoundsAction::ApplyDefault(5),
            )),
        )
        .unwrap();

        assert!(clamp.set(20).unwrap());
        assert_eq!(clamp.get(), 10);
        assert!(!discard.set(-1).unwrap());
        assert_eq!(discard.get(), 4);
        assert!(fallback.set(11).unwrap());
        assert_eq!(fallback.get(), 5);
    }

    #[test]
    fn test_attach_and_detach_handles() {
        let rt = Runtime::new();
        let m = rt.create_element(rt.root(), "m", ElementKind::Module, None).unwrap();
        let a = StaticParameter::declare(
            &rt,
            m,
            StaticParameterSpec::new("a").default_value(1),
        )
        .unwrap();
        let b = StaticParameter::declare(
            &rt,
            m,
            StaticParameterSpec::new("b").default_value(2),
        )
        .unwrap();

        a.attach_to(&b).unwrap();
        assert_eq!(a.get(), 2);
        a.set(3).unwrap();
        assert_eq!(b.get(), 3);

        a.detach().unwrap();
        b.set(4).unwrap();
        assert_eq!(a.get(), 3);
    }
}
