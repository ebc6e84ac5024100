//! Data ports
//!
//! A [`DataPort`] holds one current value of a fixed [`DataType`] together
//! with its default. Publishing checks the type, applies the optional
//! [`ValueConstraint`] and notifies listeners after the value lock is
//! released.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use knob_value::{DataType, GenericValue, ParameterValue, TypedValue, ValueConstraint};
use parking_lot::RwLock;

use crate::error::RuntimeError;

/// Observer of published port values
pub trait PortListener: Send + Sync {
    /// A new value was published
    fn on_port_change(&self, value: &dyn GenericValue);
}

/// Single shared value slot with listeners
pub struct DataPort {
    data_type: DataType,
    value: RwLock<Box<dyn GenericValue>>,
    default: Box<dyn GenericValue>,
    listeners: RwLock<Vec<Arc<dyn PortListener>>>,
    constraint: Option<Arc<dyn ValueConstraint>>,
}

impl DataPort {
    /// Port whose current value and default are `default`
    #[must_use]
    pub fn new(default: Box<dyn GenericValue>) -> Self {
        Self {
            data_type: default.data_type(),
            value: RwLock::new(default.clone()),
            default,
            listeners: RwLock::new(Vec::new()),
            constraint: None,
        }
    }

    /// Typed convenience for [`DataPort::new`]
    #[must_use]
    pub fn with_default<T: ParameterValue>(default: T) -> Self {
        Self::new(TypedValue::boxed(default))
    }

    /// Attach a constraint checked on every publish
    #[must_use]
    pub fn with_constraint(mut self, constraint: impl ValueConstraint + 'static) -> Self {
        self.constraint = Some(Arc::new(constraint));
        self
    }

    /// Attach a constraint shared with other ports
    #[must_use]
    pub fn with_shared_constraint(mut self, constraint: Arc<dyn ValueConstraint>) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Value type
    #[inline]
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Value the port was created with
    #[inline]
    #[must_use]
    pub fn default_value(&self) -> &dyn GenericValue {
        self.default.as_ref()
    }

    /// Fresh buffer of the port's type to fill and publish
    #[must_use]
    pub fn unused_buffer(&self) -> Box<dyn GenericValue> {
        self.data_type.create_instance()
    }

    /// Copy of the current value
    #[must_use]
    pub fn get(&self) -> Box<dyn GenericValue> {
        self.value.read().clone()
    }

    /// Current value as `T`, if the port holds that type
    #[must_use]
    pub fn get_as<T: ParameterValue>(&self) -> Option<T> {
        self.value.read().downcast_ref::<T>().cloned()
    }

    /// Check if the current value equals the default
    #[must_use]
    pub fn holds_default(&self) -> bool {
        self.value.read().equals(self.default.as_ref())
    }

    /// Replace the current value and notify listeners
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::TypeMismatch`] for a value of another type and
    /// [`RuntimeError::Rejected`] if the constraint refuses it; the current
    /// value is kept in both cases.
    pub fn publish(&self, mut value: Box<dyn GenericValue>) -> Result<(), RuntimeError> {
        if value.data_type() != self.data_type {
            return Err(RuntimeError::TypeMismatch {
                expected: self.data_type.name().to_string(),
                actual: value.data_type().name().to_string(),
            });
        }
        if let Some(constraint) = &self.constraint {
            constraint.constrain(value.as_mut())?;
        }

        let published = value.clone();
        *self.value.write() = value;

        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_port_change(published.as_ref());
        }
        Ok(())
    }

    /// Typed convenience for [`DataPort::publish`]
    ///
    /// # Errors
    ///
    /// See [`DataPort::publish`].
    pub fn publish_value<T: ParameterValue>(&self, value: T) -> Result<(), RuntimeError> {
        self.publish(TypedValue::boxed(value))
    }

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn PortListener>) {
        self.listeners.write().push(listener);
    }
}

impl Debug for DataPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPort")
            .field("data_type", &self.data_type)
            .field("value", &*self.value.read())
            .field("default", &self.default)
            .field("listeners", &self.listeners.read().len())
            .field("constraint", &self.constraint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knob_value::{Bounds, OutOfBoundsAction};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl PortListener for Counter {
        fn on_port_change(&self, _value: &dyn GenericValue) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_publish_notifies_listeners() {
        let port = DataPort::with_default(1i32);
        let counter = Arc::new(Counter::default());
        port.add_listener(counter.clone());

        port.publish_value(5i32).unwrap();
        assert_eq!(port.get_as::<i32>(), Some(5));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(!port.holds_default());
    }

    #[test]
    fn test_publish_rejects_other_type() {
        let port = DataPort::with_default(1i32);
        let err = port.publish_value(String::from("x")).unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
        assert_eq!(port.get_as::<i32>(), Some(1));
    }

    #[test]
    fn test_constraint_discard_keeps_value() {
        let port = DataPort::with_default(2i32)
            .with_constraint(Bounds::with_action(0, 10, OutOfBoundsAction::Discard));
        assert!(matches!(
            port.publish_value(11i32),
            Err(RuntimeError::Rejected(_))
        ));
        assert_eq!(port.get_as::<i32>(), Some(2));
    }

    #[test]
    fn test_constraint_clamps() {
        let port = DataPort::with_default(0.5f64).with_constraint(Bounds::new(0.0, 1.0));
        port.publish_value(3.0f64).unwrap();
        assert_eq!(port.get_as::<f64>(), Some(1.0));
    }
}
