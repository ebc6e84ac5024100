//! Range constraints for numeric parameters

use std::fmt::Debug;

use crate::data_type::ParameterValue;
use crate::error::ValueError;
use crate::generic::GenericValue;

/// What to do with a value outside of its bounds
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OutOfBoundsAction<T> {
    /// Reject the value; the previous one stays
    Discard,

    /// Clamp to the nearest bound
    #[default]
    AdjustToRange,

    /// Replace with the given value
    ApplyDefault(T),
}

/// Inclusive value range with an out-of-bounds policy
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds<T> {
    min: T,
    max: T,
    action: OutOfBoundsAction<T>,
}

impl<T: ParameterValue + PartialOrd> Bounds<T> {
    /// Bounds `[min, max]` clamping values outside the range
    #[must_use]
    pub fn new(min: T, max: T) -> Self {
        Self::with_action(min, max, OutOfBoundsAction::AdjustToRange)
    }

    /// Bounds `[min, max]` with an explicit policy
    #[must_use]
    pub fn with_action(min: T, max: T, action: OutOfBoundsAction<T>) -> Self {
        Self { min, max, action }
    }

    /// Lower bound
    #[inline]
    #[must_use]
    pub fn min(&self) -> &T {
        &self.min
    }

    /// Upper bound
    #[inline]
    #[must_use]
    pub fn max(&self) -> &T {
        &self.max
    }

    /// Policy for values outside of the range
    #[inline]
    #[must_use]
    pub fn action(&self) -> &OutOfBoundsAction<T> {
        &self.action
    }

    /// Check if `value` lies within the range
    #[inline]
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        *value >= self.min && *value <= self.max
    }

    /// Map `value` to the value that should be stored
    ///
    /// Returns `None` when the value is to be discarded.
    #[must_use]
    pub fn apply(&self, value: T) -> Option<T> {
        if self.contains(&value) {
            return Some(value);
        }
        match &self.action {
            OutOfBoundsAction::Discard => None,
            OutOfBoundsAction::AdjustToRange => {
                if value < self.min {
                    Some(self.min.clone())
                } else {
                    Some(self.max.clone())
                }
            }
            OutOfBoundsAction::ApplyDefault(default) => Some(default.clone()),
        }
    }

    fn out_of_bounds(&self, value: &T) -> ValueError {
        ValueError::OutOfBounds {
            value: value.to_text(),
            min: self.min.to_text(),
            max: self.max.to_text(),
        }
    }
}

/// Check applied to a value before it is published
pub trait ValueConstraint: Debug + Send + Sync {
    /// Adjust `value` in place or reject it
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] when the value must not be published.
    fn constrain(&self, value: &mut dyn GenericValue) -> Result<(), ValueError>;
}

impl<T: ParameterValue + PartialOrd> ValueConstraint for Bounds<T> {
    fn constrain(&self, value: &mut dyn GenericValue) -> Result<(), ValueError> {
        let actual = value.data_type();
        let slot = value
            .downcast_mut::<T>()
            .ok_or_else(|| ValueError::TypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                actual: actual.name().to_string(),
            })?;
        match self.apply(slot.clone()) {
            Some(adjusted) => {
                *slot = adjusted;
                Ok(())
            }
            None => Err(self.out_of_bounds(slot)),
        }
    }
}
