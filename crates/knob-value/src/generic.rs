//! Type-erased value buffers
//!
//! [`GenericValue`] is the object-safe face of a [`ParameterValue`]: deep
//! copy, equality, text and binary conversion behind a `dyn` pointer, tagged
//! with its [`DataType`].

use std::any::Any;
use std::fmt::Debug;

use crate::data_type::{DataType, ParameterValue};
use crate::error::{StreamError, ValueError};
use crate::stream::{InputStream, OutputStream};

/// Value buffer whose concrete type is only known at runtime
pub trait GenericValue: Debug + Send + Sync + 'static {
    /// Runtime type tag
    fn data_type(&self) -> DataType;

    /// Deep copy
    fn clone_boxed(&self) -> Box<dyn GenericValue>;

    /// Deep equality; values of different types are never equal
    fn equals(&self, other: &dyn GenericValue) -> bool;

    /// Overwrite this value with a copy of `other`
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::TypeMismatch`] if `other` holds another type.
    fn copy_from(&mut self, other: &dyn GenericValue) -> Result<(), ValueError>;

    /// Textual form
    fn to_text(&self) -> String;

    /// Replace the value by parsing `text`
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Parse`]; the value is left untouched then.
    fn set_text(&mut self, text: &str) -> Result<(), ValueError>;

    /// Append the binary form
    fn write_binary(&self, out: &mut OutputStream);

    /// Replace the value from the binary form
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] for truncated or malformed input.
    fn read_binary(&mut self, input: &mut InputStream) -> Result<(), StreamError>;

    /// Single-word encoding for lock-free caches
    fn to_bits(&self) -> Option<u64>;

    /// Upcast for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Concrete holder behind a `Box<dyn GenericValue>`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypedValue<T: ParameterValue>(pub T);

impl<T: ParameterValue> TypedValue<T> {
    /// Box `value` as a type-erased buffer
    #[must_use]
    pub fn boxed(value: T) -> Box<dyn GenericValue> {
        Box::new(Self(value))
    }
}

impl<T: ParameterValue> GenericValue for TypedValue<T> {
    fn data_type(&self) -> DataType {
        DataType::of::<T>()
    }

    fn clone_boxed(&self) -> Box<dyn GenericValue> {
        Box::new(self.clone())
    }

    fn equals(&self, other: &dyn GenericValue) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|o| o.0 == self.0)
    }

    fn copy_from(&mut self, other: &dyn GenericValue) -> Result<(), ValueError> {
        match other.as_any().downcast_ref::<Self>() {
            Some(o) => {
                self.0.clone_from(&o.0);
                Ok(())
            }
            None => Err(ValueError::TypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                actual: other.data_type().name().to_string(),
            }),
        }
    }

    fn to_text(&self) -> String {
        self.0.to_text()
    }

    fn set_text(&mut self, text: &str) -> Result<(), ValueError> {
        self.0 = T::parse_text(text)?;
        Ok(())
    }

    fn write_binary(&self, out: &mut OutputStream) {
        self.0.write_binary(out);
    }

    fn read_binary(&mut self, input: &mut InputStream) -> Result<(), StreamError> {
        self.0 = T::read_binary(input)?;
        Ok(())
    }

    fn to_bits(&self) -> Option<u64> {
        self.0.encode_bits()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl dyn GenericValue {
    /// Borrow the concrete value if this buffer holds a `T`
    #[must_use]
    pub fn downcast_ref<T: ParameterValue>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<TypedValue<T>>().map(|v| &v.0)
    }

    /// Mutably borrow the concrete value if this buffer holds a `T`
    #[must_use]
    pub fn downcast_mut<T: ParameterValue>(&mut self) -> Option<&mut T> {
        self.as_any_mut()
            .downcast_mut::<TypedValue<T>>()
            .map(|v| &mut v.0)
    }
}

impl Clone for Box<dyn GenericValue> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_across_types_is_false() {
        let a = TypedValue::boxed(1i32);
        let b = TypedValue::boxed(1i64);
        assert!(!a.equals(b.as_ref()));
        assert!(a.equals(TypedValue::boxed(1i32).as_ref()));
    }

    #[test]
    fn test_copy_from_rejects_other_type() {
        let mut a = TypedValue::boxed(String::from("x"));
        let err = a.copy_from(TypedValue::boxed(true).as_ref()).unwrap_err();
        assert_eq!(
            err,
            ValueError::TypeMismatch {
                expected: "string".to_string(),
                actual: "bool".to_string()
            }
        );
        assert_eq!(a.downcast_ref::<String>().map(String::as_str), Some("x"));
    }

    #[test]
    fn test_failed_set_text_keeps_value() {
        let mut v = TypedValue::boxed(3i32);
        assert!(v.set_text("three").is_err());
        assert_eq!(v.downcast_ref::<i32>(), Some(&3));
        v.set_text("4").unwrap();
        assert_eq!(v.to_text(), "4");
    }

    #[test]
    fn test_boxed_clone_is_deep() {
        let a = TypedValue::boxed(7i64);
        let mut b = a.clone();
        *b.downcast_mut::<i64>().unwrap() = 8;
        assert_eq!(a.downcast_ref::<i64>(), Some(&7));
    }
}
