//! Concrete parameter value types and their runtime type identity
//!
//! Provides [`ParameterValue`] for the Rust types a parameter can hold and
//! [`DataType`], the runtime tag used wherever the concrete type is erased.

use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{StreamError, ValueError};
use crate::generic::{GenericValue, TypedValue};
use crate::stream::{InputStream, OutputStream};

/// A Rust type usable as parameter value
///
/// Implementors provide the textual form stored in config documents and the
/// binary form used on the wire. Numeric and boolean types additionally map
/// to a 64-bit word so that readers can sample them lock-free.
pub trait ParameterValue: Clone + PartialEq + Debug + Default + Send + Sync + 'static {
    /// Name the type is registered and transferred under
    const TYPE_NAME: &'static str;

    /// Textual form as written to a config document
    fn to_text(&self) -> String;

    /// Parse the textual form
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Parse`] when `text` is not a valid value.
    fn parse_text(text: &str) -> Result<Self, ValueError>;

    /// Append the binary form
    fn write_binary(&self, out: &mut OutputStream);

    /// Read the binary form
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`] for truncated or malformed input.
    fn read_binary(input: &mut InputStream) -> Result<Self, StreamError>;

    /// Encode into a single machine word, if the type fits one
    fn encode_bits(&self) -> Option<u64> {
        None
    }

    /// Inverse of [`ParameterValue::encode_bits`]
    fn decode_bits(_bits: u64) -> Option<Self> {
        None
    }
}

fn parse_with<T>(type_name: &'static str, text: &str) -> Result<T, ValueError>
where
    T: FromStr,
    T::Err: Display,
{
    text.trim().parse::<T>().map_err(|e| ValueError::Parse {
        type_name,
        input: text.to_string(),
        reason: e.to_string(),
    })
}

macro_rules! numeric_value {
    (
        $ty:ty,
        $name:literal,
        $write:ident,
        $read:ident,
        |$v:ident| $enc:expr,
        |$b:ident| $dec:expr
    ) => {
        impl ParameterValue for $ty {
            const TYPE_NAME: &'static str = $name;

            fn to_text(&self) -> String {
                self.to_string()
            }

            fn parse_text(text: &str) -> Result<Self, ValueError> {
                parse_with::<$ty>($name, text)
            }

            fn write_binary(&self, out: &mut OutputStream) {
                out.$write(*self);
            }

            fn read_binary(input: &mut InputStream) -> Result<Self, StreamError> {
                input.$read()
            }

            #[allow(clippy::cast_sign_loss)]
            fn encode_bits(&self) -> Option<u64> {
                let $v = *self;
                Some($enc)
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            fn decode_bits($b: u64) -> Option<Self> {
                Some($dec)
            }
        }
    };
}

numeric_value!(i32, "int32", write_i32, read_i32, |v| i64::from(v) as u64, |b| b as i32);
numeric_value!(i64, "int64", write_i64, read_i64, |v| v as u64, |b| b as i64);
numeric_value!(f32, "float32", write_f32, read_f32, |v| u64::from(f32::to_bits(v)), |b| {
    f32::from_bits(b as u32)
});
numeric_value!(f64, "float64", write_f64, read_f64, |v| f64::to_bits(v), |b| f64::from_bits(b));

impl ParameterValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn to_text(&self) -> String {
        self.to_string()
    }

    fn parse_text(text: &str) -> Result<Self, ValueError> {
        match text.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(ValueError::Parse {
                type_name: Self::TYPE_NAME,
                input: other.to_string(),
                reason: "expected true, false, 1 or 0".to_string(),
            }),
        }
    }

    fn write_binary(&self, out: &mut OutputStream) {
        out.write_bool(*self);
    }

    fn read_binary(input: &mut InputStream) -> Result<Self, StreamError> {
        input.read_bool()
    }

    fn encode_bits(&self) -> Option<u64> {
        Some(u64::from(*self))
    }

    fn decode_bits(bits: u64) -> Option<Self> {
        Some(bits != 0)
    }
}

impl ParameterValue for String {
    const TYPE_NAME: &'static str = "string";

    fn to_text(&self) -> String {
        self.clone()
    }

    fn parse_text(text: &str) -> Result<Self, ValueError> {
        Ok(text.to_string())
    }

    fn write_binary(&self, out: &mut OutputStream) {
        out.write_string(self);
    }

    fn read_binary(input: &mut InputStream) -> Result<Self, StreamError> {
        input.read_string()
    }
}

fn create_boxed<T: ParameterValue>() -> Box<dyn GenericValue> {
    Box::new(TypedValue::<T>::default())
}

/// Runtime type identity of a parameter value
///
/// Two data types are equal when their registered names are equal.
#[derive(Clone, Copy)]
pub struct DataType {
    name: &'static str,
    create: fn() -> Box<dyn GenericValue>,
}

impl DataType {
    /// Data type of `T`
    #[inline]
    #[must_use]
    pub fn of<T: ParameterValue>() -> Self {
        Self {
            name: T::TYPE_NAME,
            create: create_boxed::<T>,
        }
    }

    /// Registered name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fresh value holding the type's default
    #[must_use]
    pub fn create_instance(&self) -> Box<dyn GenericValue> {
        (self.create)()
    }

    /// Check whether this is the data type of `T`
    #[inline]
    #[must_use]
    pub fn is<T: ParameterValue>(&self) -> bool {
        self.name == T::TYPE_NAME
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DataType {}

impl Hash for DataType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Debug for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataType").field(&self.name).finish()
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
