//! Error types for value conversion and the binary stream

/// Errors raised when converting or constraining a value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// Text could not be parsed into the target type
    #[error("cannot parse '{input}' as {type_name}: {reason}")]
    Parse {
        /// Registered name of the target type
        type_name: &'static str,
        /// Offending input
        input: String,
        /// Parser message
        reason: String,
    },

    /// Two values of different types were combined
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Type the receiver holds
        expected: String,
        /// Type that was supplied
        actual: String,
    },

    /// Value rejected by a range constraint
    #[error("value {value} outside of [{min}, {max}]")]
    OutOfBounds {
        /// Rejected value, formatted
        value: String,
        /// Lower bound, formatted
        min: String,
        /// Upper bound, formatted
        max: String,
    },
}

/// Errors raised while reading the binary wire form
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Not enough bytes left for the requested read
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// String payload was not UTF-8
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// Type name not present in the registry
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// Value payload failed to convert
    #[error(transparent)]
    Value(#[from] ValueError),
}
