//! Error types shared by every collection in the crate.
//!
//! Construction-time misuse (blank keys, wrong primitive type under an
//! existing key, undeclared record fields) is a hard error. Ordinary absence
//! (missing id, missing field, missing member) is never an error; those
//! surface as `Ok(false)`, `Ok(None)` or zero counts from the operation
//! itself.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for all collection operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A base key or member key was empty or all whitespace.
    #[error("invalid collection key: {0}")]
    InvalidKey(String),

    /// An existing key holds a different primitive type than the wrapper
    /// expects. Only raised by the `checked` constructors; a missing key
    /// always passes since the store free-types empty keys.
    #[error("key {key:?} holds a {actual} value, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        actual: String,
    },

    /// A field name was used that the record type does not declare.
    #[error("record type {record} has no field {field:?}")]
    UnknownField { record: &'static str, field: String },

    /// Scalar encode/decode failure.
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Record serializer failure (JSON by default, see `Serializer`).
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// Transport or server-side failure from the underlying client.
    /// Propagated as-is; this crate performs no retries.
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Scalar conversion errors. Conversions fail fast and never silently
/// coerce or truncate.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Text form did not parse as the target type.
    #[error("cannot parse {input:?} as {target}")]
    Parse { target: &'static str, input: String },

    /// Numeric value is outside the representable range of the target.
    #[error("value {value} does not fit in {target}")]
    OutOfRange { target: &'static str, value: String },

    /// A nil value where the target type requires one.
    #[error("nil value cannot decode as {target}")]
    Nil { target: &'static str },

    /// The stored value kind cannot convert to the target at all.
    #[error("{target} cannot decode from a {found} value")]
    Kind {
        found: &'static str,
        target: &'static str,
    },

    /// Enum discriminant not declared by the target enum.
    #[error("unknown discriminant {value} for enum {name}")]
    UnknownVariant { name: &'static str, value: i64 },

    /// Array blob encode/decode failure.
    #[error("array codec: {0}")]
    Array(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidKey("base key must not be blank".into());
        assert_eq!(
            err.to_string(),
            "invalid collection key: base key must not be blank"
        );

        let err = Error::WrongType {
            key: "Orders:".into(),
            expected: "set",
            actual: "hash".into(),
        };
        assert_eq!(
            err.to_string(),
            "key \"Orders:\" holds a hash value, expected set"
        );

        let err = Error::UnknownField {
            record: "Order",
            field: "nope".into(),
        };
        assert_eq!(err.to_string(), "record type Order has no field \"nope\"");
    }

    #[test]
    fn test_convert_error_display() {
        let err = ConvertError::Parse {
            target: "i64",
            input: "abc".into(),
        };
        assert_eq!(err.to_string(), "cannot parse \"abc\" as i64");

        let err = ConvertError::OutOfRange {
            target: "u8",
            value: "300".into(),
        };
        assert_eq!(err.to_string(), "value 300 does not fit in u8");

        let err = ConvertError::UnknownVariant {
            name: "OrderStatus",
            value: 9,
        };
        assert_eq!(err.to_string(), "unknown discriminant 9 for enum OrderStatus");
    }

    #[test]
    fn test_convert_error_wraps_into_error() {
        let err: Error = ConvertError::Nil { target: "f64" }.into();
        assert!(matches!(err, Error::Convert(ConvertError::Nil { .. })));
    }
}
