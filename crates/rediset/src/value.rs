//! Scalar codec between application types and the store's native value form.
//!
//! Redis keeps every scalar as a byte string on the wire; client-side the
//! value still has a shape (integer, float, text, raw bytes), captured here
//! as [`ScalarValue`]. Application types move in and out of that form through
//! the [`RedisScalar`] trait:
//!
//! - integers and floats encode as decimal text,
//! - booleans as `1` / `0`,
//! - timestamps as round-trippable RFC 3339 text (inspectable with any CLI),
//! - durations as integer nanosecond ticks,
//! - byte buffers raw,
//! - arrays of value types as a JSON blob,
//! - unit enums as their integer discriminant (see [`scalar_enum!`](crate::scalar_enum)).
//!
//! Decoding needs the target type up front and fails with a descriptive
//! [`ConvertError`] instead of coercing: `"300"` does not decode as `u8`,
//! `2^60` does not decode as `f64`, and a nil never decodes as anything
//! but `Option::None`.

use std::fmt::Display;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::{FromRedisValue, RedisResult, RedisWrite, ToRedisArgs, Value};

use crate::error::ConvertError;

// ============================================================================
// Native value form
// ============================================================================

/// A scalar in the store's native representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// Absent value: nil reply, missing hash field, unset member.
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Bytes),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Value kind name used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ScalarValue::Null => "nil",
            ScalarValue::Int(_) => "int",
            ScalarValue::Float(_) => "float",
            ScalarValue::Text(_) => "text",
            ScalarValue::Bytes(_) => "bytes",
        }
    }

    /// Widen to `i64`. Text and bytes parse; floats never convert implicitly.
    pub fn to_i64(self, target: &'static str) -> Result<i64, ConvertError> {
        match self {
            ScalarValue::Int(i) => Ok(i),
            ScalarValue::Float(_) => Err(ConvertError::Kind {
                found: "float",
                target,
            }),
            other => {
                let text = other.to_text(target)?;
                text.parse::<i64>().map_err(|_| ConvertError::Parse {
                    target,
                    input: text,
                })
            }
        }
    }

    /// Widen to `f64`. Integers convert only when exactly representable.
    pub fn to_f64(self, target: &'static str) -> Result<f64, ConvertError> {
        match self {
            ScalarValue::Float(f) => Ok(f),
            ScalarValue::Int(i) => {
                let wide = i as f64;
                if wide as i64 == i {
                    Ok(wide)
                } else {
                    Err(ConvertError::OutOfRange {
                        target,
                        value: i.to_string(),
                    })
                }
            }
            other => {
                let text = other.to_text(target)?;
                text.parse::<f64>().map_err(|_| ConvertError::Parse {
                    target,
                    input: text,
                })
            }
        }
    }

    /// Accepts `1`/`0` integers and `"1"`/`"0"`/`"true"`/`"false"` text.
    pub fn to_bool(self, target: &'static str) -> Result<bool, ConvertError> {
        match self {
            ScalarValue::Int(0) => Ok(false),
            ScalarValue::Int(1) => Ok(true),
            ScalarValue::Int(other) => Err(ConvertError::OutOfRange {
                target,
                value: other.to_string(),
            }),
            ScalarValue::Float(_) => Err(ConvertError::Kind {
                found: "float",
                target,
            }),
            other => {
                let text = other.to_text(target)?;
                if text == "1" || text.eq_ignore_ascii_case("true") {
                    Ok(true)
                } else if text == "0" || text.eq_ignore_ascii_case("false") {
                    Ok(false)
                } else {
                    Err(ConvertError::Parse {
                        target,
                        input: text,
                    })
                }
            }
        }
    }

    /// Textual form. Bytes must be valid UTF-8.
    pub fn to_text(self, target: &'static str) -> Result<String, ConvertError> {
        match self {
            ScalarValue::Null => Err(ConvertError::Nil { target }),
            ScalarValue::Int(i) => Ok(i.to_string()),
            ScalarValue::Float(f) => Ok(f.to_string()),
            ScalarValue::Text(s) => Ok(s),
            ScalarValue::Bytes(b) => String::from_utf8(b.to_vec()).map_err(|e| {
                ConvertError::Parse {
                    target,
                    input: format!("<{} non-utf8 bytes>", e.as_bytes().len()),
                }
            }),
        }
    }

    /// Raw byte form. Numbers yield their textual bytes, mirroring the wire.
    pub fn into_byte_vec(self, target: &'static str) -> Result<Vec<u8>, ConvertError> {
        match self {
            ScalarValue::Null => Err(ConvertError::Nil { target }),
            ScalarValue::Int(i) => Ok(i.to_string().into_bytes()),
            ScalarValue::Float(f) => Ok(f.to_string().into_bytes()),
            ScalarValue::Text(s) => Ok(s.into_bytes()),
            ScalarValue::Bytes(b) => Ok(b.to_vec()),
        }
    }
}

impl ToRedisArgs for ScalarValue {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            // Null is filtered out of hash writes; as a set member it would
            // be the empty string, same as the original client's behavior.
            ScalarValue::Null => out.write_arg(b""),
            ScalarValue::Int(i) => out.write_arg(i.to_string().as_bytes()),
            ScalarValue::Float(f) => out.write_arg(f.to_string().as_bytes()),
            ScalarValue::Text(s) => out.write_arg(s.as_bytes()),
            ScalarValue::Bytes(b) => out.write_arg(b),
        }
    }
}

impl FromRedisValue for ScalarValue {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        Ok(match v {
            Value::Nil => ScalarValue::Null,
            Value::Int(i) => ScalarValue::Int(*i),
            Value::BulkString(data) => ScalarValue::Bytes(Bytes::copy_from_slice(data)),
            Value::SimpleString(s) => ScalarValue::Text(s.clone()),
            Value::Okay => ScalarValue::Text("OK".to_string()),
            Value::Double(f) => ScalarValue::Float(*f),
            Value::Boolean(b) => ScalarValue::Int(i64::from(*b)),
            other => {
                return Err(redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "reply is not a scalar",
                    format!("{other:?}"),
                )))
            }
        })
    }
}

// ============================================================================
// Codec trait
// ============================================================================

/// Types that round-trip through a single [`ScalarValue`].
pub trait RedisScalar: Sized {
    fn encode(&self) -> Result<ScalarValue, ConvertError>;

    fn decode(value: ScalarValue) -> Result<Self, ConvertError>;
}

/// Bound for entity identifiers: scalar-encodable for index-set membership
/// and displayable for derived-key construction.
pub trait EntryId: RedisScalar + Display + Clone + Send + Sync {}

impl<T> EntryId for T where T: RedisScalar + Display + Clone + Send + Sync {}

/// Encode a slice of members, failing on the first bad element.
pub(crate) fn encode_members<T: RedisScalar>(
    items: &[T],
) -> Result<Vec<ScalarValue>, ConvertError> {
    items.iter().map(RedisScalar::encode).collect()
}

// ============================================================================
// Implementations
// ============================================================================

macro_rules! int_scalar {
    ($($ty:ty),* $(,)?) => {$(
        impl RedisScalar for $ty {
            fn encode(&self) -> Result<ScalarValue, ConvertError> {
                Ok(ScalarValue::Int(i64::from(*self)))
            }

            fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
                let wide = value.to_i64(stringify!($ty))?;
                <$ty>::try_from(wide).map_err(|_| ConvertError::OutOfRange {
                    target: stringify!($ty),
                    value: wide.to_string(),
                })
            }
        }
    )*};
}

int_scalar!(i8, i16, i32, i64, u8, u16, u32);

impl RedisScalar for u64 {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        // Values beyond i64::MAX still fit the wire as decimal text.
        match i64::try_from(*self) {
            Ok(i) => Ok(ScalarValue::Int(i)),
            Err(_) => Ok(ScalarValue::Text(self.to_string())),
        }
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        match value {
            ScalarValue::Int(i) => u64::try_from(i).map_err(|_| ConvertError::OutOfRange {
                target: "u64",
                value: i.to_string(),
            }),
            ScalarValue::Float(_) => Err(ConvertError::Kind {
                found: "float",
                target: "u64",
            }),
            other => {
                let text = other.to_text("u64")?;
                text.parse::<u64>().map_err(|_| ConvertError::Parse {
                    target: "u64",
                    input: text,
                })
            }
        }
    }
}

impl RedisScalar for f64 {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        Ok(ScalarValue::Float(*self))
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        value.to_f64("f64")
    }
}

impl RedisScalar for f32 {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        Ok(ScalarValue::Float(f64::from(*self)))
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        let wide = value.to_f64("f32")?;
        let narrow = wide as f32;
        if f64::from(narrow) == wide || wide.is_nan() {
            Ok(narrow)
        } else {
            Err(ConvertError::OutOfRange {
                target: "f32",
                value: wide.to_string(),
            })
        }
    }
}

impl RedisScalar for bool {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        Ok(ScalarValue::Int(i64::from(*self)))
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        value.to_bool("bool")
    }
}

impl RedisScalar for String {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        Ok(ScalarValue::Text(self.clone()))
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        value.to_text("String")
    }
}

impl RedisScalar for Vec<u8> {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        Ok(ScalarValue::Bytes(Bytes::copy_from_slice(self)))
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        value.into_byte_vec("Vec<u8>")
    }
}

impl RedisScalar for Bytes {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        Ok(ScalarValue::Bytes(self.clone()))
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        Ok(Bytes::from(value.into_byte_vec("Bytes")?))
    }
}

impl RedisScalar for DateTime<Utc> {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        Ok(ScalarValue::Text(
            self.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ))
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        let text = value.to_text("DateTime<Utc>")?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| ConvertError::Parse {
                target: "DateTime<Utc>",
                input: text,
            })
    }
}

impl RedisScalar for Duration {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        let ticks = i64::try_from(self.as_nanos()).map_err(|_| ConvertError::OutOfRange {
            target: "duration ticks",
            value: self.as_nanos().to_string(),
        })?;
        Ok(ScalarValue::Int(ticks))
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        let ticks = value.to_i64("Duration")?;
        let nanos = u64::try_from(ticks).map_err(|_| ConvertError::OutOfRange {
            target: "Duration",
            value: ticks.to_string(),
        })?;
        Ok(Duration::from_nanos(nanos))
    }
}

impl<T: RedisScalar> RedisScalar for Option<T> {
    fn encode(&self) -> Result<ScalarValue, ConvertError> {
        match self {
            None => Ok(ScalarValue::Null),
            Some(inner) => inner.encode(),
        }
    }

    fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(T::decode(value)?))
        }
    }
}

// Arrays of value types travel as a JSON blob; the element type must be
// known at the decode site. Vec<u8> is deliberately absent from this list,
// it is the raw byte-buffer scalar above.
macro_rules! array_scalar {
    ($($ty:ty),* $(,)?) => {$(
        impl RedisScalar for Vec<$ty> {
            fn encode(&self) -> Result<ScalarValue, ConvertError> {
                let blob = serde_json::to_vec(self)?;
                Ok(ScalarValue::Bytes(Bytes::from(blob)))
            }

            fn decode(value: ScalarValue) -> Result<Self, ConvertError> {
                let raw = value.into_byte_vec(concat!("Vec<", stringify!($ty), ">"))?;
                Ok(serde_json::from_slice(&raw)?)
            }
        }
    )*};
}

array_scalar!(i8, i16, i32, i64, u16, u32, u64, f32, f64, bool, String);

/// Declares a unit enum stored as its integer discriminant.
///
/// ```ignore
/// rediset::scalar_enum! {
///     #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
///     pub enum OrderStatus {
///         #[default]
///         Open = 0,
///         Shipped = 1,
///         Closed = 2,
///     }
/// }
/// ```
///
/// Decoding an undeclared discriminant fails with
/// [`ConvertError::UnknownVariant`](crate::ConvertError::UnknownVariant).
#[macro_export]
macro_rules! scalar_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $disc:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant = $disc,
            )+
        }

        impl $crate::RedisScalar for $name {
            fn encode(
                &self,
            ) -> ::std::result::Result<$crate::ScalarValue, $crate::ConvertError> {
                Ok($crate::ScalarValue::Int(match self {
                    $( Self::$variant => $disc as i64, )+
                }))
            }

            fn decode(
                value: $crate::ScalarValue,
            ) -> ::std::result::Result<Self, $crate::ConvertError> {
                let raw = value.to_i64(stringify!($name))?;
                match raw {
                    $( x if x == $disc as i64 => Ok(Self::$variant), )+
                    other => Err($crate::ConvertError::UnknownVariant {
                        name: stringify!($name),
                        value: other,
                    }),
                }
            }
        }
    };
}
