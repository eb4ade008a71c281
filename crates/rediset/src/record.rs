//! Typed hash records.
//!
//! An entity is stored as one Redis hash per key, one hash field per struct
//! field. [`HashRecord`] is the schema contract: a stable field list plus
//! positional encode/decode, so reads can be issued as a single `HMGET` with
//! a fixed field order. [`hash_record!`](crate::hash_record) derives the whole
//! contract from a struct declaration:
//!
//! ```ignore
//! rediset::hash_record! {
//!     #[derive(Debug, Default, Clone, PartialEq)]
//!     pub struct Order {
//!         pub customer: String,
//!         pub total: f64,
//!         pub closed: bool,
//!     }
//! }
//! ```
//!
//! `None` fields are omitted on write and absent fields come back as the
//! field type's default, so records written by older revisions of a struct
//! still decode after fields are added.

use crate::error::ConvertError;
use crate::value::ScalarValue;

/// Schema contract for structs stored as Redis hashes.
pub trait HashRecord: Send + Sync + Sized {
    /// Record name used in error messages.
    const NAME: &'static str;

    /// Hash field names in declaration order. `from_values` consumes values
    /// in exactly this order.
    const FIELDS: &'static [&'static str];

    /// Field name / value pairs for writing. `None` fields are skipped.
    fn to_entries(&self) -> Result<Vec<(&'static str, ScalarValue)>, ConvertError>;

    /// Rebuild from values positionally aligned with [`Self::FIELDS`].
    /// Null entries take the field type's default.
    fn from_values(values: Vec<ScalarValue>) -> Result<Self, ConvertError>;
}

/// True when `field` is a declared field of `R`.
pub(crate) fn is_field<R: HashRecord>(field: &str) -> bool {
    R::FIELDS.contains(&field)
}

/// Declares a struct together with its [`HashRecord`] schema.
///
/// Every field type must implement [`RedisScalar`](crate::RedisScalar) and
/// `Default`. Types without a default, such as `DateTime<Utc>`, are declared
/// as `Option<T>`.
#[macro_export]
macro_rules! hash_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $fty,
            )+
        }

        impl $crate::HashRecord for $name {
            const NAME: &'static str = stringify!($name);

            const FIELDS: &'static [&'static str] = &[$(stringify!($field)),+];

            fn to_entries(
                &self,
            ) -> ::std::result::Result<
                ::std::vec::Vec<(&'static str, $crate::ScalarValue)>,
                $crate::ConvertError,
            > {
                let mut entries = ::std::vec::Vec::with_capacity(Self::FIELDS.len());
                $(
                    let value = $crate::RedisScalar::encode(&self.$field)?;
                    if !value.is_null() {
                        entries.push((stringify!($field), value));
                    }
                )+
                Ok(entries)
            }

            fn from_values(
                values: ::std::vec::Vec<$crate::ScalarValue>,
            ) -> ::std::result::Result<Self, $crate::ConvertError> {
                let mut values = values.into_iter();
                Ok(Self {
                    $(
                        $field: match values.next() {
                            ::std::option::Option::Some(value) if !value.is_null() => {
                                $crate::RedisScalar::decode(value)?
                            }
                            _ => <$fty as ::std::default::Default>::default(),
                        },
                    )+
                })
            }
        }
    };
}
