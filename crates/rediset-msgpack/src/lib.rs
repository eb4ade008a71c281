//! # Rediset MsgPack - MessagePack value encoding
//!
//! A [`Serializer`] for rediset's blob-backed collections using MessagePack
//! instead of the default JSON. Denser on the wire and faster to decode, at
//! the cost of values no longer being readable from a Redis CLI.
//!
//! ```ignore
//! use rediset::RedisDictionary;
//! use rediset_msgpack::MsgPackSerializer;
//!
//! let sessions: RedisDictionary<String, Session, _> =
//!     RedisDictionary::with_serializer(conn, "sessions", MsgPackSerializer)?;
//! ```

use rediset::{Error, Result, Serializer};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// MessagePack serialization via `rmp-serde`.
///
/// Structs encode positionally, so reordering or removing fields breaks
/// decoding of previously stored values; append new fields instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

impl Serializer for MsgPackSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec(value).map_err(|e| Error::Serialize(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        rmp_serde::from_slice(data).map_err(|e| Error::Serialize(e.to_string()))
    }
}
