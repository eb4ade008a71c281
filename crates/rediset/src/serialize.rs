//! Pluggable whole-value serialization for blob-backed collections.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Encodes whole values to byte blobs and back.
///
/// Used by [`RedisDictionary`](crate::RedisDictionary), where the value is
/// stored opaquely rather than field-by-field. The default is
/// [`JsonSerializer`]; a MessagePack implementation lives in the companion
/// `rediset-msgpack` crate.
pub trait Serializer: Send + Sync {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;
}

/// JSON serialization via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::Serialize(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        serde_json::from_slice(data).map_err(|e| Error::Serialize(e.to_string()))
    }
}
