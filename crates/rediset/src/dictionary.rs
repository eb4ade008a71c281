//! Hash-backed typed dictionary with serialized values.
//!
//! Keys encode through the scalar codec and become hash fields; values are
//! serialized whole into blobs via a pluggable [`Serializer`]. Use this when
//! the value type is nested or evolves too freely for the flat per-field
//! layout of [`EntrySet`](crate::EntrySet).

use std::marker::PhantomData;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::keys::{assert_key_type, RedisKey};
use crate::serialize::{JsonSerializer, Serializer};
use crate::value::{RedisScalar, ScalarValue};

/// A Redis hash acting as a `K -> V` map, one blob per value.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Profile { name: String, logins: u32 }
///
/// let profiles: RedisDictionary<u64, Profile> =
///     RedisDictionary::json(conn, "profiles")?;
/// profiles.insert(&7, &profile).await?;
/// ```
pub struct RedisDictionary<K, V, S = JsonSerializer> {
    conn: ConnectionManager,
    key: String,
    serializer: S,
    _entry: PhantomData<fn() -> (K, V)>,
}

impl<K, V, S> std::fmt::Debug for RedisDictionary<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisDictionary")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<K, V, S: Clone> Clone for RedisDictionary<K, V, S> {
    fn clone(&self) -> Self {
        RedisDictionary {
            conn: self.conn.clone(),
            key: self.key.clone(),
            serializer: self.serializer.clone(),
            _entry: PhantomData,
        }
    }
}

impl<K, V> RedisDictionary<K, V, JsonSerializer>
where
    K: RedisScalar + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    /// Dictionary with the default JSON value encoding.
    pub fn json(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        Self::with_serializer(conn, key, JsonSerializer)
    }
}

impl<K, V, S> RedisDictionary<K, V, S>
where
    K: RedisScalar + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
    S: Serializer,
{
    pub fn with_serializer(
        conn: ConnectionManager,
        key: impl Into<String>,
        serializer: S,
    ) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidKey("dictionary key must not be blank".into()));
        }
        Ok(RedisDictionary {
            conn,
            key,
            serializer,
            _entry: PhantomData,
        })
    }

    /// Like [`RedisDictionary::with_serializer`], but also fails with
    /// [`Error::WrongType`] when the key already holds a non-hash value.
    pub async fn checked(
        conn: ConnectionManager,
        key: impl Into<String>,
        serializer: S,
    ) -> Result<Self> {
        let dict = Self::with_serializer(conn, key, serializer)?;
        let mut conn = dict.conn.clone();
        assert_key_type(&mut conn, &dict.key, "hash").await?;
        Ok(dict)
    }

    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        let field = key.encode()?;
        let mut conn = self.conn.clone();
        let value: ScalarValue = conn.hget(&self.key, field).await?;
        self.decode_value(value)
    }

    /// One `Option` per requested key, in request order.
    pub async fn get_many(&self, keys: &[K]) -> Result<Vec<Option<V>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(&self.key);
        for key in keys {
            cmd.arg(key.encode()?);
        }
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = cmd.query_async(&mut conn).await?;
        raw.into_iter()
            .map(|value| self.decode_value(value))
            .collect()
    }

    /// Returns `true` when the key was newly created rather than replaced.
    pub async fn insert(&self, key: &K, value: &V) -> Result<bool> {
        let field = key.encode()?;
        let blob = self.serializer.serialize(value)?;
        let mut conn = self.conn.clone();
        Ok(conn.hset(&self.key, field, blob).await?)
    }

    pub async fn insert_many(&self, items: &[(K, V)]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let pairs = self.encode_items(items)?;
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(&self.key, &pairs).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &K) -> Result<bool> {
        let field = key.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.hdel(&self.key, field).await?)
    }

    pub async fn remove_many(&self, keys: &[K]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let fields = crate::value::encode_members(keys)?;
        let mut conn = self.conn.clone();
        Ok(conn.hdel(&self.key, fields).await?)
    }

    pub async fn contains_key(&self, key: &K) -> Result<bool> {
        let field = key.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.hexists(&self.key, field).await?)
    }

    pub async fn len(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.hlen(&self.key).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn keys(&self) -> Result<Vec<K>> {
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = conn.hkeys(&self.key).await?;
        raw.into_iter().map(|value| Ok(K::decode(value)?)).collect()
    }

    pub async fn values(&self) -> Result<Vec<V>> {
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = conn.hvals(&self.key).await?;
        raw.into_iter()
            .map(|value| self.deserialize_blob(value))
            .collect()
    }

    pub async fn entries(&self) -> Result<Vec<(K, V)>> {
        let mut conn = self.conn.clone();
        let raw: Vec<(ScalarValue, ScalarValue)> = conn.hgetall(&self.key).await?;
        raw.into_iter()
            .map(|(field, value)| Ok((K::decode(field)?, self.deserialize_blob(value)?)))
            .collect()
    }

    /// Drops every entry by deleting the backing key. Returns `false` when
    /// the dictionary was already empty.
    pub async fn clear(&self) -> Result<bool> {
        RedisKey::delete(self).await
    }

    pub fn batch_insert(&self, pipe: &mut Pipeline, key: &K, value: &V) -> Result<()> {
        let field = key.encode()?;
        let blob = self.serializer.serialize(value)?;
        pipe.hset(&self.key, field, blob).ignore();
        Ok(())
    }

    pub fn batch_insert_many(&self, pipe: &mut Pipeline, items: &[(K, V)]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let pairs = self.encode_items(items)?;
        pipe.hset_multiple(&self.key, &pairs).ignore();
        Ok(())
    }

    pub fn batch_remove(&self, pipe: &mut Pipeline, key: &K) -> Result<()> {
        let field = key.encode()?;
        pipe.hdel(&self.key, field).ignore();
        Ok(())
    }

    pub fn batch_remove_many(&self, pipe: &mut Pipeline, keys: &[K]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let fields = crate::value::encode_members(keys)?;
        pipe.hdel(&self.key, fields).ignore();
        Ok(())
    }

    fn encode_items(&self, items: &[(K, V)]) -> Result<Vec<(ScalarValue, Vec<u8>)>> {
        let mut pairs = Vec::with_capacity(items.len());
        for (key, value) in items {
            pairs.push((key.encode()?, self.serializer.serialize(value)?));
        }
        Ok(pairs)
    }

    fn decode_value(&self, value: ScalarValue) -> Result<Option<V>> {
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(self.deserialize_blob(value)?))
        }
    }

    fn deserialize_blob(&self, value: ScalarValue) -> Result<V> {
        let blob = value.into_byte_vec("dictionary value")?;
        self.serializer.deserialize(&blob)
    }
}

impl<K, V, S> RedisKey for RedisDictionary<K, V, S>
where
    K: RedisScalar + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
    S: Serializer,
{
    fn key(&self) -> &str {
        &self.key
    }

    fn replace_key(&mut self, key: String) {
        self.key = key;
    }

    fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}
