//! Typed wrapper over a Redis hash with string fields.

use std::marker::PhantomData;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};

use crate::error::{Error, Result};
use crate::keys::{assert_key_type, RedisKey, SCAN_PAGE};
use crate::value::{RedisScalar, ScalarValue};

/// A Redis hash whose values decode as `V`.
///
/// For one-hash-per-entity layouts with a fixed schema, see
/// [`EntrySet`](crate::EntrySet); this wrapper covers the free-form case
/// where fields are decided at runtime.
pub struct RedisHash<V> {
    conn: ConnectionManager,
    key: String,
    _value: PhantomData<fn() -> V>,
}

impl<V> std::fmt::Debug for RedisHash<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisHash")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<V> Clone for RedisHash<V> {
    fn clone(&self) -> Self {
        RedisHash {
            conn: self.conn.clone(),
            key: self.key.clone(),
            _value: PhantomData,
        }
    }
}

impl<V: RedisScalar + Send + Sync> RedisHash<V> {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidKey("hash key must not be blank".into()));
        }
        Ok(RedisHash {
            conn,
            key,
            _value: PhantomData,
        })
    }

    /// Like [`RedisHash::new`], but also fails with [`Error::WrongType`] when
    /// the key already holds a non-hash value.
    pub async fn checked(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        let hash = Self::new(conn, key)?;
        let mut conn = hash.conn.clone();
        assert_key_type(&mut conn, &hash.key, "hash").await?;
        Ok(hash)
    }

    pub async fn get(&self, field: &str) -> Result<Option<V>> {
        let mut conn = self.conn.clone();
        let value: ScalarValue = conn.hget(&self.key, field).await?;
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(V::decode(value)?))
        }
    }

    /// One `Option` per requested field, in request order.
    pub async fn get_many(&self, fields: &[&str]) -> Result<Vec<Option<V>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(&self.key);
        for field in fields {
            cmd.arg(*field);
        }
        let raw: Vec<ScalarValue> = cmd.query_async(&mut conn).await?;
        raw.into_iter()
            .map(|value| {
                if value.is_null() {
                    Ok(None)
                } else {
                    Ok(Some(V::decode(value)?))
                }
            })
            .collect()
    }

    pub async fn get_all(&self) -> Result<Vec<(String, V)>> {
        let mut conn = self.conn.clone();
        let raw: Vec<(String, ScalarValue)> = conn.hgetall(&self.key).await?;
        raw.into_iter()
            .map(|(field, value)| Ok((field, V::decode(value)?)))
            .collect()
    }

    /// Returns `true` when the field was newly created.
    pub async fn set(&self, field: &str, value: &V) -> Result<bool> {
        let value = value.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.hset(&self.key, field, value).await?)
    }

    pub async fn set_many(&self, entries: &[(&str, V)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pairs = Vec::with_capacity(entries.len());
        for (field, value) in entries {
            pairs.push((*field, value.encode()?));
        }
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(&self.key, &pairs).await?;
        Ok(())
    }

    pub async fn remove(&self, field: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.hdel(&self.key, field).await?)
    }

    pub async fn remove_many(&self, fields: &[&str]) -> Result<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        Ok(conn.hdel(&self.key, fields.to_vec()).await?)
    }

    pub async fn contains_field(&self, field: &str) -> Result<bool> {
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

    pub async fn fields(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hkeys(&self.key).await?)
    }

    pub async fn values(&self) -> Result<Vec<V>> {
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = conn.hvals(&self.key).await?;
        raw.into_iter().map(|value| Ok(V::decode(value)?)).collect()
    }

    /// Field/value pairs whose field name matches `pattern`, gathered with
    /// an incremental HSCAN loop.
    pub async fn scan(&self, pattern: &str) -> Result<Vec<(String, V)>> {
        let mut conn = self.conn.clone();
        let mut found = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<(String, ScalarValue)>) = redis::cmd("HSCAN")
                .arg(&self.key)
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE)
                .query_async(&mut conn)
                .await?;
            for (field, value) in page {
                found.push((field, V::decode(value)?));
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(found)
    }

    pub fn batch_set(&self, pipe: &mut Pipeline, field: &str, value: &V) -> Result<()> {
        let value = value.encode()?;
        pipe.hset(&self.key, field, value).ignore();
        Ok(())
    }

    pub fn batch_set_many(&self, pipe: &mut Pipeline, entries: &[(&str, V)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pairs = Vec::with_capacity(entries.len());
        for (field, value) in entries {
            pairs.push((*field, value.encode()?));
        }
        pipe.hset_multiple(&self.key, &pairs).ignore();
        Ok(())
    }

    pub fn batch_remove(&self, pipe: &mut Pipeline, fields: &[&str]) {
        if fields.is_empty() {
            return;
        }
        pipe.hdel(&self.key, fields.to_vec()).ignore();
    }
}

impl<V: RedisScalar + Send + Sync> RedisKey for RedisHash<V> {
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
