//! Inverted index: one set per value, members are entity ids.
//!
//! Turns "which entities carry value X" into a single set read instead of a
//! keyspace scan. [`TagSet`](crate::TagSet) uses one of these for its
//! tag-to-entities direction; it is usable standalone for any
//! value-to-owners mapping.

use std::marker::PhantomData;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};

use crate::error::Result;
use crate::keys::{scan_keys, KeyPrefix, SCAN_PAGE};
use crate::value::{RedisScalar, ScalarValue};

/// Maps values to the set of ids carrying each value.
///
/// Each distinct value owns a set at `{prefix}{value}`. The index does not
/// track which values exist; callers that need that keep a registry
/// alongside, as [`TagSet`](crate::TagSet) does, or enumerate with
/// [`values`](InvertedIndex::values).
pub struct InvertedIndex<K> {
    conn: ConnectionManager,
    prefix: KeyPrefix,
    _id: PhantomData<fn() -> K>,
}

impl<K> Clone for InvertedIndex<K> {
    fn clone(&self) -> Self {
        InvertedIndex {
            conn: self.conn.clone(),
            prefix: self.prefix.clone(),
            _id: PhantomData,
        }
    }
}

impl<K: RedisScalar + Send + Sync> InvertedIndex<K> {
    pub fn new(conn: ConnectionManager, base: impl Into<String>) -> Result<Self> {
        Ok(InvertedIndex {
            conn,
            prefix: KeyPrefix::new(base)?,
            _id: PhantomData,
        })
    }

    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    /// Key of the set holding `value`'s ids.
    pub fn value_key(&self, value: &str) -> String {
        self.prefix.key(value)
    }

    /// Ids carrying `value`. Empty when the value is unknown.
    pub async fn ids(&self, value: &str) -> Result<Vec<K>> {
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = conn.smembers(self.value_key(value)).await?;
        raw.into_iter()
            .filter(|member| !member.is_null())
            .map(|member| Ok(K::decode(member)?))
            .collect()
    }

    pub async fn contains(&self, value: &str, id: &K) -> Result<bool> {
        let member = id.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.sismember(self.value_key(value), member).await?)
    }

    pub async fn count(&self, value: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(self.value_key(value)).await?)
    }

    /// Records `id` under each value, one pipeline flush.
    pub async fn add(&self, id: &K, values: &[&str]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        self.batch_add(&mut pipe, id, values)?;
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Drops `id` from each value's set, one pipeline flush.
    pub async fn remove(&self, id: &K, values: &[&str]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        self.batch_remove(&mut pipe, id, values)?;
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Deletes a value's whole set. Returns `false` when it did not exist.
    pub async fn delete_value(&self, value: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(self.value_key(value)).await?;
        Ok(removed > 0)
    }

    /// Every distinct value currently indexed, recovered from a key scan.
    pub async fn values(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let found = scan_keys(&mut conn, &self.prefix.pattern()).await?;
        Ok(found
            .iter()
            .filter_map(|key| self.prefix.strip(key))
            .map(str::to_string)
            .collect())
    }

    /// Deletes every value set under the prefix. Returns how many were
    /// found by the scan.
    pub async fn clear(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let found = scan_keys(&mut conn, &self.prefix.pattern()).await?;
        if found.is_empty() {
            return Ok(0);
        }
        let mut pipe = redis::pipe();
        for chunk in found.chunks(SCAN_PAGE) {
            pipe.del(chunk.to_vec()).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(found.len() as u64)
    }

    pub fn batch_add(&self, pipe: &mut Pipeline, id: &K, values: &[&str]) -> Result<()> {
        let member = id.encode()?;
        for value in values {
            pipe.sadd(self.value_key(value), member.clone()).ignore();
        }
        Ok(())
    }

    pub fn batch_remove(&self, pipe: &mut Pipeline, id: &K, values: &[&str]) -> Result<()> {
        let member = id.encode()?;
        for value in values {
            pipe.srem(self.value_key(value), member.clone()).ignore();
        }
        Ok(())
    }

    pub fn batch_delete_value(&self, pipe: &mut Pipeline, value: &str) {
        pipe.del(self.value_key(value)).ignore();
    }
}
