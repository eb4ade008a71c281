//! Capability traits over the keyed collections.
//!
//! Collections expose their full surface inherently; these traits carve out
//! the common `K -> V` subset so callers can stay generic over the backing
//! layout. [`EntrySet`](crate::EntrySet) is readable, writable, and
//! batchable; [`RedisDictionary`](crate::RedisDictionary) is read-capable
//! here, its write surface differs enough (serializer, single key) that it
//! stays inherent.

use std::time::Duration;

use redis::Pipeline;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dictionary::RedisDictionary;
use crate::entry_set::EntrySet;
use crate::error::Result;
use crate::record::HashRecord;
use crate::serialize::Serializer;
use crate::value::{EntryId, RedisScalar};

/// Read access to a keyed collection.
#[async_trait::async_trait]
pub trait EntryRead<K, V>: Send + Sync {
    async fn contains_key(&self, key: &K) -> Result<bool>;

    async fn get(&self, key: &K) -> Result<Option<V>>;

    async fn keys(&self) -> Result<Vec<K>>;

    async fn count(&self) -> Result<u64>;
}

/// Write access to a keyed collection.
#[async_trait::async_trait]
pub trait EntryWrite<K, V>: EntryRead<K, V> {
    async fn insert(&self, key: &K, value: &V) -> Result<()>;

    async fn remove(&self, key: &K) -> Result<bool>;

    async fn expire(&self, key: &K, ttl: Option<Duration>) -> Result<bool>;

    async fn clear(&self) -> Result<u64>;
}

/// Pipeline-staged mutation of a keyed collection. Enqueueing never talks
/// to the store; failures surface when the caller flushes the pipeline.
pub trait EntryBatch<K, V> {
    fn batch_insert(&self, pipe: &mut Pipeline, key: &K, value: &V) -> Result<()>;

    fn batch_remove(&self, pipe: &mut Pipeline, key: &K) -> Result<()>;

    fn batch_expire(&self, pipe: &mut Pipeline, key: &K, ttl: Option<Duration>) -> Result<()>;
}

#[async_trait::async_trait]
impl<K: EntryId, R: HashRecord> EntryRead<K, R> for EntrySet<K, R> {
    async fn contains_key(&self, key: &K) -> Result<bool> {
        EntrySet::contains_key(self, key).await
    }

    async fn get(&self, key: &K) -> Result<Option<R>> {
        EntrySet::get(self, key).await
    }

    async fn keys(&self) -> Result<Vec<K>> {
        EntrySet::keys(self).await
    }

    async fn count(&self) -> Result<u64> {
        EntrySet::count(self).await
    }
}

#[async_trait::async_trait]
impl<K: EntryId, R: HashRecord> EntryWrite<K, R> for EntrySet<K, R> {
    async fn insert(&self, key: &K, value: &R) -> Result<()> {
        EntrySet::insert(self, key, value).await
    }

    async fn remove(&self, key: &K) -> Result<bool> {
        EntrySet::remove(self, key).await
    }

    async fn expire(&self, key: &K, ttl: Option<Duration>) -> Result<bool> {
        EntrySet::expire(self, key, ttl).await
    }

    async fn clear(&self) -> Result<u64> {
        EntrySet::clear(self).await
    }
}

impl<K: EntryId, R: HashRecord> EntryBatch<K, R> for EntrySet<K, R> {
    fn batch_insert(&self, pipe: &mut Pipeline, key: &K, value: &R) -> Result<()> {
        EntrySet::batch_insert(self, pipe, key, value)
    }

    fn batch_remove(&self, pipe: &mut Pipeline, key: &K) -> Result<()> {
        EntrySet::batch_remove(self, pipe, key)
    }

    fn batch_expire(&self, pipe: &mut Pipeline, key: &K, ttl: Option<Duration>) -> Result<()> {
        EntrySet::batch_expire(self, pipe, key, ttl)
    }
}

#[async_trait::async_trait]
impl<K, V, S> EntryRead<K, V> for RedisDictionary<K, V, S>
where
    K: RedisScalar + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
    S: Serializer,
{
    async fn contains_key(&self, key: &K) -> Result<bool> {
        RedisDictionary::contains_key(self, key).await
    }

    async fn get(&self, key: &K) -> Result<Option<V>> {
        RedisDictionary::get(self, key).await
    }

    async fn keys(&self) -> Result<Vec<K>> {
        RedisDictionary::keys(self).await
    }

    async fn count(&self) -> Result<u64> {
        RedisDictionary::len(self).await
    }
}
