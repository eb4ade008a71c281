//! Multi-key collection core: one key per entity plus membership indexes.
//!
//! A [`KeySpace`] represents a logical collection spread over many Redis
//! keys. Each entity lives at its own derived key, `{prefix}{id}`, and two
//! bookkeeping sets track membership so that listing and counting never
//! require a keyspace scan:
//!
//! - `{prefix}@__SetIndex` holds ids whose derived key has no TTL,
//! - `{prefix}@__ExpireIndex` holds ids whose derived key is time-limited.
//!
//! An id sits in exactly one of the two sets while its derived key exists,
//! and in neither once the key is deleted or has expired.
//!
//! ## Staleness and reconciliation
//!
//! Redis expires keys silently, so an entry in the expire index can outlive
//! its derived key. Nothing sweeps these out in the background; they are
//! reconciled lazily. [`KeySpace::contains_key`] verifies the derived key
//! whenever it finds an id only in the expire index, and drops the entry if
//! the key is gone. [`KeySpace::prune_expired`] does the same for the whole
//! expire index in one pass, and [`KeySpace::rebuild_index`] recovers the
//! no-TTL index from a full prefix scan after arbitrary drift.
//!
//! ## Atomicity
//!
//! Composite operations issue their commands without cross-command
//! isolation, even when pipelined. A concurrent reader can observe a derived
//! key without its index entry or the reverse for the duration of one
//! operation. The lazy reconciliation above and the rebuild path are the
//! compensation; no transactions or retries happen at this layer.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use tracing::{debug, warn};

use crate::error::Result;
use crate::keys::{
    scan_keys, ttl_millis, KeyPrefix, RedisKey, EXPIRE_INDEX_SUFFIX, INDEX_SUFFIX, SCAN_PAGE,
};
use crate::set::RedisSet;
use crate::value::{encode_members, EntryId, ScalarValue};

/// Index bookkeeping for a collection of derived per-entity keys.
///
/// This type maintains the indexes and the derived keys' lifecycle; what a
/// derived key holds is up to the caller. [`EntrySet`](crate::EntrySet) and
/// [`TagSet`](crate::TagSet) build on it.
pub struct KeySpace<K> {
    conn: ConnectionManager,
    prefix: KeyPrefix,
    index: RedisSet<K>,
    expire_index: RedisSet<K>,
}

impl<K> Clone for KeySpace<K> {
    fn clone(&self) -> Self {
        KeySpace {
            conn: self.conn.clone(),
            prefix: self.prefix.clone(),
            index: self.index.clone(),
            expire_index: self.expire_index.clone(),
        }
    }
}

impl<K: EntryId> KeySpace<K> {
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`](crate::Error::InvalidKey) when `base`
    /// is blank.
    pub fn new(conn: ConnectionManager, base: impl Into<String>) -> Result<Self> {
        let prefix = KeyPrefix::new(base)?;
        let index = RedisSet::new(conn.clone(), prefix.key(INDEX_SUFFIX))?;
        let expire_index = RedisSet::new(conn.clone(), prefix.key(EXPIRE_INDEX_SUFFIX))?;
        Ok(KeySpace {
            conn,
            prefix,
            index,
            expire_index,
        })
    }

    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    /// Derived key for `id`. Pure string concatenation, no store access.
    pub fn entry_key(&self, id: &K) -> String {
        self.prefix.key(id)
    }

    /// The no-TTL membership index.
    pub fn index(&self) -> &RedisSet<K> {
        &self.index
    }

    /// The has-TTL membership index.
    pub fn expire_index(&self) -> &RedisSet<K> {
        &self.expire_index
    }

    pub(crate) fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Records ids as present without a TTL. Every write path creating or
    /// refreshing a derived key without a TTL must call this. Returns how
    /// many ids were newly indexed.
    pub async fn add_index(&self, ids: &[K]) -> Result<u64> {
        self.index.add_many(ids).await
    }

    /// Membership check with lazy expire reconciliation.
    ///
    /// An id found in the no-TTL index is trusted as-is. An id found only in
    /// the expire index is verified against the derived key; when the key
    /// has expired the stale entry is dropped as a side effect and the check
    /// reports `false`.
    pub async fn contains_key(&self, id: &K) -> Result<bool> {
        if self.index.contains(id).await? {
            return Ok(true);
        }
        self.check_expired(id).await
    }

    async fn check_expired(&self, id: &K) -> Result<bool> {
        if !self.expire_index.contains(id).await? {
            return Ok(false);
        }
        let entry = self.entry_key(id);
        let mut conn = self.conn.clone();
        let alive: bool = conn.exists(&entry).await?;
        if !alive {
            debug!(key = %entry, "dropping stale expire-index entry");
            let _ = self.expire_index.remove(id).await?;
        }
        Ok(alive)
    }

    /// Number of ids in the no-TTL index. Time-limited entities are not
    /// counted.
    pub async fn count(&self) -> Result<u64> {
        self.index.len().await
    }

    /// All known ids: the union of both indexes. May transiently include
    /// ids whose derived key has already expired.
    pub async fn keys(&self) -> Result<Vec<K>> {
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = redis::cmd("SUNION")
            .arg(self.index.key())
            .arg(self.expire_index.key())
            .query_async(&mut conn)
            .await?;
        raw.into_iter()
            .filter(|value| !value.is_null())
            .map(|value| Ok(K::decode(value)?))
            .collect()
    }

    /// Unindexes `id` and deletes its derived key. Returns whether the key
    /// existed. The expire index is left alone; a stale entry there is
    /// reconciled on the next [`contains_key`](KeySpace::contains_key).
    pub async fn remove_key(&self, id: &K) -> Result<bool> {
        let _ = self.index.remove(id).await?;
        let entry = self.entry_key(id);
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(&entry).await?;
        Ok(removed > 0)
    }

    /// Bulk [`remove_key`](KeySpace::remove_key). Returns how many derived
    /// keys actually existed.
    pub async fn remove_keys(&self, ids: &[K]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let _ = self.index.remove_many(ids).await?;
        let entries: Vec<String> = ids.iter().map(|id| self.entry_key(id)).collect();
        let mut conn = self.conn.clone();
        Ok(conn.del(entries).await?)
    }

    /// Applies or clears a TTL on the derived key, moving the id to the
    /// matching index partition.
    ///
    /// Returns `false` without touching anything when the derived key does
    /// not exist. Otherwise the id is moved first and the TTL command's
    /// outcome is returned; clearing a TTL that was never set yields
    /// `false` from the store.
    pub async fn set_expire(&self, id: &K, ttl: Option<Duration>) -> Result<bool> {
        let entry = self.entry_key(id);
        let mut conn = self.conn.clone();
        let alive: bool = conn.exists(&entry).await?;
        if !alive {
            return Ok(false);
        }

        let member = id.encode()?;
        match ttl {
            Some(ttl) => {
                let millis = ttl_millis(ttl)?;
                let _: bool = redis::cmd("SMOVE")
                    .arg(self.index.key())
                    .arg(self.expire_index.key())
                    .arg(member)
                    .query_async(&mut conn)
                    .await?;
                Ok(redis::cmd("PEXPIRE")
                    .arg(&entry)
                    .arg(millis)
                    .query_async(&mut conn)
                    .await?)
            }
            None => {
                let _: bool = redis::cmd("SMOVE")
                    .arg(self.expire_index.key())
                    .arg(self.index.key())
                    .arg(member)
                    .query_async(&mut conn)
                    .await?;
                Ok(redis::cmd("PERSIST")
                    .arg(&entry)
                    .query_async(&mut conn)
                    .await?)
            }
        }
    }

    /// Sweeps the expire index once, dropping every entry whose derived key
    /// has expired. Returns how many entries were dropped.
    pub async fn prune_expired(&self) -> Result<u64> {
        let tracked = self.expire_index.members().await?;
        let mut dead = Vec::new();
        let mut conn = self.conn.clone();
        for id in &tracked {
            let entry = self.entry_key(id);
            let alive: bool = conn.exists(&entry).await?;
            if !alive {
                dead.push(id.clone());
            }
        }
        if dead.is_empty() {
            return Ok(0);
        }
        let dropped = self.expire_index.remove_many(&dead).await?;
        debug!(
            prefix = %self.prefix,
            dropped,
            "pruned stale expire-index entries"
        );
        Ok(dropped)
    }

    /// Rebuilds the no-TTL index from the keys actually present under the
    /// prefix.
    ///
    /// Scans incrementally, skips this collection's own bookkeeping keys,
    /// and parses each remaining key's id portion with `parse`; keys the
    /// parser rejects are skipped with a warning. The index is cleared and
    /// repopulated in a single pipeline flush so no empty-index window is
    /// observable between the two. The expire index is not reconciled, use
    /// [`prune_expired`](KeySpace::prune_expired) for that.
    ///
    /// Returns the number of ids recovered.
    pub async fn rebuild_index<F>(&self, parse: F) -> Result<u64>
    where
        F: Fn(&str) -> Option<K> + Send + Sync,
    {
        let mut conn = self.conn.clone();
        let found = scan_keys(&mut conn, &self.prefix.pattern()).await?;

        let mut ids = Vec::new();
        for key in &found {
            if self.prefix.is_reserved(key) {
                continue;
            }
            let Some(raw) = self.prefix.strip(key) else {
                continue;
            };
            match parse(raw) {
                Some(id) => ids.push(id),
                None => warn!(key = %key, "skipping unparsable entity key"),
            }
        }

        let members = encode_members(&ids)?;
        let mut pipe = redis::pipe();
        pipe.del(self.index.key()).ignore();
        for chunk in members.chunks(SCAN_PAGE) {
            pipe.sadd(self.index.key(), chunk.to_vec()).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;

        let recovered = ids.len() as u64;
        debug!(prefix = %self.prefix, recovered, "rebuilt index from key scan");
        Ok(recovered)
    }

    pub fn batch_add_index(&self, pipe: &mut Pipeline, ids: &[K]) -> Result<()> {
        self.index.batch_add_many(pipe, ids)
    }

    /// Enqueued [`remove_key`](KeySpace::remove_key); the existence result
    /// is not observable from a pipeline.
    pub fn batch_remove_key(&self, pipe: &mut Pipeline, id: &K) -> Result<()> {
        self.index.batch_remove(pipe, id)?;
        pipe.del(self.entry_key(id)).ignore();
        Ok(())
    }

    pub fn batch_remove_keys(&self, pipe: &mut Pipeline, ids: &[K]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.index.batch_remove_many(pipe, ids)?;
        let entries: Vec<String> = ids.iter().map(|id| self.entry_key(id)).collect();
        pipe.del(entries).ignore();
        Ok(())
    }

    /// Enqueued [`set_expire`](KeySpace::set_expire). No existence precheck
    /// is possible inside a pipeline; applying a TTL to an absent key is a
    /// store-side no-op that leaves a stale index entry for lazy cleanup.
    pub fn batch_set_expire(
        &self,
        pipe: &mut Pipeline,
        id: &K,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let member = id.encode()?;
        let entry = self.entry_key(id);
        match ttl {
            Some(ttl) => {
                let millis = ttl_millis(ttl)?;
                pipe.cmd("SMOVE")
                    .arg(self.index.key())
                    .arg(self.expire_index.key())
                    .arg(member)
                    .ignore();
                pipe.cmd("PEXPIRE").arg(entry).arg(millis).ignore();
            }
            None => {
                pipe.cmd("SMOVE")
                    .arg(self.expire_index.key())
                    .arg(self.index.key())
                    .arg(member)
                    .ignore();
                pipe.cmd("PERSIST").arg(entry).ignore();
            }
        }
        Ok(())
    }
}
