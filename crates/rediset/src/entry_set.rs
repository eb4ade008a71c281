//! Typed entity collection: one hash per entity, indexed membership.
//!
//! ```ignore
//! rediset::hash_record! {
//!     #[derive(Debug, Default, Clone, PartialEq)]
//!     pub struct Order {
//!         pub customer: String,
//!         pub total: f64,
//!     }
//! }
//!
//! let orders: EntrySet<u32, Order> = EntrySet::new(conn, "Orders")?;
//! orders.insert(&42, &Order { customer: "ada".into(), total: 19.99 }).await?;
//! assert!(orders.contains_key(&42).await?);
//! let order = orders.get(&42).await?;
//! ```
//!
//! Every record lives at `{prefix}{id}` as a hash with one field per struct
//! field; membership bookkeeping is delegated to [`KeySpace`]. Reads issue a
//! single `HMGET` over the record's declared field list.

use std::marker::PhantomData;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};

use crate::error::{Error, Result};
use crate::keys::{RedisKey, SCAN_PAGE};
use crate::keyspace::KeySpace;
use crate::record::{is_field, HashRecord};
use crate::value::{EntryId, RedisScalar, ScalarValue};

/// A collection of `R` records keyed by `K`.
pub struct EntrySet<K, R> {
    space: KeySpace<K>,
    _record: PhantomData<fn() -> R>,
}

impl<K, R> Clone for EntrySet<K, R> {
    fn clone(&self) -> Self {
        EntrySet {
            space: self.space.clone(),
            _record: PhantomData,
        }
    }
}

impl<K: EntryId, R: HashRecord> EntrySet<K, R> {
    pub fn new(conn: ConnectionManager, base: impl Into<String>) -> Result<Self> {
        Ok(EntrySet {
            space: KeySpace::new(conn, base)?,
            _record: PhantomData,
        })
    }

    /// The underlying index bookkeeping.
    pub fn keyspace(&self) -> &KeySpace<K> {
        &self.space
    }

    /// Writes the whole record, then indexes the id.
    ///
    /// The two commands are not atomic as a unit; see the
    /// [`keyspace`](crate::keyspace) notes on what a concurrent reader can
    /// observe in between.
    pub async fn insert(&self, id: &K, record: &R) -> Result<()> {
        let entries = record.to_entries()?;
        if !entries.is_empty() {
            let entry = self.space.entry_key(id);
            let mut conn = self.space.connection();
            let _: () = conn.hset_multiple(&entry, &entries).await?;
        }
        let _ = self.space.add_index(std::slice::from_ref(id)).await?;
        Ok(())
    }

    /// Writes every record and all index entries in one pipeline flush.
    pub async fn insert_many(&self, items: &[(K, R)]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        let mut ids = Vec::with_capacity(items.len());
        for (id, record) in items {
            self.enqueue_write(&mut pipe, id, record)?;
            ids.push(id.clone());
        }
        self.space.batch_add_index(&mut pipe, &ids)?;
        let mut conn = self.space.connection();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Rewrites the record's fields without touching the index. The id is
    /// assumed to be indexed already.
    pub async fn update(&self, id: &K, record: &R) -> Result<()> {
        let entries = record.to_entries()?;
        if entries.is_empty() {
            return Ok(());
        }
        let entry = self.space.entry_key(id);
        let mut conn = self.space.connection();
        let _: () = conn.hset_multiple(&entry, &entries).await?;
        Ok(())
    }

    /// Writes a subset of fields.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownField`] when a name is not part of `R`'s
    /// schema; nothing is written in that case.
    pub async fn update_fields(&self, id: &K, fields: &[(&str, ScalarValue)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        for (name, _) in fields {
            if !is_field::<R>(name) {
                return Err(Error::UnknownField {
                    record: R::NAME,
                    field: (*name).to_string(),
                });
            }
        }
        let entry = self.space.entry_key(id);
        let mut conn = self.space.connection();
        let _: () = conn.hset_multiple(&entry, fields).await?;
        Ok(())
    }

    /// Loads the record, `None` when the id is unknown or its key has
    /// expired. Goes through the index check first, so a stale expire-index
    /// entry for this id is reconciled as a side effect.
    pub async fn get(&self, id: &K) -> Result<Option<R>> {
        if !self.space.contains_key(id).await? {
            return Ok(None);
        }
        let values = self.fetch_values(id).await?;
        if values.iter().all(ScalarValue::is_null) {
            return Ok(None);
        }
        Ok(Some(R::from_values(values)?))
    }

    /// Single `HMGET` over the record's declared field list.
    async fn fetch_values(&self, id: &K) -> Result<Vec<ScalarValue>> {
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(self.space.entry_key(id));
        for field in R::FIELDS {
            cmd.arg(*field);
        }
        let mut conn = self.space.connection();
        Ok(cmd.query_async(&mut conn).await?)
    }

    /// Reads one field without materializing the whole record. `None` when
    /// the field has no value stored.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownField`] when `field` is not part of `R`'s
    /// schema.
    pub async fn get_field<F: RedisScalar>(&self, id: &K, field: &str) -> Result<Option<F>> {
        if !is_field::<R>(field) {
            return Err(Error::UnknownField {
                record: R::NAME,
                field: field.to_string(),
            });
        }
        let entry = self.space.entry_key(id);
        let mut conn = self.space.connection();
        let value: ScalarValue = conn.hget(&entry, field).await?;
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(F::decode(value)?))
        }
    }

    /// All current records, read in pipelined chunks. Ids whose key expired
    /// between the listing and the read are skipped.
    pub async fn records(&self) -> Result<Vec<(K, R)>> {
        let ids = self.space.keys().await?;
        let mut out = Vec::with_capacity(ids.len());
        let mut conn = self.space.connection();
        for chunk in ids.chunks(SCAN_PAGE) {
            let mut pipe = redis::pipe();
            for id in chunk {
                let cmd = pipe.cmd("HMGET").arg(self.space.entry_key(id));
                for field in R::FIELDS {
                    cmd.arg(*field);
                }
            }
            let rows: Vec<Vec<ScalarValue>> = pipe.query_async(&mut conn).await?;
            for (id, values) in chunk.iter().zip(rows) {
                if values.iter().all(ScalarValue::is_null) {
                    continue;
                }
                out.push((id.clone(), R::from_values(values)?));
            }
        }
        Ok(out)
    }

    /// All current records without their ids.
    pub async fn values(&self) -> Result<Vec<R>> {
        Ok(self
            .records()
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Deletes the record and unindexes the id. Returns whether the record
    /// existed.
    pub async fn remove(&self, id: &K) -> Result<bool> {
        self.space.remove_key(id).await
    }

    /// Returns how many records actually existed.
    pub async fn remove_many(&self, ids: &[K]) -> Result<u64> {
        self.space.remove_keys(ids).await
    }

    /// Applies (`Some`) or clears (`None`) a TTL on the record, moving the
    /// id between index partitions. `false` when the record does not exist.
    pub async fn expire(&self, id: &K, ttl: Option<Duration>) -> Result<bool> {
        self.space.set_expire(id, ttl).await
    }

    /// Deletes every known record and both index sets in one pipeline
    /// flush. Returns how many ids were tracked.
    pub async fn clear(&self) -> Result<u64> {
        let ids = self.space.keys().await?;
        let mut pipe = redis::pipe();
        self.enqueue_clear(&mut pipe, &ids);
        let mut conn = self.space.connection();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(ids.len() as u64)
    }

    pub async fn contains_key(&self, id: &K) -> Result<bool> {
        self.space.contains_key(id).await
    }

    /// Number of records without a TTL; see [`KeySpace::count`].
    pub async fn count(&self) -> Result<u64> {
        self.space.count().await
    }

    pub async fn keys(&self) -> Result<Vec<K>> {
        self.space.keys().await
    }

    /// See [`KeySpace::rebuild_index`].
    pub async fn rebuild_index<F>(&self, parse: F) -> Result<u64>
    where
        F: Fn(&str) -> Option<K> + Send + Sync,
    {
        self.space.rebuild_index(parse).await
    }

    /// See [`KeySpace::prune_expired`].
    pub async fn prune_expired(&self) -> Result<u64> {
        self.space.prune_expired().await
    }

    fn enqueue_write(&self, pipe: &mut Pipeline, id: &K, record: &R) -> Result<()> {
        let entries = record.to_entries()?;
        if !entries.is_empty() {
            pipe.hset_multiple(self.space.entry_key(id), &entries)
                .ignore();
        }
        Ok(())
    }

    fn enqueue_clear(&self, pipe: &mut Pipeline, ids: &[K]) {
        for chunk in ids.chunks(SCAN_PAGE) {
            let entries: Vec<String> = chunk.iter().map(|id| self.space.entry_key(id)).collect();
            pipe.del(entries).ignore();
        }
        pipe.del(self.space.index().key()).ignore();
        pipe.del(self.space.expire_index().key()).ignore();
    }

    pub fn batch_insert(&self, pipe: &mut Pipeline, id: &K, record: &R) -> Result<()> {
        self.enqueue_write(pipe, id, record)?;
        self.space.batch_add_index(pipe, std::slice::from_ref(id))
    }

    pub fn batch_update(&self, pipe: &mut Pipeline, id: &K, record: &R) -> Result<()> {
        self.enqueue_write(pipe, id, record)
    }

    pub fn batch_remove(&self, pipe: &mut Pipeline, id: &K) -> Result<()> {
        self.space.batch_remove_key(pipe, id)
    }

    pub fn batch_remove_many(&self, pipe: &mut Pipeline, ids: &[K]) -> Result<()> {
        self.space.batch_remove_keys(pipe, ids)
    }

    pub fn batch_expire(&self, pipe: &mut Pipeline, id: &K, ttl: Option<Duration>) -> Result<()> {
        self.space.batch_set_expire(pipe, id, ttl)
    }

    /// Enqueued [`clear`](EntrySet::clear). The id listing happens up
    /// front, so records inserted after this call but before the pipeline
    /// flush survive. Returns how many ids were staged for deletion.
    pub async fn batch_clear(&self, pipe: &mut Pipeline) -> Result<u64> {
        let ids = self.space.keys().await?;
        self.enqueue_clear(pipe, &ids);
        Ok(ids.len() as u64)
    }
}
