//! Tag index over entity ids, maintained in both directions.
//!
//! Three kinds of keys live under one prefix:
//!
//! - forward sets `{prefix}{id}` holding an entity's tags,
//! - inverted sets `{prefix}@__Tag:{tag}` holding a tag's entity ids,
//! - a registry set `{prefix}@__AllTags` of every tag ever applied.
//!
//! Writes keep forward and inverted sets in step inside one pipeline flush,
//! so tag-to-entities lookup is a single set read instead of a scan over
//! every entity.
//!
//! ```ignore
//! let tags: TagSet<String> = TagSet::new(conn, "ShipTags")?;
//! tags.add_tags(&ship_id, &["cargo", "anchored"]).await?;
//! let anchored = tags.ids_by_tag("anchored").await?;
//! ```
//!
//! Tags are trimmed on the way in and blank tags are dropped.

use std::str::FromStr;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};
use tracing::{debug, warn};

use crate::error::Result;
use crate::inverted::InvertedIndex;
use crate::keys::{scan_keys, KeyPrefix, RedisKey, ALL_TAGS_SUFFIX, SCAN_PAGE, TAG_SUFFIX};
use crate::set::RedisSet;
use crate::value::EntryId;

/// Bidirectional tag membership for entities keyed by `K`.
pub struct TagSet<K> {
    conn: ConnectionManager,
    prefix: KeyPrefix,
    registry: RedisSet<String>,
    inverted: InvertedIndex<K>,
}

impl<K> Clone for TagSet<K> {
    fn clone(&self) -> Self {
        TagSet {
            conn: self.conn.clone(),
            prefix: self.prefix.clone(),
            registry: self.registry.clone(),
            inverted: self.inverted.clone(),
        }
    }
}

fn clean<'a>(tags: &[&'a str]) -> Vec<&'a str> {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .collect()
}

impl<K: EntryId> TagSet<K> {
    pub fn new(conn: ConnectionManager, base: impl Into<String>) -> Result<Self> {
        let prefix = KeyPrefix::new(base)?;
        let registry = RedisSet::new(conn.clone(), prefix.key(ALL_TAGS_SUFFIX))?;
        let inverted = InvertedIndex::new(conn.clone(), prefix.key(TAG_SUFFIX))?;
        Ok(TagSet {
            conn,
            prefix,
            registry,
            inverted,
        })
    }

    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    /// Key of the entity's forward tag set.
    pub fn entity_key(&self, id: &K) -> String {
        self.prefix.key(id)
    }

    /// Tags an entity, updating the forward set, the inverted sets, and the
    /// registry in one pipeline flush. Returns how many tags were new to
    /// the entity.
    pub async fn add_tags(&self, id: &K, tags: &[&str]) -> Result<u64> {
        let tags = clean(tags);
        if tags.is_empty() {
            return Ok(0);
        }
        let mut pipe = redis::pipe();
        pipe.sadd(self.entity_key(id), tags.clone());
        pipe.sadd(self.registry.key(), tags.clone()).ignore();
        self.inverted.batch_add(&mut pipe, id, &tags)?;
        let mut conn = self.conn.clone();
        let (added,): (u64,) = pipe.query_async(&mut conn).await?;
        Ok(added)
    }

    /// Untags an entity on both directions. The registry keeps the tag,
    /// other entities may still carry it; [`delete_tag`](TagSet::delete_tag)
    /// retires a tag everywhere. Returns how many tags the entity lost.
    pub async fn remove_tags(&self, id: &K, tags: &[&str]) -> Result<u64> {
        let tags = clean(tags);
        if tags.is_empty() {
            return Ok(0);
        }
        let mut pipe = redis::pipe();
        pipe.srem(self.entity_key(id), tags.clone());
        self.inverted.batch_remove(&mut pipe, id, &tags)?;
        let mut conn = self.conn.clone();
        let (removed,): (u64,) = pipe.query_async(&mut conn).await?;
        Ok(removed)
    }

    /// The entity's tags.
    pub async fn tags(&self, id: &K) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(self.entity_key(id)).await?)
    }

    pub async fn has_tag(&self, id: &K, tag: &str) -> Result<bool> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Ok(false);
        }
        let mut conn = self.conn.clone();
        Ok(conn.sismember(self.entity_key(id), tag).await?)
    }

    /// Entities carrying `tag`, read from the inverted set.
    pub async fn ids_by_tag(&self, tag: &str) -> Result<Vec<K>> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Ok(Vec::new());
        }
        self.inverted.ids(tag).await
    }

    /// Number of entities carrying `tag`.
    pub async fn count_by_tag(&self, tag: &str) -> Result<u64> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Ok(0);
        }
        self.inverted.count(tag).await
    }

    /// Every tag ever applied, from the registry.
    pub async fn all_tags(&self) -> Result<Vec<String>> {
        self.registry.members().await
    }

    /// Every entity that has a forward tag set, recovered from a key scan.
    /// Keys whose id portion does not parse are skipped with a warning.
    pub async fn entities(&self) -> Result<Vec<K>>
    where
        K: FromStr,
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
            match raw.parse::<K>() {
                Ok(id) => ids.push(id),
                Err(_) => warn!(key = %key, "skipping unparsable tag entity key"),
            }
        }
        Ok(ids)
    }

    /// Drops an entity entirely: its ids are removed from every inverted
    /// set it appeared in and its forward set is deleted, one pipeline
    /// flush. Returns how many tags it carried.
    pub async fn remove_entity(&self, id: &K) -> Result<u64> {
        let tags = self.tags(id).await?;
        let refs: Vec<&str> = tags.iter().map(String::as_str).collect();
        let mut pipe = redis::pipe();
        self.inverted.batch_remove(&mut pipe, id, &refs)?;
        pipe.del(self.entity_key(id)).ignore();
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(tags.len() as u64)
    }

    /// Retires a tag everywhere: removes it from every carrying entity's
    /// forward set, deletes its inverted set, and drops it from the
    /// registry, one pipeline flush. Returns how many entities carried it.
    pub async fn delete_tag(&self, tag: &str) -> Result<u64> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Ok(0);
        }
        let ids = self.inverted.ids(tag).await?;
        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.srem(self.entity_key(id), tag).ignore();
        }
        self.inverted.batch_delete_value(&mut pipe, tag);
        pipe.srem(self.registry.key(), tag).ignore();
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(tag, entities = ids.len(), "deleted tag everywhere");
        Ok(ids.len() as u64)
    }

    /// Deletes every key this tag index owns. The bookkeeping keys are
    /// enqueued ahead of the forward sets so the inverted index never
    /// outlives the data it points at.
    pub async fn reset(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let found = scan_keys(&mut conn, &self.prefix.pattern()).await?;
        if found.is_empty() {
            return Ok(());
        }
        let (aux, forward): (Vec<String>, Vec<String>) = found
            .into_iter()
            .partition(|key| self.prefix.is_reserved(key));
        let mut pipe = redis::pipe();
        for chunk in aux.chunks(SCAN_PAGE) {
            pipe.del(chunk.to_vec()).ignore();
        }
        for chunk in forward.chunks(SCAN_PAGE) {
            pipe.del(chunk.to_vec()).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(
            prefix = %self.prefix,
            aux = aux.len(),
            forward = forward.len(),
            "reset tag index"
        );
        Ok(())
    }

    /// Enqueued [`add_tags`](TagSet::add_tags); counts are not observable
    /// from a pipeline.
    pub fn batch_add_tags(&self, pipe: &mut Pipeline, id: &K, tags: &[&str]) -> Result<()> {
        let tags = clean(tags);
        if tags.is_empty() {
            return Ok(());
        }
        pipe.sadd(self.entity_key(id), tags.clone()).ignore();
        pipe.sadd(self.registry.key(), tags.clone()).ignore();
        self.inverted.batch_add(pipe, id, &tags)
    }

    pub fn batch_remove_tags(&self, pipe: &mut Pipeline, id: &K, tags: &[&str]) -> Result<()> {
        let tags = clean(tags);
        if tags.is_empty() {
            return Ok(());
        }
        pipe.srem(self.entity_key(id), tags.clone()).ignore();
        self.inverted.batch_remove(pipe, id, &tags)
    }
}
