//! Typed wrapper over a Redis sorted set.

use std::marker::PhantomData;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};

use crate::error::{Error, Result};
use crate::keys::{assert_key_type, RedisKey, SCAN_PAGE};
use crate::value::{RedisScalar, ScalarValue};

/// Score bound formatted for the BYSCORE command family, mapping the
/// infinities to `-inf` / `+inf`.
fn score_arg(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

/// A Redis sorted set whose members decode as `M`.
///
/// Range bounds follow the store's conventions: score ranges are inclusive
/// and accept the infinities, rank ranges accept negative indices counted
/// from the tail.
pub struct RedisSortedSet<M> {
    conn: ConnectionManager,
    key: String,
    _member: PhantomData<fn() -> M>,
}

impl<M> std::fmt::Debug for RedisSortedSet<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSortedSet")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<M> Clone for RedisSortedSet<M> {
    fn clone(&self) -> Self {
        RedisSortedSet {
            conn: self.conn.clone(),
            key: self.key.clone(),
            _member: PhantomData,
        }
    }
}

impl<M: RedisScalar + Send + Sync> RedisSortedSet<M> {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidKey("sorted set key must not be blank".into()));
        }
        Ok(RedisSortedSet {
            conn,
            key,
            _member: PhantomData,
        })
    }

    /// Like [`RedisSortedSet::new`], but also fails with [`Error::WrongType`]
    /// when the key already holds a non-zset value.
    pub async fn checked(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        let set = Self::new(conn, key)?;
        let mut conn = set.conn.clone();
        assert_key_type(&mut conn, &set.key, "zset").await?;
        Ok(set)
    }

    /// Returns `true` when the member was newly added rather than rescored.
    pub async fn add(&self, member: &M, score: f64) -> Result<bool> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.zadd(&self.key, member, score).await?)
    }

    pub async fn add_many(&self, entries: &[(M, f64)]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut pairs = Vec::with_capacity(entries.len());
        for (member, score) in entries {
            pairs.push((*score, member.encode()?));
        }
        let mut conn = self.conn.clone();
        Ok(conn.zadd_multiple(&self.key, &pairs).await?)
    }

    pub async fn remove(&self, member: &M) -> Result<bool> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.zrem(&self.key, member).await?)
    }

    pub async fn remove_many(&self, members: &[M]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let members = crate::value::encode_members(members)?;
        let mut conn = self.conn.clone();
        Ok(conn.zrem(&self.key, members).await?)
    }

    pub async fn score(&self, member: &M) -> Result<Option<f64>> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.zscore(&self.key, member).await?)
    }

    /// Ascending rank of the member, `None` when absent.
    pub async fn rank(&self, member: &M) -> Result<Option<u64>> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.zrank(&self.key, member).await?)
    }

    pub async fn len(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(&self.key).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Members with a score in `[min, max]`.
    pub async fn count(&self, min: f64, max: f64) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("ZCOUNT")
            .arg(&self.key)
            .arg(score_arg(min))
            .arg(score_arg(max))
            .query_async(&mut conn)
            .await?)
    }

    pub async fn range_by_rank(&self, start: isize, stop: isize) -> Result<Vec<M>> {
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = conn.zrange(&self.key, start, stop).await?;
        raw.into_iter().map(|value| Ok(M::decode(value)?)).collect()
    }

    pub async fn range_by_rank_with_scores(
        &self,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(M, f64)>> {
        let mut conn = self.conn.clone();
        let raw: Vec<(ScalarValue, f64)> = redis::cmd("ZRANGE")
            .arg(&self.key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        decode_scored(raw)
    }

    pub async fn range_by_score(&self, min: f64, max: f64) -> Result<Vec<M>> {
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.key)
            .arg(score_arg(min))
            .arg(score_arg(max))
            .query_async(&mut conn)
            .await?;
        raw.into_iter().map(|value| Ok(M::decode(value)?)).collect()
    }

    pub async fn range_by_score_with_scores(
        &self,
        min: f64,
        max: f64,
    ) -> Result<Vec<(M, f64)>> {
        let mut conn = self.conn.clone();
        let raw: Vec<(ScalarValue, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.key)
            .arg(score_arg(min))
            .arg(score_arg(max))
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        decode_scored(raw)
    }

    /// Members with a score in `[min, max]`, highest score first.
    pub async fn rev_range_by_score_with_scores(
        &self,
        max: f64,
        min: f64,
    ) -> Result<Vec<(M, f64)>> {
        let mut conn = self.conn.clone();
        let raw: Vec<(ScalarValue, f64)> = redis::cmd("ZREVRANGEBYSCORE")
            .arg(&self.key)
            .arg(score_arg(max))
            .arg(score_arg(min))
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        decode_scored(raw)
    }

    pub async fn remove_range_by_rank(&self, start: isize, stop: isize) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zremrangebyrank(&self.key, start, stop).await?)
    }

    pub async fn remove_range_by_score(&self, min: f64, max: f64) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("ZREMRANGEBYSCORE")
            .arg(&self.key)
            .arg(score_arg(min))
            .arg(score_arg(max))
            .query_async(&mut conn)
            .await?)
    }

    /// Adds `delta` to the member's score, creating it at `delta` if absent.
    pub async fn increment(&self, member: &M, delta: f64) -> Result<f64> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.zincr(&self.key, member, delta).await?)
    }

    pub async fn members(&self) -> Result<Vec<M>> {
        self.range_by_rank(0, -1).await
    }

    /// Member/score pairs whose member matches `pattern`, gathered with an
    /// incremental ZSCAN loop.
    pub async fn scan(&self, pattern: &str) -> Result<Vec<(M, f64)>> {
        let mut conn = self.conn.clone();
        let mut found = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<(ScalarValue, f64)>) = redis::cmd("ZSCAN")
                .arg(&self.key)
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE)
                .query_async(&mut conn)
                .await?;
            for (member, score) in page {
                found.push((M::decode(member)?, score));
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(found)
    }

    pub fn batch_add(&self, pipe: &mut Pipeline, member: &M, score: f64) -> Result<()> {
        let member = member.encode()?;
        pipe.zadd(&self.key, member, score).ignore();
        Ok(())
    }

    pub fn batch_add_many(&self, pipe: &mut Pipeline, entries: &[(M, f64)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pairs = Vec::with_capacity(entries.len());
        for (member, score) in entries {
            pairs.push((*score, member.encode()?));
        }
        pipe.zadd_multiple(&self.key, &pairs).ignore();
        Ok(())
    }

    pub fn batch_remove(&self, pipe: &mut Pipeline, member: &M) -> Result<()> {
        let member = member.encode()?;
        pipe.zrem(&self.key, member).ignore();
        Ok(())
    }

    pub fn batch_remove_many(&self, pipe: &mut Pipeline, members: &[M]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let members = crate::value::encode_members(members)?;
        pipe.zrem(&self.key, members).ignore();
        Ok(())
    }

    pub fn batch_remove_range_by_score(&self, pipe: &mut Pipeline, min: f64, max: f64) {
        pipe.cmd("ZREMRANGEBYSCORE")
            .arg(&self.key)
            .arg(score_arg(min))
            .arg(score_arg(max))
            .ignore();
    }
}

fn decode_scored<M: RedisScalar>(raw: Vec<(ScalarValue, f64)>) -> Result<Vec<(M, f64)>> {
    raw.into_iter()
        .map(|(value, score)| Ok((M::decode(value)?, score)))
        .collect()
}

impl<M: RedisScalar + Send + Sync> RedisKey for RedisSortedSet<M> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_arg_formats_infinities() {
        assert_eq!(score_arg(f64::NEG_INFINITY), "-inf");
        assert_eq!(score_arg(f64::INFINITY), "+inf");
        assert_eq!(score_arg(42.0), "42");
        assert_eq!(score_arg(1.5), "1.5");
    }
}
