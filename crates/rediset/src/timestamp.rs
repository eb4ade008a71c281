//! Sorted set specialization keyed by wall-clock time.
//!
//! Members are scored with their last-touch instant as fractional unix
//! seconds, which makes "everything seen since X" and "prune everything
//! older than X" single range commands. Useful for presence tracking and
//! last-seen registries.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Pipeline;

use crate::error::{ConvertError, Error, Result};
use crate::keys::RedisKey;
use crate::sorted_set::RedisSortedSet;
use crate::value::RedisScalar;

fn to_score(when: DateTime<Utc>) -> f64 {
    when.timestamp_millis() as f64 / 1000.0
}

fn from_score(score: f64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis((score * 1000.0).round() as i64).ok_or_else(|| {
        Error::Convert(ConvertError::OutOfRange {
            target: "DateTime<Utc>",
            value: score.to_string(),
        })
    })
}

/// A sorted set scoring each member by timestamp.
pub struct TimestampSet<M> {
    inner: RedisSortedSet<M>,
}

impl<M> Clone for TimestampSet<M> {
    fn clone(&self) -> Self {
        TimestampSet {
            inner: self.inner.clone(),
        }
    }
}

impl<M: RedisScalar + Send + Sync> TimestampSet<M> {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        Ok(TimestampSet {
            inner: RedisSortedSet::new(conn, key)?,
        })
    }

    pub async fn checked(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        Ok(TimestampSet {
            inner: RedisSortedSet::checked(conn, key).await?,
        })
    }

    /// Records `member` as seen at `when`, overwriting any earlier instant.
    /// Returns `true` when the member was not tracked before.
    pub async fn touch(&self, member: &M, when: DateTime<Utc>) -> Result<bool> {
        self.inner.add(member, to_score(when)).await
    }

    pub async fn touch_now(&self, member: &M) -> Result<bool> {
        self.touch(member, Utc::now()).await
    }

    /// Last recorded instant for `member`, `None` when untracked.
    pub async fn timestamp(&self, member: &M) -> Result<Option<DateTime<Utc>>> {
        match self.inner.score(member).await? {
            None => Ok(None),
            Some(score) => Ok(Some(from_score(score)?)),
        }
    }

    /// Members touched within `[start, end]`, most recent first.
    pub async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(M, DateTime<Utc>)>> {
        let raw = self
            .inner
            .rev_range_by_score_with_scores(to_score(end), to_score(start))
            .await?;
        decode_timed(raw)
    }

    /// Members last touched at or before `cutoff`, oldest first.
    pub async fn older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<(M, DateTime<Utc>)>> {
        let raw = self
            .inner
            .range_by_score_with_scores(f64::NEG_INFINITY, to_score(cutoff))
            .await?;
        decode_timed(raw)
    }

    /// Drops every member last touched at or before `cutoff`. Returns the
    /// number removed.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner
            .remove_range_by_score(f64::NEG_INFINITY, to_score(cutoff))
            .await
    }

    pub async fn count(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<u64> {
        self.inner.count(to_score(start), to_score(end)).await
    }

    pub async fn remove(&self, member: &M) -> Result<bool> {
        self.inner.remove(member).await
    }

    pub async fn remove_many(&self, members: &[M]) -> Result<u64> {
        self.inner.remove_many(members).await
    }

    pub async fn len(&self) -> Result<u64> {
        self.inner.len().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.inner.is_empty().await
    }

    /// Members ordered oldest to newest.
    pub async fn members(&self) -> Result<Vec<M>> {
        self.inner.members().await
    }

    /// The underlying sorted set, for raw score access.
    pub fn as_sorted_set(&self) -> &RedisSortedSet<M> {
        &self.inner
    }

    pub fn batch_touch(
        &self,
        pipe: &mut Pipeline,
        member: &M,
        when: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.batch_add(pipe, member, to_score(when))
    }

    pub fn batch_remove(&self, pipe: &mut Pipeline, member: &M) -> Result<()> {
        self.inner.batch_remove(pipe, member)
    }

    pub fn batch_prune_older_than(&self, pipe: &mut Pipeline, cutoff: DateTime<Utc>) {
        self.inner
            .batch_remove_range_by_score(pipe, f64::NEG_INFINITY, to_score(cutoff));
    }
}

fn decode_timed<M>(raw: Vec<(M, f64)>) -> Result<Vec<(M, DateTime<Utc>)>> {
    raw.into_iter()
        .map(|(member, score)| Ok((member, from_score(score)?)))
        .collect()
}

impl<M: RedisScalar + Send + Sync> RedisKey for TimestampSet<M> {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn replace_key(&mut self, key: String) {
        self.inner.replace_key(key);
    }

    fn connection(&self) -> ConnectionManager {
        self.inner.connection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_round_trips_at_millisecond_precision() {
        let when = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(from_score(to_score(when)).unwrap(), when);
    }

    #[test]
    fn test_pre_epoch_instants_keep_ordering() {
        let before = DateTime::from_timestamp_millis(-86_400_000).unwrap();
        let after = DateTime::from_timestamp_millis(86_400_000).unwrap();
        assert!(to_score(before) < to_score(after));
        assert_eq!(from_score(to_score(before)).unwrap(), before);
    }

    #[test]
    fn test_absurd_score_is_an_error() {
        assert!(from_score(1.0e300).is_err());
    }
}
