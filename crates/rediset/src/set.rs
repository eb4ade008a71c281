//! Typed wrapper over a Redis set.

use std::marker::PhantomData;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};

use crate::error::{Error, Result};
use crate::keys::{assert_key_type, RedisKey, SCAN_PAGE};
use crate::value::{encode_members, RedisScalar, ScalarValue};

/// A Redis set whose members decode as `T`.
///
/// ```ignore
/// let colors: RedisSet<String> = RedisSet::new(conn, "palette")?;
/// colors.add(&"teal".to_string()).await?;
/// assert!(colors.contains(&"teal".to_string()).await?);
/// ```
pub struct RedisSet<T> {
    conn: ConnectionManager,
    key: String,
    _member: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for RedisSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSet")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<T> Clone for RedisSet<T> {
    fn clone(&self) -> Self {
        RedisSet {
            conn: self.conn.clone(),
            key: self.key.clone(),
            _member: PhantomData,
        }
    }
}

impl<T: RedisScalar + Send + Sync> RedisSet<T> {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidKey("set key must not be blank".into()));
        }
        Ok(RedisSet {
            conn,
            key,
            _member: PhantomData,
        })
    }

    /// Like [`RedisSet::new`], but also fails with [`Error::WrongType`] when
    /// the key already holds a non-set value.
    pub async fn checked(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        let set = Self::new(conn, key)?;
        let mut conn = set.conn.clone();
        assert_key_type(&mut conn, &set.key, "set").await?;
        Ok(set)
    }

    pub async fn len(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(&self.key).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn contains(&self, member: &T) -> Result<bool> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.sismember(&self.key, member).await?)
    }

    pub async fn members(&self) -> Result<Vec<T>> {
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = conn.smembers(&self.key).await?;
        raw.into_iter()
            .filter(|value| !value.is_null())
            .map(|value| Ok(T::decode(value)?))
            .collect()
    }

    /// Returns `true` when the member was not already present.
    pub async fn add(&self, member: &T) -> Result<bool> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.sadd(&self.key, member).await?)
    }

    /// Returns the number of members newly added.
    pub async fn add_many(&self, members: &[T]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let members = encode_members(members)?;
        let mut conn = self.conn.clone();
        Ok(conn.sadd(&self.key, members).await?)
    }

    pub async fn remove(&self, member: &T) -> Result<bool> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.srem(&self.key, member).await?)
    }

    pub async fn remove_many(&self, members: &[T]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let members = encode_members(members)?;
        let mut conn = self.conn.clone();
        Ok(conn.srem(&self.key, members).await?)
    }

    /// Members matching `pattern`, gathered with an incremental SSCAN loop.
    pub async fn scan(&self, pattern: &str) -> Result<Vec<T>> {
        let mut conn = self.conn.clone();
        let mut found = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, page): (u64, Vec<ScalarValue>) = redis::cmd("SSCAN")
                .arg(&self.key)
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE)
                .query_async(&mut conn)
                .await?;
            for value in page {
                if !value.is_null() {
                    found.push(T::decode(value)?);
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(found)
    }

    pub fn batch_add(&self, pipe: &mut Pipeline, member: &T) -> Result<()> {
        let member = member.encode()?;
        pipe.sadd(&self.key, member).ignore();
        Ok(())
    }

    pub fn batch_add_many(&self, pipe: &mut Pipeline, members: &[T]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let members = encode_members(members)?;
        pipe.sadd(&self.key, members).ignore();
        Ok(())
    }

    pub fn batch_remove(&self, pipe: &mut Pipeline, member: &T) -> Result<()> {
        let member = member.encode()?;
        pipe.srem(&self.key, member).ignore();
        Ok(())
    }

    pub fn batch_remove_many(&self, pipe: &mut Pipeline, members: &[T]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let members = encode_members(members)?;
        pipe.srem(&self.key, members).ignore();
        Ok(())
    }
}

impl<T: RedisScalar + Send + Sync> RedisKey for RedisSet<T> {
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
