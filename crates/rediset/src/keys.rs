//! Key naming, incremental scanning, and single-key operations.
//!
//! Every collection in this crate is addressed by a [`KeyPrefix`]. Auxiliary
//! keys a collection maintains for itself (index sets, tag registries) live
//! under the `@__` marker so that a prefix scan can tell entity keys from
//! bookkeeping keys.

use std::fmt;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};

use crate::error::{ConvertError, Error, Result};

/// Suffix of the index set tracking derived keys without a TTL.
pub(crate) const INDEX_SUFFIX: &str = "@__SetIndex";
/// Suffix of the index set tracking derived keys with a TTL applied.
pub(crate) const EXPIRE_INDEX_SUFFIX: &str = "@__ExpireIndex";
/// Suffix of the registry set holding every tag in use.
pub(crate) const ALL_TAGS_SUFFIX: &str = "@__AllTags";
/// Prefix for per-tag inverted sets, `{base}@__Tag:{tag}`.
pub(crate) const TAG_SUFFIX: &str = "@__Tag:";
/// Marker that namespaces all bookkeeping keys under a prefix.
pub(crate) const RESERVED_MARKER: &str = "@__";
/// Page-size hint handed to SCAN and SSCAN.
pub(crate) const SCAN_PAGE: usize = 512;

/// Normalized base key prefix of a logical collection.
///
/// Always ends with `:`; derived keys are plain concatenations, so the
/// collection `Orders` owns `Orders:42`, `Orders:@__SetIndex` and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    /// Normalizes `base` into a prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] when `base` is blank.
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let mut base = base.into();
        if base.trim().is_empty() {
            return Err(Error::InvalidKey("base key must not be blank".into()));
        }
        if !base.ends_with(':') {
            base.push(':');
        }
        Ok(KeyPrefix(base))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derived key for `suffix`, `{prefix}{suffix}`.
    pub fn key(&self, suffix: impl fmt::Display) -> String {
        format!("{}{}", self.0, suffix)
    }

    /// Match pattern covering every key under this prefix.
    pub fn pattern(&self) -> String {
        format!("{}*", self.0)
    }

    /// Removes the prefix from a full key, `None` when it does not match.
    pub fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.0.as_str())
    }

    /// True when `key` is one of this prefix's bookkeeping keys.
    pub fn is_reserved(&self, key: &str) -> bool {
        self.strip(key)
            .is_some_and(|rest| rest.starts_with(RESERVED_MARKER))
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects every key matching `pattern` with an incremental SCAN loop.
pub(crate) async fn scan_keys(
    conn: &mut ConnectionManager,
    pattern: &str,
) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_PAGE)
            .query_async(conn)
            .await?;
        keys.extend(page);
        cursor = next;
        if cursor == 0 {
            break;
        }
    }
    Ok(keys)
}

/// Fails with [`Error::WrongType`] when `key` exists with another value type.
pub(crate) async fn assert_key_type(
    conn: &mut ConnectionManager,
    key: &str,
    expected: &'static str,
) -> Result<()> {
    let actual: String = redis::cmd("TYPE").arg(key).query_async(conn).await?;
    if actual == "none" || actual == expected {
        Ok(())
    } else {
        Err(Error::WrongType {
            key: key.to_string(),
            expected,
            actual,
        })
    }
}

/// TTL as whole milliseconds for PEXPIRE, failing past the i64 range.
pub(crate) fn ttl_millis(ttl: Duration) -> Result<i64> {
    i64::try_from(ttl.as_millis()).map_err(|_| {
        Error::Convert(ConvertError::OutOfRange {
            target: "ttl milliseconds",
            value: ttl.as_millis().to_string(),
        })
    })
}

/// Operations available on any collection occupying a single Redis key.
///
/// Implementors provide the key and a connection handle; everything else is
/// a provided method issuing one command.
#[async_trait::async_trait]
pub trait RedisKey: Send + Sync {
    fn key(&self) -> &str;

    /// Swaps the tracked key after a successful rename.
    fn replace_key(&mut self, key: String);

    /// Cheap per-call handle clone; the underlying connection is shared.
    fn connection(&self) -> ConnectionManager;

    async fn exists(&self) -> Result<bool> {
        let mut conn = self.connection();
        Ok(conn.exists(self.key()).await?)
    }

    /// Deletes the key outright. Returns `false` when it did not exist.
    async fn delete(&self) -> Result<bool> {
        let mut conn = self.connection();
        let removed: i64 = conn.del(self.key()).await?;
        Ok(removed > 0)
    }

    /// Remaining TTL, `None` when the key is absent or not time-limited.
    async fn time_to_live(&self) -> Result<Option<Duration>> {
        let mut conn = self.connection();
        let millis: i64 = redis::cmd("PTTL")
            .arg(self.key())
            .query_async(&mut conn)
            .await?;
        if millis < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(millis as u64)))
        }
    }

    /// Applies a TTL. Returns `false` when the key does not exist.
    async fn expire(&self, ttl: Duration) -> Result<bool> {
        let millis = ttl_millis(ttl)?;
        let mut conn = self.connection();
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(self.key())
            .arg(millis)
            .query_async(&mut conn)
            .await?;
        Ok(applied)
    }

    /// Clears any TTL. Returns `false` when none was set.
    async fn persist(&self) -> Result<bool> {
        let mut conn = self.connection();
        Ok(conn.persist(self.key()).await?)
    }

    /// The store-side value type name, `"none"` when the key is absent.
    async fn value_type(&self) -> Result<String> {
        let mut conn = self.connection();
        Ok(redis::cmd("TYPE")
            .arg(self.key())
            .query_async(&mut conn)
            .await?)
    }

    /// Renames the key unless the target already exists. On success the
    /// collection tracks the new key from then on.
    async fn rename(&mut self, new_key: String) -> Result<bool> {
        let mut conn = self.connection();
        let renamed: bool = redis::cmd("RENAMENX")
            .arg(self.key())
            .arg(&new_key)
            .query_async(&mut conn)
            .await?;
        if renamed {
            self.replace_key(new_key);
        }
        Ok(renamed)
    }

    /// Enqueues deletion of the key into `pipe`.
    fn batch_delete(&self, pipe: &mut Pipeline) {
        pipe.del(self.key()).ignore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_gains_trailing_separator() {
        let prefix = KeyPrefix::new("Orders").unwrap();
        assert_eq!(prefix.as_str(), "Orders:");
        assert_eq!(prefix.key(42), "Orders:42");
        assert_eq!(prefix.pattern(), "Orders:*");
    }

    #[test]
    fn test_prefix_keeps_existing_separator() {
        let prefix = KeyPrefix::new("Orders:").unwrap();
        assert_eq!(prefix.as_str(), "Orders:");
        assert_eq!(prefix.to_string(), "Orders:");
    }

    #[test]
    fn test_blank_prefix_is_rejected() {
        assert!(matches!(KeyPrefix::new(""), Err(Error::InvalidKey(_))));
        assert!(matches!(KeyPrefix::new("   "), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_strip_and_reserved_detection() {
        let prefix = KeyPrefix::new("Orders").unwrap();
        assert_eq!(prefix.strip("Orders:42"), Some("42"));
        assert_eq!(prefix.strip("Users:42"), None);

        assert!(prefix.is_reserved(&prefix.key(INDEX_SUFFIX)));
        assert!(prefix.is_reserved(&prefix.key(EXPIRE_INDEX_SUFFIX)));
        assert!(prefix.is_reserved("Orders:@__Tag:red"));
        assert!(!prefix.is_reserved("Orders:42"));
        assert!(!prefix.is_reserved("Users:@__SetIndex"));
    }

    #[test]
    fn test_ttl_millis_overflow() {
        assert_eq!(ttl_millis(Duration::from_secs(90)).unwrap(), 90_000);
        assert!(ttl_millis(Duration::from_secs(u64::MAX)).is_err());
    }
}
