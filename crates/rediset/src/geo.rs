//! Geospatial set wrapper.
//!
//! Unlike the entity collections, a [`GeoSet`] occupies a single key: the
//! store's geo commands already index membership, position, and radius
//! queries inside one sorted set, so no index bookkeeping is needed. Only
//! the member codec and batch conventions are shared with the rest of the
//! crate.

use std::marker::PhantomData;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Pipeline};

use crate::error::{Error, Result};
use crate::keys::{assert_key_type, RedisKey};
use crate::value::{RedisScalar, ScalarValue};

/// Distance unit accepted by the geo command family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeoUnit {
    #[default]
    Meters,
    Kilometers,
    Miles,
    Feet,
}

impl GeoUnit {
    fn as_arg(self) -> &'static str {
        match self {
            GeoUnit::Meters => "m",
            GeoUnit::Kilometers => "km",
            GeoUnit::Miles => "mi",
            GeoUnit::Feet => "ft",
        }
    }
}

/// A WGS84 coordinate, longitude first as the store expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPosition {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        GeoPosition {
            longitude,
            latitude,
        }
    }
}

/// Result ordering for radius queries, by distance from the center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoOrder {
    Ascending,
    Descending,
}

/// Tuning knobs for radius queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoRadiusOptions {
    /// Cap on the number of hits returned.
    pub count: Option<usize>,
    pub order: Option<GeoOrder>,
}

/// One radius query hit: the member, its distance from the center in the
/// query's unit, and its stored position.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRadiusHit<M> {
    pub member: M,
    pub distance: f64,
    pub position: GeoPosition,
}

/// A geo-indexed set whose members decode as `M`.
///
/// ```ignore
/// let cities: GeoSet<String> = GeoSet::new(conn, "cities")?;
/// cities.add(&"Palermo".to_string(), GeoPosition::new(13.361389, 38.115556)).await?;
/// let near = cities
///     .radius(GeoPosition::new(15.0, 37.0), 200.0, GeoUnit::Kilometers, &Default::default())
///     .await?;
/// ```
pub struct GeoSet<M> {
    conn: ConnectionManager,
    key: String,
    _member: PhantomData<fn() -> M>,
}

impl<M> Clone for GeoSet<M> {
    fn clone(&self) -> Self {
        GeoSet {
            conn: self.conn.clone(),
            key: self.key.clone(),
            _member: PhantomData,
        }
    }
}

impl<M: RedisScalar + Send + Sync> GeoSet<M> {
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidKey("geo set key must not be blank".into()));
        }
        Ok(GeoSet {
            conn,
            key,
            _member: PhantomData,
        })
    }

    /// Geo data lives in a sorted set, so the type check expects `zset`.
    pub async fn checked(conn: ConnectionManager, key: impl Into<String>) -> Result<Self> {
        let set = Self::new(conn, key)?;
        let mut conn = set.conn.clone();
        assert_key_type(&mut conn, &set.key, "zset").await?;
        Ok(set)
    }

    /// Returns `true` when the member was newly added rather than moved.
    pub async fn add(&self, member: &M, position: GeoPosition) -> Result<bool> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        let added: i64 = redis::cmd("GEOADD")
            .arg(&self.key)
            .arg(position.longitude)
            .arg(position.latitude)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(added > 0)
    }

    pub async fn add_many(&self, entries: &[(M, GeoPosition)]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("GEOADD");
        cmd.arg(&self.key);
        for (member, position) in entries {
            cmd.arg(position.longitude)
                .arg(position.latitude)
                .arg(member.encode()?);
        }
        let mut conn = self.conn.clone();
        Ok(cmd.query_async(&mut conn).await?)
    }

    /// Geo members are plain sorted-set members underneath, removal is ZREM.
    pub async fn remove(&self, member: &M) -> Result<bool> {
        let member = member.encode()?;
        let mut conn = self.conn.clone();
        Ok(conn.zrem(&self.key, member).await?)
    }

    pub async fn position(&self, member: &M) -> Result<Option<GeoPosition>> {
        let mut hits = self.positions(std::slice::from_ref(member)).await?;
        Ok(hits.pop().flatten())
    }

    /// One position per requested member, `None` where the member is absent.
    pub async fn positions(&self, members: &[M]) -> Result<Vec<Option<GeoPosition>>> {
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("GEOPOS");
        cmd.arg(&self.key);
        for member in members {
            cmd.arg(member.encode()?);
        }
        let mut conn = self.conn.clone();
        let raw: Vec<Option<(f64, f64)>> = cmd.query_async(&mut conn).await?;
        Ok(raw
            .into_iter()
            .map(|pair| pair.map(|(longitude, latitude)| GeoPosition::new(longitude, latitude)))
            .collect())
    }

    /// Distance between two members, `None` when either is absent.
    pub async fn distance(&self, from: &M, to: &M, unit: GeoUnit) -> Result<Option<f64>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GEODIST")
            .arg(&self.key)
            .arg(from.encode()?)
            .arg(to.encode()?)
            .arg(unit.as_arg())
            .query_async(&mut conn)
            .await?)
    }

    /// The member's geohash string, `None` when absent.
    pub async fn geo_hash(&self, member: &M) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let mut hashes: Vec<Option<String>> = redis::cmd("GEOHASH")
            .arg(&self.key)
            .arg(member.encode()?)
            .query_async(&mut conn)
            .await?;
        Ok(hashes.pop().flatten())
    }

    /// Members within `radius` of a coordinate, with distance and position.
    pub async fn radius(
        &self,
        center: GeoPosition,
        radius: f64,
        unit: GeoUnit,
        options: &GeoRadiusOptions,
    ) -> Result<Vec<GeoRadiusHit<M>>> {
        let mut cmd = redis::cmd("GEORADIUS");
        cmd.arg(&self.key)
            .arg(center.longitude)
            .arg(center.latitude)
            .arg(radius)
            .arg(unit.as_arg());
        self.query_radius(cmd, options).await
    }

    /// Members within `radius` of an existing member's position.
    ///
    /// # Errors
    ///
    /// The store rejects the query when `member` is not in the set; that
    /// surfaces as [`Error::Redis`].
    pub async fn radius_of(
        &self,
        member: &M,
        radius: f64,
        unit: GeoUnit,
        options: &GeoRadiusOptions,
    ) -> Result<Vec<GeoRadiusHit<M>>> {
        let mut cmd = redis::cmd("GEORADIUSBYMEMBER");
        cmd.arg(&self.key)
            .arg(member.encode()?)
            .arg(radius)
            .arg(unit.as_arg());
        self.query_radius(cmd, options).await
    }

    async fn query_radius(
        &self,
        mut cmd: redis::Cmd,
        options: &GeoRadiusOptions,
    ) -> Result<Vec<GeoRadiusHit<M>>> {
        cmd.arg("WITHCOORD").arg("WITHDIST");
        if let Some(count) = options.count {
            cmd.arg("COUNT").arg(count);
        }
        match options.order {
            Some(GeoOrder::Ascending) => {
                cmd.arg("ASC");
            }
            Some(GeoOrder::Descending) => {
                cmd.arg("DESC");
            }
            None => {}
        }

        let mut conn = self.conn.clone();
        let raw: Vec<(ScalarValue, f64, (f64, f64))> = cmd.query_async(&mut conn).await?;
        raw.into_iter()
            .map(|(member, distance, (longitude, latitude))| {
                Ok(GeoRadiusHit {
                    member: M::decode(member)?,
                    distance,
                    position: GeoPosition::new(longitude, latitude),
                })
            })
            .collect()
    }

    pub async fn len(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(&self.key).await?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn members(&self) -> Result<Vec<M>> {
        let mut conn = self.conn.clone();
        let raw: Vec<ScalarValue> = conn.zrange(&self.key, 0, -1).await?;
        raw.into_iter().map(|value| Ok(M::decode(value)?)).collect()
    }

    pub fn batch_add(
        &self,
        pipe: &mut Pipeline,
        member: &M,
        position: GeoPosition,
    ) -> Result<()> {
        let member = member.encode()?;
        pipe.cmd("GEOADD")
            .arg(&self.key)
            .arg(position.longitude)
            .arg(position.latitude)
            .arg(member)
            .ignore();
        Ok(())
    }

    pub fn batch_add_many(&self, pipe: &mut Pipeline, entries: &[(M, GeoPosition)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let cmd = pipe.cmd("GEOADD").arg(&self.key);
        for (member, position) in entries {
            cmd.arg(position.longitude)
                .arg(position.latitude)
                .arg(member.encode()?);
        }
        cmd.ignore();
        Ok(())
    }

    pub fn batch_remove(&self, pipe: &mut Pipeline, member: &M) -> Result<()> {
        let member = member.encode()?;
        pipe.zrem(&self.key, member).ignore();
        Ok(())
    }
}

impl<M: RedisScalar + Send + Sync> RedisKey for GeoSet<M> {
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
    fn test_unit_args() {
        assert_eq!(GeoUnit::Meters.as_arg(), "m");
        assert_eq!(GeoUnit::Kilometers.as_arg(), "km");
        assert_eq!(GeoUnit::Miles.as_arg(), "mi");
        assert_eq!(GeoUnit::Feet.as_arg(), "ft");
        assert_eq!(GeoUnit::default(), GeoUnit::Meters);
    }
}
