//! # Rediset - Typed Redis Collections
//!
//! Strongly typed collection wrappers over Redis, centered on a multi-key
//! entity layout: one Redis key per entity plus index sets that track
//! membership, so listing and counting entities never scan the keyspace.
//!
//! ## Collections
//!
//! - [`RedisSet`], [`RedisHash`], [`RedisSortedSet`]: one typed key each
//! - [`TimestampSet`]: sorted set scored by last-touch instant
//! - [`GeoSet`]: geospatial membership, position, and radius queries
//! - [`KeySpace`]: the multi-key index core (membership, TTL partitions,
//!   lazy expire reconciliation, index rebuild)
//! - [`EntrySet`]: one hash per entity with a [`hash_record!`] schema
//! - [`RedisDictionary`]: single-hash map with serialized values
//! - [`TagSet`] / [`InvertedIndex`]: tag membership in both directions
//!
//! ## Quick start
//!
//! ```ignore
//! use rediset::{EntrySet, hash_record};
//!
//! hash_record! {
//!     #[derive(Debug, Default, Clone, PartialEq)]
//!     pub struct Order {
//!         pub customer: String,
//!         pub total: f64,
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> rediset::Result<()> {
//!     let conn = rediset::connect("redis://127.0.0.1/").await?;
//!     let orders: EntrySet<u32, Order> = EntrySet::new(conn, "Orders")?;
//!
//!     orders.insert(&42, &Order { customer: "ada".into(), total: 19.99 }).await?;
//!     assert!(orders.contains_key(&42).await?);
//!     assert_eq!(orders.count().await?, 1);
//!
//!     orders.expire(&42, Some(std::time::Duration::from_secs(60))).await?;
//!     Ok(())
//! }
//! ```
//!
//! Connections are cheap cloneable handles over one multiplexed connection;
//! construct collections with clones of the same [`ConnectionManager`].

use tracing::debug;

pub mod dictionary;
pub mod entry_set;
pub mod error;
pub mod geo;
pub mod hash;
pub mod inverted;
pub mod keys;
pub mod keyspace;
pub mod record;
pub mod serialize;
pub mod set;
pub mod sorted_set;
pub mod tags;
pub mod timestamp;
pub mod traits;
pub mod value;

pub use dictionary::RedisDictionary;
pub use entry_set::EntrySet;
pub use error::{ConvertError, Error, Result};
pub use geo::{GeoOrder, GeoPosition, GeoRadiusHit, GeoRadiusOptions, GeoSet, GeoUnit};
pub use hash::RedisHash;
pub use inverted::InvertedIndex;
pub use keys::{KeyPrefix, RedisKey};
pub use keyspace::KeySpace;
pub use record::HashRecord;
pub use serialize::{JsonSerializer, Serializer};
pub use set::RedisSet;
pub use sorted_set::RedisSortedSet;
pub use tags::TagSet;
pub use timestamp::TimestampSet;
pub use traits::{EntryBatch, EntryRead, EntryWrite};
pub use value::{EntryId, RedisScalar, ScalarValue};

/// Re-exported client types; collections are constructed from a
/// [`ConnectionManager`] and batch variants enqueue into a [`Pipeline`].
pub use redis::aio::ConnectionManager;
pub use redis::Pipeline;

/// Opens a managed connection to `url`.
///
/// The returned handle multiplexes one connection and reconnects on
/// failure; clone it freely across collections and tasks.
pub async fn connect(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url)?;
    let conn = ConnectionManager::new(client).await?;
    debug!("connected to redis");
    Ok(conn)
}
