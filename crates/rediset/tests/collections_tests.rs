//! Single-key collection behavior against a live server.

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use redis::AsyncCommands;
use rediset::{
    EntryRead, Error, JsonSerializer, RedisDictionary, RedisHash, RedisKey, RedisSet,
    RedisSortedSet, TimestampSet,
};
use serde::{Deserialize, Serialize};

#[tokio::test]
async fn test_set_operations() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_set_operations: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("set");
    let colors: RedisSet<String> = RedisSet::new(conn.clone(), base.clone()).unwrap();

    assert!(colors.is_empty().await.unwrap());
    assert!(colors.add(&"teal".to_string()).await.unwrap());
    assert!(!colors.add(&"teal".to_string()).await.unwrap());
    assert_eq!(
        colors
            .add_many(&["teal".into(), "mauve".into(), "ochre".into()])
            .await
            .unwrap(),
        2
    );
    assert_eq!(colors.add_many(&[]).await.unwrap(), 0);

    assert_eq!(colors.len().await.unwrap(), 3);
    assert!(colors.contains(&"mauve".to_string()).await.unwrap());
    assert!(!colors.contains(&"puce".to_string()).await.unwrap());
    let mut members = colors.members().await.unwrap();
    members.sort_unstable();
    assert_eq!(members, vec!["mauve", "ochre", "teal"]);

    let mut starred = colors.scan("*e*").await.unwrap();
    starred.sort_unstable();
    assert_eq!(starred, vec!["mauve", "ochre", "teal"]);
    assert_eq!(colors.scan("m*").await.unwrap(), vec!["mauve"]);

    assert!(colors.remove(&"teal".to_string()).await.unwrap());
    assert!(!colors.remove(&"teal".to_string()).await.unwrap());
    assert_eq!(
        colors
            .remove_many(&["mauve".into(), "puce".into()])
            .await
            .unwrap(),
        1
    );
    assert_eq!(colors.len().await.unwrap(), 1);

    let mut pipe = redis::pipe();
    colors
        .batch_add_many(&mut pipe, &["azure".into(), "jade".into()])
        .unwrap();
    colors.batch_remove(&mut pipe, &"ochre".to_string()).unwrap();
    let mut raw = conn.clone();
    let _: () = pipe.query_async(&mut raw).await.unwrap();
    let mut members = colors.members().await.unwrap();
    members.sort_unstable();
    assert_eq!(members, vec!["azure", "jade"]);

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_hash_operations() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_hash_operations: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("hash");
    let counts: RedisHash<i64> = RedisHash::new(conn.clone(), base.clone()).unwrap();

    assert!(counts.set("alpha", &1).await.unwrap());
    assert!(!counts.set("alpha", &10).await.unwrap());
    counts
        .set_many(&[("beta", 2), ("gamma", 3)])
        .await
        .unwrap();

    assert_eq!(counts.get("alpha").await.unwrap(), Some(10));
    assert_eq!(counts.get("missing").await.unwrap(), None);
    assert_eq!(
        counts.get_many(&["alpha", "missing", "gamma"]).await.unwrap(),
        vec![Some(10), None, Some(3)]
    );
    assert!(counts.contains_field("beta").await.unwrap());
    assert!(!counts.contains_field("missing").await.unwrap());
    assert_eq!(counts.len().await.unwrap(), 3);

    let mut all = counts.get_all().await.unwrap();
    all.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        all,
        vec![
            ("alpha".to_string(), 10),
            ("beta".to_string(), 2),
            ("gamma".to_string(), 3)
        ]
    );
    let mut fields = counts.fields().await.unwrap();
    fields.sort_unstable();
    assert_eq!(fields, vec!["alpha", "beta", "gamma"]);
    let mut values = counts.values().await.unwrap();
    values.sort_unstable();
    assert_eq!(values, vec![2, 3, 10]);
    let mut scanned = counts.scan("*a*").await.unwrap();
    scanned.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        scanned,
        vec![
            ("alpha".to_string(), 10),
            ("beta".to_string(), 2),
            ("gamma".to_string(), 3)
        ]
    );
    assert_eq!(counts.scan("al*").await.unwrap(), vec![("alpha".to_string(), 10)]);

    assert!(counts.remove("alpha").await.unwrap());
    assert!(!counts.remove("alpha").await.unwrap());
    assert_eq!(counts.remove_many(&["beta", "missing"]).await.unwrap(), 1);

    let mut pipe = redis::pipe();
    counts.batch_set(&mut pipe, "delta", &4).unwrap();
    counts
        .batch_set_many(&mut pipe, &[("epsilon", 5), ("zeta", 6)])
        .unwrap();
    counts.batch_remove(&mut pipe, &["gamma"]);
    let mut raw = conn.clone();
    let _: () = pipe.query_async(&mut raw).await.unwrap();
    let mut fields = counts.fields().await.unwrap();
    fields.sort_unstable();
    assert_eq!(fields, vec!["delta", "epsilon", "zeta"]);

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_sorted_set_operations() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_sorted_set_operations: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("zset");
    let board: RedisSortedSet<String> = RedisSortedSet::new(conn.clone(), base.clone()).unwrap();

    assert!(board.add(&"low".to_string(), 1.0).await.unwrap());
    assert!(!board.add(&"low".to_string(), 1.0).await.unwrap());
    assert_eq!(
        board
            .add_many(&[("mid".to_string(), 2.5), ("high".to_string(), 9.0)])
            .await
            .unwrap(),
        2
    );

    assert_eq!(board.len().await.unwrap(), 3);
    assert_eq!(board.score(&"mid".to_string()).await.unwrap(), Some(2.5));
    assert_eq!(board.score(&"ghost".to_string()).await.unwrap(), None);
    assert_eq!(board.rank(&"low".to_string()).await.unwrap(), Some(0));
    assert_eq!(board.rank(&"high".to_string()).await.unwrap(), Some(2));
    assert_eq!(
        board.count(f64::NEG_INFINITY, f64::INFINITY).await.unwrap(),
        3
    );
    assert_eq!(board.count(2.0, 9.0).await.unwrap(), 2);

    assert_eq!(
        board.range_by_rank(0, -1).await.unwrap(),
        vec!["low", "mid", "high"]
    );
    assert_eq!(
        board.range_by_rank_with_scores(0, 0).await.unwrap(),
        vec![("low".to_string(), 1.0)]
    );
    assert_eq!(
        board.range_by_score(2.0, 9.0).await.unwrap(),
        vec!["mid", "high"]
    );
    assert_eq!(
        board
            .rev_range_by_score_with_scores(f64::INFINITY, f64::NEG_INFINITY)
            .await
            .unwrap(),
        vec![
            ("high".to_string(), 9.0),
            ("mid".to_string(), 2.5),
            ("low".to_string(), 1.0)
        ]
    );

    let mut scanned = board.scan("*i*").await.unwrap();
    scanned.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        scanned,
        vec![("high".to_string(), 9.0), ("mid".to_string(), 2.5)]
    );

    assert_eq!(board.increment(&"low".to_string(), 10.0).await.unwrap(), 11.0);
    assert_eq!(board.rank(&"low".to_string()).await.unwrap(), Some(2));
    // Creates absent members at the delta.
    assert_eq!(board.increment(&"new".to_string(), 4.0).await.unwrap(), 4.0);

    assert_eq!(board.remove_range_by_score(0.0, 4.5).await.unwrap(), 2);
    assert_eq!(board.members().await.unwrap(), vec!["high", "low"]);
    assert_eq!(board.remove_range_by_rank(0, 0).await.unwrap(), 1);

    assert!(board.remove(&"low".to_string()).await.unwrap());
    assert!(!board.remove(&"low".to_string()).await.unwrap());
    assert!(board.is_empty().await.unwrap());

    let mut pipe = redis::pipe();
    board.batch_add(&mut pipe, &"a".to_string(), 1.0).unwrap();
    board
        .batch_add_many(&mut pipe, &[("b".to_string(), 2.0), ("c".to_string(), 3.0)])
        .unwrap();
    board.batch_remove(&mut pipe, &"a".to_string()).unwrap();
    board.batch_remove_range_by_score(&mut pipe, 2.5, 3.5);
    let mut raw = conn.clone();
    let _: () = pipe.query_async(&mut raw).await.unwrap();
    assert_eq!(board.members().await.unwrap(), vec!["b"]);

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_timestamp_set_operations() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_timestamp_set_operations: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("seen");
    let seen: TimestampSet<String> = TimestampSet::new(conn.clone(), base.clone()).unwrap();

    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap();

    assert!(seen.touch(&"alpha".to_string(), t0).await.unwrap());
    assert!(seen.touch(&"beta".to_string(), t1).await.unwrap());
    assert!(seen.touch(&"gamma".to_string(), t2).await.unwrap());
    // Re-touching rescores instead of adding.
    assert!(!seen.touch(&"gamma".to_string(), t2).await.unwrap());

    assert_eq!(seen.timestamp(&"beta".to_string()).await.unwrap(), Some(t1));
    assert_eq!(seen.timestamp(&"ghost".to_string()).await.unwrap(), None);

    assert_eq!(
        seen.range(t0, t2).await.unwrap(),
        vec![
            ("gamma".to_string(), t2),
            ("beta".to_string(), t1),
            ("alpha".to_string(), t0)
        ]
    );
    assert_eq!(
        seen.older_than(t1).await.unwrap(),
        vec![("alpha".to_string(), t0), ("beta".to_string(), t1)]
    );
    assert_eq!(seen.count(t0, t1).await.unwrap(), 2);
    assert_eq!(seen.members().await.unwrap(), vec!["alpha", "beta", "gamma"]);

    // The raw score is fractional unix seconds.
    let score = seen
        .as_sorted_set()
        .score(&"gamma".to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(score, t2.timestamp_millis() as f64 / 1000.0);

    assert_eq!(seen.prune_older_than(t1).await.unwrap(), 2);
    assert_eq!(seen.len().await.unwrap(), 1);
    assert_eq!(seen.prune_older_than(t1).await.unwrap(), 0);

    assert!(seen.touch_now(&"delta".to_string()).await.unwrap());
    assert!(seen.timestamp(&"delta".to_string()).await.unwrap().is_some());
    assert!(seen.remove(&"delta".to_string()).await.unwrap());

    // Touch and prune staged in one flush: the stale member never survives.
    let mut pipe = redis::pipe();
    seen.batch_touch(&mut pipe, &"epsilon".to_string(), t0).unwrap();
    seen.batch_prune_older_than(&mut pipe, t0);
    let mut raw = conn.clone();
    let _: () = pipe.query_async(&mut raw).await.unwrap();
    assert_eq!(seen.members().await.unwrap(), vec!["gamma"]);

    common::cleanup(&conn, &base).await;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    logins: u32,
}

#[tokio::test]
async fn test_dictionary_operations() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_dictionary_operations: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("dict");
    let profiles: RedisDictionary<u64, Profile> =
        RedisDictionary::json(conn.clone(), base.clone()).unwrap();

    let ada = Profile {
        name: "ada".into(),
        logins: 3,
    };
    let grace = Profile {
        name: "grace".into(),
        logins: 7,
    };

    assert!(profiles.insert(&7, &ada).await.unwrap());
    // Replacing reports false, and the new value sticks.
    let ada_again = Profile {
        name: "ada".into(),
        logins: 4,
    };
    assert!(!profiles.insert(&7, &ada_again).await.unwrap());
    assert_eq!(profiles.get(&7).await.unwrap(), Some(ada_again.clone()));
    assert_eq!(profiles.get(&8).await.unwrap(), None);

    profiles
        .insert_many(&[(8, grace.clone()), (9, ada.clone())])
        .await
        .unwrap();
    assert_eq!(
        profiles.get_many(&[7, 999, 8]).await.unwrap(),
        vec![Some(ada_again.clone()), None, Some(grace.clone())]
    );
    assert_eq!(profiles.len().await.unwrap(), 3);
    assert!(!profiles.is_empty().await.unwrap());
    assert!(profiles.contains_key(&9).await.unwrap());
    assert!(!profiles.contains_key(&999).await.unwrap());

    let mut keys = profiles.keys().await.unwrap();
    keys.sort_unstable();
    assert_eq!(keys, vec![7, 8, 9]);
    let mut entries = profiles.entries().await.unwrap();
    entries.sort_by_key(|(key, _)| *key);
    assert_eq!(
        entries,
        vec![(7, ada_again.clone()), (8, grace.clone()), (9, ada.clone())]
    );
    let mut names: Vec<String> = profiles
        .values()
        .await
        .unwrap()
        .into_iter()
        .map(|profile| profile.name)
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["ada", "ada", "grace"]);

    // The read trait works over the dictionary too.
    let readable: &dyn EntryRead<u64, Profile> = &profiles;
    assert!(readable.contains_key(&7).await.unwrap());
    assert_eq!(readable.get(&8).await.unwrap(), Some(grace.clone()));
    assert_eq!(readable.count().await.unwrap(), 3);

    assert!(profiles.remove(&8).await.unwrap());
    assert!(!profiles.remove(&8).await.unwrap());
    assert_eq!(profiles.remove_many(&[7, 8, 9]).await.unwrap(), 2);
    assert!(profiles.is_empty().await.unwrap());

    let mut pipe = redis::pipe();
    profiles.batch_insert(&mut pipe, &1, &ada).unwrap();
    profiles
        .batch_insert_many(&mut pipe, &[(2, grace.clone()), (3, ada.clone())])
        .unwrap();
    profiles.batch_remove(&mut pipe, &1).unwrap();
    profiles.batch_remove_many(&mut pipe, &[3]).unwrap();
    let mut raw = conn.clone();
    let _: () = pipe.query_async(&mut raw).await.unwrap();
    assert_eq!(profiles.keys().await.unwrap(), vec![2]);

    assert!(profiles.clear().await.unwrap());
    assert!(!profiles.clear().await.unwrap());
    assert!(profiles.is_empty().await.unwrap());

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_checked_constructors_guard_value_types() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_checked_constructors_guard_value_types: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("guard");
    let occupied = format!("{base}:plain");
    let mut raw = conn.clone();
    let _: () = raw.set(&occupied, "just a string").await.unwrap();

    let err = RedisSet::<String>::checked(conn.clone(), occupied.clone())
        .await
        .unwrap_err();
    match err {
        Error::WrongType {
            key,
            expected,
            actual,
        } => {
            assert_eq!(key, occupied);
            assert_eq!(expected, "set");
            assert_eq!(actual, "string");
        }
        other => panic!("expected WrongType, got {other:?}"),
    }

    let err = RedisHash::<i64>::checked(conn.clone(), occupied.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WrongType { expected: "hash", .. }));
    let err = RedisSortedSet::<String>::checked(conn.clone(), occupied.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WrongType { expected: "zset", .. }));
    let err = RedisDictionary::<u64, Profile, _>::checked(
        conn.clone(),
        occupied.clone(),
        JsonSerializer,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::WrongType { expected: "hash", .. }));

    // Absent keys pass, as does a key already holding the right type.
    assert!(
        RedisSet::<String>::checked(conn.clone(), format!("{base}:absent"))
            .await
            .is_ok()
    );
    let colors: RedisSet<String> = RedisSet::new(conn.clone(), format!("{base}:colors")).unwrap();
    colors.add(&"teal".to_string()).await.unwrap();
    assert!(
        RedisSet::<String>::checked(conn.clone(), format!("{base}:colors"))
            .await
            .is_ok()
    );

    // Blank keys are rejected before any command is issued.
    assert!(matches!(
        RedisSet::<String>::new(conn.clone(), "   "),
        Err(Error::InvalidKey(_))
    ));

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_single_key_lifecycle_surface() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_single_key_lifecycle_surface: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("keyops");
    let colors: RedisSet<String> =
        RedisSet::new(conn.clone(), format!("{base}:colors")).unwrap();

    assert!(!colors.exists().await.unwrap());
    assert_eq!(colors.value_type().await.unwrap(), "none");
    colors.add(&"teal".to_string()).await.unwrap();
    assert!(colors.exists().await.unwrap());
    assert_eq!(colors.value_type().await.unwrap(), "set");

    assert_eq!(colors.time_to_live().await.unwrap(), None);
    assert!(colors.expire(Duration::from_secs(120)).await.unwrap());
    let ttl = colors.time_to_live().await.unwrap().unwrap();
    assert!(
        ttl > Duration::from_secs(100) && ttl <= Duration::from_secs(120),
        "unexpected ttl {ttl:?}"
    );
    assert!(colors.persist().await.unwrap());
    assert!(!colors.persist().await.unwrap());
    assert_eq!(colors.time_to_live().await.unwrap(), None);

    // Renaming onto an occupied key is refused and the handle stays put.
    let mut movable: RedisSet<String> =
        RedisSet::new(conn.clone(), format!("{base}:movable")).unwrap();
    movable.add(&"x".to_string()).await.unwrap();
    assert!(!movable.rename(format!("{base}:colors")).await.unwrap());
    assert_eq!(movable.key(), format!("{base}:movable"));

    // A fresh target moves the data and the handle follows it.
    assert!(movable.rename(format!("{base}:moved")).await.unwrap());
    assert_eq!(movable.key(), format!("{base}:moved"));
    assert!(movable.contains(&"x".to_string()).await.unwrap());
    let mut raw = conn.clone();
    let old_exists: bool = raw.exists(format!("{base}:movable")).await.unwrap();
    assert!(!old_exists);

    assert!(colors.delete().await.unwrap());
    assert!(!colors.delete().await.unwrap());
    // A TTL cannot be applied to a key that no longer exists.
    assert!(!colors.expire(Duration::from_secs(120)).await.unwrap());

    let mut pipe = redis::pipe();
    movable.batch_delete(&mut pipe);
    let _: () = pipe.query_async(&mut raw).await.unwrap();
    assert!(!movable.exists().await.unwrap());

    common::cleanup(&conn, &base).await;
}
