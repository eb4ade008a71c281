//! Index bookkeeping behavior of `KeySpace` against a live server.

mod common;

use std::time::Duration;

use redis::AsyncCommands;
use rediset::{KeySpace, RedisKey};

/// Writes a plain value at the derived key so the space has something to
/// index, without going through a higher-level collection.
async fn seed_entry(space: &KeySpace<u32>, id: u32) {
    let mut conn = space.index().connection();
    let _: () = conn.set(space.entry_key(&id), "x").await.unwrap();
    let _ = space.add_index(&[id]).await.unwrap();
}

#[tokio::test]
async fn test_entry_key_derivation_is_pure() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_entry_key_derivation_is_pure: REDIS_URL not set");
        return;
    };
    let space: KeySpace<u32> = KeySpace::new(conn, "Orders").unwrap();
    assert_eq!(space.entry_key(&42), "Orders:42");
    assert_eq!(space.entry_key(&42), space.entry_key(&42));
    assert_eq!(space.index().key(), "Orders:@__SetIndex");
    assert_eq!(space.expire_index().key(), "Orders:@__ExpireIndex");
}

#[tokio::test]
async fn test_add_index_makes_id_visible() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_add_index_makes_id_visible: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("add");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();

    assert!(!space.contains_key(&1).await.unwrap());
    seed_entry(&space, 1).await;

    assert!(space.contains_key(&1).await.unwrap());
    assert_eq!(space.count().await.unwrap(), 1);
    let mut raw = conn.clone();
    let exists: bool = raw.exists(space.entry_key(&1)).await.unwrap();
    assert!(exists, "derived key must exist after seeding");

    // Re-adding an indexed id is a no-op, not an error.
    assert_eq!(space.add_index(&[1]).await.unwrap(), 0);

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_remove_key_clears_entry_and_index() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_remove_key_clears_entry_and_index: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("remove");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();
    seed_entry(&space, 7).await;

    assert!(space.remove_key(&7).await.unwrap());
    assert!(!space.contains_key(&7).await.unwrap());
    let mut raw = conn.clone();
    let exists: bool = raw.exists(space.entry_key(&7)).await.unwrap();
    assert!(!exists, "derived key must be gone after remove");

    // Removing an absent id reports false, not an error.
    assert!(!space.remove_key(&7).await.unwrap());

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_remove_keys_counts_existing_only() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_remove_keys_counts_existing_only: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("remove-bulk");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();
    for id in [1, 2, 3] {
        seed_entry(&space, id).await;
    }

    // Id 9 was never written; only three derived keys actually exist.
    assert_eq!(space.remove_keys(&[1, 2, 3, 9]).await.unwrap(), 3);
    assert_eq!(space.count().await.unwrap(), 0);
    assert!(space.keys().await.unwrap().is_empty());

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_set_expire_moves_between_partitions() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_set_expire_moves_between_partitions: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("expire");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();
    seed_entry(&space, 42).await;

    assert!(space
        .set_expire(&42, Some(Duration::from_secs(60)))
        .await
        .unwrap());
    assert!(!space.index().contains(&42).await.unwrap());
    assert!(space.expire_index().contains(&42).await.unwrap());
    let mut raw = conn.clone();
    let ttl: i64 = redis::cmd("PTTL")
        .arg(space.entry_key(&42))
        .query_async(&mut raw)
        .await
        .unwrap();
    assert!(ttl > 0, "derived key must carry a TTL, got {ttl}");
    assert!(space.contains_key(&42).await.unwrap());

    // Clearing the TTL moves the id back and persists the key.
    assert!(space.set_expire(&42, None).await.unwrap());
    assert!(space.index().contains(&42).await.unwrap());
    assert!(!space.expire_index().contains(&42).await.unwrap());
    let ttl: i64 = redis::cmd("PTTL")
        .arg(space.entry_key(&42))
        .query_async(&mut raw)
        .await
        .unwrap();
    assert_eq!(ttl, -1, "TTL must be cleared");

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_set_expire_on_missing_key_is_refused() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_set_expire_on_missing_key_is_refused: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("expire-missing");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();

    assert!(!space
        .set_expire(&5, Some(Duration::from_secs(60)))
        .await
        .unwrap());
    assert!(!space.index().contains(&5).await.unwrap());
    assert!(!space.expire_index().contains(&5).await.unwrap());

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_contains_reconciles_stale_expire_entry() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_contains_reconciles_stale_expire_entry: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("reconcile");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();
    seed_entry(&space, 42).await;
    assert!(space
        .set_expire(&42, Some(Duration::from_secs(60)))
        .await
        .unwrap());

    // Simulate expiry by deleting the derived key out-of-band.
    let mut raw = conn.clone();
    let _: i64 = raw.del(space.entry_key(&42)).await.unwrap();
    assert!(space.expire_index().contains(&42).await.unwrap());

    // The next membership check reports absence and drops the stale entry.
    assert!(!space.contains_key(&42).await.unwrap());
    assert!(!space.expire_index().contains(&42).await.unwrap());

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_keys_is_the_union_of_both_partitions() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_keys_is_the_union_of_both_partitions: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("union");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();
    for id in [1, 2, 3, 4, 5] {
        seed_entry(&space, id).await;
    }
    for id in [4, 5] {
        assert!(space
            .set_expire(&id, Some(Duration::from_secs(60)))
            .await
            .unwrap());
    }

    let mut keys = space.keys().await.unwrap();
    keys.sort_unstable();
    assert_eq!(keys, vec![1, 2, 3, 4, 5]);
    // Count covers the no-TTL partition only.
    assert_eq!(space.count().await.unwrap(), 3);

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_remove_key_leaves_expire_entry_for_lazy_cleanup() {
    let Some(conn) = common::manager().await else {
        eprintln!(
            "skipping test_remove_key_leaves_expire_entry_for_lazy_cleanup: REDIS_URL not set"
        );
        return;
    };
    let base = common::unique_base("asymmetry");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();
    seed_entry(&space, 8).await;
    assert!(space
        .set_expire(&8, Some(Duration::from_secs(60)))
        .await
        .unwrap());

    // Removal deletes the key but does not sweep the expire index.
    assert!(space.remove_key(&8).await.unwrap());
    assert!(space.expire_index().contains(&8).await.unwrap());

    // The stale entry heals on the next membership check.
    assert!(!space.contains_key(&8).await.unwrap());
    assert!(!space.expire_index().contains(&8).await.unwrap());

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_prune_expired_sweeps_dead_entries() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_prune_expired_sweeps_dead_entries: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("prune");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();
    for id in [1, 2, 3] {
        seed_entry(&space, id).await;
        assert!(space
            .set_expire(&id, Some(Duration::from_secs(60)))
            .await
            .unwrap());
    }

    let mut raw = conn.clone();
    let _: i64 = raw.del(space.entry_key(&1)).await.unwrap();
    let _: i64 = raw.del(space.entry_key(&3)).await.unwrap();

    assert_eq!(space.prune_expired().await.unwrap(), 2);
    assert!(!space.expire_index().contains(&1).await.unwrap());
    assert!(space.expire_index().contains(&2).await.unwrap());
    assert_eq!(space.prune_expired().await.unwrap(), 0);

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_rebuild_index_recovers_from_drift() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_rebuild_index_recovers_from_drift: REDIS_URL not set");
        return;
    };
    let base = common::unique_base("rebuild");
    let space: KeySpace<u32> = KeySpace::new(conn.clone(), base.clone()).unwrap();

    // Derived keys written out-of-band: the index knows nothing about them.
    let mut raw = conn.clone();
    for id in 0..25u32 {
        let _: () = raw.set(space.entry_key(&id), "x").await.unwrap();
    }
    // A key whose id portion does not parse must be skipped, not fail.
    let _: () = raw
        .set(space.prefix().key("not-a-number"), "x")
        .await
        .unwrap();
    assert_eq!(space.count().await.unwrap(), 0);

    let recovered = space
        .rebuild_index(|raw| raw.parse::<u32>().ok())
        .await
        .unwrap();
    assert_eq!(recovered, 25);
    assert_eq!(space.count().await.unwrap(), 25);
    assert!(space.contains_key(&13).await.unwrap());

    // Idempotent: a second rebuild with no writes in between changes nothing.
    let again = space
        .rebuild_index(|raw| raw.parse::<u32>().ok())
        .await
        .unwrap();
    assert_eq!(again, 25);
    assert_eq!(space.count().await.unwrap(), 25);

    // Stale index entries disappear once their key is gone.
    let _: i64 = raw.del(space.entry_key(&0)).await.unwrap();
    let after_delete = space
        .rebuild_index(|raw| raw.parse::<u32>().ok())
        .await
        .unwrap();
    assert_eq!(after_delete, 24);
    assert!(!space.contains_key(&0).await.unwrap());

    common::cleanup(&conn, &base).await;
}

#[tokio::test]
async fn test_batch_mutations_match_the_direct_path() {
    let Some(conn) = common::manager().await else {
        eprintln!("skipping test_batch_mutations_match_the_direct_path: REDIS_URL not set");
        return;
    };
    let direct_base = common::unique_base("direct");
    let batch_base = common::unique_base("batched");
    let direct: KeySpace<u32> = KeySpace::new(conn.clone(), direct_base.clone()).unwrap();
    let batched: KeySpace<u32> = KeySpace::new(conn.clone(), batch_base.clone()).unwrap();

    // Direct path: one remote call per operation.
    let mut raw = conn.clone();
    for id in [1, 2, 3] {
        let _: () = raw.set(direct.entry_key(&id), "x").await.unwrap();
    }
    let _ = direct.add_index(&[1, 2, 3]).await.unwrap();
    assert!(direct
        .set_expire(&2, Some(Duration::from_secs(60)))
        .await
        .unwrap());
    assert!(direct.remove_key(&3).await.unwrap());

    // Batched path: the same operations staged into one pipeline flush.
    let mut pipe = redis::pipe();
    for id in [1, 2, 3] {
        pipe.set(batched.entry_key(&id), "x").ignore();
    }
    batched.batch_add_index(&mut pipe, &[1, 2, 3]).unwrap();
    batched
        .batch_set_expire(&mut pipe, &2, Some(Duration::from_secs(60)))
        .unwrap();
    batched.batch_remove_key(&mut pipe, &3).unwrap();
    let _: () = pipe.query_async(&mut raw).await.unwrap();

    for space in [&direct, &batched] {
        let mut keys = space.keys().await.unwrap();
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2]);
        assert_eq!(space.count().await.unwrap(), 1);
        assert!(space.index().contains(&1).await.unwrap());
        assert!(space.expire_index().contains(&2).await.unwrap());
        let exists: bool = raw.exists(space.entry_key(&3)).await.unwrap();
        assert!(!exists);
    }

    common::cleanup(&conn, &direct_base).await;
    common::cleanup(&conn, &batch_base).await;
}
