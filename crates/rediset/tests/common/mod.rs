//! Shared harness for integration tests.
//!
//! Tests need a live server; each one skips itself when `REDIS_URL` is not
//! set. Every test works under its own random base key and sweeps it
//! afterwards, so parallel test threads never collide.

use rediset::ConnectionManager;

pub async fn manager() -> Option<ConnectionManager> {
    let url = std::env::var("REDIS_URL").ok()?;
    rediset::connect(&url).await.ok()
}

pub fn unique_base(stem: &str) -> String {
    format!("rediset-test:{stem}:{}", uuid::Uuid::new_v4().simple())
}

pub async fn cleanup(conn: &ConnectionManager, base: &str) {
    use redis::AsyncCommands;

    let mut conn = conn.clone();
    let pattern = format!("{base}*");
    let mut cursor: u64 = 0;
    loop {
        let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .arg("COUNT")
            .arg(512)
            .query_async(&mut conn)
            .await
            .expect("scan test keys");
        if !page.is_empty() {
            let _: i64 = conn.del(page).await.expect("delete test keys");
        }
        cursor = next;
        if cursor == 0 {
            break;
        }
    }
}
