//! Idempotency replay semantics against the in-process store.

use foresight_gateway::idempotency::{CachedResponse, IdempotencyStore};

fn response(status: u16, body: &str) -> CachedResponse {
    CachedResponse {
        status,
        content_type: "application/json".into(),
        body: body.into(),
    }
}

#[tokio::test]
async fn put_then_get_replays_the_response() {
    let store = IdempotencyStore::in_memory(600, 100);
    let key = IdempotencyStore::key_for("POST", "/v1/orders", "abc");
    store.put(&key, response(200, r#"{"ok":true}"#)).await;

    let hit = store.get(&key).await.unwrap();
    assert_eq!(hit.status, 200);
    assert_eq!(hit.content_type, "application/json");
    assert_eq!(hit.body, r#"{"ok":true}"#);
    assert!(store.get("POST:/v1/orders:other").await.is_none());
}

#[tokio::test]
async fn client_errors_replay_but_server_errors_do_not() {
    let store = IdempotencyStore::in_memory(600, 100);
    store.put("conflict", response(409, "dup")).await;
    store.put("boom", response(502, "bad gateway")).await;

    assert_eq!(store.get("conflict").await.unwrap().status, 409);
    assert!(store.get("boom").await.is_none());
}

#[tokio::test]
async fn cap_evicts_oldest_first() {
    let store = IdempotencyStore::in_memory(600, 2);
    store.put("a", response(200, "1")).await;
    store.put("b", response(200, "2")).await;
    store.put("c", response(200, "3")).await;

    assert!(store.get("a").await.is_none());
    assert!(store.get("b").await.is_some());
    assert!(store.get("c").await.is_some());
}

#[tokio::test]
async fn expired_entries_miss() {
    let store = IdempotencyStore::in_memory(0, 100);
    store.put("k", response(200, "x")).await;
    // TTL of zero expires immediately (expires_at == now).
    assert!(store.get("k").await.is_none());
}

#[test]
fn key_for_distinguishes_method_and_path() {
    let a = IdempotencyStore::key_for("POST", "/v1/orders", "k");
    let b = IdempotencyStore::key_for("POST", "/v1/orders/1/cancel", "k");
    assert_ne!(a, b);
}
