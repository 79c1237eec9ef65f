//! Idempotency-key replay cache for mutating routes.
//!
//! Keyed by `method:path:key`; a hit replays the cached status, content
//! type, and body byte-for-byte. Entries live in process with a TTL and a
//! hard cap (oldest-first eviction), mirrored to Redis best-effort so a
//! restarted node still honors recent keys. 5xx responses are never
//! cached; the client should get a fresh attempt.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const IDEMPOTENCY_KEY_PREFIX: &str = "foresight:idem:";

/// A replayable response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

struct Inner {
    map: HashMap<String, (CachedResponse, i64)>,
    /// Insertion order, for cap eviction.
    order: VecDeque<String>,
}

/// TTL'd response cache with an optional Redis mirror.
pub struct IdempotencyStore {
    inner: Mutex<Inner>,
    redis: Option<ConnectionManager>,
    ttl_secs: u64,
    max_keys: usize,
}

impl IdempotencyStore {
    /// Connect the Redis mirror; a failed connection degrades to the
    /// in-process cache with a warning.
    pub async fn connect(redis_url: Option<&str>, ttl_secs: u64, max_keys: usize) -> Self {
        let redis = match redis_url {
            Some(url) => match Self::open(url).await {
                Ok(conn) => {
                    info!("idempotency redis mirror connected");
                    Some(conn)
                }
                Err(err) => {
                    warn!(%err, "idempotency redis unavailable, in-process only");
                    None
                }
            },
            None => None,
        };
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            redis,
            ttl_secs,
            max_keys,
        }
    }

    /// In-process only, no mirror.
    #[must_use]
    pub fn in_memory(ttl_secs: u64, max_keys: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            redis: None,
            ttl_secs,
            max_keys,
        }
    }

    async fn open(url: &str) -> Result<ConnectionManager, redis::RedisError> {
        let client = redis::Client::open(url)?;
        ConnectionManager::new(client).await
    }

    #[must_use]
    pub fn key_for(method: &str, path: &str, idempotency_key: &str) -> String {
        format!("{method}:{path}:{idempotency_key}")
    }

    /// Look up a cached response, falling back to the mirror (and warming
    /// the local cache) on a local miss.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Utc::now().timestamp();
        {
            let mut inner = self.inner.lock().await;
            match inner.map.get(key) {
                Some((cached, expires_at)) if *expires_at > now => {
                    debug!(%key, "idempotency replay");
                    return Some(cached.clone());
                }
                Some(_) => {
                    // Drop the entry and its eviction slot together; a
                    // stale slot would let a later re-insert of the same
                    // key evict a fresher entry first.
                    inner.map.remove(key);
                    inner.order.retain(|slot| slot != key);
                }
                None => {}
            }
        }

        let conn = self.redis.as_ref()?;
        let mut conn = conn.clone();
        let payload: Option<String> = conn
            .get(format!("{IDEMPOTENCY_KEY_PREFIX}{key}"))
            .await
            .ok()
            .flatten();
        let cached = serde_json::from_str::<CachedResponse>(&payload?).ok()?;
        self.insert_local(key, cached.clone(), now).await;
        debug!(%key, "idempotency replay from mirror");
        Some(cached)
    }

    /// Cache a response under `key`. 5xx outcomes are skipped so the
    /// client's retry gets a real attempt.
    pub async fn put(&self, key: &str, response: CachedResponse) {
        if response.status >= 500 {
            return;
        }
        let now = Utc::now().timestamp();
        self.insert_local(key, response.clone(), now).await;

        if let Some(conn) = &self.redis {
            let Ok(payload) = serde_json::to_string(&response) else {
                return;
            };
            let mut conn = conn.clone();
            let outcome = redis::cmd("SET")
                .arg(format!("{IDEMPOTENCY_KEY_PREFIX}{key}"))
                .arg(payload)
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async::<_, ()>(&mut conn)
                .await;
            if let Err(err) = outcome {
                warn!(%err, "idempotency mirror write failed");
            }
        }
    }

    async fn insert_local(&self, key: &str, response: CachedResponse, now: i64) {
        let expires_at = now + i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        let mut inner = self.inner.lock().await;
        if inner.map.insert(key.to_string(), (response, expires_at)).is_none() {
            inner.order.push_back(key.to_string());
        }
        while inner.map.len() > self.max_keys {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.map.remove(&oldest);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> CachedResponse {
        CachedResponse {
            status: 200,
            content_type: "application/json".into(),
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn expired_entry_leaves_no_stale_eviction_slot() {
        let store = IdempotencyStore::in_memory(600, 2);
        // Back-dated insert: already past its TTL when read.
        let past = Utc::now().timestamp() - 1_200;
        store.insert_local("a", response("stale"), past).await;
        assert!(store.get("a").await.is_none());

        store.put("b", response("1")).await;
        store.put("a", response("2")).await;
        store.put("c", response("3")).await;

        // Cap eviction takes the oldest live entry ("b"), never the
        // re-inserted "a" through a leftover slot from its expired run.
        assert!(store.get("b").await.is_none());
        assert_eq!(store.get("a").await.unwrap().body, "2");
        assert_eq!(store.get("c").await.unwrap().body, "3");
    }
}
