//! Pending-submission intents.
//!
//! Before a batch goes to the chain its fills are recorded as an intent,
//! mirrored to Redis with a TTL. A leader that restarts between recording
//! and confirmation finds the intent via [`IntentStore::recover`] and
//! resubmits the batch. Redis being down degrades to the in-process map;
//! recovery then only covers the current process lifetime.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use foresight_types::{ForesightError, MarketKey, Result, SettlementFill};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const INTENT_KEY_PREFIX: &str = "foresight:intent:";

/// One unconfirmed settlement batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchIntent {
    pub batch_id: String,
    pub market: MarketKey,
    pub fills: Vec<SettlementFill>,
    pub created_at: DateTime<Utc>,
}

impl BatchIntent {
    #[must_use]
    pub fn from_batch(batch: &crate::batch::FillBatch) -> Self {
        Self {
            batch_id: batch.id(),
            market: batch.market.clone(),
            fills: batch.fills.clone(),
            created_at: Utc::now(),
        }
    }
}

/// In-process intent map with an optional Redis mirror.
pub struct IntentStore {
    local: DashMap<String, BatchIntent>,
    redis: Option<ConnectionManager>,
    ttl_secs: u64,
}

impl IntentStore {
    /// Connect the Redis mirror; a failed connection degrades to the
    /// in-process map with a warning.
    pub async fn connect(redis_url: Option<&str>, ttl_secs: u64) -> Self {
        let redis = match redis_url {
            Some(url) => match Self::open(url).await {
                Ok(conn) => {
                    info!("intent store redis mirror connected");
                    Some(conn)
                }
                Err(err) => {
                    warn!(%err, "intent store redis unavailable, in-process only");
                    None
                }
            },
            None => None,
        };
        Self {
            local: DashMap::new(),
            redis,
            ttl_secs,
        }
    }

    /// In-process only, no mirror.
    #[must_use]
    pub fn in_memory(ttl_secs: u64) -> Self {
        Self {
            local: DashMap::new(),
            redis: None,
            ttl_secs,
        }
    }

    async fn open(url: &str) -> Result<ConnectionManager> {
        let client = redis::Client::open(url).map_err(redis_err)?;
        ConnectionManager::new(client).await.map_err(redis_err)
    }

    /// Record a batch about to be submitted.
    pub async fn record(&self, intent: &BatchIntent) -> Result<()> {
        self.local.insert(intent.batch_id.clone(), intent.clone());
        if let Some(conn) = &self.redis {
            let payload = serde_json::to_string(intent).map_err(|e| ForesightError::Internal(
                format!("intent encode: {e}"),
            ))?;
            let mut conn = conn.clone();
            redis::cmd("SET")
                .arg(format!("{INTENT_KEY_PREFIX}{}", intent.batch_id))
                .arg(payload)
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(redis_err)?;
        }
        Ok(())
    }

    /// Drop a confirmed batch's intent.
    pub async fn complete(&self, batch_id: &str) -> Result<()> {
        self.local.remove(batch_id);
        if let Some(conn) = &self.redis {
            let mut conn = conn.clone();
            conn.del::<_, ()>(format!("{INTENT_KEY_PREFIX}{batch_id}"))
                .await
                .map_err(redis_err)?;
        }
        Ok(())
    }

    /// Intents recorded by this process and not yet completed.
    #[must_use]
    pub fn pending(&self) -> Vec<BatchIntent> {
        self.local.iter().map(|e| e.value().clone()).collect()
    }

    /// Load surviving intents from the mirror (restart path), merge them
    /// into the local map, and return everything pending.
    pub async fn recover(&self) -> Vec<BatchIntent> {
        if let Some(conn) = &self.redis {
            match self.scan_mirror(conn.clone()).await {
                Ok(recovered) => {
                    for intent in recovered {
                        self.local.entry(intent.batch_id.clone()).or_insert(intent);
                    }
                }
                Err(err) => warn!(%err, "intent recovery scan failed"),
            }
        }
        self.pending()
    }

    async fn scan_mirror(&self, mut conn: ConnectionManager) -> Result<Vec<BatchIntent>> {
        let keys: Vec<String> = {
            let mut scan_conn = conn.clone();
            let mut iter = scan_conn
                .scan_match::<_, String>(format!("{INTENT_KEY_PREFIX}*"))
                .await
                .map_err(redis_err)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };
        let mut intents = Vec::with_capacity(keys.len());
        for key in keys {
            let payload: Option<String> = conn.get(&key).await.map_err(redis_err)?;
            let Some(payload) = payload else { continue };
            match serde_json::from_str::<BatchIntent>(&payload) {
                Ok(intent) => intents.push(intent),
                Err(err) => warn!(%key, %err, "skipping malformed intent"),
            }
        }
        Ok(intents)
    }
}

fn redis_err(e: redis::RedisError) -> ForesightError {
    ForesightError::Redis {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ethers::types::Address;
    use foresight_types::{Amount, MatchId, Price, Usdc};

    use super::*;

    fn intent(id: &str) -> BatchIntent {
        BatchIntent {
            batch_id: id.to_string(),
            market: MarketKey::from("m"),
            fills: vec![SettlementFill {
                match_id: MatchId::new(),
                market: MarketKey::from("m"),
                outcome_index: 0,
                maker: Address::repeat_byte(0xaa),
                taker: Address::repeat_byte(0xbb),
                taker_is_buy: true,
                amount: Amount(1_000),
                price: Price(500_000),
                maker_fee: Usdc(0),
                taker_fee: Usdc(1),
            }],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_complete_lifecycle() {
        let store = IntentStore::in_memory(600);
        store.record(&intent("a")).await.unwrap();
        store.record(&intent("b")).await.unwrap();
        assert_eq!(store.pending().len(), 2);

        store.complete("a").await.unwrap();
        let pending = store.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].batch_id, "b");
    }

    #[tokio::test]
    async fn recover_without_mirror_returns_local_state() {
        let store = IntentStore::in_memory(600);
        store.record(&intent("a")).await.unwrap();
        assert_eq!(store.recover().await.len(), 1);
    }

    #[test]
    fn intent_serde_shape() {
        let json = serde_json::to_string(&intent("abc")).unwrap();
        let back: BatchIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.batch_id, "abc");
        assert_eq!(back.fills.len(), 1);
        assert!(back.fills[0].taker_is_buy);
    }
}
