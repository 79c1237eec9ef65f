//! Per-maker daily gasless-submission quota.
//!
//! Gasless orders cost the operator gas at settlement, so each maker gets
//! a daily notional cap. Counters live in Redis (shared across the
//! cluster, expiring at UTC midnight) with an in-process fallback when
//! Redis is down. A short micro-cache short-circuits repeat rejections
//! from a maker already over its cap.

use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use ethers::types::Address;
use foresight_types::constants::QUOTA_MICRO_CACHE_MS;
use foresight_types::{ForesightError, Result, Usdc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

const QUOTA_KEY_PREFIX: &str = "foresight:gasless:";

/// Daily notional counters keyed by maker address.
pub struct GaslessQuotaStore {
    redis: Option<ConnectionManager>,
    /// Fallback counters: (utc day, maker) -> used notional.
    local: DashMap<(String, Address), u128>,
    /// Recent used values, to reject over-cap makers without a round trip.
    micro_cache: DashMap<Address, (u128, i64)>,
    cap: Usdc,
}

impl GaslessQuotaStore {
    pub async fn connect(redis_url: Option<&str>, cap: Usdc) -> Self {
        let redis = match redis_url {
            Some(url) => match Self::open(url).await {
                Ok(conn) => {
                    info!("gasless quota redis connected");
                    Some(conn)
                }
                Err(err) => {
                    warn!(%err, "gasless quota redis unavailable, in-process only");
                    None
                }
            },
            None => None,
        };
        Self {
            redis,
            local: DashMap::new(),
            micro_cache: DashMap::new(),
            cap,
        }
    }

    #[must_use]
    pub fn in_memory(cap: Usdc) -> Self {
        Self {
            redis: None,
            local: DashMap::new(),
            micro_cache: DashMap::new(),
            cap,
        }
    }

    async fn open(url: &str) -> Result<ConnectionManager> {
        let client = redis::Client::open(url).map_err(redis_err)?;
        ConnectionManager::new(client).await.map_err(redis_err)
    }

    /// Charge `notional` against the maker's daily cap, or refuse.
    /// Consumption is atomic per backend: an over-cap increment is undone
    /// before the error is returned.
    pub async fn check_and_consume(&self, maker: Address, notional: Usdc) -> Result<()> {
        if notional.raw() > self.cap.raw() {
            return Err(ForesightError::GaslessQuotaExceeded {
                used: Usdc::ZERO,
                cap: self.cap,
            });
        }

        let now_ms = Utc::now().timestamp_millis();
        if let Some(entry) = self.micro_cache.get(&maker) {
            let (used, cached_at) = *entry;
            if now_ms - cached_at < QUOTA_MICRO_CACHE_MS && used + notional.raw() > self.cap.raw()
            {
                return Err(ForesightError::GaslessQuotaExceeded {
                    used: Usdc(used),
                    cap: self.cap,
                });
            }
        }

        let used = match &self.redis {
            Some(conn) => self.consume_redis(conn.clone(), maker, notional).await?,
            None => self.consume_local(maker, notional)?,
        };
        self.micro_cache.insert(maker, (used, now_ms));
        Ok(())
    }

    async fn consume_redis(
        &self,
        mut conn: ConnectionManager,
        maker: Address,
        notional: Usdc,
    ) -> Result<u128> {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        let key = format!("{QUOTA_KEY_PREFIX}{day}:{maker:#x}");
        let delta = i64::try_from(notional.raw()).map_err(|_| ForesightError::Internal(
            format!("gasless notional {notional} exceeds counter range"),
        ))?;

        let used: i64 = conn.incr(&key, delta).await.map_err(redis_err)?;
        redis::cmd("EXPIREAT")
            .arg(&key)
            .arg(day_end_utc())
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(redis_err)?;

        let used_u = u128::try_from(used).unwrap_or(0);
        if used_u > self.cap.raw() {
            let _: i64 = conn.decr(&key, delta).await.map_err(redis_err)?;
            return Err(ForesightError::GaslessQuotaExceeded {
                used: Usdc(used_u - notional.raw()),
                cap: self.cap,
            });
        }
        Ok(used_u)
    }

    fn consume_local(&self, maker: Address, notional: Usdc) -> Result<u128> {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        let mut entry = self.local.entry((day, maker)).or_insert(0);
        let next = *entry + notional.raw();
        if next > self.cap.raw() {
            return Err(ForesightError::GaslessQuotaExceeded {
                used: Usdc(*entry),
                cap: self.cap,
            });
        }
        *entry = next;
        Ok(next)
    }
}

/// Unix seconds of the next UTC midnight.
fn day_end_utc() -> i64 {
    let tomorrow = Utc::now().date_naive() + chrono::Days::new(1);
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default())
        .timestamp()
}

fn redis_err(e: redis::RedisError) -> ForesightError {
    ForesightError::Redis {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consumption_accumulates_until_the_cap() {
        let store = GaslessQuotaStore::in_memory(Usdc(100));
        let maker = Address::repeat_byte(0xaa);

        store.check_and_consume(maker, Usdc(60)).await.unwrap();
        store.check_and_consume(maker, Usdc(40)).await.unwrap();

        let err = store.check_and_consume(maker, Usdc(1)).await.unwrap_err();
        let ForesightError::GaslessQuotaExceeded { used, cap } = err else {
            panic!("expected quota error")
        };
        assert_eq!(used, Usdc(100));
        assert_eq!(cap, Usdc(100));
    }

    #[tokio::test]
    async fn refusal_does_not_consume() {
        let store = GaslessQuotaStore::in_memory(Usdc(100));
        let maker = Address::repeat_byte(0xbb);

        store.check_and_consume(maker, Usdc(90)).await.unwrap();
        assert!(store.check_and_consume(maker, Usdc(20)).await.is_err());
        // The failed attempt left room for a smaller order.
        store.check_and_consume(maker, Usdc(10)).await.unwrap();
    }

    #[tokio::test]
    async fn makers_have_independent_quotas() {
        let store = GaslessQuotaStore::in_memory(Usdc(50));
        store
            .check_and_consume(Address::repeat_byte(0x01), Usdc(50))
            .await
            .unwrap();
        store
            .check_and_consume(Address::repeat_byte(0x02), Usdc(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn oversized_single_order_is_refused_outright() {
        let store = GaslessQuotaStore::in_memory(Usdc(10));
        let err = store
            .check_and_consume(Address::repeat_byte(0x03), Usdc(11))
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), "GASLESS_QUOTA_EXCEEDED");
    }

    #[test]
    fn day_end_is_in_the_future() {
        assert!(day_end_utc() > Utc::now().timestamp());
    }
}
