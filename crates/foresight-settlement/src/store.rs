//! Best-effort relational mirror.
//!
//! The in-memory book is the source of truth for matching decisions; this
//! store exists for duplicate-salt lookups across restarts and for
//! operational inspection. Every transition upserts; callers treat store
//! errors as warnings, never as request failures.

use foresight_types::{ForesightError, Match, Order, OrderId, OrderStatus, Result, SaltKey};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use uuid::Uuid;

const ORDERS_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS orders (
    id                  TEXT PRIMARY KEY,
    market              TEXT NOT NULL,
    outcome_index       BIGINT NOT NULL,
    maker               TEXT NOT NULL,
    side                TEXT NOT NULL,
    price               BIGINT NOT NULL,
    amount              TEXT NOT NULL,
    remaining           TEXT NOT NULL,
    status              TEXT NOT NULL,
    tif                 TEXT NOT NULL,
    post_only           BOOLEAN NOT NULL,
    expiry              BIGINT NOT NULL,
    salt                TEXT NOT NULL,
    chain_id            BIGINT NOT NULL,
    verifying_contract  TEXT NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (chain_id, verifying_contract, maker, salt)
)";

const MATCHES_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS matches (
    id              TEXT PRIMARY KEY,
    market          TEXT NOT NULL,
    outcome_index   BIGINT NOT NULL,
    maker_order_id  TEXT NOT NULL,
    taker_order_id  TEXT NOT NULL,
    maker           TEXT NOT NULL,
    taker           TEXT NOT NULL,
    taker_side      TEXT NOT NULL,
    matched_amount  TEXT NOT NULL,
    matched_price   BIGINT NOT NULL,
    maker_fee       TEXT NOT NULL,
    taker_fee       TEXT NOT NULL,
    executed_at     TIMESTAMPTZ NOT NULL
)";

/// Postgres mirror of orders and matches.
pub struct OrderStore {
    pool: PgPool,
}

impl OrderStore {
    /// Connect and create the schema if missing.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(store_err)?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("order store connected");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(ORDERS_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        sqlx::query(MATCHES_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    /// Insert or refresh an order row. Called on admission and on every
    /// status/remaining transition.
    pub async fn upsert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r"INSERT INTO orders
              (id, market, outcome_index, maker, side, price, amount, remaining,
               status, tif, post_only, expiry, salt, chain_id, verifying_contract, created_at)
              VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
              ON CONFLICT (id) DO UPDATE
              SET remaining = EXCLUDED.remaining,
                  status = EXCLUDED.status,
                  updated_at = now()",
        )
        .bind(order.id.to_string())
        .bind(order.market.as_str())
        .bind(i64::from(order.outcome_index))
        .bind(format!("{:#x}", order.maker))
        .bind(order.side.to_string())
        .bind(to_i64(order.price.raw())?)
        .bind(order.amount.raw().to_string())
        .bind(order.remaining.raw().to_string())
        .bind(order.status.to_string())
        .bind(order.tif.to_string())
        .bind(order.post_only)
        .bind(to_i64(order.expiry)?)
        .bind(order.salt.to_string())
        .bind(to_i64(order.chain_id)?)
        .bind(format!("{:#x}", order.verifying_contract))
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    /// Latest order holding this salt tuple, for the restart replay path
    /// behind the in-memory registry.
    pub async fn find_salt(&self, key: &SaltKey) -> Result<Option<(OrderId, OrderStatus)>> {
        let row = sqlx::query(
            r"SELECT id, status FROM orders
              WHERE chain_id = $1 AND verifying_contract = $2 AND maker = $3 AND salt = $4
              ORDER BY created_at DESC
              LIMIT 1",
        )
        .bind(to_i64(key.chain_id)?)
        .bind(format!("{:#x}", key.verifying_contract))
        .bind(format!("{:#x}", key.maker))
        .bind(key.salt.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.get("id");
        let status: String = row.get("status");
        let order_id = Uuid::parse_str(&id)
            .map(OrderId)
            .map_err(|e| ForesightError::Store {
                reason: format!("bad order id in store: {e}"),
            })?;
        Ok(Some((order_id, status_from_str(&status)?)))
    }

    /// Append one immutable match row.
    pub async fn record_match(&self, fill: &Match) -> Result<()> {
        sqlx::query(
            r"INSERT INTO matches
              (id, market, outcome_index, maker_order_id, taker_order_id, maker, taker,
               taker_side, matched_amount, matched_price, maker_fee, taker_fee, executed_at)
              VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
              ON CONFLICT (id) DO NOTHING",
        )
        .bind(fill.id.to_string())
        .bind(fill.market.as_str())
        .bind(i64::from(fill.outcome_index))
        .bind(fill.maker_order_id.to_string())
        .bind(fill.taker_order_id.to_string())
        .bind(format!("{:#x}", fill.maker))
        .bind(format!("{:#x}", fill.taker))
        .bind(fill.taker_side.to_string())
        .bind(fill.matched_amount.raw().to_string())
        .bind(to_i64(fill.matched_price.raw())?)
        .bind(fill.maker_fee.raw().to_string())
        .bind(fill.taker_fee.raw().to_string())
        .bind(fill.executed_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

fn to_i64<T: TryInto<i64> + std::fmt::Display + Copy>(value: T) -> Result<i64> {
    value.try_into().map_err(|_| ForesightError::Store {
        reason: format!("value {value} exceeds bigint range"),
    })
}

fn status_from_str(s: &str) -> Result<OrderStatus> {
    match s {
        "pending" => Ok(OrderStatus::Pending),
        "open" => Ok(OrderStatus::Open),
        "partially_filled" => Ok(OrderStatus::PartiallyFilled),
        "filled" => Ok(OrderStatus::Filled),
        "canceled" => Ok(OrderStatus::Canceled),
        "rejected" => Ok(OrderStatus::Rejected),
        "expired" => Ok(OrderStatus::Expired),
        other => Err(ForesightError::Store {
            reason: format!("unknown status in store: {other}"),
        }),
    }
}

fn store_err(e: sqlx::Error) -> ForesightError {
    ForesightError::Store {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_display() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Open,
            OrderStatus::PartiallyFilled,
            OrderStatus::Filled,
            OrderStatus::Canceled,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            assert_eq!(status_from_str(&status.to_string()).unwrap(), status);
        }
        assert!(status_from_str("bogus").is_err());
    }

    #[test]
    fn bigint_conversion_guards_range() {
        assert_eq!(to_i64(999_999u64).unwrap(), 999_999);
        assert!(to_i64(u64::MAX).is_err());
    }
}
