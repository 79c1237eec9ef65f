//! Depth snapshots: per-side aggregation of resting quantity by price.

use serde::{Deserialize, Serialize};

use crate::ids::{BookKey, MarketKey};
use crate::numeric::{Amount, Price};

/// One aggregated price level in a depth snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthLevel {
    pub price: Price,
    /// Sum of remaining amounts across all orders at this price.
    pub quantity: Amount,
    /// Number of resting orders at this price.
    pub orders: usize,
}

/// Aggregated view of one book's resting liquidity, bounded by a level
/// count. Bids are best (highest) first, asks best (lowest) first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    pub market: MarketKey,
    pub outcome_index: u32,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    /// Unix milliseconds when the snapshot was taken.
    pub timestamp_ms: i64,
}

impl DepthSnapshot {
    #[must_use]
    pub fn empty(key: &BookKey) -> Self {
        Self {
            market: key.market.clone(),
            outcome_index: key.outcome_index,
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
