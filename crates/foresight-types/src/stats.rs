//! Per-book market statistics: last trade price, rolling 24h volume,
//! best bid/ask. Drives the `stats` WebSocket channel and the stats
//! endpoint.

use serde::{Deserialize, Serialize};

use crate::ids::MarketKey;
use crate::numeric::{Price, Usdc};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStats {
    pub market: MarketKey,
    pub outcome_index: u32,
    /// Price of the most recent fill, if any.
    pub last_price: Option<Price>,
    /// USDC notional traded over the trailing 24 hours.
    pub volume_24h: Usdc,
    /// Fill count over the trailing 24 hours.
    pub trades_24h: u64,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    /// Unix milliseconds when the stats were computed.
    pub timestamp_ms: i64,
}

impl MarketStats {
    /// Spread in raw price units; `None` if either side is empty.
    #[must_use]
    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => ask.0.checked_sub(bid.0),
            _ => None,
        }
    }

    /// Mid price, rounding down; `None` if either side is empty.
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(Price((bid.0 + ask.0) / 2)),
            _ => None,
        }
    }
}
