//! Fill records: the immutable [`Match`] produced by the matching loop and
//! the [`SettlementFill`] projection handed to the on-chain batch path.

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::ids::{MarketKey, MatchId, OrderId};
use crate::numeric::{Amount, Price, Usdc, notional};
use crate::order::OrderSide;

/// A fill between a resting maker order and an incoming taker order.
///
/// Immutable once created. `matched_price` is always the resting maker's
/// price; takers get price improvement, makers get their posted price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub market: MarketKey,
    pub outcome_index: u32,
    pub maker_order_id: OrderId,
    pub maker: Address,
    pub taker_order_id: OrderId,
    pub taker: Address,
    /// Which side the aggressive (taker) order was on.
    pub taker_side: OrderSide,
    pub matched_amount: Amount,
    pub matched_price: Price,
    pub maker_fee: Usdc,
    pub taker_fee: Usdc,
    pub executed_at: DateTime<Utc>,
}

impl Match {
    /// USDC value of this fill at the matched price.
    #[must_use]
    pub fn notional(&self) -> Option<Usdc> {
        notional(self.matched_amount, self.matched_price)
    }

    #[must_use]
    pub fn taker_is_buyer(&self) -> bool {
        self.taker_side.is_buy()
    }
}

impl std::fmt::Display for Match {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Match[{}] {}:{} {} {} @ {}",
            self.id,
            self.market,
            self.outcome_index,
            self.taker_side,
            self.matched_amount,
            self.matched_price,
        )
    }
}

/// Read-only projection of a [`Match`] queued for on-chain submission.
///
/// Carries both sides so the settlement contract can verify custody; the
/// core guarantees at-least-once queuing per match, not on-chain finality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementFill {
    pub match_id: MatchId,
    pub market: MarketKey,
    pub outcome_index: u32,
    pub maker: Address,
    pub taker: Address,
    pub taker_is_buy: bool,
    pub amount: Amount,
    pub price: Price,
    pub maker_fee: Usdc,
    pub taker_fee: Usdc,
}

impl From<&Match> for SettlementFill {
    fn from(m: &Match) -> Self {
        Self {
            match_id: m.id,
            market: m.market.clone(),
            outcome_index: m.outcome_index,
            maker: m.maker,
            taker: m.taker,
            taker_is_buy: m.taker_side.is_buy(),
            amount: m.matched_amount,
            price: m.matched_price,
            maker_fee: m.maker_fee,
            taker_fee: m.taker_fee,
        }
    }
}
