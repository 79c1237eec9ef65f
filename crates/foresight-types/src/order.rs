//! Order model: sides, time-in-force, status machine, and the signed
//! submission payload accepted at the HTTP boundary.

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ForesightError, Result};
use crate::ids::{BookKey, MarketKey, OrderId, SaltKey};
use crate::numeric::{Amount, Price};

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Which side of the book an order takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    #[must_use]
    pub fn is_buy(self) -> bool {
        matches!(self, Self::Buy)
    }

    #[must_use]
    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy { Self::Buy } else { Self::Sell }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

// ---------------------------------------------------------------------------
// Time-in-force
// ---------------------------------------------------------------------------

/// Treatment of the unmatched remainder after the matching loop.
///
/// IOC, FAK and FOK never rest: IOC/FAK discard whatever did not match
/// immediately, FOK additionally refuses to match at all unless the full
/// amount can fill. GTC rests until canceled, GTD rests until its expiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tif {
    #[default]
    Gtc,
    Gtd,
    Ioc,
    Fok,
    Fak,
}

impl Tif {
    /// Whether an unmatched remainder may rest in the book.
    #[must_use]
    pub fn rests(self) -> bool {
        matches!(self, Self::Gtc | Self::Gtd)
    }

    /// Post-only is meaningful only for orders that can rest.
    #[must_use]
    pub fn allows_post_only(self) -> bool {
        self.rests()
    }

    /// All-or-nothing semantics (pre-check before any mutation).
    #[must_use]
    pub fn all_or_nothing(self) -> bool {
        matches!(self, Self::Fok)
    }
}

impl fmt::Display for Tif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gtc => "GTC",
            Self::Gtd => "GTD",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
            Self::Fak => "FAK",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Status machine
// ---------------------------------------------------------------------------

/// Order lifecycle states. Transitions are monotonic; terminal states are
/// never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted by validation, not yet through the matching loop.
    Pending,
    /// Resting in the book, nothing filled yet.
    Open,
    /// Resting in the book with a partial fill.
    PartiallyFilled,
    /// Fully filled. Terminal.
    Filled,
    /// Canceled by the maker or by TIF disposition. Terminal.
    Canceled,
    /// Refused admission. Terminal.
    Rejected,
    /// Evicted past its expiry. Terminal.
    Expired,
}

impl OrderStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Rejected | Self::Expired
        )
    }

    /// Whether an order in this status still pins its salt. Canceled,
    /// rejected and expired salts may be reused; live and filled may not.
    #[must_use]
    pub fn blocks_salt_reuse(self) -> bool {
        !self.is_terminal() || self == Self::Filled
    }

    /// Legal forward moves in the lifecycle.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Open => matches!(
                next,
                Self::PartiallyFilled | Self::Filled | Self::Canceled | Self::Expired
            ),
            Self::PartiallyFilled => {
                matches!(next, Self::Filled | Self::Canceled | Self::Expired)
            }
            Self::Filled | Self::Canceled | Self::Rejected | Self::Expired => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Canceled => "canceled",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A validated, signed order as the engine tracks it.
///
/// `sequence` is assigned by the book on admission and breaks price ties;
/// `remaining` only ever decreases and stays within `[0, amount]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub market: MarketKey,
    pub outcome_index: u32,
    pub maker: Address,
    pub side: OrderSide,
    pub price: Price,
    pub amount: Amount,
    pub remaining: Amount,
    pub status: OrderStatus,
    pub tif: Tif,
    pub post_only: bool,
    /// Unix seconds; 0 means no expiry.
    pub expiry: u64,
    pub salt: U256,
    pub signature: Bytes,
    pub chain_id: u64,
    pub verifying_contract: Address,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub fn filled(&self) -> Amount {
        Amount(self.amount.0.saturating_sub(self.remaining.0))
    }

    /// Expired once a non-zero expiry is no longer in the future.
    #[must_use]
    pub fn is_expired(&self, now_unix: u64) -> bool {
        self.expiry != 0 && self.expiry <= now_unix
    }

    #[must_use]
    pub fn book_key(&self) -> BookKey {
        BookKey {
            market: self.market.clone(),
            outcome_index: self.outcome_index,
        }
    }

    #[must_use]
    pub fn salt_key(&self) -> SaltKey {
        SaltKey {
            chain_id: self.chain_id,
            verifying_contract: self.verifying_contract,
            maker: self.maker,
            salt: self.salt,
        }
    }

    /// Consume `matched` from the remainder and advance the status.
    pub fn record_fill(&mut self, matched: Amount) -> Result<()> {
        let remaining = self
            .remaining
            .checked_sub(matched)
            .ok_or(ForesightError::Overfill {
                order_id: self.id,
                remaining: self.remaining,
                matched,
            })?;
        self.remaining = remaining;
        let next = if remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        if self.status != next {
            self.transition(next)?;
        }
        Ok(())
    }

    /// Move to `next`, enforcing the monotonic lifecycle.
    pub fn transition(&mut self, next: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ForesightError::IllegalTransition {
                order_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire payload
// ---------------------------------------------------------------------------

/// The signed submission body as received over HTTP, before validation.
///
/// Addresses and the salt arrive as strings and are parsed by the
/// validator so malformed input maps to a wire error code instead of a
/// deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub market_key: String,
    pub outcome_index: u32,
    pub maker: String,
    #[serde(default)]
    pub owner_eoa: Option<String>,
    pub is_buy: bool,
    pub price: Price,
    pub amount: Amount,
    pub salt: String,
    /// Unix seconds; 0 means no expiry.
    #[serde(default)]
    pub expiry: u64,
    pub signature: String,
    pub chain_id: u64,
    pub verifying_contract: String,
    #[serde(default)]
    pub tif: Option<Tif>,
    #[serde(default)]
    pub post_only: Option<bool>,
    #[serde(default)]
    pub gasless: Option<bool>,
}

impl SubmitRequest {
    #[must_use]
    pub fn tif(&self) -> Tif {
        self.tif.unwrap_or_default()
    }

    #[must_use]
    pub fn post_only(&self) -> bool {
        self.post_only.unwrap_or(false)
    }

    #[must_use]
    pub fn gasless(&self) -> bool {
        self.gasless.unwrap_or(false)
    }

    #[must_use]
    pub fn side(&self) -> OrderSide {
        OrderSide::from_is_buy(self.is_buy)
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    /// A resting GTC limit order with placeholder chain fields.
    #[must_use]
    pub fn dummy_limit(side: OrderSide, price: u64, amount: u128) -> Self {
        Self::dummy_from(0xAA, side, price, amount)
    }

    /// Like [`Order::dummy_limit`] with a chosen maker byte, so tests can
    /// distinguish makers for self-trade and fairness checks.
    #[must_use]
    pub fn dummy_from(maker_byte: u8, side: OrderSide, price: u64, amount: u128) -> Self {
        Self {
            id: OrderId::new(),
            market: MarketKey::from("test-market"),
            outcome_index: 0,
            maker: Address::repeat_byte(maker_byte),
            side,
            price: Price(price),
            amount: Amount(amount),
            remaining: Amount(amount),
            status: OrderStatus::Pending,
            tif: Tif::Gtc,
            post_only: false,
            expiry: 0,
            salt: U256::from(rand::random::<u64>()),
            signature: Bytes::default(),
            chain_id: 137,
            verifying_contract: Address::repeat_byte(0x01),
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_tif(mut self, tif: Tif) -> Self {
        self.tif = tif;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: u64) -> Self {
        self.expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_post_only(mut self) -> Self {
        self.post_only = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tif_rest_rules() {
        assert!(Tif::Gtc.rests());
        assert!(Tif::Gtd.rests());
        assert!(!Tif::Ioc.rests());
        assert!(!Tif::Fok.rests());
        assert!(!Tif::Fak.rests());
        assert!(Tif::Fok.all_or_nothing());
        assert!(!Tif::Ioc.all_or_nothing());
    }

    #[test]
    fn tif_wire_spelling() {
        assert_eq!(serde_json::to_string(&Tif::Gtd).unwrap(), "\"GTD\"");
        let parsed: Tif = serde_json::from_str("\"FAK\"").unwrap();
        assert_eq!(parsed, Tif::Fak);
    }

    #[test]
    fn status_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap(),
            "\"partially_filled\""
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Canceled).unwrap(),
            "\"canceled\""
        );
    }

    #[test]
    fn terminal_states_do_not_move() {
        for terminal in [
            OrderStatus::Filled,
            OrderStatus::Canceled,
            OrderStatus::Rejected,
            OrderStatus::Expired,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(OrderStatus::Open));
            assert!(!terminal.can_transition_to(OrderStatus::Pending));
        }
    }

    #[test]
    fn salt_reuse_blocked_by_live_and_filled() {
        assert!(OrderStatus::Open.blocks_salt_reuse());
        assert!(OrderStatus::PartiallyFilled.blocks_salt_reuse());
        assert!(OrderStatus::Filled.blocks_salt_reuse());
        assert!(!OrderStatus::Canceled.blocks_salt_reuse());
        assert!(!OrderStatus::Expired.blocks_salt_reuse());
        assert!(!OrderStatus::Rejected.blocks_salt_reuse());
    }

    #[test]
    fn record_fill_tracks_remaining_and_status() {
        let mut order = Order::dummy_limit(OrderSide::Sell, 500_000, 10_000);
        order.status = OrderStatus::Open;
        order.record_fill(Amount(4_000)).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining, Amount(6_000));
        assert_eq!(order.filled(), Amount(4_000));
        order.record_fill(Amount(6_000)).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.remaining.is_zero());
    }

    #[test]
    fn overfill_is_rejected() {
        let mut order = Order::dummy_limit(OrderSide::Buy, 500_000, 1_000);
        order.status = OrderStatus::Open;
        assert!(order.record_fill(Amount(1_001)).is_err());
    }

    #[test]
    fn expiry_boundary() {
        let order = Order::dummy_limit(OrderSide::Buy, 1, 1_000).with_expiry(100);
        assert!(!order.is_expired(99));
        assert!(order.is_expired(100));
        assert!(order.is_expired(101));
        let never = Order::dummy_limit(OrderSide::Buy, 1, 1_000);
        assert!(!never.is_expired(u64::MAX));
    }

    #[test]
    fn submit_request_defaults() {
        let body = r#"{
            "marketKey": "will-eth-flip-btc",
            "outcomeIndex": 0,
            "maker": "0x00000000000000000000000000000000000000aa",
            "isBuy": true,
            "price": "500000",
            "amount": "4000000000000000000",
            "salt": "12345",
            "signature": "0x00",
            "chainId": 137,
            "verifyingContract": "0x0000000000000000000000000000000000000001"
        }"#;
        let req: SubmitRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.tif(), Tif::Gtc);
        assert!(!req.post_only());
        assert!(!req.gasless());
        assert_eq!(req.side(), OrderSide::Buy);
        assert_eq!(req.expiry, 0);
        assert_eq!(req.price, Price(500_000));
        assert_eq!(req.amount, Amount(4_000_000_000_000_000_000));
    }
}
