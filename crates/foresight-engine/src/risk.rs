//! Buy-side collateral reservations.
//!
//! Admitting a buy order reserves its USDC notional at the limit price;
//! cancel and expiry release the remainder's reservation; a fill converts
//! the matched portion into a settlement obligation — consumed, never
//! released. Sell-side custody (outcome tokens) is guaranteed on-chain
//! before an ask is accepted, so asks reserve nothing here.
//!
//! Per-maker counters use `DashMap` entry-level atomicity; the matching
//! path additionally runs under the market's writer guard.

use dashmap::DashMap;
use ethers::types::Address;
use foresight_types::{notional, Amount, ForesightError, Order, Price, Result, Usdc};

/// Per-maker reserved USDC for open buy orders.
#[derive(Debug, Default)]
pub struct RiskManager {
    reserved: DashMap<Address, Usdc>,
}

impl RiskManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the buy-side notional for an admitted order. Sell orders
    /// are a no-op.
    pub fn reserve(&self, order: &Order) -> Result<Usdc> {
        if !order.side.is_buy() {
            return Ok(Usdc::ZERO);
        }
        let value = Self::value_at_limit(order.remaining, order.price)?;
        let mut slot = self.reserved.entry(order.maker).or_insert(Usdc::ZERO);
        *slot = slot
            .checked_add(value)
            .ok_or_else(|| ForesightError::Internal("reservation overflow".into()))?;
        Ok(value)
    }

    /// Release the reservation for an order's unmatched remainder
    /// (cancel or expiry). Sell orders release nothing.
    pub fn release_remainder(&self, order: &Order) -> Result<Usdc> {
        if !order.side.is_buy() {
            return Ok(Usdc::ZERO);
        }
        let value = Self::value_at_limit(order.remaining, order.price)?;
        self.debit(order.maker, value)?;
        Ok(value)
    }

    /// Convert a matched portion of a buy order into a settlement
    /// obligation. Consumes at the reserved (limit) rate so the counter
    /// stays conserved regardless of price improvement.
    pub fn consume(&self, maker: Address, matched: Amount, limit_price: Price) -> Result<Usdc> {
        let value = Self::value_at_limit(matched, limit_price)?;
        self.debit(maker, value)?;
        Ok(value)
    }

    /// Currently reserved USDC for one maker.
    #[must_use]
    pub fn reserved_for(&self, maker: Address) -> Usdc {
        self.reserved
            .get(&maker)
            .map_or(Usdc::ZERO, |slot| *slot)
    }

    fn debit(&self, maker: Address, value: Usdc) -> Result<()> {
        if value.is_zero() {
            return Ok(());
        }
        let mut slot = self
            .reserved
            .get_mut(&maker)
            .ok_or(ForesightError::ReservationUnderflow {
                reserved: Usdc::ZERO,
                requested: value,
            })?;
        *slot = slot
            .checked_sub(value)
            .ok_or(ForesightError::ReservationUnderflow {
                reserved: *slot,
                requested: value,
            })?;
        Ok(())
    }

    fn value_at_limit(amount: Amount, price: Price) -> Result<Usdc> {
        notional(amount, price).ok_or_else(|| {
            ForesightError::BookCorrupted {
                reason: "notional overflow in reservation".into(),
            }
        })
    }
}
