//! The order book for a single (market, outcome) pair.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Price>, PriceLevel>` -- highest price first
//! - **Asks** (sells): `BTreeMap<Price, PriceLevel>` -- lowest price first
//!
//! An auxiliary `HashMap<OrderId, (Side, Price)>` enables O(log N) removal.
//! A bounded trade tape feeds the stats projection and the `trades`
//! channel.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::Utc;
use ethers::types::Address;
use foresight_types::constants::TRADE_TAPE_CAPACITY;
use foresight_types::{
    Amount, BookKey, DepthLevel, DepthSnapshot, ForesightError, MarketStats, Match, Order, OrderId,
    OrderSide, Price, Result, Usdc,
};

use crate::price_level::PriceLevel;

/// Resting orders and trade tape for one (market, outcome).
#[derive(Debug)]
pub struct OrderBook {
    pub key: BookKey,
    /// Buy side: highest price first (`Reverse` key).
    bids: BTreeMap<Reverse<Price>, PriceLevel>,
    /// Sell side: lowest price first.
    asks: BTreeMap<Price, PriceLevel>,
    /// Fast lookup: `OrderId -> (side, price)` for O(log N) removal.
    index: HashMap<OrderId, (OrderSide, Price)>,
    /// Most recent fills, newest at the back, bounded.
    tape: VecDeque<Match>,
}

impl OrderBook {
    #[must_use]
    pub fn new(key: BookKey) -> Self {
        Self {
            key,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
            tape: VecDeque::new(),
        }
    }

    // =================================================================
    // Mutation
    // =================================================================

    /// Rest an order, sorted by price then ascending sequence.
    pub fn add_order(&mut self, order: Order) -> Result<()> {
        if self.index.contains_key(&order.id) {
            return Err(ForesightError::DuplicateOrderId(order.id));
        }
        self.index.insert(order.id, (order.side, order.price));
        match order.side {
            OrderSide::Buy => self
                .bids
                .entry(Reverse(order.price))
                .or_insert_with(|| PriceLevel::new(order.price))
                .insert(order),
            OrderSide::Sell => self
                .asks
                .entry(order.price)
                .or_insert_with(|| PriceLevel::new(order.price))
                .insert(order),
        }
        Ok(())
    }

    /// Replace a resting order in place after a partial fill. Price and
    /// side must be unchanged; only remaining/status vary.
    pub fn update_order(&mut self, order: Order) -> Result<()> {
        let level = self
            .level_mut(order.side, order.price)
            .ok_or(ForesightError::OrderNotFound(order.id))?;
        if level.replace(order.clone()) {
            Ok(())
        } else {
            Err(ForesightError::OrderNotFound(order.id))
        }
    }

    /// Remove an order by id, returning it so reservations can be
    /// released. Drops the level if it becomes empty.
    pub fn remove_order(&mut self, order_id: OrderId) -> Result<Order> {
        let (side, price) = self
            .index
            .remove(&order_id)
            .ok_or(ForesightError::OrderNotFound(order_id))?;
        let level = self
            .level_mut(side, price)
            .ok_or(ForesightError::OrderNotFound(order_id))?;
        let order = level
            .remove(order_id)
            .ok_or(ForesightError::OrderNotFound(order_id))?;
        if level.is_empty() {
            match side {
                OrderSide::Buy => self.bids.remove(&Reverse(price)),
                OrderSide::Sell => self.asks.remove(&price),
            };
        }
        Ok(order)
    }

    /// Append a fill to the trade tape, evicting the oldest past capacity.
    pub fn record_trade(&mut self, fill: Match) {
        if self.tape.len() >= TRADE_TAPE_CAPACITY {
            self.tape.pop_front();
        }
        self.tape.push_back(fill);
    }

    // =================================================================
    // Matching queries
    // =================================================================

    /// Best-priced, oldest order on the side opposite an incoming
    /// `incoming_side` order, optionally skipping one maker's own resting
    /// orders without reordering the book.
    #[must_use]
    pub fn best_counter_order(
        &self,
        incoming_side: OrderSide,
        exclude: Option<Address>,
    ) -> Option<Order> {
        match incoming_side {
            OrderSide::Buy => self
                .asks
                .values()
                .find_map(|level| level.front(exclude))
                .cloned(),
            OrderSide::Sell => self
                .bids
                .values()
                .find_map(|level| level.front(exclude))
                .cloned(),
        }
    }

    /// Total counter-side quantity at-or-better than `limit`, excluding
    /// one maker's liquidity and anything already expired at `now`. The
    /// FOK all-or-nothing pre-check: reads the book without mutating it,
    /// so expired orders are skipped here and evicted by the matching
    /// loop or the sweeper.
    #[must_use]
    pub fn available_at_or_better(
        &self,
        incoming_side: OrderSide,
        limit: Price,
        now: u64,
        exclude: Option<Address>,
    ) -> Amount {
        let live = |level: &PriceLevel| {
            level
                .iter()
                .filter(|o| exclude != Some(o.maker) && !o.is_expired(now))
                .fold(Amount::ZERO, |acc, o| acc.saturating_add(o.remaining))
        };
        match incoming_side {
            OrderSide::Buy => self
                .asks
                .range(..=limit)
                .fold(Amount::ZERO, |acc, (_, level)| acc.saturating_add(live(level))),
            OrderSide::Sell => self
                .bids
                .range(..=Reverse(limit))
                .fold(Amount::ZERO, |acc, (_, level)| acc.saturating_add(live(level))),
        }
    }

    // =================================================================
    // Read projections
    // =================================================================

    #[must_use]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next().map(|r| r.0)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    /// Aggregate remaining quantity per price per side, bounded by
    /// `levels` on each side.
    #[must_use]
    pub fn depth_snapshot(&self, levels: usize) -> DepthSnapshot {
        let project = |level: &PriceLevel| DepthLevel {
            price: level.price,
            quantity: level.total_remaining(None),
            orders: level.len(),
        };
        DepthSnapshot {
            market: self.key.market.clone(),
            outcome_index: self.key.outcome_index,
            bids: self.bids.values().take(levels).map(project).collect(),
            asks: self.asks.values().take(levels).map(project).collect(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Last price, trailing-24h volume and counts from the tape, plus
    /// current best bid/ask.
    #[must_use]
    pub fn stats(&self) -> MarketStats {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::hours(24);
        let mut volume = Usdc::ZERO;
        let mut trades = 0u64;
        for fill in self.tape.iter().rev() {
            if fill.executed_at < cutoff {
                break;
            }
            trades += 1;
            if let Some(value) = fill.notional() {
                volume = volume.saturating_add(value);
            }
        }
        MarketStats {
            market: self.key.market.clone(),
            outcome_index: self.key.outcome_index,
            last_price: self.tape.back().map(|f| f.matched_price),
            volume_24h: volume,
            trades_24h: trades,
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            timestamp_ms: now.timestamp_millis(),
        }
    }

    /// Most recent fills, newest first, bounded by `limit`.
    #[must_use]
    pub fn recent_trades(&self, limit: usize) -> Vec<Match> {
        self.tape.iter().rev().take(limit).cloned().collect()
    }

    /// Every resting order, for the expiry sweeper.
    #[must_use]
    pub fn all_orders(&self) -> Vec<Order> {
        self.bids
            .values()
            .chain(self.asks.values())
            .flat_map(|level| level.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn get_order(&self, order_id: OrderId) -> Option<Order> {
        let (side, price) = *self.index.get(&order_id)?;
        self.level(side, price)?
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn level(&self, side: OrderSide, price: Price) -> Option<&PriceLevel> {
        match side {
            OrderSide::Buy => self.bids.get(&Reverse(price)),
            OrderSide::Sell => self.asks.get(&price),
        }
    }

    fn level_mut(&mut self, side: OrderSide, price: Price) -> Option<&mut PriceLevel> {
        match side {
            OrderSide::Buy => self.bids.get_mut(&Reverse(price)),
            OrderSide::Sell => self.asks.get_mut(&price),
        }
    }
}

#[cfg(test)]
mod tests {
    use foresight_types::MarketKey;

    use super::*;

    fn book() -> OrderBook {
        OrderBook::new(BookKey::new(MarketKey::from("test-market"), 0))
    }

    fn resting(maker_byte: u8, side: OrderSide, price: u64, amount: u128, seq: u64) -> Order {
        let mut order = Order::dummy_from(maker_byte, side, price, amount);
        order.sequence = seq;
        order
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut b = book();
        let order = resting(0xaa, OrderSide::Buy, 400_000, 1_000, 1);
        let dup = order.clone();
        b.add_order(order).unwrap();
        assert!(matches!(
            b.add_order(dup),
            Err(ForesightError::DuplicateOrderId(_))
        ));
    }

    #[test]
    fn best_counter_is_opposite_side_best_price() {
        let mut b = book();
        b.add_order(resting(0xaa, OrderSide::Sell, 520_000, 1_000, 1))
            .unwrap();
        b.add_order(resting(0xbb, OrderSide::Sell, 510_000, 1_000, 2))
            .unwrap();
        b.add_order(resting(0xcc, OrderSide::Buy, 480_000, 1_000, 3))
            .unwrap();

        let counter = b.best_counter_order(OrderSide::Buy, None).unwrap();
        assert_eq!(counter.price, Price(510_000));
        let counter = b.best_counter_order(OrderSide::Sell, None).unwrap();
        assert_eq!(counter.price, Price(480_000));
    }

    #[test]
    fn same_price_fifo_by_sequence_across_interleaved_inserts() {
        let mut b = book();
        // Insert across two levels in shuffled sequence order.
        b.add_order(resting(0xaa, OrderSide::Sell, 500_000, 1_000, 5))
            .unwrap();
        b.add_order(resting(0xbb, OrderSide::Sell, 510_000, 1_000, 2))
            .unwrap();
        b.add_order(resting(0xcc, OrderSide::Sell, 500_000, 1_000, 3))
            .unwrap();
        b.add_order(resting(0xdd, OrderSide::Sell, 500_000, 1_000, 4))
            .unwrap();

        let counter = b.best_counter_order(OrderSide::Buy, None).unwrap();
        assert_eq!(counter.sequence, 3, "oldest sequence at the best level wins");
    }

    #[test]
    fn best_counter_skips_excluded_maker() {
        let mut b = book();
        b.add_order(resting(0xaa, OrderSide::Sell, 500_000, 1_000, 1))
            .unwrap();
        b.add_order(resting(0xbb, OrderSide::Sell, 510_000, 1_000, 2))
            .unwrap();

        let counter = b
            .best_counter_order(OrderSide::Buy, Some(Address::repeat_byte(0xaa)))
            .unwrap();
        assert_eq!(counter.maker, Address::repeat_byte(0xbb));
        // The skipped order is untouched.
        assert_eq!(b.order_count(), 2);
    }

    #[test]
    fn available_at_or_better_respects_limit_and_exclusion() {
        let mut b = book();
        b.add_order(resting(0xaa, OrderSide::Sell, 500_000, 1_000, 1))
            .unwrap();
        b.add_order(resting(0xbb, OrderSide::Sell, 510_000, 2_000, 2))
            .unwrap();
        b.add_order(resting(0xcc, OrderSide::Sell, 520_000, 4_000, 3))
            .unwrap();

        assert_eq!(
            b.available_at_or_better(OrderSide::Buy, Price(510_000), 0, None),
            Amount(3_000)
        );
        assert_eq!(
            b.available_at_or_better(OrderSide::Buy, Price(499_999), 0, None),
            Amount::ZERO
        );
        assert_eq!(
            b.available_at_or_better(
                OrderSide::Buy,
                Price(520_000),
                0,
                Some(Address::repeat_byte(0xbb))
            ),
            Amount(5_000)
        );
    }

    #[test]
    fn available_skips_expired_orders() {
        let mut b = book();
        b.add_order(resting(0xaa, OrderSide::Sell, 500_000, 1_000, 1).with_expiry(100))
            .unwrap();
        b.add_order(resting(0xbb, OrderSide::Sell, 500_000, 2_000, 2))
            .unwrap();

        // Before the expiry both count; at and after it only the live one.
        assert_eq!(
            b.available_at_or_better(OrderSide::Buy, Price(500_000), 99, None),
            Amount(3_000)
        );
        assert_eq!(
            b.available_at_or_better(OrderSide::Buy, Price(500_000), 100, None),
            Amount(2_000)
        );
        // The scan is a pure read: the expired order still rests.
        assert_eq!(b.order_count(), 2);
    }

    #[test]
    fn available_on_bid_side_counts_at_or_above() {
        let mut b = book();
        b.add_order(resting(0xaa, OrderSide::Buy, 500_000, 1_000, 1))
            .unwrap();
        b.add_order(resting(0xbb, OrderSide::Buy, 480_000, 2_000, 2))
            .unwrap();
        // Sell limited at 0.49 may hit the 0.50 bid only.
        assert_eq!(
            b.available_at_or_better(OrderSide::Sell, Price(490_000), 0, None),
            Amount(1_000)
        );
    }

    #[test]
    fn remove_returns_order_and_drops_empty_level() {
        let mut b = book();
        let order = resting(0xaa, OrderSide::Buy, 400_000, 1_000, 1);
        let id = order.id;
        b.add_order(order).unwrap();

        let removed = b.remove_order(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(b.is_empty());
        assert_eq!(b.best_bid(), None);
        assert!(matches!(
            b.remove_order(id),
            Err(ForesightError::OrderNotFound(_))
        ));
    }

    #[test]
    fn depth_snapshot_aggregates_and_bounds_levels() {
        let mut b = book();
        b.add_order(resting(0xaa, OrderSide::Buy, 500_000, 1_000, 1))
            .unwrap();
        b.add_order(resting(0xbb, OrderSide::Buy, 500_000, 2_000, 2))
            .unwrap();
        b.add_order(resting(0xcc, OrderSide::Buy, 490_000, 4_000, 3))
            .unwrap();
        b.add_order(resting(0xdd, OrderSide::Sell, 510_000, 8_000, 4))
            .unwrap();

        let snap = b.depth_snapshot(1);
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.bids[0].price, Price(500_000));
        assert_eq!(snap.bids[0].quantity, Amount(3_000));
        assert_eq!(snap.bids[0].orders, 2);
        assert_eq!(snap.asks.len(), 1);
        assert_eq!(snap.asks[0].quantity, Amount(8_000));

        let full = b.depth_snapshot(10);
        assert_eq!(full.bids.len(), 2);
        assert_eq!(full.bids[1].price, Price(490_000));
    }

    #[test]
    fn update_order_changes_remaining_in_place() {
        let mut b = book();
        let mut order = resting(0xaa, OrderSide::Sell, 500_000, 10_000, 1);
        let id = order.id;
        b.add_order(order.clone()).unwrap();

        order.remaining = Amount(6_000);
        b.update_order(order).unwrap();

        assert_eq!(b.get_order(id).unwrap().remaining, Amount(6_000));
        assert_eq!(b.depth_snapshot(1).asks[0].quantity, Amount(6_000));
    }

    #[test]
    fn all_orders_covers_both_sides() {
        let mut b = book();
        b.add_order(resting(0xaa, OrderSide::Buy, 400_000, 1_000, 1))
            .unwrap();
        b.add_order(resting(0xbb, OrderSide::Sell, 600_000, 1_000, 2))
            .unwrap();
        assert_eq!(b.all_orders().len(), 2);
    }

    #[test]
    fn fairness_holds_under_random_interleaving() {
        let mut b = book();
        let mut seqs: Vec<u64> = (1..=50).collect();
        // Shuffle insertion order; iteration must still be by sequence.
        for i in (1..seqs.len()).rev() {
            let j = rand::random::<usize>() % (i + 1);
            seqs.swap(i, j);
        }
        for seq in &seqs {
            let price = 500_000 + (seq % 3) * 1_000;
            b.add_order(resting(0xaa, OrderSide::Sell, price, 100, *seq))
                .unwrap();
        }
        let snap = b.depth_snapshot(10);
        assert_eq!(snap.asks.len(), 3);
        for level_price in [500_000u64, 501_000, 502_000] {
            let level_orders: Vec<u64> = b
                .all_orders()
                .into_iter()
                .filter(|o| o.price == Price(level_price))
                .map(|o| o.sequence)
                .collect();
            let mut sorted = level_orders.clone();
            sorted.sort_unstable();
            assert_eq!(level_orders, sorted, "level {level_price} not in sequence order");
        }
    }
}
