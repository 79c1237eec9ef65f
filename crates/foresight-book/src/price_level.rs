//! A single price level in the order book.
//!
//! Orders at the same price are held in ascending `sequence` order — the
//! time-priority queue. Insertion finds the sequence position rather than
//! appending, so replays that interleave levels still produce the same
//! queue.

use std::collections::VecDeque;

use foresight_types::{Amount, Order, OrderId, Price};

/// All resting orders at one price, front = lowest sequence = highest
/// time priority.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Price,
    orders: VecDeque<Order>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Insert keeping ascending `sequence`. Sequences are unique per book,
    /// so position by partition point is stable.
    pub fn insert(&mut self, order: Order) {
        let pos = self
            .orders
            .partition_point(|resting| resting.sequence < order.sequence);
        self.orders.insert(pos, order);
    }

    /// Oldest (lowest-sequence) order, or the oldest not owned by
    /// `exclude` when self-trade protection is on. Never reorders.
    #[must_use]
    pub fn front(&self, exclude: Option<ethers::types::Address>) -> Option<&Order> {
        match exclude {
            None => self.orders.front(),
            Some(maker) => self.orders.iter().find(|o| o.maker != maker),
        }
    }

    /// Remove a specific order by id. Returns the removed order, or `None`.
    pub fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == order_id)?;
        self.orders.remove(pos)
    }

    /// Replace an order in place (after a partial fill). Returns `false`
    /// if the id is not at this level.
    pub fn replace(&mut self, order: Order) -> bool {
        match self.orders.iter_mut().find(|o| o.id == order.id) {
            Some(slot) => {
                *slot = order;
                true
            }
            None => false,
        }
    }

    /// Sum of remaining amounts across the level, optionally excluding one
    /// maker's liquidity (the FOK self-exclusion path).
    #[must_use]
    pub fn total_remaining(&self, exclude: Option<ethers::types::Address>) -> Amount {
        self.orders
            .iter()
            .filter(|o| exclude != Some(o.maker))
            .fold(Amount::ZERO, |acc, o| acc.saturating_add(o.remaining))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }
}
