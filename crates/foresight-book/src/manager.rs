//! Owns every [`OrderBook`] on this node, keyed by (market, outcome).
//!
//! Books are created lazily on first touch and never share state; this is
//! the explicit owner that replaces ambient per-process globals.

use std::collections::HashMap;

use foresight_types::BookKey;

use crate::orderbook::OrderBook;

/// Keyed map of independent books. Not thread-safe by itself: callers
/// hold the single-writer guard for the market before touching it.
#[derive(Debug, Default)]
pub struct OrderBookManager {
    books: HashMap<BookKey, OrderBook>,
}

impl OrderBookManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, key: &BookKey) -> &mut OrderBook {
        self.books
            .entry(key.clone())
            .or_insert_with(|| OrderBook::new(key.clone()))
    }

    #[must_use]
    pub fn get(&self, key: &BookKey) -> Option<&OrderBook> {
        self.books.get(key)
    }

    pub fn get_mut(&mut self, key: &BookKey) -> Option<&mut OrderBook> {
        self.books.get_mut(key)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&BookKey, &mut OrderBook)> {
        self.books.iter_mut()
    }

    #[must_use]
    pub fn book_count(&self) -> usize {
        self.books.len()
    }
}
