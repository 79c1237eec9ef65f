//! # foresight-book
//!
//! The pure book plane: [`PriceLevel`], [`OrderBook`] and
//! [`OrderBookManager`]. No I/O and no async — every operation is a
//! synchronous mutation or read of in-memory state, called under the
//! market's single-writer guard by the engine.
//!
//! Ordering invariants:
//! - Price priority: bids iterate highest first, asks lowest first.
//! - Time priority: within a level, strictly ascending `sequence` —
//!   never id or address — so replays are deterministic.

pub mod manager;
pub mod orderbook;
pub mod price_level;

pub use manager::OrderBookManager;
pub use orderbook::OrderBook;
pub use price_level::PriceLevel;
