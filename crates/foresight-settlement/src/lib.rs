//! # foresight-settlement
//!
//! The settlement plane behind the matching engine:
//!
//! - [`batch`]: per-market fill queues, SHA-256 batch ids, on-chain
//!   submission through an operator transaction (at-least-once)
//! - [`intents`]: Redis-mirrored pending-batch intents so a restarted
//!   leader resubmits unconfirmed batches
//! - [`store`]: best-effort Postgres mirror of orders and matches
//!
//! Nothing here is load-bearing for matching decisions: the in-memory
//! book is the source of truth, and every store failure degrades to a
//! warning.

pub mod batch;
pub mod intents;
pub mod store;

pub use batch::{BatchSettler, EthersSubmitter, FillBatch, FillSubmitter};
pub use intents::{BatchIntent, IntentStore};
pub use store::OrderStore;
