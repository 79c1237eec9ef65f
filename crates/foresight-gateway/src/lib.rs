//! # foresight-gateway
//!
//! The node process around the matching engine:
//!
//! - [`routes`]: REST surface and the shared write pipeline
//! - [`ws`]: WebSocket hub and channel fan-out
//! - [`cluster`]: leader/follower forwarding with per-path circuit breakers
//! - [`idempotency`]: replay cache for mutating routes
//! - [`quota`]: per-maker daily gasless caps
//! - [`sink`]: engine events into the hub, the settler, and the store
//! - [`state`]: process assembly

pub mod cluster;
pub mod error;
pub mod idempotency;
pub mod quota;
pub mod routes;
pub mod sink;
pub mod state;
pub mod ws;

pub use routes::router;
pub use state::AppState;
