//! # foresight-engine
//!
//! Admission and matching for the Foresight CLOB:
//!
//! - [`validator`]: pure economic/structural checks with stable wire codes
//! - [`signature`]: EIP-712 verification with an ERC-1271 fallback
//! - [`salts`]: salt replay guard
//! - [`risk`]: buy-side USDC reservations
//! - [`engine`]: the price-time matching loop, cancel, and expiry sweep
//!
//! The matching core is synchronous under a per-market writer guard;
//! signature verification is the only async admission step (a possible
//! ERC-1271 RPC) and runs before the guard is taken.

pub mod engine;
pub mod risk;
pub mod salts;
pub mod signature;
pub mod validator;

pub use engine::{EngineSink, MatchingEngine, NullSink, SubmitOutcome};
pub use risk::RiskManager;
pub use salts::SaltRegistry;
pub use signature::{Erc1271Prober, NoopProber, RpcProber, order_digest, verify_order_signature};
pub use validator::{ValidatedSubmit, validate_order};
