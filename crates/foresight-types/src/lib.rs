//! # foresight-types
//!
//! Shared types, errors, and configuration for the **Foresight Market**
//! trading backend.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`MatchId`], [`ClientId`], [`MarketKey`], [`BookKey`], [`SaltKey`]
//! - **Fixed-point numerics**: [`Price`] (6 dp), [`Amount`] (18 dp), [`Usdc`] (6 dp)
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderStatus`], [`Tif`], [`SubmitRequest`]
//! - **Fill model**: [`Match`], [`SettlementFill`]
//! - **Projections**: [`DepthSnapshot`], [`DepthLevel`], [`MarketStats`]
//! - **Configuration**: [`NodeConfig`], [`MarketParams`], [`ClusterConfig`], [`NodeRole`]
//! - **Errors**: [`ForesightError`] with `FM_ERR_` prefix codes and stable wire codes
//! - **Constants**: scales, headers, caps, and intervals

pub mod config;
pub mod constants;
pub mod depth;
pub mod error;
pub mod fills;
pub mod ids;
pub mod numeric;
pub mod order;
pub mod stats;

// Re-export all primary types at crate root for ergonomic imports:
//   use foresight_types::{Order, OrderSide, Match, Price, ...};

pub use config::*;
pub use depth::*;
pub use error::*;
pub use fills::*;
pub use ids::*;
pub use numeric::*;
pub use order::*;
pub use stats::*;

// Constants are accessed via `foresight_types::constants::FOO`
// (not re-exported to avoid name collisions).
