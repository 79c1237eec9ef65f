//! Error types for the Foresight trading backend.
//!
//! All errors carry the `FM_ERR_` prefix convention for easy grepping in
//! logs. Codes are grouped by subsystem:
//! - 1xx: Validation errors (deterministic, never retried)
//! - 2xx: Book errors
//! - 3xx: Risk / reservation errors
//! - 4xx: Settlement errors
//! - 5xx: Store / infra errors (transient, degrade gracefully)
//! - 6xx: Cluster / proxy errors (retry elsewhere or later)
//! - 9xx: Internal invariant violations (fatal bugs, never mask)
//!
//! Validation variants additionally expose a stable wire code via
//! [`ForesightError::wire_code`]; clients key retry and display logic off
//! those, so they never change spelling.

use thiserror::Error;

use crate::ids::OrderId;
use crate::numeric::{Amount, Price, Usdc};
use crate::order::OrderStatus;

/// Central error enum for all Foresight operations.
#[derive(Debug, Error)]
pub enum ForesightError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The market key is empty or malformed.
    #[error("FM_ERR_100: Invalid market key")]
    InvalidMarketKey,

    /// The outcome index is out of range for the market.
    #[error("FM_ERR_101: Invalid outcome index: {0}")]
    InvalidOutcome(u32),

    /// The chain id must be a positive integer.
    #[error("FM_ERR_102: Invalid chain id: {0}")]
    InvalidChainId(u64),

    /// The verifying contract is not a well-formed address.
    #[error("FM_ERR_103: Invalid verifying contract: {0}")]
    InvalidVerifyingContract(String),

    /// The expiry field is malformed.
    #[error("FM_ERR_104: Invalid expiry: {reason}")]
    InvalidExpiry { reason: String },

    /// The salt does not parse as a non-negative integer.
    #[error("FM_ERR_105: Invalid salt: {0}")]
    InvalidSalt(String),

    /// The maker is not a well-formed address.
    #[error("FM_ERR_106: Invalid maker address: {0}")]
    InvalidMaker(String),

    /// The price is outside the market's `[min, max]` range.
    #[error("FM_ERR_107: Invalid price: {price} outside [{min}, {max}]")]
    InvalidPrice {
        price: Price,
        min: Price,
        max: Price,
    },

    /// The price is not aligned to the market's tick size.
    #[error("FM_ERR_108: Price {price} not aligned to tick {tick}")]
    InvalidTickSize { price: Price, tick: u64 },

    /// The amount is outside the market's `[min, max]` range.
    #[error("FM_ERR_109: Invalid amount: {amount} outside [{min}, {max}]")]
    InvalidAmount {
        amount: Amount,
        min: Amount,
        max: Amount,
    },

    /// Post-only is incompatible with an immediate time-in-force.
    #[error("FM_ERR_110: Post-only incompatible with {tif}")]
    InvalidPostOnly { tif: String },

    /// A GTD order requires a future expiry within the allowed horizon.
    #[error("FM_ERR_111: Invalid GTD expiry: {reason}")]
    InvalidGtdExpiry { reason: String },

    /// The order's expiry has already passed.
    #[error("FM_ERR_112: Order expired at {expiry} (now {now})")]
    OrderExpired { expiry: u64, now: u64 },

    /// The typed-data signature did not recover to an authorized signer
    /// and the ERC-1271 fallback refused it.
    #[error("FM_ERR_113: Invalid order signature")]
    InvalidSignature,

    /// The (chain, contract, maker, salt) tuple is already live or filled.
    #[error("FM_ERR_114: Duplicate order for salt {salt}")]
    DuplicateOrder { salt: String },

    /// The maker's daily gasless-submission quota is exhausted.
    #[error("FM_ERR_115: Gasless quota exceeded: used {used}, cap {cap}")]
    GaslessQuotaExceeded { used: Usdc, cap: Usdc },

    // =================================================================
    // Book Errors (2xx)
    // =================================================================
    /// The requested order is not resting in any book.
    #[error("FM_ERR_200: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order with this id is already in the book.
    #[error("FM_ERR_201: Order already in book: {0}")]
    DuplicateOrderId(OrderId),

    /// The caller is not the maker of the order it tried to cancel.
    #[error("FM_ERR_202: Caller is not the maker of order {0}")]
    NotOrderMaker(OrderId),

    // =================================================================
    // Risk Errors (3xx)
    // =================================================================
    /// Releasing or consuming more than the maker has reserved.
    #[error("FM_ERR_300: Reservation underflow for maker: have {reserved}, asked {requested}")]
    ReservationUnderflow { reserved: Usdc, requested: Usdc },

    // =================================================================
    // Settlement Errors (4xx)
    // =================================================================
    /// On-chain batch submission failed; the queue is retained for retry.
    #[error("FM_ERR_400: Settlement submission failed: {reason}")]
    SettlementFailed { reason: String },

    /// A settlement batch could not be encoded for submission.
    #[error("FM_ERR_401: Settlement encoding failed: {reason}")]
    SettlementEncoding { reason: String },

    // =================================================================
    // Store / Infra Errors (5xx)
    // =================================================================
    /// Relational store error. Persistence is best-effort; callers log
    /// and continue unless the read was load-bearing.
    #[error("FM_ERR_500: Store error: {reason}")]
    Store { reason: String },

    /// Redis error. Caches fall back to in-process state.
    #[error("FM_ERR_501: Redis error: {reason}")]
    Redis { reason: String },

    /// RPC error talking to the chain.
    #[error("FM_ERR_502: RPC error: {reason}")]
    Rpc { reason: String },

    /// Configuration error (missing or malformed environment).
    #[error("FM_ERR_503: Configuration error: {0}")]
    Configuration(String),

    // =================================================================
    // Cluster Errors (6xx)
    // =================================================================
    /// An inbound request already carried the proxy loop-guard header.
    #[error("FM_ERR_600: Proxy loop detected")]
    ProxyLoop,

    /// The leader could not be reached for a forwarded write.
    #[error("FM_ERR_601: Leader unreachable: {reason}")]
    LeaderUnreachable { reason: String },

    /// The per-path circuit breaker is open; retry after cooldown.
    #[error("FM_ERR_602: Circuit open for path {path}")]
    CircuitOpen { path: String },

    /// A follower has no leader address configured.
    #[error("FM_ERR_603: No leader configured")]
    NoLeader,

    // =================================================================
    // Internal (9xx) — invariant violations, never mask
    // =================================================================
    /// A fill exceeded an order's remaining amount. The book refuses to
    /// proceed rather than go negative.
    #[error("FM_ERR_900: Overfill on {order_id}: remaining {remaining}, matched {matched}")]
    Overfill {
        order_id: OrderId,
        remaining: Amount,
        matched: Amount,
    },

    /// A status transition violated the monotonic lifecycle.
    #[error("FM_ERR_901: Illegal transition on {order_id}: {from} -> {to}")]
    IllegalTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The book detected internal corruption and refuses further mutation.
    #[error("FM_ERR_902: Book corrupted: {reason}")]
    BookCorrupted { reason: String },

    /// Unrecoverable internal error.
    #[error("FM_ERR_903: Internal error: {0}")]
    Internal(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, ForesightError>;

impl ForesightError {
    /// Stable wire code, safe to key client logic on.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::InvalidMarketKey => "INVALID_MARKET_KEY",
            Self::InvalidOutcome(_) => "INVALID_OUTCOME",
            Self::InvalidChainId(_) => "INVALID_CHAIN_ID",
            Self::InvalidVerifyingContract(_) => "INVALID_VERIFYING_CONTRACT",
            Self::InvalidExpiry { .. } => "INVALID_EXPIRY",
            Self::InvalidSalt(_) => "INVALID_SALT",
            Self::InvalidMaker(_) => "INVALID_MAKER",
            Self::InvalidPrice { .. } => "INVALID_PRICE",
            Self::InvalidTickSize { .. } => "INVALID_TICK_SIZE",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::InvalidPostOnly { .. } => "INVALID_POST_ONLY",
            Self::InvalidGtdExpiry { .. } => "INVALID_GTD_EXPIRY",
            Self::OrderExpired { .. } => "ORDER_EXPIRED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::DuplicateOrder { .. } => "DUPLICATE_ORDER",
            Self::GaslessQuotaExceeded { .. } => "GASLESS_QUOTA_EXCEEDED",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::DuplicateOrderId(_) => "DUPLICATE_ORDER_ID",
            Self::NotOrderMaker(_) => "NOT_ORDER_MAKER",
            Self::ReservationUnderflow { .. } => "RESERVATION_UNDERFLOW",
            Self::SettlementFailed { .. } => "SETTLEMENT_FAILED",
            Self::SettlementEncoding { .. } => "SETTLEMENT_ENCODING",
            Self::Store { .. } => "STORE_ERROR",
            Self::Redis { .. } => "REDIS_ERROR",
            Self::Rpc { .. } => "RPC_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::ProxyLoop => "PROXY_LOOP",
            Self::LeaderUnreachable { .. } => "LEADER_UNREACHABLE",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::NoLeader => "NO_LEADER",
            Self::Overfill { .. } | Self::IllegalTransition { .. } | Self::BookCorrupted { .. } => {
                "BOOK_CORRUPTED"
            }
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Numeric `FM_ERR_` code, for structured log fields.
    #[must_use]
    pub fn error_code(&self) -> u16 {
        match self {
            Self::InvalidMarketKey => 100,
            Self::InvalidOutcome(_) => 101,
            Self::InvalidChainId(_) => 102,
            Self::InvalidVerifyingContract(_) => 103,
            Self::InvalidExpiry { .. } => 104,
            Self::InvalidSalt(_) => 105,
            Self::InvalidMaker(_) => 106,
            Self::InvalidPrice { .. } => 107,
            Self::InvalidTickSize { .. } => 108,
            Self::InvalidAmount { .. } => 109,
            Self::InvalidPostOnly { .. } => 110,
            Self::InvalidGtdExpiry { .. } => 111,
            Self::OrderExpired { .. } => 112,
            Self::InvalidSignature => 113,
            Self::DuplicateOrder { .. } => 114,
            Self::GaslessQuotaExceeded { .. } => 115,
            Self::OrderNotFound(_) => 200,
            Self::DuplicateOrderId(_) => 201,
            Self::NotOrderMaker(_) => 202,
            Self::ReservationUnderflow { .. } => 300,
            Self::SettlementFailed { .. } => 400,
            Self::SettlementEncoding { .. } => 401,
            Self::Store { .. } => 500,
            Self::Redis { .. } => 501,
            Self::Rpc { .. } => 502,
            Self::Configuration(_) => 503,
            Self::ProxyLoop => 600,
            Self::LeaderUnreachable { .. } => 601,
            Self::CircuitOpen { .. } => 602,
            Self::NoLeader => 603,
            Self::Overfill { .. } => 900,
            Self::IllegalTransition { .. } => 901,
            Self::BookCorrupted { .. } => 902,
            Self::Internal(_) => 903,
        }
    }

    /// Deterministic client error that must never be auto-retried.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        (100..200).contains(&self.error_code())
    }

    /// Cluster/proxy error surfaced as 503, signaling retry elsewhere.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        (600..700).contains(&self.error_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_fm_err_prefix() {
        let err = ForesightError::OrderNotFound(OrderId::new());
        assert!(format!("{err}").starts_with("FM_ERR_200"));

        let err = ForesightError::InvalidPrice {
            price: Price(1_000_001),
            min: Price(1),
            max: Price(999_999),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("FM_ERR_107"), "got: {msg}");
        assert!(msg.contains("1.000001"));
    }

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(
            ForesightError::InvalidTickSize {
                price: Price(3),
                tick: 2
            }
            .wire_code(),
            "INVALID_TICK_SIZE"
        );
        assert_eq!(
            ForesightError::OrderExpired { expiry: 1, now: 2 }.wire_code(),
            "ORDER_EXPIRED"
        );
        assert_eq!(
            ForesightError::DuplicateOrder { salt: "42".into() }.wire_code(),
            "DUPLICATE_ORDER"
        );
    }

    #[test]
    fn taxonomy_grouping() {
        assert!(ForesightError::InvalidSignature.is_validation());
        assert!(!ForesightError::InvalidSignature.is_unavailable());
        assert!(ForesightError::ProxyLoop.is_unavailable());
        assert!(
            ForesightError::CircuitOpen {
                path: "/v1/orders".into()
            }
            .is_unavailable()
        );
        assert!(!ForesightError::Internal("x".into()).is_validation());
    }

    #[test]
    fn codes_match_display_numbers() {
        let err = ForesightError::ProxyLoop;
        assert!(format!("{err}").contains(&format!("FM_ERR_{}", err.error_code())));
    }
}
