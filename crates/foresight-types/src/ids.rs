//! Identifiers used throughout the Foresight trading backend.
//!
//! Entity IDs use UUIDv7 for time-ordered lexicographic sorting. Makers and
//! contracts are EVM addresses (`ethers::types::Address`).

use std::fmt;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Globally unique order identifier. Uses UUIDv7 for time-ordered sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Extract the embedded timestamp (milliseconds since UNIX epoch) from UUIDv7.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        let bytes = self.0.as_bytes();
        u64::from_be_bytes([
            0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5],
        ])
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MatchId
// ---------------------------------------------------------------------------

/// Globally unique match identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MatchId(pub Uuid);

impl MatchId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ClientId
// ---------------------------------------------------------------------------

/// Identifier assigned to a connected WebSocket client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MarketKey / BookKey
// ---------------------------------------------------------------------------

/// Opaque key identifying one prediction market (e.g. a condition ID or slug).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MarketKey(pub String);

impl MarketKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MarketKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One order book exists per (market, outcome index).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BookKey {
    pub market: MarketKey,
    pub outcome_index: u32,
}

impl BookKey {
    #[must_use]
    pub fn new(market: MarketKey, outcome_index: u32) -> Self {
        Self {
            market,
            outcome_index,
        }
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.market, self.outcome_index)
    }
}

// ---------------------------------------------------------------------------
// SaltKey
// ---------------------------------------------------------------------------

/// Replay-guard key for a signed order: one salt per
/// (chain, verifying contract, maker) may ever be live or filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaltKey {
    pub chain_id: u64,
    pub verifying_contract: Address,
    pub maker: Address,
    pub salt: U256,
}

impl SaltKey {
    #[must_use]
    pub fn new(chain_id: u64, verifying_contract: Address, maker: Address, salt: U256) -> Self {
        Self {
            chain_id,
            verifying_contract,
            maker,
            salt,
        }
    }
}

impl fmt::Display for SaltKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:#x}:{:#x}:{}",
            self.chain_id, self.verifying_contract, self.maker, self.salt
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_uniqueness() {
        let a = OrderId::new();
        let b = OrderId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn order_id_ordering() {
        let a = OrderId::new();
        let b = OrderId::new();
        assert!(a < b);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn order_id_timestamp_extraction() {
        let before = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let id = OrderId::new();
        let after = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let ts = id.timestamp_ms();
        assert!(
            ts >= before && ts <= after,
            "ts={ts}, before={before}, after={after}"
        );
    }

    #[test]
    fn book_key_display() {
        let key = BookKey::new(MarketKey::from("eth-above-5k-dec"), 1);
        assert_eq!(format!("{key}"), "eth-above-5k-dec:1");
    }

    #[test]
    fn salt_key_equality_is_field_wise() {
        let maker = Address::repeat_byte(0xaa);
        let contract = Address::repeat_byte(0xbb);
        let a = SaltKey::new(137, contract, maker, U256::from(42));
        let b = SaltKey::new(137, contract, maker, U256::from(42));
        assert_eq!(a, b);
        let c = SaltKey::new(137, contract, maker, U256::from(43));
        assert_ne!(a, c);
    }

    #[test]
    fn serde_roundtrips() {
        let oid = OrderId::new();
        let json = serde_json::to_string(&oid).unwrap();
        let back: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(oid, back);

        let key = BookKey::new(MarketKey::from("btc-halving-2028"), 0);
        let json = serde_json::to_string(&key).unwrap();
        let back: BookKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }
}
