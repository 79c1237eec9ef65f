//! Salt replay guard.
//!
//! One `(chain, verifying contract, maker, salt)` tuple may ever be live
//! or filled; canceled, rejected and expired salts free up for reuse.
//! The registry is the in-memory authority; on leader restart the store
//! mirror is consulted before admitting an unknown salt.

use dashmap::DashMap;
use foresight_types::{ForesightError, OrderId, OrderStatus, Result, SaltKey};

/// In-memory replay guard keyed by [`SaltKey`].
#[derive(Debug, Default)]
pub struct SaltRegistry {
    entries: DashMap<SaltKey, (OrderId, OrderStatus)>,
}

impl SaltRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a salt for a new order. Fails if the salt is pinned by a
    /// live or filled order.
    pub fn claim(&self, key: SaltKey, order_id: OrderId) -> Result<()> {
        match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let (_, status) = *slot.get();
                if status.blocks_salt_reuse() {
                    return Err(ForesightError::DuplicateOrder {
                        salt: key.salt.to_string(),
                    });
                }
                slot.insert((order_id, OrderStatus::Pending));
                Ok(())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert((order_id, OrderStatus::Pending));
                Ok(())
            }
        }
    }

    /// Record a status change for the order holding this salt.
    pub fn update(&self, key: &SaltKey, status: OrderStatus) {
        if let Some(mut slot) = self.entries.get_mut(key) {
            slot.1 = status;
        }
    }

    /// Whether this salt is currently pinned.
    #[must_use]
    pub fn is_taken(&self, key: &SaltKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|slot| slot.1.blocks_salt_reuse())
    }

    /// Seed an entry from the persistence mirror (leader restart path).
    pub fn seed(&self, key: SaltKey, order_id: OrderId, status: OrderStatus) {
        self.entries.insert(key, (order_id, status));
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::{Address, U256};

    use super::*;

    fn key(salt: u64) -> SaltKey {
        SaltKey::new(
            137,
            Address::repeat_byte(0x01),
            Address::repeat_byte(0xaa),
            U256::from(salt),
        )
    }

    #[test]
    fn live_salt_blocks_replay() {
        let reg = SaltRegistry::new();
        reg.claim(key(1), OrderId::new()).unwrap();
        let err = reg.claim(key(1), OrderId::new()).unwrap_err();
        assert_eq!(err.wire_code(), "DUPLICATE_ORDER");
        assert!(reg.is_taken(&key(1)));
    }

    #[test]
    fn filled_salt_stays_pinned() {
        let reg = SaltRegistry::new();
        reg.claim(key(1), OrderId::new()).unwrap();
        reg.update(&key(1), OrderStatus::Filled);
        assert!(reg.claim(key(1), OrderId::new()).is_err());
    }

    #[test]
    fn canceled_and_expired_salts_free_up() {
        let reg = SaltRegistry::new();
        for terminal in [
            OrderStatus::Canceled,
            OrderStatus::Expired,
            OrderStatus::Rejected,
        ] {
            reg.claim(key(2), OrderId::new()).unwrap();
            reg.update(&key(2), terminal);
            assert!(!reg.is_taken(&key(2)));
            // Reusable now; reset for the next round.
            reg.claim(key(2), OrderId::new()).unwrap();
            reg.update(&key(2), OrderStatus::Canceled);
        }
    }

    #[test]
    fn distinct_makers_do_not_collide() {
        let reg = SaltRegistry::new();
        reg.claim(key(1), OrderId::new()).unwrap();
        let other = SaltKey::new(
            137,
            Address::repeat_byte(0x01),
            Address::repeat_byte(0xbb),
            U256::from(1u64),
        );
        reg.claim(other, OrderId::new()).unwrap();
    }

    #[test]
    fn seed_restores_store_state() {
        let reg = SaltRegistry::new();
        reg.seed(key(9), OrderId::new(), OrderStatus::Filled);
        assert!(reg.is_taken(&key(9)));
    }
}
