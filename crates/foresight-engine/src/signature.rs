//! EIP-712 typed-data signature verification with an ERC-1271 fallback.
//!
//! The digest is recomputed from the order fields under the
//! `Foresight Market` domain, the signer is recovered, and the signature
//! is accepted if it recovers to the declared owner EOA or the maker.
//! When ECDSA recovery does not match, the maker address is probed as a
//! smart-contract wallet via `isValidSignature(bytes32,bytes)`; the call
//! must return the `0x1626ba7e` magic value.

use ethers::abi::{self, Token};
use ethers::contract::Contract;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Bytes, RecoveryMessage, Signature, H256, U256};
use ethers::utils::keccak256;
use foresight_types::constants::{EIP712_DOMAIN_NAME, EIP712_DOMAIN_VERSION, ERC1271_MAGIC};
use foresight_types::{ForesightError, Order, Result};

/// `keccak256("EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)")`
const DOMAIN_TYPEHASH: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// The signed Order struct type.
const ORDER_TYPEHASH: &str = "Order(address maker,uint256 outcomeIndex,bool isBuy,uint256 price,\
                              uint256 amount,uint256 salt,uint256 expiry)";

/// EIP-712 digest of an order: `keccak256(0x1901 || domain || structHash)`.
#[must_use]
pub fn order_digest(order: &Order) -> H256 {
    let domain_separator = keccak256(abi::encode(&[
        Token::FixedBytes(keccak256(DOMAIN_TYPEHASH.as_bytes()).to_vec()),
        Token::FixedBytes(keccak256(EIP712_DOMAIN_NAME.as_bytes()).to_vec()),
        Token::FixedBytes(keccak256(EIP712_DOMAIN_VERSION.as_bytes()).to_vec()),
        Token::Uint(U256::from(order.chain_id)),
        Token::Address(order.verifying_contract),
    ]));
    let struct_hash = keccak256(abi::encode(&[
        Token::FixedBytes(keccak256(ORDER_TYPEHASH.as_bytes()).to_vec()),
        Token::Address(order.maker),
        Token::Uint(U256::from(order.outcome_index)),
        Token::Bool(order.side.is_buy()),
        Token::Uint(U256::from(order.price.raw())),
        Token::Uint(U256::from(order.amount.raw())),
        Token::Uint(order.salt),
        Token::Uint(U256::from(order.expiry)),
    ]));

    let mut envelope = Vec::with_capacity(2 + 32 + 32);
    envelope.extend_from_slice(&[0x19, 0x01]);
    envelope.extend_from_slice(&domain_separator);
    envelope.extend_from_slice(&struct_hash);
    H256(keccak256(&envelope))
}

/// Probes a maker contract's `isValidSignature` for the ERC-1271 path.
/// Abstracted so tests run without an RPC endpoint.
pub trait Erc1271Prober: Send + Sync {
    fn is_valid_signature(
        &self,
        wallet: Address,
        digest: H256,
        signature: &Bytes,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// No RPC configured: every contract-wallet probe fails closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProber;

impl Erc1271Prober for NoopProber {
    async fn is_valid_signature(&self, _: Address, _: H256, _: &Bytes) -> Result<bool> {
        Ok(false)
    }
}

/// Live prober backed by an `ethers` HTTP provider.
#[derive(Debug, Clone)]
pub struct RpcProber {
    provider: Provider<Http>,
}

impl RpcProber {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| ForesightError::Rpc {
            reason: format!("bad rpc url: {e}"),
        })?;
        Ok(Self { provider })
    }
}

impl Erc1271Prober for RpcProber {
    async fn is_valid_signature(
        &self,
        wallet: Address,
        digest: H256,
        signature: &Bytes,
    ) -> Result<bool> {
        // An EOA has no code; skip the call rather than surface a revert.
        let code = self
            .provider
            .get_code(wallet, None)
            .await
            .map_err(|e| ForesightError::Rpc {
                reason: e.to_string(),
            })?;
        if code.is_empty() {
            return Ok(false);
        }

        let erc1271 = abi::parse_abi(&[
            "function isValidSignature(bytes32 hash, bytes signature) view returns (bytes4)",
        ])
        .map_err(|e| ForesightError::Rpc {
            reason: format!("erc1271 abi: {e}"),
        })?;
        let contract = Contract::new(wallet, erc1271, std::sync::Arc::new(self.provider.clone()));
        let magic: [u8; 4] = contract
            .method("isValidSignature", (digest, signature.clone()))
            .map_err(|e| ForesightError::Rpc {
                reason: e.to_string(),
            })?
            .call()
            .await
            .map_err(|e| ForesightError::Rpc {
                reason: e.to_string(),
            })?;
        Ok(magic == ERC1271_MAGIC)
    }
}

/// Verify an order signature. `owner_eoa` is the session wallet a proxy
/// maker declared; either it or the maker itself may have signed.
pub async fn verify_order_signature<P: Erc1271Prober>(
    order: &Order,
    owner_eoa: Option<Address>,
    prober: &P,
) -> Result<()> {
    let digest = order_digest(order);

    if let Ok(sig) = Signature::try_from(order.signature.as_ref()) {
        if let Ok(recovered) = sig.recover(RecoveryMessage::Hash(digest)) {
            if recovered == order.maker || owner_eoa == Some(recovered) {
                return Ok(());
            }
        }
    }

    // Not a matching EOA signature; the maker may be a contract wallet.
    if prober
        .is_valid_signature(order.maker, digest, &order.signature)
        .await?
    {
        return Ok(());
    }
    Err(ForesightError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use ethers::signers::{LocalWallet, Signer};
    use foresight_types::{OrderSide, OrderStatus};

    use super::*;

    struct AlwaysYes;
    impl Erc1271Prober for AlwaysYes {
        async fn is_valid_signature(&self, _: Address, _: H256, _: &Bytes) -> Result<bool> {
            Ok(true)
        }
    }

    fn wallet() -> LocalWallet {
        // Deterministic test key.
        "0x0000000000000000000000000000000000000000000000000000000000000001"
            .parse()
            .unwrap()
    }

    fn signed_order(wallet: &LocalWallet) -> Order {
        let mut order = Order::dummy_limit(OrderSide::Buy, 500_000, 4_000);
        order.maker = wallet.address();
        order.status = OrderStatus::Pending;
        let digest = order_digest(&order);
        let sig = wallet.sign_hash(digest).unwrap();
        order.signature = Bytes::from(sig.to_vec());
        order
    }

    #[test]
    fn digest_is_deterministic_and_field_sensitive() {
        let order = Order::dummy_limit(OrderSide::Buy, 500_000, 4_000);
        let a = order_digest(&order);
        let b = order_digest(&order);
        assert_eq!(a, b);

        let mut tweaked = order.clone();
        tweaked.salt = order.salt + U256::one();
        assert_ne!(order_digest(&tweaked), a);

        let mut flipped = order;
        flipped.side = OrderSide::Sell;
        assert_ne!(order_digest(&flipped), a);
    }

    #[tokio::test]
    async fn maker_signature_verifies() {
        let w = wallet();
        let order = signed_order(&w);
        verify_order_signature(&order, None, &NoopProber).await.unwrap();
    }

    #[tokio::test]
    async fn owner_eoa_signature_verifies_for_proxy_maker() {
        let w = wallet();
        let mut order = signed_order(&w);
        // Maker is a proxy contract; the session EOA signed.
        order.maker = Address::repeat_byte(0x77);
        let digest = order_digest(&order);
        let sig = w.sign_hash(digest).unwrap();
        order.signature = Bytes::from(sig.to_vec());

        verify_order_signature(&order, Some(w.address()), &NoopProber)
            .await
            .unwrap();
        // Without the declared owner, recovery fails and the noop prober
        // fails closed.
        let err = verify_order_signature(&order, None, &NoopProber)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn erc1271_fallback_accepts_contract_wallets() {
        let w = wallet();
        let mut order = signed_order(&w);
        order.maker = Address::repeat_byte(0x77);
        verify_order_signature(&order, None, &AlwaysYes).await.unwrap();
    }

    #[tokio::test]
    async fn tampered_order_rejected() {
        let w = wallet();
        let mut order = signed_order(&w);
        order.price = foresight_types::Price(600_000);
        let err = verify_order_signature(&order, None, &NoopProber)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), "INVALID_SIGNATURE");
    }
}
