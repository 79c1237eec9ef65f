//! Economic and structural validation of inbound orders.
//!
//! [`validate_order`] is a pure check: rules run in a fixed sequence and
//! the first violated rule comes back as its stable wire error. Address
//! and salt fields arrive as strings so malformed input maps to a wire
//! code instead of a deserialization failure.

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, U256};
use foresight_types::{
    Amount, ForesightError, MarketKey, MarketParams, Order, OrderId, Result, SubmitRequest, Tif,
};

/// A submission that has passed every economic rule, with its string
/// fields parsed. Signature verification and salt replay come after.
#[derive(Debug, Clone)]
pub struct ValidatedSubmit {
    pub market: MarketKey,
    pub maker: Address,
    pub owner_eoa: Option<Address>,
    pub verifying_contract: Address,
    pub salt: U256,
    pub signature: Bytes,
    pub request: SubmitRequest,
}

impl ValidatedSubmit {
    /// Build the engine-side order. `sequence` is assigned by the engine
    /// under the market's writer guard, not here.
    #[must_use]
    pub fn into_order(self, now: DateTime<Utc>) -> Order {
        Order {
            id: OrderId::new(),
            market: self.market,
            outcome_index: self.request.outcome_index,
            maker: self.maker,
            side: self.request.side(),
            price: self.request.price,
            amount: self.request.amount,
            remaining: self.request.amount,
            status: foresight_types::OrderStatus::Pending,
            tif: self.request.tif(),
            post_only: self.request.post_only(),
            expiry: self.request.expiry,
            salt: self.salt,
            signature: self.signature,
            chain_id: self.request.chain_id,
            verifying_contract: self.verifying_contract,
            sequence: 0,
            created_at: now,
        }
    }
}

/// Run every rule in order and return the first violation.
pub fn validate_order(
    req: &SubmitRequest,
    params: &MarketParams,
    now_unix: u64,
) -> Result<ValidatedSubmit> {
    if req.market_key.trim().is_empty() {
        return Err(ForesightError::InvalidMarketKey);
    }
    if req.chain_id == 0 {
        return Err(ForesightError::InvalidChainId(req.chain_id));
    }
    let verifying_contract = parse_address(&req.verifying_contract)
        .ok_or_else(|| ForesightError::InvalidVerifyingContract(req.verifying_contract.clone()))?;
    let salt = parse_salt(&req.salt).ok_or_else(|| ForesightError::InvalidSalt(req.salt.clone()))?;
    let maker =
        parse_address(&req.maker).ok_or_else(|| ForesightError::InvalidMaker(req.maker.clone()))?;
    let owner_eoa = match &req.owner_eoa {
        None => None,
        Some(raw) => Some(
            parse_address(raw).ok_or_else(|| ForesightError::InvalidMaker(raw.clone()))?,
        ),
    };
    let signature = parse_signature(&req.signature).ok_or(ForesightError::InvalidSignature)?;

    if req.price < params.min_price || req.price > params.max_price {
        return Err(ForesightError::InvalidPrice {
            price: req.price,
            min: params.min_price,
            max: params.max_price,
        });
    }
    if params.tick_size == 0 || (req.price.0 - params.min_price.0) % params.tick_size != 0 {
        return Err(ForesightError::InvalidTickSize {
            price: req.price,
            tick: params.tick_size,
        });
    }
    if req.amount < params.min_order_amount || req.amount > params.max_order_amount {
        return Err(ForesightError::InvalidAmount {
            amount: req.amount,
            min: params.min_order_amount,
            max: params.max_order_amount,
        });
    }

    let tif = req.tif();
    if req.post_only() && !tif.allows_post_only() {
        return Err(ForesightError::InvalidPostOnly {
            tif: tif.to_string(),
        });
    }

    if tif == Tif::Gtd {
        if req.expiry == 0 {
            return Err(ForesightError::InvalidGtdExpiry {
                reason: "GTD requires a non-zero expiry".into(),
            });
        }
        if req.expiry <= now_unix {
            return Err(ForesightError::InvalidGtdExpiry {
                reason: format!("expiry {} already passed", req.expiry),
            });
        }
        if req.expiry > now_unix + params.max_gtd_horizon_secs {
            return Err(ForesightError::InvalidGtdExpiry {
                reason: format!(
                    "expiry {} beyond the {}s horizon",
                    req.expiry, params.max_gtd_horizon_secs
                ),
            });
        }
    } else if req.expiry != 0 && req.expiry <= now_unix {
        return Err(ForesightError::OrderExpired {
            expiry: req.expiry,
            now: now_unix,
        });
    }

    Ok(ValidatedSubmit {
        market: MarketKey::new(req.market_key.clone()),
        maker,
        owner_eoa,
        verifying_contract,
        salt,
        signature,
        request: req.clone(),
    })
}

fn parse_address(raw: &str) -> Option<Address> {
    raw.trim().parse().ok()
}

fn parse_salt(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if let Some(hexed) = raw.strip_prefix("0x") {
        U256::from_str_radix(hexed, 16).ok()
    } else {
        U256::from_dec_str(raw).ok()
    }
}

fn parse_signature(raw: &str) -> Option<Bytes> {
    let raw = raw.trim().strip_prefix("0x").unwrap_or(raw.trim());
    hex::decode(raw).ok().map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use foresight_types::{Amount, Price};

    use super::*;

    const E18: u128 = 1_000_000_000_000_000_000;
    const NOW: u64 = 1_700_000_000;

    fn request() -> SubmitRequest {
        SubmitRequest {
            market_key: "eth-above-5k-dec".into(),
            outcome_index: 0,
            maker: format!("{:#x}", Address::repeat_byte(0xaa)),
            owner_eoa: None,
            is_buy: true,
            price: Price(500_000),
            amount: Amount(4 * E18),
            salt: "12345".into(),
            expiry: 0,
            signature: "0xdeadbeef".into(),
            chain_id: 137,
            verifying_contract: format!("{:#x}", Address::repeat_byte(0x01)),
            tif: None,
            post_only: None,
            gasless: None,
        }
    }

    fn check(req: &SubmitRequest) -> Result<ValidatedSubmit> {
        validate_order(req, &MarketParams::default(), NOW)
    }

    #[test]
    fn valid_request_builds_pending_order() {
        let order = check(&request()).unwrap().into_order(Utc::now());
        assert_eq!(order.remaining, order.amount);
        assert_eq!(order.tif, Tif::Gtc);
        assert_eq!(order.maker, Address::repeat_byte(0xaa));
        assert_eq!(order.salt, U256::from(12_345u64));
    }

    #[test]
    fn first_violation_wins() {
        // Both market key and price are bad; the market key rule fires first.
        let mut req = request();
        req.market_key = "  ".into();
        req.price = Price(0);
        assert!(matches!(
            check(&req).unwrap_err(),
            ForesightError::InvalidMarketKey
        ));
    }

    #[test]
    fn price_range_and_tick() {
        let mut req = request();
        req.price = Price(1_000_000);
        assert_eq!(check(&req).unwrap_err().wire_code(), "INVALID_PRICE");

        let params = MarketParams {
            tick_size: 1_000,
            ..MarketParams::default()
        };
        let mut req = request();
        req.price = Price(500_500);
        let err = validate_order(&req, &params, NOW).unwrap_err();
        assert_eq!(err.wire_code(), "INVALID_TICK_SIZE");

        // Tick alignment is relative to min_price.
        req.price = Price(500_001);
        assert!(validate_order(&req, &params, NOW).is_ok());
    }

    #[test]
    fn amount_bounds() {
        let mut req = request();
        req.amount = Amount(1);
        assert_eq!(check(&req).unwrap_err().wire_code(), "INVALID_AMOUNT");
    }

    #[test]
    fn bad_addresses_and_salt() {
        let mut req = request();
        req.maker = "not-an-address".into();
        assert_eq!(check(&req).unwrap_err().wire_code(), "INVALID_MAKER");

        let mut req = request();
        req.verifying_contract = "0x123".into();
        assert_eq!(
            check(&req).unwrap_err().wire_code(),
            "INVALID_VERIFYING_CONTRACT"
        );

        let mut req = request();
        req.salt = "-5".into();
        assert_eq!(check(&req).unwrap_err().wire_code(), "INVALID_SALT");

        let mut req = request();
        req.salt = "0xff".into();
        assert_eq!(check(&req).unwrap().salt, U256::from(255u64));
    }

    #[test]
    fn zero_chain_id_rejected() {
        let mut req = request();
        req.chain_id = 0;
        assert_eq!(check(&req).unwrap_err().wire_code(), "INVALID_CHAIN_ID");
    }

    #[test]
    fn post_only_incompatible_with_immediate_tifs() {
        for tif in [Tif::Ioc, Tif::Fok, Tif::Fak] {
            let mut req = request();
            req.tif = Some(tif);
            req.post_only = Some(true);
            assert_eq!(check(&req).unwrap_err().wire_code(), "INVALID_POST_ONLY");
        }
        let mut req = request();
        req.tif = Some(Tif::Gtc);
        req.post_only = Some(true);
        assert!(check(&req).is_ok());
    }

    #[test]
    fn gtd_expiry_rules() {
        let mut req = request();
        req.tif = Some(Tif::Gtd);
        req.expiry = 0;
        assert_eq!(check(&req).unwrap_err().wire_code(), "INVALID_GTD_EXPIRY");

        req.expiry = NOW - 1;
        assert_eq!(check(&req).unwrap_err().wire_code(), "INVALID_GTD_EXPIRY");

        req.expiry = NOW + 100 * 365 * 24 * 3600;
        assert_eq!(check(&req).unwrap_err().wire_code(), "INVALID_GTD_EXPIRY");

        req.expiry = NOW + 3600;
        assert!(check(&req).is_ok());
    }

    #[test]
    fn non_gtd_past_expiry_is_order_expired() {
        let mut req = request();
        req.expiry = NOW - 1;
        assert_eq!(check(&req).unwrap_err().wire_code(), "ORDER_EXPIRED");
    }
}
