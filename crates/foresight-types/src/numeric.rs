//! Fixed-point arithmetic for prices, amounts, and USDC values.
//!
//! All book math runs on integers — never floating point:
//! - [`Price`]: USDC per outcome share, 6 decimal places (`500000` = 0.50).
//! - [`Amount`]: outcome tokens, 18 decimal places (`4e18` = 4 shares).
//! - [`Usdc`]: settlement-currency values, 6 decimal places.
//!
//! Notional and fee helpers live here so every component rounds the same way:
//! `notional = amount * price / 1e18` and fees round half-up on the bps cut.
//! [`rust_decimal::Decimal`] appears only as a display/JSON projection of
//! these integers; it is never an input to matching.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::constants::{AMOUNT_ONE, BPS_DENOMINATOR};

/// A limit price: USDC per outcome share, 6-decimal fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Price(pub u64);

/// An outcome-token quantity, 18-decimal fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Amount(pub u128);

/// A USDC value (notional, fee, reservation), 6-decimal fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Usdc(pub u128);

impl Price {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Exact decimal projection (6 dp), for display and wire payloads.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.0), 6)
    }
}

impl Amount {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u128 {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Decimal projection rounded down to 6 dp for display and wire payloads.
    ///
    /// The 1e12 truncation keeps any representable `Amount` inside
    /// `Decimal`'s 96-bit mantissa; raw 18-dp values stay in the fill path.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn to_decimal_display(self) -> Decimal {
        Decimal::from_i128_with_scale((self.0 / 1_000_000_000_000) as i128, 6)
    }
}

impl Usdc {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u128 {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Exact decimal projection (6 dp); `None` if the value exceeds
    /// `Decimal`'s mantissa (beyond any plausible USDC total).
    #[must_use]
    pub fn to_decimal(self) -> Option<Decimal> {
        i128::try_from(self.0)
            .ok()
            .filter(|v| *v <= 79_228_162_514_264_337_593_543_950_335)
            .map(|v| Decimal::from_i128_with_scale(v, 6))
    }
}

/// `notional = amount * price / 1e18`, truncating. The result carries the
/// price's 6-decimal USDC scale. `None` on u128 overflow (rejected amounts
/// never reach here; the engine treats `None` as corruption).
#[must_use]
pub fn notional(amount: Amount, price: Price) -> Option<Usdc> {
    amount
        .0
        .checked_mul(u128::from(price.0))
        .map(|product| Usdc(product / AMOUNT_ONE))
}

/// Fee on a notional at `fee_bps` basis points, rounded half-up.
#[must_use]
pub fn fee_half_up(value: Usdc, fee_bps: u32) -> Option<Usdc> {
    value
        .0
        .checked_mul(u128::from(fee_bps))
        .and_then(|product| product.checked_add(BPS_DENOMINATOR / 2))
        .map(|adjusted| Usdc(adjusted / BPS_DENOMINATOR))
}

// ---------------------------------------------------------------------------
// Display: fixed-point values render with their decimal point in place
// ---------------------------------------------------------------------------

fn fmt_fixed(f: &mut fmt::Formatter<'_>, raw: u128, decimals: u32) -> fmt::Result {
    let base = 10u128.pow(decimals);
    let whole = raw / base;
    let frac = raw % base;
    write!(f, "{whole}.{frac:0width$}", width = decimals as usize)
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_fixed(f, u128::from(self.0), 6)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_fixed(f, self.0, 18)
    }
}

impl fmt::Display for Usdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_fixed(f, self.0, 6)
    }
}

// ---------------------------------------------------------------------------
// Serde: raw integer as a JSON string (18-dp values overflow JS numbers);
// plain JSON integers are accepted on input for convenience.
// ---------------------------------------------------------------------------

macro_rules! impl_fixed_serde {
    ($name:ident, $inner:ty) => {
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct RawVisitor;

                impl de::Visitor<'_> for RawVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "a non-negative integer or integer string")
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        v.parse::<$inner>().map($name).map_err(|_| {
                            E::invalid_value(de::Unexpected::Str(v), &"an integer string")
                        })
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                        <$inner>::try_from(v).map($name).map_err(|_| {
                            E::invalid_value(de::Unexpected::Unsigned(v), &"a smaller integer")
                        })
                    }
                }

                deserializer.deserialize_any(RawVisitor)
            }
        }
    };
}

impl_fixed_serde!(Price, u64);
impl_fixed_serde!(Amount, u128);
impl_fixed_serde!(Usdc, u128);

#[cfg(test)]
mod tests {
    use super::*;

    const E18: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn notional_scales_down_by_1e18() {
        // 10 shares at 0.50 USDC = 5 USDC
        let value = notional(Amount(10 * E18), Price(500_000)).unwrap();
        assert_eq!(value, Usdc(5_000_000));
    }

    #[test]
    fn notional_truncates_sub_unit_dust() {
        // 1 wei of amount at any sub-1.0 price truncates to zero USDC units
        let value = notional(Amount(1), Price(999_999)).unwrap();
        assert_eq!(value, Usdc::ZERO);
    }

    #[test]
    fn fee_rounds_half_up() {
        // 1.000000 USDC at 25 bps = 0.0025 -> 2500 raw, exact
        assert_eq!(fee_half_up(Usdc(1_000_000), 25).unwrap(), Usdc(2_500));
        // 999 raw at 25 bps = 24975/10000 = 2.4975 -> rounds to 2
        assert_eq!(fee_half_up(Usdc(999), 25).unwrap(), Usdc(2));
        // 1000 raw at 25 bps = 25000/10000 = 2.5 -> rounds to 3
        assert_eq!(fee_half_up(Usdc(1_000), 25).unwrap(), Usdc(3));
    }

    #[test]
    fn fee_zero_bps_is_zero() {
        assert_eq!(fee_half_up(Usdc(123_456_789), 0).unwrap(), Usdc::ZERO);
    }

    #[test]
    fn notional_overflow_is_none() {
        assert!(notional(Amount(u128::MAX), Price(2)).is_none());
    }

    #[test]
    fn display_places_decimal_point() {
        assert_eq!(Price(500_000).to_string(), "0.500000");
        assert_eq!(Price(1).to_string(), "0.000001");
        assert_eq!(Amount(4 * E18).to_string(), "4.000000000000000000");
        assert_eq!(Usdc(5_000_000).to_string(), "5.000000");
    }

    #[test]
    fn decimal_projection_matches_display() {
        assert_eq!(Price(500_000).to_decimal().to_string(), "0.500000");
        assert_eq!(
            Amount(6 * E18).to_decimal_display().to_string(),
            "6.000000"
        );
        assert_eq!(Usdc(5_000_000).to_decimal().unwrap().to_string(), "5.000000");
    }

    #[test]
    fn serde_emits_strings_accepts_both() {
        let amount = Amount(4 * E18);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"4000000000000000000\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
        let from_int: Price = serde_json::from_str("500000").unwrap();
        assert_eq!(from_int, Price(500_000));
    }

    #[test]
    fn checked_sub_underflow_is_none() {
        assert!(Amount(1).checked_sub(Amount(2)).is_none());
        assert!(Usdc(1).checked_sub(Usdc(2)).is_none());
    }
}
