//! Token amounts and USD conversion.
//!
//! Ledgers move integer amounts of a token's smallest unit ("base units").
//! Callers may instead ask for a USD amount, which is converted with the
//! token's current [`PriceQuote`] as
//! `floor(usd / price * 10^decimals)`. The conversion runs entirely in
//! [`Decimal`] arithmetic; floats are only accepted at the input boundary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IcpayError;
use crate::principal::Principal;

/// An integer amount in a token's base units.
///
/// Serialized as a decimal string so the value survives JSON parsers that
/// cannot represent large integers. Deserialization accepts either a string
/// or a JSON integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw base-unit value.
    #[must_use]
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Returns the raw base-unit value.
    #[must_use]
    pub const fn get(self) -> u128 {
        self.0
    }

    /// Formats this amount as a whole-token decimal using `decimals`.
    ///
    /// Returns `None` if the amount or scale is beyond what [`Decimal`] can hold.
    #[must_use]
    pub fn to_token_units(self, decimals: u8) -> Option<Decimal> {
        let mantissa = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(mantissa, u32::from(decimals))
            .ok()
            .map(|d| d.normalize())
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<TokenAmount> for u128 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl FromStr for TokenAmount {
    type Err = IcpayError;

    /// Parses a non-negative integer. Signs, decimal points, exponents and
    /// surrounding whitespace are all rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IcpayError::InvalidAmount {
                value: s.to_owned(),
            });
        }
        s.parse::<u128>()
            .map(Self)
            .map_err(|_| IcpayError::InvalidAmount {
                value: s.to_owned(),
            })
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(value) => Ok(Self(u128::from(value))),
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// The amount a caller asks to pay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentAmount {
    /// An integer amount already expressed in base units.
    BaseUnits(TokenAmount),
    /// A USD amount to be converted at the current token price.
    Usd(f64),
}

impl From<TokenAmount> for PaymentAmount {
    fn from(value: TokenAmount) -> Self {
        Self::BaseUnits(value)
    }
}

/// A token's latest USD price as recorded by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// Ledger the price applies to.
    pub ledger_id: Principal,
    /// USD price of one whole token, if one has been recorded.
    #[serde(default)]
    pub price: Option<f64>,
    /// Number of decimal places of the token's base unit.
    pub decimals: u8,
    /// When the price was recorded upstream.
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Audit trail of a USD to base-unit conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsdConversion {
    /// The USD amount that was requested.
    pub usd_amount: Decimal,
    /// The converted amount in whole tokens.
    pub token_amount: Decimal,
    /// The price used for conversion.
    pub price: Decimal,
    /// When that price was recorded.
    pub price_recorded_at: Option<DateTime<Utc>>,
}

/// The result of amount normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedAmount {
    /// Amount to transfer, in base units.
    pub amount: TokenAmount,
    /// Present when the amount was derived from a USD request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd: Option<UsdConversion>,
}

impl NormalizedAmount {
    /// Wraps a base-unit amount that needs no conversion.
    #[must_use]
    pub const fn base_units(amount: TokenAmount) -> Self {
        Self { amount, usd: None }
    }
}

/// Parses a finite float into a [`Decimal`] through its shortest round-trip text form.
///
/// Going through the text keeps `0.1` as exactly `0.1` instead of the nearest
/// binary fraction.
fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string()).ok()
}

fn pow10(decimals: u8) -> Option<Decimal> {
    (0..decimals).try_fold(Decimal::ONE, |acc, _| acc.checked_mul(Decimal::TEN))
}

/// Validates a USD amount: it must be finite and strictly positive.
///
/// # Errors
///
/// Returns [`IcpayError::InvalidUsdAmount`] otherwise.
pub fn validate_usd_amount(usd_amount: f64) -> Result<Decimal, IcpayError> {
    if !usd_amount.is_finite() {
        return Err(IcpayError::invalid_usd_amount("amount must be a finite number"));
    }
    if usd_amount <= 0.0 {
        return Err(IcpayError::invalid_usd_amount("amount must be greater than zero"));
    }
    decimal_from_f64(usd_amount)
        .ok_or_else(|| IcpayError::invalid_usd_amount("amount is out of range"))
}

/// Converts a USD amount into base units at the quoted price.
///
/// Computes `floor(usd_amount * 10^decimals / price)`.
///
/// # Errors
///
/// - [`IcpayError::InvalidUsdAmount`] if `usd_amount` is not finite, not
///   positive, or the result does not fit in base units.
/// - [`IcpayError::PriceNotAvailable`] if the quote has no price or a price
///   that is not strictly positive.
pub fn usd_to_base_units(usd_amount: f64, quote: &PriceQuote) -> Result<NormalizedAmount, IcpayError> {
    let usd = validate_usd_amount(usd_amount)?;
    let price = quote
        .price
        .filter(|p| p.is_finite() && *p > 0.0)
        .and_then(decimal_from_f64)
        .filter(|p| p.is_sign_positive() && !p.is_zero())
        .ok_or_else(|| IcpayError::PriceNotAvailable {
            ledger_id: quote.ledger_id.clone(),
        })?;

    let out_of_range = || IcpayError::invalid_usd_amount("converted amount is out of range");
    let factor = pow10(quote.decimals).ok_or_else(out_of_range)?;
    let base = usd
        .checked_mul(factor)
        .and_then(|scaled| scaled.checked_div(price))
        .ok_or_else(out_of_range)?
        .floor();
    let amount = base.to_u128().map(TokenAmount::new).ok_or_else(out_of_range)?;
    let token_amount = amount
        .to_token_units(quote.decimals)
        .ok_or_else(out_of_range)?;

    Ok(NormalizedAmount {
        amount,
        usd: Some(UsdConversion {
            usd_amount: usd.normalize(),
            token_amount,
            price: price.normalize(),
            price_recorded_at: quote.recorded_at,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(price: Option<f64>, decimals: u8) -> PriceQuote {
        PriceQuote {
            ledger_id: Principal::icp_ledger(),
            price,
            decimals,
            recorded_at: None,
        }
    }

    #[test]
    fn base_unit_strings_round_trip_unchanged() {
        for input in ["0", "1", "10000000", "340282366920938463463374607431768211455"] {
            let amount: TokenAmount = input.parse().unwrap();
            assert_eq!(amount.to_string(), input);
        }
    }

    #[test]
    fn base_unit_parsing_rejects_non_integers() {
        for input in ["", "-1", "1.5", "1e6", " 1", "+1", "abc"] {
            let err = input.parse::<TokenAmount>().unwrap_err();
            assert!(matches!(err, IcpayError::InvalidAmount { .. }), "{input}");
        }
    }

    #[test]
    fn token_amount_deserializes_from_string_or_integer() {
        let a: TokenAmount = serde_json::from_str("\"42\"").unwrap();
        let b: TokenAmount = serde_json::from_str("42").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"42\"");
        assert!(serde_json::from_str::<TokenAmount>("\"-42\"").is_err());
    }

    #[test]
    fn usd_conversion_floors_to_base_units() {
        // 100 USD at 4 USD/token with 8 decimals = 25 tokens.
        let normalized = usd_to_base_units(100.0, &quote(Some(4.0), 8)).unwrap();
        assert_eq!(normalized.amount, TokenAmount::new(2_500_000_000));
        let usd = normalized.usd.unwrap();
        assert_eq!(usd.token_amount, Decimal::from(25));

        // 1 USD at 3 USD/token with 8 decimals = 0.33333333 tokens, floored.
        let normalized = usd_to_base_units(1.0, &quote(Some(3.0), 8)).unwrap();
        assert_eq!(normalized.amount, TokenAmount::new(33_333_333));
    }

    #[test]
    fn usd_conversion_is_exact_for_decimal_inputs() {
        // 0.1 / 0.01 * 10^6 is exactly 10_000_000; binary floats would give 9_999_999.
        let normalized = usd_to_base_units(0.1, &quote(Some(0.01), 6)).unwrap();
        assert_eq!(normalized.amount, TokenAmount::new(10_000_000));

        let normalized = usd_to_base_units(0.3, &quote(Some(0.1), 18)).unwrap();
        assert_eq!(normalized.amount, TokenAmount::new(3_000_000_000_000_000_000));
    }

    #[test]
    fn missing_or_non_positive_price_is_unavailable() {
        for price in [None, Some(0.0), Some(-1.0), Some(f64::NAN)] {
            let err = usd_to_base_units(100.0, &quote(price, 8)).unwrap_err();
            assert!(matches!(err, IcpayError::PriceNotAvailable { .. }), "{price:?}");
        }
    }

    #[test]
    fn invalid_usd_amounts_are_rejected() {
        for usd in [0.0, -5.0, f64::INFINITY, f64::NAN] {
            let err = usd_to_base_units(usd, &quote(Some(1.0), 8)).unwrap_err();
            assert!(matches!(err, IcpayError::InvalidUsdAmount { .. }), "{usd}");
        }
    }

    #[test]
    fn to_token_units_scales_by_decimals() {
        let amount = TokenAmount::new(123_456_789);
        assert_eq!(amount.to_token_units(8).unwrap().to_string(), "1.23456789");
        assert_eq!(TokenAmount::new(100_000_000).to_token_units(8).unwrap().to_string(), "1");
    }
}
