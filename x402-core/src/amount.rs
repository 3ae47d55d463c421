//! Token amounts and human-readable prices.
//!
//! [`TokenAmount`] is the on-wire integer amount in an asset's smallest unit.
//! [`MoneyAmount`] parses prices such as `"$0.01"` and converts them into a
//! [`TokenAmount`] for a token with a known number of decimals.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// An integer amount in an asset's smallest unit.
///
/// Serialized as a decimal string so 256-bit values survive JSON. Decoding also
/// accepts a bare JSON integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    /// Zero units.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Whether the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Converts to `u64`, failing when the amount does not fit.
    #[must_use]
    pub fn to_u64(&self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<TokenAmount> for U256 {
    fn from(value: TokenAmount) -> Self {
        value.0
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned for amounts that are not unsigned decimal integers.
#[derive(Debug, thiserror::Error)]
#[error("invalid token amount {0:?}: expected an unsigned decimal integer")]
pub struct TokenAmountParseError(String);

impl FromStr for TokenAmount {
    type Err = TokenAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenAmountParseError(s.into()));
        }
        U256::from_str_radix(s, 10)
            .map(Self)
            .map_err(|_| TokenAmountParseError(s.into()))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = TokenAmount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an unsigned integer or decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(TokenAmount::from(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// A parsed, non-negative price with decimal precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoneyAmount(Decimal);

/// Errors that can occur when parsing or converting a price.
#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountError {
    /// The input string could not be parsed as a number.
    #[error("Invalid number format")]
    InvalidFormat,
    /// Negative values are not allowed.
    #[error("Negative value is not allowed")]
    Negative,
    /// The input has more decimal places than the token supports.
    #[error("Too big of a precision: {money} vs {token} on token")]
    WrongPrecision {
        /// Decimal places in the input.
        money: u32,
        /// Decimal places supported by the token.
        token: u32,
    },
    /// The converted amount does not fit in 256 bits.
    #[error("Amount overflows token units")]
    Overflow,
}

impl MoneyAmount {
    /// Parses a price, ignoring currency symbols, thousand separators and whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyAmountError`] if the cleaned input is not a non-negative number.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountError> {
        let cleaned: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();
        let parsed = Decimal::from_str(&cleaned).map_err(|_| MoneyAmountError::InvalidFormat)?;
        if parsed.is_sign_negative() && !parsed.is_zero() {
            return Err(MoneyAmountError::Negative);
        }
        Ok(Self(parsed.normalize()))
    }

    /// Number of decimal places after normalization.
    #[must_use]
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// Converts to the smallest unit of a token with `decimals` places.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyAmountError::WrongPrecision`] if the price is more precise
    /// than the token, or [`MoneyAmountError::Overflow`] if it does not fit.
    pub fn to_token_amount(&self, decimals: u32) -> Result<TokenAmount, MoneyAmountError> {
        let scale = self.scale();
        if scale > decimals {
            return Err(MoneyAmountError::WrongPrecision {
                money: scale,
                token: decimals,
            });
        }
        let mantissa = U256::from(self.0.mantissa().unsigned_abs());
        let factor = U256::from(10u8)
            .checked_pow(U256::from(decimals - scale))
            .ok_or(MoneyAmountError::Overflow)?;
        mantissa
            .checked_mul(factor)
            .map(TokenAmount)
            .ok_or(MoneyAmountError::Overflow)
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_amount_wire_form() {
        let amount = TokenAmount::from(1000);
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"1000\"");
        let parsed: TokenAmount = serde_json::from_str("\"1000\"").unwrap();
        assert_eq!(parsed, amount);
        let from_number: TokenAmount = serde_json::from_str("1000").unwrap();
        assert_eq!(from_number, amount);
    }

    #[test]
    fn test_token_amount_rejects_non_integers() {
        assert!(serde_json::from_str::<TokenAmount>("\"1.5\"").is_err());
        assert!(serde_json::from_str::<TokenAmount>("\"-1\"").is_err());
        assert!(serde_json::from_str::<TokenAmount>("\"0x10\"").is_err());
        assert!(serde_json::from_str::<TokenAmount>("\"\"").is_err());
        assert!(serde_json::from_str::<TokenAmount>("1.5").is_err());
    }

    #[test]
    fn test_token_amount_full_width() {
        let max = U256::MAX.to_string();
        let parsed: TokenAmount = max.parse().unwrap();
        assert_eq!(parsed.0, U256::MAX);
        assert_eq!(parsed.to_u64(), None);
    }

    #[test]
    fn test_money_amount_to_token_units() {
        let price = MoneyAmount::parse("$0.01").unwrap();
        assert_eq!(price.to_token_amount(6).unwrap(), TokenAmount::from(10_000));

        let price = MoneyAmount::parse("1,000.50").unwrap();
        assert_eq!(
            price.to_token_amount(6).unwrap(),
            TokenAmount::from(1_000_500_000)
        );
    }

    #[test]
    fn test_money_amount_precision_and_sign() {
        let too_precise = MoneyAmount::parse("0.0000001").unwrap();
        assert!(matches!(
            too_precise.to_token_amount(6),
            Err(MoneyAmountError::WrongPrecision { money: 7, token: 6 })
        ));
        assert!(matches!(
            MoneyAmount::parse("-5"),
            Err(MoneyAmountError::Negative)
        ));
        assert!(matches!(
            MoneyAmount::parse("abc"),
            Err(MoneyAmountError::InvalidFormat)
        ));
    }
}
