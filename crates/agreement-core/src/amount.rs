//! # Token Amounts
//!
//! Collateral and fee amounts are unsigned integers in the token's base
//! unit. [`Amount`] serializes as a decimal string so that values above
//! `u64::MAX` survive JSON and YAML untouched.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// A non-negative token amount in base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl Amount {
    /// Zero.
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw base-unit value.
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// The raw base-unit value.
    pub const fn get(&self) -> u128 {
        self.0
    }

    /// Whether the amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Result<Amount, CoreError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| CoreError::AmountOutOfRange(format!("{self} + {other}")))
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Result<Amount, CoreError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or_else(|| CoreError::AmountOutOfRange(format!("{self} - {other}")))
    }

    /// `self * numerator / denominator`, rounding down.
    pub fn proportion(self, numerator: u128, denominator: u128) -> Result<Amount, CoreError> {
        if denominator == 0 {
            return Err(CoreError::AmountOutOfRange(format!(
                "{self} * {numerator} / 0"
            )));
        }
        self.0
            .checked_mul(numerator)
            .map(|v| Amount(v / denominator))
            .ok_or_else(|| {
                CoreError::AmountOutOfRange(format!("{self} * {numerator} / {denominator}"))
            })
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidAmount(s.to_string()));
        }
        s.parse::<u128>()
            .map(Amount)
            .map_err(|_| CoreError::InvalidAmount(s.to_string()))
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(u128::from(v))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Int(u64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Int(v) => Ok(Amount::from(v)),
        }
    }
}

/// Identifier of the token a collateral requirement is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

impl TokenId {
    /// Construct a token identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyToken`] for an empty or whitespace string.
    pub fn new(symbol: impl Into<String>) -> Result<Self, CoreError> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(CoreError::EmptyToken);
        }
        Ok(Self(symbol))
    }

    /// Access the symbol.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TokenId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TokenId> for String {
    fn from(value: TokenId) -> Self {
        value.0
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn amount_serializes_as_string() {
        let a = Amount::new(u128::from(u64::MAX) + 1);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"18446744073709551616\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn amount_accepts_integer_literals() {
        let a: Amount = serde_json::from_str("250").unwrap();
        assert_eq!(a, Amount::new(250));
    }

    #[test]
    fn amount_rejects_negative_and_decimal_strings() {
        assert!("-1".parse::<Amount>().is_err());
        assert!("1.5".parse::<Amount>().is_err());
        assert!("".parse::<Amount>().is_err());
    }

    #[test]
    fn checked_sub_underflow_is_an_error() {
        assert!(Amount::new(1).checked_sub(Amount::new(2)).is_err());
        assert_eq!(
            Amount::new(5).checked_sub(Amount::new(2)).unwrap(),
            Amount::new(3)
        );
    }

    #[test]
    fn proportion_rounds_down() {
        assert_eq!(Amount::new(100).proportion(40, 100).unwrap(), Amount::new(40));
        assert_eq!(Amount::new(7).proportion(1, 2).unwrap(), Amount::new(3));
        assert!(Amount::new(7).proportion(1, 0).is_err());
    }

    #[test]
    fn token_rejects_empty() {
        assert!(TokenId::new("").is_err());
        assert!(TokenId::new("  ").is_err());
        assert_eq!(TokenId::new("ANT").unwrap().as_str(), "ANT");
        assert!(serde_json::from_str::<TokenId>("\"\"").is_err());
    }

    proptest! {
        #[test]
        fn proportion_never_exceeds_whole(raw in any::<u64>(), num in 0u128..=100) {
            let whole = Amount::from(raw);
            let part = whole.proportion(num, 100).unwrap();
            prop_assert!(part <= whole);
        }
    }
}
