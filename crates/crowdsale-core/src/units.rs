//! # Units Module
//!
//! Integer amount types for the sale: token base units, payment base units
//! and the price rate that converts between them.
//!
//! ## Why Integer Units?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  FIXED-POINT TOKENS                                                     │
//! │                                                                         │
//! │  A token with 18 decimals stores 1 whole token as 10^18 base units.     │
//! │  350M whole tokens = 3.5 × 10^26 base units → needs u128.               │
//! │                                                                         │
//! │  Every conversion is integer division that truncates:                   │
//! │    tokens = payment / rate      (remainder stays with the payment)      │
//! │    cost   = tokens  × rate      (exact, checked for overflow)           │
//! │                                                                         │
//! │  No floating point anywhere. Overflow is an error, never a wrap.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use crowdsale_core::units::{FundsAmount, Rate, TokenAmount};
//!
//! let rate = Rate::new(10);
//! let tokens = rate.tokens_for(FundsAmount::new(25)).unwrap();
//! assert_eq!(tokens, TokenAmount::new(2));
//! assert_eq!(rate.cost_of(tokens).unwrap(), FundsAmount::new(20));
//! ```

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ArithmeticError;

// =============================================================================
// Amount Types
// =============================================================================

/// Defines an unsigned amount newtype over `u128` with checked arithmetic and
/// decimal-string serialization (JSON and TOML integers cannot hold u128).
macro_rules! amount_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(u128);

        impl $name {
            /// Zero amount.
            pub const ZERO: Self = $name(0);

            /// Largest representable amount.
            pub const MAX: Self = $name(u128::MAX);

            /// Creates an amount from base units.
            #[inline]
            pub const fn new(units: u128) -> Self {
                $name(units)
            }

            /// Returns the amount in base units.
            #[inline]
            pub const fn get(&self) -> u128 {
                self.0
            }

            /// Checks if the amount is zero.
            #[inline]
            pub const fn is_zero(&self) -> bool {
                self.0 == 0
            }

            /// Adds two amounts, failing on overflow.
            pub fn checked_add(self, other: Self) -> Result<Self, ArithmeticError> {
                self.0
                    .checked_add(other.0)
                    .map($name)
                    .ok_or(ArithmeticError::Overflow {
                        operation: concat!($label, " addition"),
                    })
            }

            /// Subtracts `other`, failing if the result would be negative.
            pub fn checked_sub(self, other: Self) -> Result<Self, ArithmeticError> {
                self.0
                    .checked_sub(other.0)
                    .map($name)
                    .ok_or(ArithmeticError::Underflow {
                        operation: concat!($label, " subtraction"),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().replace('_', "").parse::<u128>().map($name)
            }
        }

        impl From<u128> for $name {
            fn from(units: u128) -> Self {
                $name(units)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(UnitsVisitor).map($name)
            }
        }
    };
}

amount_type!(
    /// An amount of sale tokens in base units (10^decimals per whole token).
    TokenAmount,
    "token"
);

amount_type!(
    /// An amount of the payment asset in its smallest unit.
    FundsAmount,
    "funds"
);

impl TokenAmount {
    /// Creates a token amount from whole tokens at the given decimal precision.
    ///
    /// ## Example
    /// ```rust
    /// use crowdsale_core::units::TokenAmount;
    ///
    /// let supply = TokenAmount::from_whole(300_000_000, 18).unwrap();
    /// assert_eq!(supply.get(), 300_000_000 * 10u128.pow(18));
    /// ```
    pub fn from_whole(whole: u128, decimals: u32) -> Result<Self, ArithmeticError> {
        whole
            .checked_mul(decimal_factor(decimals)?)
            .map(TokenAmount)
            .ok_or(ArithmeticError::Overflow {
                operation: "whole token scaling",
            })
    }
}

/// Returns `10^decimals`, the number of base units in one whole token.
pub fn decimal_factor(decimals: u32) -> Result<u128, ArithmeticError> {
    10u128.checked_pow(decimals).ok_or(ArithmeticError::Overflow {
        operation: "decimal factor",
    })
}

/// Accepts amounts written as decimal strings or as plain integers.
struct UnitsVisitor;

impl<'de> Visitor<'de> for UnitsVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
        v.trim()
            .replace('_', "")
            .parse::<u128>()
            .map_err(|e| E::custom(format!("invalid amount '{}': {}", v, e)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
        Ok(u128::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
        u128::try_from(v).map_err(|_| E::custom(format!("amount must not be negative: {}", v)))
    }
}

// =============================================================================
// Rate
// =============================================================================

/// Price of one token base unit, in payment base units.
///
/// ## Conversions
/// ```text
/// FundsAmount ──tokens_for()──► TokenAmount   (floor division)
/// TokenAmount ──cost_of()─────► FundsAmount   (checked multiplication)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rate(FundsAmount);

impl Rate {
    /// Creates a rate from payment units per token unit.
    #[inline]
    pub const fn new(units_per_token: u128) -> Self {
        Rate(FundsAmount::new(units_per_token))
    }

    /// Returns payment units per token unit.
    #[inline]
    pub const fn get(&self) -> u128 {
        self.0.get()
    }

    /// Checks if the rate is zero (not a usable price).
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Scales the rate by `numerator / denominator`, truncating.
    ///
    /// ## Example
    /// ```rust
    /// use crowdsale_core::units::Rate;
    ///
    /// // 13 × 10 / 13 = 10
    /// assert_eq!(Rate::new(13).scaled(10, 13).unwrap(), Rate::new(10));
    /// // 13 × 21 / 26 = 10.5 → 10
    /// assert_eq!(Rate::new(13).scaled(21, 26).unwrap(), Rate::new(10));
    /// ```
    pub fn scaled(self, numerator: u128, denominator: u128) -> Result<Rate, ArithmeticError> {
        if denominator == 0 {
            return Err(ArithmeticError::ZeroDenominator);
        }
        let product = self
            .get()
            .checked_mul(numerator)
            .ok_or(ArithmeticError::Overflow {
                operation: "rate scaling",
            })?;
        Ok(Rate::new(product / denominator))
    }

    /// Number of whole token units `funds` buys at this rate (floor).
    pub fn tokens_for(&self, funds: FundsAmount) -> Result<TokenAmount, ArithmeticError> {
        if self.is_zero() {
            return Err(ArithmeticError::ZeroRate);
        }
        Ok(TokenAmount::new(funds.get() / self.get()))
    }

    /// Exact cost of `tokens` at this rate.
    pub fn cost_of(&self, tokens: TokenAmount) -> Result<FundsAmount, ArithmeticError> {
        tokens
            .get()
            .checked_mul(self.get())
            .map(FundsAmount::new)
            .ok_or(ArithmeticError::Overflow {
                operation: "token cost",
            })
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/token", self.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_arithmetic() {
        let a = TokenAmount::new(10);
        let b = TokenAmount::new(4);

        assert_eq!(a.checked_add(b).unwrap(), TokenAmount::new(14));
        assert_eq!(a.checked_sub(b).unwrap(), TokenAmount::new(6));
        assert!(matches!(
            b.checked_sub(a),
            Err(ArithmeticError::Underflow { .. })
        ));
        assert!(matches!(
            TokenAmount::MAX.checked_add(TokenAmount::new(1)),
            Err(ArithmeticError::Overflow { .. })
        ));
    }

    #[test]
    fn test_from_whole() {
        let one = TokenAmount::from_whole(1, 18).unwrap();
        assert_eq!(one.get(), 1_000_000_000_000_000_000);
        assert!(TokenAmount::from_whole(u128::MAX, 18).is_err());
        assert!(decimal_factor(39).is_err());
    }

    #[test]
    fn test_rate_conversions_truncate() {
        let rate = Rate::new(10);
        assert_eq!(rate.tokens_for(FundsAmount::new(29)).unwrap().get(), 2);
        assert_eq!(rate.cost_of(TokenAmount::new(2)).unwrap().get(), 20);
        assert!(matches!(
            Rate::new(0).tokens_for(FundsAmount::new(1)),
            Err(ArithmeticError::ZeroRate)
        ));
    }

    #[test]
    fn test_rate_scaling() {
        assert_eq!(Rate::new(13).scaled(10, 13).unwrap().get(), 10);
        assert_eq!(Rate::new(13).scaled(1, 1).unwrap().get(), 13);
        assert!(matches!(
            Rate::new(13).scaled(1, 0),
            Err(ArithmeticError::ZeroDenominator)
        ));
        assert!(Rate::new(u128::MAX).scaled(2, 1).is_err());
    }

    #[test]
    fn test_serde_as_decimal_string() {
        let supply = TokenAmount::from_whole(300_000_000, 18).unwrap();
        let json = serde_json::to_string(&supply).unwrap();
        assert_eq!(json, "\"300000000000000000000000000\"");

        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, supply);

        // Plain integers are accepted too
        let small: FundsAmount = serde_json::from_str("42").unwrap();
        assert_eq!(small.get(), 42);
        assert!(serde_json::from_str::<FundsAmount>("-1").is_err());
    }

    #[test]
    fn test_parse_with_separators() {
        let amount: FundsAmount = "1_000_000".parse().unwrap();
        assert_eq!(amount.get(), 1_000_000);
    }
}
