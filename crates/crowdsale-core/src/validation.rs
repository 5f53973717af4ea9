//! # Validation Module
//!
//! Input checks run before any sale state is touched.
//!
//! ## Validation Order in `buy_tokens`
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate_beneficiary   zero address      → InvalidBeneficiary       │
//! │  2. validate_payment       zero amount       → ZeroPayment              │
//! │  3. state.ensure_open      outside window    → SaleNotOpen              │
//! │  4. allow-list lookup      not approved      → NotWhitelisted           │
//! │                                                                         │
//! │  Nothing is mutated until all four pass.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use crowdsale_core::types::Address;
//! use crowdsale_core::units::FundsAmount;
//! use crowdsale_core::validation::{validate_beneficiary, validate_payment};
//!
//! assert!(validate_beneficiary(&Address::repeat_byte(1)).is_ok());
//! assert!(validate_payment(FundsAmount::ZERO).is_err());
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::tier::TierTable;
use crate::types::Address;
use crate::units::{FundsAmount, Rate, TokenAmount};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Purchase Inputs
// =============================================================================

/// Rejects the null address as a token recipient.
pub fn validate_beneficiary(beneficiary: &Address) -> ValidationResult<()> {
    if beneficiary.is_zero() {
        return Err(ValidationError::InvalidBeneficiary);
    }
    Ok(())
}

/// Rejects empty payments.
pub fn validate_payment(payment: FundsAmount) -> ValidationResult<()> {
    if payment.is_zero() {
        return Err(ValidationError::ZeroPayment);
    }
    Ok(())
}

// =============================================================================
// Sale Parameters
// =============================================================================

/// Validates a base rate against a tier table.
///
/// ## Rules
/// - Must be positive
/// - Every tier must still price tokens above zero after its multiplier
pub fn validate_rate(rate: Rate, tiers: &TierTable) -> ValidationResult<()> {
    tiers.validate_rate(rate)
}

/// Validates the sale window (a zero-length window is allowed).
pub fn validate_window(opening: DateTime<Utc>, closing: DateTime<Utc>) -> ValidationResult<()> {
    if opening > closing {
        return Err(ValidationError::InvalidWindow);
    }
    Ok(())
}

/// Validates the sale supply against the tier table and the token's issuance.
///
/// ## Rules
/// - Must be positive
/// - Must lie below the top tier's upper bound
/// - Must not exceed the token's total supply
pub fn validate_supply(
    initial_supply: TokenAmount,
    token_total_supply: TokenAmount,
    tiers: &TierTable,
) -> ValidationResult<()> {
    if initial_supply.is_zero() {
        return Err(ValidationError::MustBePositive {
            field: "initial_supply".to_string(),
        });
    }
    if !tiers.covers(initial_supply) {
        return Err(ValidationError::SupplyNotCovered {
            supply: initial_supply,
        });
    }
    if initial_supply > token_total_supply {
        return Err(ValidationError::SupplyExceedsToken {
            supply: initial_supply,
            total: token_total_supply,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::Tier;

    #[test]
    fn test_validate_beneficiary() {
        assert!(validate_beneficiary(&Address::repeat_byte(7)).is_ok());
        assert!(matches!(
            validate_beneficiary(&Address::ZERO),
            Err(ValidationError::InvalidBeneficiary)
        ));
    }

    #[test]
    fn test_validate_payment() {
        assert!(validate_payment(FundsAmount::new(1)).is_ok());
        assert!(matches!(
            validate_payment(FundsAmount::ZERO),
            Err(ValidationError::ZeroPayment)
        ));
    }

    #[test]
    fn test_validate_supply() {
        let tiers = TierTable::new(vec![Tier::new(
            TokenAmount::ZERO,
            TokenAmount::new(1_000),
            1,
            1,
        )])
        .unwrap();
        let total = TokenAmount::new(500);

        assert!(validate_supply(TokenAmount::new(500), total, &tiers).is_ok());
        assert!(matches!(
            validate_supply(TokenAmount::ZERO, total, &tiers),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_supply(TokenAmount::new(1_000), TokenAmount::new(5_000), &tiers),
            Err(ValidationError::SupplyNotCovered { .. })
        ));
        assert!(matches!(
            validate_supply(TokenAmount::new(501), total, &tiers),
            Err(ValidationError::SupplyExceedsToken { .. })
        ));
    }

    #[test]
    fn test_validate_window() {
        let now = Utc::now();
        assert!(validate_window(now, now).is_ok());
        assert!(validate_window(now, now - chrono::Duration::seconds(1)).is_err());
    }
}
