//! # Error Types
//!
//! Domain-specific error types for crowdsale-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  SaleError (what every public operation returns)                       │
//! │  ├── ValidationError  - bad input, closed window, not allow-listed     │
//! │  ├── StateError       - finalize / refund / authorization rules        │
//! │  ├── ArithmeticError  - overflow, underflow, zero rate (fatal)         │
//! │  ├── LedgerError      - supply accounting inconsistency (fatal)        │
//! │  ├── TransferError    - token ledger collaborator refused              │
//! │  └── EscrowError      - vault collaborator refused                     │
//! │                                                                         │
//! │  Every failure leaves the sale unchanged. Nothing is retried.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::{Address, SalePhase};
use crate::units::{FundsAmount, TokenAmount};
use crate::vault::VaultState;

// =============================================================================
// Sale Error
// =============================================================================

/// Errors returned by sale operations.
#[derive(Debug, Error)]
pub enum SaleError {
    /// Input or precondition rejected before any work was done.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The operation is not allowed in the current sale state.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Checked arithmetic failed. Indicates a tier table or invariant bug.
    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    /// Supply accounting would be violated.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Token delivery failed.
    #[error("Token transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// Fund custody operation failed.
    #[error("Escrow error: {0}")]
    Escrow(#[from] EscrowError),
}

impl SaleError {
    /// Returns true for errors that indicate a bug rather than a rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SaleError::Arithmetic(_) | SaleError::Ledger(_))
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Beneficiary is the zero address.
    #[error("Beneficiary must not be the zero address")]
    InvalidBeneficiary,

    /// Payment amount is zero.
    #[error("Payment amount must be greater than zero")]
    ZeroPayment,

    /// Beneficiary is not on the allow-list.
    #[error("Beneficiary {beneficiary} is not allow-listed")]
    NotWhitelisted { beneficiary: Address },

    /// Purchases are only accepted while the sale is open.
    #[error("Sale is not open (phase: {phase})")]
    SaleNotOpen { phase: SalePhase },

    /// Payment buys no tokens (sold out, or below the price of one unit).
    #[error("Payment of {payment} buys no tokens")]
    NothingToAllocate { payment: FundsAmount },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// A tier would price tokens at zero with the given base rate.
    #[error("Base rate {rate} yields a zero price in tier {tier}")]
    RateTooLow { rate: u128, tier: usize },

    /// Invalid format (e.g., malformed address).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Opening time is after closing time.
    #[error("Opening time must not be after closing time")]
    InvalidWindow,

    /// Tier table does not partition the supply range.
    #[error("Invalid tier table: {reason}")]
    InvalidTierTable { reason: String },

    /// Sale supply is outside the range covered by the tier table.
    #[error("Initial supply {supply} is not covered by the tier table")]
    SupplyNotCovered { supply: TokenAmount },

    /// Sale supply exceeds what the token ledger has issued.
    #[error("Initial supply {supply} exceeds token total supply {total}")]
    SupplyExceedsToken {
        supply: TokenAmount,
        total: TokenAmount,
    },

    /// Restored snapshot is internally inconsistent.
    #[error("Inconsistent snapshot: {reason}")]
    InconsistentSnapshot { reason: String },
}

// =============================================================================
// State Error
// =============================================================================

/// Finalization, refund and authorization rule violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// `finalize` was already called.
    #[error("Sale is already finalized")]
    AlreadyFinalized,

    /// `finalize` called before the closing time passed.
    #[error("Sale has not closed yet")]
    NotClosedYet,

    /// Refund claimed before finalization.
    #[error("Sale is not finalized")]
    NotFinalized,

    /// Refund claimed although the goal was reached.
    #[error("Goal was reached, refunds are not available")]
    GoalWasReached,

    /// Caller is not the sale owner.
    #[error("Caller {caller} is not authorized")]
    Unauthorized { caller: Address },
}

// =============================================================================
// Arithmetic Error
// =============================================================================

/// Checked arithmetic failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("Overflow in {operation}")]
    Overflow { operation: &'static str },

    #[error("Underflow in {operation}")]
    Underflow { operation: &'static str },

    /// Division by a zero price.
    #[error("Effective rate is zero")]
    ZeroRate,

    #[error("Tier multiplier denominator is zero")]
    ZeroDenominator,

    /// Remaining supply lies above the highest tier.
    #[error("Remaining supply {supply} is outside the tier table")]
    SupplyOutsideTiers { supply: TokenAmount },
}

// =============================================================================
// Ledger Error
// =============================================================================

/// Sale ledger consistency failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// More tokens requested than remain. Unreachable with a correct engine.
    #[error("Insufficient supply: requested {requested}, remaining {remaining}")]
    InsufficientSupply {
        requested: TokenAmount,
        remaining: TokenAmount,
    },

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Token ledger failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient allowance: available {available}, requested {requested}")]
    InsufficientAllowance {
        available: TokenAmount,
        requested: TokenAmount,
    },

    #[error("Insufficient balance for {holder}: available {available}, requested {requested}")]
    InsufficientBalance {
        holder: Address,
        available: TokenAmount,
        requested: TokenAmount,
    },

    #[error("Recipient must not be the zero address")]
    InvalidRecipient,

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

/// Escrow / refund vault failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// Operation requires the vault to be active.
    #[error("Vault is {state}, expected active")]
    NotActive { state: VaultState },

    /// Refunds require the vault to be refunding.
    #[error("Vault is {state}, refunds are not enabled")]
    NotRefunding { state: VaultState },

    /// Escrow refused a pre-flight deposit check.
    #[error("Escrow is not accepting deposits")]
    DepositsClosed,

    /// Payer has no deposit left to refund.
    #[error("Nothing to refund for {payer}")]
    NothingToRefund { payer: Address },

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with SaleError.
pub type SaleResult<T> = Result<T, SaleError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LedgerError::InsufficientSupply {
            requested: TokenAmount::new(7),
            remaining: TokenAmount::new(5),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient supply: requested 7, remaining 5"
        );

        let err = ValidationError::SaleNotOpen {
            phase: SalePhase::Closed,
        };
        assert_eq!(err.to_string(), "Sale is not open (phase: closed)");
    }

    #[test]
    fn test_conversions_into_sale_error() {
        let err: SaleError = ValidationError::ZeroPayment.into();
        assert!(matches!(err, SaleError::Validation(ValidationError::ZeroPayment)));
        assert!(!err.is_fatal());

        let err: SaleError = ArithmeticError::ZeroRate.into();
        assert!(err.is_fatal());

        let err: SaleError = StateError::AlreadyFinalized.into();
        assert_eq!(
            err.to_string(),
            "State error: Sale is already finalized"
        );
    }
}
