//! # Sale Ledger
//!
//! Running totals of the sale: remaining supply, raised funds and the base
//! rate. Totals only move through [`SaleLedger::apply_purchase`].
//!
//! ```text
//!   remaining_supply + tokens_sold == initial_supply     (always)
//!   raised_total == Σ net payments accepted              (always)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, ValidationError};
use crate::units::{FundsAmount, Rate, TokenAmount};

/// Mutable sale totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLedger {
    rate: Rate,
    initial_supply: TokenAmount,
    remaining_supply: TokenAmount,
    raised_total: FundsAmount,
    goal: FundsAmount,
}

impl SaleLedger {
    /// Creates a ledger for a fresh sale.
    pub fn new(rate: Rate, initial_supply: TokenAmount, goal: FundsAmount) -> Self {
        SaleLedger {
            rate,
            initial_supply,
            remaining_supply: initial_supply,
            raised_total: FundsAmount::ZERO,
            goal,
        }
    }

    /// Rebuilds a ledger from persisted totals.
    pub fn from_parts(
        rate: Rate,
        initial_supply: TokenAmount,
        remaining_supply: TokenAmount,
        raised_total: FundsAmount,
        goal: FundsAmount,
    ) -> Result<Self, ValidationError> {
        if remaining_supply > initial_supply {
            return Err(ValidationError::InconsistentSnapshot {
                reason: format!(
                    "remaining supply {} exceeds initial supply {}",
                    remaining_supply, initial_supply
                ),
            });
        }
        Ok(SaleLedger {
            rate,
            initial_supply,
            remaining_supply,
            raised_total,
            goal,
        })
    }

    /// Debits supply and credits raised funds for one purchase.
    ///
    /// Leaves the ledger untouched on error.
    pub fn apply_purchase(
        &mut self,
        tokens: TokenAmount,
        net_payment: FundsAmount,
    ) -> Result<(), LedgerError> {
        if tokens > self.remaining_supply {
            return Err(LedgerError::InsufficientSupply {
                requested: tokens,
                remaining: self.remaining_supply,
            });
        }

        let remaining = self.remaining_supply.checked_sub(tokens)?;
        let raised = self.raised_total.checked_add(net_payment)?;

        self.remaining_supply = remaining;
        self.raised_total = raised;
        Ok(())
    }

    /// Checks if the funding goal has been met.
    pub fn goal_reached(&self) -> bool {
        self.raised_total >= self.goal
    }

    pub(crate) fn set_rate(&mut self, rate: Rate) {
        self.rate = rate;
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn initial_supply(&self) -> TokenAmount {
        self.initial_supply
    }

    pub fn remaining_supply(&self) -> TokenAmount {
        self.remaining_supply
    }

    pub fn raised_total(&self) -> FundsAmount {
        self.raised_total
    }

    pub fn goal(&self) -> FundsAmount {
        self.goal
    }

    /// Tokens allocated so far.
    pub fn tokens_sold(&self) -> TokenAmount {
        // remaining <= initial is upheld by every constructor and mutation
        TokenAmount::new(self.initial_supply.get() - self.remaining_supply.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> SaleLedger {
        SaleLedger::new(Rate::new(10), TokenAmount::new(100), FundsAmount::new(500))
    }

    #[test]
    fn test_apply_purchase_moves_totals() {
        let mut ledger = ledger();
        ledger
            .apply_purchase(TokenAmount::new(30), FundsAmount::new(300))
            .unwrap();
        ledger
            .apply_purchase(TokenAmount::new(20), FundsAmount::new(200))
            .unwrap();

        assert_eq!(ledger.remaining_supply(), TokenAmount::new(50));
        assert_eq!(ledger.tokens_sold(), TokenAmount::new(50));
        assert_eq!(ledger.raised_total(), FundsAmount::new(500));
        assert_eq!(
            ledger.remaining_supply().get() + ledger.tokens_sold().get(),
            ledger.initial_supply().get()
        );
    }

    #[test]
    fn test_insufficient_supply_leaves_ledger_unchanged() {
        let mut ledger = ledger();
        let before = ledger;

        let err = ledger
            .apply_purchase(TokenAmount::new(101), FundsAmount::new(1))
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientSupply { .. }));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_raised_overflow_leaves_ledger_unchanged() {
        let mut ledger = ledger();
        ledger
            .apply_purchase(TokenAmount::new(1), FundsAmount::MAX)
            .unwrap();
        let before = ledger;

        assert!(ledger
            .apply_purchase(TokenAmount::new(1), FundsAmount::new(1))
            .is_err());
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_goal_reached_is_inclusive() {
        let mut ledger = ledger();
        assert!(!ledger.goal_reached());
        ledger
            .apply_purchase(TokenAmount::new(50), FundsAmount::new(500))
            .unwrap();
        assert!(ledger.goal_reached());
    }

    #[test]
    fn test_from_parts_rejects_inconsistent_supply() {
        assert!(SaleLedger::from_parts(
            Rate::new(1),
            TokenAmount::new(10),
            TokenAmount::new(11),
            FundsAmount::ZERO,
            FundsAmount::ZERO,
        )
        .is_err());
    }
}
