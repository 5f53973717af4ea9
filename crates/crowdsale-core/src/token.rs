//! In-memory allowance-based token ledger.
//!
//! The sale never holds tokens itself: a holder approves the sale operator
//! for an allowance and each purchase spends from it.

use std::collections::HashMap;

use crate::collaborators::TokenLedger;
use crate::error::TransferError;
use crate::types::Address;
use crate::units::TokenAmount;

/// Balances plus holder → operator allowances for a single operator.
#[derive(Debug, Clone)]
pub struct AllowanceLedger {
    operator: Address,
    total_supply: TokenAmount,
    balances: HashMap<Address, TokenAmount>,
    allowances: HashMap<Address, TokenAmount>,
}

impl AllowanceLedger {
    /// Creates an empty ledger whose transfers are made by `operator`.
    pub fn new(operator: Address) -> Self {
        AllowanceLedger {
            operator,
            total_supply: TokenAmount::ZERO,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    /// Issues new tokens to `to`.
    pub fn mint(&mut self, to: Address, amount: TokenAmount) -> Result<(), TransferError> {
        if to.is_zero() {
            return Err(TransferError::InvalidRecipient);
        }
        let total = self.total_supply.checked_add(amount)?;
        let balance = self.balance_of(&to).checked_add(amount)?;

        self.total_supply = total;
        self.balances.insert(to, balance);
        Ok(())
    }

    /// Sets how much the operator may move out of `holder`'s balance.
    pub fn approve(&mut self, holder: Address, amount: TokenAmount) {
        self.allowances.insert(holder, amount);
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn balance_of(&self, who: &Address) -> TokenAmount {
        self.balances.get(who).copied().unwrap_or_default()
    }

    pub fn allowance(&self, holder: &Address) -> TokenAmount {
        self.allowances.get(holder).copied().unwrap_or_default()
    }

    /// Tokens the operator can still deliver from `holder`.
    pub fn remaining_tokens(&self, holder: &Address) -> TokenAmount {
        self.balance_of(holder).min(self.allowance(holder))
    }
}

impl TokenLedger for AllowanceLedger {
    fn total_supply(&self) -> TokenAmount {
        self.total_supply
    }

    fn transfer_from(
        &mut self,
        holder: &Address,
        beneficiary: &Address,
        amount: TokenAmount,
    ) -> Result<(), TransferError> {
        if beneficiary.is_zero() {
            return Err(TransferError::InvalidRecipient);
        }

        let allowance = self.allowance(holder);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                available: allowance,
                requested: amount,
            });
        }

        let holder_balance = self.balance_of(holder);
        if holder_balance < amount {
            return Err(TransferError::InsufficientBalance {
                holder: *holder,
                available: holder_balance,
                requested: amount,
            });
        }

        // Self-transfers only spend allowance
        if holder != beneficiary {
            let credited = self.balance_of(beneficiary).checked_add(amount)?;
            self.balances.insert(*holder, holder_balance.checked_sub(amount)?);
            self.balances.insert(*beneficiary, credited);
        }
        self.allowances
            .insert(*holder, allowance.checked_sub(amount)?);
        Ok(())
    }
}
