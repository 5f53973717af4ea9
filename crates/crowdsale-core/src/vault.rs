//! # Refund Vault
//!
//! Holds net payments until the sale is finalized.
//!
//! ```text
//!                 close()                 ┌────────┐
//!            ┌──────────────────────────► │ Closed │  balance → wallet
//!  ┌────────┐│                            └────────┘
//!  │ Active │┤
//!  └────────┘│  enable_refunds()          ┌───────────┐
//!     ▲      └──────────────────────────► │ Refunding │  refund(payer) once each
//!     │                                   └───────────┘
//!  deposit()
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::collaborators::Escrow;
use crate::error::EscrowError;
use crate::types::Address;
use crate::units::FundsAmount;

/// Vault lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultState {
    Active,
    Refunding,
    Closed,
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultState::Active => write!(f, "active"),
            VaultState::Refunding => write!(f, "refunding"),
            VaultState::Closed => write!(f, "closed"),
        }
    }
}

/// In-memory escrow with per-payer deposit tracking.
#[derive(Debug, Clone)]
pub struct RefundVault {
    wallet: Address,
    state: VaultState,
    deposits: HashMap<Address, FundsAmount>,
    balance: FundsAmount,
    forwarded: FundsAmount,
    refunded: FundsAmount,
}

impl RefundVault {
    /// Creates an active vault that releases funds to `wallet` on close.
    pub fn new(wallet: Address) -> Self {
        RefundVault {
            wallet,
            state: VaultState::Active,
            deposits: HashMap::new(),
            balance: FundsAmount::ZERO,
            forwarded: FundsAmount::ZERO,
            refunded: FundsAmount::ZERO,
        }
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    pub fn wallet(&self) -> Address {
        self.wallet
    }

    /// Funds currently held.
    pub fn balance(&self) -> FundsAmount {
        self.balance
    }

    /// Outstanding deposit of `payer`.
    pub fn deposited(&self, payer: &Address) -> FundsAmount {
        self.deposits.get(payer).copied().unwrap_or_default()
    }

    /// Total released to the wallet.
    pub fn forwarded(&self) -> FundsAmount {
        self.forwarded
    }

    /// Total paid back to contributors.
    pub fn refunded(&self) -> FundsAmount {
        self.refunded
    }

    fn require_active(&self) -> Result<(), EscrowError> {
        if self.state != VaultState::Active {
            return Err(EscrowError::NotActive { state: self.state });
        }
        Ok(())
    }
}

impl Escrow for RefundVault {
    fn deposit(&mut self, payer: &Address, amount: FundsAmount) -> Result<(), EscrowError> {
        self.require_active()?;
        let deposited = self.deposited(payer).checked_add(amount)?;
        let balance = self.balance.checked_add(amount)?;

        self.deposits.insert(*payer, deposited);
        self.balance = balance;
        Ok(())
    }

    fn close(&mut self) -> Result<FundsAmount, EscrowError> {
        self.require_active()?;
        let amount = self.balance;
        self.forwarded = self.forwarded.checked_add(amount)?;
        self.balance = FundsAmount::ZERO;
        self.state = VaultState::Closed;
        Ok(amount)
    }

    fn enable_refunds(&mut self) -> Result<(), EscrowError> {
        self.require_active()?;
        self.state = VaultState::Refunding;
        Ok(())
    }

    fn refund(&mut self, payer: &Address) -> Result<FundsAmount, EscrowError> {
        if self.state != VaultState::Refunding {
            return Err(EscrowError::NotRefunding { state: self.state });
        }

        let amount = self.deposited(payer);
        if amount.is_zero() {
            return Err(EscrowError::NothingToRefund { payer: *payer });
        }

        let balance = self.balance.checked_sub(amount)?;
        let refunded = self.refunded.checked_add(amount)?;

        self.deposits.insert(*payer, FundsAmount::ZERO);
        self.balance = balance;
        self.refunded = refunded;
        Ok(amount)
    }

    fn accepts_deposits(&self) -> bool {
        self.state == VaultState::Active
    }
}
