//! # Collaborator Traits
//!
//! Capabilities the sale consumes but does not own.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Crowdsale<T, E, A, C>                            │
//! │                                                                         │
//! │   T: TokenLedger      transfer_from(holder → beneficiary)               │
//! │   E: Escrow           deposit / close / enable_refunds / refund         │
//! │   A: AllowListStore   is_whitelisted / add / remove                     │
//! │   C: Clock            now()                                             │
//! │                                                                         │
//! │   Arc<dyn SaleEventSink>   receives every committed SaleEvent           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! In-memory implementations: [`crate::token::AllowanceLedger`],
//! [`crate::vault::RefundVault`], [`crate::allowlist::InMemoryAllowList`],
//! [`SystemClock`] and [`ManualClock`].

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{EscrowError, TransferError};
use crate::types::{Address, SaleEvent};
use crate::units::{FundsAmount, TokenAmount};

// =============================================================================
// Traits
// =============================================================================

/// Token ledger the sale delivers tokens from.
pub trait TokenLedger: Send {
    /// Total tokens ever issued.
    fn total_supply(&self) -> TokenAmount;

    /// Moves `amount` from `holder` to `beneficiary` on behalf of the sale.
    fn transfer_from(
        &mut self,
        holder: &Address,
        beneficiary: &Address,
        amount: TokenAmount,
    ) -> Result<(), TransferError>;
}

/// Custody for raised funds until the outcome is known.
pub trait Escrow: Send {
    /// Records a deposit from `payer`.
    ///
    /// Called after the tokens were transferred. Implementations must not
    /// fail here once [`accepts_deposits`](Escrow::accepts_deposits) returned
    /// true; a failure leaves the tokens delivered and the sale uncommitted.
    fn deposit(&mut self, payer: &Address, amount: FundsAmount) -> Result<(), EscrowError>;

    /// Releases held funds to the beneficiary wallet. Returns the amount forwarded.
    fn close(&mut self) -> Result<FundsAmount, EscrowError>;

    /// Switches to refund mode.
    fn enable_refunds(&mut self) -> Result<(), EscrowError>;

    /// Pays `payer` back their deposits. Returns the amount refunded.
    fn refund(&mut self, payer: &Address) -> Result<FundsAmount, EscrowError>;

    /// Checks if a deposit would currently be accepted.
    fn accepts_deposits(&self) -> bool;
}

/// Approved beneficiary set.
pub trait AllowListStore: Send {
    fn is_whitelisted(&self, who: &Address) -> bool;

    /// Adds `who`. Returns false if already present.
    fn add(&mut self, who: Address) -> bool;

    /// Removes `who`. Returns false if absent.
    fn remove(&mut self, who: &Address) -> bool;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Receives sale events after each committed operation.
pub trait SaleEventSink: Send + Sync {
    fn on_event(&self, event: &SaleEvent);
}

// =============================================================================
// Clocks
// =============================================================================

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        ManualClock {
            now: Arc::new(RwLock::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Event Sinks
// =============================================================================

/// Discards events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl SaleEventSink for NoopEventSink {
    fn on_event(&self, _event: &SaleEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SaleEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out the events seen so far.
    pub fn events(&self) -> Vec<SaleEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl SaleEventSink for RecordingEventSink {
    fn on_event(&self, event: &SaleEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
