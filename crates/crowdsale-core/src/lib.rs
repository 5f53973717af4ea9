//! # crowdsale-core: Pure Logic for a Tiered Crowdsale
//!
//! Converts payments into token allocations along a supply-dependent price
//! curve, enforces the sale window and allow-list, and decides between
//! releasing funds and refunding contributors once the sale ends.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Crowdsale Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                crowdsale-runtime (SaleService)                  │   │
//! │  │     config ──► tracing ──► mutex + checkpoint ──► persist       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ crowdsale-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   tier    │  │  ledger   │  │   state   │  │   sale    │  │   │
//! │  │   │ TierTable │  │  totals   │  │  phases   │  │ Crowdsale │  │   │
//! │  │   │ allocation│  │  supply   │  │ finalize  │  │ buy/refund│  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO WALL CLOCK • CHECKED INTEGER MATH   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                crowdsale-db (Persistence Layer)                 │   │
//! │  │           snapshot, purchase journal, refund journal            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`units`] - `TokenAmount`, `FundsAmount`, `Rate` (u128, checked)
//! - [`tier`] - Tier table and the allocation engine
//! - [`ledger`] - Remaining supply and raised totals
//! - [`state`] - Sale window and finalization
//! - [`sale`] - The `Crowdsale` aggregate
//! - [`collaborators`] - Token, escrow, allow-list, clock and event traits
//! - [`token`], [`vault`], [`allowlist`] - In-memory collaborators
//! - [`types`], [`error`], [`validation`]
//!
//! ## Example Usage
//!
//! ```rust
//! use crowdsale_core::tier::TierTable;
//! use crowdsale_core::units::{FundsAmount, Rate, TokenAmount};
//!
//! let table = TierTable::standard(18).unwrap();
//! let supply = TokenAmount::from_whole(300_000_001, 18).unwrap();
//!
//! // Top tier: 13 × 10 / 13 = 10 per token
//! let allocation = table
//!     .compute_allocation(FundsAmount::new(20), supply, Rate::new(13))
//!     .unwrap();
//! assert_eq!(allocation.tokens, TokenAmount::new(2));
//! assert!(allocation.unspent.is_zero());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allowlist;
pub mod collaborators;
pub mod error;
pub mod ledger;
pub mod sale;
pub mod state;
pub mod tier;
pub mod token;
pub mod types;
pub mod units;
pub mod validation;
pub mod vault;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use allowlist::InMemoryAllowList;
pub use collaborators::{
    AllowListStore, Clock, Escrow, ManualClock, NoopEventSink, RecordingEventSink, SaleEventSink,
    SystemClock, TokenLedger,
};
pub use error::{
    ArithmeticError, EscrowError, LedgerError, SaleError, SaleResult, StateError, TransferError,
    ValidationError,
};
pub use ledger::SaleLedger;
pub use sale::{Crowdsale, SaleParams, SaleSnapshot};
pub use state::SaleStateMachine;
pub use tier::{Allocation, Tier, TierFill, TierTable};
pub use token::AllowanceLedger;
pub use types::*;
pub use units::{FundsAmount, Rate, TokenAmount};
pub use vault::{RefundVault, VaultState};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Decimal precision of the sale token (10^18 base units per whole token).
pub const TOKEN_DECIMALS: u32 = 18;

/// The in-memory sale most hosts run.
pub type StandardCrowdsale<C> = Crowdsale<AllowanceLedger, RefundVault, InMemoryAllowList, C>;
