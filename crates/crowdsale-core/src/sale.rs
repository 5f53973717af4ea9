//! # Crowdsale
//!
//! The sale aggregate and its single purchase entry point.
//!
//! ## Purchase Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  buy_tokens(payer, beneficiary, payment)                                │
//! │                                                                         │
//! │   1. validate beneficiary + payment          (no state touched)         │
//! │   2. phase must be Open, beneficiary listed  (no state touched)         │
//! │   3. TierTable::compute_allocation           (pure)                     │
//! │   4. net = payment − unspent                                            │
//! │   5. staged ledger copy ← apply_purchase                                │
//! │   6. token.transfer_from(holder → beneficiary)                          │
//! │   7. escrow.deposit(payer, net)                                         │
//! │   8. commit staged ledger, emit TokensPurchased                         │
//! │                                                                         │
//! │   Any failure before 8 returns with the ledger untouched.               │
//! │   `unspent` is reported as `refund_amount` for the host to pay back.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The escrow is asked whether it accepts deposits before the token transfer,
//! so a closed vault fails the purchase before any tokens move. Hosts that need
//! full rollback across collaborators clone the whole sale first (see the
//! runtime's `SaleService`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::collaborators::{AllowListStore, Clock, Escrow, NoopEventSink, SaleEventSink, TokenLedger};
use crate::error::{EscrowError, SaleResult, StateError, ValidationError};
use crate::ledger::SaleLedger;
use crate::state::SaleStateMachine;
use crate::tier::{Allocation, TierTable};
use crate::types::{Address, PurchaseRecord, RefundRecord, SaleEvent, SaleOutcome, SalePhase};
use crate::units::{FundsAmount, Rate, TokenAmount};
use crate::validation::{validate_beneficiary, validate_payment, validate_rate, validate_supply, validate_window};

// =============================================================================
// Parameters & Snapshot
// =============================================================================

/// Construction parameters of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleParams {
    /// Only address allowed to run admin operations.
    pub owner: Address,
    /// Account the tokens are delivered from.
    pub token_holder: Address,
    /// Base rate (payment units per token unit) before tier multipliers.
    pub rate: Rate,
    pub goal: FundsAmount,
    pub initial_supply: TokenAmount,
    pub opening_time: DateTime<Utc>,
    pub closing_time: DateTime<Utc>,
    pub tiers: TierTable,
}

/// Everything needed to rebuild the sale aggregate (collaborators excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSnapshot {
    pub owner: Address,
    pub token_holder: Address,
    pub tiers: TierTable,
    pub rate: Rate,
    pub initial_supply: TokenAmount,
    pub remaining_supply: TokenAmount,
    pub raised_total: FundsAmount,
    pub goal: FundsAmount,
    pub opening_time: DateTime<Utc>,
    pub closing_time: DateTime<Utc>,
    pub outcome: Option<SaleOutcome>,
}

// =============================================================================
// Crowdsale
// =============================================================================

/// A tiered crowdsale over pluggable collaborators.
#[derive(Clone)]
pub struct Crowdsale<T, E, A, C> {
    owner: Address,
    token_holder: Address,
    tiers: TierTable,
    ledger: SaleLedger,
    state: SaleStateMachine,
    token: T,
    escrow: E,
    allow_list: A,
    clock: C,
    events: Arc<dyn SaleEventSink>,
}

impl<T, E, A, C> Crowdsale<T, E, A, C>
where
    T: TokenLedger,
    E: Escrow,
    A: AllowListStore,
    C: Clock,
{
    /// Creates a new sale.
    ///
    /// ## Checks
    /// - Window: opening ≤ closing
    /// - Supply: positive, covered by the tier table, within the token's issuance
    /// - Rate: non-zero price in every tier
    pub fn new(params: SaleParams, token: T, escrow: E, allow_list: A, clock: C) -> SaleResult<Self> {
        validate_window(params.opening_time, params.closing_time)?;
        validate_supply(params.initial_supply, token.total_supply(), &params.tiers)?;
        validate_rate(params.rate, &params.tiers)?;

        let ledger = SaleLedger::new(params.rate, params.initial_supply, params.goal);
        let state = SaleStateMachine::new(params.opening_time, params.closing_time)?;

        info!(
            owner = %params.owner,
            supply = %params.initial_supply,
            rate = %params.rate,
            goal = %params.goal,
            "Crowdsale created"
        );

        Ok(Crowdsale {
            owner: params.owner,
            token_holder: params.token_holder,
            tiers: params.tiers,
            ledger,
            state,
            token,
            escrow,
            allow_list,
            clock,
            events: Arc::new(NoopEventSink),
        })
    }

    /// Rebuilds a sale from a snapshot and live collaborators.
    pub fn restore(snapshot: SaleSnapshot, token: T, escrow: E, allow_list: A, clock: C) -> SaleResult<Self> {
        if !snapshot.tiers.covers(snapshot.initial_supply) {
            return Err(ValidationError::SupplyNotCovered {
                supply: snapshot.initial_supply,
            }
            .into());
        }
        validate_rate(snapshot.rate, &snapshot.tiers)?;

        let ledger = SaleLedger::from_parts(
            snapshot.rate,
            snapshot.initial_supply,
            snapshot.remaining_supply,
            snapshot.raised_total,
            snapshot.goal,
        )?;
        let state =
            SaleStateMachine::from_parts(snapshot.opening_time, snapshot.closing_time, snapshot.outcome)?;

        debug!(
            remaining = %ledger.remaining_supply(),
            raised = %ledger.raised_total(),
            "Crowdsale restored from snapshot"
        );

        Ok(Crowdsale {
            owner: snapshot.owner,
            token_holder: snapshot.token_holder,
            tiers: snapshot.tiers,
            ledger,
            state,
            token,
            escrow,
            allow_list,
            clock,
            events: Arc::new(NoopEventSink),
        })
    }

    /// Routes events to `sink` instead of discarding them.
    pub fn with_event_sink(mut self, sink: Arc<dyn SaleEventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Captures the persisted fields of the sale.
    pub fn snapshot(&self) -> SaleSnapshot {
        SaleSnapshot {
            owner: self.owner,
            token_holder: self.token_holder,
            tiers: self.tiers.clone(),
            rate: self.ledger.rate(),
            initial_supply: self.ledger.initial_supply(),
            remaining_supply: self.ledger.remaining_supply(),
            raised_total: self.ledger.raised_total(),
            goal: self.ledger.goal(),
            opening_time: self.state.opening_time(),
            closing_time: self.state.closing_time(),
            outcome: self.state.outcome(),
        }
    }

    // =========================================================================
    // Purchase
    // =========================================================================

    /// Buys tokens for `beneficiary` with `payment` sent by `payer`.
    ///
    /// Tokens are transferred before the escrow deposit. The escrow is asked
    /// [`accepts_deposits`](Escrow::accepts_deposits) up front, but if
    /// `deposit` still fails the transfer is not reversed here: the ledger
    /// stays uncommitted and the caller must restore the token collaborator
    /// (`SaleService` in the runtime does this from a checkpoint).
    pub fn buy_tokens(
        &mut self,
        payer: &Address,
        beneficiary: &Address,
        payment: FundsAmount,
    ) -> SaleResult<PurchaseRecord> {
        validate_beneficiary(beneficiary)?;
        validate_payment(payment)?;

        let now = self.clock.now();
        self.state.ensure_open(now)?;
        if !self.allow_list.is_whitelisted(beneficiary) {
            return Err(ValidationError::NotWhitelisted {
                beneficiary: *beneficiary,
            }
            .into());
        }

        let allocation = self.quote(payment)?;
        if allocation.tokens.is_zero() {
            return Err(ValidationError::NothingToAllocate { payment }.into());
        }
        let net_payment = payment.checked_sub(allocation.unspent)?;

        let mut staged = self.ledger;
        staged.apply_purchase(allocation.tokens, net_payment)?;

        if !self.escrow.accepts_deposits() {
            return Err(EscrowError::DepositsClosed.into());
        }
        self.token
            .transfer_from(&self.token_holder, beneficiary, allocation.tokens)?;
        self.escrow.deposit(payer, net_payment)?;

        self.ledger = staged;

        info!(
            %payer,
            %beneficiary,
            tokens = %allocation.tokens,
            net = %net_payment,
            unspent = %allocation.unspent,
            remaining = %self.ledger.remaining_supply(),
            "Tokens purchased"
        );
        self.events.on_event(&SaleEvent::TokensPurchased {
            payer: *payer,
            beneficiary: *beneficiary,
            net_payment,
            tokens: allocation.tokens,
        });

        Ok(PurchaseRecord {
            id: Uuid::new_v4(),
            payer: *payer,
            beneficiary: *beneficiary,
            payment_amount: payment,
            net_payment,
            tokens_allocated: allocation.tokens,
            refund_amount: allocation.unspent,
            purchased_at: now,
        })
    }

    /// Prices `payment` against the current supply without changing anything.
    pub fn quote(&self, payment: FundsAmount) -> SaleResult<Allocation> {
        let allocation = self.tiers.compute_allocation(
            payment,
            self.ledger.remaining_supply(),
            self.ledger.rate(),
        )?;

        for fill in &allocation.fills {
            debug!(
                tier = fill.tier,
                rate = %fill.rate,
                tokens = %fill.tokens,
                cost = %fill.cost,
                clamped = fill.clamped,
                "Tier fill"
            );
        }
        Ok(allocation)
    }

    // =========================================================================
    // Finalization & Refunds
    // =========================================================================

    /// Ends the sale after closing time. Owner only, at most once.
    ///
    /// Closes the vault when the goal was reached, otherwise enables refunds.
    pub fn finalize(&mut self, caller: &Address) -> SaleResult<SaleOutcome> {
        self.require_owner(caller)?;

        let goal_reached = self.ledger.goal_reached();
        let mut staged = self.state;
        let outcome = staged.finalize(self.clock.now(), goal_reached)?;

        let vault_event = match outcome {
            SaleOutcome::Successful => SaleEvent::VaultClosed {
                forwarded: self.escrow.close()?,
            },
            SaleOutcome::Refunding => {
                self.escrow.enable_refunds()?;
                SaleEvent::RefundsEnabled
            }
        };

        self.state = staged;

        info!(
            %outcome,
            raised = %self.ledger.raised_total(),
            goal = %self.ledger.goal(),
            "Crowdsale finalized"
        );
        self.events.on_event(&SaleEvent::Finalized {
            outcome,
            raised_total: self.ledger.raised_total(),
        });
        self.events.on_event(&vault_event);

        Ok(outcome)
    }

    /// Returns `payer`'s deposits after a failed sale.
    pub fn claim_refund(&mut self, payer: &Address) -> SaleResult<RefundRecord> {
        self.state.ensure_refundable()?;
        let amount = self.escrow.refund(payer)?;

        info!(%payer, %amount, "Refund claimed");
        self.events.on_event(&SaleEvent::Refunded {
            payer: *payer,
            amount,
        });

        Ok(RefundRecord {
            payer: *payer,
            amount,
            refunded_at: self.clock.now(),
        })
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Changes the base rate. Owner only, before finalization.
    pub fn set_rate(&mut self, caller: &Address, rate: Rate) -> SaleResult<()> {
        self.require_owner(caller)?;
        if self.state.is_finalized() {
            return Err(StateError::AlreadyFinalized.into());
        }
        validate_rate(rate, &self.tiers)?;

        let old_rate = self.ledger.rate();
        self.ledger.set_rate(rate);

        info!(old = %old_rate, new = %rate, "Rate changed");
        self.events.on_event(&SaleEvent::RateChanged {
            old_rate,
            new_rate: rate,
        });
        Ok(())
    }

    /// Approves `who` as a beneficiary. Returns false if already listed.
    pub fn add_to_allow_list(&mut self, caller: &Address, who: Address) -> SaleResult<bool> {
        self.require_owner(caller)?;
        let added = self.allow_list.add(who);
        if added {
            debug!(%who, "Allow-listed");
            self.events.on_event(&SaleEvent::AllowListed { who });
        }
        Ok(added)
    }

    /// Approves several beneficiaries. Returns how many were new.
    pub fn add_many_to_allow_list<I>(&mut self, caller: &Address, who: I) -> SaleResult<usize>
    where
        I: IntoIterator<Item = Address>,
    {
        self.require_owner(caller)?;
        let mut added = 0;
        for address in who {
            if self.allow_list.add(address) {
                self.events.on_event(&SaleEvent::AllowListed { who: address });
                added += 1;
            }
        }
        debug!(added, "Allow-list extended");
        Ok(added)
    }

    /// Revokes `who`. Returns false if it was not listed.
    pub fn remove_from_allow_list(&mut self, caller: &Address, who: &Address) -> SaleResult<bool> {
        self.require_owner(caller)?;
        let removed = self.allow_list.remove(who);
        if removed {
            debug!(%who, "Removed from allow-list");
            self.events.on_event(&SaleEvent::AllowListRemoved { who: *who });
        }
        Ok(removed)
    }

    fn require_owner(&self, caller: &Address) -> Result<(), StateError> {
        if *caller != self.owner {
            return Err(StateError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn goal_reached(&self) -> bool {
        self.ledger.goal_reached()
    }

    pub fn has_closed(&self) -> bool {
        self.state.has_closed(self.clock.now())
    }

    pub fn phase(&self) -> SalePhase {
        self.state.phase(self.clock.now())
    }

    /// Tokens still for sale.
    pub fn remaining_tokens(&self) -> TokenAmount {
        self.ledger.remaining_supply()
    }

    pub fn is_whitelisted(&self, who: &Address) -> bool {
        self.allow_list.is_whitelisted(who)
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn token_holder(&self) -> Address {
        self.token_holder
    }

    pub fn ledger(&self) -> &SaleLedger {
        &self.ledger
    }

    pub fn state(&self) -> &SaleStateMachine {
        &self.state
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    pub fn escrow(&self) -> &E {
        &self.escrow
    }

    pub fn allow_list(&self) -> &A {
        &self.allow_list
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::InMemoryAllowList;
    use crate::collaborators::{ManualClock, RecordingEventSink};
    use crate::error::{SaleError, TransferError};
    use crate::token::AllowanceLedger;
    use crate::vault::{RefundVault, VaultState};
    use chrono::{Duration, TimeZone};

    type TestSale = Crowdsale<AllowanceLedger, RefundVault, InMemoryAllowList, ManualClock>;

    const E18: u128 = 1_000_000_000_000_000_000;

    fn owner() -> Address {
        Address::repeat_byte(0xaa)
    }
    fn holder() -> Address {
        Address::repeat_byte(0xbb)
    }
    fn alice() -> Address {
        Address::repeat_byte(0x01)
    }
    fn bob() -> Address {
        Address::repeat_byte(0x02)
    }
    fn mallory() -> Address {
        Address::repeat_byte(0x03)
    }

    fn opening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    fn closing() -> DateTime<Utc> {
        opening() + Duration::days(30)
    }

    struct Fixture {
        sale: TestSale,
        clock: ManualClock,
        events: Arc<RecordingEventSink>,
    }

    impl Fixture {
        fn close(&self) {
            self.clock.set(closing() + Duration::seconds(1));
        }
    }

    /// Sale with the standard table, base rate 13, alice and bob allow-listed.
    fn fixture(supply: TokenAmount, goal: u128, allowance: TokenAmount) -> Fixture {
        let mut token = AllowanceLedger::new(Address::repeat_byte(0xcc));
        token.mint(holder(), TokenAmount::new(400_000_000 * E18)).unwrap();
        token.approve(holder(), allowance);

        let clock = ManualClock::new(opening() + Duration::hours(1));
        let events = Arc::new(RecordingEventSink::new());

        let params = SaleParams {
            owner: owner(),
            token_holder: holder(),
            rate: Rate::new(13),
            goal: FundsAmount::new(goal),
            initial_supply: supply,
            opening_time: opening(),
            closing_time: closing(),
            tiers: TierTable::standard(18).unwrap(),
        };

        let allow_list: InMemoryAllowList = [alice(), bob()].into_iter().collect();
        let sale = Crowdsale::new(
            params,
            token,
            RefundVault::new(Address::repeat_byte(0xee)),
            allow_list,
            clock.clone(),
        )
        .unwrap()
        .with_event_sink(events.clone());

        Fixture { sale, clock, events }
    }

    fn default_fixture() -> Fixture {
        let supply = TokenAmount::new(350_000_000 * E18);
        fixture(supply, 1_000_000, supply)
    }

    #[test]
    fn test_purchase_happy_path() {
        let mut f = default_fixture();
        let before = f.sale.remaining_tokens();

        let record = f
            .sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(1_000))
            .unwrap();

        // Top tier: 13 × 10 / 13 = 10 per token
        assert_eq!(record.tokens_allocated, TokenAmount::new(100));
        assert_eq!(record.net_payment, FundsAmount::new(1_000));
        assert_eq!(record.refund_amount, FundsAmount::ZERO);
        assert_eq!(
            f.sale.remaining_tokens(),
            before.checked_sub(TokenAmount::new(100)).unwrap()
        );
        assert_eq!(f.sale.ledger().raised_total(), FundsAmount::new(1_000));
        assert_eq!(f.sale.token().balance_of(&alice()), TokenAmount::new(100));
        assert_eq!(f.sale.escrow().deposited(&alice()), FundsAmount::new(1_000));

        assert_eq!(
            f.events.events(),
            vec![SaleEvent::TokensPurchased {
                payer: alice(),
                beneficiary: alice(),
                net_payment: FundsAmount::new(1_000),
                tokens: TokenAmount::new(100),
            }]
        );
    }

    #[test]
    fn test_payer_and_beneficiary_can_differ() {
        let mut f = default_fixture();
        f.sale
            .buy_tokens(&mallory(), &bob(), FundsAmount::new(100))
            .unwrap();

        assert_eq!(f.sale.token().balance_of(&bob()), TokenAmount::new(10));
        assert_eq!(f.sale.escrow().deposited(&mallory()), FundsAmount::new(100));
    }

    #[test]
    fn test_purchase_across_tier_boundary() {
        let supply = TokenAmount::new(300_000_000 * E18 + 5);
        let mut f = fixture(supply, 1_000_000, supply);

        let record = f
            .sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(70))
            .unwrap();

        assert_eq!(record.tokens_allocated, TokenAmount::new(7));
        assert_eq!(record.refund_amount, FundsAmount::ZERO);
    }

    #[test]
    fn test_sold_out_returns_unspent() {
        let supply = TokenAmount::new(10);
        let mut f = fixture(supply, 1_000_000, supply);

        let record = f
            .sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(1_000))
            .unwrap();

        // Lowest tier at 13: 10 tokens cost 130
        assert_eq!(record.tokens_allocated, TokenAmount::new(10));
        assert_eq!(record.net_payment, FundsAmount::new(130));
        assert_eq!(record.refund_amount, FundsAmount::new(870));
        assert_eq!(f.sale.ledger().raised_total(), FundsAmount::new(130));
        assert_eq!(f.sale.escrow().balance(), FundsAmount::new(130));
        assert!(f.sale.remaining_tokens().is_zero());

        assert!(matches!(
            f.sale.buy_tokens(&bob(), &bob(), FundsAmount::new(50)),
            Err(SaleError::Validation(ValidationError::NothingToAllocate { .. }))
        ));
    }

    #[test]
    fn test_purchase_after_close_changes_nothing() {
        let mut f = default_fixture();
        f.close();
        let before = f.sale.snapshot();

        let err = f
            .sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(1_000))
            .unwrap_err();

        assert!(matches!(
            err,
            SaleError::Validation(ValidationError::SaleNotOpen {
                phase: SalePhase::Closed
            })
        ));
        assert_eq!(f.sale.snapshot(), before);
        assert!(f.events.events().is_empty());
    }

    #[test]
    fn test_purchase_before_open_rejected() {
        let mut f = default_fixture();
        f.clock.set(opening() - Duration::seconds(1));

        assert!(matches!(
            f.sale.buy_tokens(&alice(), &alice(), FundsAmount::new(1_000)),
            Err(SaleError::Validation(ValidationError::SaleNotOpen {
                phase: SalePhase::Pending
            }))
        ));
    }

    #[test]
    fn test_purchase_input_validation() {
        let mut f = default_fixture();

        assert!(matches!(
            f.sale.buy_tokens(&alice(), &Address::ZERO, FundsAmount::new(1)),
            Err(SaleError::Validation(ValidationError::InvalidBeneficiary))
        ));
        assert!(matches!(
            f.sale.buy_tokens(&alice(), &alice(), FundsAmount::ZERO),
            Err(SaleError::Validation(ValidationError::ZeroPayment))
        ));
        assert!(matches!(
            f.sale.buy_tokens(&alice(), &mallory(), FundsAmount::new(1_000)),
            Err(SaleError::Validation(ValidationError::NotWhitelisted { .. }))
        ));
        // Below the price of a single token unit
        assert!(matches!(
            f.sale.buy_tokens(&alice(), &alice(), FundsAmount::new(9)),
            Err(SaleError::Validation(ValidationError::NothingToAllocate { .. }))
        ));
        assert_eq!(f.sale.ledger().raised_total(), FundsAmount::ZERO);
    }

    #[test]
    fn test_transfer_failure_leaves_sale_unchanged() {
        let supply = TokenAmount::new(350_000_000 * E18);
        let mut f = fixture(supply, 1_000_000, TokenAmount::new(50));
        let before = f.sale.snapshot();

        let err = f
            .sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(1_000))
            .unwrap_err();

        assert!(matches!(
            err,
            SaleError::Transfer(TransferError::InsufficientAllowance { .. })
        ));
        assert_eq!(f.sale.snapshot(), before);
        assert_eq!(f.sale.escrow().balance(), FundsAmount::ZERO);
        assert!(f.events.events().is_empty());
    }

    /// Escrow that claims to accept deposits but refuses every one.
    #[derive(Clone)]
    struct RefusingEscrow;

    impl Escrow for RefusingEscrow {
        fn deposit(&mut self, _payer: &Address, _amount: FundsAmount) -> Result<(), EscrowError> {
            Err(EscrowError::DepositsClosed)
        }
        fn close(&mut self) -> Result<FundsAmount, EscrowError> {
            Ok(FundsAmount::ZERO)
        }
        fn enable_refunds(&mut self) -> Result<(), EscrowError> {
            Ok(())
        }
        fn refund(&mut self, payer: &Address) -> Result<FundsAmount, EscrowError> {
            Err(EscrowError::NothingToRefund { payer: *payer })
        }
        fn accepts_deposits(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_deposit_failure_after_transfer_leaves_ledger_uncommitted() {
        let mut token = AllowanceLedger::new(Address::repeat_byte(0xcc));
        token.mint(holder(), TokenAmount::new(400_000_000 * E18)).unwrap();
        token.approve(holder(), TokenAmount::new(400_000_000 * E18));

        let params = SaleParams {
            owner: owner(),
            token_holder: holder(),
            rate: Rate::new(13),
            goal: FundsAmount::new(1_000),
            initial_supply: TokenAmount::new(350_000_000 * E18),
            opening_time: opening(),
            closing_time: closing(),
            tiers: TierTable::standard(18).unwrap(),
        };
        let mut sale = Crowdsale::new(
            params,
            token,
            RefusingEscrow,
            [alice()].into_iter().collect::<InMemoryAllowList>(),
            ManualClock::new(opening() + Duration::hours(1)),
        )
        .unwrap();
        let checkpoint = sale.clone();
        let before = sale.snapshot();

        let err = sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(100))
            .unwrap_err();
        assert!(matches!(err, SaleError::Escrow(EscrowError::DepositsClosed)));
        assert_eq!(sale.snapshot(), before);

        // The transfer already happened; restoring the checkpoint undoes it.
        assert_eq!(sale.token().balance_of(&alice()), TokenAmount::new(10));
        let sale = checkpoint;
        assert_eq!(sale.token().balance_of(&alice()), TokenAmount::ZERO);
    }

    #[test]
    fn test_supply_and_raised_invariants_over_purchases() {
        let supply = TokenAmount::new(1_000);
        let mut f = fixture(supply, 1_000_000, supply);

        let mut tokens_sold = 0u128;
        let mut net_total = 0u128;
        for payment in [130u128, 7, 2_600, 13, 99, 40_000] {
            match f
                .sale
                .buy_tokens(&alice(), &alice(), FundsAmount::new(payment))
            {
                Ok(record) => {
                    assert_eq!(
                        record.payment_amount.get(),
                        record.net_payment.get() + record.refund_amount.get()
                    );
                    tokens_sold += record.tokens_allocated.get();
                    net_total += record.net_payment.get();
                }
                Err(SaleError::Validation(ValidationError::NothingToAllocate { .. })) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }

            let ledger = f.sale.ledger();
            assert_eq!(
                ledger.remaining_supply().get() + tokens_sold,
                ledger.initial_supply().get()
            );
            assert_eq!(ledger.raised_total().get(), net_total);
        }
        assert!(f.sale.remaining_tokens().is_zero());
    }

    #[test]
    fn test_failed_sale_refunds_each_contributor_once() {
        let mut f = default_fixture();
        f.sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(100))
            .unwrap();
        f.sale
            .buy_tokens(&bob(), &bob(), FundsAmount::new(200))
            .unwrap();

        assert!(matches!(
            f.sale.claim_refund(&alice()),
            Err(SaleError::State(StateError::NotFinalized))
        ));

        f.close();
        assert!(matches!(
            f.sale.finalize(&alice()),
            Err(SaleError::State(StateError::Unauthorized { .. }))
        ));
        assert_eq!(f.sale.finalize(&owner()).unwrap(), SaleOutcome::Refunding);
        assert_eq!(f.sale.escrow().state(), VaultState::Refunding);
        assert_eq!(f.sale.phase(), SalePhase::Finalized(SaleOutcome::Refunding));

        let refund = f.sale.claim_refund(&alice()).unwrap();
        assert_eq!(refund.amount, FundsAmount::new(100));
        assert!(matches!(
            f.sale.claim_refund(&alice()),
            Err(SaleError::Escrow(EscrowError::NothingToRefund { .. }))
        ));
        assert!(matches!(
            f.sale.claim_refund(&mallory()),
            Err(SaleError::Escrow(EscrowError::NothingToRefund { .. }))
        ));
        assert_eq!(
            f.sale.claim_refund(&bob()).unwrap().amount,
            FundsAmount::new(200)
        );
        assert_eq!(f.sale.escrow().balance(), FundsAmount::ZERO);
    }

    #[test]
    fn test_successful_sale_closes_vault_and_blocks_refunds() {
        let supply = TokenAmount::new(350_000_000 * E18);
        let mut f = fixture(supply, 500, supply);
        f.sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(500))
            .unwrap();
        assert!(f.sale.goal_reached());

        f.close();
        assert!(f.sale.has_closed());
        assert_eq!(f.sale.finalize(&owner()).unwrap(), SaleOutcome::Successful);
        assert_eq!(f.sale.escrow().forwarded(), FundsAmount::new(500));
        assert!(matches!(
            f.sale.claim_refund(&alice()),
            Err(SaleError::State(StateError::GoalWasReached))
        ));

        let events = f.events.events();
        assert!(events.contains(&SaleEvent::Finalized {
            outcome: SaleOutcome::Successful,
            raised_total: FundsAmount::new(500),
        }));
        assert!(events.contains(&SaleEvent::VaultClosed {
            forwarded: FundsAmount::new(500),
        }));
    }

    #[test]
    fn test_finalize_twice_keeps_first_outcome() {
        let mut f = default_fixture();
        f.close();
        f.sale.finalize(&owner()).unwrap();
        let before = f.sale.snapshot();
        let events_before = f.events.events().len();

        assert!(matches!(
            f.sale.finalize(&owner()),
            Err(SaleError::State(StateError::AlreadyFinalized))
        ));
        assert_eq!(f.sale.snapshot(), before);
        assert_eq!(f.events.events().len(), events_before);
    }

    #[test]
    fn test_finalize_before_close_rejected() {
        let mut f = default_fixture();
        f.clock.set(closing());

        assert!(matches!(
            f.sale.finalize(&owner()),
            Err(SaleError::State(StateError::NotClosedYet))
        ));
        assert_eq!(f.sale.escrow().state(), VaultState::Active);
    }

    #[test]
    fn test_set_rate() {
        let mut f = default_fixture();

        assert!(matches!(
            f.sale.set_rate(&alice(), Rate::new(26)),
            Err(SaleError::State(StateError::Unauthorized { .. }))
        ));
        assert!(matches!(
            f.sale.set_rate(&owner(), Rate::new(0)),
            Err(SaleError::Validation(ValidationError::MustBePositive { .. }))
        ));
        assert!(matches!(
            f.sale.set_rate(&owner(), Rate::new(1)),
            Err(SaleError::Validation(ValidationError::RateTooLow { .. }))
        ));

        f.sale.set_rate(&owner(), Rate::new(26)).unwrap();
        // Top tier: 26 × 10 / 13 = 20
        let record = f
            .sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(1_000))
            .unwrap();
        assert_eq!(record.tokens_allocated, TokenAmount::new(50));

        f.close();
        f.sale.finalize(&owner()).unwrap();
        assert!(matches!(
            f.sale.set_rate(&owner(), Rate::new(13)),
            Err(SaleError::State(StateError::AlreadyFinalized))
        ));
    }

    #[test]
    fn test_allow_list_management() {
        let mut f = default_fixture();
        let carol = Address::repeat_byte(0x04);

        assert!(f.sale.remove_from_allow_list(&mallory(), &alice()).is_err());
        assert!(f.sale.remove_from_allow_list(&owner(), &alice()).unwrap());
        assert!(!f.sale.is_whitelisted(&alice()));

        let added = f
            .sale
            .add_many_to_allow_list(&owner(), [alice(), bob(), carol])
            .unwrap();
        assert_eq!(added, 2);
        assert!(f.sale.is_whitelisted(&carol));
        assert!(!f.sale.add_to_allow_list(&owner(), carol).unwrap());

        assert_eq!(
            f.events.events(),
            vec![
                SaleEvent::AllowListRemoved { who: alice() },
                SaleEvent::AllowListed { who: alice() },
                SaleEvent::AllowListed { who: carol },
            ]
        );
    }

    #[test]
    fn test_quote_does_not_mutate() {
        let f = default_fixture();
        let before = f.sale.snapshot();

        let allocation = f.sale.quote(FundsAmount::new(1_000)).unwrap();
        assert_eq!(allocation.tokens, TokenAmount::new(100));
        assert_eq!(f.sale.snapshot(), before);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut f = default_fixture();
        f.sale
            .buy_tokens(&alice(), &alice(), FundsAmount::new(1_000))
            .unwrap();
        let snapshot = f.sale.snapshot();

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: SaleSnapshot = serde_json::from_str(&json).unwrap();

        let restored = TestSale::restore(
            decoded,
            f.sale.token().clone(),
            f.sale.escrow().clone(),
            f.sale.allow_list().clone(),
            f.clock.clone(),
        )
        .unwrap();
        assert_eq!(restored.snapshot(), snapshot);

        let mut broken = snapshot;
        broken.remaining_supply = TokenAmount::new(broken.initial_supply.get() + 1);
        assert!(TestSale::restore(
            broken,
            f.sale.token().clone(),
            f.sale.escrow().clone(),
            f.sale.allow_list().clone(),
            f.clock.clone(),
        )
        .is_err());
    }

    #[test]
    fn test_new_rejects_bad_parameters() {
        let token = || {
            let mut token = AllowanceLedger::new(Address::repeat_byte(0xcc));
            token.mint(holder(), TokenAmount::new(1_000)).unwrap();
            token
        };
        let params = SaleParams {
            owner: owner(),
            token_holder: holder(),
            rate: Rate::new(13),
            goal: FundsAmount::new(1),
            initial_supply: TokenAmount::new(1_000),
            opening_time: opening(),
            closing_time: closing(),
            tiers: TierTable::standard(18).unwrap(),
        };
        let build = |params: SaleParams| {
            TestSale::new(
                params,
                token(),
                RefundVault::new(Address::repeat_byte(0xee)),
                InMemoryAllowList::new(),
                ManualClock::new(opening()),
            )
        };

        assert!(build(params.clone()).is_ok());

        let mut too_big = params.clone();
        too_big.initial_supply = TokenAmount::new(1_001);
        assert!(matches!(
            build(too_big),
            Err(SaleError::Validation(ValidationError::SupplyExceedsToken { .. }))
        ));

        let mut bad_window = params.clone();
        bad_window.closing_time = opening() - Duration::days(1);
        assert!(matches!(
            build(bad_window),
            Err(SaleError::Validation(ValidationError::InvalidWindow))
        ));

        let mut low_rate = params;
        low_rate.rate = Rate::new(1);
        assert!(matches!(
            build(low_rate),
            Err(SaleError::Validation(ValidationError::RateTooLow { .. }))
        ));
    }
}
