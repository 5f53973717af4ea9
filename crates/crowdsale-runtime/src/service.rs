//! # Sale Service
//!
//! Async front door to a [`Crowdsale`]. Serializes every operation and makes
//! each one all-or-nothing across the sale, its collaborators and the
//! database.
//!
//! ## Operation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller ──► lock ──► checkpoint = sale.clone()                          │
//! │                          │                                              │
//! │                          ▼                                              │
//! │                   run operation on the sale                             │
//! │                     │               │                                   │
//! │                   Err              Ok                                   │
//! │                     │               ▼                                   │
//! │                     │      persist(snapshot, journal entry)             │
//! │                     │         │                 │                       │
//! │                     │        Err               Ok ──► unlock, return    │
//! │                     ▼         ▼                                         │
//! │               sale = checkpoint, unlock, return error                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The checkpoint includes the collaborators, so a token transfer or escrow
//! deposit made by a purchase whose journal write failed is undone too.
//! Events already delivered to the sink are not recalled.
//!
//! ## Restart
//! Collaborators live in memory only. On resume [`SaleService::start`] feeds
//! the purchase journal back through the token ledger and escrow, replays the
//! vault outcome and claimed refunds, then applies the stored allow-list
//! decisions over whatever the collaborators were seeded with.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crowdsale_core::{
    Address, Allocation, AllowListStore, AllowanceLedger, Clock, Crowdsale, Escrow, FundsAmount,
    InMemoryAllowList, NoopEventSink, PurchaseRecord, Rate, RefundRecord, RefundVault, SaleError,
    SaleEventSink, SaleOutcome, SaleParams, SalePhase, SaleResult, SaleSnapshot, TokenAmount,
    TokenLedger,
};
use crowdsale_db::{Database, JournalEntry};

use crate::config::CrowdsaleConfig;
use crate::error::RuntimeResult;

// =============================================================================
// Collaborators
// =============================================================================

/// The live capabilities a sale runs against.
pub struct Collaborators<T, E, A, C> {
    pub token: T,
    pub escrow: E,
    pub allow_list: A,
    pub clock: C,
    pub events: Arc<dyn SaleEventSink>,
}

impl<C> Collaborators<AllowanceLedger, RefundVault, InMemoryAllowList, C> {
    /// In-memory vault and allow-list seeded from the config.
    pub fn in_memory(config: &CrowdsaleConfig, token: AllowanceLedger, clock: C) -> Self {
        Collaborators {
            token,
            escrow: RefundVault::new(config.sale.wallet),
            allow_list: config.sale.allow_list.iter().copied().collect(),
            clock,
            events: Arc::new(NoopEventSink),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn SaleEventSink>) -> Self {
        self.events = sink;
        self
    }
}

// =============================================================================
// Sale Service
// =============================================================================

/// Serialized, persisted access to one sale.
pub struct SaleService<T, E, A, C> {
    sale: Mutex<Crowdsale<T, E, A, C>>,
    db: Database,
}

impl<T, E, A, C> SaleService<T, E, A, C>
where
    T: TokenLedger + Clone,
    E: Escrow + Clone,
    A: AllowListStore + Clone,
    C: Clock + Clone,
{
    /// Wraps an existing sale. Nothing is written until the first operation.
    pub fn new(sale: Crowdsale<T, E, A, C>, db: Database) -> Self {
        SaleService {
            sale: Mutex::new(sale),
            db,
        }
    }

    /// Resumes the stored sale, or creates and stores a new one from `params`.
    ///
    /// A stored snapshot takes precedence over `params`. When resuming, the
    /// collaborators must be in their pre-sale state: the stored journals are
    /// replayed into them (token deliveries, deposits, vault outcome, refunds
    /// and allow-list decisions).
    pub async fn start(
        db: Database,
        params: SaleParams,
        parts: Collaborators<T, E, A, C>,
    ) -> RuntimeResult<Self> {
        let Collaborators {
            mut token,
            mut escrow,
            mut allow_list,
            clock,
            events,
        } = parts;

        let sale = match db.sale_state().load().await? {
            Some(snapshot) => {
                info!(
                    remaining = %snapshot.remaining_supply,
                    raised = %snapshot.raised_total,
                    "Resuming stored sale"
                );
                replay_journal(&db, &snapshot, &mut token, &mut escrow, &mut allow_list).await?;
                Crowdsale::restore(snapshot, token, escrow, allow_list, clock)?
            }
            None => {
                let sale = Crowdsale::new(params, token, escrow, allow_list, clock)?;
                db.persist(&sale.snapshot(), JournalEntry::None).await?;
                info!("New sale stored");
                sale
            }
        };

        Ok(SaleService::new(sale.with_event_sink(events), db))
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub async fn buy_tokens(
        &self,
        payer: Address,
        beneficiary: Address,
        payment: FundsAmount,
    ) -> RuntimeResult<PurchaseRecord> {
        self.run(
            "buy_tokens",
            |sale| sale.buy_tokens(&payer, &beneficiary, payment),
            |record| JournalEntry::Purchase(record),
        )
        .await
    }

    pub async fn finalize(&self, caller: Address) -> RuntimeResult<SaleOutcome> {
        self.run("finalize", |sale| sale.finalize(&caller), |_| JournalEntry::None)
            .await
    }

    pub async fn claim_refund(&self, payer: Address) -> RuntimeResult<RefundRecord> {
        self.run(
            "claim_refund",
            |sale| sale.claim_refund(&payer),
            |refund| JournalEntry::Refund(refund),
        )
        .await
    }

    pub async fn set_rate(&self, caller: Address, rate: Rate) -> RuntimeResult<()> {
        self.run("set_rate", |sale| sale.set_rate(&caller, rate), |_| JournalEntry::None)
            .await
    }

    pub async fn add_to_allow_list(&self, caller: Address, who: Address) -> RuntimeResult<bool> {
        self.run(
            "add_to_allow_list",
            |sale| sale.add_to_allow_list(&caller, who),
            |added| allow_list_entry(*added, vec![who], true),
        )
        .await
    }

    pub async fn add_many_to_allow_list(
        &self,
        caller: Address,
        who: Vec<Address>,
    ) -> RuntimeResult<usize> {
        let requested = who.clone();
        self.run(
            "add_many_to_allow_list",
            |sale| sale.add_many_to_allow_list(&caller, who),
            |added| allow_list_entry(*added > 0, requested, true),
        )
        .await
    }

    pub async fn remove_from_allow_list(
        &self,
        caller: Address,
        who: Address,
    ) -> RuntimeResult<bool> {
        self.run(
            "remove_from_allow_list",
            |sale| sale.remove_from_allow_list(&caller, &who),
            |removed| allow_list_entry(*removed, vec![who], false),
        )
        .await
    }

    /// Runs `op` under the lock against a checkpoint and persists the result.
    async fn run<R, Op, J>(&self, operation: &'static str, op: Op, journal: J) -> RuntimeResult<R>
    where
        Op: FnOnce(&mut Crowdsale<T, E, A, C>) -> SaleResult<R>,
        J: for<'r> FnOnce(&'r R) -> JournalEntry<'r>,
    {
        let mut sale = self.sale.lock().await;
        let checkpoint = sale.clone();

        let outcome = match op(&mut *sale) {
            Ok(outcome) => outcome,
            Err(err) => {
                *sale = checkpoint;
                if err.is_fatal() {
                    error!(operation, error = %err, "Operation failed");
                } else {
                    warn!(operation, error = %err, "Operation rejected");
                }
                return Err(err.into());
            }
        };

        if let Err(err) = self.db.persist(&sale.snapshot(), journal(&outcome)).await {
            *sale = checkpoint;
            error!(operation, error = %err, "Persist failed, operation rolled back");
            return Err(err.into());
        }

        Ok(outcome)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn quote(&self, payment: FundsAmount) -> RuntimeResult<Allocation> {
        Ok(self.sale.lock().await.quote(payment)?)
    }

    pub async fn goal_reached(&self) -> bool {
        self.sale.lock().await.goal_reached()
    }

    pub async fn has_closed(&self) -> bool {
        self.sale.lock().await.has_closed()
    }

    pub async fn phase(&self) -> SalePhase {
        self.sale.lock().await.phase()
    }

    pub async fn remaining_tokens(&self) -> TokenAmount {
        self.sale.lock().await.remaining_tokens()
    }

    pub async fn is_whitelisted(&self, who: Address) -> bool {
        self.sale.lock().await.is_whitelisted(&who)
    }

    pub async fn snapshot(&self) -> SaleSnapshot {
        self.sale.lock().await.snapshot()
    }

    /// Reads the sale under the lock.
    pub async fn inspect<R>(&self, f: impl FnOnce(&Crowdsale<T, E, A, C>) -> R) -> R {
        f(&*self.sale.lock().await)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn allow_list_entry<'r>(changed: bool, addresses: Vec<Address>, listed: bool) -> JournalEntry<'r> {
    if changed {
        JournalEntry::AllowList { addresses, listed }
    } else {
        JournalEntry::None
    }
}

/// Rebuilds collaborator state from the journals of a stored sale.
async fn replay_journal<T, E, A>(
    db: &Database,
    snapshot: &SaleSnapshot,
    token: &mut T,
    escrow: &mut E,
    allow_list: &mut A,
) -> RuntimeResult<()>
where
    T: TokenLedger,
    E: Escrow,
    A: AllowListStore,
{
    let purchases = db.purchases().list_all().await?;
    for purchase in &purchases {
        token
            .transfer_from(&snapshot.token_holder, &purchase.beneficiary, purchase.tokens_allocated)
            .map_err(SaleError::from)?;
        escrow
            .deposit(&purchase.payer, purchase.net_payment)
            .map_err(SaleError::from)?;
    }

    let mut refunds = 0;
    match snapshot.outcome {
        Some(SaleOutcome::Successful) => {
            escrow.close().map_err(SaleError::from)?;
        }
        Some(SaleOutcome::Refunding) => {
            escrow.enable_refunds().map_err(SaleError::from)?;
            for refund in db.refunds().list_all().await? {
                let paid = escrow.refund(&refund.payer).map_err(SaleError::from)?;
                if paid != refund.amount {
                    warn!(
                        payer = %refund.payer,
                        journaled = %refund.amount,
                        replayed = %paid,
                        "Replayed refund differs from journal"
                    );
                }
                refunds += 1;
            }
        }
        None => {}
    }

    let decisions = db.allow_list().list().await?;
    for (who, listed) in &decisions {
        if *listed {
            allow_list.add(*who);
        } else {
            allow_list.remove(who);
        }
    }

    info!(
        purchases = purchases.len(),
        refunds,
        allow_list_decisions = decisions.len(),
        "Journal replayed"
    );
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
