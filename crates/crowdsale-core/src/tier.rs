//! # Tier Pricing Engine
//!
//! Supply-dependent pricing: the fewer tokens remain, the higher the price.
//!
//! ## Standard Table (whole tokens, scaled by 10^decimals)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  remaining supply          multiplier     price at base rate 13         │
//! │  ─────────────────────     ──────────     ─────────────────────         │
//! │  [300M, ∞)                 10/13          10                            │
//! │  [250M, 300M)              21/26          10                            │
//! │  [200M, 250M)              11/13          11                            │
//! │  [150M, 200M)              23/26          11                            │
//! │  [100M, 150M)              12/13          12                            │
//! │  [ 50M, 100M)              25/26          12                            │
//! │  [  0 ,  50M)               1/1           13                            │
//! │                                                                         │
//! │  tier price = base_rate × num / den   (never compounded)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Crossing a Boundary
//! ```text
//! payment 70, supply = 300M + 5, tier price 10
//!
//!   tier [300M, ∞): capacity 5, affordable 7  → clamp to 5, cost 50
//!        leftover 20 carries down
//!   tier [250M, 300M): affordable 2 ≤ capacity → allocate 2, stop
//!
//!   result: 7 tokens, nothing unspent
//! ```
//!
//! When the lowest tier is exhausted, whatever payment is left comes back as
//! `unspent`. A truncation remainder inside a tier (payment not an exact
//! multiple of the price) is kept with the purchase.

use serde::{Deserialize, Serialize};

use crate::error::{ArithmeticError, ValidationError};
use crate::units::{decimal_factor, FundsAmount, Rate, TokenAmount};

/// Lower bounds of the standard tiers in whole tokens, highest first.
pub const STANDARD_BOUNDARIES: [u128; 7] = [
    300_000_000,
    250_000_000,
    200_000_000,
    150_000_000,
    100_000_000,
    50_000_000,
    0,
];

/// Price multipliers (numerator, denominator) of the standard tiers.
pub const STANDARD_MULTIPLIERS: [(u128, u128); 7] = [
    (10, 13),
    (21, 26),
    (11, 13),
    (23, 26),
    (12, 13),
    (25, 26),
    (1, 1),
];

// =============================================================================
// Tier
// =============================================================================

/// A contiguous range of remaining supply priced with one multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Inclusive lower bound of remaining supply.
    pub lower_bound: TokenAmount,
    /// Exclusive upper bound; `TokenAmount::MAX` for the open-ended top tier.
    pub upper_bound: TokenAmount,
    pub multiplier_num: u128,
    pub multiplier_den: u128,
}

/// What a single tier contributed to an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFill {
    /// Position of the tier in its table (0 = highest).
    pub tier: usize,
    pub rate: Rate,
    pub tokens: TokenAmount,
    /// Exact cost of `tokens` at `rate`.
    pub cost: FundsAmount,
    /// Payment left after this tier.
    pub leftover: FundsAmount,
    /// True if the tier ran out before the payment did.
    pub clamped: bool,
}

impl Tier {
    /// Creates a tier covering `[lower_bound, upper_bound)`.
    pub const fn new(
        lower_bound: TokenAmount,
        upper_bound: TokenAmount,
        multiplier_num: u128,
        multiplier_den: u128,
    ) -> Self {
        Tier {
            lower_bound,
            upper_bound,
            multiplier_num,
            multiplier_den,
        }
    }

    /// Checks if `supply` falls inside this tier.
    #[inline]
    pub fn contains(&self, supply: TokenAmount) -> bool {
        self.lower_bound <= supply && supply < self.upper_bound
    }

    /// Effective price in this tier for the given base rate.
    pub fn rate(&self, base_rate: Rate) -> Result<Rate, ArithmeticError> {
        let rate = base_rate.scaled(self.multiplier_num, self.multiplier_den)?;
        if rate.is_zero() {
            return Err(ArithmeticError::ZeroRate);
        }
        Ok(rate)
    }

    /// Spends as much of `payment` as this tier can absorb.
    ///
    /// `supply` is the remaining supply when the tier is entered; the tier can
    /// sell at most `supply - lower_bound` tokens.
    pub fn fill(
        &self,
        index: usize,
        payment: FundsAmount,
        supply: TokenAmount,
        base_rate: Rate,
    ) -> Result<TierFill, ArithmeticError> {
        let rate = self.rate(base_rate)?;
        let capacity = supply.checked_sub(self.lower_bound)?;
        let affordable = rate.tokens_for(payment)?;

        let clamped = affordable > capacity;
        let tokens = if clamped { capacity } else { affordable };
        let cost = rate.cost_of(tokens)?;
        let leftover = payment.checked_sub(cost)?;

        Ok(TierFill {
            tier: index,
            rate,
            tokens,
            cost,
            leftover,
            clamped,
        })
    }
}

// =============================================================================
// Allocation
// =============================================================================

/// Output of the pricing engine for one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub tokens: TokenAmount,
    /// Payment that could not be spent because supply ran out.
    pub unspent: FundsAmount,
    /// Per-tier breakdown, highest tier first. Tiers that sold nothing are omitted.
    pub fills: Vec<TierFill>,
}

impl Allocation {
    /// Nothing allocated; the whole payment is returned.
    pub fn refund_all(payment: FundsAmount) -> Self {
        Allocation {
            tokens: TokenAmount::ZERO,
            unspent: payment,
            fills: Vec::new(),
        }
    }
}

// =============================================================================
// Tier Table
// =============================================================================

/// Ordered, validated tier table (highest supply tier first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct TierTable {
    tiers: Vec<Tier>,
}

impl TierTable {
    /// Builds a table, checking that the tiers partition `[0, top)`.
    ///
    /// ## Rules
    /// - At least one tier
    /// - Ordered by descending bounds, each tier's upper bound equal to the
    ///   next higher tier's lower bound
    /// - Lowest tier starts at zero
    /// - Multipliers non-zero
    pub fn new(tiers: Vec<Tier>) -> Result<Self, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidTierTable { reason };

        let lowest = tiers
            .last()
            .ok_or_else(|| invalid("at least one tier is required".to_string()))?;
        if !lowest.lower_bound.is_zero() {
            return Err(invalid(format!(
                "lowest tier must start at 0, starts at {}",
                lowest.lower_bound
            )));
        }

        for (index, tier) in tiers.iter().enumerate() {
            if tier.multiplier_num == 0 || tier.multiplier_den == 0 {
                return Err(invalid(format!("tier {} has a zero multiplier term", index)));
            }
            if tier.lower_bound >= tier.upper_bound {
                return Err(invalid(format!("tier {} is empty", index)));
            }
        }

        for (index, pair) in tiers.windows(2).enumerate() {
            if pair[1].upper_bound != pair[0].lower_bound {
                return Err(invalid(format!(
                    "tier {} ends at {} but tier {} starts at {}",
                    index + 1,
                    pair[1].upper_bound,
                    index,
                    pair[0].lower_bound
                )));
            }
        }

        Ok(TierTable { tiers })
    }

    /// The standard seven-tier table for a token with `decimals` decimals.
    pub fn standard(decimals: u32) -> Result<Self, ValidationError> {
        let too_precise = |e: ArithmeticError| ValidationError::InvalidTierTable {
            reason: format!("{} decimals: {}", decimals, e),
        };
        let factor = decimal_factor(decimals).map_err(too_precise)?;

        let mut tiers = Vec::with_capacity(STANDARD_BOUNDARIES.len());
        let mut upper = TokenAmount::MAX;
        for (boundary, (num, den)) in STANDARD_BOUNDARIES.iter().zip(STANDARD_MULTIPLIERS) {
            let lower = boundary
                .checked_mul(factor)
                .map(TokenAmount::new)
                .ok_or(ArithmeticError::Overflow {
                    operation: "tier boundary scaling",
                })
                .map_err(too_precise)?;
            tiers.push(Tier::new(lower, upper, num, den));
            upper = lower;
        }

        TierTable::new(tiers)
    }

    /// Tiers, highest first.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Index of the tier containing `supply`.
    pub fn tier_index_for(&self, supply: TokenAmount) -> Option<usize> {
        self.tiers.iter().position(|tier| tier.contains(supply))
    }

    /// Checks that every supply value up to `initial_supply` has a tier.
    pub fn covers(&self, initial_supply: TokenAmount) -> bool {
        self.tiers
            .first()
            .map(|top| initial_supply < top.upper_bound)
            .unwrap_or(false)
    }

    /// Checks that `base_rate` yields a non-zero price in every tier.
    pub fn validate_rate(&self, base_rate: Rate) -> Result<(), ValidationError> {
        if base_rate.is_zero() {
            return Err(ValidationError::MustBePositive {
                field: "rate".to_string(),
            });
        }
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.rate(base_rate).is_err() {
                return Err(ValidationError::RateTooLow {
                    rate: base_rate.get(),
                    tier: index,
                });
            }
        }
        Ok(())
    }

    /// Computes the tokens bought by `payment` with `remaining_supply` left.
    ///
    /// Pure: the caller applies the result. Walks tiers from the one holding
    /// `remaining_supply` downward, clamping at each tier's capacity and
    /// carrying the exact leftover into the next tier.
    pub fn compute_allocation(
        &self,
        payment: FundsAmount,
        remaining_supply: TokenAmount,
        base_rate: Rate,
    ) -> Result<Allocation, ArithmeticError> {
        if remaining_supply.is_zero() {
            return Ok(Allocation::refund_all(payment));
        }

        let start = self
            .tier_index_for(remaining_supply)
            .ok_or(ArithmeticError::SupplyOutsideTiers {
                supply: remaining_supply,
            })?;

        let mut supply = remaining_supply;
        let mut payment_left = payment;
        let mut tokens = TokenAmount::ZERO;
        let mut fills = Vec::new();

        for (index, tier) in self.tiers.iter().enumerate().skip(start) {
            let fill = tier.fill(index, payment_left, supply, base_rate)?;

            tokens = tokens.checked_add(fill.tokens)?;
            supply = supply.checked_sub(fill.tokens)?;
            payment_left = fill.leftover;

            let clamped = fill.clamped;
            if !fill.tokens.is_zero() {
                fills.push(fill);
            }
            if !clamped {
                return Ok(Allocation {
                    tokens,
                    unspent: FundsAmount::ZERO,
                    fills,
                });
            }
        }

        // Lowest tier exhausted: the rest goes back to the payer.
        Ok(Allocation {
            tokens,
            unspent: payment_left,
            fills,
        })
    }
}

impl TryFrom<Vec<Tier>> for TierTable {
    type Error = ValidationError;

    fn try_from(tiers: Vec<Tier>) -> Result<Self, Self::Error> {
        TierTable::new(tiers)
    }
}

impl From<TierTable> for Vec<Tier> {
    fn from(table: TierTable) -> Self {
        table.tiers
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
