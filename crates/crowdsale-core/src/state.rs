//! # Sale State Machine
//!
//! Time-window and finalization state. The time-derived phases are computed
//! from the clock on every read; only the finalization outcome is stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StateError, ValidationError};
use crate::types::{SaleOutcome, SalePhase};

/// Sale window plus the one-way finalization flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleStateMachine {
    opening_time: DateTime<Utc>,
    closing_time: DateTime<Utc>,
    outcome: Option<SaleOutcome>,
}

impl SaleStateMachine {
    /// Creates an unfinalized state machine for `[opening_time, closing_time]`.
    pub fn new(
        opening_time: DateTime<Utc>,
        closing_time: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Self::from_parts(opening_time, closing_time, None)
    }

    /// Rebuilds a state machine from persisted fields.
    pub fn from_parts(
        opening_time: DateTime<Utc>,
        closing_time: DateTime<Utc>,
        outcome: Option<SaleOutcome>,
    ) -> Result<Self, ValidationError> {
        if opening_time > closing_time {
            return Err(ValidationError::InvalidWindow);
        }
        Ok(SaleStateMachine {
            opening_time,
            closing_time,
            outcome,
        })
    }

    /// Phase at `now`. Finalization wins over the clock.
    pub fn phase(&self, now: DateTime<Utc>) -> SalePhase {
        if let Some(outcome) = self.outcome {
            return SalePhase::Finalized(outcome);
        }
        if now < self.opening_time {
            SalePhase::Pending
        } else if now <= self.closing_time {
            SalePhase::Open
        } else {
            SalePhase::Closed
        }
    }

    /// True once `now` is strictly past the closing time.
    pub fn has_closed(&self, now: DateTime<Utc>) -> bool {
        now > self.closing_time
    }

    /// Fails unless purchases are accepted at `now`.
    pub fn ensure_open(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        match self.phase(now) {
            SalePhase::Open => Ok(()),
            phase => Err(ValidationError::SaleNotOpen { phase }),
        }
    }

    /// Fixes the outcome. A second call fails regardless of time.
    pub fn finalize(
        &mut self,
        now: DateTime<Utc>,
        goal_reached: bool,
    ) -> Result<SaleOutcome, StateError> {
        if self.outcome.is_some() {
            return Err(StateError::AlreadyFinalized);
        }
        if !self.has_closed(now) {
            return Err(StateError::NotClosedYet);
        }

        let outcome = if goal_reached {
            SaleOutcome::Successful
        } else {
            SaleOutcome::Refunding
        };
        self.outcome = Some(outcome);
        Ok(outcome)
    }

    /// Fails unless the sale finalized without reaching its goal.
    pub fn ensure_refundable(&self) -> Result<(), StateError> {
        match self.outcome {
            None => Err(StateError::NotFinalized),
            Some(SaleOutcome::Successful) => Err(StateError::GoalWasReached),
            Some(SaleOutcome::Refunding) => Ok(()),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<SaleOutcome> {
        self.outcome
    }

    pub fn opening_time(&self) -> DateTime<Utc> {
        self.opening_time
    }

    pub fn closing_time(&self) -> DateTime<Utc> {
        self.closing_time
    }
}
