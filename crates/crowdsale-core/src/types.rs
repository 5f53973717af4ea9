//! # Domain Types
//!
//! Core domain types used throughout the crowdsale.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Address      │   │   SalePhase     │   │ PurchaseRecord  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  [u8; 20]       │   │  Pending        │   │  id (UUID)      │       │
//! │  │  0x-hex display │   │  Open           │   │  payer          │       │
//! │  │  ZERO = null    │   │  Closed         │   │  beneficiary    │       │
//! │  └─────────────────┘   │  Finalized(..)  │   │  tokens/refund  │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │  SaleOutcome    │   │   SaleEvent     │                             │
//! │  │  Successful     │   │  emitted after  │                             │
//! │  │  Refunding      │   │  each commit    │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::units::{FundsAmount, Rate, TokenAmount};

// =============================================================================
// Address
// =============================================================================

/// A 20-byte account identity (payer, beneficiary, owner, wallet).
///
/// The all-zero address is the "null" identity and is never a valid
/// beneficiary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The null address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Creates an address from raw bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// Creates an address with every byte set to `byte` (handy for fixtures).
    #[inline]
    pub const fn repeat_byte(byte: u8) -> Self {
        Address([byte; 20])
    }

    /// Returns the raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Checks if this is the null address.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = ValidationError;

    /// Parses `0x`-prefixed (or bare) 40-digit hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "address".to_string(),
            reason: format!("'{}': {}", s, reason),
        };

        let hex = s.trim();
        let hex = hex
            .strip_prefix("0x")
            .or_else(|| hex.strip_prefix("0X"))
            .unwrap_or(hex);

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid("invalid hex digit"));
        }
        if hex.len() != 40 {
            return Err(invalid("expected 40 hex digits"));
        }

        let mut bytes = [0u8; 20];
        for (byte, pair) in bytes.iter_mut().zip(hex.as_bytes().chunks(2)) {
            let high = hex_value(pair[0]);
            let low = hex_value(pair[1]);
            *byte = (high << 4) | low;
        }

        Ok(Address(bytes))
    }
}

/// Value of one ASCII hex digit (input already checked).
fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Sale Phase
// =============================================================================

/// Outcome fixed once at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleOutcome {
    /// Goal reached; funds released to the wallet.
    Successful,
    /// Goal missed; contributors may claim refunds.
    Refunding,
}

impl fmt::Display for SaleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaleOutcome::Successful => write!(f, "successful"),
            SaleOutcome::Refunding => write!(f, "refunding"),
        }
    }
}

impl FromStr for SaleOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "successful" => Ok(SaleOutcome::Successful),
            "refunding" => Ok(SaleOutcome::Refunding),
            other => Err(ValidationError::InconsistentSnapshot {
                reason: format!("unknown sale outcome '{}'", other),
            }),
        }
    }
}

/// The phase of the sale as observed at a point in time.
///
/// ## Lifecycle
/// ```text
///   now < opening        opening ≤ now ≤ closing      now > closing
///  ┌─────────┐          ┌──────────┐                ┌──────────┐
///  │ Pending │ ───────► │   Open   │ ─────────────► │  Closed  │
///  └─────────┘   time   └──────────┘      time      └────┬─────┘
///                                                        │ finalize()
///                                                        ▼
///                                           ┌──────────────────────────┐
///                                           │ Finalized(Successful |   │
///                                           │           Refunding)     │
///                                           └──────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalePhase {
    Pending,
    Open,
    Closed,
    Finalized(SaleOutcome),
}

impl fmt::Display for SalePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SalePhase::Pending => write!(f, "pending"),
            SalePhase::Open => write!(f, "open"),
            SalePhase::Closed => write!(f, "closed"),
            SalePhase::Finalized(outcome) => write!(f, "finalized ({})", outcome),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// Result of one successful purchase.
///
/// `payment_amount == net_payment + refund_amount` always holds; the refund
/// is owed back to the payer by the host that accepted the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Unique identifier (UUID v4).
    pub id: Uuid,
    pub payer: Address,
    pub beneficiary: Address,
    /// Amount sent with the purchase.
    pub payment_amount: FundsAmount,
    /// Amount kept and deposited into escrow.
    pub net_payment: FundsAmount,
    pub tokens_allocated: TokenAmount,
    /// Unspent amount returned to the payer.
    pub refund_amount: FundsAmount,
    pub purchased_at: DateTime<Utc>,
}

/// A refund paid out of the vault after a failed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub payer: Address,
    pub amount: FundsAmount,
    pub refunded_at: DateTime<Utc>,
}

// =============================================================================
// Events
// =============================================================================

/// Business events emitted after each committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SaleEvent {
    TokensPurchased {
        payer: Address,
        beneficiary: Address,
        net_payment: FundsAmount,
        tokens: TokenAmount,
    },
    RateChanged {
        old_rate: Rate,
        new_rate: Rate,
    },
    AllowListed {
        who: Address,
    },
    AllowListRemoved {
        who: Address,
    },
    Finalized {
        outcome: SaleOutcome,
        raised_total: FundsAmount,
    },
    VaultClosed {
        forwarded: FundsAmount,
    },
    RefundsEnabled,
    Refunded {
        payer: Address,
        amount: FundsAmount,
    },
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_and_parse() {
        let addr = Address::repeat_byte(0xab);
        let text = addr.to_string();
        assert_eq!(text, format!("0x{}", "ab".repeat(20)));
        assert_eq!(text.parse::<Address>().unwrap(), addr);

        // Bare hex is accepted as well
        assert_eq!("ab".repeat(20).parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_address_parse_errors() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!(format!("0x{}", "zz".repeat(20)).parse::<Address>().is_err());
    }

    #[test]
    fn test_zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::repeat_byte(1).is_zero());
        assert_eq!(Address::default(), Address::ZERO);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SalePhase::Open.to_string(), "open");
        assert_eq!(
            SalePhase::Finalized(SaleOutcome::Refunding).to_string(),
            "finalized (refunding)"
        );
    }

    #[test]
    fn test_outcome_round_trip_text() {
        for outcome in [SaleOutcome::Successful, SaleOutcome::Refunding] {
            assert_eq!(outcome.to_string().parse::<SaleOutcome>().unwrap(), outcome);
        }
        assert!("won".parse::<SaleOutcome>().is_err());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SaleEvent::Refunded {
            payer: Address::repeat_byte(1),
            amount: FundsAmount::new(5),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "refunded");
        assert_eq!(json["amount"], "5");
    }
}
