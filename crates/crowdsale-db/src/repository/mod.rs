//! # Repository Module
//!
//! Database repositories for the crowdsale.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database                                                               │
//! │  ├── sale_state()  → SaleStateRepository   single snapshot row          │
//! │  ├── purchases()   → PurchaseRepository    append-only journal          │
//! │  ├── refunds()     → RefundRepository      append-only journal          │
//! │  ├── allow_list()  → AllowListRepository   latest decision per address  │
//! │  └── persist(snapshot, entry)              one transaction for both     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each repository has pool-backed methods for ordinary use and
//! connection-level `*_with` functions that [`crate::Database::persist`]
//! composes inside a transaction.
//!
//! Amounts are stored as decimal text because they are `u128`.

pub mod allowlist;
pub mod purchase;
pub mod refund;
pub mod sale;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt::Display;
use std::str::FromStr;

use crowdsale_core::{Address, PurchaseRecord, RefundRecord};

use crate::error::{DbError, DbResult};

/// Journal row written together with a snapshot.
#[derive(Debug, Clone)]
pub enum JournalEntry<'a> {
    /// Snapshot only (rate change, finalize, no-op allow-list edits).
    None,
    Purchase(&'a PurchaseRecord),
    Refund(&'a RefundRecord),
    AllowList { addresses: Vec<Address>, listed: bool },
}

/// Reads a text column and parses it into a domain type.
pub(crate) fn parse_column<T>(row: &SqliteRow, column: &str) -> DbResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    let text: String = row.try_get(column)?;
    text.parse::<T>()
        .map_err(|e| DbError::invalid_data(column, format!("'{}': {}", text, e)))
}
