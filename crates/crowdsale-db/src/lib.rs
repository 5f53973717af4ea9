//! # crowdsale-db: Persistence Layer for the Crowdsale
//!
//! Stores the sale snapshot plus purchase and refund journals in SQLite,
//! using sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleService (crowdsale-runtime)                                        │
//! │       │  after every committed operation                                │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  crowdsale-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │    Repositories    │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │◄───│ SaleStateRepository│  │ (embedded) │  │   │
//! │  │   │  SqlitePool   │    │ PurchaseRepository │  │ 001_init   │  │   │
//! │  │   │  persist()    │    │ RefundRepository   │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crowdsale_db::{Database, DbConfig, JournalEntry};
//!
//! let db = Database::new(DbConfig::new("crowdsale.db")).await?;
//! db.persist(&sale.snapshot(), JournalEntry::Purchase(&record)).await?;
//! let restored = db.sale_state().load().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::allowlist::AllowListRepository;
pub use repository::purchase::PurchaseRepository;
pub use repository::refund::RefundRepository;
pub use repository::sale::SaleStateRepository;
pub use repository::JournalEntry;
