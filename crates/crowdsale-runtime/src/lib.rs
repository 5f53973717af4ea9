//! # crowdsale-runtime: Host Environment for the Crowdsale
//!
//! Loads configuration, installs logging and runs a sale behind an async
//! mutex with every committed operation persisted to SQLite.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CrowdsaleConfig::load(path)      file → CROWDSALE_* env → validate     │
//! │          │                                                              │
//! │          ├──► init_tracing(&config.logging.filter)                      │
//! │          ├──► Database::new(config.db_config())                         │
//! │          ▼                                                              │
//! │  SaleService::start(db, config.to_sale_params()?, collaborators)        │
//! │          │   stored snapshot? resume : create + store                   │
//! │          ▼                                                              │
//! │  service.buy_tokens(..) / finalize(..) / claim_refund(..)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crowdsale_core::{AllowanceLedger, SystemClock};
//! use crowdsale_db::Database;
//! use crowdsale_runtime::{init_tracing, Collaborators, CrowdsaleConfig, SaleService};
//!
//! let config = CrowdsaleConfig::load(None)?;
//! init_tracing(&config.logging.filter)?;
//!
//! let db = Database::new(config.db_config()).await?;
//! let parts = Collaborators::in_memory(&config, token_ledger, SystemClock);
//! let service = SaleService::start(db, config.to_sale_params()?, parts).await?;
//!
//! let record = service.buy_tokens(payer, beneficiary, payment).await?;
//! ```

pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

pub use config::{CrowdsaleConfig, DatabaseSettings, LoggingSettings, SaleSettings, TierSettings};
pub use error::{RuntimeError, RuntimeResult};
pub use service::{Collaborators, SaleService};
pub use telemetry::{build_filter, init_tracing};
