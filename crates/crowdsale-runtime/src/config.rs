//! # Crowdsale Configuration
//!
//! Loads the sale parameters, database location and log filter.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CROWDSALE_RATE=13                                                  │
//! │     CROWDSALE_DB_PATH=/var/lib/crowdsale/sale.db                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/crowdsale/crowdsale.toml (Linux)                         │
//! │     ~/Library/Application Support/io.crowdsale.crowdsale/ (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     standard tiers, 18 decimals, rate 13                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [sale]
//! owner = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
//! wallet = "0xcccccccccccccccccccccccccccccccccccccccc"
//! token_holder = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
//! rate = "13"
//! goal = "5000000000000000000000"
//! initial_supply_tokens = 350000000
//! decimals = 18
//! opening_time = "2026-05-01T00:00:00Z"
//! closing_time = "2026-05-31T00:00:00Z"
//! allow_list = ["0x0101010101010101010101010101010101010101"]
//!
//! # Optional, highest tier first. Omit for the standard seven tiers.
//! [[tiers]]
//! lower_bound_tokens = 1000
//! multiplier_num = 10
//! multiplier_den = 13
//!
//! [[tiers]]
//! lower_bound_tokens = 0
//! multiplier_num = 1
//! multiplier_den = 1
//!
//! [database]
//! path = "/var/lib/crowdsale/sale.db"
//! max_connections = 5
//!
//! [logging]
//! filter = "info,crowdsale=debug,sqlx=warn"
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crowdsale_core::{
    Address, FundsAmount, Rate, SaleParams, Tier, TierTable, TokenAmount, TOKEN_DECIMALS,
};
use crowdsale_db::DbConfig;

use crate::error::{RuntimeError, RuntimeResult};

// =============================================================================
// Sale Settings
// =============================================================================

/// Parameters of the sale itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSettings {
    /// Address allowed to finalize, change the rate and edit the allow-list.
    #[serde(default = "zero_address")]
    pub owner: Address,

    /// Where the escrow forwards funds after a successful sale.
    #[serde(default = "zero_address")]
    pub wallet: Address,

    /// Account the sold tokens are transferred from.
    #[serde(default = "zero_address")]
    pub token_holder: Address,

    /// Base rate in payment units per token unit.
    #[serde(default = "default_rate")]
    pub rate: FundsAmount,

    /// Funding goal in payment units.
    #[serde(default)]
    pub goal: FundsAmount,

    /// Tokens offered, in whole tokens.
    #[serde(default = "default_initial_supply")]
    pub initial_supply_tokens: u64,

    #[serde(default = "default_decimals")]
    pub decimals: u32,

    /// RFC 3339, inclusive.
    #[serde(default)]
    pub opening_time: DateTime<Utc>,

    /// RFC 3339, inclusive.
    #[serde(default)]
    pub closing_time: DateTime<Utc>,

    /// Beneficiaries allowed to buy from the start.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_list: Vec<Address>,
}

fn zero_address() -> Address {
    Address::ZERO
}

fn default_rate() -> FundsAmount {
    FundsAmount::new(13)
}

fn default_initial_supply() -> u64 {
    350_000_000
}

fn default_decimals() -> u32 {
    TOKEN_DECIMALS
}

impl Default for SaleSettings {
    fn default() -> Self {
        SaleSettings {
            owner: zero_address(),
            wallet: zero_address(),
            token_holder: zero_address(),
            rate: default_rate(),
            goal: FundsAmount::ZERO,
            initial_supply_tokens: default_initial_supply(),
            decimals: default_decimals(),
            opening_time: DateTime::<Utc>::default(),
            closing_time: DateTime::<Utc>::default(),
            allow_list: Vec::new(),
        }
    }
}

// =============================================================================
// Tier Settings
// =============================================================================

/// One row of a custom tier table.
///
/// Rows are listed highest first. Each row's upper bound is the previous
/// row's lower bound; the first row is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSettings {
    /// Inclusive lower bound of remaining supply, in whole tokens.
    pub lower_bound_tokens: u64,
    pub multiplier_num: u64,
    pub multiplier_den: u64,
}

// =============================================================================
// Database & Logging Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

pub(crate) fn default_filter() -> String {
    "info,crowdsale=debug,sqlx=warn".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_filter(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdsaleConfig {
    #[serde(default)]
    pub sale: SaleSettings,

    /// Custom tier table; empty selects the standard one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<TierSettings>,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl CrowdsaleConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (crowdsale.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> RuntimeResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading crowdsale config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    ///
    /// The defaults leave every address unset, so the result only passes
    /// [`validate`](Self::validate) once those are filled in.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load crowdsale config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> RuntimeResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| RuntimeError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Crowdsale config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> RuntimeResult<()> {
        let sale = &self.sale;

        for (field, address) in [
            ("sale.owner", sale.owner),
            ("sale.wallet", sale.wallet),
            ("sale.token_holder", sale.token_holder),
        ] {
            if address.is_zero() {
                return Err(RuntimeError::InvalidConfig(format!("{} must be set", field)));
            }
        }

        if sale.rate.is_zero() {
            return Err(RuntimeError::InvalidConfig(
                "sale.rate must be greater than 0".into(),
            ));
        }

        if sale.initial_supply_tokens == 0 {
            return Err(RuntimeError::InvalidConfig(
                "sale.initial_supply_tokens must be greater than 0".into(),
            ));
        }

        if sale.closing_time < sale.opening_time {
            return Err(RuntimeError::InvalidConfig(format!(
                "sale.closing_time ({}) is before sale.opening_time ({})",
                sale.closing_time, sale.opening_time
            )));
        }

        if self.database.max_connections == 0 {
            return Err(RuntimeError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        // Builds the tier table and checks every tier prices above zero.
        let params = self.to_sale_params()?;
        params
            .tiers
            .validate_rate(params.rate)
            .map_err(|e| RuntimeError::InvalidConfig(e.to_string()))?;

        Ok(())
    }

    /// Applies `CROWDSALE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse_into<T: std::str::FromStr>(key: &str, value: &str, slot: &mut T) {
            match value.parse() {
                Ok(parsed) => {
                    debug!(key, value, "Overriding setting from environment");
                    *slot = parsed;
                }
                Err(_) => warn!(key, value, "Ignoring unparsable environment override"),
            }
        }

        let sale = &mut self.sale;
        if let Some(v) = lookup("CROWDSALE_OWNER") {
            parse_into("CROWDSALE_OWNER", &v, &mut sale.owner);
        }
        if let Some(v) = lookup("CROWDSALE_WALLET") {
            parse_into("CROWDSALE_WALLET", &v, &mut sale.wallet);
        }
        if let Some(v) = lookup("CROWDSALE_TOKEN_HOLDER") {
            parse_into("CROWDSALE_TOKEN_HOLDER", &v, &mut sale.token_holder);
        }
        if let Some(v) = lookup("CROWDSALE_RATE") {
            parse_into("CROWDSALE_RATE", &v, &mut sale.rate);
        }
        if let Some(v) = lookup("CROWDSALE_GOAL") {
            parse_into("CROWDSALE_GOAL", &v, &mut sale.goal);
        }
        if let Some(v) = lookup("CROWDSALE_OPENING_TIME") {
            parse_into("CROWDSALE_OPENING_TIME", &v, &mut sale.opening_time);
        }
        if let Some(v) = lookup("CROWDSALE_CLOSING_TIME") {
            parse_into("CROWDSALE_CLOSING_TIME", &v, &mut sale.closing_time);
        }

        if let Some(path) = lookup("CROWDSALE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(v) = lookup("CROWDSALE_DB_MAX_CONNECTIONS") {
            parse_into("CROWDSALE_DB_MAX_CONNECTIONS", &v, &mut self.database.max_connections);
        }

        if let Some(filter) = lookup("CROWDSALE_LOG") {
            self.logging.filter = filter;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "crowdsale", "crowdsale")
            .map(|dirs| dirs.config_dir().join("crowdsale.toml"))
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Builds the tier table for the configured token decimals.
    pub fn tier_table(&self) -> RuntimeResult<TierTable> {
        let invalid = |e: &dyn std::fmt::Display| RuntimeError::InvalidConfig(e.to_string());

        if self.tiers.is_empty() {
            return TierTable::standard(self.sale.decimals).map_err(|e| invalid(&e));
        }

        let mut tiers = Vec::with_capacity(self.tiers.len());
        let mut upper = TokenAmount::MAX;
        for row in &self.tiers {
            let lower = TokenAmount::from_whole(u128::from(row.lower_bound_tokens), self.sale.decimals)
                .map_err(|e| invalid(&e))?;
            tiers.push(Tier::new(
                lower,
                upper,
                u128::from(row.multiplier_num),
                u128::from(row.multiplier_den),
            ));
            upper = lower;
        }

        TierTable::new(tiers).map_err(|e| invalid(&e))
    }

    /// Converts the `[sale]` and `[[tiers]]` sections into sale parameters.
    pub fn to_sale_params(&self) -> RuntimeResult<SaleParams> {
        let sale = &self.sale;
        let initial_supply =
            TokenAmount::from_whole(u128::from(sale.initial_supply_tokens), sale.decimals)
                .map_err(|e| RuntimeError::InvalidConfig(format!("sale.initial_supply_tokens: {}", e)))?;

        Ok(SaleParams {
            owner: sale.owner,
            token_holder: sale.token_holder,
            rate: Rate::new(sale.rate.get()),
            goal: sale.goal,
            initial_supply,
            opening_time: sale.opening_time,
            closing_time: sale.closing_time,
            tiers: self.tier_table()?,
        })
    }

    /// Resolves the database file, falling back to the platform data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("io", "crowdsale", "crowdsale")
                .map(|dirs| dirs.data_dir().join("crowdsale.db"))
                .unwrap_or_else(|| PathBuf::from("crowdsale.db"))
        })
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path()).max_connections(self.database.max_connections)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn configured() -> CrowdsaleConfig {
        let mut config = CrowdsaleConfig::default();
        config.sale.owner = Address::repeat_byte(0xaa);
        config.sale.wallet = Address::repeat_byte(0xcc);
        config.sale.token_holder = Address::repeat_byte(0xbb);
        config.sale.goal = FundsAmount::new(5_000);
        config.sale.opening_time = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        config.sale.closing_time = Utc.with_ymd_and_hms(2026, 5, 31, 0, 0, 0).unwrap();
        config
    }

    #[test]
    fn test_default_config() {
        let config = CrowdsaleConfig::default();
        assert_eq!(config.sale.rate, FundsAmount::new(13));
        assert_eq!(config.sale.decimals, 18);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.filter, "info,crowdsale=debug,sqlx=warn");

        // Addresses are left for the operator to fill in
        assert!(matches!(
            config.validate(),
            Err(RuntimeError::InvalidConfig(msg)) if msg.contains("sale.owner")
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(configured().validate().is_ok());

        let mut config = configured();
        config.sale.rate = FundsAmount::ZERO;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.sale.closing_time = config.sale.opening_time - chrono::Duration::seconds(1);
        assert!(config.validate().is_err());

        // 1 × 10/13 rounds to a zero price in the top tier
        let mut config = configured();
        config.sale.rate = FundsAmount::new(1);
        assert!(config.validate().is_err());

        let mut config = configured();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [sale]
            owner = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
            wallet = "0xcccccccccccccccccccccccccccccccccccccccc"
            token_holder = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
            rate = "26"
            goal = "5000000000000000000000"
            initial_supply_tokens = 1000
            decimals = 0
            opening_time = "2026-05-01T00:00:00Z"
            closing_time = "2026-05-31T00:00:00Z"
            allow_list = ["0x0101010101010101010101010101010101010101"]

            [[tiers]]
            lower_bound_tokens = 500
            multiplier_num = 10
            multiplier_den = 13

            [[tiers]]
            lower_bound_tokens = 0
            multiplier_num = 1
            multiplier_den = 1

            [database]
            path = "/tmp/sale.db"
        "#;

        let config: CrowdsaleConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sale.rate, FundsAmount::new(26));
        assert_eq!(config.sale.goal, FundsAmount::new(5_000_000_000_000_000_000_000));
        assert_eq!(config.sale.allow_list, vec![Address::repeat_byte(1)]);
        assert_eq!(config.database.max_connections, 5);

        let params = config.to_sale_params().unwrap();
        assert_eq!(params.rate, Rate::new(26));
        assert_eq!(params.initial_supply, TokenAmount::new(1_000));

        let tiers = params.tiers.tiers();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].lower_bound, TokenAmount::new(500));
        assert_eq!(tiers[0].upper_bound, TokenAmount::MAX);
        assert_eq!(tiers[1].upper_bound, TokenAmount::new(500));
    }

    #[test]
    fn test_tier_rows_must_descend_to_zero() {
        let mut config = configured();
        config.tiers = vec![
            TierSettings { lower_bound_tokens: 0, multiplier_num: 1, multiplier_den: 1 },
            TierSettings { lower_bound_tokens: 500, multiplier_num: 10, multiplier_den: 13 },
        ];
        assert!(matches!(config.tier_table(), Err(RuntimeError::InvalidConfig(_))));
    }

    #[test]
    fn test_standard_tiers_when_none_configured() {
        let params = configured().to_sale_params().unwrap();
        assert_eq!(params.tiers, TierTable::standard(18).unwrap());
        assert_eq!(
            params.initial_supply,
            TokenAmount::from_whole(350_000_000, 18).unwrap()
        );
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("CROWDSALE_RATE", "26"),
            ("CROWDSALE_OWNER", "0x0202020202020202020202020202020202020202"),
            ("CROWDSALE_CLOSING_TIME", "2026-06-30T00:00:00Z"),
            ("CROWDSALE_DB_PATH", "/srv/sale.db"),
            ("CROWDSALE_DB_MAX_CONNECTIONS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = configured();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.sale.rate, FundsAmount::new(26));
        assert_eq!(config.sale.owner, Address::repeat_byte(2));
        assert_eq!(
            config.sale.closing_time,
            Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap()
        );
        assert_eq!(config.database_path(), PathBuf::from("/srv/sale.db"));
        // Unparsable values leave the setting alone
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "crowdsale-config-test-{}.toml",
            std::process::id()
        ));
        let config = configured();

        config.save(Some(path.clone())).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded: CrowdsaleConfig = toml::from_str(&contents).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_db_config() {
        let mut config = configured();
        config.database.path = Some(PathBuf::from("/tmp/x.db"));
        config.database.max_connections = 3;

        let db = config.db_config();
        assert_eq!(db.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(db.max_connections, 3);
    }
}
