//! Configuration module
//!
//! Loads `config.toml`, applies `.env`/environment overrides and validates
//! the result once at startup. Every field has a default matching the public
//! sale on Arbitrum One, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::utils::{parse_units, ParseUnits};
use alloy::primitives::Address;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ConfigError;
use crate::policy::{self, FeeSettings, PurchasePolicy};

/// Environment variable overriding `sale.start_time` (RFC 3339)
pub const ENV_START_TIME: &str = "SALEBOT_START_TIME";
/// Environment variable overriding `chain.endpoints` (comma separated)
pub const ENV_RPC_ENDPOINTS: &str = "SALEBOT_RPC_ENDPOINTS";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sale: SaleConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub fees: FeeConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub accounts: AccountsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleConfig {
    /// Sale opening time
    #[serde(default = "default_start_time")]
    pub start_time: DateTime<Utc>,

    /// How early before `start_time` purchases are released, in milliseconds
    #[serde(default = "default_lead_time_ms")]
    pub lead_time_ms: u64,

    /// Stop an account after its first successful tier
    #[serde(default)]
    pub stop_on_first_purchase: bool,

    #[serde(default = "default_sale_contract")]
    pub sale_contract: String,

    /// ERC-20 used to pay for the tiers
    #[serde(default = "default_payment_token")]
    pub payment_token: String,

    #[serde(default = "default_referral_code")]
    pub referral_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Redundant RPC endpoints, queried in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Delay before the next endpoint is also queried
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,

    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,

    /// Fixed gas limit for every transaction; estimated when absent
    #[serde(default)]
    pub gas_limit: Option<u64>,
}

/// Fee caps in gwei, as decimal strings so sub-gwei values (`"0.05"`) fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "default_max_fee_gwei")]
    pub max_fee_gwei: String,

    #[serde(default = "default_max_priority_fee_gwei")]
    pub max_priority_fee_gwei: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial purchase attempt
    #[serde(default = "default_attempts_per_tier")]
    pub attempts_per_tier: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_purchase_confirmation_timeout_secs")]
    pub purchase_confirmation_timeout_secs: u64,

    #[serde(default = "default_approval_confirmation_timeout_secs")]
    pub approval_confirmation_timeout_secs: u64,

    #[serde(default = "default_release_poll_interval_secs")]
    pub release_poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    #[serde(default = "default_accounts_file")]
    pub file: PathBuf,
}

// Default value functions
fn default_start_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_731_499_200, 0).single().unwrap_or_default()
}
fn default_lead_time_ms() -> u64 { 3_000 }
fn default_sale_contract() -> String { "0x23d73C47AddC85dcDCE321736b12078fafD88640".to_string() }
fn default_payment_token() -> String { "0xaf88d065e77c8cC2239327C5EDb3A432268e5831".to_string() }
fn default_referral_code() -> String { "oduvanchik".to_string() }
fn default_chain_id() -> u64 { 42161 }
fn default_endpoints() -> Vec<String> {
    [
        "https://rpc.ankr.com/arbitrum",
        "https://arbitrum.llamarpc.com",
        "https://arbitrum.drpc.org",
        "https://arbitrum.blockpi.network/v1/rpc/public",
        "https://arb1.arbitrum.io/rpc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_stall_timeout_ms() -> u64 { 500 }
fn default_receipt_poll_interval_ms() -> u64 { 250 }
fn default_max_fee_gwei() -> String { "10".to_string() }
fn default_max_priority_fee_gwei() -> String { "6".to_string() }
fn default_attempts_per_tier() -> u32 { policy::ATTEMPTS_PER_TIER }
fn default_backoff_ms() -> u64 { policy::RETRY_BACKOFF.as_millis() as u64 }
fn default_purchase_confirmation_timeout_secs() -> u64 { policy::PURCHASE_CONFIRMATION_TIMEOUT.as_secs() }
fn default_approval_confirmation_timeout_secs() -> u64 { policy::APPROVAL_CONFIRMATION_TIMEOUT.as_secs() }
fn default_release_poll_interval_secs() -> u64 { policy::RELEASE_POLL_INTERVAL.as_secs() }
fn default_accounts_file() -> PathBuf { PathBuf::from("wallets.txt") }

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            start_time: default_start_time(),
            lead_time_ms: default_lead_time_ms(),
            stop_on_first_purchase: false,
            sale_contract: default_sale_contract(),
            payment_token: default_payment_token(),
            referral_code: default_referral_code(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            endpoints: default_endpoints(),
            stall_timeout_ms: default_stall_timeout_ms(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            gas_limit: None,
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            max_fee_gwei: default_max_fee_gwei(),
            max_priority_fee_gwei: default_max_priority_fee_gwei(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts_per_tier: default_attempts_per_tier(),
            backoff_ms: default_backoff_ms(),
            purchase_confirmation_timeout_secs: default_purchase_confirmation_timeout_secs(),
            approval_confirmation_timeout_secs: default_approval_confirmation_timeout_secs(),
            release_poll_interval_secs: default_release_poll_interval_secs(),
        }
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            file: default_accounts_file(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            warn!("Config file '{}' not found, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_START_TIME) {
            self.sale.start_time = DateTime::parse_from_rfc3339(raw.trim())
                .map_err(|e| ConfigError::InvalidValue {
                    field: ENV_START_TIME,
                    reason: e.to_string(),
                })?
                .with_timezone(&Utc);
        }

        if let Some(raw) = lookup(ENV_RPC_ENDPOINTS) {
            self.chain.endpoints = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    /// Startup validation; any error here aborts the run before a job starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fees = self.fee_settings()?;
        if fees.max_priority_fee_per_gas > fees.max_fee_per_gas {
            return Err(ConfigError::PriorityFeeExceedsMaxFee {
                priority: fees.max_priority_fee_per_gas,
                max: fees.max_fee_per_gas,
            });
        }

        if self.chain.endpoints.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "chain.endpoints",
                reason: "at least one RPC endpoint is required".into(),
            });
        }

        if self.retry.backoff_ms == 0 && self.retry.attempts_per_tier > 0 {
            warn!("retry.backoff_ms is 0, retries will be sent back to back");
        }

        parse_address("sale.sale_contract", &self.sale.sale_contract)?;
        parse_address("sale.payment_token", &self.sale.payment_token)?;
        Ok(())
    }

    /// Instant (ms since epoch) before which no purchase is submitted.
    pub fn release_at_ms(&self) -> u64 {
        let start = self.sale.start_time.timestamp_millis().max(0) as u64;
        start.saturating_sub(self.sale.lead_time_ms)
    }

    pub fn fee_settings(&self) -> Result<FeeSettings, ConfigError> {
        Ok(FeeSettings {
            max_fee_per_gas: parse_gwei("fees.max_fee_gwei", &self.fees.max_fee_gwei)?,
            max_priority_fee_per_gas: parse_gwei(
                "fees.max_priority_fee_gwei",
                &self.fees.max_priority_fee_gwei,
            )?,
        })
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.chain.stall_timeout_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.chain.receipt_poll_interval_ms)
    }

    /// Resolve the policy shared by every account job.
    pub fn purchase_policy(&self) -> Result<PurchasePolicy, ConfigError> {
        let mut policy = PurchasePolicy::new(
            self.release_at_ms(),
            parse_address("sale.sale_contract", &self.sale.sale_contract)?,
            parse_address("sale.payment_token", &self.sale.payment_token)?,
            self.fee_settings()?,
        );
        policy.stop_on_first_purchase = self.sale.stop_on_first_purchase;
        policy.referral_code = self.sale.referral_code.clone();
        policy.attempts_per_tier = self.retry.attempts_per_tier;
        policy.retry_backoff = Duration::from_millis(self.retry.backoff_ms);
        policy.purchase_confirmation_timeout =
            Duration::from_secs(self.retry.purchase_confirmation_timeout_secs);
        policy.approval_confirmation_timeout =
            Duration::from_secs(self.retry.approval_confirmation_timeout_secs);
        policy.release_poll_interval = Duration::from_secs(self.retry.release_poll_interval_secs.max(1));
        Ok(policy)
    }
}

fn parse_address(field: &'static str, raw: &str) -> Result<Address, ConfigError> {
    Address::from_str(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        field,
        reason: format!("{raw}: {e}"),
    })
}

/// Decimal gwei string to wei.
fn parse_gwei(field: &'static str, raw: &str) -> Result<u128, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue { field, reason };
    let wei = match parse_units(raw.trim(), "gwei").map_err(|e| invalid(format!("{raw}: {e}")))? {
        ParseUnits::U256(wei) => wei,
        ParseUnits::I256(_) => return Err(invalid(format!("{raw}: must not be negative"))),
    };
    u128::try_from(wei).map_err(|_| invalid(format!("{raw}: too large")))
}
