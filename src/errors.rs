//! Error taxonomy.
//!
//! Errors are resolved at the narrowest scope that can contain them:
//! a [`GatewayError`] belongs to one attempt, a [`PurchaseError`] to one tier,
//! a [`PrepareError`] to one account. Only [`ConfigError`] stops the run, and
//! only before any job has started.

use alloy::primitives::{B256, U256};
use thiserror::Error;

use crate::tiers::TierSelectionError;

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("max priority fee per gas ({priority} wei) cannot exceed max fee per gas ({max} wei)")]
    PriorityFeeExceedsMaxFee { priority: u128, max: u128 },

    #[error("line {line}: private key is invalid")]
    InvalidCredential { line: usize },

    #[error("line {line}: {source}")]
    InvalidTierRange {
        line: usize,
        #[source]
        source: TierSelectionError,
    },

    #[error("account list is empty, fill in the accounts file and restart")]
    NoAccounts,
}

/// Failure of a single Chain Gateway call.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Transport-level errors (network, connection, HTTP)
    #[error("transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// The node refused the transaction or call
    #[error("rejected: {0}")]
    Rejected(String),

    /// The sender's nonce has moved past the transaction's nonce
    #[error("nonce too low: {0}")]
    NonceTooLow(String),

    /// The node already holds this exact transaction in its pool
    #[error("transaction {0} already known")]
    AlreadyKnown(B256),

    /// Confirmation wait elapsed; the transaction may still land
    #[error("confirmation timed out after {timeout_ms}ms (tx: {tx_hash})")]
    Timeout { tx_hash: B256, timeout_ms: u64 },

    /// Included on chain with a failed status
    #[error("transaction {0} reverted")]
    Reverted(B256),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("no endpoints configured")]
    NoEndpoints,
}

impl GatewayError {
    /// Short label of the terminal cause, used in status lines.
    pub fn cause(&self) -> &'static str {
        match self {
            GatewayError::Transport { .. } | GatewayError::NoEndpoints => "network",
            GatewayError::Rejected(_)
            | GatewayError::NonceTooLow(_)
            | GatewayError::AlreadyKnown(_) => "rejected",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Reverted(_) => "reverted",
            GatewayError::Encoding(_) | GatewayError::Signing(_) => "build",
        }
    }
}

/// Account-level preparation outcome that stops the job.
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("insufficient funds: required {required}, balance {balance}")]
    InsufficientFunds { required: U256, balance: U256 },

    #[error("preparation failed: {0}")]
    Gateway(#[from] GatewayError),
}

impl PrepareError {
    /// Amount missing to cover the computed maximum cost.
    pub fn shortfall(&self) -> Option<U256> {
        match self {
            PrepareError::InsufficientFunds { required, balance } => {
                Some(required.saturating_sub(*balance))
            }
            PrepareError::Gateway(_) => None,
        }
    }
}

/// A tier that could not be bought within the attempt budget.
#[derive(Debug, Error)]
#[error("tier {tier} failed after {attempts} attempt(s): {last}")]
pub struct PurchaseError {
    pub tier: String,
    pub attempts: u32,
    #[source]
    pub last: GatewayError,
}

impl PurchaseError {
    pub fn cause(&self) -> &'static str {
        self.last.cause()
    }
}
