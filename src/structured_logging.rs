//! Account-scoped status lines.
//!
//! Every human-facing message about an account goes through [`AccountLogger`]
//! so the account address is always attached as a structured field.

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, B256, U256};

use crate::policy::{NATIVE_DECIMALS, PAYMENT_DECIMALS};
use crate::tiers::Tier;

/// Render a base-unit amount with the given decimals, falling back to the raw integer.
pub fn display_units(amount: U256, decimals: u8) -> String {
    format_units(amount, decimals).unwrap_or_else(|_| amount.to_string())
}

#[derive(Debug, Clone)]
pub struct AccountLogger {
    account: Address,
}

impl AccountLogger {
    pub fn new(account: Address) -> Self {
        Self { account }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn log_funds_shortfall(&self, shortfall: U256, quantity: u64) {
        tracing::error!(
            account = %self.account,
            shortfall = %display_units(shortfall, PAYMENT_DECIMALS),
            quantity,
            "Not enough USDC to buy the selected tiers; adjust the quantity or tier range and restart"
        );
    }

    pub fn log_low_native_balance(&self, top_up: U256) {
        tracing::warn!(
            account = %self.account,
            suggested_top_up_eth = %display_units(top_up, NATIVE_DECIMALS),
            "ETH balance may not cover the configured fee; top up recommended"
        );
    }

    pub fn log_approval_submitted(&self, amount: U256, tx: B256) {
        tracing::info!(
            account = %self.account,
            amount = %display_units(amount, PAYMENT_DECIMALS),
            tx = %tx,
            "Approving USDC spending"
        );
    }

    pub fn log_approval_confirmed(&self) {
        tracing::info!(account = %self.account, "USDC approved");
    }

    pub fn log_waiting_for_release(&self, release_at_ms: u64) {
        tracing::info!(
            account = %self.account,
            release_at_ms,
            "Ready, waiting for the sale to start"
        );
    }

    pub fn log_tier_attempt(&self, tier: &Tier, quantity: u64) {
        tracing::info!(
            account = %self.account,
            tier = %tier.id,
            quantity,
            "Trying to buy tier"
        );
    }

    pub fn log_attempt_failed(&self, tier: &Tier, attempt: u32, error: &str) {
        tracing::debug!(
            account = %self.account,
            tier = %tier.id,
            attempt,
            error = %error,
            "Purchase attempt failed"
        );
    }

    pub fn log_tier_success(&self, tier: &Tier, quantity: u64, tx: B256) {
        tracing::info!(
            account = %self.account,
            tier = %tier.id,
            quantity,
            unit_price = %display_units(U256::from(tier.price), PAYMENT_DECIMALS),
            tx = %tx,
            "Purchase confirmed"
        );
    }

    pub fn log_tier_failure(&self, tier: &Tier, cause: &str, error: &str) {
        tracing::error!(
            account = %self.account,
            tier = %tier.id,
            cause = %cause,
            error = %error,
            "Could not buy tier"
        );
    }

    pub fn log_preparation_failed(&self, error: &str) {
        tracing::error!(
            account = %self.account,
            error = %error,
            "Account preparation failed"
        );
    }

    pub fn log_fault(&self, error: &str) {
        tracing::error!(
            account = %self.account,
            error = %error,
            "Account job crashed; other accounts are unaffected"
        );
    }
}
