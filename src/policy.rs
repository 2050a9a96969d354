//! Purchase policy: fixed retry/timeout constants and the resolved policy value
//! shared read-only by every account job.

use alloy::primitives::{Address, U256};
use std::time::Duration;

/// Additional attempts per tier after the initial one.
pub const ATTEMPTS_PER_TIER: u32 = 5;

/// Pause between two purchase attempts on the same tier.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Confirmation wait for a purchase transaction.
pub const PURCHASE_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Confirmation wait for a spending approval transaction.
pub const APPROVAL_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound of a single sleep while waiting for the release timestamp.
pub const RELEASE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Period of the countdown line.
pub const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(60);

/// Gas units assumed when checking the native balance against the fee cap.
pub const ESTIMATED_GAS_LIMIT: u64 = 500_000;

/// Confirmations required before a transaction counts as landed.
pub const REQUIRED_CONFIRMATIONS: u64 = 1;

/// Decimals of the payment asset (USDC).
pub const PAYMENT_DECIMALS: u8 = 6;

/// Decimals of the native currency (ETH).
pub const NATIVE_DECIMALS: u8 = 18;

/// EIP-1559 fee parameters applied to every purchase transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSettings {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl FeeSettings {
    /// Worst-case native cost of one transaction with `gas_limit` units.
    pub fn max_gas_cost(&self, gas_limit: u64) -> U256 {
        U256::from(gas_limit) * U256::from(self.max_fee_per_gas)
    }
}

/// Everything a job needs to know about the sale besides its own account.
#[derive(Debug, Clone)]
pub struct PurchasePolicy {
    pub stop_on_first_purchase: bool,
    pub release_at_ms: u64,
    pub sale_contract: Address,
    pub payment_token: Address,
    pub referral_code: String,
    pub fees: FeeSettings,
    pub attempts_per_tier: u32,
    pub retry_backoff: Duration,
    pub purchase_confirmation_timeout: Duration,
    pub approval_confirmation_timeout: Duration,
    pub release_poll_interval: Duration,
    pub estimated_gas_limit: u64,
}

impl PurchasePolicy {
    /// Policy with the built-in constants and the given sale parameters.
    pub fn new(
        release_at_ms: u64,
        sale_contract: Address,
        payment_token: Address,
        fees: FeeSettings,
    ) -> Self {
        Self {
            stop_on_first_purchase: false,
            release_at_ms,
            sale_contract,
            payment_token,
            referral_code: String::new(),
            fees,
            attempts_per_tier: ATTEMPTS_PER_TIER,
            retry_backoff: RETRY_BACKOFF,
            purchase_confirmation_timeout: PURCHASE_CONFIRMATION_TIMEOUT,
            approval_confirmation_timeout: APPROVAL_CONFIRMATION_TIMEOUT,
            release_poll_interval: RELEASE_POLL_INTERVAL,
            estimated_gas_limit: ESTIMATED_GAS_LIMIT,
        }
    }

    /// Total number of submissions a tier may see (initial + retries).
    pub fn total_attempts(&self) -> u32 {
        self.attempts_per_tier + 1
    }
}
