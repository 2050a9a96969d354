//! Account Preparer
//!
//! Per-account pipeline run before any purchase: funds check, spending
//! approval, native gas budget check and the release-time gate.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use tracing::debug;

use crate::accounts::AccountJob;
use crate::clock::Clock;
use crate::errors::PrepareError;
use crate::gateway::ChainGateway;
use crate::metrics::metrics;
use crate::policy::{PurchasePolicy, REQUIRED_CONFIRMATIONS};
use crate::structured_logging::AccountLogger;
use crate::tiers::Tier;

/// What preparation did for an account that is ready to purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preparation {
    pub max_cost: U256,
    pub approval_submitted: bool,
    pub low_native_balance: bool,
}

/// Maximum spend of a job.
///
/// When stopping after the first purchase only one tier can ever be bought,
/// so the most expensive one bounds the cost; otherwise every tier may be.
pub fn max_total_cost(tiers: &[Tier], quantity: u64, stop_on_first_purchase: bool) -> U256 {
    if stop_on_first_purchase {
        tiers
            .iter()
            .map(|t| t.cost(quantity))
            .max()
            .unwrap_or(U256::ZERO)
    } else {
        tiers
            .iter()
            .fold(U256::ZERO, |sum, t| sum.saturating_add(t.cost(quantity)))
    }
}

/// Block the calling job until `release_at_ms`, sleeping at most `poll` at a time.
///
/// Returns whether any waiting happened.
pub async fn wait_for_release<C: Clock + ?Sized>(clock: &C, release_at_ms: u64, poll: Duration) -> bool {
    let mut waited = false;
    loop {
        let now = clock.now_ms();
        if now >= release_at_ms {
            return waited;
        }
        let remaining = Duration::from_millis(release_at_ms - now);
        tokio::time::sleep(remaining.min(poll)).await;
        waited = true;
    }
}

pub struct AccountPreparer<G: ?Sized, C: ?Sized> {
    gateway: Arc<G>,
    clock: Arc<C>,
    policy: Arc<PurchasePolicy>,
}

impl<G, C> AccountPreparer<G, C>
where
    G: ChainGateway + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(gateway: Arc<G>, clock: Arc<C>, policy: Arc<PurchasePolicy>) -> Self {
        Self {
            gateway,
            clock,
            policy,
        }
    }

    /// Run the whole preparation pipeline; returns once the release time is reached.
    pub async fn prepare(&self, job: &AccountJob) -> Result<Preparation, PrepareError> {
        let logger = AccountLogger::new(job.address());
        let max_cost = max_total_cost(job.tiers(), job.quantity(), self.policy.stop_on_first_purchase);

        let balance = self
            .gateway
            .read_balance(job.address(), self.policy.payment_token)
            .await?;
        debug!(account = %job.address(), %balance, %max_cost, "Payment balance read");

        if max_cost > balance {
            let err = PrepareError::InsufficientFunds {
                required: max_cost,
                balance,
            };
            logger.log_funds_shortfall(err.shortfall().unwrap_or_default(), job.quantity());
            return Err(err);
        }

        let approval_submitted = self.ensure_approval(job, max_cost, &logger).await?;
        let low_native_balance = self.check_gas_budget(job, &logger).await?;

        if self.clock.now_ms() < self.policy.release_at_ms {
            logger.log_waiting_for_release(self.policy.release_at_ms);
            wait_for_release(
                self.clock.as_ref(),
                self.policy.release_at_ms,
                self.policy.release_poll_interval,
            )
            .await;
        }

        Ok(Preparation {
            max_cost,
            approval_submitted,
            low_native_balance,
        })
    }

    /// Raise the approval to `amount` when it is below it; never lowers it.
    pub async fn ensure_approval(
        &self,
        job: &AccountJob,
        amount: U256,
        logger: &AccountLogger,
    ) -> Result<bool, PrepareError> {
        let current = self
            .gateway
            .read_approval(job.address(), self.policy.sale_contract, self.policy.payment_token)
            .await?;
        if current >= amount {
            debug!(account = %job.address(), %current, "Approval already sufficient");
            return Ok(false);
        }

        let handle = self
            .gateway
            .submit_approval(
                job.signer(),
                self.policy.sale_contract,
                self.policy.payment_token,
                amount,
            )
            .await?;
        metrics().approvals_submitted.inc();
        logger.log_approval_submitted(amount, handle.hash);

        self.gateway
            .await_confirmation(
                handle,
                REQUIRED_CONFIRMATIONS,
                self.policy.approval_confirmation_timeout,
            )
            .await?;
        logger.log_approval_confirmed();
        Ok(true)
    }

    /// Warn when the native balance cannot cover the worst-case fee. Never fails the job.
    async fn check_gas_budget(&self, job: &AccountJob, logger: &AccountLogger) -> Result<bool, PrepareError> {
        let required = self.policy.fees.max_gas_cost(self.policy.estimated_gas_limit);
        let native = self.gateway.read_native_balance(job.address()).await?;
        if required > native {
            logger.log_low_native_balance(required - native);
            return Ok(true);
        }
        Ok(false)
    }
}
