//! Tier Purchase Executor
//!
//! Buys `quantity` units of one tier for one account. The purchase
//! transaction is signed once and the same signed payload is rebroadcast on
//! every retry, so a retry never competes with (or invalidates) an earlier
//! submission that may still land.

use std::sync::Arc;

use alloy::primitives::B256;
use alloy::signers::local::PrivateKeySigner;
use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::errors::{GatewayError, PurchaseError};
use crate::gateway::{ChainGateway, PurchaseCall, SignedTx, UnsignedTx};
use crate::metrics::{metrics, Timer};
use crate::policy::{PurchasePolicy, REQUIRED_CONFIRMATIONS};
use crate::structured_logging::AccountLogger;
use crate::tiers::Tier;

/// Confirmed purchase of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierReceipt {
    pub tx_hash: B256,
    /// Submissions made, the successful one included
    pub attempts: u32,
}

pub struct TierPurchaseExecutor<G: ?Sized> {
    gateway: Arc<G>,
    policy: Arc<PurchasePolicy>,
}

impl<G> TierPurchaseExecutor<G>
where
    G: ChainGateway + ?Sized,
{
    pub fn new(gateway: Arc<G>, policy: Arc<PurchasePolicy>) -> Self {
        Self { gateway, policy }
    }

    /// Attempt the purchase up to `attempts_per_tier + 1` times.
    ///
    /// Returns on the first confirmation. Every failure, a revert included,
    /// is retried with the same signed payload until the budget is spent.
    #[instrument(skip_all, fields(account = %account.address(), tier = %tier.id))]
    pub async fn purchase(
        &self,
        account: &PrivateKeySigner,
        tier: &Tier,
        quantity: u64,
    ) -> Result<TierReceipt, PurchaseError> {
        let logger = AccountLogger::new(account.address());
        let total_attempts = self.policy.total_attempts();
        let mut signed: Option<SignedTx> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            metrics().purchase_attempts.inc();

            match self.attempt(account, tier, quantity, &mut signed).await {
                Ok(tx_hash) => {
                    metrics().purchases_succeeded.inc();
                    logger.log_tier_success(tier, quantity, tx_hash);
                    return Ok(TierReceipt {
                        tx_hash,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    logger.log_attempt_failed(tier, attempt, &e.to_string());
                    if attempt >= total_attempts {
                        metrics().purchases_failed.inc();
                        return Err(PurchaseError {
                            tier: tier.id.to_string(),
                            attempts: attempt,
                            last: e,
                        });
                    }
                    sleep(self.policy.retry_backoff).await;
                }
            }
        }
    }

    /// One submission of the cached payload, building it first if needed.
    async fn attempt(
        &self,
        account: &PrivateKeySigner,
        tier: &Tier,
        quantity: u64,
        cached: &mut Option<SignedTx>,
    ) -> Result<B256, GatewayError> {
        let tx = match cached.take() {
            Some(tx) => tx,
            None => self.build_signed(account, tier, quantity).await?,
        };
        let tx = &*cached.insert(tx);

        let handle = match self.gateway.submit(tx).await {
            Ok(handle) => handle,
            Err(err @ GatewayError::NonceTooLow(_)) => return self.reconcile(tx.hash, err).await,
            Err(err) => return Err(err),
        };
        let timer = Timer::new();
        self.gateway
            .await_confirmation(
                handle,
                REQUIRED_CONFIRMATIONS,
                self.policy.purchase_confirmation_timeout,
            )
            .await?;
        timer.observe_duration(&metrics().confirmation_latency);
        Ok(handle.hash)
    }

    /// A stale nonce on resend may mean an earlier submission of this same
    /// payload landed after its confirmation wait gave up.
    async fn reconcile(&self, hash: B256, refused: GatewayError) -> Result<B256, GatewayError> {
        match self.gateway.receipt_status(hash).await {
            Ok(Some(true)) => {
                debug!(tx = %hash, "Resend refused but the payload is already mined");
                Ok(hash)
            }
            Ok(Some(false)) => Err(GatewayError::Reverted(hash)),
            Ok(None) | Err(_) => Err(refused),
        }
    }

    async fn build_signed(
        &self,
        account: &PrivateKeySigner,
        tier: &Tier,
        quantity: u64,
    ) -> Result<SignedTx, GatewayError> {
        let call = PurchaseCall {
            tier_id: tier.id.to_string(),
            quantity,
            proof: Vec::new(),
            referral_code: self.policy.referral_code.clone(),
            allocation: quantity,
        };
        let input = self.gateway.build_purchase_call(&call)?;
        let unsigned = UnsignedTx {
            to: self.policy.sale_contract,
            input,
            max_fee_per_gas: self.policy.fees.max_fee_per_gas,
            max_priority_fee_per_gas: self.policy.fees.max_priority_fee_per_gas,
        };
        self.gateway.sign(account, &unsigned).await
    }
}
