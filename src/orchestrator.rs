//! Purchase Orchestrator
//!
//! Fans every account job out onto its own task. Inside a job, preparation
//! runs first and tiers are then attempted strictly one after another in
//! ascending order. Jobs share nothing but the read-only gateway, clock and
//! policy; a job that fails or panics is reported and its siblings keep going.

use std::any::Any;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use futures::future::join_all;
use tracing::info;

use crate::accounts::AccountJob;
use crate::clock::Clock;
use crate::errors::PrepareError;
use crate::gateway::ChainGateway;
use crate::metrics::metrics;
use crate::policy::PurchasePolicy;
use crate::preparer::AccountPreparer;
use crate::purchase::TierPurchaseExecutor;
use crate::structured_logging::AccountLogger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierOutcome {
    Purchased {
        tier: String,
        tx_hash: B256,
        attempts: u32,
    },
    Failed {
        tier: String,
        cause: &'static str,
        error: String,
    },
}

impl TierOutcome {
    pub fn is_purchased(&self) -> bool {
        matches!(self, TierOutcome::Purchased { .. })
    }

    pub fn tier(&self) -> &str {
        match self {
            TierOutcome::Purchased { tier, .. } | TierOutcome::Failed { tier, .. } => tier,
        }
    }
}

/// Terminal state of one account job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Purchasing ran; holds one entry per attempted tier, successful or not
    Done(Vec<TierOutcome>),
    /// Not enough payment asset for the computed maximum cost
    Aborted { shortfall: U256 },
    /// A gateway call failed during preparation
    PreparationFailed(String),
    /// The job panicked and was contained
    Faulted(String),
}

impl JobOutcome {
    pub fn purchased(&self) -> usize {
        match self {
            JobOutcome::Done(tiers) => tiers.iter().filter(|t| t.is_purchased()).count(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub account: Address,
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// In the order the jobs were given
    pub reports: Vec<JobReport>,
}

impl RunSummary {
    pub fn tiers_purchased(&self) -> usize {
        self.reports.iter().map(|r| r.outcome.purchased()).sum()
    }

    pub fn accounts_with_purchase(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.purchased() > 0)
            .count()
    }

    pub fn log(&self) {
        let aborted = self
            .reports
            .iter()
            .filter(|r| !matches!(r.outcome, JobOutcome::Done(_)))
            .count();
        info!(
            accounts = self.reports.len(),
            accounts_with_purchase = self.accounts_with_purchase(),
            tiers_purchased = self.tiers_purchased(),
            accounts_not_run = aborted,
            "All accounts finished"
        );
    }
}

pub struct PurchaseOrchestrator<G: ?Sized, C: ?Sized> {
    gateway: Arc<G>,
    clock: Arc<C>,
    policy: Arc<PurchasePolicy>,
}

impl<G, C> PurchaseOrchestrator<G, C>
where
    G: ChainGateway + ?Sized + 'static,
    C: Clock + ?Sized + 'static,
{
    pub fn new(gateway: Arc<G>, clock: Arc<C>, policy: Arc<PurchasePolicy>) -> Self {
        Self {
            gateway,
            clock,
            policy,
        }
    }

    /// Run every job to a terminal outcome. Never short-circuits.
    pub async fn run(&self, jobs: Vec<AccountJob>) -> RunSummary {
        info!(accounts = jobs.len(), "Checking balances and approvals on all accounts");

        let mut accounts = Vec::with_capacity(jobs.len());
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let preparer = AccountPreparer::new(
                Arc::clone(&self.gateway),
                Arc::clone(&self.clock),
                Arc::clone(&self.policy),
            );
            let executor = TierPurchaseExecutor::new(Arc::clone(&self.gateway), Arc::clone(&self.policy));
            let stop_on_first = self.policy.stop_on_first_purchase;

            accounts.push(job.address());
            handles.push(tokio::spawn(async move {
                run_job(&preparer, &executor, stop_on_first, job).await
            }));
        }

        let reports = join_all(handles)
            .await
            .into_iter()
            .zip(accounts)
            .map(|(joined, account)| {
                let outcome = joined.unwrap_or_else(|err| {
                    let message = if err.is_panic() {
                        panic_message(err.into_panic())
                    } else {
                        err.to_string()
                    };
                    metrics().jobs_faulted.inc();
                    AccountLogger::new(account).log_fault(&message);
                    JobOutcome::Faulted(message)
                });
                JobReport { account, outcome }
            })
            .collect();

        RunSummary { reports }
    }
}

/// One account: prepare, then walk the tier list in order.
async fn run_job<G, C>(
    preparer: &AccountPreparer<G, C>,
    executor: &TierPurchaseExecutor<G>,
    stop_on_first: bool,
    job: AccountJob,
) -> JobOutcome
where
    G: ChainGateway + ?Sized,
    C: Clock + ?Sized,
{
    let logger = AccountLogger::new(job.address());

    match preparer.prepare(&job).await {
        Ok(_) => {}
        Err(err @ PrepareError::InsufficientFunds { .. }) => {
            metrics().jobs_aborted.inc();
            return JobOutcome::Aborted {
                shortfall: err.shortfall().unwrap_or_default(),
            };
        }
        Err(err) => {
            metrics().jobs_aborted.inc();
            logger.log_preparation_failed(&err.to_string());
            return JobOutcome::PreparationFailed(err.to_string());
        }
    }

    let mut outcomes = Vec::with_capacity(job.tiers().len());
    for tier in job.tiers() {
        logger.log_tier_attempt(tier, job.quantity());

        match executor.purchase(job.signer(), tier, job.quantity()).await {
            Ok(receipt) => {
                outcomes.push(TierOutcome::Purchased {
                    tier: tier.id.to_string(),
                    tx_hash: receipt.tx_hash,
                    attempts: receipt.attempts,
                });
                if stop_on_first {
                    break;
                }
            }
            Err(err) => {
                logger.log_tier_failure(tier, err.cause(), &err.to_string());
                outcomes.push(TierOutcome::Failed {
                    tier: tier.id.to_string(),
                    cause: err.cause(),
                    error: err.to_string(),
                });
            }
        }
    }

    JobOutcome::Done(outcomes)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}
