//! Shared fixtures for the behavioural tests: a scripted in-memory gateway
//! and a clock driven by tokio's (pausable) time.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use tier_sale_bot::accounts::{parse_credential, AccountJob};
use tier_sale_bot::clock::Clock;
use tier_sale_bot::errors::GatewayError;
use tier_sale_bot::gateway::{ChainGateway, PurchaseCall, SignedTx, TxHandle, UnsignedTx};
use tier_sale_bot::policy::{FeeSettings, PurchasePolicy};
use tier_sale_bot::tiers::{TierCatalog, TierRange};

pub const KEY_A: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const KEY_B: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";
pub const KEY_C: &str = "0x7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6";

pub const SALE: Address = Address::repeat_byte(0x5a);
pub const TOKEN: Address = Address::repeat_byte(0x7c);

/// One USDC in base units.
pub const USDC: u64 = 1_000_000;

/// Wall clock that starts at `origin_ms` and advances with tokio time.
pub struct PausedClock {
    origin_ms: u64,
    started: Instant,
}

impl PausedClock {
    pub fn new(origin_ms: u64) -> Self {
        Self {
            origin_ms,
            started: Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now_ms(&self) -> u64 {
        self.origin_ms + self.started.elapsed().as_millis() as u64
    }
}

pub fn policy(release_at_ms: u64) -> PurchasePolicy {
    let mut policy = PurchasePolicy::new(
        release_at_ms,
        SALE,
        TOKEN,
        FeeSettings {
            max_fee_per_gas: 10_000_000_000,
            max_priority_fee_per_gas: 6_000_000_000,
        },
    );
    policy.referral_code = "oduvanchik".into();
    policy
}

pub fn signer(key: &str) -> PrivateKeySigner {
    parse_credential(key).expect("valid test key")
}

pub fn job(key: &str, min: usize, max: usize, quantity: u64) -> AccountJob {
    let range = TierRange::new(min, max).expect("valid range");
    let tiers = TierCatalog::builtin().select(range).expect("tiers in catalog");
    AccountJob::new(signer(key), range, tiers, quantity)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub tier: String,
    pub tx: SignedTx,
    pub at: Instant,
}

#[derive(Default)]
pub struct MockState {
    pub balances: HashMap<Address, U256>,
    pub approvals: HashMap<Address, U256>,
    pub native: HashMap<Address, U256>,

    /// Popped one per `submit`; `None` left means accept
    pub submit_failures: VecDeque<GatewayError>,
    /// Popped one per purchase `await_confirmation`
    pub confirm_failures: VecDeque<GatewayError>,
    /// Popped one per `sign`
    pub sign_failures: VecDeque<GatewayError>,
    /// Every submission for these tiers is rejected
    pub failing_tiers: HashSet<String>,
    /// `read_balance` for this account panics
    pub panic_on_balance: Option<Address>,
    /// A purchase whose confirmation times out is mined right after, so
    /// later resends of it are refused with a stale nonce
    pub land_on_timeout: bool,
    /// Mined transactions and their execution status
    pub landed: HashMap<B256, bool>,
    /// `read_balance` fails with this error
    pub balance_error: Option<GatewayError>,

    pub calls: Vec<&'static str>,
    pub sign_count: u32,
    pub submissions: Vec<Submission>,
    pub approval_requests: Vec<(Address, U256)>,
    approval_hashes: HashSet<B256>,
}

/// Scripted in-memory chain.
///
/// Purchase call data is the tier id as UTF-8, so a signed payload can be
/// traced back to its tier.
#[derive(Default)]
pub struct MockGateway {
    pub state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fund(&self, account: Address, balance: U256, approval: U256) {
        let mut state = self.state.lock();
        state.balances.insert(account, balance);
        state.approvals.insert(account, approval);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn submissions_for(&self, tier: &str) -> usize {
        self.state
            .lock()
            .submissions
            .iter()
            .filter(|s| s.tier == tier)
            .count()
    }

    pub fn called(&self, name: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == name).count()
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn read_balance(&self, account: Address, _asset: Address) -> Result<U256, GatewayError> {
        let panic_for = self.state.lock().panic_on_balance;
        if panic_for == Some(account) {
            panic!("scripted fault for {account}");
        }

        let mut state = self.state.lock();
        state.calls.push("read_balance");
        if let Some(err) = state.balance_error.clone() {
            return Err(err);
        }
        Ok(state.balances.get(&account).copied().unwrap_or_default())
    }

    async fn read_approval(
        &self,
        account: Address,
        _spender: Address,
        _asset: Address,
    ) -> Result<U256, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push("read_approval");
        Ok(state.approvals.get(&account).copied().unwrap_or_default())
    }

    async fn submit_approval(
        &self,
        signer: &PrivateKeySigner,
        _spender: Address,
        _asset: Address,
        amount: U256,
    ) -> Result<TxHandle, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push("submit_approval");
        state.approval_requests.push((signer.address(), amount));
        state.approvals.insert(signer.address(), amount);

        let mut seed = signer.address().to_vec();
        seed.extend_from_slice(&amount.to_be_bytes::<32>());
        let hash = keccak256(seed);
        state.approval_hashes.insert(hash);
        Ok(TxHandle { hash })
    }

    fn build_purchase_call(&self, call: &PurchaseCall) -> Result<Bytes, GatewayError> {
        self.state.lock().calls.push("build_purchase_call");
        Ok(Bytes::from(call.tier_id.clone().into_bytes()))
    }

    async fn sign(&self, signer: &PrivateKeySigner, tx: &UnsignedTx) -> Result<SignedTx, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push("sign");
        state.sign_count += 1;
        if let Some(err) = state.sign_failures.pop_front() {
            return Err(err);
        }

        let mut seed = signer.address().to_vec();
        seed.extend_from_slice(&tx.input);
        seed.extend_from_slice(&state.sign_count.to_be_bytes());
        Ok(SignedTx {
            hash: keccak256(seed),
            raw: tx.input.clone(),
        })
    }

    async fn submit(&self, tx: &SignedTx) -> Result<TxHandle, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push("submit");
        let tier = String::from_utf8_lossy(&tx.raw).into_owned();
        state.submissions.push(Submission {
            tier: tier.clone(),
            tx: tx.clone(),
            at: Instant::now(),
        });

        if state.failing_tiers.contains(&tier) {
            return Err(GatewayError::Rejected(format!("sale closed for {tier}")));
        }
        if state.landed.contains_key(&tx.hash) {
            return Err(GatewayError::NonceTooLow(format!("nonce too low for {}", tx.hash)));
        }
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }
        Ok(TxHandle { hash: tx.hash })
    }

    async fn await_confirmation(
        &self,
        handle: TxHandle,
        _confirmations: u64,
        _timeout: Duration,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        state.calls.push("await_confirmation");
        if state.approval_hashes.contains(&handle.hash) {
            return Ok(());
        }
        match state.confirm_failures.pop_front() {
            Some(err) => {
                if state.land_on_timeout && matches!(err, GatewayError::Timeout { .. }) {
                    state.landed.insert(handle.hash, true);
                }
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn receipt_status(&self, hash: B256) -> Result<Option<bool>, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push("receipt_status");
        Ok(state.landed.get(&hash).copied())
    }

    async fn read_native_balance(&self, account: Address) -> Result<U256, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push("read_native_balance");
        // One native unit unless scripted otherwise
        Ok(state
            .native
            .get(&account)
            .copied()
            .unwrap_or(U256::from(1_000_000_000_000_000_000u128)))
    }
}

pub fn transport(message: &str) -> GatewayError {
    GatewayError::Transport {
        endpoint: "mock".into(),
        message: message.into(),
    }
}

pub fn timeout() -> GatewayError {
    GatewayError::Timeout {
        tx_hash: B256::ZERO,
        timeout_ms: 30_000,
    }
}
