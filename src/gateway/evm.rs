//! EVM implementation of [`ChainGateway`] over a redundant set of HTTP endpoints.
//!
//! Reads use a quorum of one: the first endpoint is asked, and whenever it
//! fails or stalls past `stall_timeout` the next endpoint is asked as well.
//! The first successful answer wins. Signed transactions are broadcast to
//! every endpoint at once.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::{abi, ChainGateway, PurchaseCall, SignedTx, TxHandle, UnsignedTx};
use crate::errors::{ConfigError, GatewayError};
use crate::policy::FeeSettings;

const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Endpoint {
    url: String,
    provider: RootProvider<Http<Client>>,
}

pub struct EvmGateway {
    endpoints: Vec<Endpoint>,
    chain_id: u64,
    stall_timeout: Duration,
    receipt_poll_interval: Duration,
    /// Fixed gas limit; `None` estimates per transaction
    gas_limit: Option<u64>,
    /// Fees used for transactions the gateway builds itself (approvals)
    fees: FeeSettings,
}

impl EvmGateway {
    pub fn new(
        urls: &[String],
        chain_id: u64,
        stall_timeout: Duration,
        fees: FeeSettings,
    ) -> Result<Self, ConfigError> {
        if urls.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "chain.endpoints",
                reason: "at least one RPC endpoint is required".into(),
            });
        }

        let endpoints = urls
            .iter()
            .map(|url| {
                let parsed = url.parse().map_err(|e| ConfigError::InvalidValue {
                    field: "chain.endpoints",
                    reason: format!("{url}: {e}"),
                })?;
                Ok(Endpoint {
                    url: url.clone(),
                    provider: ProviderBuilder::new().on_http(parsed),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            endpoints,
            chain_id,
            stall_timeout,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            gas_limit: None,
            fees,
        })
    }

    pub fn with_gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Staggered fallback across endpoints; first `Ok` wins.
    async fn first_success<'a, T, F, Fut>(&'a self, op: &'static str, f: F) -> Result<T, GatewayError>
    where
        F: Fn(&'a Endpoint) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + 'a,
    {
        let mut remaining = self.endpoints.iter();
        let mut pending = FuturesUnordered::new();
        let mut last_error = GatewayError::NoEndpoints;

        loop {
            if pending.is_empty() {
                match remaining.next() {
                    Some(endpoint) => pending.push(f(endpoint)),
                    None => break,
                }
            }

            tokio::select! {
                Some(result) = pending.next() => match result {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        debug!(op, error = %e, "Endpoint call failed, falling back");
                        last_error = e;
                        if let Some(endpoint) = remaining.next() {
                            pending.push(f(endpoint));
                        }
                    }
                },
                _ = sleep(self.stall_timeout), if remaining.len() > 0 => {
                    if let Some(endpoint) = remaining.next() {
                        debug!(op, endpoint = %endpoint.url, "Endpoint stalled, querying next");
                        pending.push(f(endpoint));
                    }
                }
                else => break,
            }
        }

        Err(last_error)
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, GatewayError> {
        let request = TransactionRequest::default().with_to(to).with_input(input);
        let request = &request;
        self.first_success("eth_call", |ep| async move {
            ep.provider
                .call(request)
                .await
                .map_err(|e| classify(&ep.url, e))
        })
        .await
    }

    async fn head_block(&self) -> Result<u64, GatewayError> {
        self.first_success("eth_blockNumber", |ep| async move {
            ep.provider
                .get_block_number()
                .await
                .map_err(|e| classify(&ep.url, e))
        })
        .await
    }
}

#[async_trait]
impl ChainGateway for EvmGateway {
    async fn read_balance(&self, account: Address, asset: Address) -> Result<U256, GatewayError> {
        let raw = self.call(asset, abi::encode_balance_of(account)).await?;
        abi::decode_balance_of(&raw)
    }

    async fn read_approval(
        &self,
        account: Address,
        spender: Address,
        asset: Address,
    ) -> Result<U256, GatewayError> {
        let raw = self.call(asset, abi::encode_allowance(account, spender)).await?;
        abi::decode_allowance(&raw)
    }

    async fn submit_approval(
        &self,
        signer: &PrivateKeySigner,
        spender: Address,
        asset: Address,
        amount: U256,
    ) -> Result<TxHandle, GatewayError> {
        let unsigned = UnsignedTx {
            to: asset,
            input: abi::encode_approve(spender, amount),
            max_fee_per_gas: self.fees.max_fee_per_gas,
            max_priority_fee_per_gas: self.fees.max_priority_fee_per_gas,
        };
        let signed = self.sign(signer, &unsigned).await?;
        self.submit(&signed).await
    }

    fn build_purchase_call(&self, call: &PurchaseCall) -> Result<Bytes, GatewayError> {
        Ok(abi::encode_purchase(call))
    }

    async fn sign(
        &self,
        signer: &PrivateKeySigner,
        tx: &UnsignedTx,
    ) -> Result<SignedTx, GatewayError> {
        let from = signer.address();
        let nonce = self
            .first_success("eth_getTransactionCount", |ep| async move {
                ep.provider
                    .get_transaction_count(from)
                    .pending()
                    .await
                    .map_err(|e| classify(&ep.url, e))
            })
            .await?;

        let mut request = TransactionRequest::default()
            .with_from(from)
            .with_to(tx.to)
            .with_input(tx.input.clone())
            .with_chain_id(self.chain_id)
            .with_nonce(nonce)
            .with_max_fee_per_gas(tx.max_fee_per_gas)
            .with_max_priority_fee_per_gas(tx.max_priority_fee_per_gas);

        let gas_limit = match self.gas_limit {
            Some(limit) => limit,
            None => {
                let estimate_request = &request;
                self.first_success("eth_estimateGas", |ep| async move {
                    ep.provider
                        .estimate_gas(estimate_request)
                        .await
                        .map_err(|e| classify(&ep.url, e))
                })
                .await?
            }
        };
        request.set_gas_limit(gas_limit);

        let wallet = EthereumWallet::from(signer.clone());
        let envelope = <TransactionRequest as TransactionBuilder<Ethereum>>::build(request, &wallet)
            .await
            .map_err(|e| GatewayError::Signing(e.to_string()))?;

        Ok(SignedTx {
            hash: *envelope.tx_hash(),
            raw: envelope.encoded_2718().into(),
        })
    }

    async fn submit(&self, tx: &SignedTx) -> Result<TxHandle, GatewayError> {
        let handle = TxHandle { hash: tx.hash };
        let mut sends = self
            .endpoints
            .iter()
            .map(|ep| async move {
                match ep.provider.send_raw_transaction(&tx.raw).await {
                    Ok(_) => Ok(()),
                    Err(e) => Err(classify_submission(&ep.url, tx.hash, e)),
                }
            })
            .collect::<FuturesUnordered<_>>();

        let mut last_error = GatewayError::NoEndpoints;
        while let Some(result) = sends.next().await {
            match result {
                Ok(()) | Err(GatewayError::AlreadyKnown(_)) => {
                    // Give slower endpoints a moment to take the payload too
                    let _ = timeout(self.stall_timeout, async {
                        while sends.next().await.is_some() {}
                    })
                    .await;
                    return Ok(handle);
                }
                Err(e) => {
                    debug!(tx = %tx.hash, error = %e, "Broadcast refused by endpoint");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn await_confirmation(
        &self,
        handle: TxHandle,
        confirmations: u64,
        wait: Duration,
    ) -> Result<(), GatewayError> {
        let hash = handle.hash;
        let poll = async {
            loop {
                let receipt = self
                    .first_success("eth_getTransactionReceipt", |ep| async move {
                        ep.provider
                            .get_transaction_receipt(hash)
                            .await
                            .map_err(|e| classify(&ep.url, e))
                    })
                    .await;

                match receipt {
                    Ok(Some(receipt)) => {
                        if !receipt.status() {
                            return Err(GatewayError::Reverted(hash));
                        }
                        if confirmations <= 1 {
                            return Ok(());
                        }
                        if let (Some(mined), Ok(head)) = (receipt.block_number, self.head_block().await) {
                            if head.saturating_sub(mined) + 1 >= confirmations {
                                return Ok(());
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(tx = %hash, error = %e, "Receipt lookup failed"),
                }

                sleep(self.receipt_poll_interval).await;
            }
        };

        timeout(wait, poll).await.map_err(|_| GatewayError::Timeout {
            tx_hash: hash,
            timeout_ms: wait.as_millis() as u64,
        })?
    }

    async fn receipt_status(&self, hash: B256) -> Result<Option<bool>, GatewayError> {
        let receipt = self
            .first_success("eth_getTransactionReceipt", |ep| async move {
                ep.provider
                    .get_transaction_receipt(hash)
                    .await
                    .map_err(|e| classify(&ep.url, e))
            })
            .await?;
        Ok(receipt.map(|r| r.status()))
    }

    async fn read_native_balance(&self, account: Address) -> Result<U256, GatewayError> {
        self.first_success("eth_getBalance", |ep| async move {
            ep.provider
                .get_balance(account)
                .await
                .map_err(|e| classify(&ep.url, e))
        })
        .await
    }
}

/// Map a node/transport error message onto the gateway taxonomy.
fn classify(endpoint: &str, err: impl Display) -> GatewayError {
    let message = err.to_string();
    let lower = message.to_lowercase();

    if lower.contains("nonce too low") {
        GatewayError::NonceTooLow(message)
    } else if lower.contains("execution reverted")
        || lower.contains("insufficient funds")
        || lower.contains("underpriced")
        || lower.contains("invalid")
    {
        GatewayError::Rejected(message)
    } else {
        GatewayError::Transport {
            endpoint: endpoint.to_string(),
            message,
        }
    }
}

fn classify_submission(endpoint: &str, hash: B256, err: impl Display) -> GatewayError {
    let message = err.to_string();
    let lower = message.to_lowercase();

    if lower.contains("already known") || lower.contains("already imported") {
        GatewayError::AlreadyKnown(hash)
    } else {
        classify(endpoint, message)
    }
}
