//! Chain Gateway
//!
//! Single RPC facade over the redundant endpoint set. The purchase core only
//! talks to the chain through [`ChainGateway`]; endpoint selection, quorum and
//! call encoding live behind it.

use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use crate::errors::GatewayError;

pub mod abi;
pub mod evm;

pub use evm::EvmGateway;

/// Arguments of the sale contract's purchase call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseCall {
    pub tier_id: String,
    pub quantity: u64,
    pub proof: Vec<B256>,
    pub referral_code: String,
    /// Repeats the quantity, the contract takes it as the caller's allocation
    pub allocation: u64,
}

/// Dynamic-fee (EIP-1559) transaction before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTx {
    pub to: Address,
    pub input: Bytes,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Signed, encoded transaction ready to be broadcast as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub hash: B256,
    pub raw: Bytes,
}

/// Reference to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: B256,
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Token balance of `account` in `asset`.
    async fn read_balance(&self, account: Address, asset: Address) -> Result<U256, GatewayError>;

    /// Standing approval granted by `account` to `spender` on `asset`.
    async fn read_approval(
        &self,
        account: Address,
        spender: Address,
        asset: Address,
    ) -> Result<U256, GatewayError>;

    /// Sign and submit an `approve(spender, amount)` on `asset`.
    async fn submit_approval(
        &self,
        signer: &PrivateKeySigner,
        spender: Address,
        asset: Address,
        amount: U256,
    ) -> Result<TxHandle, GatewayError>;

    /// Encode the purchase call data.
    fn build_purchase_call(&self, call: &PurchaseCall) -> Result<Bytes, GatewayError>;

    /// Populate nonce/gas/chain id and sign.
    async fn sign(
        &self,
        signer: &PrivateKeySigner,
        tx: &UnsignedTx,
    ) -> Result<SignedTx, GatewayError>;

    /// Broadcast an already signed transaction.
    async fn submit(&self, tx: &SignedTx) -> Result<TxHandle, GatewayError>;

    /// Resolve once `handle` is `confirmations` deep, or fail after `timeout`.
    async fn await_confirmation(
        &self,
        handle: TxHandle,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<(), GatewayError>;

    /// Status of the receipt for `hash`: `None` while not mined, otherwise
    /// whether execution succeeded.
    async fn receipt_status(&self, hash: B256) -> Result<Option<bool>, GatewayError>;

    /// Native currency balance of `account`.
    async fn read_native_balance(&self, account: Address) -> Result<U256, GatewayError>;
}
