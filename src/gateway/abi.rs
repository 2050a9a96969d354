//! Contract bindings for the sale contract and the ERC-20 payment token.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use super::PurchaseCall;
use crate::errors::GatewayError;

sol! {
    interface ISale {
        function whitelistedPurchaseInTierWithCode(
            string tierId,
            uint256 amount,
            bytes32[] merkleProof,
            string code,
            uint256 allocation
        ) external payable;
    }

    interface IERC20 {
        function balanceOf(address account) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 amount) external returns (bool success);
    }
}

pub fn encode_purchase(call: &PurchaseCall) -> Bytes {
    ISale::whitelistedPurchaseInTierWithCodeCall {
        tierId: call.tier_id.clone(),
        amount: U256::from(call.quantity),
        merkleProof: call.proof.clone(),
        code: call.referral_code.clone(),
        allocation: U256::from(call.allocation),
    }
    .abi_encode()
    .into()
}

pub fn encode_balance_of(account: Address) -> Bytes {
    IERC20::balanceOfCall { account }.abi_encode().into()
}

pub fn encode_allowance(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

pub fn encode_approve(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

pub fn decode_balance_of(raw: &[u8]) -> Result<U256, GatewayError> {
    IERC20::balanceOfCall::abi_decode_returns(raw, true)
        .map(|ret| ret.balance)
        .map_err(|e| GatewayError::Encoding(format!("balanceOf return: {e}")))
}

pub fn decode_allowance(raw: &[u8]) -> Result<U256, GatewayError> {
    IERC20::allowanceCall::abi_decode_returns(raw, true)
        .map(|ret| ret.remaining)
        .map_err(|e| GatewayError::Encoding(format!("allowance return: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_call_uses_contract_selector() {
        let call = PurchaseCall {
            tier_id: "Public0gTier1Arb".into(),
            quantity: 5,
            proof: vec![],
            referral_code: "oduvanchik".into(),
            allocation: 5,
        };
        let data = encode_purchase(&call);
        assert_eq!(
            &data[..4],
            &ISale::whitelistedPurchaseInTierWithCodeCall::SELECTOR[..]
        );

        let decoded =
            ISale::whitelistedPurchaseInTierWithCodeCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.tierId, "Public0gTier1Arb");
        assert_eq!(decoded.amount, U256::from(5u64));
        assert!(decoded.merkleProof.is_empty());
        assert_eq!(decoded.code, "oduvanchik");
        assert_eq!(decoded.allocation, U256::from(5u64));
    }

    #[test]
    fn test_balance_return_decoding() {
        let raw = U256::from(157_000_000u64).to_be_bytes::<32>();
        assert_eq!(
            decode_balance_of(&raw).unwrap(),
            U256::from(157_000_000u64)
        );
        assert!(matches!(
            decode_allowance(&[0u8; 3]),
            Err(GatewayError::Encoding(_))
        ));
    }

    #[test]
    fn test_approve_selector() {
        let data = encode_approve(Address::repeat_byte(0x23), U256::from(1u64));
        // approve(address,uint256)
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(data.len(), 4 + 64);
    }
}
