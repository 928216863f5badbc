//! Transaction request and signed payload types

use crate::error::SignerError;
use alloy::consensus::{TxEip1559, TxEip7702, TxLegacy};
use alloy::eips::eip7702::SignedAuthorization;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};
use serde::{Deserialize, Serialize};

/// Fee parameters: either a legacy gas price or an EIP-1559 fee pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeeParams {
    #[serde(rename_all = "camelCase")]
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    #[serde(rename_all = "camelCase")]
    Legacy {
        gas_price: u128,
    },
}

impl FeeParams {
    /// Fee pair used when the transaction is encoded as a typed (1559-style) envelope.
    /// A legacy gas price becomes both the max fee and the priority fee.
    pub fn as_eip1559(&self) -> (u128, u128) {
        match *self {
            FeeParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => (max_fee_per_gas, max_priority_fee_per_gas),
            FeeParams::Legacy { gas_price } => (gas_price, gas_price),
        }
    }
}

/// Transaction request parameters
///
/// Never mutated in place by the pipeline: preparation returns a new, populated request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    pub chain_id: Option<u64>,
    /// Sender
    pub from: Option<Address>,
    /// Recipient or target contract
    pub to: Option<Address>,
    /// Transaction value in wei
    pub value: U256,
    /// Encoded calldata
    pub data: Bytes,
    pub nonce: Option<u64>,
    pub fees: Option<FeeParams>,
    pub gas_limit: Option<u64>,
}

impl TxRequest {
    /// Create a new transaction request
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to: Some(to),
            data: data.into(),
            ..Default::default()
        }
    }

    /// Set chain ID
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Set sender
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Set transaction value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set nonce
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Set fee parameters
    pub fn with_fees(mut self, fees: FeeParams) -> Self {
        self.fees = Some(fees);
        self
    }

    /// Set gas limit
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub(crate) fn require_chain_id(&self) -> Result<u64, SignerError> {
        self.chain_id
            .ok_or(SignerError::IncompleteTransaction("chain id"))
    }

    pub(crate) fn require_nonce(&self) -> Result<u64, SignerError> {
        self.nonce.ok_or(SignerError::IncompleteTransaction("nonce"))
    }

    fn require_gas_limit(&self) -> Result<u64, SignerError> {
        self.gas_limit
            .ok_or(SignerError::IncompleteTransaction("gas limit"))
    }

    fn require_fees(&self) -> Result<FeeParams, SignerError> {
        self.fees.ok_or(SignerError::IncompleteTransaction("fees"))
    }

    fn kind(&self) -> TxKind {
        self.to.map(TxKind::Call).unwrap_or(TxKind::Create)
    }

    /// Legacy (EIP-155) encoding of a populated request
    pub(crate) fn to_legacy(&self, gas_price: u128) -> Result<TxLegacy, SignerError> {
        Ok(TxLegacy {
            chain_id: Some(self.require_chain_id()?),
            nonce: self.require_nonce()?,
            gas_price,
            gas_limit: self.require_gas_limit()?,
            to: self.kind(),
            value: self.value,
            input: self.data.clone(),
        })
    }

    /// EIP-1559 encoding of a populated request
    pub(crate) fn to_eip1559(&self) -> Result<TxEip1559, SignerError> {
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.require_fees()?.as_eip1559();
        Ok(TxEip1559 {
            chain_id: self.require_chain_id()?,
            nonce: self.require_nonce()?,
            gas_limit: self.require_gas_limit()?,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            to: self.kind(),
            value: self.value,
            input: self.data.clone(),
            ..Default::default()
        })
    }

    /// EIP-7702 encoding of a populated request carrying the given authorizations
    pub(crate) fn to_eip7702(
        &self,
        authorization_list: Vec<SignedAuthorization>,
    ) -> Result<TxEip7702, SignerError> {
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.require_fees()?.as_eip1559();
        let to = self
            .to
            .ok_or(SignerError::IncompleteTransaction("recipient"))?;
        Ok(TxEip7702 {
            chain_id: self.require_chain_id()?,
            nonce: self.require_nonce()?,
            gas_limit: self.require_gas_limit()?,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            to,
            value: self.value,
            input: self.data.clone(),
            authorization_list,
            ..Default::default()
        })
    }
}

/// A serialized, signed transaction ready for submission
///
/// Produced once per signing attempt and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// The populated request this payload was produced from
    pub request: TxRequest,
    /// EIP-2718 encoded signed envelope
    pub signed_request: Bytes,
    pub chain_id: u64,
    pub hash: TxHash,
    /// Milliseconds since the unix epoch, taken right before signing
    pub timestamp_before_sign: u64,
    /// Delegation authorization embedded in the envelope (delegated signer only)
    pub authorization: Option<SignedAuthorization>,
}
