//! Delegated signer: bundles an EIP-7702 authorization into a set-code transaction

use super::plain::{sign_envelope, signed_transaction};
use super::{AccountSigner, ChainClient, PlainTransactionSigner, TransactionSigner};
use crate::constants::now_millis;
use crate::error::SignerError;
use crate::types::{SignedTransaction, TxRequest};
use alloy::consensus::TxEip7702;
use alloy::dyn_abi::TypedData;
use alloy::eips::eip7702::{Authorization, SignedAuthorization};
use alloy::primitives::{Address, Signature, TxHash, U256};
use alloy::rpc::types::TransactionReceipt;
use eyre::{Context, Result};

/// Signer for accounts that execute through a delegate contract
///
/// Every signed transaction carries a fresh authorization for `delegation_contract`. Since
/// the sender is also the authority, its nonce is consumed by the transaction itself before
/// the authorization list is processed, so the authorization nonce is the transaction
/// nonce + 1.
pub struct DelegatedTransactionSigner<A, C> {
    plain: PlainTransactionSigner<A, C>,
    delegation_contract: Option<Address>,
}

impl<A: AccountSigner, C: ChainClient> DelegatedTransactionSigner<A, C> {
    /// Wrap a plain signer. The delegation contract is validated when signing.
    pub fn new(plain: PlainTransactionSigner<A, C>, delegation_contract: Option<Address>) -> Self {
        Self {
            plain,
            delegation_contract,
        }
    }

    pub fn delegation_contract(&self) -> Option<Address> {
        self.delegation_contract
    }

    fn require_delegation_contract(&self) -> Result<Address, SignerError> {
        match self.delegation_contract {
            Some(address) if !address.is_zero() => Ok(address),
            _ => Err(SignerError::InvalidDelegationConfig(
                "missing delegation contract address".to_string(),
            )),
        }
    }

    /// Sign {chain id, delegate, nonce} with the account key
    async fn sign_authorization(
        &self,
        chain_id: u64,
        delegate: Address,
        nonce: u64,
    ) -> Result<SignedAuthorization> {
        let authorization = Authorization {
            chain_id: U256::from(chain_id),
            address: delegate,
            nonce,
        };
        let signature = self
            .plain
            .account()
            .sign_hash(authorization.signature_hash())
            .await
            .context("Failed to sign delegation authorization")?;

        Ok(authorization.into_signed(signature))
    }
}

/// The first authorization must carry the transaction nonce plus one
fn check_authorization_nonce(tx: &TxEip7702) -> Result<(), SignerError> {
    let authorization = tx
        .authorization_list
        .first()
        .ok_or(SignerError::IncompleteTransaction("authorization"))?;
    let expected = tx.nonce.checked_add(1).ok_or_else(|| {
        SignerError::InvalidDelegationConfig("transaction nonce overflows".to_string())
    })?;

    if authorization.nonce() != expected {
        return Err(SignerError::AuthorizationNonceMismatch {
            expected,
            actual: authorization.nonce(),
        });
    }
    Ok(())
}

impl<A: AccountSigner, C: ChainClient> TransactionSigner for DelegatedTransactionSigner<A, C> {
    fn address(&self) -> Address {
        self.plain.address()
    }

    async fn prepare_transaction(&self, request: TxRequest) -> Result<TxRequest> {
        self.plain.prepare_transaction(request).await
    }

    async fn sign_transaction(&self, request: TxRequest) -> Result<SignedTransaction> {
        let chain_id = request.chain_id.ok_or_else(|| {
            SignerError::InvalidDelegationConfig("missing chain id".to_string())
        })?;
        let delegate = self.require_delegation_contract()?;
        let nonce = request.require_nonce()?;
        let expected_nonce = nonce.checked_add(1).ok_or_else(|| {
            SignerError::InvalidDelegationConfig("transaction nonce overflows".to_string())
        })?;

        let timestamp_before_sign = now_millis();
        let authorization = self
            .sign_authorization(chain_id, delegate, expected_nonce)
            .await?;

        let tx = request.to_eip7702(vec![authorization.clone()])?;
        check_authorization_nonce(&tx)?;
        let envelope = sign_envelope(self.plain.account(), tx).await?;

        tracing::debug!(
            chain_id,
            nonce,
            authorization_nonce = expected_nonce,
            delegate = %delegate,
            hash = %envelope.tx_hash(),
            "Signed delegated transaction"
        );

        let mut signed = signed_transaction(request, chain_id, &envelope, timestamp_before_sign);
        signed.authorization = Some(authorization);
        Ok(signed)
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature> {
        self.plain.sign_typed_data(typed_data).await
    }

    /// The payload is already a complete set-code envelope, so it goes straight to the
    /// raw send path instead of the provider's standard one.
    async fn send_transaction(&self, signed: &SignedTransaction) -> Result<TxHash> {
        let hash = self
            .plain
            .chain()
            .send_raw_transaction(signed.signed_request.clone())
            .await
            .context("Failed to send delegated transaction")?;

        tracing::info!(
            "Sent delegated transaction {} on chain {}",
            hash,
            signed.chain_id
        );
        Ok(hash)
    }

    /// No native synchronous delegated send exists yet; this reuses the plain signer's
    /// send-and-wait path with the already encoded payload.
    async fn send_transaction_sync(&self, signed: &SignedTransaction) -> Result<TransactionReceipt> {
        self.plain.send_transaction_sync(signed).await
    }
}
