//! Plain signer: signs and sends the request as given

use super::{AccountSigner, ChainClient, TransactionSigner};
use crate::constants::now_millis;
use crate::error::SignerError;
use crate::types::{FeeParams, SignedTransaction, TxRequest};
use alloy::consensus::{SignableTransaction, Signed, TxEnvelope};
use alloy::dyn_abi::TypedData;
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Signature, TxHash};
use alloy::rpc::types::TransactionReceipt;
use eyre::{Context, Result};
use std::sync::Arc;

/// Signer that produces legacy or EIP-1559 envelopes and submits them through the
/// provider's standard send path
pub struct PlainTransactionSigner<A, C> {
    account: Arc<A>,
    chain: Arc<C>,
}

impl<A, C> Clone for PlainTransactionSigner<A, C> {
    fn clone(&self) -> Self {
        Self {
            account: Arc::clone(&self.account),
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<A: AccountSigner, C: ChainClient> PlainTransactionSigner<A, C> {
    /// Create a signer for `account`, submitting through `chain`
    ///
    /// Fails with [`SignerError::InvalidAddress`] when the account address is zero.
    pub fn new(account: Arc<A>, chain: Arc<C>) -> Result<Self> {
        if account.address().is_zero() {
            return Err(SignerError::InvalidAddress("account address is zero".to_string()).into());
        }
        Ok(Self { account, chain })
    }

    pub(crate) fn account(&self) -> &A {
        &self.account
    }

    pub(crate) fn chain(&self) -> &C {
        &self.chain
    }
}

/// Sign `tx` with the account key and wrap it in an EIP-2718 envelope
pub(crate) async fn sign_envelope<A, T>(account: &A, tx: T) -> Result<TxEnvelope>
where
    A: AccountSigner,
    T: SignableTransaction<Signature> + Send,
    TxEnvelope: From<Signed<T>>,
{
    let signature = account
        .sign_hash(tx.signature_hash())
        .await
        .context("Failed to sign transaction")?;
    Ok(TxEnvelope::from(tx.into_signed(signature)))
}

/// Build the [`SignedTransaction`] record for a signed envelope
pub(crate) fn signed_transaction(
    request: TxRequest,
    chain_id: u64,
    envelope: &TxEnvelope,
    timestamp_before_sign: u64,
) -> SignedTransaction {
    SignedTransaction {
        request,
        signed_request: envelope.encoded_2718().into(),
        chain_id,
        hash: *envelope.tx_hash(),
        timestamp_before_sign,
        authorization: None,
    }
}

impl<A: AccountSigner, C: ChainClient> TransactionSigner for PlainTransactionSigner<A, C> {
    fn address(&self) -> Address {
        self.account.address()
    }

    async fn prepare_transaction(&self, request: TxRequest) -> Result<TxRequest> {
        let address = self.account.address();
        if let Some(from) = request.from {
            if from != address {
                return Err(SignerError::SignerUnavailable { account: from }.into());
            }
        }

        self.account
            .populate_transaction(request.with_from(address))
            .await
            .context("Failed to populate transaction")
    }

    async fn sign_transaction(&self, request: TxRequest) -> Result<SignedTransaction> {
        let chain_id = request.require_chain_id()?;
        let timestamp_before_sign = now_millis();

        let envelope = match request.fees {
            Some(FeeParams::Legacy { gas_price }) => {
                sign_envelope(self.account(), request.to_legacy(gas_price)?).await?
            }
            _ => sign_envelope(self.account(), request.to_eip1559()?).await?,
        };

        tracing::debug!(
            chain_id,
            nonce = ?request.nonce,
            hash = %envelope.tx_hash(),
            "Signed transaction"
        );

        Ok(signed_transaction(
            request,
            chain_id,
            &envelope,
            timestamp_before_sign,
        ))
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature> {
        self.account
            .sign_typed_data(typed_data)
            .await
            .context("Failed to sign typed data")
    }

    async fn send_transaction(&self, signed: &SignedTransaction) -> Result<TxHash> {
        let hash = self
            .chain
            .send_transaction(signed.signed_request.clone())
            .await
            .context("Failed to send transaction")?;

        tracing::info!("Sent transaction {} on chain {}", hash, signed.chain_id);
        Ok(hash)
    }

    async fn send_transaction_sync(&self, signed: &SignedTransaction) -> Result<TransactionReceipt> {
        tracing::debug!("Calling sendTransactionSync for {}", signed.hash);

        self.chain
            .send_raw_transaction_sync(signed.signed_request.clone())
            .await
            .context("Failed to send transaction")
    }
}
