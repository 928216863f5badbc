//! Submission bookkeeping
//!
//! Every submission gets a pending activity record first, so the UI can show it while the
//! network call is in flight. The record is then updated with the hash, a terminal status,
//! or batch metadata the poller picks up later.

use crate::batch::{validate_calls, SendCallsRequest, WalletConnector};
use crate::constants::now_millis;
use crate::error::{Context, Result};
use crate::presign::SpeculativeSigningCache;
use crate::signer::TransactionSigner;
use crate::types::{
    ActivityStore, BatchInfo, SignedTransaction, SwapTradeContext, TradeComparator,
    TransactionDetails, TransactionPatch, TransactionStatus, TxRequest,
};
use alloy::primitives::TxHash;
use alloy::rpc::types::TransactionReceipt;
use std::sync::Arc;

/// Submits signed transactions and batches on behalf of one account, recording each one in
/// an [`ActivityStore`]
///
/// `S` signs and sends; `A` holds the activity records the UI and the batch poller read.
pub struct TransactionService<S, A> {
    signer: Arc<S>,
    store: Arc<A>,
}

impl<S: TransactionSigner, A: ActivityStore> TransactionService<S, A> {
    /// Create a service sending through `signer` and recording into `store`
    pub fn new(signer: Arc<S>, store: Arc<A>) -> Self {
        Self { signer, store }
    }

    /// The signer submissions go through
    pub fn signer(&self) -> &Arc<S> {
        &self.signer
    }

    /// The activity store records are written to
    pub fn store(&self) -> &Arc<A> {
        &self.store
    }

    fn add_pending(&self, id: &str, chain_id: u64) {
        self.store.add_transaction(TransactionDetails::pending(
            id,
            chain_id,
            self.signer.address(),
            now_millis(),
        ));
    }

    fn mark_failed(&self, id: &str) {
        self.store.merge_update(
            id,
            TransactionPatch::finalized(TransactionStatus::Failed, None),
        );
    }

    /// Submit a signed transaction under activity id `id`
    pub async fn submit(&self, id: &str, signed: &SignedTransaction) -> Result<TxHash> {
        self.add_pending(id, signed.chain_id);

        match self.signer.send_transaction(signed).await {
            Ok(hash) => {
                self.store
                    .merge_update(id, TransactionPatch::hash(hash.to_string()));
                Ok(hash)
            }
            Err(err) => {
                tracing::warn!(transaction_id = id, "Submission failed: {:#}", err);
                self.mark_failed(id);
                Err(err)
            }
        }
    }

    /// Submit and wait for the receipt; the record is finalized from the receipt status
    pub async fn submit_sync(
        &self,
        id: &str,
        signed: &SignedTransaction,
    ) -> Result<TransactionReceipt> {
        self.add_pending(id, signed.chain_id);

        let receipt = match self.signer.send_transaction_sync(signed).await {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::warn!(transaction_id = id, "Synchronous submission failed: {:#}", err);
                self.mark_failed(id);
                return Err(err);
            }
        };

        let status = if receipt.status() {
            TransactionStatus::Confirmed
        } else {
            TransactionStatus::Failed
        };
        tracing::info!(
            transaction_id = id,
            "Transaction {} finalized as {:?}",
            receipt.transaction_hash,
            status
        );
        self.store.merge_update(
            id,
            TransactionPatch::finalized(status, Some(receipt.transaction_hash.to_string())),
        );
        Ok(receipt)
    }

    /// Submit a batch of calls through `connector` and register it for polling
    pub async fn submit_calls<W: WalletConnector>(
        &self,
        id: &str,
        connector: &W,
        request: SendCallsRequest,
    ) -> Result<String> {
        validate_calls(&request)?;
        let chain_id = u64::from_str_radix(request.chain_id.trim_start_matches("0x"), 16)
            .with_context(|| format!("Invalid chain id {}", request.chain_id))?;

        let batch_id = connector
            .send_calls(request)
            .await
            .with_context(|| format!("{} rejected the batch", connector.id()))?;

        tracing::info!(
            transaction_id = id,
            batch_id = %batch_id,
            connector_id = connector.id(),
            "Registered batch"
        );
        let details = TransactionDetails::pending(id, chain_id, self.signer.address(), now_millis())
            .with_batch_info(BatchInfo {
                batch_id: batch_id.clone(),
                chain_id,
                connector_id: connector.id().to_string(),
            });
        self.store.add_transaction(details);

        Ok(batch_id)
    }
}

impl<S: TransactionSigner + 'static, A: ActivityStore> TransactionService<S, A> {
    /// Final confirmation of a swap
    ///
    /// Latches the cache, then submits the speculatively signed payload if it is still valid
    /// for `context`, or signs `request` on the spot otherwise.
    pub async fn execute_swap<Q: TradeComparator>(
        &self,
        id: &str,
        cache: &SpeculativeSigningCache<S, Q>,
        request: TxRequest,
        context: &SwapTradeContext,
    ) -> Result<TxHash> {
        cache.mark_execution_called();

        let signed = match cache.get_valid_signed_transaction(context).await {
            Some(signed) => signed,
            None => {
                tracing::debug!(transaction_id = id, "No usable pre-signed transaction, signing now");
                let prepared = self.signer.prepare_transaction(request).await?;
                self.signer.sign_transaction(prepared).await?
            }
        };

        self.submit(id, &signed).await
    }
}
