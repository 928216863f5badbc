//! Batch confirmation poller
//!
//! Transactions submitted through `wallet_sendCalls` have no hash the client can watch.
//! The poller asks the wallet that created the batch for its status until the batch is
//! terminal, then merges the result into the activity record.

mod legacy;
pub mod status;

pub use status::{interpret_calls_status, BatchOutcome, CallReceipt, CallsStatusResponse};

use crate::config::PipelineConfig;
use crate::constants::{GET_CALLS_STATUS_METHOD, SEND_CALLS_METHOD};
use crate::error::{eyre, Context, Result};
use crate::signer::{connect, ReadProvider};
use crate::types::{
    ActivityStore, BatchInfo, TransactionDetails, TransactionPatch, TransactionStatus,
};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::Provider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::MissedTickBehavior;

/// Version of the `wallet_sendCalls` request format
pub const SEND_CALLS_VERSION: &str = "2.0.0";

/// One call inside a `wallet_sendCalls` batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// `wallet_sendCalls` parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCallsRequest {
    pub version: String,
    /// Hex quantity, as wallets expect
    pub chain_id: String,
    pub from: Address,
    pub atomic_required: bool,
    pub calls: Vec<Call>,
}

impl SendCallsRequest {
    pub fn new(chain_id: u64, from: Address, calls: Vec<Call>) -> Self {
        Self {
            version: SEND_CALLS_VERSION.to_string(),
            chain_id: format!("{:#x}", chain_id),
            from,
            atomic_required: true,
            calls,
        }
    }
}

/// Older wallets return the batch id directly, newer ones wrap it in an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SendCallsResponse {
    Id(String),
    Wrapped { id: String },
}

impl SendCallsResponse {
    fn into_id(self) -> String {
        match self {
            SendCallsResponse::Id(id) | SendCallsResponse::Wrapped { id } => id,
        }
    }
}

/// The connected wallet's batch-of-calls RPC channel
pub trait WalletConnector: Send + Sync {
    /// Stable identifier of the wallet integration
    fn id(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Submit a batch, returning the wallet's batch id
    fn send_calls(&self, request: SendCallsRequest) -> impl Future<Output = Result<String>> + Send;

    /// Raw `wallet_getCallsStatus` response for `batch_id`
    fn get_calls_status(&self, batch_id: &str) -> impl Future<Output = Result<Value>> + Send;
}

/// Wallet connector over an HTTP JSON-RPC endpoint
pub struct RpcWalletConnector {
    id: String,
    provider: ReadProvider,
    connected: AtomicBool,
}

impl RpcWalletConnector {
    pub fn new(id: impl Into<String>, rpc_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            provider: connect(rpc_url.as_ref())?,
            connected: AtomicBool::new(true),
        })
    }

    /// Stop answering for this wallet; a running poller exits on its next tick
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl WalletConnector for RpcWalletConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_calls(&self, request: SendCallsRequest) -> Result<String> {
        let response: SendCallsResponse = self
            .provider
            .raw_request(SEND_CALLS_METHOD.into(), (request,))
            .await
            .with_context(|| format!("{} failed", SEND_CALLS_METHOD))?;
        Ok(response.into_id())
    }

    async fn get_calls_status(&self, batch_id: &str) -> Result<Value> {
        let response: Value = self
            .provider
            .raw_request(GET_CALLS_STATUS_METHOD.into(), (batch_id.to_string(),))
            .await
            .with_context(|| format!("{} failed for {}", GET_CALLS_STATUS_METHOD, batch_id))?;
        Ok(response)
    }
}

/// Polls pending batch transactions of one connector until they are terminal
///
/// Records are polled one after another within a tick. A batch whose status query fails
/// `max_batch_poll_failures` times in a row is finalized as failed without a hash.
pub struct BatchConfirmationPoller<W, S> {
    connector: Arc<W>,
    store: Arc<S>,
    config: PipelineConfig,
    failures: Mutex<HashMap<String, u32>>,
}

impl<W: WalletConnector, S: ActivityStore> BatchConfirmationPoller<W, S> {
    pub fn new(connector: Arc<W>, store: Arc<S>, config: PipelineConfig) -> Self {
        Self {
            connector,
            store,
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn failures(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Consecutive failed polls recorded for `batch_id`
    pub fn failure_count(&self, batch_id: &str) -> Option<u32> {
        self.failures().get(batch_id).copied()
    }

    /// Pending records with batch metadata created by the connected wallet
    pub fn eligible_batches(&self) -> Vec<(TransactionDetails, BatchInfo)> {
        if !self.connector.is_connected() {
            return Vec::new();
        }
        let connector_id = self.connector.id();

        self.store
            .pending_transactions()
            .into_iter()
            .filter_map(|details| {
                let batch = details.batch_info.clone()?;
                (batch.connector_id == connector_id).then_some((details, batch))
            })
            .collect()
    }

    /// Poll every eligible record once; returns how many were eligible
    ///
    /// Counters for batches that dropped out of the eligible set are discarded first.
    pub async fn poll_once(&self) -> usize {
        let eligible = self.eligible_batches();
        self.failures()
            .retain(|batch_id, _| eligible.iter().any(|(_, batch)| &batch.batch_id == batch_id));

        for (details, batch) in &eligible {
            if let Err(err) = self.poll_batch(details, batch).await {
                self.record_failure(details, batch, err);
            }
        }

        eligible.len()
    }

    async fn poll_batch(&self, details: &TransactionDetails, batch: &BatchInfo) -> Result<()> {
        let raw = self.connector.get_calls_status(&batch.batch_id).await?;

        match interpret_calls_status(self.connector.id(), raw)? {
            BatchOutcome::Pending => {
                tracing::debug!(batch_id = %batch.batch_id, "Batch still pending");
            }
            BatchOutcome::Finalized { status, hash } => {
                self.finalize(details, batch, status, hash);
            }
        }
        Ok(())
    }

    fn record_failure(&self, details: &TransactionDetails, batch: &BatchInfo, err: eyre::Report) {
        let count = {
            let mut failures = self.failures();
            let count = failures.entry(batch.batch_id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if count >= self.config.max_batch_poll_failures {
            tracing::error!(
                batch_id = %batch.batch_id,
                connector_id = %batch.connector_id,
                failures = count,
                "Giving up on batch: {:#}",
                err
            );
            self.finalize(details, batch, TransactionStatus::Failed, None);
        } else {
            tracing::warn!(
                batch_id = %batch.batch_id,
                connector_id = %batch.connector_id,
                failures = count,
                "Failed to poll batch status: {:#}",
                err
            );
        }
    }

    fn finalize(
        &self,
        details: &TransactionDetails,
        batch: &BatchInfo,
        status: TransactionStatus,
        hash: Option<String>,
    ) {
        tracing::info!(
            batch_id = %batch.batch_id,
            transaction_id = %details.id,
            "Batch finalized as {:?} (hash: {:?})",
            status,
            hash
        );
        self.store
            .merge_update(&details.id, TransactionPatch::finalized(status, hash));
        self.failures().remove(&batch.batch_id);
    }

    /// Poll every `batch_poll_interval` until nothing is eligible or the wallet disconnects
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.batch_poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if self.poll_once().await == 0 {
                break;
            }
        }
        tracing::debug!(connector_id = self.connector.id(), "Batch poller stopped");
    }
}

/// Spawn [`BatchConfirmationPoller::run`] on the current runtime
pub fn spawn_poller<W, S>(poller: Arc<BatchConfirmationPoller<W, S>>) -> tokio::task::JoinHandle<()>
where
    W: WalletConnector + 'static,
    S: ActivityStore + 'static,
{
    tokio::spawn(async move { poller.run().await })
}

/// Reject an empty batch before it reaches the wallet
pub(crate) fn validate_calls(request: &SendCallsRequest) -> Result<()> {
    if request.calls.is_empty() {
        return Err(eyre!("wallet_sendCalls needs at least one call"));
    }
    Ok(())
}
