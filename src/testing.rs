//! Fixtures shared by the unit tests. Nothing here touches the network.

use crate::batch::{SendCallsRequest, WalletConnector};
use crate::error::{eyre, Report, Result, SignerError};
use crate::signer::{AccountSigner, ChainClient, PlainTransactionSigner, TransactionSigner};
use crate::types::{
    BatchInfo, FeeParams, Routing, SignedTransaction, SwapTradeContext, TradeType,
    TransactionDetails, TxRequest,
};
use alloy::dyn_abi::TypedData;
use alloy::primitives::{keccak256, Address, Bytes, Signature, TxHash, B256, U256};
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_CHAIN_ID: u64 = 1;
pub const TEST_MAX_FEE: u128 = 30_000_000_000;
pub const TEST_PRIORITY_FEE: u128 = 1_000_000_000;
pub const TEST_GAS_LIMIT: u64 = 200_000;

/// Key signer with a random key; populates with fixed values instead of RPC lookups
pub struct TestAccount {
    key: PrivateKeySigner,
    address: Address,
}

impl TestAccount {
    pub fn random() -> Self {
        let key = PrivateKeySigner::random();
        let address = key.address();
        Self { key, address }
    }

    /// Account that reports the zero address
    pub fn zero_address() -> Self {
        Self {
            key: PrivateKeySigner::random(),
            address: Address::ZERO,
        }
    }
}

impl AccountSigner for TestAccount {
    fn address(&self) -> Address {
        self.address
    }

    async fn populate_transaction(&self, mut tx: TxRequest) -> Result<TxRequest> {
        tx.from.get_or_insert(self.address);
        tx.chain_id.get_or_insert(TEST_CHAIN_ID);
        tx.nonce.get_or_insert(0);
        tx.fees.get_or_insert(FeeParams::Eip1559 {
            max_fee_per_gas: TEST_MAX_FEE,
            max_priority_fee_per_gas: TEST_PRIORITY_FEE,
        });
        tx.gas_limit.get_or_insert(TEST_GAS_LIMIT);
        Ok(tx)
    }

    async fn sign_hash(&self, hash: B256) -> Result<Signature> {
        Ok(self.key.sign_hash(&hash).await?)
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature> {
        Ok(self.key.sign_dynamic_typed_data(typed_data).await?)
    }
}

/// Fully populated EIP-1559 request from `from`
pub fn populated_request(from: Address, nonce: u64) -> TxRequest {
    TxRequest::new(Address::repeat_byte(0x22), vec![0xde, 0xad])
        .with_chain_id(TEST_CHAIN_ID)
        .with_from(from)
        .with_nonce(nonce)
        .with_fees(FeeParams::Eip1559 {
            max_fee_per_gas: TEST_MAX_FEE,
            max_priority_fee_per_gas: TEST_PRIORITY_FEE,
        })
        .with_gas_limit(TEST_GAS_LIMIT)
}

/// Chain client that records every payload and answers with its keccak hash
#[derive(Default)]
pub struct MockChainClient {
    sent: Mutex<Vec<(&'static str, Bytes, TxHash)>>,
    failure: Option<String>,
    reverting: bool,
}

impl MockChainClient {
    /// Every send fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Synchronous sends return a reverted receipt
    pub fn reverting() -> Self {
        Self {
            reverting: true,
            ..Default::default()
        }
    }

    /// (path, payload, hash) of every accepted send, in order
    pub fn sent(&self) -> Vec<(&'static str, Bytes, TxHash)> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, path: &'static str, raw: Bytes) -> Result<TxHash> {
        if let Some(message) = &self.failure {
            return Err(eyre!("{}", message));
        }
        let hash = keccak256(&raw);
        self.sent.lock().unwrap().push((path, raw, hash));
        Ok(hash)
    }
}

impl ChainClient for MockChainClient {
    async fn send_transaction(&self, raw: Bytes) -> Result<TxHash> {
        self.record("standard", raw)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash> {
        self.record("raw", raw)
    }

    async fn send_raw_transaction_sync(&self, raw: Bytes) -> Result<TransactionReceipt> {
        let hash = self.record("sync", raw)?;
        Ok(receipt(hash, !self.reverting))
    }
}

/// Minimal mined receipt for `hash`
pub fn receipt(hash: TxHash, success: bool) -> TransactionReceipt {
    let status = if success { "0x1" } else { "0x0" };
    let receipt = json!({
        "type": "0x2",
        "status": status,
        "cumulativeGasUsed": "0x5208",
        "logs": [],
        "logsBloom": format!("0x{}", "0".repeat(512)),
        "transactionHash": hash,
        "transactionIndex": "0x0",
        "blockHash": B256::repeat_byte(0x0b),
        "blockNumber": "0x1",
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca00",
        "blobGasUsed": null,
        "blobGasPrice": null,
        "from": Address::repeat_byte(0x01),
        "to": Address::repeat_byte(0x22),
        "contractAddress": null
    });
    serde_json::from_value(receipt).unwrap()
}

enum MockFailure {
    Message(String),
    Cancelled,
    Panic,
}

/// Transaction signer that counts calls and takes `delay` to prepare
pub struct MockTransactionSigner {
    inner: PlainTransactionSigner<TestAccount, MockChainClient>,
    delay: Duration,
    failure: Option<MockFailure>,
    prepare_calls: AtomicUsize,
    sign_calls: AtomicUsize,
}

impl MockTransactionSigner {
    fn build(delay: Duration, failure: Option<MockFailure>) -> Self {
        let inner = PlainTransactionSigner::new(
            Arc::new(TestAccount::random()),
            Arc::new(MockChainClient::default()),
        )
        .unwrap();
        Self {
            inner,
            delay,
            failure,
            prepare_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self::build(delay, None)
    }

    /// Prepare fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self::build(Duration::ZERO, Some(MockFailure::Message(message.into())))
    }

    /// Prepare fails with the cancellation sentinel
    pub fn cancelling() -> Self {
        Self::build(Duration::ZERO, Some(MockFailure::Cancelled))
    }

    /// Prepare panics
    pub fn panicking() -> Self {
        Self::build(Duration::ZERO, Some(MockFailure::Panic))
    }

    pub fn prepare_calls(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }
}

impl TransactionSigner for MockTransactionSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn prepare_transaction(&self, request: TxRequest) -> Result<TxRequest> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        match &self.failure {
            Some(MockFailure::Message(message)) => Err(eyre!("{}", message)),
            Some(MockFailure::Cancelled) => Err(Report::new(SignerError::Cancelled)),
            Some(MockFailure::Panic) => panic!("signer crashed"),
            None => self.inner.prepare_transaction(request).await,
        }
    }

    async fn sign_transaction(&self, request: TxRequest) -> Result<SignedTransaction> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_transaction(request).await
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature> {
        self.inner.sign_typed_data(typed_data).await
    }

    async fn send_transaction(&self, signed: &SignedTransaction) -> Result<TxHash> {
        self.inner.send_transaction(signed).await
    }

    async fn send_transaction_sync(&self, signed: &SignedTransaction) -> Result<TransactionReceipt> {
        self.inner.send_transaction_sync(signed).await
    }
}

/// Classic exact-input trade of `input_amount` for `output_amount`
pub fn swap_context(input_amount: u64, output_amount: u64) -> SwapTradeContext {
    SwapTradeContext {
        routing: Routing::Classic,
        trade_type: TradeType::ExactInput,
        input_token: Address::repeat_byte(0xaa),
        output_token: Address::repeat_byte(0xbb),
        input_amount: U256::from(input_amount),
        output_amount: U256::from(output_amount),
        slippage_tolerance: 0.5,
        quote_id: None,
    }
}

/// Pending activity record for a batch created by `connector_id`
pub fn pending_batch(id: &str, batch_id: &str, connector_id: &str) -> TransactionDetails {
    TransactionDetails::pending(id, TEST_CHAIN_ID, Address::repeat_byte(0x01), 0).with_batch_info(
        BatchInfo {
            batch_id: batch_id.to_string(),
            chain_id: TEST_CHAIN_ID,
            connector_id: connector_id.to_string(),
        },
    )
}

#[derive(Clone)]
enum ScriptedStatus {
    Respond(Value),
    Fail(String),
}

/// Wallet connector answering status queries from a per-batch script
///
/// The last scripted answer repeats once the script is exhausted.
pub struct ScriptedConnector {
    id: String,
    connected: AtomicBool,
    scripts: Mutex<HashMap<String, VecDeque<ScriptedStatus>>>,
    queries: Mutex<HashMap<String, usize>>,
    sent_calls: Mutex<Vec<SendCallsRequest>>,
}

impl ScriptedConnector {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            connected: AtomicBool::new(true),
            scripts: Mutex::new(HashMap::new()),
            queries: Mutex::new(HashMap::new()),
            sent_calls: Mutex::new(Vec::new()),
        }
    }

    fn script(&self, batch_id: &str, script: Vec<ScriptedStatus>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(batch_id.to_string(), script.into());
    }

    pub fn respond(&self, batch_id: &str, response: Value) {
        self.script(batch_id, vec![ScriptedStatus::Respond(response)]);
    }

    pub fn respond_in_order(&self, batch_id: &str, responses: Vec<Value>) {
        self.script(
            batch_id,
            responses.into_iter().map(ScriptedStatus::Respond).collect(),
        );
    }

    pub fn fail(&self, batch_id: &str, message: &str) {
        self.script(batch_id, vec![ScriptedStatus::Fail(message.to_string())]);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn status_queries(&self, batch_id: &str) -> usize {
        self.queries
            .lock()
            .unwrap()
            .get(batch_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn sent_calls(&self) -> Vec<SendCallsRequest> {
        self.sent_calls.lock().unwrap().clone()
    }

    fn next_status(&self, batch_id: &str) -> Option<ScriptedStatus> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.get_mut(batch_id)?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

impl WalletConnector for ScriptedConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_calls(&self, request: SendCallsRequest) -> Result<String> {
        let mut sent = self.sent_calls.lock().unwrap();
        sent.push(request);
        Ok(format!("0xbatch{}", sent.len()))
    }

    async fn get_calls_status(&self, batch_id: &str) -> Result<Value> {
        *self
            .queries
            .lock()
            .unwrap()
            .entry(batch_id.to_string())
            .or_insert(0) += 1;

        match self.next_status(batch_id) {
            Some(ScriptedStatus::Respond(response)) => Ok(response),
            Some(ScriptedStatus::Fail(message)) => Err(eyre!("{}", message)),
            None => Err(eyre!("unknown batch {}", batch_id)),
        }
    }
}
