//! Transaction signer service
//!
//! This module provides a trait-based abstraction for preparing, signing and sending
//! transactions, with two interchangeable strategies:
//! - [`PlainTransactionSigner`]: signs the request as given (legacy or EIP-1559 envelope)
//! - [`DelegatedTransactionSigner`]: bundles an EIP-7702 delegation authorization and signs a
//!   set-code envelope
//!
//! Both sit on top of two collaborators: an [`AccountSigner`] holding the key and a
//! [`ChainClient`] that can broadcast raw payloads.

mod delegated;
mod local;
mod plain;

pub use delegated::DelegatedTransactionSigner;
pub use local::{LocalAccountSigner, RpcChainClient};
pub(crate) use local::{connect, ReadProvider};
pub use plain::PlainTransactionSigner;

use crate::types::{SignedTransaction, TxRequest};
use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, Bytes, Signature, TxHash, B256};
use alloy::rpc::types::TransactionReceipt;
use eyre::Result;
use std::future::Future;

/// Key-level signer for a single account
pub trait AccountSigner: Send + Sync {
    /// Returns the account address
    fn address(&self) -> Address;

    /// Fill in nonce, fees, gas limit and chain id that the request leaves open
    fn populate_transaction(&self, tx: TxRequest) -> impl Future<Output = Result<TxRequest>> + Send;

    /// Sign a 32-byte prehash (transaction or authorization signing hash)
    fn sign_hash(&self, hash: B256) -> impl Future<Output = Result<Signature>> + Send;

    /// Sign EIP-712 typed data
    fn sign_typed_data(&self, typed_data: &TypedData)
        -> impl Future<Output = Result<Signature>> + Send;
}

/// Raw submission primitives of a chain RPC client
pub trait ChainClient: Send + Sync {
    /// Submit through the provider's standard send path
    fn send_transaction(&self, raw: Bytes) -> impl Future<Output = Result<TxHash>> + Send;

    /// Submit an already fully encoded payload straight to `eth_sendRawTransaction`
    fn send_raw_transaction(&self, raw: Bytes) -> impl Future<Output = Result<TxHash>> + Send;

    /// Submit and wait for the receipt in one call
    fn send_raw_transaction_sync(
        &self,
        raw: Bytes,
    ) -> impl Future<Output = Result<TransactionReceipt>> + Send;
}

/// Trait for preparing, signing and sending EVM transactions
///
/// Implementations must behave identically from the caller's point of view so that the
/// signing cache and immediate sends do not care which one they hold. Implementations
/// never retry; network and signing failures propagate unchanged.
pub trait TransactionSigner: Send + Sync {
    /// Returns the signer's EVM address
    fn address(&self) -> Address;

    /// Resolve derived fields (nonce, gas, fees, chain id) for the active account
    fn prepare_transaction(
        &self,
        request: TxRequest,
    ) -> impl Future<Output = Result<TxRequest>> + Send;

    /// Sign a fully populated request
    fn sign_transaction(
        &self,
        request: TxRequest,
    ) -> impl Future<Output = Result<SignedTransaction>> + Send;

    /// Sign EIP-712 typed data with the account key
    fn sign_typed_data(&self, typed_data: &TypedData)
        -> impl Future<Output = Result<Signature>> + Send;

    /// Submit a signed payload, returning the transaction hash
    fn send_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> impl Future<Output = Result<TxHash>> + Send;

    /// Submit a signed payload and wait for its receipt
    fn send_transaction_sync(
        &self,
        signed: &SignedTransaction,
    ) -> impl Future<Output = Result<TransactionReceipt>> + Send;

    /// Prepare, sign and send in one go
    fn sign_and_send_transaction(
        &self,
        request: TxRequest,
    ) -> impl Future<Output = Result<TxHash>> + Send {
        async move {
            let prepared = self.prepare_transaction(request).await?;
            let signed = self.sign_transaction(prepared).await?;
            self.send_transaction(&signed).await
        }
    }
}
