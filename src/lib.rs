//! Swap transaction pipeline
//!
//! Signing and confirmation plumbing for wallet swap transactions on EVM chains.
//!
//! # Features
//!
//! - Plain and EIP-7702 delegated transaction signers behind one [`TransactionSigner`] trait
//! - Speculative signing started before the user confirms, reused only while the trade is
//!   unchanged and the signature is fresh
//! - Polling of `wallet_sendCalls` batches until the wallet reports a terminal status
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use swap_tx_pipeline::*;
//!
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let config = NetworkConfig::from_env()?;
//!     let account = LocalAccountSigner::from_private_key("0x...", &config.rpc_url)?;
//!     let chain = RpcChainClient::new(&config.rpc_url)?;
//!     let plain = PlainTransactionSigner::new(Arc::new(account), Arc::new(chain))?;
//!     let signer = Arc::new(DelegatedTransactionSigner::new(plain, config.delegation_contract));
//!
//!     let cache = SpeculativeSigningCache::new(
//!         Arc::clone(&signer),
//!         PriceMovementComparator::default(),
//!         PipelineConfig::default(),
//!     );
//!     cache.prepare_and_sign(request.clone(), quoted_trade.clone()).await?;
//!
//!     // user confirms
//!     let service = TransactionService::new(signer, Arc::new(InMemoryActivityStore::new()));
//!     let hash = service.execute_swap("swap-1", &cache, request, &quoted_trade).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod constants;
pub mod error;
pub mod presign;
pub mod service;
pub mod signer;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use batch::{
    spawn_poller, BatchConfirmationPoller, BatchOutcome, Call, RpcWalletConnector,
    SendCallsRequest, WalletConnector,
};
pub use config::{NetworkConfig, PipelineConfig};
pub use error::{eyre, BatchProtocolError, Context, Report, Result, SignerError};
pub use presign::{is_valid_signed_transaction, PreSignedResult, SpeculativeSigningCache};
pub use service::TransactionService;
pub use signer::{
    AccountSigner, ChainClient, DelegatedTransactionSigner, LocalAccountSigner,
    PlainTransactionSigner, RpcChainClient, TransactionSigner,
};
pub use types::{
    ActivityStore, BatchInfo, FeeParams, InMemoryActivityStore, PriceMovementComparator, Routing,
    SignedTransaction, SwapTradeContext, TradeComparator, TradeType, TransactionDetails,
    TransactionPatch, TransactionStatus, TxRequest,
};
