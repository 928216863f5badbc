//! Local private key signer and JSON-RPC chain client

use super::{AccountSigner, ChainClient};
use crate::constants::SEND_RAW_TRANSACTION_SYNC_METHOD;
use crate::types::{FeeParams, TxRequest};
use alloy::dyn_abi::TypedData;
use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::{Address, Bytes, Signature, TxHash, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::transports::http::reqwest::Url;
use eyre::{Context, Result};
use std::sync::Arc;

/// Type alias for a provider without fillers
pub(crate) type ReadProvider = Arc<RootProvider<Ethereum>>;

pub(crate) fn connect(rpc_url: &str) -> Result<ReadProvider> {
    let url: Url = rpc_url.parse().context("Invalid RPC URL")?;
    // Fillers stay off: population is done explicitly so pre-filled fields are never replaced
    let provider = ProviderBuilder::new()
        .disable_recommended_fillers()
        .network::<Ethereum>()
        .connect_http(url);
    Ok(Arc::new(provider))
}

/// Local signer using a private key
///
/// Signs locally and reads nonce, fees and gas estimates from the RPC endpoint.
pub struct LocalAccountSigner {
    signer: PrivateKeySigner,
    provider: ReadProvider,
}

impl LocalAccountSigner {
    /// Create a new LocalAccountSigner from a private key hex string
    ///
    /// # Arguments
    ///
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    /// * `rpc_url` - RPC endpoint URL
    pub fn from_private_key(private_key: impl AsRef<str>, rpc_url: impl AsRef<str>) -> Result<Self> {
        let key = private_key.as_ref();
        let key = key.strip_prefix("0x").unwrap_or(key);

        let signer: PrivateKeySigner = key.parse().context("Failed to parse private key")?;
        let provider = connect(rpc_url.as_ref())?;

        Ok(Self { signer, provider })
    }
}

impl AccountSigner for LocalAccountSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn populate_transaction(&self, mut tx: TxRequest) -> Result<TxRequest> {
        let from = tx.from.unwrap_or_else(|| self.signer.address());
        tx.from = Some(from);

        if tx.chain_id.is_none() {
            let chain_id = self
                .provider
                .get_chain_id()
                .await
                .context("Failed to get chain id")?;
            tx.chain_id = Some(chain_id);
        }

        if tx.nonce.is_none() {
            let nonce = self
                .provider
                .get_transaction_count(from)
                .pending()
                .await
                .context("Failed to get transaction count")?;
            tx.nonce = Some(nonce);
        }

        if tx.fees.is_none() {
            let estimate = self
                .provider
                .estimate_eip1559_fees()
                .await
                .context("Failed to estimate fees")?;
            tx.fees = Some(FeeParams::Eip1559 {
                max_fee_per_gas: estimate.max_fee_per_gas,
                max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
            });
        }

        if tx.gas_limit.is_none() {
            let mut call = alloy::rpc::types::TransactionRequest::default()
                .with_from(from)
                .with_value(tx.value)
                .with_input(tx.data.clone());
            if let Some(to) = tx.to {
                call = call.with_to(to);
            }

            let gas = self
                .provider
                .estimate_gas(call)
                .await
                .context("Failed to estimate gas")?;
            tx.gas_limit = Some(gas);
        }

        Ok(tx)
    }

    async fn sign_hash(&self, hash: B256) -> Result<Signature> {
        Ok(self.signer.sign_hash(&hash).await?)
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature> {
        Ok(self.signer.sign_dynamic_typed_data(typed_data).await?)
    }
}

/// Chain client over an HTTP JSON-RPC endpoint
#[derive(Clone)]
pub struct RpcChainClient {
    provider: ReadProvider,
}

impl RpcChainClient {
    pub fn new(rpc_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            provider: connect(rpc_url.as_ref())?,
        })
    }
}

impl ChainClient for RpcChainClient {
    async fn send_transaction(&self, raw: Bytes) -> Result<TxHash> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .context("eth_sendRawTransaction failed")?;
        Ok(*pending.tx_hash())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash> {
        let hash: TxHash = self
            .provider
            .raw_request("eth_sendRawTransaction".into(), (raw,))
            .await
            .context("eth_sendRawTransaction failed")?;
        Ok(hash)
    }

    async fn send_raw_transaction_sync(&self, raw: Bytes) -> Result<TransactionReceipt> {
        let receipt: TransactionReceipt = self
            .provider
            .raw_request(SEND_RAW_TRANSACTION_SYNC_METHOD.into(), (raw,))
            .await
            .with_context(|| format!("{} failed", SEND_RAW_TRANSACTION_SYNC_METHOD))?;
        Ok(receipt)
    }
}
