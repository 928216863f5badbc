//! Watch a wallet_sendCalls batch until it is terminal
//!
//! Run with: cargo run --example watch_batch -- <batch id>
//!
//! Requires CHAIN_ID and RPC_URL environment variables; WALLET_ID names the connector
//! (defaults to "rpc").

use std::sync::Arc;

use alloy::primitives::Address;
use swap_tx_pipeline::{
    spawn_poller, ActivityStore, BatchConfirmationPoller, BatchInfo, InMemoryActivityStore,
    NetworkConfig, PipelineConfig, RpcWalletConnector, TransactionDetails,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let batch_id = std::env::args()
        .nth(1)
        .ok_or_else(|| eyre::eyre!("usage: watch_batch <batch id>"))?;
    let wallet_id = std::env::var("WALLET_ID").unwrap_or_else(|_| "rpc".to_string());
    let config = NetworkConfig::from_env()?;

    let connector = Arc::new(RpcWalletConnector::new(wallet_id.clone(), &config.rpc_url)?);
    let store = Arc::new(InMemoryActivityStore::new());
    store.add_transaction(
        TransactionDetails::pending("watched", config.chain_id, Address::ZERO, 0).with_batch_info(
            BatchInfo {
                batch_id: batch_id.clone(),
                chain_id: config.chain_id,
                connector_id: wallet_id,
            },
        ),
    );

    println!("Watching batch {} on chain {}", batch_id, config.chain_id);

    let poller = Arc::new(BatchConfirmationPoller::new(
        connector,
        Arc::clone(&store),
        PipelineConfig::default(),
    ));
    spawn_poller(poller).await?;

    match store.get("watched") {
        Some(details) => println!(
            "Batch {} finished as {:?} (hash: {})",
            batch_id,
            details.status,
            details.hash.as_deref().unwrap_or("none")
        ),
        None => println!("Batch {} record disappeared", batch_id),
    }

    Ok(())
}
