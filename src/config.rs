//! Network and pipeline configuration

use crate::constants::{BATCH_POLL_INTERVAL, MAX_BATCH_POLL_FAILURES, SIGNED_TRANSACTION_STALENESS};
use alloy::primitives::Address;
use eyre::{Context, Result};
use std::time::Duration;

/// Network configuration: which chain to talk to and where delegated execution points
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Chain ID
    pub chain_id: u64,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Delegate contract for EIP-7702 execution (required by the delegated signer)
    pub delegation_contract: Option<Address>,
}

impl NetworkConfig {
    /// Create a configuration for a chain and RPC endpoint
    pub fn new(chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id,
            rpc_url: rpc_url.into(),
            delegation_contract: None,
        }
    }

    /// Load from `CHAIN_ID`, `RPC_URL` and optionally `DELEGATION_CONTRACT`
    ///
    /// Call `dotenvy::dotenv()` first if the values live in a `.env` file.
    pub fn from_env() -> Result<Self> {
        let chain_id = std::env::var("CHAIN_ID")
            .context("CHAIN_ID environment variable must be set")?
            .parse::<u64>()
            .context("CHAIN_ID must be an integer")?;
        let rpc_url = std::env::var("RPC_URL").context("RPC_URL environment variable must be set")?;

        let delegation_contract = match std::env::var("DELEGATION_CONTRACT") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse::<Address>()
                    .context("DELEGATION_CONTRACT is not a valid address")?,
            ),
            _ => None,
        };

        Ok(Self {
            chain_id,
            rpc_url,
            delegation_contract,
        })
    }

    /// Replace the RPC URL
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = rpc_url.into();
        self
    }

    /// Set the delegate contract used for EIP-7702 execution
    pub fn with_delegation_contract(mut self, delegation_contract: Address) -> Self {
        self.delegation_contract = Some(delegation_contract);
        self
    }
}

/// Timing and retry knobs shared by the signing cache and the batch poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Age after which a signed (or in-flight) transaction is no longer reused
    pub staleness_window: Duration,
    /// Delay between batch status sweeps
    pub batch_poll_interval: Duration,
    /// Consecutive poll failures tolerated before a batch is failed
    pub max_batch_poll_failures: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staleness_window: SIGNED_TRANSACTION_STALENESS,
            batch_poll_interval: BATCH_POLL_INTERVAL,
            max_batch_poll_failures: MAX_BATCH_POLL_FAILURES,
        }
    }
}

impl PipelineConfig {
    /// Set the staleness window
    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    /// Set the batch poll interval
    pub fn with_batch_poll_interval(mut self, interval: Duration) -> Self {
        self.batch_poll_interval = interval;
        self
    }

    /// Set the failure threshold (values below 1 are raised to 1)
    pub fn with_max_batch_poll_failures(mut self, max_failures: u32) -> Self {
        self.max_batch_poll_failures = max_failures.max(1);
        self
    }
}
