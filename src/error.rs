//! Error types for the swap transaction pipeline
//!
//! Uses `eyre` for ergonomic error handling with context. The kinds a caller has to tell
//! apart travel inside the report and are recovered with [`Report::downcast_ref`].

use alloy::primitives::Address;

pub use eyre::{eyre, Context, Report, Result};

/// Display text of the cancellation sentinel
pub const CANCELLED_MESSAGE: &str = "Action was cancelled";

/// Failures raised by the signer service before any network call is made
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("No signer available for account {account}")]
    SignerUnavailable { account: Address },

    #[error("Invalid delegation config: {0}")]
    InvalidDelegationConfig(String),

    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Transaction is missing {0}; call prepare_transaction first")]
    IncompleteTransaction(&'static str),

    #[error("Authorization nonce {actual} does not match transaction nonce + 1 ({expected})")]
    AuthorizationNonceMismatch { expected: u64, actual: u64 },

    #[error("Action was cancelled")]
    Cancelled,
}

/// A wallet answered `wallet_getCallsStatus` in a way that breaks the protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchProtocolError {
    #[error("{connector} returned {status} with no receipt")]
    MissingReceipt { connector: String, status: String },

    #[error("{connector} returned an unrecognized calls status: {status}")]
    UnexpectedStatus { connector: String, status: String },
}

/// Returns true when the report carries the cancellation sentinel
pub fn is_cancelled(report: &Report) -> bool {
    matches!(report.downcast_ref::<SignerError>(), Some(SignerError::Cancelled))
}
