//! Timing, threshold and protocol constants

use std::time::Duration;

/// Maximum age of a speculatively signed transaction, measured from the start of signing
pub const SIGNED_TRANSACTION_STALENESS: Duration = Duration::from_secs(5);

/// Interval between two `wallet_getCallsStatus` sweeps
pub const BATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive failed polls after which a batch is finalized as failed
pub const MAX_BATCH_POLL_FAILURES: u32 = 4;

/// Price move (in basis points) beyond which a re-quoted trade needs the user's acceptance
pub const ACCEPT_NEW_TRADE_THRESHOLD_BPS: u32 = 100;

/// Basis points in 100%
pub const BPS_DENOMINATOR: u32 = 10_000;

/// EIP-2718 type byte of a set-code (EIP-7702) transaction
pub const EIP_7702_TX_TYPE: u8 = 0x04;

/// JSON-RPC method for batch status queries (EIP-5792)
pub const GET_CALLS_STATUS_METHOD: &str = "wallet_getCallsStatus";

/// JSON-RPC method for batch submission (EIP-5792)
pub const SEND_CALLS_METHOD: &str = "wallet_sendCalls";

/// Non-standard send-and-wait method used by the synchronous send path
pub const SEND_RAW_TRANSACTION_SYNC_METHOD: &str = "eth_sendRawTransactionSync";

/// Milliseconds since the unix epoch, saturating to zero on a clock before 1970
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
