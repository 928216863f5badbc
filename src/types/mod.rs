//! Data model shared by the signer, the signing cache and the batch poller

pub mod activity;
pub mod trade;
pub mod transaction;

pub use activity::{
    ActivityStore, BatchInfo, InMemoryActivityStore, TransactionDetails, TransactionPatch,
    TransactionStatus,
};
pub use trade::{PriceMovementComparator, Routing, SwapTradeContext, TradeComparator, TradeType};
pub use transaction::{FeeParams, SignedTransaction, TxRequest};
