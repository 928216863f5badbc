//! Trade context supplied by the quoting engine, and the rule for "the trade changed"

use crate::constants::{ACCEPT_NEW_TRADE_THRESHOLD_BPS, BPS_DENOMINATOR};
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// How the quoting engine intends to execute the trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Routing {
    Classic,
    DutchV2,
    DutchV3,
    Priority,
    Bridge,
    Wrap,
    Unwrap,
}

/// Whether the input or the output amount is the fixed side of the trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    ExactInput,
    ExactOutput,
}

/// The trade the user is currently looking at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTradeContext {
    pub routing: Routing,
    pub trade_type: TradeType,
    pub input_token: Address,
    pub output_token: Address,
    /// Quoted input amount in the token's base units
    pub input_amount: U256,
    /// Quoted output amount in the token's base units
    pub output_amount: U256,
    /// Slippage tolerance in percent (e.g. 0.5 for 0.5%)
    pub slippage_tolerance: f64,
    /// Identifier of the quote, when the quoting engine provides one
    pub quote_id: Option<String>,
}

/// The quoting engine's "should accept new trade" rule
///
/// Returns true when `new` differs materially from `old`, meaning a signature produced
/// for `old` must not be used for `new`.
pub trait TradeComparator: Send + Sync {
    fn should_accept_new_trade(&self, old: &SwapTradeContext, new: &SwapTradeContext) -> bool;
}

impl<F> TradeComparator for F
where
    F: Fn(&SwapTradeContext, &SwapTradeContext) -> bool + Send + Sync,
{
    fn should_accept_new_trade(&self, old: &SwapTradeContext, new: &SwapTradeContext) -> bool {
        self(old, new)
    }
}

/// Accept-new-trade rule based on execution price movement
///
/// A new trade needs acceptance when its type or tokens differ, or when its execution
/// price (output per input) is worse than the old one by more than `threshold_bps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceMovementComparator {
    pub threshold_bps: u32,
}

impl Default for PriceMovementComparator {
    fn default() -> Self {
        Self {
            threshold_bps: ACCEPT_NEW_TRADE_THRESHOLD_BPS,
        }
    }
}

impl PriceMovementComparator {
    pub fn new(threshold_bps: u32) -> Self {
        Self {
            threshold_bps: threshold_bps.min(BPS_DENOMINATOR),
        }
    }

    /// new_out / new_in < (old_out / old_in) * (1 - threshold), compared by cross-multiplying.
    /// Overflow counts as a material move.
    fn price_moved_adversely(&self, old: &SwapTradeContext, new: &SwapTradeContext) -> bool {
        let denominator = U256::from(BPS_DENOMINATOR);
        let tolerated = U256::from(BPS_DENOMINATOR.saturating_sub(self.threshold_bps));

        let new_side = new
            .output_amount
            .checked_mul(old.input_amount)
            .and_then(|v| v.checked_mul(denominator));
        let worst_old_side = old
            .output_amount
            .checked_mul(new.input_amount)
            .and_then(|v| v.checked_mul(tolerated));

        match (new_side, worst_old_side) {
            (Some(new_side), Some(worst_old_side)) => new_side < worst_old_side,
            _ => true,
        }
    }
}

impl TradeComparator for PriceMovementComparator {
    fn should_accept_new_trade(&self, old: &SwapTradeContext, new: &SwapTradeContext) -> bool {
        old.trade_type != new.trade_type
            || old.input_token != new.input_token
            || old.output_token != new.output_token
            || self.price_moved_adversely(old, new)
    }
}
