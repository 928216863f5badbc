//! Legacy string-status shape of `wallet_getCallsStatus`
//!
//! Some wallets still answer with `"PENDING"` / `"CONFIRMED"` labels instead of numeric
//! codes. Kept apart from the numeric path so it can be deleted once those wallets move on.
//! Only `"CONFIRMED"` is actionable; any other label is polled again.

use super::status::{BatchOutcome, CallsStatusResponse};
use crate::error::{BatchProtocolError, Result};

const CONFIRMED: &str = "CONFIRMED";
const PENDING: &str = "PENDING";

pub(super) fn interpret(
    connector: &str,
    label: &str,
    response: &CallsStatusResponse,
) -> Result<BatchOutcome> {
    match label {
        CONFIRMED => match response.first_receipt(connector)? {
            Some(receipt) => Ok(receipt.outcome()),
            None => Err(BatchProtocolError::MissingReceipt {
                connector: connector.to_string(),
                status: CONFIRMED.to_string(),
            }
            .into()),
        },
        PENDING => Ok(BatchOutcome::Pending),
        other => {
            tracing::debug!(connector_id = connector, "Ignoring calls status {}", other);
            Ok(BatchOutcome::Pending)
        }
    }
}
