//! `wallet_getCallsStatus` response decoding

use super::legacy;
use crate::error::{BatchProtocolError, Result};
use crate::types::TransactionStatus;
use serde::Deserialize;
use serde_json::Value;

/// Top-level `status` field: a numeric HTTP-like code, or a legacy label
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CallsStatusCode {
    Code(u64),
    Label(String),
}

/// Receipt `status`: hex quantity (`"0x1"`) or a plain number (`1`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReceiptStatus {
    Number(u64),
    Hex(String),
}

impl ReceiptStatus {
    pub fn succeeded(&self) -> bool {
        match self {
            ReceiptStatus::Number(value) => *value == 1,
            ReceiptStatus::Hex(value) => {
                let digits = value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                    .unwrap_or(value);
                u64::from_str_radix(digits, 16).is_ok_and(|v| v == 1)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    pub status: ReceiptStatus,
    pub transaction_hash: String,
}

impl CallReceipt {
    /// Terminal outcome carried by this receipt
    pub fn outcome(&self) -> BatchOutcome {
        let status = if self.status.succeeded() {
            TransactionStatus::Confirmed
        } else {
            TransactionStatus::Failed
        };
        BatchOutcome::Finalized {
            status,
            hash: Some(self.transaction_hash.clone()),
        }
    }
}

/// The fields of a calls-status response this crate consumes
///
/// Receipts stay raw until a terminal status needs one; a pending batch may carry partial
/// receipts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallsStatusResponse {
    pub status: CallsStatusCode,
    #[serde(default)]
    pub receipts: Option<Vec<Value>>,
}

impl CallsStatusResponse {
    /// Decode the first receipt, if there is one
    pub fn first_receipt(&self, connector: &str) -> Result<Option<CallReceipt>> {
        let Some(raw) = self.receipts.as_ref().and_then(|receipts| receipts.first()) else {
            return Ok(None);
        };
        let receipt = serde_json::from_value(raw.clone()).map_err(|_| {
            BatchProtocolError::UnexpectedStatus {
                connector: connector.to_string(),
                status: format!("malformed receipt {}", raw),
            }
        })?;
        Ok(Some(receipt))
    }
}

/// What one status query tells the poller to do with the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Not terminal yet; poll again on the next tick
    Pending,
    Finalized {
        status: TransactionStatus,
        hash: Option<String>,
    },
}

/// Batch executed successfully
const STATUS_SUCCESS: u64 = 200;
/// Lower bound of the failure codes
const STATUS_FAILURE: u64 = 400;

/// Decode a raw response from `connector` into an outcome
///
/// Shape violations are returned as [`BatchProtocolError`].
pub fn interpret_calls_status(connector: &str, raw: Value) -> Result<BatchOutcome> {
    let response: CallsStatusResponse =
        serde_json::from_value(raw.clone()).map_err(|_| BatchProtocolError::UnexpectedStatus {
            connector: connector.to_string(),
            status: raw.to_string(),
        })?;

    match &response.status {
        CallsStatusCode::Label(label) => legacy::interpret(connector, label, &response),
        CallsStatusCode::Code(code) => interpret_code(connector, *code, &response),
    }
}

fn interpret_code(connector: &str, code: u64, response: &CallsStatusResponse) -> Result<BatchOutcome> {
    if code != STATUS_SUCCESS && code < STATUS_FAILURE {
        return Ok(BatchOutcome::Pending);
    }
    let receipt = response.first_receipt(connector)?;

    match code {
        STATUS_SUCCESS => match receipt {
            Some(receipt) => Ok(receipt.outcome()),
            None => Err(missing_receipt(connector, code)),
        },
        code if code >= STATUS_FAILURE => match receipt {
            Some(receipt) => Ok(BatchOutcome::Finalized {
                status: TransactionStatus::Failed,
                hash: Some(receipt.transaction_hash.clone()),
            }),
            None => Err(missing_receipt(connector, code)),
        },
        _ => Ok(BatchOutcome::Pending),
    }
}

fn missing_receipt(connector: &str, code: u64) -> eyre::Report {
    BatchProtocolError::MissingReceipt {
        connector: connector.to_string(),
        status: format!("status {}", code),
    }
    .into()
}
