//! Transaction activity records and the store the UI observes

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Lifecycle status of an activity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Batch metadata attached to a transaction submitted as a wallet-level batch of calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    /// Opaque identifier returned by the wallet
    pub batch_id: String,
    pub chain_id: u64,
    /// Wallet integration that created the batch; only it can answer status queries
    pub connector_id: String,
}

/// An entry in the activity store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub id: String,
    pub chain_id: u64,
    pub from: Address,
    pub status: TransactionStatus,
    /// Transaction hash as reported by the chain or wallet
    pub hash: Option<String>,
    pub batch_info: Option<BatchInfo>,
    pub added_time: u64,
}

impl TransactionDetails {
    pub fn pending(id: impl Into<String>, chain_id: u64, from: Address, added_time: u64) -> Self {
        Self {
            id: id.into(),
            chain_id,
            from,
            status: TransactionStatus::Pending,
            hash: None,
            batch_info: None,
            added_time,
        }
    }

    pub fn with_batch_info(mut self, batch_info: BatchInfo) -> Self {
        self.batch_info = Some(batch_info);
        self
    }
}

/// Partial update merged into an existing record; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPatch {
    pub status: Option<TransactionStatus>,
    pub hash: Option<String>,
}

impl TransactionPatch {
    /// Terminal status plus the hash when one is known
    pub fn finalized(status: TransactionStatus, hash: Option<String>) -> Self {
        Self {
            status: Some(status),
            hash,
        }
    }

    pub fn hash(hash: impl Into<String>) -> Self {
        Self {
            status: None,
            hash: Some(hash.into()),
        }
    }

    fn apply(self, details: &mut TransactionDetails) {
        if let Some(status) = self.status {
            details.status = status;
        }
        if let Some(hash) = self.hash {
            details.hash = Some(hash);
        }
    }
}

/// Transaction activity store
///
/// Calls are synchronous and never held across an await point.
pub trait ActivityStore: Send + Sync {
    fn add_transaction(&self, details: TransactionDetails);

    /// Merge `patch` into the record with `id`; returns false when there is no such record
    fn merge_update(&self, id: &str, patch: TransactionPatch) -> bool;

    fn get(&self, id: &str) -> Option<TransactionDetails>;

    /// All records still in `Pending`, oldest first
    fn pending_transactions(&self) -> Vec<TransactionDetails>;
}

/// Process-local activity store
#[derive(Debug, Default)]
pub struct InMemoryActivityStore {
    records: Mutex<HashMap<String, TransactionDetails>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, TransactionDetails>> {
        // A poisoned map is still structurally valid; keep serving it.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ActivityStore for InMemoryActivityStore {
    fn add_transaction(&self, details: TransactionDetails) {
        self.records().insert(details.id.clone(), details);
    }

    fn merge_update(&self, id: &str, patch: TransactionPatch) -> bool {
        match self.records().get_mut(id) {
            Some(details) => {
                patch.apply(details);
                true
            }
            None => {
                tracing::warn!(transaction_id = id, "Activity update for unknown transaction");
                false
            }
        }
    }

    fn get(&self, id: &str) -> Option<TransactionDetails> {
        self.records().get(id).cloned()
    }

    fn pending_transactions(&self) -> Vec<TransactionDetails> {
        let mut pending: Vec<_> = self
            .records()
            .values()
            .filter(|details| details.status == TransactionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.added_time.cmp(&b.added_time).then_with(|| a.id.cmp(&b.id)));
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_absent_fields() {
        let store = InMemoryActivityStore::new();
        store.add_transaction(TransactionDetails::pending("tx-1", 1, Address::ZERO, 10));

        assert!(store.merge_update("tx-1", TransactionPatch::hash("0xabc")));
        assert!(store.merge_update(
            "tx-1",
            TransactionPatch::finalized(TransactionStatus::Confirmed, None)
        ));

        let details = store.get("tx-1").unwrap();
        assert_eq!(details.status, TransactionStatus::Confirmed);
        assert_eq!(details.hash.as_deref(), Some("0xabc"));
        assert!(store.pending_transactions().is_empty());
    }

    #[test]
    fn test_unknown_record_is_reported() {
        let store = InMemoryActivityStore::new();
        assert!(!store.merge_update("missing", TransactionPatch::default()));
    }

    #[test]
    fn test_pending_is_ordered_by_added_time() {
        let store = InMemoryActivityStore::new();
        store.add_transaction(TransactionDetails::pending("b", 1, Address::ZERO, 20));
        store.add_transaction(TransactionDetails::pending("a", 1, Address::ZERO, 10));
        let ids: Vec<_> = store
            .pending_transactions()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }
}
