// services/transaction_ledger.rs
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::mpesa_transactions::{CallbackPayload, MpesaTransaction, TransactionStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Entries kept before the oldest are evicted. The callback route is
/// unauthenticated, so the ledger must not grow with whatever it is sent.
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct Entries {
    by_checkout: HashMap<String, MpesaTransaction>,
    // checkout ids, oldest `created_at` first
    order: VecDeque<String>,
}

/// Callback outcomes keyed by checkout request id. Bounded; the oldest
/// record goes first once `capacity` is reached.
#[derive(Debug)]
pub struct TransactionLedger {
    transactions: RwLock<Entries>,
    capacity: usize,
}

impl Default for TransactionLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        TransactionLedger {
            transactions: RwLock::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    /// Gateways redeliver callbacks, so a repeat keeps the original
    /// `created_at` and its place in the eviction order.
    pub async fn record(&self, payload: CallbackPayload) -> MpesaTransaction {
        let mut entries = self.transactions.write().await;
        let mut transaction = MpesaTransaction::from(payload);

        let first_seen = entries
            .by_checkout
            .get(&transaction.checkout_request_id)
            .map(|existing| existing.created_at);

        if let Some(created_at) = first_seen {
            transaction.created_at = created_at;
            transaction.updated_at = Utc::now();
        } else {
            while entries.by_checkout.len() >= self.capacity {
                let Some(oldest) = entries.order.pop_front() else {
                    break;
                };
                entries.by_checkout.remove(&oldest);
                debug!("Ledger full, evicted {}", oldest);
            }
            entries
                .order
                .push_back(transaction.checkout_request_id.clone());
        }

        entries
            .by_checkout
            .insert(transaction.checkout_request_id.clone(), transaction.clone());
        transaction
    }

    pub async fn get(&self, checkout_request_id: &str) -> Option<MpesaTransaction> {
        self.transactions
            .read()
            .await
            .by_checkout
            .get(checkout_request_id)
            .cloned()
    }

    pub async fn list(&self) -> Vec<MpesaTransaction> {
        let mut all: Vec<_> = self
            .transactions
            .read()
            .await
            .by_checkout
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub async fn stats(&self) -> LedgerStats {
        let entries = self.transactions.read().await;
        let transactions = &entries.by_checkout;
        let successful = transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Completed)
            .count();
        LedgerStats {
            total: transactions.len(),
            successful,
            failed: transactions.len() - successful,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(checkout: &str, result_code: i64) -> CallbackPayload {
        CallbackPayload {
            merchant_request_id: format!("m-{}", checkout),
            checkout_request_id: checkout.to_string(),
            result_code,
            result_desc: "desc".to_string(),
            amount: (result_code == 0).then_some(451.0),
            mpesa_receipt_number: (result_code == 0).then(|| "NLJ7RT61SV".to_string()),
            transaction_date: None,
            phone_number: None,
        }
    }

    #[tokio::test]
    async fn records_and_counts_outcomes() {
        let ledger = TransactionLedger::new();
        ledger.record(payload("ws_CO_1", 0)).await;
        ledger.record(payload("ws_CO_2", 1032)).await;
        ledger.record(payload("ws_CO_3", 0)).await;

        assert_eq!(
            ledger.stats().await,
            LedgerStats { total: 3, successful: 2, failed: 1 }
        );

        let failed = ledger.get("ws_CO_2").await.unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(failed.paid_amount, None);
        assert!(ledger.get("ws_CO_404").await.is_none());
    }

    #[tokio::test]
    async fn redelivery_keeps_creation_time() {
        let ledger = TransactionLedger::new();
        let first = ledger.record(payload("ws_CO_1", 0)).await;
        let second = ledger.record(payload("ws_CO_1", 0)).await;

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(ledger.list().await.len(), 1);
    }

    #[tokio::test]
    async fn oldest_record_is_evicted_at_capacity() {
        let ledger = TransactionLedger::with_capacity(2);
        ledger.record(payload("ws_CO_1", 0)).await;
        ledger.record(payload("ws_CO_2", 1032)).await;
        // redelivery neither grows the ledger nor evicts
        ledger.record(payload("ws_CO_1", 0)).await;
        assert_eq!(ledger.stats().await.total, 2);

        ledger.record(payload("ws_CO_3", 0)).await;

        assert!(ledger.get("ws_CO_1").await.is_none());
        assert!(ledger.get("ws_CO_2").await.is_some());
        assert!(ledger.get("ws_CO_3").await.is_some());
        assert_eq!(
            ledger.stats().await,
            LedgerStats { total: 2, successful: 1, failed: 1 }
        );
    }
}
