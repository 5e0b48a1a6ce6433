use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error, info};
use rust_decimal::Decimal;

use super::config::AmountMode;
use super::extractor::{aggregate_movement, AccountDelta};
use super::types::WhaleTransaction;
use crate::clock::Clock;
use crate::ledger::{lamports_to_sol, LedgerTransaction};
use crate::retry::{RetryConfig, RetryHandler};
use crate::store::{InsertOutcome, StoreError, WhaleStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Stored,
    AlreadyStored,
    NotWhaleRelated,
    Malformed,
    Dropped,
}

/// Persists transactions that involve a whale, at most once per signature.
pub struct TransactionRecorder {
    store: Arc<dyn WhaleStore>,
    clock: Arc<dyn Clock>,
    retry_handler: RetryHandler,
    amount_mode: AmountMode,
}

impl TransactionRecorder {
    pub fn new(
        store: Arc<dyn WhaleStore>,
        clock: Arc<dyn Clock>,
        retry_config: RetryConfig,
        amount_mode: AmountMode,
    ) -> Self {
        Self {
            store,
            clock,
            retry_handler: RetryHandler::new(retry_config),
            amount_mode,
        }
    }

    /// `resolved_whales` are the addresses classified as whales while
    /// processing this transaction. Never fails; the outcome is informational.
    pub async fn record_if_whale_involved(
        &self,
        transaction: &LedgerTransaction,
        deltas: &[AccountDelta],
        resolved_whales: &HashSet<String>,
    ) -> RecordOutcome {
        let record = match self.build_record(transaction, deltas) {
            Some(record) => record,
            None => {
                error!("Invalid transaction structure, not storing: {:?}", transaction.signature);
                return RecordOutcome::Malformed;
            }
        };

        let involved = match self.involved_whales(&record, resolved_whales).await {
            Ok(involved) => involved,
            Err(e) => {
                error!(
                    "Error checking whale involvement for {} ({} -> {}): {}",
                    record.signature, record.from_wallet, record.to_wallet, e
                );
                return RecordOutcome::Dropped;
            }
        };

        if involved.is_empty() {
            debug!("Transaction {} not involving a whale wallet, skipping storage", record.signature);
            return RecordOutcome::NotWhaleRelated;
        }

        let record = WhaleTransaction {
            involved_whales: involved,
            ..record
        };
        self.store_with_retry(record, transaction).await
    }

    fn build_record(&self, transaction: &LedgerTransaction, deltas: &[AccountDelta]) -> Option<WhaleTransaction> {
        let signature = transaction.signature.clone()?;
        let from_wallet = transaction.account_keys.first()?.clone();
        let to_wallet = transaction.account_keys.get(1)?.clone();

        let amount = match self.amount_mode {
            AmountMode::Receiver => receiver_amount(transaction)?,
            AmountMode::Aggregate => aggregate_movement(deltas),
        };

        Some(WhaleTransaction {
            signature,
            from_wallet,
            to_wallet,
            amount: amount.round_dp(8),
            timestamp: self.timestamp_of(transaction),
            involved_whales: Vec::new(),
        })
    }

    // Block time when the node reports one, otherwise ingestion time
    fn timestamp_of(&self, transaction: &LedgerTransaction) -> DateTime<Utc> {
        transaction
            .block_time
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
            .unwrap_or_else(|| self.clock.now())
    }

    async fn involved_whales(
        &self,
        record: &WhaleTransaction,
        resolved_whales: &HashSet<String>,
    ) -> Result<Vec<String>, StoreError> {
        let mut involved = Vec::new();
        for address in [&record.from_wallet, &record.to_wallet] {
            if involved.contains(address) {
                continue;
            }
            // Resolved in this transaction, or still a whale from earlier blocks
            if resolved_whales.contains(address) || self.store.get_wallet(address).await?.is_some() {
                involved.push(address.clone());
            }
        }
        Ok(involved)
    }

    async fn store_with_retry(&self, record: WhaleTransaction, raw: &LedgerTransaction) -> RecordOutcome {
        let result = self
            .retry_handler
            .retry(
                || self.store.insert_transaction(record.clone()),
                StoreError::is_transient,
            )
            .await;

        match result {
            Ok(InsertOutcome::Inserted) => {
                info!(
                    "Stored whale transaction: {} ({} -> {}, {} SOL)",
                    record.signature, record.from_wallet, record.to_wallet, record.amount
                );
                RecordOutcome::Stored
            }
            Ok(InsertOutcome::AlreadyPresent) => {
                debug!("Transaction {} already stored", record.signature);
                RecordOutcome::AlreadyStored
            }
            Err(e) => {
                error!("Error storing transaction {}: {}", record.signature, e);
                error!(
                    "Transaction info: {}",
                    serde_json::to_string(raw).unwrap_or_else(|_| format!("{:?}", raw))
                );
                RecordOutcome::Dropped
            }
        }
    }
}

/// Magnitude of the second account's balance change.
pub fn receiver_amount(transaction: &LedgerTransaction) -> Option<Decimal> {
    let pre = *transaction.pre_balances.as_ref()?.get(1)?;
    let post = *transaction.post_balances.as_ref()?.get(1)?;
    Some(lamports_to_sol(post.abs_diff(pre)))
}
