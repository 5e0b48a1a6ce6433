use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use tokio::sync::RwLock;

use super::{ActivitySummary, InsertOutcome, StoreError, StoreStats, WhaleStore};
use crate::whale::types::{Wallet, WhaleTransaction};

type TimeKey = (DateTime<Utc>, String);

#[derive(Debug, Default)]
struct TransactionLog {
    by_signature: HashMap<String, WhaleTransaction>,
    by_time: BTreeSet<TimeKey>,
    by_address: HashMap<String, BTreeSet<TimeKey>>,
    // Earliest stored activity per address; outlives pruning.
    first_seen: HashMap<String, DateTime<Utc>>,
}

impl TransactionLog {
    fn insert(&mut self, transaction: WhaleTransaction) -> InsertOutcome {
        if self.by_signature.contains_key(&transaction.signature) {
            return InsertOutcome::AlreadyPresent;
        }

        let key = (transaction.timestamp, transaction.signature.clone());
        for address in parties(&transaction) {
            self.by_address
                .entry(address.to_string())
                .or_default()
                .insert(key.clone());
            self.first_seen
                .entry(address.to_string())
                .and_modify(|at| *at = (*at).min(transaction.timestamp))
                .or_insert(transaction.timestamp);
        }
        self.by_time.insert(key);
        self.by_signature.insert(transaction.signature.clone(), transaction);
        InsertOutcome::Inserted
    }

    /// Drop transactions older than `cutoff`. Returns how many went.
    fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut pruned = 0;
        while self.by_time.first().map_or(false, |(at, _)| *at < cutoff) {
            let Some(key) = self.by_time.pop_first() else { break };
            if let Some(transaction) = self.by_signature.remove(&key.1) {
                for address in parties(&transaction) {
                    if let Some(keys) = self.by_address.get_mut(address) {
                        keys.remove(&key);
                        if keys.is_empty() {
                            self.by_address.remove(address);
                        }
                    }
                }
            }
            pruned += 1;
        }
        pruned
    }

    fn newest(&self) -> Option<DateTime<Utc>> {
        self.by_time.last().map(|(at, _)| *at)
    }
}

fn parties(transaction: &WhaleTransaction) -> impl Iterator<Item = &str> {
    let to = (transaction.to_wallet != transaction.from_wallet).then_some(transaction.to_wallet.as_str());
    std::iter::once(transaction.from_wallet.as_str()).chain(to)
}

/// Process-local store. Enforces the same key constraints as the relational
/// schema: one wallet per address, one transaction per signature.
///
/// With a retention window, transactions older than the newest stored one
/// minus the window are dropped on insert. The earliest activity of each
/// address is kept so long-term holder checks still see it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    wallets: RwLock<HashMap<String, Wallet>>,
    transactions: RwLock<TransactionLog>,
    retention: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention: Some(retention),
            ..Self::default()
        }
    }
}

#[async_trait]
impl WhaleStore for MemoryStore {
    async fn get_wallet(&self, address: &str) -> Result<Option<Wallet>, StoreError> {
        Ok(self.wallets.read().await.get(address).cloned())
    }

    async fn upsert_wallet(&self, wallet: Wallet) -> Result<(), StoreError> {
        self.wallets.write().await.insert(wallet.address.clone(), wallet);
        Ok(())
    }

    async fn delete_wallet(&self, address: &str) -> Result<bool, StoreError> {
        Ok(self.wallets.write().await.remove(address).is_some())
    }

    async fn insert_transaction(
        &self,
        transaction: WhaleTransaction,
    ) -> Result<InsertOutcome, StoreError> {
        let mut log = self.transactions.write().await;
        let outcome = log.insert(transaction);

        if outcome == InsertOutcome::Inserted {
            let cutoff = self
                .retention
                .zip(log.newest())
                .and_then(|(retention, newest)| newest.checked_sub_signed(retention));
            if let Some(cutoff) = cutoff {
                let pruned = log.prune_before(cutoff);
                if pruned > 0 {
                    debug!("Pruned {} transactions older than {}", pruned, cutoff);
                }
            }
        }
        Ok(outcome)
    }

    async fn activity_since(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<ActivitySummary, StoreError> {
        let log = self.transactions.read().await;
        let Some(keys) = log.by_address.get(address) else {
            return Ok(ActivitySummary::default());
        };

        let summary = keys
            .range((since, String::new())..)
            .filter_map(|(_, signature)| log.by_signature.get(signature))
            .fold(ActivitySummary::default(), |mut acc, tx| {
                acc.volume += tx.amount.abs();
                acc.count += 1;
                acc
            });
        Ok(summary)
    }

    async fn has_activity_before(
        &self,
        address: &str,
        before: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .transactions
            .read()
            .await
            .first_seen
            .get(address)
            .map_or(false, |at| *at < before))
    }

    async fn top_wallets(&self, limit: usize) -> Result<Vec<Wallet>, StoreError> {
        let mut wallets: Vec<Wallet> = self.wallets.read().await.values().cloned().collect();
        wallets.sort_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.address.cmp(&b.address)));
        wallets.truncate(limit);
        Ok(wallets)
    }

    async fn recent_transactions(&self, limit: usize) -> Result<Vec<WhaleTransaction>, StoreError> {
        let log = self.transactions.read().await;
        Ok(log
            .by_time
            .iter()
            .rev()
            .filter_map(|(_, signature)| log.by_signature.get(signature).cloned())
            .take(limit)
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            wallets: self.wallets.read().await.len() as u64,
            transactions: self.transactions.read().await.by_signature.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    fn wallet(address: &str, balance: i64) -> Wallet {
        Wallet {
            address: address.to_string(),
            balance: Decimal::from(balance),
            last_activity: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            activity_count: 1,
            daily_volume: Decimal::ZERO,
            daily_count: 1,
            largest_transaction: Decimal::ZERO,
            dex_activity_count: 0,
        }
    }

    fn transaction(signature: &str, from: &str, to: &str, amount: i64, at: DateTime<Utc>) -> WhaleTransaction {
        WhaleTransaction {
            signature: signature.to_string(),
            from_wallet: from.to_string(),
            to_wallet: to.to_string(),
            amount: Decimal::from(amount),
            timestamp: at,
            involved_whales: vec![from.to_string()],
        }
    }

    #[tokio::test]
    async fn same_signature_is_stored_once() {
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let first = store.insert_transaction(transaction("sig", "A", "B", 5, at)).await.unwrap();
        let second = store.insert_transaction(transaction("sig", "A", "B", 9, at)).await.unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyPresent);
        let stored = store.recent_transactions(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].amount, Decimal::from(5));
    }

    #[tokio::test]
    async fn wallets_are_ordered_by_balance() {
        let store = MemoryStore::new();
        store.upsert_wallet(wallet("small", 10)).await.unwrap();
        store.upsert_wallet(wallet("big", 99)).await.unwrap();
        store.upsert_wallet(wallet("mid", 50)).await.unwrap();

        let top: Vec<String> = store
            .top_wallets(2)
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.address)
            .collect();
        assert_eq!(top, vec!["big", "mid"]);
    }

    #[tokio::test]
    async fn activity_window_counts_both_directions() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();

        store.insert_transaction(transaction("s1", "A", "B", 100, now - Duration::hours(1))).await.unwrap();
        store.insert_transaction(transaction("s2", "C", "A", -40, now - Duration::hours(2))).await.unwrap();
        store.insert_transaction(transaction("s3", "A", "D", 7, now - Duration::days(2))).await.unwrap();

        let summary = store.activity_since("A", now - Duration::hours(24)).await.unwrap();
        assert_eq!(summary, ActivitySummary { volume: Decimal::from(140), count: 2 });

        assert!(store.has_activity_before("A", now - Duration::days(1)).await.unwrap());
        assert!(!store.has_activity_before("B", now - Duration::days(1)).await.unwrap());
    }

    #[tokio::test]
    async fn retention_drops_old_transactions_but_remembers_first_activity() {
        let store = MemoryStore::with_retention(Duration::days(30));
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        store.insert_transaction(transaction("old", "A", "B", 10, start)).await.unwrap();
        store
            .insert_transaction(transaction("mid", "A", "C", 20, start + Duration::days(20)))
            .await
            .unwrap();
        store
            .insert_transaction(transaction("new", "D", "A", 30, start + Duration::days(45)))
            .await
            .unwrap();

        assert_eq!(store.stats().await.unwrap().transactions, 2);
        let signatures: Vec<String> = store
            .recent_transactions(10)
            .await
            .unwrap()
            .into_iter()
            .map(|tx| tx.signature)
            .collect();
        assert_eq!(signatures, vec!["new", "mid"]);

        let summary = store.activity_since("A", start - Duration::days(1)).await.unwrap();
        assert_eq!(summary, ActivitySummary { volume: Decimal::from(50), count: 2 });
        assert_eq!(store.activity_since("B", start).await.unwrap(), ActivitySummary::default());

        // The pruned transaction still counts as early activity
        assert!(store.has_activity_before("A", start + Duration::hours(1)).await.unwrap());
        assert!(store.has_activity_before("B", start + Duration::hours(1)).await.unwrap());
        assert!(!store.has_activity_before("D", start + Duration::days(45)).await.unwrap());
    }

    #[tokio::test]
    async fn self_transfer_counts_once() {
        let store = MemoryStore::new();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        store.insert_transaction(transaction("self", "A", "A", 8, at)).await.unwrap();

        let summary = store.activity_since("A", at).await.unwrap();
        assert_eq!(summary, ActivitySummary { volume: Decimal::from(8), count: 1 });
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let store = MemoryStore::new();
        store.upsert_wallet(wallet("A", 1)).await.unwrap();

        assert!(store.delete_wallet("A").await.unwrap());
        assert!(!store.delete_wallet("A").await.unwrap());
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
    }
}
