use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};

use super::classifier::WhaleClassifier;
use super::extractor::{aggregate_movement, extract_deltas, worth_considering};
use super::recorder::{RecordOutcome, TransactionRecorder};
use super::types::{Observation, WalletOutcome};
use super::wallets::WalletStateManager;
use crate::dex::DexAnalyzer;
use crate::ledger::{LedgerBlock, LedgerTransaction};

/// Tallies for one transaction or one block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectionReport {
    pub transactions: u64,
    pub skipped: u64,
    pub observations: u64,
    pub abstained: u64,
    pub new_whales: u64,
    pub updated_whales: u64,
    pub demoted_whales: u64,
    pub failed_updates: u64,
    pub recorded: u64,
}

impl DetectionReport {
    pub fn merge(&mut self, other: &DetectionReport) {
        self.transactions += other.transactions;
        self.skipped += other.skipped;
        self.observations += other.observations;
        self.abstained += other.abstained;
        self.new_whales += other.new_whales;
        self.updated_whales += other.updated_whales;
        self.demoted_whales += other.demoted_whales;
        self.failed_updates += other.failed_updates;
        self.recorded += other.recorded;
    }
}

/// Runs each transaction through extraction, classification, wallet updates
/// and recording, strictly one after another.
pub struct WhaleDetector {
    classifier: WhaleClassifier,
    wallets: WalletStateManager,
    recorder: TransactionRecorder,
    dex_analyzer: DexAnalyzer,
}

impl WhaleDetector {
    pub fn new(
        classifier: WhaleClassifier,
        wallets: WalletStateManager,
        recorder: TransactionRecorder,
    ) -> Self {
        let dex_analyzer = DexAnalyzer::new(classifier.config().dex_programs.clone());
        Self {
            classifier,
            wallets,
            recorder,
            dex_analyzer,
        }
    }

    pub async fn process_block(&self, block: &LedgerBlock) -> DetectionReport {
        let mut report = DetectionReport::default();
        for transaction in &block.transactions {
            let tx_report = self.process_transaction(transaction).await;
            report.merge(&tx_report);
        }
        debug!("Block {} processed: {:?}", block.slot, report);
        report
    }

    pub async fn process_transaction(&self, transaction: &LedgerTransaction) -> DetectionReport {
        let mut report = DetectionReport {
            transactions: 1,
            ..DetectionReport::default()
        };

        let deltas = extract_deltas(transaction);
        if deltas.is_empty() {
            report.skipped = 1;
            return report;
        }

        let min_amount = self.classifier.config().consider_minimum();
        let transaction_amount = aggregate_movement(&deltas);
        let dex_protocol = self.dex_analyzer.involvement(transaction);
        if let Some(protocol) = dex_protocol {
            debug!("Transaction {:?} touches {:?}", transaction.signature, protocol);
        }

        let mut resolved_whales = HashSet::new();
        for delta in deltas.iter().filter(|d| worth_considering(d, min_amount)) {
            report.observations += 1;
            let observation = Observation {
                address: delta.address.clone(),
                balance: delta.balance(),
                delta: delta.delta(),
                transaction_amount,
                dex_involved: dex_protocol.is_some(),
            };

            let verdict = match self.classifier.classify(&observation).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(
                        "Abstaining on {} in {:?} (balance {}, delta {}): {}",
                        observation.address, transaction.signature, observation.balance, observation.delta, e
                    );
                    report.abstained += 1;
                    continue;
                }
            };

            match self.wallets.apply_observation(&observation, &verdict).await {
                WalletOutcome::Created => report.new_whales += 1,
                WalletOutcome::Updated => report.updated_whales += 1,
                WalletOutcome::Demoted => report.demoted_whales += 1,
                WalletOutcome::Failed => report.failed_updates += 1,
                WalletOutcome::Unchanged => {}
            }

            if verdict.is_whale {
                resolved_whales.insert(observation.address);
            }
        }

        let outcome = self
            .recorder
            .record_if_whale_involved(transaction, &deltas, &resolved_whales)
            .await;
        if outcome == RecordOutcome::Stored {
            report.recorded = 1;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::dex::StakingLookup;
    use crate::ledger::MockLedgerSource;
    use crate::retry::RetryConfig;
    use crate::store::{MemoryStore, WhaleStore};
    use crate::whale::config::{RuleSet, WhaleConfig};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    const SOL: u64 = 1_000_000_000;

    fn detector(store: Arc<MemoryStore>, rule_set: RuleSet) -> WhaleDetector {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let config = WhaleConfig::default().with_rule_set(rule_set);
        let amount_mode = config.amount_mode;
        let mut ledger = MockLedgerSource::new();
        ledger.expect_get_program_accounts().returning(|_, _| Ok(Vec::new()));

        WhaleDetector::new(
            WhaleClassifier::new(
                config,
                store.clone(),
                StakingLookup::new(Arc::new(ledger)),
                clock.clone(),
            ),
            WalletStateManager::new(store.clone(), clock.clone()),
            TransactionRecorder::new(store, clock, RetryConfig::default(), amount_mode),
        )
    }

    fn tx(signature: &str, keys: &[&str], pre: Vec<u64>, post: Vec<u64>) -> LedgerTransaction {
        LedgerTransaction {
            signature: Some(signature.to_string()),
            account_keys: keys.iter().map(|k| k.to_string()).collect(),
            pre_balances: Some(pre),
            post_balances: Some(post),
            ..LedgerTransaction::default()
        }
    }

    #[tokio::test]
    async fn whale_transfer_creates_wallet_and_records_transaction() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone(), RuleSet::Balance);

        let transfer = tx("sig", &["WHALE", "SHRIMP"], vec![20_000 * SOL, 0], vec![19_990 * SOL, 10 * SOL]);
        let report = detector.process_transaction(&transfer).await;

        assert_eq!(report.observations, 1);
        assert_eq!(report.new_whales, 1);
        assert_eq!(report.recorded, 1);

        let wallet = store.get_wallet("WHALE").await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(19_990));
        assert!(store.get_wallet("SHRIMP").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_transaction_has_no_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone(), RuleSet::Balance);

        let broken = tx("sig", &["ONLY"], vec![50_000 * SOL], vec![50_000 * SOL]);
        let report = detector.process_transaction(&broken).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.observations, 0);
        assert_eq!(store.stats().await.unwrap(), Default::default());
    }

    #[tokio::test]
    async fn block_report_sums_transactions() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone(), RuleSet::Balance);

        let block = LedgerBlock {
            slot: 5,
            block_time: Some(1_717_243_200),
            transactions: vec![
                tx("a", &["W1", "X"], vec![30_000 * SOL, 0], vec![30_000 * SOL, 0]),
                tx("b", &["Y", "Z"], vec![SOL, SOL], vec![SOL, SOL]),
                tx("c", &["W1", "W2"], vec![30_000 * SOL, 12_000 * SOL], vec![29_000 * SOL, 13_000 * SOL]),
            ],
        };
        let report = detector.process_block(&block).await;

        assert_eq!(report.transactions, 3);
        assert_eq!(report.new_whales, 2);
        assert_eq!(report.updated_whales, 1);
        assert_eq!(report.recorded, 2);
    }

    #[tokio::test]
    async fn dex_rule_tracks_dex_activity() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone(), RuleSet::Dex);

        // Staking lookups need real keys
        let trader = solana_sdk::pubkey::Pubkey::new_unique().to_string();
        let pool = solana_sdk::pubkey::Pubkey::new_unique().to_string();
        let swap = tx(
            "swap",
            &[trader.as_str(), pool.as_str(), crate::dex::programs::RAYDIUM_AMM_PROGRAM_ID],
            vec![5_000 * SOL, 90_000 * SOL, SOL],
            vec![3_000 * SOL, 92_000 * SOL, SOL],
        );
        let report = detector.process_transaction(&swap).await;

        assert_eq!(report.new_whales, 2);
        let wallet = store.get_wallet(&trader).await.unwrap().unwrap();
        assert_eq!(wallet.dex_activity_count, 1);
        assert_eq!(wallet.largest_transaction, Decimal::from(2_000));
    }

    #[tokio::test]
    async fn small_dex_trader_qualifies_by_share_of_swap() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone(), RuleSet::Dex);

        // 300 of the 600 SOL moved belongs to a 200 SOL holder
        let trader = solana_sdk::pubkey::Pubkey::new_unique().to_string();
        let pool = solana_sdk::pubkey::Pubkey::new_unique().to_string();
        let swap = tx(
            "small-swap",
            &[trader.as_str(), pool.as_str(), crate::dex::programs::RAYDIUM_AMM_PROGRAM_ID],
            vec![500 * SOL, 500 * SOL, SOL],
            vec![200 * SOL, 800 * SOL, SOL],
        );
        let report = detector.process_transaction(&swap).await;

        assert_eq!(report.observations, 2);
        assert_eq!(report.recorded, 1);
        let wallet = store.get_wallet(&trader).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Decimal::from(200));
        assert_eq!(wallet.daily_volume, Decimal::from(300));
        assert_eq!(store.recent_transactions(1).await.unwrap()[0].signature, "small-swap");
    }
}
