use std::sync::Arc;

use chrono::Duration;
use log::debug;
use rust_decimal::Decimal;
use thiserror::Error;

use super::config::{RuleSet, WhaleConfig};
use super::types::{Observation, Verdict, WhaleReason};
use crate::clock::Clock;
use crate::dex::StakingLookup;
use crate::ledger::LedgerError;
use crate::store::{StoreError, WhaleStore};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("History lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("Staking lookup failed: {0}")]
    Ledger(#[from] LedgerError),
}

// Individual rules. All thresholds are inclusive.

pub fn meets_balance(config: &WhaleConfig, balance: Decimal) -> bool {
    balance >= config.balance_threshold
}

pub fn meets_daily_volume(config: &WhaleConfig, past_volume: Decimal, amount: Decimal) -> bool {
    past_volume + amount >= config.volume_threshold
}

pub fn meets_daily_count(config: &WhaleConfig, past_count: u64) -> bool {
    past_count + 1 >= config.count_threshold
}

pub fn meets_long_term(config: &WhaleConfig, balance: Decimal, has_aged_activity: bool) -> bool {
    has_aged_activity && balance >= config.balance_threshold / Decimal::TWO
}

/// Size part of the DEX rule: a large balance, or a large share of the
/// transaction's total movement.
pub fn dex_size_reason(config: &WhaleConfig, observation: &Observation) -> Option<WhaleReason> {
    if observation.balance >= config.dex_balance_threshold {
        return Some(WhaleReason::DexBalance);
    }
    if observation.transaction_amount > Decimal::ZERO
        && observation.delta / observation.transaction_amount >= config.dex_transaction_threshold
    {
        return Some(WhaleReason::DexShare);
    }
    None
}

/// Applies the configured rule set to one observation. Cheap checks run first;
/// checks that need the store or the ledger only run when nothing cheaper has
/// decided the outcome.
pub struct WhaleClassifier {
    config: WhaleConfig,
    store: Arc<dyn WhaleStore>,
    staking: StakingLookup,
    clock: Arc<dyn Clock>,
}

impl WhaleClassifier {
    pub fn new(
        config: WhaleConfig,
        store: Arc<dyn WhaleStore>,
        staking: StakingLookup,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            staking,
            clock,
        }
    }

    pub fn config(&self) -> &WhaleConfig {
        &self.config
    }

    /// An error means the verdict is unknown and the caller should abstain.
    pub async fn classify(&self, observation: &Observation) -> Result<Verdict, ClassifyError> {
        let verdict = match self.config.rule_set {
            RuleSet::Balance => self.classify_balance(observation),
            RuleSet::Activity => self.classify_activity(observation).await?,
            RuleSet::Dex => self.classify_dex(observation).await?,
        };

        debug!(
            "Classified {} (balance {}, delta {}): {:?}",
            observation.address, observation.balance, observation.delta, verdict
        );
        Ok(verdict)
    }

    fn classify_balance(&self, observation: &Observation) -> Verdict {
        if meets_balance(&self.config, observation.balance) {
            Verdict::whale(WhaleReason::Balance)
        } else {
            Verdict::not_whale(WhaleReason::BelowThresholds)
        }
    }

    async fn classify_activity(&self, observation: &Observation) -> Result<Verdict, ClassifyError> {
        if meets_balance(&self.config, observation.balance) {
            return Ok(Verdict::whale(WhaleReason::Balance));
        }

        let now = self.clock.now();
        let daily = self
            .store
            .activity_since(&observation.address, now - Duration::hours(24))
            .await?;

        if meets_daily_volume(&self.config, daily.volume, observation.delta) {
            return Ok(Verdict::whale(WhaleReason::DailyVolume));
        }
        if meets_daily_count(&self.config, daily.count) {
            return Ok(Verdict::whale(WhaleReason::DailyCount));
        }

        // Only worth a lookup when the balance could satisfy the rule
        if observation.balance >= self.config.balance_threshold / Decimal::TWO {
            let cutoff = now - Duration::days(self.config.long_term_days);
            let aged = self
                .store
                .has_activity_before(&observation.address, cutoff)
                .await?;
            if meets_long_term(&self.config, observation.balance, aged) {
                return Ok(Verdict::whale(WhaleReason::LongTermHolder));
            }
        }

        Ok(Verdict::not_whale(WhaleReason::BelowThresholds))
    }

    async fn classify_dex(&self, observation: &Observation) -> Result<Verdict, ClassifyError> {
        if !observation.dex_involved {
            return Ok(Verdict::not_whale(WhaleReason::NoDexActivity));
        }
        if observation.balance < self.config.min_balance_to_track {
            return Ok(Verdict::not_whale(WhaleReason::BelowTrackingMinimum));
        }
        let reason = match dex_size_reason(&self.config, observation) {
            Some(reason) => reason,
            None => return Ok(Verdict::not_whale(WhaleReason::BelowThresholds)),
        };

        if self.staking.is_staking_account(&observation.address).await? {
            return Ok(Verdict::not_whale(WhaleReason::StakingAccount));
        }

        Ok(Verdict::whale(reason))
    }
}
