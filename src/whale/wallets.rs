use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info};

use super::types::{Observation, Verdict, Wallet, WalletOutcome};
use crate::clock::Clock;
use crate::store::{StoreError, WhaleStore};

// Stored amounts keep 8 fractional digits
const STORED_SCALE: u32 = 8;

/// Owns every write to wallet rows. A wallet exists only while its address
/// qualifies; a negative verdict deletes it.
pub struct WalletStateManager {
    store: Arc<dyn WhaleStore>,
    clock: Arc<dyn Clock>,
}

impl WalletStateManager {
    pub fn new(store: Arc<dyn WhaleStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Never fails: store errors are logged and reported as `Failed`.
    pub async fn apply_observation(&self, observation: &Observation, verdict: &Verdict) -> WalletOutcome {
        match self.try_apply(observation, verdict).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Error updating wallet {} (balance {}, amount {}, verdict {:?}): {}",
                    observation.address, observation.balance, observation.delta, verdict, e
                );
                WalletOutcome::Failed
            }
        }
    }

    async fn try_apply(&self, observation: &Observation, verdict: &Verdict) -> Result<WalletOutcome, StoreError> {
        let existing = self.store.get_wallet(&observation.address).await?;

        if !verdict.is_whale {
            if existing.is_none() {
                return Ok(WalletOutcome::Unchanged);
            }
            self.store.delete_wallet(&observation.address).await?;
            info!(
                "Wallet no longer classified as whale and removed: {} ({:?})",
                observation.address, verdict.reason
            );
            return Ok(WalletOutcome::Demoted);
        }

        let now = self.clock.now();
        let (wallet, outcome) = match existing {
            Some(wallet) => (accumulate(wallet, observation, now), WalletOutcome::Updated),
            None => (new_wallet(observation, now), WalletOutcome::Created),
        };

        info!(
            "🐳 Whale wallet {}: {}, Balance: {} SOL ({:?})",
            if outcome == WalletOutcome::Created { "detected" } else { "updated" },
            wallet.address,
            wallet.balance,
            verdict.reason
        );
        self.store.upsert_wallet(wallet).await?;
        Ok(outcome)
    }
}

/// Counters reflect exactly this one observation.
pub fn new_wallet(observation: &Observation, now: DateTime<Utc>) -> Wallet {
    let delta = observation.delta.round_dp(STORED_SCALE);
    Wallet {
        address: observation.address.clone(),
        balance: observation.balance.round_dp(STORED_SCALE),
        last_activity: now,
        activity_count: 1,
        daily_volume: delta,
        daily_count: 1,
        largest_transaction: delta,
        dex_activity_count: u64::from(observation.dex_involved),
    }
}

/// Fold an observation into an existing wallet, restarting the daily counters
/// when the last activity was on another calendar day.
pub fn accumulate(mut wallet: Wallet, observation: &Observation, now: DateTime<Utc>) -> Wallet {
    let delta = observation.delta.round_dp(STORED_SCALE);

    if is_new_day(wallet.last_activity, now) {
        wallet.daily_volume = delta;
        wallet.daily_count = 1;
    } else {
        wallet.daily_volume += delta;
        wallet.daily_count += 1;
    }

    wallet.activity_count += 1;
    wallet.largest_transaction = wallet.largest_transaction.max(delta);
    if observation.dex_involved {
        wallet.dex_activity_count += 1;
    }
    wallet.balance = observation.balance.round_dp(STORED_SCALE);
    wallet.last_activity = now;
    wallet
}

pub fn is_new_day(last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    last_activity.date_naive() != now.date_naive()
}
