use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Persisted aggregate for an address that currently qualifies as a whale.
/// Rows are deleted on demotion, so a stored wallet is always a whale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    pub balance: Decimal,
    pub last_activity: DateTime<Utc>,
    pub activity_count: u64,
    pub daily_volume: Decimal,
    pub daily_count: u32,
    pub largest_transaction: Decimal,
    pub dex_activity_count: u64,
}

/// Transaction that involved at least one whale. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WhaleTransaction {
    pub signature: String,
    pub from_wallet: String,
    pub to_wallet: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub involved_whales: Vec<String>,
}

/// One address as seen in one transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub address: String,
    pub balance: Decimal,
    pub delta: Decimal,
    /// Total SOL moved by the surrounding transaction.
    pub transaction_amount: Decimal,
    pub dex_involved: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhaleReason {
    Balance,
    DailyVolume,
    DailyCount,
    LongTermHolder,
    DexBalance,
    DexShare,
    // Negative verdicts
    BelowThresholds,
    NoDexActivity,
    StakingAccount,
    BelowTrackingMinimum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub is_whale: bool,
    pub reason: WhaleReason,
}

impl Verdict {
    pub fn whale(reason: WhaleReason) -> Self {
        Self { is_whale: true, reason }
    }

    pub fn not_whale(reason: WhaleReason) -> Self {
        Self { is_whale: false, reason }
    }
}

/// What happened to the wallet row after an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletOutcome {
    Created,
    Updated,
    Demoted,
    Unchanged,
    Failed,
}

impl WalletOutcome {
    pub fn is_whale(&self) -> bool {
        matches!(self, WalletOutcome::Created | WalletOutcome::Updated)
    }
}
