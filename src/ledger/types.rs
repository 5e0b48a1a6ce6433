use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type Slot = u64;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert lamports into SOL without losing precision.
pub fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL)
}

/// A block as seen by the sampler: just what classification needs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerBlock {
    pub slot: Slot,
    pub block_time: Option<i64>,
    pub transactions: Vec<LedgerTransaction>,
}

/// One transaction out of a block. Fields are optional because the node may
/// omit them; validation happens in the delta extractor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub signature: Option<String>,
    pub account_keys: Vec<String>,
    pub pre_balances: Option<Vec<u64>>,
    pub post_balances: Option<Vec<u64>>,
    pub block_time: Option<i64>,
}

/// Memory-compare filter for program account scans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemcmpFilter {
    pub offset: usize,
    pub bytes: Vec<u8>,
}
