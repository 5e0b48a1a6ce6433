use log::{error, info};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;

use super::config::WhaleConfig;
use super::types::Wallet;
use crate::store::{StoreError, StoreStats, WhaleStore};

const REPORT_LIMIT: usize = 100;

/// 0-100 weighting of balance (40%), daily volume (40%) and daily count (20%),
/// each capped at its threshold. Balance saturates at twice the whale threshold.
pub fn risk_score(wallet: &Wallet, config: &WhaleConfig) -> f64 {
    let balance_limit = config
        .balance_threshold
        .checked_mul(Decimal::TWO)
        .unwrap_or(Decimal::MAX);
    let balance_score = capped_ratio(wallet.balance, balance_limit);
    let volume_score = capped_ratio(wallet.daily_volume, config.volume_threshold);
    let count_score = capped_ratio(
        Decimal::from(wallet.daily_count),
        Decimal::from(config.count_threshold),
    );

    (balance_score * 0.4 + volume_score * 0.4 + count_score * 0.2) * 100.0
}

fn capped_ratio(value: Decimal, limit: Decimal) -> f64 {
    if limit <= Decimal::ZERO {
        return 1.0;
    }
    (value / limit).to_f64().unwrap_or(0.0).clamp(0.0, 1.0)
}

pub async fn log_stats(store: &dyn WhaleStore) -> Result<StoreStats, StoreError> {
    let stats = store.stats().await?;
    info!("--- Current Stats ---");
    info!("Total whale wallets tracked: {}", stats.wallets);
    info!("Total whale transactions stored: {}", stats.transactions);
    info!("---------------------");
    Ok(stats)
}

pub async fn log_detailed_report(store: &dyn WhaleStore, config: &WhaleConfig) {
    let whales = match store.top_wallets(REPORT_LIMIT).await {
        Ok(whales) => whales,
        Err(e) => {
            error!("Unable to build whale report: {}", e);
            return;
        }
    };

    info!("=== Detailed Whale Wallet Report ===");
    for whale in &whales {
        info!("Address: {}", whale.address);
        info!("  Balance: {:.2} SOL", whale.balance);
        info!("  Last Seen: {}", whale.last_activity.to_rfc3339());
        info!("  Activity Count: {}", whale.activity_count);
        info!("  Daily Transaction Volume: {:.2} SOL", whale.daily_volume);
        info!("  Daily Transaction Count: {}", whale.daily_count);
        info!("  Largest Transaction: {:.2} SOL", whale.largest_transaction);
        info!("  Risk Score: {:.2}", risk_score(whale, config));
        info!("---");
    }
}
