use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use super::client::LedgerSource;
use super::error::LedgerError;
use super::types::{LedgerBlock, Slot};
use crate::config::{env_or, ConfigError};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub rate_limit_delay: Duration,
    pub max_supported_transaction_version: u8,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(10),
            rate_limit_delay: Duration::from_millis(500),
            max_supported_transaction_version: 0,
        }
    }
}

impl FetchConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_retries: env_or("FETCH_MAX_RETRIES", defaults.max_retries)?,
            retry_delay: Duration::from_millis(env_or(
                "FETCH_RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            )?),
            rate_limit_delay: Duration::from_millis(env_or(
                "FETCH_RATE_LIMIT_DELAY_MS",
                defaults.rate_limit_delay.as_millis() as u64,
            )?),
            max_supported_transaction_version: env_or(
                "FETCH_MAX_TX_VERSION",
                defaults.max_supported_transaction_version,
            )?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Block(LedgerBlock),
    /// The slot exists but there is nothing to process.
    Empty { slot: Slot },
    /// Retry budget exhausted; the slot is skipped.
    Abandoned { slot: Option<Slot>, error: LedgerError },
}

/// Fetches the block at the current chain head, absorbing rate limiting and
/// retrying other failures a bounded number of times.
pub struct RateLimitedFetcher {
    ledger: Arc<dyn LedgerSource>,
    config: FetchConfig,
}

impl RateLimitedFetcher {
    pub fn new(ledger: Arc<dyn LedgerSource>, config: FetchConfig) -> Self {
        Self { ledger, config }
    }

    pub async fn fetch_next_block(&self) -> FetchOutcome {
        let mut failures = 0;

        let slot = loop {
            match self.ledger.get_slot().await {
                Ok(slot) => break slot,
                Err(e) => {
                    if let Some(error) = self.back_off(&e, &mut failures, None).await {
                        return FetchOutcome::Abandoned { slot: None, error };
                    }
                }
            }
        };

        info!("Fetching block at slot {}", slot);

        loop {
            match self.ledger.get_block(slot).await {
                Ok(Some(block)) if block.transactions.is_empty() => {
                    info!("No transactions in block {}", slot);
                    return FetchOutcome::Empty { slot };
                }
                Ok(Some(block)) => {
                    info!("Processing {} transactions in block {}", block.transactions.len(), slot);
                    return FetchOutcome::Block(block);
                }
                Ok(None) => {
                    info!("No block available at slot {}", slot);
                    return FetchOutcome::Empty { slot };
                }
                Err(LedgerError::Malformed(reason)) => {
                    warn!("Unexpected block structure at slot {}: {}", slot, reason);
                    return FetchOutcome::Empty { slot };
                }
                Err(e) => {
                    if let Some(error) = self.back_off(&e, &mut failures, Some(slot)).await {
                        return FetchOutcome::Abandoned { slot: Some(slot), error };
                    }
                }
            }
        }
    }

    // Sleeps before the next attempt. Returns the error once the budget is spent.
    async fn back_off(
        &self,
        error: &LedgerError,
        failures: &mut u32,
        slot: Option<Slot>,
    ) -> Option<LedgerError> {
        if error.is_rate_limited() {
            warn!(
                "Rate limited while fetching slot {:?}, waiting {:?}",
                slot, self.config.rate_limit_delay
            );
            tokio::time::sleep(self.config.rate_limit_delay).await;
            return None;
        }

        *failures += 1;
        error!(
            "Error fetching block (slot {:?}, attempt {}/{}): {}",
            slot, failures, self.config.max_retries, error
        );

        if *failures >= self.config.max_retries {
            warn!("Max retries reached for slot {:?}. Moving to next block.", slot);
            return Some(error.clone());
        }

        info!("Retrying in {:?}...", self.config.retry_delay);
        tokio::time::sleep(self.config.retry_delay).await;
        None
    }
}
