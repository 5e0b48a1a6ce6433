use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;
use solana_sdk::stake;
use tokio::sync::Mutex;

use crate::ledger::{parse_pubkey, LedgerError, LedgerSource, MemcmpFilter};

// Stake account layout: the staker authority starts after the enum tag and rent reserve
pub const STAKER_AUTHORITY_OFFSET: usize = 12;
const DEFAULT_CACHE_SIZE: usize = 1024;

/// Answers "is this address a staking account" through the stake program's
/// accounts, remembering answers it already has.
pub struct StakingLookup {
    ledger: Arc<dyn LedgerSource>,
    cache: Mutex<LruCache<String, bool>>,
}

impl StakingLookup {
    pub fn new(ledger: Arc<dyn LedgerSource>) -> Self {
        Self::with_capacity(ledger, DEFAULT_CACHE_SIZE)
    }

    pub fn with_capacity(ledger: Arc<dyn LedgerSource>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ledger,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Errors are returned, never cached: the caller decides how to abstain.
    pub async fn is_staking_account(&self, address: &str) -> Result<bool, LedgerError> {
        if let Some(cached) = self.cache.lock().await.get(address) {
            return Ok(*cached);
        }

        let pubkey = parse_pubkey(address)?;
        let filter = MemcmpFilter {
            offset: STAKER_AUTHORITY_OFFSET,
            bytes: pubkey.to_bytes().to_vec(),
        };
        let accounts = self
            .ledger
            .get_program_accounts(stake::program::id(), filter)
            .await?;

        let is_staking = !accounts.is_empty();
        debug!(
            "Staking lookup for {}: {} stake account(s) found",
            address,
            accounts.len()
        );
        self.cache.lock().await.put(address.to_string(), is_staking);
        Ok(is_staking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MockLedgerSource;
    use solana_sdk::pubkey::Pubkey;

    #[tokio::test]
    async fn caches_positive_lookups() {
        let candidate = Pubkey::new_unique();
        let expected_bytes = candidate.to_bytes().to_vec();

        let mut ledger = MockLedgerSource::new();
        ledger
            .expect_get_program_accounts()
            .times(1)
            .returning(move |program, filter| {
                assert_eq!(program, stake::program::id());
                assert_eq!(filter.offset, STAKER_AUTHORITY_OFFSET);
                assert_eq!(filter.bytes, expected_bytes);
                Ok(vec![Pubkey::new_unique()])
            });

        let lookup = StakingLookup::new(Arc::new(ledger));
        let address = candidate.to_string();
        assert!(lookup.is_staking_account(&address).await.unwrap());
        assert!(lookup.is_staking_account(&address).await.unwrap());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let mut ledger = MockLedgerSource::new();
        ledger
            .expect_get_program_accounts()
            .times(2)
            .returning(|_, _| Err(LedgerError::Transient("timeout".into())));

        let lookup = StakingLookup::new(Arc::new(ledger));
        let address = Pubkey::new_unique().to_string();
        assert!(lookup.is_staking_account(&address).await.is_err());
        assert!(lookup.is_staking_account(&address).await.is_err());
    }

    #[tokio::test]
    async fn invalid_address_is_malformed() {
        let mut ledger = MockLedgerSource::new();
        ledger.expect_get_program_accounts().never();

        let lookup = StakingLookup::new(Arc::new(ledger));
        let result = lookup.is_staking_account("not base58!").await;
        assert!(matches!(result, Err(LedgerError::Malformed(_))));
    }
}
