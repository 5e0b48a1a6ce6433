mod error;
mod memory;
mod sqlite;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
#[cfg(test)]
use mockall::automock;
use rust_decimal::Decimal;

use crate::config::{env_or, ConfigError};
use crate::whale::types::{Wallet, WhaleTransaction};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    /// Lost on restart; transactions are kept for the retention window only.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from("data/whales.db"),
        }
    }
}

impl StoreConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            backend: env_or("STORE_BACKEND", defaults.backend)?,
            path: env_or("STORE_PATH", defaults.path)?,
        })
    }

    /// Open the configured backend. `retention` bounds the in-memory
    /// transaction log and is never shorter than one day.
    pub fn open(&self, retention: Duration) -> Result<Arc<dyn WhaleStore>, StoreError> {
        Ok(match self.backend {
            StoreBackend::Sqlite => Arc::new(SqliteStore::open(&self.path)?),
            StoreBackend::Memory => Arc::new(MemoryStore::with_retention(retention.max(Duration::days(1)))),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The signature was already stored; nothing was written.
    AlreadyPresent,
}

/// Transfer activity of one address over a time window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ActivitySummary {
    pub volume: Decimal,
    pub count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub wallets: u64,
    pub transactions: u64,
}

/// Durable state for whale wallets and the transactions that involved them.
///
/// Wallets are unique per address, transactions unique per signature.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WhaleStore: Send + Sync {
    async fn get_wallet(&self, address: &str) -> Result<Option<Wallet>, StoreError>;

    async fn upsert_wallet(&self, wallet: Wallet) -> Result<(), StoreError>;

    /// Returns whether a row was removed.
    async fn delete_wallet(&self, address: &str) -> Result<bool, StoreError>;

    /// Insert if the signature is absent, otherwise a no-op.
    async fn insert_transaction(
        &self,
        transaction: WhaleTransaction,
    ) -> Result<InsertOutcome, StoreError>;

    /// Stored transactions sent or received by `address` at or after `since`.
    async fn activity_since(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<ActivitySummary, StoreError>;

    /// Whether any stored transaction of `address` is older than `before`.
    async fn has_activity_before(
        &self,
        address: &str,
        before: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Wallets ordered by balance, largest first.
    async fn top_wallets(&self, limit: usize) -> Result<Vec<Wallet>, StoreError>;

    /// Transactions ordered by timestamp, newest first.
    async fn recent_transactions(&self, limit: usize) -> Result<Vec<WhaleTransaction>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
