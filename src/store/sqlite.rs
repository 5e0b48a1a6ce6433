use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::info;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{ActivitySummary, InsertOutcome, StoreError, StoreStats, WhaleStore};
use crate::whale::types::{Wallet, WhaleTransaction};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const WALLET_COLUMNS: &str = "address, balance, last_activity, activity_count, daily_volume, \
                              daily_count, largest_transaction, dex_activity_count";
const TRANSACTION_COLUMNS: &str = "signature, from_wallet, to_wallet, amount, timestamp, involved_whales";

/// SQLite-backed store. Survives restarts; wallets are keyed by address and
/// transactions by signature, with per-address time indexes for the
/// activity window queries.
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let connection = Connection::open(path)?;
        connection.pragma_update(None, "journal_mode", "WAL")?;
        connection.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self::with_connection(connection)?;
        info!("Whale store opened at {}", path.display());
        Ok(store)
    }

    fn with_connection(connection: Connection) -> Result<Self, StoreError> {
        connection.busy_timeout(BUSY_TIMEOUT)?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }
}

fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS wallets (
            address TEXT PRIMARY KEY,
            balance TEXT NOT NULL,
            last_activity INTEGER NOT NULL,
            activity_count INTEGER NOT NULL,
            daily_volume TEXT NOT NULL,
            daily_count INTEGER NOT NULL,
            largest_transaction TEXT NOT NULL,
            dex_activity_count INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transactions (
            signature TEXT PRIMARY KEY,
            from_wallet TEXT NOT NULL,
            to_wallet TEXT NOT NULL,
            amount TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            involved_whales TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_from ON transactions(from_wallet, timestamp);
        CREATE INDEX IF NOT EXISTS idx_transactions_to ON transactions(to_wallet, timestamp);
        CREATE INDEX IF NOT EXISTS idx_transactions_timestamp ON transactions(timestamp DESC);
        "#,
    )?;
    Ok(())
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::Conflict {
                key: "sqlite".to_string(),
                reason: e.to_string(),
            },
            Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => StoreError::Corrupt {
                key: "sqlite".to_string(),
                reason: e.to_string(),
            },
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

// Raw column values, converted to domain types outside the rusqlite closure.
struct WalletRow {
    address: String,
    balance: String,
    last_activity: i64,
    activity_count: i64,
    daily_volume: String,
    daily_count: i64,
    largest_transaction: String,
    dex_activity_count: i64,
}

impl WalletRow {
    fn read(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            address: row.get(0)?,
            balance: row.get(1)?,
            last_activity: row.get(2)?,
            activity_count: row.get(3)?,
            daily_volume: row.get(4)?,
            daily_count: row.get(5)?,
            largest_transaction: row.get(6)?,
            dex_activity_count: row.get(7)?,
        })
    }

    fn into_wallet(self) -> Result<Wallet, StoreError> {
        let key = self.address.as_str();
        Ok(Wallet {
            balance: decimal(key, &self.balance)?,
            last_activity: timestamp(key, self.last_activity)?,
            activity_count: count(key, self.activity_count)?,
            daily_volume: decimal(key, &self.daily_volume)?,
            daily_count: count(key, self.daily_count)?,
            largest_transaction: decimal(key, &self.largest_transaction)?,
            dex_activity_count: count(key, self.dex_activity_count)?,
            address: self.address,
        })
    }
}

struct TransactionRow {
    signature: String,
    from_wallet: String,
    to_wallet: String,
    amount: String,
    timestamp: i64,
    involved_whales: String,
}

impl TransactionRow {
    fn read(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            signature: row.get(0)?,
            from_wallet: row.get(1)?,
            to_wallet: row.get(2)?,
            amount: row.get(3)?,
            timestamp: row.get(4)?,
            involved_whales: row.get(5)?,
        })
    }

    fn into_transaction(self) -> Result<WhaleTransaction, StoreError> {
        let key = self.signature.as_str();
        let involved_whales = serde_json::from_str(&self.involved_whales)
            .map_err(|e| corrupt(key, format!("involved_whales: {}", e)))?;
        Ok(WhaleTransaction {
            amount: decimal(key, &self.amount)?,
            timestamp: timestamp(key, self.timestamp)?,
            involved_whales,
            from_wallet: self.from_wallet,
            to_wallet: self.to_wallet,
            signature: self.signature,
        })
    }
}

fn corrupt(key: &str, reason: String) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason,
    }
}

fn decimal(key: &str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|e| corrupt(key, format!("bad decimal {:?}: {}", raw, e)))
}

fn timestamp(key: &str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| corrupt(key, format!("bad timestamp {}", millis)))
}

fn count<T: TryFrom<i64>>(key: &str, raw: i64) -> Result<T, StoreError> {
    T::try_from(raw).map_err(|_| corrupt(key, format!("bad count {}", raw)))
}

fn column_int<T: TryInto<i64>>(value: T) -> Result<i64, StoreError> {
    value
        .try_into()
        .map_err(|_| StoreError::Unavailable("counter exceeds SQLite integer range".to_string()))
}

#[async_trait]
impl WhaleStore for SqliteStore {
    async fn get_wallet(&self, address: &str) -> Result<Option<Wallet>, StoreError> {
        let conn = self.connection.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM wallets WHERE address = ?1", WALLET_COLUMNS),
                params![address],
                WalletRow::read,
            )
            .optional()?;
        row.map(WalletRow::into_wallet).transpose()
    }

    async fn upsert_wallet(&self, wallet: Wallet) -> Result<(), StoreError> {
        let conn = self.connection.lock().await;
        conn.execute(
            r#"
            INSERT INTO wallets (address, balance, last_activity, activity_count,
                                 daily_volume, daily_count, largest_transaction, dex_activity_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(address) DO UPDATE SET
                balance = excluded.balance,
                last_activity = excluded.last_activity,
                activity_count = excluded.activity_count,
                daily_volume = excluded.daily_volume,
                daily_count = excluded.daily_count,
                largest_transaction = excluded.largest_transaction,
                dex_activity_count = excluded.dex_activity_count
            "#,
            params![
                wallet.address,
                wallet.balance.to_string(),
                wallet.last_activity.timestamp_millis(),
                column_int(wallet.activity_count)?,
                wallet.daily_volume.to_string(),
                i64::from(wallet.daily_count),
                wallet.largest_transaction.to_string(),
                column_int(wallet.dex_activity_count)?,
            ],
        )?;
        Ok(())
    }

    async fn delete_wallet(&self, address: &str) -> Result<bool, StoreError> {
        let conn = self.connection.lock().await;
        let removed = conn.execute("DELETE FROM wallets WHERE address = ?1", params![address])?;
        Ok(removed > 0)
    }

    async fn insert_transaction(
        &self,
        transaction: WhaleTransaction,
    ) -> Result<InsertOutcome, StoreError> {
        let involved_whales = serde_json::to_string(&transaction.involved_whales)
            .map_err(|e| corrupt(&transaction.signature, format!("involved_whales: {}", e)))?;

        let conn = self.connection.lock().await;
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO transactions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                TRANSACTION_COLUMNS
            ),
            params![
                transaction.signature,
                transaction.from_wallet,
                transaction.to_wallet,
                transaction.amount.to_string(),
                transaction.timestamp.timestamp_millis(),
                involved_whales,
            ],
        )?;

        Ok(if inserted > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyPresent
        })
    }

    async fn activity_since(
        &self,
        address: &str,
        since: DateTime<Utc>,
    ) -> Result<ActivitySummary, StoreError> {
        let conn = self.connection.lock().await;
        // Two index-backed halves; a self transfer is only counted by the first
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT amount FROM transactions WHERE from_wallet = ?1 AND timestamp >= ?2
            UNION ALL
            SELECT amount FROM transactions
            WHERE to_wallet = ?1 AND from_wallet <> ?1 AND timestamp >= ?2
            "#,
        )?;
        let amounts = stmt.query_map(params![address, since.timestamp_millis()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut summary = ActivitySummary::default();
        for amount in amounts {
            summary.volume += decimal(address, &amount?)?.abs();
            summary.count += 1;
        }
        Ok(summary)
    }

    async fn has_activity_before(
        &self,
        address: &str,
        before: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.connection.lock().await;
        let found = conn.query_row(
            r#"
            SELECT EXISTS(SELECT 1 FROM transactions WHERE from_wallet = ?1 AND timestamp < ?2)
                OR EXISTS(SELECT 1 FROM transactions WHERE to_wallet = ?1 AND timestamp < ?2)
            "#,
            params![address, before.timestamp_millis()],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(found)
    }

    async fn top_wallets(&self, limit: usize) -> Result<Vec<Wallet>, StoreError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM wallets ORDER BY CAST(balance AS REAL) DESC, address ASC LIMIT ?1",
            WALLET_COLUMNS
        ))?;
        let rows = stmt.query_map(params![column_int(limit)?], WalletRow::read)?;

        let mut wallets = Vec::new();
        for row in rows {
            wallets.push(row?.into_wallet()?);
        }
        Ok(wallets)
    }

    async fn recent_transactions(&self, limit: usize) -> Result<Vec<WhaleTransaction>, StoreError> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions ORDER BY timestamp DESC, signature DESC LIMIT ?1",
            TRANSACTION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![column_int(limit)?], TransactionRow::read)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?.into_transaction()?);
        }
        Ok(transactions)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.connection.lock().await;
        let (wallets, transactions): (i64, i64) = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM wallets), (SELECT COUNT(*) FROM transactions)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(StoreStats {
            wallets: count("wallets", wallets)?,
            transactions: count("transactions", transactions)?,
        })
    }
}
