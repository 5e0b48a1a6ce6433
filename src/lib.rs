pub mod clock;
pub mod config;
pub mod dex;
pub mod ledger;
pub mod retry;
pub mod scheduler;
pub mod solana_config;
pub mod store;
pub mod whale;

pub use clock::{Clock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use solana_config::SolanaConfig;

// Re-export key types
pub use ledger::{
    FetchConfig,
    FetchOutcome,
    LedgerBlock,
    LedgerError,
    LedgerSource,
    LedgerTransaction,
    RateLimitedFetcher,
    RpcLedger,
};

pub use store::{
    MemoryStore,
    SqliteStore,
    StoreConfig,
    StoreError,
    WhaleStore,
};

pub use whale::{
    RuleSet,
    Verdict,
    Wallet,
    WhaleConfig,
    WhaleDetector,
    WhaleTransaction,
};

pub use scheduler::{CycleReport, SamplingScheduler, SchedulerConfig};
