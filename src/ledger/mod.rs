mod client;
mod error;
mod fetcher;
mod types;

#[cfg(test)]
pub use client::MockLedgerSource;
pub use client::{decode_transaction, parse_pubkey, LedgerSource, RpcLedger};
pub use error::LedgerError;
pub use fetcher::{FetchConfig, FetchOutcome, RateLimitedFetcher};
pub use types::{
    lamports_to_sol,
    LedgerBlock,
    LedgerTransaction,
    MemcmpFilter,
    Slot,
    LAMPORTS_PER_SOL,
};
