pub mod analyzer;
pub mod programs;
pub mod staking;

pub use analyzer::DexAnalyzer;
pub use programs::{default_dex_programs, DexProtocol};
pub use staking::StakingLookup;
