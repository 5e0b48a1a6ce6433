pub mod classifier;
pub mod config;
pub mod detector;
pub mod extractor;
pub mod recorder;
pub mod report;
pub mod types;
pub mod wallets;

pub use classifier::{ClassifyError, WhaleClassifier};
pub use config::{AmountMode, RuleSet, WhaleConfig};
pub use detector::{DetectionReport, WhaleDetector};
pub use extractor::{extract_deltas, AccountDelta};
pub use recorder::{RecordOutcome, TransactionRecorder};
pub use types::{Observation, Verdict, Wallet, WalletOutcome, WhaleReason, WhaleTransaction};
pub use wallets::WalletStateManager;
