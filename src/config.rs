use std::env;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::ledger::FetchConfig;
use crate::retry::RetryConfig;
use crate::scheduler::SchedulerConfig;
use crate::solana_config::SolanaConfig;
use crate::store::StoreConfig;
use crate::whale::WhaleConfig;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Read `key` from the environment, falling back to `default` when unset.
/// A set but unparsable value is an error.
pub fn env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

pub fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Split a comma separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

// Configuration struct to hold different component configurations
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub solana: SolanaConfig,
    pub whale: WhaleConfig,
    pub fetch: FetchConfig,
    pub scheduler: SchedulerConfig,
    pub recorder_retry: RetryConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            solana: SolanaConfig::load_from_env()?,
            whale: WhaleConfig::load_from_env()?,
            fetch: FetchConfig::load_from_env()?,
            scheduler: SchedulerConfig::load_from_env()?,
            recorder_retry: RetryConfig::load_from_env()?,
            store: StoreConfig::load_from_env()?,
        })
    }
}
