use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::config::{env_or, parse_list, ConfigError};
use crate::dex::programs::default_dex_programs;

// Well above the total SOL supply; keeps threshold arithmetic in range
const MAX_THRESHOLD_SOL: i64 = 1_000_000_000_000;
const MAX_LONG_TERM_DAYS: i64 = 36_500;

/// Which classification rules are active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleSet {
    /// Balance threshold only.
    Balance,
    /// Balance, daily volume, daily count and long-term holder checks.
    Activity,
    /// DEX transactions by non-staking accounts only.
    Dex,
}

impl FromStr for RuleSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balance" => Ok(RuleSet::Balance),
            "activity" => Ok(RuleSet::Activity),
            "dex" => Ok(RuleSet::Dex),
            other => Err(format!("unknown rule set {:?} (balance, activity or dex)", other)),
        }
    }
}

/// How a stored transaction's amount is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmountMode {
    /// Magnitude of the second account key's balance change.
    Receiver,
    /// Sum of every account's balance change magnitude.
    Aggregate,
}

impl FromStr for AmountMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "receiver" => Ok(AmountMode::Receiver),
            "aggregate" => Ok(AmountMode::Aggregate),
            other => Err(format!("unknown amount mode {:?} (receiver or aggregate)", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WhaleConfig {
    pub rule_set: RuleSet,
    pub balance_threshold: Decimal,      // SOL held to be a whale outright
    pub volume_threshold: Decimal,       // SOL moved per 24h
    pub count_threshold: u64,            // transactions per 24h
    pub min_amount_to_check: Decimal,    // noise filter before classification
    pub long_term_days: i64,
    pub dex_balance_threshold: Decimal,
    pub dex_transaction_threshold: Decimal, // share of the transaction's movement
    pub min_balance_to_track: Decimal,
    pub dex_programs: HashSet<String>,
    pub amount_mode: AmountMode,
}

impl Default for WhaleConfig {
    fn default() -> Self {
        Self {
            rule_set: RuleSet::Activity,
            balance_threshold: Decimal::from(10_000),
            volume_threshold: Decimal::from(100_000),
            count_threshold: 50,
            min_amount_to_check: Decimal::from(1_000),
            long_term_days: 30,
            dex_balance_threshold: Decimal::from(1_000),
            dex_transaction_threshold: Decimal::new(25, 2),
            min_balance_to_track: Decimal::from(100),
            dex_programs: default_dex_programs(),
            amount_mode: AmountMode::Receiver,
        }
    }
}

impl WhaleConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let dex_programs = match std::env::var("WHALE_DEX_PROGRAM_IDS") {
            Ok(raw) if !raw.trim().is_empty() => parse_list(&raw).into_iter().collect(),
            _ => defaults.dex_programs,
        };

        let config = Self {
            rule_set: env_or("WHALE_RULE_SET", defaults.rule_set)?,
            balance_threshold: env_or("WHALE_BALANCE_THRESHOLD", defaults.balance_threshold)?,
            volume_threshold: env_or("WHALE_VOLUME_THRESHOLD", defaults.volume_threshold)?,
            count_threshold: env_or("WHALE_COUNT_THRESHOLD", defaults.count_threshold)?,
            min_amount_to_check: env_or("WHALE_MIN_AMOUNT_TO_CHECK", defaults.min_amount_to_check)?,
            long_term_days: env_or("WHALE_LONG_TERM_DAYS", defaults.long_term_days)?,
            dex_balance_threshold: env_or(
                "WHALE_DEX_BALANCE_THRESHOLD",
                defaults.dex_balance_threshold,
            )?,
            dex_transaction_threshold: env_or(
                "WHALE_DEX_TRANSACTION_THRESHOLD",
                defaults.dex_transaction_threshold,
            )?,
            min_balance_to_track: env_or("WHALE_MIN_BALANCE_TO_TRACK", defaults.min_balance_to_track)?,
            dex_programs,
            amount_mode: env_or("WHALE_AMOUNT_MODE", defaults.amount_mode)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the classifier and report arithmetic cannot handle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = Decimal::from(MAX_THRESHOLD_SOL);
        for (key, value) in [
            ("WHALE_BALANCE_THRESHOLD", self.balance_threshold),
            ("WHALE_VOLUME_THRESHOLD", self.volume_threshold),
            ("WHALE_MIN_AMOUNT_TO_CHECK", self.min_amount_to_check),
            ("WHALE_DEX_BALANCE_THRESHOLD", self.dex_balance_threshold),
            ("WHALE_DEX_TRANSACTION_THRESHOLD", self.dex_transaction_threshold),
            ("WHALE_MIN_BALANCE_TO_TRACK", self.min_balance_to_track),
        ] {
            if value < Decimal::ZERO || value > max {
                return Err(out_of_range(key, value, &format!("must be between 0 and {}", max)));
            }
        }

        if !(0..=MAX_LONG_TERM_DAYS).contains(&self.long_term_days) {
            return Err(out_of_range(
                "WHALE_LONG_TERM_DAYS",
                self.long_term_days,
                &format!("must be between 0 and {}", MAX_LONG_TERM_DAYS),
            ));
        }
        Ok(())
    }

    pub fn with_rule_set(mut self, rule_set: RuleSet) -> Self {
        self.rule_set = rule_set;
        self
    }

    /// Smallest balance or movement worth classifying. The DEX rule judges
    /// holders down to `min_balance_to_track`, so it uses that floor instead.
    pub fn consider_minimum(&self) -> Decimal {
        match self.rule_set {
            RuleSet::Dex => self.min_balance_to_track,
            RuleSet::Balance | RuleSet::Activity => self.min_amount_to_check,
        }
    }
}

fn out_of_range(key: &str, value: impl std::fmt::Display, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_sets() {
        assert_eq!("Balance".parse::<RuleSet>(), Ok(RuleSet::Balance));
        assert_eq!(" dex ".parse::<RuleSet>(), Ok(RuleSet::Dex));
        assert!("whale".parse::<RuleSet>().is_err());
        assert_eq!("aggregate".parse::<AmountMode>(), Ok(AmountMode::Aggregate));
    }

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = WhaleConfig::default();
        assert_eq!(config.balance_threshold, Decimal::from(10_000));
        assert_eq!(config.count_threshold, 50);
        assert_eq!(config.rule_set, RuleSet::Activity);
        assert!(!config.dex_programs.is_empty());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(WhaleConfig::default().validate().is_ok());

        let huge = WhaleConfig {
            balance_threshold: Decimal::MAX,
            ..WhaleConfig::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "WHALE_BALANCE_THRESHOLD"
        ));

        let ancient = WhaleConfig {
            long_term_days: i64::MAX,
            ..WhaleConfig::default()
        };
        assert!(matches!(
            ancient.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "WHALE_LONG_TERM_DAYS"
        ));

        let negative = WhaleConfig {
            min_balance_to_track: Decimal::from(-1),
            ..WhaleConfig::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn dex_rule_considers_down_to_tracking_minimum() {
        let config = WhaleConfig::default();
        assert_eq!(config.consider_minimum(), Decimal::from(1_000));
        assert_eq!(config.with_rule_set(RuleSet::Dex).consider_minimum(), Decimal::from(100));
    }
}
