use std::collections::HashSet;

use super::programs::{identify_protocol, DexProtocol};
use crate::ledger::LedgerTransaction;

/// Decides whether a transaction touched one of the allow-listed DEX programs.
#[derive(Clone, Debug, Default)]
pub struct DexAnalyzer {
    supported_dexes: HashSet<String>,
}

impl DexAnalyzer {
    pub fn new(supported_dexes: HashSet<String>) -> Self {
        Self { supported_dexes }
    }

    /// First allow-listed program referenced by the transaction, if any.
    pub fn involvement(&self, transaction: &LedgerTransaction) -> Option<DexProtocol> {
        transaction
            .account_keys
            .iter()
            .find(|key| self.supported_dexes.contains(key.as_str()))
            .map(|key| identify_protocol(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::programs::{default_dex_programs, JUPITER_PROGRAM_ID};

    fn tx(keys: &[&str]) -> LedgerTransaction {
        LedgerTransaction {
            account_keys: keys.iter().map(|k| k.to_string()).collect(),
            ..LedgerTransaction::default()
        }
    }

    #[test]
    fn detects_allow_listed_program() {
        let analyzer = DexAnalyzer::new(default_dex_programs());
        let swap = tx(&["payer", "pool", JUPITER_PROGRAM_ID]);

        assert_eq!(analyzer.involvement(&swap), Some(DexProtocol::Jupiter));
    }

    #[test]
    fn plain_transfer_is_not_dex() {
        let analyzer = DexAnalyzer::new(default_dex_programs());
        let transfer = tx(&["from", "to", "11111111111111111111111111111111"]);

        assert_eq!(analyzer.involvement(&transfer), None);
    }

    #[test]
    fn custom_program_reports_unknown_protocol() {
        let analyzer = DexAnalyzer::new(["MyDex".to_string()].into_iter().collect());
        assert_eq!(analyzer.involvement(&tx(&["a", "MyDex"])), Some(DexProtocol::Unknown));
    }
}
