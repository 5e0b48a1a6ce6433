use log::{debug, warn};
use rust_decimal::Decimal;

use crate::ledger::{lamports_to_sol, LedgerTransaction};

/// Balance movement of one account inside one transaction, in SOL.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountDelta {
    pub address: String,
    pub pre_balance: Decimal,
    pub post_balance: Decimal,
}

impl AccountDelta {
    pub fn balance(&self) -> Decimal {
        self.post_balance
    }

    pub fn delta(&self) -> Decimal {
        (self.post_balance - self.pre_balance).abs()
    }
}

/// Pair every account key with its pre/post balance. Anything malformed
/// yields no deltas at all.
pub fn extract_deltas(transaction: &LedgerTransaction) -> Vec<AccountDelta> {
    let (pre, post) = match (&transaction.pre_balances, &transaction.post_balances) {
        (Some(pre), Some(post)) => (pre, post),
        _ => {
            warn!(
                "Skipping transaction {:?}: missing balance metadata",
                transaction.signature
            );
            return Vec::new();
        }
    };

    let keys = &transaction.account_keys;
    // A transfer needs a sender and a receiver at minimum
    if keys.len() < 2 || pre.len() != keys.len() || post.len() != keys.len() {
        warn!(
            "Skipping malformed transaction {:?}: {} keys, {} pre balances, {} post balances",
            transaction.signature,
            keys.len(),
            pre.len(),
            post.len()
        );
        return Vec::new();
    }

    keys.iter()
        .zip(pre.iter().zip(post.iter()))
        .map(|(address, (pre, post))| AccountDelta {
            address: address.clone(),
            pre_balance: lamports_to_sol(*pre),
            post_balance: lamports_to_sol(*post),
        })
        .collect()
}

/// Keep only accounts large enough in balance or movement to be worth a lookup.
pub fn worth_considering(delta: &AccountDelta, min_amount: Decimal) -> bool {
    let keep = delta.balance() >= min_amount || delta.delta() >= min_amount;
    if !keep {
        debug!("Ignoring {} below minimum amount", delta.address);
    }
    keep
}

/// Total SOL moved across every account of the transaction.
pub fn aggregate_movement(deltas: &[AccountDelta]) -> Decimal {
    deltas.iter().map(AccountDelta::delta).sum()
}
