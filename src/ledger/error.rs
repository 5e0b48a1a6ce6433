use solana_client::client_error::ClientError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Rate limited by RPC node: {0}")]
    RateLimited(String),

    #[error("Transient RPC error: {0}")]
    Transient(String),

    #[error("Malformed ledger data: {0}")]
    Malformed(String),
}

impl LedgerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LedgerError::RateLimited(_))
    }

    /// Sort a client error into rate limiting or a generic transient failure.
    pub fn from_message(message: String) -> Self {
        if is_rate_limit_message(&message) {
            LedgerError::RateLimited(message)
        } else {
            LedgerError::Transient(message)
        }
    }
}

impl From<ClientError> for LedgerError {
    fn from(error: ClientError) -> Self {
        LedgerError::from_message(error.to_string())
    }
}

fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit")
}
