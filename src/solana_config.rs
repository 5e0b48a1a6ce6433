use std::sync::Arc;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;

use crate::config::{env_or, ConfigError};

const MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

#[derive(Debug, Clone)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
}

impl SolanaConfig {
    // Default mainnet configuration
    pub fn mainnet_default() -> Self {
        Self {
            rpc_url: MAINNET_RPC_URL.to_string(),
            commitment: CommitmentConfig::confirmed(),
        }
    }

    // Alternative constructor for different networks
    pub fn custom(rpc_url: String, commitment: CommitmentConfig) -> Self {
        Self { rpc_url, commitment }
    }

    pub fn load_from_env() -> Result<Self, ConfigError> {
        let rpc_url = env_or("SOLANA_RPC_URL", MAINNET_RPC_URL.to_string())?;
        let commitment = match env_or("SOLANA_COMMITMENT", "confirmed".to_string())?
            .to_ascii_lowercase()
            .as_str()
        {
            "processed" => CommitmentConfig::processed(),
            "confirmed" => CommitmentConfig::confirmed(),
            "finalized" => CommitmentConfig::finalized(),
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "SOLANA_COMMITMENT".to_string(),
                    value: other.to_string(),
                    reason: "expected processed, confirmed or finalized".to_string(),
                })
            }
        };

        Ok(Self::custom(rpc_url, commitment))
    }

    // Create RPC client
    pub fn create_rpc_client(&self) -> Arc<RpcClient> {
        Arc::new(RpcClient::new_with_commitment(
            self.rpc_url.clone(),
            self.commitment,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_default_is_confirmed() {
        let config = SolanaConfig::mainnet_default();
        assert_eq!(config.rpc_url, MAINNET_RPC_URL);
        assert_eq!(config.commitment, CommitmentConfig::confirmed());
    }
}
