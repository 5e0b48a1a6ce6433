use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
#[cfg(test)]
use mockall::automock;
use solana_account_decoder::{UiAccountEncoding, UiDataSliceConfig};
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcBlockConfig, RpcProgramAccountsConfig},
    rpc_filter::{Memcmp, RpcFilterType},
    rpc_request::RpcError,
};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use solana_transaction_status::{
    EncodedTransaction,
    EncodedTransactionWithStatusMeta,
    TransactionDetails,
    UiLoadedAddresses,
    UiMessage,
    UiTransactionEncoding,
};

use super::error::LedgerError;
use super::types::{LedgerBlock, LedgerTransaction, MemcmpFilter, Slot};
use crate::SolanaConfig;

// Node answers for slots that will never have a block
const SLOT_SKIPPED: i64 = -32007;
const LONG_TERM_STORAGE_SLOT_SKIPPED: i64 = -32009;

/// Read-only view of the ledger the sampler depends on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn get_slot(&self) -> Result<Slot, LedgerError>;

    /// `Ok(None)` means the slot has no block (skipped or pruned).
    async fn get_block(&self, slot: Slot) -> Result<Option<LedgerBlock>, LedgerError>;

    async fn get_program_accounts(
        &self,
        program_id: Pubkey,
        filter: MemcmpFilter,
    ) -> Result<Vec<Pubkey>, LedgerError>;
}

pub struct RpcLedger {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    max_supported_transaction_version: u8,
}

impl RpcLedger {
    pub fn new(solana_config: &SolanaConfig, max_supported_transaction_version: u8) -> Self {
        Self {
            client: solana_config.create_rpc_client(),
            commitment: solana_config.commitment,
            max_supported_transaction_version,
        }
    }

    fn block_config(&self) -> RpcBlockConfig {
        RpcBlockConfig {
            encoding: Some(UiTransactionEncoding::Json),
            transaction_details: Some(TransactionDetails::Full),
            rewards: Some(false),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(self.max_supported_transaction_version),
        }
    }
}

#[async_trait]
impl LedgerSource for RpcLedger {
    async fn get_slot(&self) -> Result<Slot, LedgerError> {
        Ok(self.client.get_slot_with_commitment(self.commitment).await?)
    }

    async fn get_block(&self, slot: Slot) -> Result<Option<LedgerBlock>, LedgerError> {
        let block = match self.client.get_block_with_config(slot, self.block_config()).await {
            Ok(block) => block,
            Err(e) if is_missing_slot(&e) => {
                debug!("Slot {} has no block: {}", slot, e);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let transactions = block
            .transactions
            .unwrap_or_default()
            .into_iter()
            .map(|tx| decode_transaction(tx, block.block_time))
            .collect();

        Ok(Some(LedgerBlock {
            slot,
            block_time: block.block_time,
            transactions,
        }))
    }

    async fn get_program_accounts(
        &self,
        program_id: Pubkey,
        filter: MemcmpFilter,
    ) -> Result<Vec<Pubkey>, LedgerError> {
        // Only the keys matter, so ask for an empty data slice
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                filter.offset,
                &filter.bytes,
            ))]),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                data_slice: Some(UiDataSliceConfig { offset: 0, length: 0 }),
                commitment: Some(self.commitment),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };

        let accounts = self
            .client
            .get_program_accounts_with_config(&program_id, config)
            .await?;

        Ok(accounts.into_iter().map(|(pubkey, _)| pubkey).collect())
    }
}

fn is_missing_slot(error: &ClientError) -> bool {
    matches!(
        error.kind(),
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, .. })
            if *code == SLOT_SKIPPED || *code == LONG_TERM_STORAGE_SLOT_SKIPPED
    )
}

/// Flatten an RPC transaction into the sampler's view. Missing pieces are left
/// empty so the extractor can reject them.
pub fn decode_transaction(
    encoded: EncodedTransactionWithStatusMeta,
    block_time: Option<i64>,
) -> LedgerTransaction {
    let (signature, mut account_keys) = match &encoded.transaction {
        EncodedTransaction::Json(ui_tx) => {
            let keys = match &ui_tx.message {
                UiMessage::Raw(raw) => raw.account_keys.clone(),
                UiMessage::Parsed(parsed) => parsed
                    .account_keys
                    .iter()
                    .map(|account| account.pubkey.clone())
                    .collect(),
            };
            (ui_tx.signatures.first().cloned(), keys)
        }
        other => match other.decode() {
            Some(tx) => (
                tx.signatures.first().map(|s| s.to_string()),
                tx.message
                    .static_account_keys()
                    .iter()
                    .map(|key| key.to_string())
                    .collect(),
            ),
            None => {
                warn!("Unable to decode transaction encoding, keeping it as malformed");
                (None, Vec::new())
            }
        },
    };

    let (pre_balances, post_balances) = match encoded.meta {
        Some(meta) => {
            // Balances cover loaded addresses too: writable first, then readonly
            let loaded: Option<UiLoadedAddresses> = meta.loaded_addresses.into();
            if let Some(loaded) = loaded {
                account_keys.extend(loaded.writable);
                account_keys.extend(loaded.readonly);
            }
            (Some(meta.pre_balances), Some(meta.post_balances))
        }
        None => (None, None),
    };

    LedgerTransaction {
        signature,
        account_keys,
        pre_balances,
        post_balances,
        block_time,
    }
}

/// Parse a base58 address, reporting bad input as malformed data.
pub fn parse_pubkey(address: &str) -> Result<Pubkey, LedgerError> {
    Pubkey::from_str(address)
        .map_err(|e| LedgerError::Malformed(format!("invalid address {}: {}", address, e)))
}
