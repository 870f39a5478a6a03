use async_trait::async_trait;
use chain_btc::utxo::Utxo;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::error::ProviderError;

/// Address balance in satoshis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub confirmed: u64,
    /// Mempool delta; negative while an outgoing spend is unconfirmed.
    pub unconfirmed: i64,
    pub total: i64,
}

impl Balance {
    /// `total` saturates at the `i64` bounds.
    pub fn new(confirmed: u64, unconfirmed: i64) -> Self {
        Self {
            confirmed,
            unconfirmed,
            total: i64::try_from(confirmed)
                .unwrap_or(i64::MAX)
                .saturating_add(unconfirmed),
        }
    }
}

/// One entry of an address's transaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub txid: String,
    pub confirmations: u32,
    pub block_height: Option<u32>,
    /// Block time, seconds since the Unix epoch.
    pub timestamp: Option<u64>,
    pub fee_sat: Option<u64>,
    /// Value received minus value sent by the queried address.
    pub net_amount_sat: i64,
}

/// Source of chain data and transaction relay.
///
/// Implementations own their transport (HTTP, Electrum, a node RPC). They
/// should return promptly once `cancel` fires, but the adapter also stops
/// awaiting them at that point.
#[async_trait]
pub trait BlockchainDataProvider: Send + Sync {
    async fn fetch_balance(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Balance, ProviderError>;

    async fn fetch_utxos(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Utxo>, ProviderError>;

    async fn fetch_transaction_history(
        &self,
        address: &str,
        limit: usize,
        offset: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<TransactionDetails>, ProviderError>;

    /// Relay a raw transaction and return its txid.
    async fn broadcast_transaction(
        &self,
        raw_hex: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;

    /// Fee rate in sat/vB expected to confirm within `target_blocks`.
    async fn estimate_fee_rate(
        &self,
        target_blocks: u32,
        cancel: &CancellationToken,
    ) -> Result<u64, ProviderError>;
}
