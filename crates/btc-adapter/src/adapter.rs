use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chain_btc::address::{self, AddressGenerator, AddressType};
use chain_btc::error::BtcError;
use chain_btc::network::BtcNetwork;
use chain_btc::transaction::{
    self, SignedTransaction, TransactionBuilder, TransactionRequest, UnsignedTransaction,
};
use chain_btc::utxo::{SelectionStrategy, Utxo, UtxoSelection, UtxoSelector};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::{AdapterConfig, FEE_TARGETS};
use crate::error::AdapterError;
use crate::provider::{Balance, BlockchainDataProvider, TransactionDetails};

/// Parameters for [`ChainAdapter::build_transaction`].
///
/// Missing fee rate and UTXOs are fetched from the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub from: String,
    pub to: String,
    pub amount_sat: u64,
    #[serde(default)]
    pub fee_rate: Option<u64>,
    #[serde(default)]
    pub utxos: Option<Vec<Utxo>>,
    #[serde(default)]
    pub change_address: Option<String>,
    #[serde(default)]
    pub strategy: Option<SelectionStrategy>,
}

/// Fee rates in sat/vB for 24, 6 and 2 block confirmation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSuggestions {
    pub slow: u64,
    pub medium: u64,
    pub fast: u64,
}

/// Bitcoin operations for one network over an injected data provider.
pub struct ChainAdapter<P> {
    provider: Arc<P>,
    generator: AddressGenerator,
    builder: TransactionBuilder,
    config: AdapterConfig,
}

impl<P: BlockchainDataProvider> ChainAdapter<P> {
    pub fn new(provider: Arc<P>, config: AdapterConfig) -> Result<Self, AdapterError> {
        config.validate()?;
        Ok(Self {
            provider,
            generator: AddressGenerator::new(config.network),
            builder: TransactionBuilder::new(config.network)
                .with_max_iterations(config.max_bnb_iterations),
            config,
        })
    }

    pub fn network(&self) -> BtcNetwork {
        self.config.network
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    // ─── Addresses ───────────────────────────────────────────────────

    pub fn generate_address(
        &self,
        public_key: &[u8; 33],
        address_type: AddressType,
    ) -> Result<String, AdapterError> {
        Ok(self.generator.generate(public_key, address_type)?)
    }

    pub fn validate_address(&self, address: &str) -> bool {
        self.generator.validate(address)
    }

    pub fn script_pubkey(&self, address: &str) -> Result<Vec<u8>, AdapterError> {
        Ok(self.generator.script_pubkey(address)?)
    }

    pub fn estimate_transaction_size(
        &self,
        num_inputs: usize,
        num_outputs: usize,
        address_type: AddressType,
    ) -> u64 {
        address::estimate_transaction_size(num_inputs, num_outputs, address_type)
    }

    // ─── Transactions ────────────────────────────────────────────────

    pub fn select_utxos(
        &self,
        utxos: &[Utxo],
        target_sat: u64,
        fee_rate: u64,
        address_type: AddressType,
        strategy: SelectionStrategy,
    ) -> Result<UtxoSelection, AdapterError> {
        let selection = UtxoSelector::new(address_type)
            .with_max_iterations(self.config.max_bnb_iterations)
            .select(utxos, target_sat, fee_rate, strategy)?;
        Ok(selection)
    }

    /// Validate addresses, fill in fee rate and UTXOs from the provider when
    /// absent, and build the unsigned transaction.
    pub async fn build_transaction(
        &self,
        request: BuildRequest,
        cancel: &CancellationToken,
    ) -> Result<UnsignedTransaction, AdapterError> {
        self.require_address(&request.from)?;
        self.require_address(&request.to)?;
        if let Some(change) = &request.change_address {
            self.require_address(change)?;
        }

        let fee_rate = match request.fee_rate {
            Some(rate) => rate,
            None => {
                let target = self.config.fee_target_blocks;
                let rate = guarded(cancel, self.provider.estimate_fee_rate(target, cancel)).await??;
                rate.max(1)
            }
        };

        let utxos = match request.utxos {
            Some(utxos) => utxos,
            None => guarded(cancel, self.provider.fetch_utxos(&request.from, cancel)).await??,
        };

        debug!(
            utxos = utxos.len(),
            amount_sat = request.amount_sat,
            fee_rate,
            "building transaction"
        );

        let unsigned = self.builder.build(&TransactionRequest {
            utxos,
            from: request.from,
            to: request.to,
            amount_sat: request.amount_sat,
            fee_rate,
            change_address: request.change_address,
            strategy: request.strategy.unwrap_or(self.config.strategy),
        })?;
        Ok(unsigned)
    }

    pub fn sign_transaction(
        &self,
        unsigned: &UnsignedTransaction,
        private_keys: &[[u8; 32]],
    ) -> Result<SignedTransaction, AdapterError> {
        Ok(transaction::sign_transaction(unsigned, private_keys)?)
    }

    /// Relay `signed` through the provider, bounded by `timeout` or the
    /// configured default.
    pub async fn broadcast_transaction(
        &self,
        signed: &SignedTransaction,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<String, AdapterError> {
        let limit = timeout.unwrap_or_else(|| self.config.broadcast_timeout());
        let raw_hex = signed.to_hex();
        let local_txid = signed.txid();

        let relay = tokio::time::timeout(
            limit,
            self.provider.broadcast_transaction(&raw_hex, cancel),
        );
        let txid = match guarded(cancel, relay).await? {
            Ok(Ok(txid)) => txid,
            Ok(Err(e)) => {
                warn!(txid = %local_txid, error = %e, "broadcast rejected");
                return Err(AdapterError::BroadcastFailed(e.to_string()));
            }
            Err(_) => {
                warn!(txid = %local_txid, ?limit, "broadcast timed out");
                return Err(AdapterError::NetworkTimeout(limit));
            }
        };

        if txid != local_txid {
            warn!(provider = %txid, local = %local_txid, "provider returned a different txid");
        }
        info!(txid = %txid, vsize = signed.vsize(), "broadcast transaction");
        Ok(txid)
    }

    /// Build, sign and broadcast a single-key payment.
    pub async fn send_transaction(
        &self,
        from: &str,
        to: &str,
        amount_sat: u64,
        private_key: &[u8; 32],
        fee_rate: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<String, AdapterError> {
        let request = BuildRequest {
            from: from.to_string(),
            to: to.to_string(),
            amount_sat,
            fee_rate,
            ..BuildRequest::default()
        };
        let unsigned = self.build_transaction(request, cancel).await?;
        let signed = self.sign_transaction(&unsigned, &[*private_key])?;
        self.broadcast_transaction(&signed, None, cancel).await
    }

    // ─── Chain data ──────────────────────────────────────────────────

    pub async fn get_balance(
        &self,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<Balance, AdapterError> {
        self.require_address(address)?;
        Ok(guarded(cancel, self.provider.fetch_balance(address, cancel)).await??)
    }

    /// Balances for every address, fetched concurrently. Any failure fails
    /// the whole call.
    pub async fn get_balances(
        &self,
        addresses: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Balance>, AdapterError> {
        for address in addresses {
            self.require_address(address)?;
        }
        debug!(count = addresses.len(), "fetching balances");

        let fetches = stream::iter(addresses.iter().cloned())
            .map(|address| async move {
                let balance = self.provider.fetch_balance(&address, cancel).await?;
                Ok::<_, AdapterError>((address, balance))
            })
            .buffered(self.config.fan_out_limit)
            .try_collect::<HashMap<_, _>>();
        guarded(cancel, fetches).await?
    }

    /// UTXOs of every address, fetched concurrently and concatenated in
    /// address order. Any failure fails the whole call.
    pub async fn get_utxos(
        &self,
        addresses: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Utxo>, AdapterError> {
        for address in addresses {
            self.require_address(address)?;
        }
        debug!(count = addresses.len(), "fetching utxos");

        let fetches = stream::iter(addresses.iter())
            .map(|address| async move {
                Ok::<_, AdapterError>(self.provider.fetch_utxos(address, cancel).await?)
            })
            .buffered(self.config.fan_out_limit)
            .try_concat();
        guarded(cancel, fetches).await?
    }

    pub async fn get_transaction_history(
        &self,
        address: &str,
        limit: usize,
        offset: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<TransactionDetails>, AdapterError> {
        self.require_address(address)?;
        let history = self
            .provider
            .fetch_transaction_history(address, limit, offset, cancel);
        Ok(guarded(cancel, history).await??)
    }

    /// Query the three confirmation targets concurrently. Each rate is
    /// reported as estimated, floored at 1 sat/vB.
    pub async fn get_fee_suggestions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FeeSuggestions, AdapterError> {
        let [slow, medium, fast] = FEE_TARGETS;
        let estimates = async {
            tokio::try_join!(
                self.provider.estimate_fee_rate(slow, cancel),
                self.provider.estimate_fee_rate(medium, cancel),
                self.provider.estimate_fee_rate(fast, cancel),
            )
        };
        let (slow, medium, fast) = guarded(cancel, estimates).await??;

        Ok(FeeSuggestions {
            slow: slow.max(1),
            medium: medium.max(1),
            fast: fast.max(1),
        })
    }

    fn require_address(&self, address: &str) -> Result<(), AdapterError> {
        self.generator
            .check(address)
            .map_err(|e| BtcError::InvalidAddress(format!("{address}: {e}")))?;
        Ok(())
    }
}

/// Run `fut` unless `cancel` fires first.
async fn guarded<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, AdapterError>
where
    F: Future<Output = T>,
{
    if cancel.is_cancelled() {
        return Err(AdapterError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AdapterError::Cancelled),
        out = fut => Ok(out),
    }
}
