use std::time::Duration;

use chain_btc::network::BtcNetwork;
use chain_btc::utxo::{SelectionStrategy, DEFAULT_MAX_BNB_ITERATIONS};
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Confirmation targets, in blocks, for slow / medium / fast fee suggestions.
pub const FEE_TARGETS: [u32; 3] = [24, 6, 2];

/// Adapter settings. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub network: BtcNetwork,
    /// Branch-and-bound call budget for optimal selection.
    pub max_bnb_iterations: usize,
    /// Strategy used when a build request does not name one.
    pub strategy: SelectionStrategy,
    /// Maximum concurrent provider calls during a fan-out.
    pub fan_out_limit: usize,
    pub broadcast_timeout_secs: u64,
    /// Confirmation target used when a build request has no fee rate.
    pub fee_target_blocks: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            network: BtcNetwork::Mainnet,
            max_bnb_iterations: DEFAULT_MAX_BNB_ITERATIONS,
            strategy: SelectionStrategy::Optimal,
            fan_out_limit: 8,
            broadcast_timeout_secs: 30,
            fee_target_blocks: FEE_TARGETS[1],
        }
    }
}

impl AdapterConfig {
    pub fn for_network(network: BtcNetwork) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, AdapterError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| AdapterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.max_bnb_iterations == 0 {
            return Err(AdapterError::Config(
                "max_bnb_iterations must be positive".into(),
            ));
        }
        if self.fan_out_limit == 0 {
            return Err(AdapterError::Config("fan_out_limit must be positive".into()));
        }
        if self.broadcast_timeout_secs == 0 {
            return Err(AdapterError::Config(
                "broadcast_timeout_secs must be positive".into(),
            ));
        }
        if self.fee_target_blocks == 0 {
            return Err(AdapterError::Config(
                "fee_target_blocks must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_secs(self.broadcast_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            AdapterConfig::from_json(r#"{"network": "testnet", "strategy": "largest_first"}"#)
                .unwrap();
        assert_eq!(config.network, BtcNetwork::Testnet);
        assert_eq!(config.strategy, SelectionStrategy::LargestFirst);
        assert_eq!(config.max_bnb_iterations, DEFAULT_MAX_BNB_ITERATIONS);
        assert_eq!(config.broadcast_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_zero_limits_and_bad_json() {
        assert!(matches!(
            AdapterConfig::from_json(r#"{"fan_out_limit": 0}"#),
            Err(AdapterError::Config(_))
        ));
        assert!(matches!(
            AdapterConfig::from_json(r#"{"network": "signet"}"#),
            Err(AdapterError::Config(_))
        ));
        assert!(matches!(
            AdapterConfig::from_json("not json"),
            Err(AdapterError::Config(_))
        ));
    }

    #[test]
    fn default_is_valid() {
        AdapterConfig::default().validate().unwrap();
        assert_eq!(
            AdapterConfig::for_network(BtcNetwork::Regtest).network,
            BtcNetwork::Regtest
        );
    }
}
