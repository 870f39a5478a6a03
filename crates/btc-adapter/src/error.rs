use std::time::Duration;

use chain_btc::error::BtcError;
use thiserror::Error;

/// Failures reported by a [`BlockchainDataProvider`](crate::provider::BlockchainDataProvider).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Btc(#[from] BtcError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("network timeout after {0:?}")]
    NetworkTimeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_pass_through() {
        let err: AdapterError = BtcError::NoUtxosAvailable.into();
        assert_eq!(err.to_string(), "no UTXOs available");
        assert!(matches!(err, AdapterError::Btc(BtcError::NoUtxosAvailable)));
    }

    #[test]
    fn provider_errors_are_wrapped() {
        let err: AdapterError = ProviderError::NotFound("addr".into()).into();
        assert_eq!(err.to_string(), "provider error: not found: addr");
    }

    #[test]
    fn timeout_and_broadcast_are_distinct() {
        let timeout = AdapterError::NetworkTimeout(Duration::from_secs(30));
        assert_eq!(timeout.to_string(), "network timeout after 30s");
        let failed = AdapterError::BroadcastFailed("rejected: fee too low".into());
        assert!(failed.to_string().starts_with("broadcast failed"));
    }
}
