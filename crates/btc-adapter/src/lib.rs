//! Async orchestration over the `chain-btc` engine.
//!
//! [`ChainAdapter`] validates, selects, builds, signs and broadcasts using an
//! injected [`BlockchainDataProvider`] for all chain data. Every provider call
//! takes a [`CancellationToken`].

pub mod adapter;
pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;

pub use adapter::{BuildRequest, ChainAdapter, FeeSuggestions};
pub use cancel::CancellationToken;
pub use config::AdapterConfig;
pub use error::{AdapterError, ProviderError};
pub use provider::{Balance, BlockchainDataProvider, TransactionDetails};
