//! Bitcoin transaction-construction engine.
//!
//! Provides Base58Check and Bech32 codecs, P2PKH / P2SH-P2WPKH / P2WPKH
//! address derivation and validation, UTXO coin selection with a fixed
//! size/fee model, and transaction building and signing. Everything here is
//! synchronous; network access lives in the adapter crate.

pub mod address;
pub mod codec;
pub mod error;
pub mod hd;
pub mod network;
pub mod transaction;
pub mod utxo;
