//! Text encodings used by Bitcoin addresses.
//!
//! [`base58`] implements Base58Check framing for legacy and P2SH addresses,
//! [`bech32`] implements the BIP-173 / BIP-350 checksum for SegWit addresses.
//! Both report failures as [`CodecError`](crate::error::CodecError), which is
//! kept separate from address-level validation errors.

pub mod base58;
pub mod bech32;
