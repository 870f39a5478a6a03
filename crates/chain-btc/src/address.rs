use bitcoin::secp256k1::PublicKey;
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::{base58, bech32};
use crate::error::BtcError;
use crate::network::BtcNetwork;

const OP_0: u8 = 0x00;
const OP_1: u8 = 0x51;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const PUSH_20: u8 = 0x14;

/// Fixed per-transaction overhead used by the size model (bytes).
pub const BASE_TX_SIZE: u64 = 10;

/// Estimated size of one output (bytes). Every output is priced as P2WPKH.
pub const OUTPUT_SIZE: u64 = 31;

/// Script family of an address we can derive, spend from, and price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    /// Legacy pay-to-pubkey-hash (`1...`).
    P2pkh,
    /// Native SegWit v0 pay-to-witness-pubkey-hash (`bc1q...`).
    P2wpkh,
    /// P2WPKH wrapped in P2SH (`3...`).
    P2shP2wpkh,
}

impl AddressType {
    /// Estimated size of one input spending this script type (bytes).
    pub fn input_size(self) -> u64 {
        match self {
            AddressType::P2pkh => 148,
            AddressType::P2wpkh => 68,
            AddressType::P2shP2wpkh => 91,
        }
    }

    /// BIP-43 purpose used in default derivation paths.
    pub fn purpose(self) -> u32 {
        match self {
            AddressType::P2pkh => 44,
            AddressType::P2shP2wpkh => 49,
            AddressType::P2wpkh => 84,
        }
    }
}

impl std::fmt::Display for AddressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressType::P2pkh => write!(f, "p2pkh"),
            AddressType::P2wpkh => write!(f, "p2wpkh"),
            AddressType::P2shP2wpkh => write!(f, "p2sh-p2wpkh"),
        }
    }
}

/// Estimated transaction size: `10 + inputs × input_size(type) + outputs × 31`.
///
/// These are fixed estimation constants, not measured from a serialized
/// transaction. Saturates at `u64::MAX`.
pub fn estimate_transaction_size(
    num_inputs: usize,
    num_outputs: usize,
    address_type: AddressType,
) -> u64 {
    BASE_TX_SIZE
        .saturating_add((num_inputs as u64).saturating_mul(address_type.input_size()))
        .saturating_add((num_outputs as u64).saturating_mul(OUTPUT_SIZE))
}

/// Fee for the estimated size at `fee_rate` sat/byte.
///
/// Fails with `TransactionBuildFailed` if the fee does not fit in a `u64`.
pub fn estimate_fee(
    num_inputs: usize,
    num_outputs: usize,
    address_type: AddressType,
    fee_rate: u64,
) -> Result<u64, BtcError> {
    let size = estimate_transaction_size(num_inputs, num_outputs, address_type);
    size.checked_mul(fee_rate).ok_or_else(|| {
        BtcError::TransactionBuildFailed(format!(
            "fee for {size} bytes at {fee_rate} sat/byte overflows"
        ))
    })
}

/// RIPEMD-160(SHA-256(data)).
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, PUSH_20]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// `OP_0 <20>`
pub fn p2wpkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    witness_script(0, pubkey_hash)
}

/// `OP_HASH160 <20> OP_EQUAL`
pub fn p2sh_script(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, PUSH_20]);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script
}

/// `OP_n <program>` for witness version `n`.
pub fn witness_script(version: u8, program: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + program.len());
    script.push(if version == 0 { OP_0 } else { OP_1 + version - 1 });
    script.push(program.len() as u8);
    script.extend_from_slice(program);
    script
}

/// The P2SH-P2WPKH redeem script for a compressed public key.
pub fn p2sh_p2wpkh_redeem_script(pubkey: &[u8; 33]) -> Vec<u8> {
    p2wpkh_script(&hash160(pubkey))
}

/// What an address commits to once decoded and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressPayload {
    PubkeyHash([u8; 20]),
    ScriptHash([u8; 20]),
    WitnessProgram { version: u8, program: Vec<u8> },
}

/// Derives, validates, and classifies addresses for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressGenerator {
    network: BtcNetwork,
}

impl AddressGenerator {
    pub fn new(network: BtcNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    /// Derive an address of `address_type` from a 33-byte compressed public key.
    pub fn generate(
        &self,
        pubkey_bytes: &[u8; 33],
        address_type: AddressType,
    ) -> Result<String, BtcError> {
        PublicKey::from_slice(pubkey_bytes).map_err(|e| {
            BtcError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
        })?;

        let pubkey_hash = hash160(pubkey_bytes);
        let address = match address_type {
            AddressType::P2pkh => {
                let mut payload = Vec::with_capacity(21);
                payload.push(self.network.p2pkh_prefix());
                payload.extend_from_slice(&pubkey_hash);
                base58::encode_check(&payload)
            }
            AddressType::P2wpkh => bech32::encode(self.network.bech32_hrp(), 0, &pubkey_hash)?,
            AddressType::P2shP2wpkh => {
                let redeem_script = p2wpkh_script(&pubkey_hash);
                let mut payload = Vec::with_capacity(21);
                payload.push(self.network.p2sh_prefix());
                payload.extend_from_slice(&hash160(&redeem_script));
                base58::encode_check(&payload)
            }
        };

        Ok(address)
    }

    /// Decode and fully check an address against this network.
    pub fn check(&self, address: &str) -> Result<AddressPayload, BtcError> {
        let hrp = self.network.bech32_hrp();
        let looks_bech32 = address
            .to_ascii_lowercase()
            .starts_with(&format!("{hrp}1"));

        if looks_bech32 {
            let decoded = bech32::decode(address)?;
            if decoded.hrp != hrp {
                return Err(BtcError::InvalidAddress(format!(
                    "human-readable part '{}' is not valid for {}",
                    decoded.hrp, self.network
                )));
            }
            if decoded.witness_version > 1 {
                return Err(BtcError::InvalidAddress(format!(
                    "unsupported witness version {}",
                    decoded.witness_version
                )));
            }
            if decoded.variant != bech32::Variant::for_witness_version(decoded.witness_version) {
                return Err(BtcError::InvalidAddress(
                    "checksum variant does not match witness version".into(),
                ));
            }
            if decoded.witness_version == 1 && decoded.program.len() != 32 {
                return Err(BtcError::InvalidAddress(format!(
                    "version 1 program must be 32 bytes, got {}",
                    decoded.program.len()
                )));
            }
            return Ok(AddressPayload::WitnessProgram {
                version: decoded.witness_version,
                program: decoded.program,
            });
        }

        let (version, hash) = base58::decode_address(address)?;
        if version == self.network.p2pkh_prefix() {
            Ok(AddressPayload::PubkeyHash(hash))
        } else if version == self.network.p2sh_prefix() {
            Ok(AddressPayload::ScriptHash(hash))
        } else {
            Err(BtcError::InvalidAddress(format!(
                "version byte 0x{version:02x} is not valid for {}",
                self.network
            )))
        }
    }

    /// Whether `address` is a well-formed address for this network.
    pub fn validate(&self, address: &str) -> bool {
        self.check(address).is_ok()
    }

    /// Classify an address by its prefix alone, without decoding it.
    ///
    /// P2SH addresses are reported as P2SH-P2WPKH, the only P2SH form this
    /// engine produces.
    pub fn address_type(&self, address: &str) -> Option<AddressType> {
        let hrp = self.network.bech32_hrp();
        let lower = address.to_ascii_lowercase();
        if lower.starts_with(&format!("{hrp}1q")) {
            // hrp + '1' + version + 32 program symbols + 6 checksum symbols
            return (lower.len() == hrp.len() + 40).then_some(AddressType::P2wpkh);
        }

        let first = address.chars().next()?;
        if self.network.p2pkh_leading_chars().contains(&first) {
            Some(AddressType::P2pkh)
        } else if self.network.p2sh_leading_chars().contains(&first) {
            Some(AddressType::P2shP2wpkh)
        } else {
            None
        }
    }

    /// Reconstruct the locking script for an address.
    pub fn script_pubkey(&self, address: &str) -> Result<Vec<u8>, BtcError> {
        let payload = self
            .check(address)
            .map_err(|e| BtcError::InvalidAddress(format!("{address}: {e}")))?;

        Ok(match payload {
            AddressPayload::PubkeyHash(hash) => p2pkh_script(&hash),
            AddressPayload::ScriptHash(hash) => p2sh_script(&hash),
            AddressPayload::WitnessProgram { version, program } => {
                witness_script(version, &program)
            }
        })
    }
}
