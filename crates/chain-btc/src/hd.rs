use bip32::{ChildNumber, DerivationPath, Prefix, XPrv, XPub};
use zeroize::Zeroize;

use crate::address::{AddressGenerator, AddressType};
use crate::error::BtcError;
use crate::network::BtcNetwork;

/// BIP-44/49/84 path: m/purpose'/coin_type'/account'/change/address_index
///
/// - P2PKH:       m/44'/coin'/account'/change/index
/// - P2SH-P2WPKH: m/49'/coin'/account'/change/index
/// - P2WPKH:      m/84'/coin'/account'/change/index
pub fn default_path(
    address_type: AddressType,
    network: BtcNetwork,
    account: u32,
    change: u32,
    index: u32,
) -> String {
    format!(
        "m/{}'/{}'/{}'/{}/{}",
        address_type.purpose(),
        network.coin_type(),
        account,
        change,
        index
    )
}

/// Account-level path (m/purpose'/coin_type'/account') whose xpub feeds
/// watch-only derivation.
pub fn account_path(address_type: AddressType, network: BtcNetwork, account: u32) -> String {
    format!(
        "m/{}'/{}'/{}'",
        address_type.purpose(),
        network.coin_type(),
        account
    )
}

/// Derived secp256k1 key.
pub struct DerivedKey {
    pub private_key: [u8; 32],
    pub public_key: [u8; 33],
    pub derivation_path: String,
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("private_key", &"<redacted>")
            .field("public_key", &hex::encode(self.public_key))
            .field("derivation_path", &self.derivation_path)
            .finish()
    }
}

/// Address produced by HD derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: String,
    pub address_type: AddressType,
    pub public_key: [u8; 33],
    pub derivation_path: String,
}

fn parse_path(path: &str) -> Result<DerivationPath, BtcError> {
    path.parse()
        .map_err(|e: bip32::Error| BtcError::DerivationFailed(format!("invalid path {path}: {e}")))
}

/// Derive a secp256k1 key at `path` from a BIP-32 seed.
pub fn derive_key(seed: &[u8], path: &str) -> Result<DerivedKey, BtcError> {
    let parsed = parse_path(path)?;
    let xprv = XPrv::derive_from_path(seed, &parsed)
        .map_err(|e| BtcError::DerivationFailed(e.to_string()))?;

    Ok(DerivedKey {
        private_key: xprv.to_bytes().into(),
        public_key: xprv.public_key().to_bytes(),
        derivation_path: path.to_string(),
    })
}

/// Derive the key at `path` and return its address.
pub fn derive_address(
    generator: &AddressGenerator,
    seed: &[u8],
    path: &str,
    address_type: AddressType,
) -> Result<DerivedAddress, BtcError> {
    let key = derive_key(seed, path)?;
    let address = generator.generate(&key.public_key, address_type)?;

    Ok(DerivedAddress {
        address,
        address_type,
        public_key: key.public_key,
        derivation_path: key.derivation_path.clone(),
    })
}

/// Serialize the extended public key at an account-level `path`.
pub fn account_xpub(seed: &[u8], path: &str) -> Result<String, BtcError> {
    let parsed = parse_path(path)?;
    let xprv = XPrv::derive_from_path(seed, &parsed)
        .map_err(|e| BtcError::DerivationFailed(e.to_string()))?;
    Ok(xprv.public_key().to_string(Prefix::XPUB))
}

/// Watch-only derivation of `count` sequential addresses at
/// `{change}/{start..start + count}` below an account xpub.
///
/// Only public derivation is performed; no private key is involved.
pub fn derive_addresses_from_xpub(
    generator: &AddressGenerator,
    xpub: &str,
    change: u32,
    start: u32,
    count: u32,
    address_type: AddressType,
) -> Result<Vec<DerivedAddress>, BtcError> {
    if change > 1 {
        return Err(BtcError::DerivationFailed(format!(
            "change index must be 0 or 1, got {change}"
        )));
    }
    let end = start
        .checked_add(count)
        .ok_or_else(|| BtcError::DerivationFailed("address index overflow".into()))?;

    let account: XPub = xpub
        .parse()
        .map_err(|e: bip32::Error| BtcError::DerivationFailed(format!("invalid xpub: {e}")))?;
    let branch = account
        .derive_child(child_number(change)?)
        .map_err(|e| BtcError::DerivationFailed(e.to_string()))?;

    (start..end)
        .map(|index| {
            let child = branch
                .derive_child(child_number(index)?)
                .map_err(|e| BtcError::DerivationFailed(e.to_string()))?;
            let public_key = child.to_bytes();
            Ok(DerivedAddress {
                address: generator.generate(&public_key, address_type)?,
                address_type,
                public_key,
                derivation_path: format!("{change}/{index}"),
            })
        })
        .collect()
}

fn child_number(index: u32) -> Result<ChildNumber, BtcError> {
    ChildNumber::new(index, false).map_err(|e| BtcError::DerivationFailed(e.to_string()))
}
