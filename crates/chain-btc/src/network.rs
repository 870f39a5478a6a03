use std::str::FromStr;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::error::BtcError;

/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl BtcNetwork {
    /// Convert to the `bitcoin` crate's `Network` type.
    pub fn to_bitcoin_network(self) -> Network {
        match self {
            BtcNetwork::Mainnet => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
            BtcNetwork::Regtest => Network::Regtest,
        }
    }

    /// Base58Check version byte for P2PKH addresses.
    pub fn p2pkh_prefix(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => 0x00,
            BtcNetwork::Testnet | BtcNetwork::Regtest => 0x6f,
        }
    }

    /// Base58Check version byte for P2SH addresses.
    pub fn p2sh_prefix(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => 0x05,
            BtcNetwork::Testnet | BtcNetwork::Regtest => 0xc4,
        }
    }

    /// Bech32 human-readable part.
    pub fn bech32_hrp(self) -> &'static str {
        match self {
            BtcNetwork::Mainnet => "bc",
            BtcNetwork::Testnet => "tb",
            BtcNetwork::Regtest => "bcrt",
        }
    }

    /// Leading characters a Base58 P2PKH address takes on this network.
    pub fn p2pkh_leading_chars(self) -> &'static [char] {
        match self {
            BtcNetwork::Mainnet => &['1'],
            BtcNetwork::Testnet | BtcNetwork::Regtest => &['m', 'n'],
        }
    }

    /// Leading characters a Base58 P2SH address takes on this network.
    pub fn p2sh_leading_chars(self) -> &'static [char] {
        match self {
            BtcNetwork::Mainnet => &['3'],
            BtcNetwork::Testnet | BtcNetwork::Regtest => &['2'],
        }
    }

    /// BIP-44 coin type used in default derivation paths.
    pub fn coin_type(self) -> u32 {
        match self {
            BtcNetwork::Mainnet => 0,
            BtcNetwork::Testnet | BtcNetwork::Regtest => 1,
        }
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
            BtcNetwork::Regtest => write!(f, "regtest"),
        }
    }
}

impl FromStr for BtcNetwork {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "bitcoin" | "main" => Ok(BtcNetwork::Mainnet),
            "testnet" | "test" => Ok(BtcNetwork::Testnet),
            "regtest" => Ok(BtcNetwork::Regtest),
            other => Err(BtcError::InvalidNetwork(other.to_string())),
        }
    }
}
