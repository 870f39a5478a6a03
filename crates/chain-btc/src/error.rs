use thiserror::Error;

/// Low-level text encoding failures from Base58Check and Bech32.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid checksum")]
    InvalidChecksum,
}

/// Bitcoin engine errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("no UTXOs available")]
    NoUtxosAvailable,

    #[error("insufficient funds: have {available} sat, need {required} sat")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("unsupported script type: {0}")]
    UnsupportedScriptType(String),

    #[error("transaction build failed: {0}")]
    TransactionBuildFailed(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_address() {
        let err = BtcError::InvalidAddress("bad checksum".into());
        assert_eq!(err.to_string(), "invalid address: bad checksum");
    }

    #[test]
    fn display_insufficient_funds() {
        let err = BtcError::InsufficientFunds {
            available: 1_000,
            required: 5_141,
        };
        assert_eq!(
            err.to_string(),
            "insufficient funds: have 1000 sat, need 5141 sat"
        );
    }

    #[test]
    fn codec_errors_convert_and_stay_distinct() {
        let err: BtcError = CodecError::InvalidChecksum.into();
        assert!(matches!(err, BtcError::Codec(CodecError::InvalidChecksum)));
        assert_eq!(err.to_string(), "codec error: invalid checksum");
    }

    #[test]
    fn display_no_utxos() {
        assert_eq!(BtcError::NoUtxosAvailable.to_string(), "no UTXOs available");
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn std::error::Error> =
            Box::new(BtcError::SigningFailed("input 0 has no signature".into()));
        assert!(err.to_string().contains("input 0"));
    }

    #[test]
    fn debug_format_works() {
        let err = BtcError::UnsupportedScriptType("p2tr".into());
        let debug = format!("{:?}", err);
        assert!(debug.contains("UnsupportedScriptType"));
    }
}
