use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Length of the Base58Check checksum suffix.
pub const CHECKSUM_LEN: usize = 4;

/// Decoded length of an address payload: version (1) + hash (20) + checksum (4).
pub const ADDRESS_LEN: usize = 25;

/// First 4 bytes of SHA-256(SHA-256(data)).
pub fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&second[..CHECKSUM_LEN]);
    out
}

/// Append the double-SHA-256 checksum to `payload` and Base58-encode it.
pub fn encode_check(payload: &[u8]) -> String {
    let mut buf = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum(payload));
    bs58::encode(buf).into_string()
}

/// Decode a Base58Check string and return the payload without its checksum.
pub fn decode_check(encoded: &str) -> Result<Vec<u8>, CodecError> {
    let mut decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| CodecError::InvalidEncoding(format!("invalid base58: {e}")))?;

    if decoded.len() <= CHECKSUM_LEN {
        return Err(CodecError::InvalidEncoding(format!(
            "decoded length {} is too short",
            decoded.len()
        )));
    }

    let split = decoded.len() - CHECKSUM_LEN;
    if decoded[split..] != checksum(&decoded[..split]) {
        return Err(CodecError::InvalidChecksum);
    }

    decoded.truncate(split);
    Ok(decoded)
}

/// Decode a Base58Check address into its version byte and 20-byte hash.
pub fn decode_address(encoded: &str) -> Result<(u8, [u8; 20]), CodecError> {
    let raw = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| CodecError::InvalidEncoding(format!("invalid base58: {e}")))?;

    if raw.len() != ADDRESS_LEN {
        return Err(CodecError::InvalidEncoding(format!(
            "expected {ADDRESS_LEN} bytes, got {}",
            raw.len()
        )));
    }

    let payload = decode_check(encoded)?;
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok((payload[0], hash))
}
