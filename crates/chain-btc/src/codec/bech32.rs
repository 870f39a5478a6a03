use crate::error::CodecError;

/// The 32-symbol Bech32 alphabet; each symbol carries 5 bits.
pub const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const GENERATOR: [u32; 5] = [0x3b6a_57b2, 0x2650_8e6d, 0x1ea1_19fa, 0x3d42_33dd, 0x2a14_62b3];

const BECH32_CONST: u32 = 1;
const BECH32M_CONST: u32 = 0x2bc8_30a3;

const CHECKSUM_LEN: usize = 6;
const MAX_LEN: usize = 90;

/// Checksum flavour. Witness version 0 uses Bech32, later versions Bech32m.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Bech32,
    Bech32m,
}

impl Variant {
    fn constant(self) -> u32 {
        match self {
            Variant::Bech32 => BECH32_CONST,
            Variant::Bech32m => BECH32M_CONST,
        }
    }

    /// The variant a SegWit address with this witness version must use.
    pub fn for_witness_version(version: u8) -> Self {
        if version == 0 {
            Variant::Bech32
        } else {
            Variant::Bech32m
        }
    }
}

/// A decoded SegWit address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegwitAddress {
    /// Human-readable part, lowercased.
    pub hrp: String,
    pub witness_version: u8,
    pub program: Vec<u8>,
    /// Checksum variant that verified.
    pub variant: Variant,
}

/// BCH checksum over GF(32) symbols.
pub fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &value in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ u32::from(value);
        for (i, generator) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= generator;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(hrp.len() * 2 + 1);
    out.extend(hrp.iter().map(|c| c >> 5));
    out.push(0);
    out.extend(hrp.iter().map(|c| c & 0x1f));
    out
}

fn create_checksum(hrp: &[u8], data: &[u8], variant: Variant) -> [u8; CHECKSUM_LEN] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; CHECKSUM_LEN]);
    let residue = polymod(&values) ^ variant.constant();

    let mut out = [0u8; CHECKSUM_LEN];
    for (i, symbol) in out.iter_mut().enumerate() {
        *symbol = ((residue >> (5 * (5 - i))) & 0x1f) as u8;
    }
    out
}

fn verify_checksum(hrp: &[u8], data: &[u8]) -> Option<Variant> {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    match polymod(&values) {
        BECH32_CONST => Some(Variant::Bech32),
        BECH32M_CONST => Some(Variant::Bech32m),
        _ => None,
    }
}

/// Regroup a bit stream from `from`-bit to `to`-bit words.
///
/// With `pad` the final partial group is zero-filled; without it any leftover
/// bits must be zero and fewer than `from`.
pub fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, CodecError> {
    let max_value: u32 = (1 << to) - 1;
    let max_acc: u32 = (1 << (from + to - 1)) - 1;
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &byte in data {
        let value = u32::from(byte);
        if value >> from != 0 {
            return Err(CodecError::InvalidEncoding(format!(
                "value {value} does not fit in {from} bits"
            )));
        }
        acc = ((acc << from) | value) & max_acc;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max_value) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max_value) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max_value) != 0 {
        return Err(CodecError::InvalidEncoding("non-zero padding".into()));
    }

    Ok(out)
}

fn check_hrp(hrp: &str) -> Result<(), CodecError> {
    if hrp.is_empty() {
        return Err(CodecError::InvalidEncoding("empty human-readable part".into()));
    }
    if hrp.bytes().any(|c| !(33..=126).contains(&c)) {
        return Err(CodecError::InvalidEncoding(
            "human-readable part contains invalid characters".into(),
        ));
    }
    Ok(())
}

fn check_program(version: u8, program: &[u8]) -> Result<(), CodecError> {
    if version > 16 {
        return Err(CodecError::InvalidEncoding(format!(
            "witness version {version} out of range"
        )));
    }
    if !(2..=40).contains(&program.len()) {
        return Err(CodecError::InvalidEncoding(format!(
            "witness program length {} out of range",
            program.len()
        )));
    }
    if version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(CodecError::InvalidEncoding(format!(
            "version 0 program must be 20 or 32 bytes, got {}",
            program.len()
        )));
    }
    Ok(())
}

/// Encode a witness program as a SegWit address.
pub fn encode(hrp: &str, witness_version: u8, program: &[u8]) -> Result<String, CodecError> {
    check_hrp(hrp)?;
    check_program(witness_version, program)?;
    let hrp = hrp.to_ascii_lowercase();

    let mut data = Vec::with_capacity(1 + program.len() * 8 / 5 + 1);
    data.push(witness_version);
    data.extend(convert_bits(program, 8, 5, true)?);

    let checksum = create_checksum(
        hrp.as_bytes(),
        &data,
        Variant::for_witness_version(witness_version),
    );

    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + CHECKSUM_LEN);
    out.push_str(&hrp);
    out.push('1');
    for symbol in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[*symbol as usize] as char);
    }

    if out.len() > MAX_LEN {
        return Err(CodecError::InvalidEncoding(format!(
            "encoded length {} exceeds {MAX_LEN}",
            out.len()
        )));
    }
    Ok(out)
}

/// Decode a SegWit address.
pub fn decode(address: &str) -> Result<SegwitAddress, CodecError> {
    if !address.is_ascii() {
        return Err(CodecError::InvalidEncoding("non-ASCII character".into()));
    }
    if address.len() > MAX_LEN {
        return Err(CodecError::InvalidEncoding(format!(
            "length {} exceeds {MAX_LEN}",
            address.len()
        )));
    }
    let has_lower = address.bytes().any(|c| c.is_ascii_lowercase());
    let has_upper = address.bytes().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(CodecError::InvalidEncoding("mixed case".into()));
    }

    let lower = address.to_ascii_lowercase();
    let separator = lower
        .rfind('1')
        .ok_or_else(|| CodecError::InvalidEncoding("missing separator".into()))?;
    if separator == 0 {
        return Err(CodecError::InvalidEncoding("empty human-readable part".into()));
    }
    if separator + 1 + CHECKSUM_LEN > lower.len() {
        return Err(CodecError::InvalidEncoding("data part too short".into()));
    }

    let (hrp, rest) = lower.split_at(separator);
    check_hrp(hrp)?;

    let data = rest[1..]
        .bytes()
        .map(|c| {
            CHARSET
                .iter()
                .position(|&symbol| symbol == c)
                .map(|p| p as u8)
                .ok_or_else(|| CodecError::InvalidEncoding(format!("invalid character '{}'", c as char)))
        })
        .collect::<Result<Vec<u8>, CodecError>>()?;

    let variant = verify_checksum(hrp.as_bytes(), &data).ok_or(CodecError::InvalidChecksum)?;

    let payload = &data[..data.len() - CHECKSUM_LEN];
    let (&witness_version, program_5bit) = payload
        .split_first()
        .ok_or_else(|| CodecError::InvalidEncoding("missing witness version".into()))?;
    let program = convert_bits(program_5bit, 5, 8, false)?;
    check_program(witness_version, &program)?;

    Ok(SegwitAddress {
        hrp: hrp.to_string(),
        witness_version,
        program,
        variant,
    })
}
