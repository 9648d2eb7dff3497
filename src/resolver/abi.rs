// resolver/abi.rs - Minimal Solidity ABI Coding

//! Just enough of the Solidity ABI for the bootstrap registry contract:
//! a `string` argument, a `string[]` return value and an `address` return
//! value.

use thiserror::Error;

const WORD: usize = 32;

/// `getBootstrapAddresses()`
pub const GET_BOOTSTRAP_ADDRESSES: [u8; 4] = [0x81, 0x55, 0x31, 0x8d];

/// `addBootstrapAddress(string)`
pub const ADD_BOOTSTRAP_ADDRESS: [u8; 4] = [0xf7, 0xca, 0xc7, 0x39];

/// `owner()`
pub const OWNER: [u8; 4] = [0x8d, 0xa5, 0xcb, 0x5b];

/// `BootstrapAddressAdded(string indexed newAddress)` event topic
pub const BOOTSTRAP_ADDRESS_ADDED_TOPIC: &str =
    "0x51286f49522255d616119fa4dad7520608b9db8eeaae0e72e44f6a172f538be9";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Data truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("Value does not fit in usize at offset {offset}")]
    Overflow { offset: usize },

    #[error("String is not valid UTF-8")]
    InvalidUtf8,
}

/// Decode a `0x`-prefixed hex string
pub fn from_hex(data: &str) -> Result<Vec<u8>, AbiError> {
    hex::decode(data.trim_start_matches("0x")).map_err(|e| AbiError::InvalidHex(e.to_string()))
}

/// Encode bytes as `0x`-prefixed hex
pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn push_word(out: &mut Vec<u8>, value: usize) {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    out.extend_from_slice(&word);
}

/// Calldata for a function taking a single `string`
pub fn encode_string_call(selector: [u8; 4], value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;

    let mut out = Vec::with_capacity(4 + 2 * WORD + padded);
    out.extend_from_slice(&selector);
    push_word(&mut out, WORD);
    push_word(&mut out, bytes.len());
    out.extend_from_slice(bytes);
    out.resize(4 + 2 * WORD + padded, 0);
    out
}

fn read_word(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::Overflow { offset })?;
    data.get(offset..end).ok_or(AbiError::Truncated { offset })
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize, AbiError> {
    let word = read_word(data, offset)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow { offset });
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(tail)).map_err(|_| AbiError::Overflow { offset })
}

fn read_string(data: &[u8], offset: usize) -> Result<String, AbiError> {
    let len = read_usize(data, offset)?;
    let start = offset + WORD;
    let end = start.checked_add(len).ok_or(AbiError::Overflow { offset })?;
    let bytes = data.get(start..end).ok_or(AbiError::Truncated { offset: start })?;
    String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
}

/// Decode a single `string[]` return value
pub fn decode_string_array(data: &[u8]) -> Result<Vec<String>, AbiError> {
    let array_offset = read_usize(data, 0)?;
    let count = read_usize(data, array_offset)?;
    let base = array_offset + WORD;

    (0..count)
        .map(|i| {
            let relative = read_usize(data, base + i * WORD)?;
            let offset = base.checked_add(relative).ok_or(AbiError::Overflow { offset: base })?;
            read_string(data, offset)
        })
        .collect()
}

/// Decode a single `address` return value as `0x`-prefixed hex
pub fn decode_address(data: &[u8]) -> Result<String, AbiError> {
    let word = read_word(data, 0)?;
    Ok(to_hex(&word[WORD - 20..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(value: u64) -> Vec<u8> {
        let mut w = vec![0u8; 24];
        w.extend_from_slice(&value.to_be_bytes());
        w
    }

    fn padded(s: &str) -> Vec<u8> {
        let mut b = s.as_bytes().to_vec();
        b.resize(32, 0);
        b
    }

    #[test]
    fn test_decode_string_array() {
        let mut data = Vec::new();
        data.extend(word(0x20));
        data.extend(word(2));
        data.extend(word(0x40));
        data.extend(word(0x80));
        data.extend(word(5));
        data.extend(padded("/ip4/"));
        data.extend(word(2));
        data.extend(padded("bc"));

        assert_eq!(decode_string_array(&data).unwrap(), vec!["/ip4/", "bc"]);
    }

    #[test]
    fn test_decode_empty_array() {
        let mut data = Vec::new();
        data.extend(word(0x20));
        data.extend(word(0));
        assert!(decode_string_array(&data).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_array_rejected() {
        let mut data = Vec::new();
        data.extend(word(0x20));
        data.extend(word(1));
        data.extend(word(0x20));
        assert!(matches!(
            decode_string_array(&data),
            Err(AbiError::Truncated { .. })
        ));
    }

    #[test]
    fn test_encode_string_call() {
        let encoded = encode_string_call(ADD_BOOTSTRAP_ADDRESS, "abc");
        assert_eq!(&encoded[..4], &ADD_BOOTSTRAP_ADDRESS);
        assert_eq!(&encoded[4..36], word(0x20).as_slice());
        assert_eq!(&encoded[36..68], word(3).as_slice());
        assert_eq!(&encoded[68..], padded("abc").as_slice());
    }

    #[test]
    fn test_decode_address() {
        let mut data = vec![0u8; 12];
        data.extend_from_slice(&[0xab; 20]);
        assert_eq!(decode_address(&data).unwrap(), format!("0x{}", "ab".repeat(20)));
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(to_hex(&GET_BOOTSTRAP_ADDRESSES), "0x8155318d");
        assert_eq!(from_hex("0x8da5cb5b").unwrap(), OWNER.to_vec());
        assert!(matches!(from_hex("0xzz"), Err(AbiError::InvalidHex(_))));
    }
}
