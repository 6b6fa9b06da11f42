//! Hex encoding/decoding helpers used by the CLI's `describe --write-ihex`
//! output and by tests that embed packet fixtures as hex literals.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("empty hex string")]
    EmptyString,

    #[error("hex decoding error: {0}")]
    DecodeError(String),
}

/// Encodes bytes to a lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decodes a hex string to bytes. Whitespace is stripped before decoding.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    if hex_str.is_empty() {
        return Err(HexError::EmptyString);
    }

    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let data = vec![0x01, 0x20, 0x2a, 0x00, 0x10];
        let encoded = encode_hex(&data);
        assert_eq!(decode_hex(&encoded).unwrap(), data);
    }

    #[test]
    fn decode_strips_whitespace() {
        let expected = vec![0x01, 0x20, 0x2a];
        assert_eq!(decode_hex("01 20 2a").unwrap(), expected);
        assert_eq!(decode_hex("01\n20\n2a").unwrap(), expected);
    }

    #[test]
    fn decode_rejects_odd_length_and_empty() {
        assert!(decode_hex("").is_err());
        assert!(decode_hex("1").is_err());
    }
}
