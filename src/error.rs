//! Error types for the firmware update client.
//!
//! One variant family per failure domain from the design (archive decoding,
//! transport, protocol, user interaction), each carrying enough context to
//! diagnose a bad archive or a failed transfer without re-running with extra
//! flags.

use thiserror::Error;

/// Errors that can occur while decrypting and parsing a firmware archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to read archive file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decrypt archive (bad key or corrupt padding): {0}")]
    Cipher(String),

    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("line {line}: unsupported Intel-HEX record type {record_type:#04x}")]
    UnsupportedRecord { line: usize, record_type: u8 },

    #[error("line {line}: {reason}")]
    Semantics { line: usize, reason: String },
}

/// Errors surfaced by a transport implementation (gateway or otherwise).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker connection error: {0}")]
    Broker(String),

    #[error("malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("gateway reported failure for {method}: {detail}")]
    RpcFailed { method: String, detail: String },
}

/// Errors from driving the upload protocol state machine.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("exceeded {0} consecutive timeouts with no final confirmation")]
    Timeout(u32),

    #[error("device reported a CRC error after sequence {seq}")]
    CrcError { seq: u16 },

    #[error("blob length {actual} does not match the expected firmware size {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Top-level error type returned by the crate's public operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("user declined the confirmation prompt")]
    UserDeclined,

    #[error("node reports manufacturer {manufacturer:#06x} product {product_id:#06x}, which this archive has no image for")]
    UnsupportedNode { manufacturer: u16, product_id: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_errors_format_with_line_context() {
        let err = ArchiveError::Syntax {
            line: 12,
            reason: "bad checksum".to_string(),
        };
        assert_eq!(err.to_string(), "line 12: bad checksum");

        let err = ArchiveError::UnsupportedRecord {
            line: 5,
            record_type: 3,
        };
        assert_eq!(
            err.to_string(),
            "line 5: unsupported Intel-HEX record type 0x03"
        );
    }

    #[test]
    fn protocol_errors_carry_their_numbers_into_the_message() {
        assert_eq!(
            ProtocolError::Timeout(5).to_string(),
            "exceeded 5 consecutive timeouts with no final confirmation"
        );
        assert_eq!(
            ProtocolError::CrcError { seq: 42 }.to_string(),
            "device reported a CRC error after sequence 42"
        );
        assert_eq!(
            ProtocolError::SizeMismatch {
                expected: 118784,
                actual: 1000
            }
            .to_string(),
            "blob length 1000 does not match the expected firmware size 118784"
        );
    }

    #[test]
    fn update_error_wraps_each_domain_transparently() {
        let archive_err: UpdateError = ArchiveError::Cipher("bad padding".to_string()).into();
        assert!(archive_err.to_string().contains("bad padding"));

        let transport_err: UpdateError = TransportError::Broker("disconnected".to_string()).into();
        assert!(transport_err.to_string().contains("disconnected"));

        let protocol_err: UpdateError = ProtocolError::Timeout(5).into();
        assert!(protocol_err.to_string().contains("5 consecutive timeouts"));

        assert_eq!(
            UpdateError::UserDeclined.to_string(),
            "user declined the confirmation prompt"
        );

        let unsupported = UpdateError::UnsupportedNode {
            manufacturer: 0x0005,
            product_id: 0x0953,
        };
        assert!(unsupported.to_string().contains("0x0953"));
    }
}
