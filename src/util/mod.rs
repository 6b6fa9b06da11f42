//! Common utility functions used throughout the crate: bit manipulation
//! (needed for the bit-reversed firmware CRC-32) and hex encoding/decoding
//! (used by the CLI's `.ihex` writer and by tests).

pub mod bitrev;
pub mod hex;

pub use bitrev::{rev32, rev8};
pub use hex::{decode_hex, encode_hex};
