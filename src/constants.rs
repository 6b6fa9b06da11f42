//! Protocol constants for the PE0653/PE0953 firmware update client.
//!
//! These are process-wide, read-only values taken from the vendor's archive
//! format and the Manufacturer-Proprietary transfer protocol; none require
//! runtime initialization (see DESIGN.md, "Global constants").

/// AES-128 key used to decrypt `.iboot` archives. Also used as the IV
/// (legacy vendor compatibility constraint, not a security property).
pub const ARCHIVE_AES_KEY: &[u8; 16] = b"gbUst8Ce8Cp4bkPw";

/// Size of a valid firmware blob for the receiver model (116 KiB).
pub const KNOWN_FIRMWARE_SIZE: usize = 116 * 1024;

/// Maximum capacity of a product's blob buffer while being assembled (128 KiB).
pub const MAX_BLOB_LENGTH: usize = 128 * 1024;

/// Consecutive timeouts the upload engine tolerates before giving up.
pub const MAX_TIMEOUTS: u32 = 5;

/// Command byte identifying the firmware transfer protocol on the
/// Manufacturer-Proprietary Command Class.
pub const COMMAND_FIRMWARE_TRANSFER: u8 = 42;

/// Packet type tags carried in byte 1 of every transfer packet.
pub mod packet_type {
    pub const START: u8 = 0;
    pub const DATA: u8 = 2;
    pub const DATA_REQUEST: u8 = 3;
    pub const DONE: u8 = 6;
    pub const CRC_ERROR: u8 = 7;
}

/// Number of payload bytes carried by one DATA packet.
pub const DATA_WINDOW: usize = 32;

/// Vendor manufacturer id for the Manufacturer-Proprietary Command Class.
pub const MANUFACTURER_ID: u16 = 0x0005;

/// Product type shared by both controllers in this family.
pub const PRODUCT_TYPE: u16 = 0x5045;

/// Product ids mapped to archive product codes.
pub const PRODUCT_ID_RECEIVER: u16 = 0x0653;
pub const PRODUCT_ID_HANDHELD: u16 = 0x0953;

pub const PRODUCT_CODE_RECEIVER: &str = "PE0653";
pub const PRODUCT_CODE_HANDHELD: &str = "PE0953";

/// Maps a Z-Wave product id (as reported by the gateway's node info) to the
/// archive product code it corresponds to, or `None` if unrecognized.
pub fn product_code_for_id(product_id: u16) -> Option<&'static str> {
    match product_id {
        PRODUCT_ID_RECEIVER => Some(PRODUCT_CODE_RECEIVER),
        PRODUCT_ID_HANDHELD => Some(PRODUCT_CODE_HANDHELD),
        _ => None,
    }
}
