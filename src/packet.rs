//! Packet framing for the Manufacturer-Proprietary firmware transfer
//! protocol: building outbound packets and reading the fields of an
//! inbound reply.

use crate::constants::{packet_type, COMMAND_FIRMWARE_TRANSFER, DATA_WINDOW};
use crate::crc::crc16;

/// Builds a bare `[CMD, START]` packet.
pub fn start_packet() -> Vec<u8> {
    vec![COMMAND_FIRMWARE_TRANSFER, packet_type::START]
}

/// Builds a `[CMD, DONE, seq_lo, seq_hi]` packet.
pub fn done_packet(seq: u16) -> Vec<u8> {
    let [lo, hi] = seq.to_le_bytes();
    vec![COMMAND_FIRMWARE_TRANSFER, packet_type::DONE, lo, hi]
}

/// Builds a `[CMD, DATA_REQUEST, seq_lo, seq_hi]` packet, used by the fake
/// transport to ask the engine for the next window.
pub fn data_request_packet(seq: u16) -> Vec<u8> {
    let [lo, hi] = seq.to_le_bytes();
    vec![COMMAND_FIRMWARE_TRANSFER, packet_type::DATA_REQUEST, lo, hi]
}

/// Builds a `[CMD, CRC_ERROR, seq_lo, seq_hi]` packet.
pub fn crc_error_packet(seq: u16) -> Vec<u8> {
    let [lo, hi] = seq.to_le_bytes();
    vec![COMMAND_FIRMWARE_TRANSFER, packet_type::CRC_ERROR, lo, hi]
}

/// Builds a `[CMD, DATA, seq_lo, seq_hi, payload…, crc_lo, crc_hi]` packet
/// carrying up to [`DATA_WINDOW`] bytes from `blob` starting at `offset`.
///
/// `payload.len()` is `min(DATA_WINDOW, blob.len() - offset)`, which is
/// always in `[1, DATA_WINDOW]` as long as `offset < blob.len()`.
pub fn data_packet(seq: u16, blob: &[u8], offset: usize) -> Vec<u8> {
    let end = (offset + DATA_WINDOW).min(blob.len());
    let payload = &blob[offset..end];

    let [lo, hi] = seq.to_le_bytes();
    let mut packet = Vec::with_capacity(4 + payload.len() + 2);
    packet.push(COMMAND_FIRMWARE_TRANSFER);
    packet.push(packet_type::DATA);
    packet.push(lo);
    packet.push(hi);
    packet.extend_from_slice(payload);

    let crc = crc16(&packet);
    packet.extend_from_slice(&crc.to_le_bytes());
    packet
}

/// Reads the little-endian sequence number out of bytes 2..4 of a packet,
/// if present.
pub fn sequence_of(packet: &[u8]) -> Option<u16> {
    if packet.len() < 4 {
        return None;
    }
    Some(u16::from_le_bytes([packet[2], packet[3]]))
}

/// Verifies the trailing CRC-16 of a DATA packet, which covers every byte
/// preceding the two CRC bytes.
pub fn verify_data_crc(packet: &[u8]) -> bool {
    if packet.len() < 6 {
        return false;
    }
    let body = &packet[..packet.len() - 2];
    let expected = crc16(body);
    let actual = u16::from_le_bytes([packet[packet.len() - 2], packet[packet.len() - 1]]);
    expected == actual
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_packet_is_two_bytes() {
        assert_eq!(start_packet(), vec![COMMAND_FIRMWARE_TRANSFER, packet_type::START]);
    }

    #[test]
    fn data_packet_trailer_matches_crc16_of_prefix() {
        let blob: Vec<u8> = (0u8..200).collect();
        let packet = data_packet(5, &blob, 32);
        assert!(verify_data_crc(&packet));
        assert_eq!(sequence_of(&packet), Some(5));
        let payload_len = packet.len() - 6;
        assert!((1..=DATA_WINDOW).contains(&payload_len));
    }

    #[test]
    fn data_packet_final_window_is_short() {
        let blob: Vec<u8> = (0u8..40).collect();
        let packet = data_packet(1, &blob, 32);
        assert_eq!(packet.len() - 6, 8);
        assert!(verify_data_crc(&packet));
    }

    #[test]
    fn verify_data_crc_detects_corruption() {
        let blob: Vec<u8> = (0u8..40).collect();
        let mut packet = data_packet(0, &blob, 0);
        let last = packet.len() - 1;
        packet[last] ^= 0xFF;
        assert!(!verify_data_crc(&packet));
    }
}
