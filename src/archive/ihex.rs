//! Writes a firmware blob back out as an Intel-HEX text file, the inverse
//! of the data records [`super::hex_record`] parses. Used only by the
//! `describe --write-ihex` CLI command; the upload path never needs this.

use crate::util::hex::encode_hex;

const RECORD_BYTES: usize = 16;

/// Renders `blob` as Intel-HEX: a data record (type 00) per 16-byte chunk,
/// an extended segment address record (type 02) whenever the chunk crosses
/// a 64 KiB boundary, and a trailing EOF record (type 01).
pub fn to_intel_hex(blob: &[u8]) -> String {
    let mut lines = Vec::new();
    let mut current_segment: Option<u16> = None;

    for (chunk_index, chunk) in blob.chunks(RECORD_BYTES).enumerate() {
        let address = chunk_index * RECORD_BYTES;
        let segment = (address >> 16) as u16;
        let offset = (address & 0xFFFF) as u16;

        if current_segment != Some(segment) {
            let esa = segment.wrapping_mul(0x1000);
            lines.push(record_line(2, 0, 2, &esa.to_be_bytes()));
            current_segment = Some(segment);
        }

        lines.push(record_line(chunk.len() as u8, offset, 0, chunk));
    }

    lines.push(record_line(0, 0, 1, &[]));
    lines.push(String::new());
    lines.join("\n")
}

fn record_line(length: u8, offset: u16, record_type: u8, data: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(4 + data.len() + 1);
    bytes.push(length);
    bytes.extend_from_slice(&offset.to_be_bytes());
    bytes.push(record_type);
    bytes.extend_from_slice(data);
    let sum: u32 = bytes.iter().map(|&b| b as u32).sum();
    let checksum = (0x100 - (sum & 0xFF)) as u8;
    bytes.push(checksum);
    format!(":{}", encode_hex(&bytes))
}
