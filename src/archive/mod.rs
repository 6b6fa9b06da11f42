//! Archive decoding: decrypts a `.iboot` container and assembles the
//! per-product firmware blobs described by its interleaved header and
//! Intel-HEX records.

pub mod cipher;
pub mod hex_record;
pub mod ihex;

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::constants::MAX_BLOB_LENGTH;
use crate::error::ArchiveError;
use hex_record::{parse_line, record_type, HexRecord};

/// A single product's header metadata, and its firmware blob once the
/// decoder has reached that product's EOF record.
///
/// Modeled as a tagged enum rather than an all-fields-optional struct so
/// that reading `blob`/`blob_hash` off a product that hasn't finished
/// assembling is a compile error, not a runtime null check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductRecord {
    MetadataOnly {
        name: String,
        version: String,
        message: String,
    },
    Loaded {
        name: String,
        version: String,
        message: String,
        blob: Vec<u8>,
        blob_hash: String,
    },
}

impl ProductRecord {
    pub fn name(&self) -> &str {
        match self {
            ProductRecord::MetadataOnly { name, .. } | ProductRecord::Loaded { name, .. } => name,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            ProductRecord::MetadataOnly { version, .. } | ProductRecord::Loaded { version, .. } => {
                version
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ProductRecord::MetadataOnly { message, .. } | ProductRecord::Loaded { message, .. } => {
                message
            }
        }
    }

    pub fn blob(&self) -> Option<&[u8]> {
        match self {
            ProductRecord::MetadataOnly { .. } => None,
            ProductRecord::Loaded { blob, .. } => Some(blob),
        }
    }

    pub fn blob_length(&self) -> Option<usize> {
        self.blob().map(|b| b.len())
    }

    pub fn blob_hash(&self) -> Option<&str> {
        match self {
            ProductRecord::MetadataOnly { .. } => None,
            ProductRecord::Loaded { blob_hash, .. } => Some(blob_hash),
        }
    }
}

/// The fully decoded archive: an opaque format-version string and a map
/// from product code (e.g. `"PE0653"`) to that product's record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareArchive {
    pub format_version: String,
    pub products: HashMap<String, ProductRecord>,
}

/// A blob under construction for the product currently being assembled.
/// Capacity is fixed at [`MAX_BLOB_LENGTH`] and starts fully erased (0xFF),
/// matching unprogrammed flash.
struct BlobBuffer {
    data: Vec<u8>,
    extended_segment_address: u16,
    max_address: usize,
}

impl BlobBuffer {
    fn new() -> Self {
        BlobBuffer {
            data: vec![0xFF; MAX_BLOB_LENGTH],
            extended_segment_address: 0,
            max_address: 0,
        }
    }
}

/// Decrypts and decodes a `.iboot` archive into its per-product blobs.
pub fn decode_archive(ciphertext: &[u8]) -> Result<FirmwareArchive, ArchiveError> {
    let plaintext = cipher::decrypt_archive(ciphertext)?;
    decode_plaintext(&plaintext)
}

/// Decodes an already-decrypted archive. Split out from [`decode_archive`]
/// so tests can exercise the parser without going through AES.
pub fn decode_plaintext(plaintext: &[u8]) -> Result<FirmwareArchive, ArchiveError> {
    let text = String::from_utf8_lossy(plaintext);

    let mut archive = FirmwareArchive {
        format_version: "unknown".to_string(),
        products: HashMap::new(),
    };
    let mut current_product: Option<String> = None;
    let mut active_blob: Option<BlobBuffer> = None;

    for (idx, raw_line) in text.split('\n').enumerate() {
        let line_no = idx + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        if line.is_empty() {
            continue;
        }

        if line.starts_with(':') {
            let record = parse_line(line, line_no)?;
            let product_id = current_product.as_ref().ok_or_else(|| ArchiveError::Semantics {
                line: line_no,
                reason: "data record with no active product header".to_string(),
            })?;
            handle_record(&mut archive, product_id, &mut active_blob, &record, line_no)?;
        } else {
            handle_header_line(&mut archive, &mut current_product, &active_blob, line, line_no)?;
        }
    }

    Ok(archive)
}

fn handle_header_line(
    archive: &mut FirmwareArchive,
    current_product: &mut Option<String>,
    active_blob: &Option<BlobBuffer>,
    line: &str,
    line_no: usize,
) -> Result<(), ArchiveError> {
    if active_blob.is_some() {
        return Err(ArchiveError::Semantics {
            line: line_no,
            reason: "header line encountered while a blob is still being assembled".to_string(),
        });
    }

    let fields: Vec<&str> = line.split('=').collect();
    if fields.len() == 4 {
        let id = fields[0].to_string();
        archive.products.insert(
            id.clone(),
            ProductRecord::MetadataOnly {
                name: fields[1].to_string(),
                version: fields[2].to_string(),
                message: fields[3].to_string(),
            },
        );
        *current_product = Some(id);
    } else if archive.format_version == "unknown" {
        archive.format_version = line.to_string();
    }
    Ok(())
}

fn handle_record(
    archive: &mut FirmwareArchive,
    product_id: &str,
    active_blob: &mut Option<BlobBuffer>,
    record: &HexRecord,
    line_no: usize,
) -> Result<(), ArchiveError> {
    match record.record_type {
        record_type::DATA => {
            if record.data_length != 16 {
                return Err(ArchiveError::Semantics {
                    line: line_no,
                    reason: format!(
                        "data record length must be 16, got {}",
                        record.data_length
                    ),
                });
            }
            let blob = active_blob.get_or_insert_with(BlobBuffer::new);
            let address =
                ((blob.extended_segment_address as usize) << 4) + record.offset as usize;
            let end = address + record.data_length as usize;
            if end > MAX_BLOB_LENGTH {
                return Err(ArchiveError::Semantics {
                    line: line_no,
                    reason: format!("data record address {address} exceeds blob capacity"),
                });
            }
            blob.data[address..end].copy_from_slice(&record.data);
            blob.max_address = blob.max_address.max(end);
            Ok(())
        }
        record_type::EXTENDED_SEGMENT_ADDRESS => {
            if record.data_length != 2 || record.offset != 0 {
                return Err(ArchiveError::Semantics {
                    line: line_no,
                    reason: "extended segment address record must have length 2 and offset 0"
                        .to_string(),
                });
            }
            let blob = active_blob.get_or_insert_with(BlobBuffer::new);
            blob.extended_segment_address = u16::from_be_bytes([record.data[0], record.data[1]]);
            Ok(())
        }
        record_type::EOF => {
            if record.data_length != 0 || record.offset != 0 {
                return Err(ArchiveError::Semantics {
                    line: line_no,
                    reason: "EOF record must have length 0 and offset 0".to_string(),
                });
            }
            let blob = active_blob.take().ok_or_else(|| ArchiveError::Semantics {
                line: line_no,
                reason: "EOF record with no data records preceding it".to_string(),
            })?;

            let entry = archive
                .products
                .get_mut(product_id)
                .expect("current product always has a metadata entry");

            if matches!(entry, ProductRecord::Loaded { .. }) {
                return Err(ArchiveError::Semantics {
                    line: line_no,
                    reason: format!("product {product_id} already has a blob"),
                });
            }

            let finished = blob.data[..blob.max_address].to_vec();
            let blob_hash = encode_sha256_hex(&finished);

            *entry = ProductRecord::Loaded {
                name: entry.name().to_string(),
                version: entry.version().to_string(),
                message: entry.message().to_string(),
                blob: finished,
                blob_hash,
            };
            Ok(())
        }
        other => Err(ArchiveError::UnsupportedRecord {
            line: line_no,
            record_type: other,
        }),
    }
}

fn encode_sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    crate::util::hex::encode_hex(&digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksummed_line(length: u8, offset: u16, record_type: u8, data: &[u8]) -> String {
        let mut bytes = vec![length];
        bytes.extend_from_slice(&offset.to_be_bytes());
        bytes.push(record_type);
        bytes.extend_from_slice(data);
        let sum: u32 = bytes.iter().map(|&b| b as u32).sum();
        let checksum = (256 - (sum & 0xFF)) as u8 & 0xFF;
        bytes.push(checksum);
        format!(":{}", crate::util::hex::encode_hex(&bytes))
    }

    #[test]
    fn decodes_two_products_with_hashes() {
        let mut lines = vec!["FORMAT-1.2".to_string()];
        lines.push("PE0653=Receiver=1.0=hello".to_string());
        lines.push(checksummed_line(16, 0, record_type::DATA, &[0xAA; 16]));
        lines.push(checksummed_line(0, 0, record_type::EOF, &[]));
        lines.push("PE0953=Handheld=2.0=world".to_string());
        lines.push(checksummed_line(16, 0, record_type::DATA, &[0xBB; 16]));
        lines.push(checksummed_line(0, 0, record_type::EOF, &[]));
        let plaintext = lines.join("\n");

        let archive = decode_plaintext(plaintext.as_bytes()).unwrap();
        assert_eq!(archive.format_version, "FORMAT-1.2");

        let receiver = &archive.products["PE0653"];
        assert_eq!(receiver.blob().unwrap(), &[0xAA; 16][..]);
        assert_eq!(receiver.blob_hash().unwrap().len(), 64);

        let handheld = &archive.products["PE0953"];
        assert_eq!(handheld.blob().unwrap(), &[0xBB; 16][..]);
    }

    #[test]
    fn unwritten_bytes_stay_erased() {
        let mut lines = vec!["PE0653=Receiver=1.0=hello".to_string()];
        lines.push(checksummed_line(16, 0x10, record_type::DATA, &[0x42; 16]));
        lines.push(checksummed_line(0, 0, record_type::EOF, &[]));
        let plaintext = lines.join("\n");

        let archive = decode_plaintext(plaintext.as_bytes()).unwrap();
        let blob = archive.products["PE0653"].blob().unwrap();
        assert_eq!(blob.len(), 0x10 + 16);
        assert!(blob[0..0x10].iter().all(|&b| b == 0xFF));
        assert!(blob[0x10..].iter().all(|&b| b == 0x42));
    }

    #[test]
    fn extended_segment_address_shifts_offset() {
        let mut lines = vec!["PE0653=Receiver=1.0=hello".to_string()];
        lines.push(checksummed_line(
            2,
            0,
            record_type::EXTENDED_SEGMENT_ADDRESS,
            &[0x00, 0x01],
        ));
        lines.push(checksummed_line(16, 0, record_type::DATA, &[0x99; 16]));
        lines.push(checksummed_line(0, 0, record_type::EOF, &[]));
        let plaintext = lines.join("\n");

        let archive = decode_plaintext(plaintext.as_bytes()).unwrap();
        let blob = archive.products["PE0653"].blob().unwrap();
        assert_eq!(blob.len(), 0x10 + 16);
        assert!(blob[0..0x10].iter().all(|&b| b == 0xFF));
        assert!(blob[0x10..].iter().all(|&b| b == 0x99));
    }

    #[test]
    fn rejects_duplicate_eof_for_same_product() {
        let mut lines = vec!["PE0653=Receiver=1.0=hello".to_string()];
        lines.push(checksummed_line(16, 0, record_type::DATA, &[0x01; 16]));
        lines.push(checksummed_line(0, 0, record_type::EOF, &[]));
        lines.push(checksummed_line(16, 0, record_type::DATA, &[0x02; 16]));
        lines.push(checksummed_line(0, 0, record_type::EOF, &[]));
        let plaintext = lines.join("\n");

        assert!(decode_plaintext(plaintext.as_bytes()).is_err());
    }

    #[test]
    fn rejects_header_interleaved_with_open_blob() {
        let mut lines = vec!["PE0653=Receiver=1.0=hello".to_string()];
        lines.push(checksummed_line(16, 0, record_type::DATA, &[0x01; 16]));
        lines.push("PE0953=Handheld=2.0=world".to_string());
        let plaintext = lines.join("\n");

        assert!(decode_plaintext(plaintext.as_bytes()).is_err());
    }

    #[test]
    fn rejects_non_record_header_line_interleaved_with_open_blob() {
        let mut lines = vec!["PE0653=Receiver=1.0=hello".to_string()];
        lines.push(checksummed_line(16, 0, record_type::DATA, &[0x01; 16]));
        lines.push("this is not a 4-field header and not a record line".to_string());
        let plaintext = lines.join("\n");

        assert!(decode_plaintext(plaintext.as_bytes()).is_err());
    }

    #[test]
    fn rejects_unsupported_record_type() {
        let mut lines = vec!["PE0653=Receiver=1.0=hello".to_string()];
        lines.push(checksummed_line(0, 0, 4, &[]));
        let plaintext = lines.join("\n");

        match decode_plaintext(plaintext.as_bytes()) {
            Err(ArchiveError::UnsupportedRecord { record_type, .. }) => {
                assert_eq!(record_type, 4)
            }
            other => panic!("expected UnsupportedRecord, got {other:?}"),
        }
    }
}
