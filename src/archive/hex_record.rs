//! Intel-HEX record parsing for the interleaved data records in a
//! decrypted archive. Structure is decoded with `nom` once the line has
//! been hex-decoded and checksum-validated, matching the crate's habit of
//! using `nom` for fixed-shape binary framing.

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, u8 as nom_u8};
use nom::IResult;

use crate::error::ArchiveError;
use crate::util::hex::decode_hex;

/// One parsed `:`-prefixed Intel-HEX line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    pub data_length: u8,
    pub offset: u16,
    pub record_type: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

/// Record type tags this archive format uses or explicitly rejects.
pub mod record_type {
    pub const DATA: u8 = 0;
    pub const EOF: u8 = 1;
    pub const EXTENDED_SEGMENT_ADDRESS: u8 = 2;
}

fn parse_fields(input: &[u8]) -> IResult<&[u8], (u8, u16, u8, Vec<u8>, u8)> {
    let (input, length) = nom_u8(input)?;
    let (input, offset) = be_u16(input)?;
    let (input, record_type) = nom_u8(input)?;
    let (input, data) = take(length as usize)(input)?;
    let (input, checksum) = nom_u8(input)?;
    Ok((input, (length, offset, record_type, data.to_vec(), checksum)))
}

/// Parses one record line (including its leading `:`), given its 1-based
/// line number for error reporting.
pub fn parse_line(line: &str, line_no: usize) -> Result<HexRecord, ArchiveError> {
    if line.len() < 11 || line.len() % 2 == 0 {
        return Err(ArchiveError::Syntax {
            line: line_no,
            reason: format!("record line has invalid length {}", line.len()),
        });
    }

    let hex_body = &line[1..];
    let decoded = decode_hex(hex_body).map_err(|e| ArchiveError::Syntax {
        line: line_no,
        reason: format!("invalid hex in record: {e}"),
    })?;

    let sum: u32 = decoded.iter().map(|&b| b as u32).sum();
    if sum & 0xFF != 0 {
        return Err(ArchiveError::Syntax {
            line: line_no,
            reason: "record checksum does not sum to zero".to_string(),
        });
    }

    let (_, (length, offset, record_type, data, checksum)) =
        parse_fields(&decoded).map_err(|_| ArchiveError::Syntax {
            line: line_no,
            reason: "record does not decode to a well-formed [len,off,type,data,chk] shape"
                .to_string(),
        })?;

    if length as usize + 5 != decoded.len() {
        return Err(ArchiveError::Syntax {
            line: line_no,
            reason: format!(
                "declared data length {length} inconsistent with record size {}",
                decoded.len()
            ),
        });
    }

    match record_type {
        record_type::DATA | record_type::EOF | record_type::EXTENDED_SEGMENT_ADDRESS => {}
        other => {
            return Err(ArchiveError::UnsupportedRecord {
                line: line_no,
                record_type: other,
            })
        }
    }

    Ok(HexRecord {
        data_length: length,
        offset,
        record_type,
        data,
        checksum,
    })
}
