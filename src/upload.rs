//! Upload engine: drives the device-led request/response state machine
//! that delivers one firmware blob over a [`Transport`], one 32-byte
//! window at a time.
//!
//! The device is the driver here, not the engine: every step of the loop
//! answers whatever `DATA_REQUEST` the device just sent. The engine never
//! decides on its own to advance past the last acknowledged sequence
//! number; it only resends what it already built when the device repeats
//! itself or goes quiet.

use log::{info, warn};

use crate::constants::{packet_type, MAX_TIMEOUTS};
use crate::crc::firmware_crc32;
use crate::error::{ProtocolError, UpdateError};
use crate::packet::{data_packet, done_packet, sequence_of, start_packet};
use crate::transport::Transport;

/// How a successful [`upload_blob`] call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The device replied with DONE after receiving the final packet.
    Confirmed,
    /// DONE was sent but the device's own DONE reply never arrived; per
    /// the observed protocol behavior this is treated as a successful
    /// upload with no final confirmation, not a failure.
    AssumedUploaded,
}

/// Delivers `blob` to `transport`, following the firmware transfer
/// protocol described in SPEC_FULL.md §4.6.
///
/// Fails before any packet is sent if `blob` isn't exactly
/// [`crate::constants::KNOWN_FIRMWARE_SIZE`] bytes. The whole-blob CRC-32
/// is still computed (so the check exists and can be logged) but, per the
/// device family's known layout ambiguity, never gates the upload.
pub async fn upload_blob(
    transport: &mut dyn Transport,
    blob: &[u8],
) -> Result<UploadOutcome, UpdateError> {
    if blob.len() != crate::constants::KNOWN_FIRMWARE_SIZE {
        return Err(ProtocolError::SizeMismatch {
            expected: crate::constants::KNOWN_FIRMWARE_SIZE,
            actual: blob.len(),
        }
        .into());
    }

    let whole_blob_crc = firmware_crc32(blob);
    info!("blob whole-image CRC-32 (informational, not gating): {whole_blob_crc:#010x}");

    let mut current_packet = start_packet();
    let mut expected_next_seq: u16 = 0;
    let mut timeouts: u32 = 0;
    let mut done_sent = false;

    loop {
        match transport.send_and_receive(current_packet.clone()).await? {
            None => {
                timeouts += 1;
                if timeouts < MAX_TIMEOUTS {
                    warn!("timeout waiting for reply, retry {timeouts}/{MAX_TIMEOUTS}");
                    continue;
                }
                if done_sent {
                    warn!("no final confirmation after DONE; assuming upload succeeded");
                    return Ok(UploadOutcome::AssumedUploaded);
                }
                return Err(ProtocolError::Timeout(MAX_TIMEOUTS).into());
            }
            Some(reply) => {
                if reply.len() < 4 || reply[0] != crate::constants::COMMAND_FIRMWARE_TRANSFER {
                    continue;
                }
                timeouts = 0;

                match reply[1] {
                    packet_type::DATA_REQUEST => {
                        let Some(seq) = sequence_of(&reply) else {
                            continue;
                        };
                        if seq != expected_next_seq {
                            continue;
                        }
                        expected_next_seq = seq;
                        let offset = seq as usize * crate::constants::DATA_WINDOW;
                        if offset < blob.len() {
                            current_packet = data_packet(seq, blob, offset);
                            expected_next_seq = seq + 1;
                            if seq % 32 == 0 {
                                info!("progress: {offset}/{} bytes", blob.len());
                            }
                        } else {
                            current_packet = done_packet(seq);
                            done_sent = true;
                        }
                    }
                    packet_type::DONE => return Ok(UploadOutcome::Confirmed),
                    packet_type::CRC_ERROR => {
                        return Err(ProtocolError::CrcError { seq: expected_next_seq }.into())
                    }
                    _ => continue,
                }
            }
        }
    }
}
