//! # fwupdate — firmware update client for PE0653/PE0953 Z-Wave pool/spa controllers
//!
//! Recovers per-product firmware images from a vendor-supplied encrypted
//! `.iboot` archive and delivers one to a target device over the Z-Wave
//! Manufacturer-Proprietary Command Class, reached through an external
//! gateway process via an MQTT broker.
//!
//! ## Layout
//!
//! - [`archive`] decrypts and parses a `.iboot` file into per-product blobs.
//! - [`crc`] holds the two CRC primitives the transfer protocol depends on.
//! - [`packet`] builds and reads the fixed-shape protocol packets.
//! - [`transport`] is the `send_and_receive` abstraction and its three
//!   implementations (gateway, fake, logging).
//! - [`upload`] drives the device-led transfer state machine.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn run() -> Result<(), fwupdate::UpdateError> {
//! use fwupdate::archive::decode_archive;
//! use fwupdate::transport::fake::FakeTransport;
//! use fwupdate::upload::upload_blob;
//!
//! let ciphertext = std::fs::read("firmware.iboot").unwrap();
//! let archive = decode_archive(&ciphertext)?;
//! let product = &archive.products["PE0653"];
//! let blob = product.blob().expect("archive has no loaded blob for PE0653");
//!
//! let mut transport = FakeTransport::new();
//! upload_blob(&mut transport, blob).await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod constants;
pub mod crc;
pub mod error;
pub mod logging;
pub mod packet;
pub mod transport;
pub mod upload;
pub mod util;

pub use archive::{decode_archive, decode_plaintext, FirmwareArchive, ProductRecord};
pub use error::UpdateError;
pub use logging::{init_logger, log_info};
pub use transport::Transport;
pub use upload::{upload_blob, UploadOutcome};
