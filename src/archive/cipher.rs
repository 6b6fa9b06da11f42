//! AES-128-CBC stream decryption for `.iboot` archive files.
//!
//! The vendor format uses the same 16 ASCII bytes as both key and IV; this
//! is a legacy compatibility constraint carried over from the original
//! archive tool, not a security property, and must not be "fixed" (see
//! SPEC_FULL.md open questions).

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

use crate::constants::ARCHIVE_AES_KEY;
use crate::error::ArchiveError;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Decrypts a whole `.iboot` archive buffer into its plaintext bytes.
///
/// The archive is small enough (a few hundred KiB at most) that decrypting
/// it in one pass and handing the caller a `Vec<u8>` is simpler than a
/// streaming cipher, and matches how the archive is consumed downstream (a
/// line splitter over the whole buffer).
pub fn decrypt_archive(ciphertext: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let decryptor = Aes128CbcDec::new(ARCHIVE_AES_KEY.into(), ARCHIVE_AES_KEY.into());
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| ArchiveError::Cipher(e.to_string()))
}
