//! Symmetric sealing of record frames under the passphrase-derived key.
//! Every seal draws a fresh random nonce, so identical plaintexts never
//! produce identical output — sealed bytes cannot serve as lookup keys.

use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::error::{ChainFsError, Result};
use crate::util::random_array;

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Output is `nonce || ciphertext`; ciphertext carries the AEAD tag.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce_bytes: [u8; NONCE_LEN] = random_array()?;
    let aead = XChaCha20Poly1305::new(Key::from_slice(key));
    let body = aead
        .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| ChainFsError::Format("encryption failed".to_string()))?;
    let mut out = Vec::with_capacity(NONCE_LEN + body.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Splits the nonce back off and opens the body. A wrong key or a corrupted
/// blob fails the tag check — there is no silent success.
pub fn open(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(ChainFsError::Decryption);
    }
    let (nonce, body) = blob.split_at(NONCE_LEN);
    let aead = XChaCha20Poly1305::new(Key::from_slice(key));
    aead.decrypt(XNonce::from_slice(nonce), body)
        .map_err(|_| ChainFsError::Decryption)
}
