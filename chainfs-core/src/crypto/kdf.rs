//! Passphrase-derived key material.

use argon2::Argon2;

use crate::error::{ChainFsError, Result};

/// Application-wide KDF salt. Fixed by necessity: the same passphrase must
/// re-derive the same key with nothing stored anywhere else.
const KDF_SALT: &[u8] = b"chainfs/key/v1";

pub const KEY_LEN: usize = 32;

/// Everything derived from the user passphrase: the cipher key and the
/// deterministic label used for password-based discovery.
#[derive(Clone)]
pub struct SecretKey {
    key: [u8; KEY_LEN],
    label: String,
}

impl SecretKey {
    pub fn derive(passphrase: &str) -> Result<Self> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), KDF_SALT, &mut key)
            .map_err(|e| ChainFsError::Config(format!("key derivation failed: {e}")))?;
        let label = blake3::hash(passphrase.as_bytes()).to_hex().to_string();
        Ok(Self { key, label })
    }

    pub fn cipher_key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Canonical transform of the passphrase. Safe to expose as block
    /// metadata, and usable as a lookup key — unlike the cipher key, it
    /// reveals nothing about the key stream.
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = SecretKey::derive("hunter2").unwrap();
        let b = SecretKey::derive("hunter2").unwrap();
        assert_eq!(a.cipher_key(), b.cipher_key());
        assert_eq!(a.label(), b.label());
    }

    #[test]
    fn different_passphrases_diverge() {
        let a = SecretKey::derive("hunter2").unwrap();
        let b = SecretKey::derive("hunter3").unwrap();
        assert_ne!(a.cipher_key(), b.cipher_key());
        assert_ne!(a.label(), b.label());
    }

    #[test]
    fn label_is_plain_hex() {
        let key = SecretKey::derive("hunter2").unwrap();
        assert_eq!(key.label().len(), 64);
        assert!(key.label().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
