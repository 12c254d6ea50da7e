//! Encryption boundary for data at rest.
//!
//! The vault never handles key material directly; it only sees a
//! [`VaultCipher`] that seals and opens opaque blobs. [`ChaChaCipher`] is
//! the shipped implementation: ChaCha20-Poly1305 with a random 96-bit nonce
//! prepended to every ciphertext, keyed by Argon2id over a master secret.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::VaultError;

const NONCE_LEN: usize = 12;

/// Length of the salt persisted next to the vault file.
pub const SALT_LEN: usize = 32;

/// Opaque encrypt/decrypt boundary.
pub trait VaultCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, VaultError>;
    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, VaultError>;

    /// Seal a string value into the text form stored in entries.
    fn seal_text(&self, plaintext: &str) -> Result<String, VaultError> {
        Ok(BASE64.encode(self.encrypt(plaintext.as_bytes())?))
    }

    /// Inverse of [`VaultCipher::seal_text`].
    fn open_text(&self, sealed: &str) -> Result<Zeroizing<String>, VaultError> {
        let raw = BASE64
            .decode(sealed)
            .map_err(|e| VaultError::Cipher(format!("sealed value is not base64: {e}")))?;
        let plaintext = self.decrypt(&raw)?;
        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| VaultError::Cipher("sealed value is not valid UTF-8".into()))
    }
}

/// 32-byte key, wiped on drop.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a key from `master_key` and a persisted salt with Argon2id.
    pub fn derive(master_key: &str, salt: &[u8]) -> Result<Self, VaultError> {
        if master_key.is_empty() {
            return Err(VaultError::Cipher("master key is empty".into()));
        }
        let params = Params::new(
            65536, // m_cost: 64 MiB
            3,     // t_cost
            1,     // p_cost
            Some(32),
        )
        .map_err(|e| VaultError::Cipher(format!("argon2 params: {e}")))?;

        let mut key = [0u8; 32];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(master_key.as_bytes(), salt, &mut key)
            .map_err(|e| VaultError::Cipher(format!("argon2: {e}")))?;
        Ok(Self(key))
    }
}

/// Fresh random salt for [`EncryptionKey::derive`].
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// ChaCha20-Poly1305 cipher. Sealed layout: `nonce || ciphertext+tag`.
pub struct ChaChaCipher {
    key: EncryptionKey,
}

impl ChaChaCipher {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    fn aead(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key.0))
    }
}

impl VaultCipher for ChaChaCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .aead()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| VaultError::Cipher(format!("encrypt: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
        if sealed.len() < NONCE_LEN {
            return Err(VaultError::Cipher("sealed blob is truncated".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.aead()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::Cipher("decrypt: authentication failed".into()))
    }
}
