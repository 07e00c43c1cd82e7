//! Encryption at rest for stored credentials.
//!
//! Uses ChaCha20-Poly1305 under a single master key supplied at startup.
//! Sealed values are `base64(nonce || ciphertext || tag)` with a fresh
//! random nonce per call.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

/// Master key length in bytes.
pub const MASTER_KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Cipher errors
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Master key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Authentication failed - ciphertext tampered or sealed under another key")]
    AuthenticationFailed,
}

/// Result type for cipher operations
pub type CipherResult<T> = Result<T, CipherError>;

/// Authenticated cipher bound to the process-wide master key.
pub struct Cipher {
    aead: ChaCha20Poly1305,
}

impl Cipher {
    /// Build a cipher from raw key bytes.
    pub fn new(master_key: &[u8]) -> CipherResult<Self> {
        if master_key.len() != MASTER_KEY_LEN {
            return Err(CipherError::InvalidKeyLength(master_key.len()));
        }
        let aead = ChaCha20Poly1305::new_from_slice(master_key)
            .map_err(|_| CipherError::InvalidKeyLength(master_key.len()))?;
        Ok(Self { aead })
    }

    /// Build a cipher from a base64-encoded master key.
    pub fn from_base64(encoded: &str) -> CipherResult<Self> {
        let bytes = Zeroizing::new(BASE64.decode(encoded.trim())?);
        Self::new(&bytes)
    }

    /// Generate a fresh random master key, base64-encoded.
    pub fn generate_master_key() -> String {
        let mut key = Zeroizing::new([0u8; MASTER_KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        BASE64.encode(&key[..])
    }

    /// Seal a plaintext credential.
    pub fn encrypt(&self, plaintext: &[u8]) -> CipherResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Open a sealed value.
    ///
    /// Every failure mode (bad encoding, truncation, tampering, wrong key)
    /// collapses into `AuthenticationFailed`.
    pub fn decrypt(&self, sealed: &str) -> CipherResult<Zeroizing<Vec<u8>>> {
        let bytes = BASE64
            .decode(sealed)
            .map_err(|_| CipherError::AuthenticationFailed)?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::AuthenticationFailed);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);

        self.aead
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CipherError::AuthenticationFailed)
    }

    /// Open a sealed value that is known to hold UTF-8 text.
    pub fn decrypt_string(&self, sealed: &str) -> CipherResult<Zeroizing<String>> {
        let bytes = self.decrypt(sealed)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| CipherError::AuthenticationFailed)?;
        Ok(Zeroizing::new(text.to_owned()))
    }

    /// Structural check only: valid base64 and long enough to hold nonce and tag.
    /// Says nothing about which key sealed it.
    pub fn is_well_formed(sealed: &str) -> bool {
        BASE64
            .decode(sealed)
            .map(|bytes| bytes.len() >= NONCE_LEN + TAG_LEN)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("master_key", &"<redacted>")
            .finish()
    }
}
