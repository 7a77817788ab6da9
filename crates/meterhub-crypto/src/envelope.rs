use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use crate::key::KeyMaterial;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
pub const NONCE_LEN: usize = 12;
/// Authentication tag size (128 bits / 16 bytes).
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("sealed blob is not valid base64: {0}")]
    Encoding(String),
    #[error("sealed blob too short: {len} bytes")]
    TooShort { len: usize },
    /// Tag verification failed: the blob was tampered with or sealed
    /// under a different key.
    #[error("decryption failed: tag verification error")]
    Verification,
    #[error("encryption failed: {0}")]
    Seal(String),
}

/// Authenticated encryption for secret strings at rest.
///
/// Wire format: base64 of `nonce(12) || tag(16) || ciphertext`. Holds
/// the cipher built once from injected key material; the key is
/// read-only afterwards and safe to share across tasks.
///
/// A fresh random nonce is drawn for every seal. Reusing a nonce under
/// the same key voids every guarantee AES-GCM provides, so the nonce is
/// never caller-supplied.
pub struct EnvelopeCipher {
    cipher: Aes256Gcm,
}

impl EnvelopeCipher {
    pub fn new(key: &KeyMaterial) -> Self {
        let key_bytes: Key<Aes256Gcm> = key.bytes.into();
        Self {
            cipher: Aes256Gcm::new(&key_bytes),
        }
    }

    /// Encrypt a plaintext secret into a self-contained sealed blob.
    pub fn seal(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Seal(e.to_string()))?;

        // aes-gcm appends the tag to the ciphertext; the wire format
        // carries it between the nonce and the ciphertext.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(tag);
        out.extend_from_slice(ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypt and verify a sealed blob. Any bit flip in the nonce, tag,
    /// or ciphertext region fails verification.
    pub fn open(&self, blob: &str) -> Result<String, CipherError> {
        let bytes = BASE64
            .decode(blob)
            .map_err(|e| CipherError::Encoding(e.to_string()))?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::TooShort { len: bytes.len() });
        }

        let (nonce_bytes, rest) = bytes.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut sealed = Vec::with_capacity(rest.len());
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed.as_ref())
            .map_err(|_| CipherError::Verification)?;
        String::from_utf8(plaintext).map_err(|e| CipherError::Encoding(e.to_string()))
    }
}
