//! Envelope encryption for tenant secrets at rest.
//! AES-256-GCM over a `nonce || tag || ciphertext` base64 wire format,
//! with key material injected once at construction.

pub mod envelope;
pub mod key;
