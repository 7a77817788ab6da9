use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use thiserror::Error;

/// Required key size once decoded.
pub const KEY_LEN: usize = 32;

/// Key material for envelope encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; KEY_LEN],
}

// Manual Debug so key bytes cannot leak through logging.
impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Fatal configuration error: raised on first cryptographic use,
    /// never retried.
    #[error("envelope key is not configured")]
    Missing,
    #[error("envelope key must decode to {KEY_LEN} bytes from raw, base64, or hex")]
    Invalid,
}

/// Decode key material from a configuration value. Raw (exactly 32
/// bytes), base64, and hex encodings are accepted; exactly one of them
/// must yield exactly 32 bytes.
pub fn decode_key(raw: &str) -> Result<KeyMaterial, KeyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(KeyError::Missing);
    }

    if trimmed.len() == KEY_LEN {
        return Ok(material(trimmed.as_bytes()));
    }
    if let Ok(bytes) = BASE64.decode(trimmed) {
        if bytes.len() == KEY_LEN {
            return Ok(material(&bytes));
        }
    }
    if let Ok(bytes) = hex::decode(trimmed) {
        if bytes.len() == KEY_LEN {
            return Ok(material(&bytes));
        }
    }

    Err(KeyError::Invalid)
}

/// Read and decode key material from an environment variable.
pub fn from_env(var: &str) -> Result<KeyMaterial, KeyError> {
    let raw = std::env::var(var).map_err(|_| KeyError::Missing)?;
    decode_key(&raw)
}

fn material(bytes: &[u8]) -> KeyMaterial {
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(bytes);
    KeyMaterial {
        id: "default".to_string(),
        bytes: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_base64_of_32_bytes() {
        let encoded = BASE64.encode([7u8; 32]);
        let key = decode_key(&encoded).expect("decode");
        assert_eq!(key.bytes, [7u8; 32]);
    }

    #[test]
    fn accepts_hex_of_32_bytes() {
        // 64 hex chars also match the base64 alphabet, but decode to 48
        // bytes there, so only the hex interpretation fits.
        let encoded = hex::encode([0xabu8; 32]);
        let key = decode_key(&encoded).expect("decode");
        assert_eq!(key.bytes, [0xabu8; 32]);
    }

    #[test]
    fn accepts_raw_32_byte_string() {
        let raw = "0123456789abcdef0123456789abcdef";
        let key = decode_key(raw).expect("decode");
        assert_eq!(&key.bytes, raw.as_bytes());
    }

    #[test]
    fn rejects_wrong_length() {
        let encoded = BASE64.encode([1u8; 16]);
        assert_eq!(decode_key(&encoded), Err(KeyError::Invalid));
    }

    #[test]
    fn rejects_empty_value() {
        assert_eq!(decode_key("   "), Err(KeyError::Missing));
    }

    #[test]
    fn debug_never_shows_key_bytes() {
        let key = material(&[0x42u8; 32]);
        let printed = format!("{key:?}");
        assert!(!printed.contains("66")); // 0x42
        assert!(!printed.contains("0x42"));
        assert!(printed.contains("default"));
    }
}
