use std::sync::Arc;

use tracing::debug;

use meterhub_core::types::StoredCredentials;
use meterhub_crypto::envelope::EnvelopeCipher;

/// A usable token/secret pair, post-resolution.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub secret: String,
}

// Manual Debug so resolved secrets never reach logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token_len", &self.token.len())
            .field("secret_len", &self.secret.len())
            .finish()
    }
}

/// Maps a stored credential document, which may be in any of several
/// historical encodings, to a usable pair.
///
/// Resolution never errors: partially populated or malformed records
/// resolve to `None`, which callers treat as a skip, not a failure.
pub struct CredentialResolver {
    cipher: Arc<EnvelopeCipher>,
}

impl CredentialResolver {
    pub fn new(cipher: Arc<EnvelopeCipher>) -> Self {
        Self { cipher }
    }

    /// `v1_plain` (unencrypted, current generation) takes precedence
    /// when both of its fields are non-empty; otherwise the legacy `v1`
    /// generation is consulted. Exactly one generation is authoritative
    /// per read.
    pub fn resolve(&self, record: Option<&StoredCredentials>) -> Option<Credentials> {
        match classify(record) {
            Generation::Plain { token, secret } => Some(Credentials {
                token: token.to_string(),
                secret: secret.to_string(),
            }),
            Generation::LegacySealed { token, secret } => {
                let token = self.unwrap_legacy(token)?;
                let secret = self.unwrap_legacy(secret)?;
                Some(Credentials { token, secret })
            }
            Generation::Absent => None,
        }
    }

    /// Legacy `v1` values are sealed blobs or, in the oldest records,
    /// raw plaintext. Try to open; fall back to plaintext only when the
    /// value does not look like ciphertext. The look test (`/`, `+`,
    /// trailing `=`) is inherited from the stored data and must not be
    /// tightened without a migration.
    fn unwrap_legacy(&self, value: &str) -> Option<String> {
        if value.is_empty() {
            return None;
        }
        match self.cipher.open(value) {
            Ok(plaintext) => Some(plaintext),
            Err(_) if !looks_sealed(value) => Some(value.to_string()),
            Err(err) => {
                debug!(error = %err, "legacy credential field unusable");
                None
            }
        }
    }
}

/// The authoritative generation inside a stored credential document.
/// Legacy values may still turn out unusable when opened; classification
/// only decides which generation to read.
#[derive(Debug, PartialEq, Eq)]
enum Generation<'a> {
    /// Current generation, stored unencrypted.
    Plain { token: &'a str, secret: &'a str },
    /// Legacy generation: sealed blobs, or raw plaintext in the oldest
    /// records.
    LegacySealed { token: &'a str, secret: &'a str },
    Absent,
}

fn classify(record: Option<&StoredCredentials>) -> Generation<'_> {
    let Some(record) = record else {
        return Generation::Absent;
    };

    if let Some(plain) = record.v1_plain.as_ref() {
        if let (Some(token), Some(secret)) = (
            non_empty(plain.token.as_deref()),
            non_empty(plain.secret.as_deref()),
        ) {
            return Generation::Plain { token, secret };
        }
    }

    if let Some(legacy) = record.v1.as_ref() {
        if let (Some(token), Some(secret)) = (
            non_empty(legacy.token.as_deref()),
            non_empty(legacy.secret.as_deref()),
        ) {
            return Generation::LegacySealed { token, secret };
        }
    }

    Generation::Absent
}

fn looks_sealed(value: &str) -> bool {
    value.contains('/') || value.contains('+') || value.ends_with('=')
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
