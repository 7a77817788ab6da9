use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// `signVersion` currently pinned by the device API.
pub const SIGN_VERSION: &str = "1";
const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

#[derive(Debug, Error)]
pub enum SignError {
    #[error("credential is not a valid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}

/// base64(HMAC-SHA256(secret, token || t || nonce)); inputs concatenated
/// as raw strings in this order, no delimiter. Pure in all four inputs.
pub fn signature(token: &str, secret: &str, t: &str, nonce: &str) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(token.as_bytes());
    mac.update(t.as_bytes());
    mac.update(nonce.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Builds the authentication headers the device API requires from a
/// resolved token/secret pair.
#[derive(Clone)]
pub struct RequestSigner {
    token: String,
    secret: String,
}

impl RequestSigner {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }

    /// Signed header set with a fresh `t` (unix millis) and `nonce`
    /// (UUIDv4) pair. Each call produces new values, so a request is
    /// never replayed with a stale signature.
    pub fn headers(&self) -> Result<HeaderMap, SignError> {
        let t = Utc::now().timestamp_millis().to_string();
        let nonce = Uuid::new_v4().to_string();
        self.headers_at(&t, &nonce)
    }

    fn headers_at(&self, t: &str, nonce: &str) -> Result<HeaderMap, SignError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&self.token)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        headers.insert(HeaderName::from_static("t"), HeaderValue::from_str(t)?);
        headers.insert(
            HeaderName::from_static("sign"),
            HeaderValue::from_str(&signature(&self.token, &self.secret, t, nonce))?,
        );
        headers.insert(
            HeaderName::from_static("nonce"),
            HeaderValue::from_str(nonce)?,
        );
        // Header names travel case-insensitively; the API documents this
        // one as `signVersion`.
        headers.insert(
            HeaderName::from_static("signversion"),
            HeaderValue::from_static(SIGN_VERSION),
        );
        Ok(headers)
    }
}
