use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use crate::sign::RequestSigner;

/// Production endpoint of the device API.
pub const DEFAULT_BASE_URL: &str = "https://api.switch-bot.com";

/// Every call is bounded; exceeding this is a connectivity error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// API-level success code carried in the response envelope, distinct
/// from the HTTP status.
const API_SUCCESS: i64 = 100;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 401/403: the credentials are no longer accepted. Permanent until
    /// re-registration; retrying cannot help.
    #[error("device API rejected credentials (http {status})")]
    Auth { status: u16 },
    /// Any other non-success HTTP status or envelope statusCode.
    /// Transient; the caller decides retry policy.
    #[error("device API error {code}: {message}")]
    Service { code: i64, message: String },
    /// No usable response: connection failure or timeout.
    #[error("device API unreachable: {0}")]
    Connectivity(String),
    #[error("unexpected response shape: {0}")]
    Decode(String),
    #[error(transparent)]
    Sign(#[from] crate::sign::SignError),
}

/// A device visible to a tenant's credentials.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub device_type: String,
}

/// Snapshot from the per-device status endpoint. The meter omits fields
/// it cannot measure, so each is nullable.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
pub struct MeterStatus {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery: Option<f64>,
}

/// Typed surface of the external device API.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Devices registered under the account behind the credentials.
    async fn list_devices(&self, token: &str, secret: &str) -> Result<Vec<Device>, ApiError>;

    /// Current status of a single device.
    async fn get_status(
        &self,
        device_id: &str,
        token: &str,
        secret: &str,
    ) -> Result<MeterStatus, ApiError>;
}

/// All responses arrive wrapped in this envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    status_code: i64,
    #[serde(default)]
    message: String,
    body: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceListBody {
    #[serde(default)]
    device_list: Vec<Device>,
}

/// reqwest-backed implementation against a live (or mocked) endpoint.
pub struct HttpDeviceApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDeviceApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Connectivity(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
        secret: &str,
    ) -> Result<T, ApiError> {
        let signer = RequestSigner::new(token, secret);
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(signer.headers()?)
            .send()
            .await
            .map_err(|e| ApiError::Connectivity(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Service {
                code: i64::from(status.as_u16()),
                message: truncate(&text, 500),
            });
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        if envelope.status_code != API_SUCCESS {
            return Err(ApiError::Service {
                code: envelope.status_code,
                message: envelope.message,
            });
        }
        envelope
            .body
            .ok_or_else(|| ApiError::Decode("envelope body missing".to_string()))
    }
}

#[async_trait]
impl DeviceApi for HttpDeviceApi {
    #[instrument(skip_all)]
    async fn list_devices(&self, token: &str, secret: &str) -> Result<Vec<Device>, ApiError> {
        let body: DeviceListBody = self.get_envelope("/v1.1/devices", token, secret).await?;
        Ok(body.device_list)
    }

    #[instrument(skip_all, fields(device_id = %device_id))]
    async fn get_status(
        &self,
        device_id: &str,
        token: &str,
        secret: &str,
    ) -> Result<MeterStatus, ApiError> {
        let path = format!("/v1.1/devices/{device_id}/status");
        self.get_envelope(&path, token, secret).await
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}
