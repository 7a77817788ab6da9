use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};

use meterhub_api::client::{DeviceApi, HttpDeviceApi, DEFAULT_BASE_URL};
use meterhub_core::store::FleetStore;
use meterhub_core::types::{
    CredentialFields, DeviceBinding, PollStatus, StoredCredentials, TenantId,
};
use meterhub_crypto::envelope::EnvelopeCipher;
use meterhub_crypto::key::{self, KeyError, KeyMaterial};
use meterhub_poller::poller::{FleetPoller, PollerConfig};
use meterhub_poller::resolver::CredentialResolver;

use crate::config::{Config, ENVELOPE_KEY_VAR};
use crate::storage::{self, JsonFileStore};

/// Run one poll cycle, or poll a single tenant on demand.
pub async fn poll(tenant: Option<String>, config: &Config) -> Result<()> {
    let store = Arc::new(storage::store_from_config(config)?);
    let api = Arc::new(device_api(config)?);
    let resolver = CredentialResolver::new(Arc::new(cipher_from_config(config)?));
    let poller_config = match config.max_in_flight {
        Some(cap) => PollerConfig {
            max_in_flight: cap.max(1),
        },
        None => PollerConfig::default(),
    };
    let poller = FleetPoller::new(store, api, resolver, poller_config);

    match tenant {
        Some(tenant) => {
            let outcome = poller.poll_tenant(TenantId::new(tenant)).await;
            match outcome.status {
                PollStatus::Saved { doc_key } => {
                    println!("{}: saved -> {doc_key}", outcome.tenant);
                }
                PollStatus::Skipped { reason } => {
                    println!("{}: skipped ({})", outcome.tenant, reason.as_str());
                }
                PollStatus::Failed { reason } => {
                    println!("{}: failed ({reason})", outcome.tenant);
                }
            }
        }
        None => {
            let summary = poller
                .poll_once()
                .await
                .map_err(|e| eyre!(e.to_string()))?;
            println!(
                "poll cycle: total={} saved={} skipped={} failed={}",
                summary.total, summary.saved, summary.skipped, summary.failed
            );
        }
    }
    Ok(())
}

/// List the devices visible to a tenant's credentials.
pub async fn devices(tenant: String, config: &Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    let tenant = TenantId::new(tenant);
    let resolver = CredentialResolver::new(Arc::new(cipher_from_config(config)?));

    let record = store
        .credential_record(&tenant)
        .await
        .map_err(|e| eyre!(e.to_string()))?;
    let credentials = resolver
        .resolve(record.as_ref())
        .ok_or_else(|| eyre!("tenant {tenant} has no usable credentials; run `meterhub register`"))?;

    let api = device_api(config)?;
    let devices = api
        .list_devices(&credentials.token, &credentials.secret)
        .await
        .map_err(|e| eyre!(e.to_string()))?;

    if devices.is_empty() {
        println!("No devices visible to this account.");
        return Ok(());
    }
    for device in devices {
        println!(
            "{}  {} ({})",
            device.device_id, device.device_name, device.device_type
        );
    }
    Ok(())
}

/// Seal and store a tenant's token/secret, optionally bind a device,
/// and enroll the tenant in the poll index.
pub async fn register(
    tenant: String,
    token: String,
    secret: String,
    device: Option<String>,
    config: &Config,
) -> Result<()> {
    // Same shape checks the device vendor applies to issued credentials.
    if !is_hex_of_at_least(&token, 40) {
        return Err(eyre!("token must be a hex string of at least 40 characters"));
    }
    if !is_hex_of_at_least(&secret, 24) {
        return Err(eyre!("secret must be a hex string of at least 24 characters"));
    }

    let store = storage::store_from_config(config)?;
    let cipher = cipher_from_config(config)?;
    let tenant = TenantId::new(tenant);

    let record = StoredCredentials {
        v1_plain: None,
        v1: Some(CredentialFields {
            token: Some(cipher.seal(&token).map_err(|e| eyre!(e.to_string()))?),
            secret: Some(cipher.seal(&secret).map_err(|e| eyre!(e.to_string()))?),
        }),
    };
    store
        .put_credentials(&tenant, &record)
        .await
        .map_err(|e| eyre!(e.to_string()))?;

    if let Some(device_id) = device {
        store
            .put_device_binding(
                &tenant,
                &DeviceBinding {
                    device_id,
                    device_name: None,
                    enabled: true,
                },
            )
            .await
            .map_err(|e| eyre!(e.to_string()))?;
    }

    store
        .set_enrolled(&tenant, true)
        .await
        .map_err(|e| eyre!(e.to_string()))?;
    println!("Registered {tenant} (credentials sealed at rest).");
    Ok(())
}

/// Remove a tenant's credentials and device binding and unenroll it.
pub async fn disable(tenant: String, config: &Config) -> Result<()> {
    let store = storage::store_from_config(config)?;
    let tenant = TenantId::new(tenant);
    store
        .clear_integration(&tenant)
        .await
        .map_err(|e| eyre!(e.to_string()))?;
    println!("Disabled integration for {tenant}.");
    Ok(())
}

fn device_api(config: &Config) -> Result<HttpDeviceApi> {
    let base_url = config.api_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    HttpDeviceApi::new(base_url).map_err(|e| eyre!(e.to_string()))
}

fn cipher_from_config(config: &Config) -> Result<EnvelopeCipher> {
    Ok(EnvelopeCipher::new(&resolve_key(config)?))
}

/// Key material: environment first, then the config file. Absence or a
/// wrong length is fatal here, before any cryptographic use.
fn resolve_key(config: &Config) -> Result<KeyMaterial> {
    match key::from_env(ENVELOPE_KEY_VAR) {
        Ok(material) => Ok(material),
        Err(KeyError::Missing) => {
            let raw = config.envelope_key.as_deref().ok_or_else(|| {
                eyre!("envelope key is not configured; set {ENVELOPE_KEY_VAR} or `envelope_key` in the config file")
            })?;
            key::decode_key(raw).map_err(|e| eyre!(e.to_string()))
        }
        Err(err) => Err(eyre!("{ENVELOPE_KEY_VAR}: {err}")),
    }
}

fn is_hex_of_at_least(value: &str, min: usize) -> bool {
    value.len() >= min && value.chars().all(|c| c.is_ascii_hexdigit())
}
