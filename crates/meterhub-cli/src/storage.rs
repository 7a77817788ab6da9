use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use color_eyre::Result;
use dirs::data_dir;
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use meterhub_core::store::{FleetStore, StoreError};
use meterhub_core::types::{DeviceBinding, Reading, StoredCredentials, TenantId};

use crate::config::Config;

/// JSON-file-backed document store. One directory per tenant, one file
/// per document, plus a single enrolled-index file; writes go through a
/// temp file so a crash never leaves a half-written document.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tenant_dir(&self, tenant: &TenantId) -> PathBuf {
        self.root.join("tenants").join(sanitize(tenant.as_str()))
    }

    fn credentials_path(&self, tenant: &TenantId) -> PathBuf {
        self.tenant_dir(tenant).join("credentials.json")
    }

    fn binding_path(&self, tenant: &TenantId) -> PathBuf {
        self.tenant_dir(tenant).join("device.json")
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("enrolled.json")
    }

    fn read_index(&self) -> Result<BTreeMap<String, bool>, StoreError> {
        Ok(read_json(&self.index_path())?.unwrap_or_default())
    }

    fn write_index(&self, index: &BTreeMap<String, bool>) -> Result<(), StoreError> {
        write_json(&self.index_path(), index)
    }
}

#[async_trait]
impl FleetStore for JsonFileStore {
    async fn enrolled_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let index = self.read_index()?;
        Ok(index
            .into_iter()
            .filter(|(_, enrolled)| *enrolled)
            .map(|(tenant, _)| TenantId::new(tenant))
            .collect())
    }

    async fn credential_record(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<StoredCredentials>, StoreError> {
        read_json(&self.credentials_path(tenant))
    }

    async fn device_binding(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<DeviceBinding>, StoreError> {
        read_json(&self.binding_path(tenant))
    }

    async fn put_reading(
        &self,
        tenant: &TenantId,
        reading: &Reading,
    ) -> Result<String, StoreError> {
        let path = self
            .tenant_dir(tenant)
            .join("readings")
            .join(format!("{}.json", sanitize(&reading.ts)));
        write_json(&path, reading)?;
        Ok(format!("tenants/{tenant}/readings/{}", reading.ts))
    }

    async fn put_credentials(
        &self,
        tenant: &TenantId,
        record: &StoredCredentials,
    ) -> Result<(), StoreError> {
        write_json(&self.credentials_path(tenant), record)
    }

    async fn put_device_binding(
        &self,
        tenant: &TenantId,
        binding: &DeviceBinding,
    ) -> Result<(), StoreError> {
        write_json(&self.binding_path(tenant), binding)
    }

    async fn set_enrolled(&self, tenant: &TenantId, enrolled: bool) -> Result<(), StoreError> {
        let mut index = self.read_index()?;
        index.insert(tenant.as_str().to_string(), enrolled);
        self.write_index(&index)
    }

    async fn clear_integration(&self, tenant: &TenantId) -> Result<(), StoreError> {
        remove_if_present(&self.credentials_path(tenant))?;
        remove_if_present(&self.binding_path(tenant))?;
        self.set_enrolled(tenant, false).await
    }
}

/// Resolve the default data directory for Meterhub.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("meterhub"))
}

/// Build a store honoring the config override.
pub fn store_from_config(config: &Config) -> Result<JsonFileStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "initializing document store");
    Ok(JsonFileStore::new(root))
}

fn sanitize(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::unavailable(err)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::unavailable("invalid storage path"))?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    let json = serde_json::to_vec_pretty(value).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(storage_err(err)),
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(storage_err)?;
    serde_json::from_slice(&buf).map(Some).map_err(storage_err)
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(storage_err(err)),
    }
}
