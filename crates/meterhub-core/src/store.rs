use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{DeviceBinding, Reading, StoredCredentials, TenantId};

/// Errors produced by document-store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be reached or a document is unreadable.
    #[error("store failure: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    pub fn unavailable(reason: impl ToString) -> Self {
        StoreError::Unavailable {
            reason: reason.to_string(),
        }
    }
}

/// Contract for the per-tenant document store. The poller only reads
/// credential and binding documents and appends readings; the enrolled
/// index is maintained by the registration surface, never recomputed.
#[async_trait]
pub trait FleetStore: Send + Sync {
    /// Tenants flagged as actively enrolled, from the maintained index.
    async fn enrolled_tenants(&self) -> Result<Vec<TenantId>, StoreError>;

    /// The raw credential document, if the tenant has one.
    async fn credential_record(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<StoredCredentials>, StoreError>;

    /// The device binding document, if the tenant has one.
    async fn device_binding(&self, tenant: &TenantId)
        -> Result<Option<DeviceBinding>, StoreError>;

    /// Persist one immutable reading; returns the document key.
    async fn put_reading(&self, tenant: &TenantId, reading: &Reading)
        -> Result<String, StoreError>;

    /// Overwrite the tenant's credential document (registration surface).
    async fn put_credentials(
        &self,
        tenant: &TenantId,
        record: &StoredCredentials,
    ) -> Result<(), StoreError>;

    /// Overwrite the tenant's device binding (registration surface).
    async fn put_device_binding(
        &self,
        tenant: &TenantId,
        binding: &DeviceBinding,
    ) -> Result<(), StoreError>;

    /// Flip the tenant's flag in the enrolled index.
    async fn set_enrolled(&self, tenant: &TenantId, enrolled: bool) -> Result<(), StoreError>;

    /// Remove credentials and device binding and unenroll the tenant.
    async fn clear_integration(&self, tenant: &TenantId) -> Result<(), StoreError>;
}

/// In-memory store for tests and smoke runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFleetStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    enrolled: HashMap<TenantId, bool>,
    credentials: HashMap<TenantId, StoredCredentials>,
    bindings: HashMap<TenantId, DeviceBinding>,
    readings: HashMap<TenantId, Vec<Reading>>,
}

impl InMemoryFleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: readings persisted for one tenant, in insertion order.
    pub fn readings_for(&self, tenant: &TenantId) -> Vec<Reading> {
        self.inner
            .lock()
            .map(|inner| inner.readings.get(tenant).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

fn lock_err<E: ToString>(err: E) -> StoreError {
    StoreError::Unavailable {
        reason: format!("lock poisoned: {}", err.to_string()),
    }
}

#[async_trait]
impl FleetStore for InMemoryFleetStore {
    async fn enrolled_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        let mut tenants: Vec<TenantId> = inner
            .enrolled
            .iter()
            .filter(|(_, enrolled)| **enrolled)
            .map(|(tenant, _)| tenant.clone())
            .collect();
        tenants.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(tenants)
    }

    async fn credential_record(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<StoredCredentials>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(inner.credentials.get(tenant).cloned())
    }

    async fn device_binding(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<DeviceBinding>, StoreError> {
        let inner = self.inner.lock().map_err(lock_err)?;
        Ok(inner.bindings.get(tenant).cloned())
    }

    async fn put_reading(
        &self,
        tenant: &TenantId,
        reading: &Reading,
    ) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        inner
            .readings
            .entry(tenant.clone())
            .or_default()
            .push(reading.clone());
        Ok(format!("tenants/{tenant}/readings/{}", reading.ts))
    }

    async fn put_credentials(
        &self,
        tenant: &TenantId,
        record: &StoredCredentials,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        inner.credentials.insert(tenant.clone(), record.clone());
        Ok(())
    }

    async fn put_device_binding(
        &self,
        tenant: &TenantId,
        binding: &DeviceBinding,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        inner.bindings.insert(tenant.clone(), binding.clone());
        Ok(())
    }

    async fn set_enrolled(&self, tenant: &TenantId, enrolled: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        inner.enrolled.insert(tenant.clone(), enrolled);
        Ok(())
    }

    async fn clear_integration(&self, tenant: &TenantId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(lock_err)?;
        inner.credentials.remove(tenant);
        inner.bindings.remove(tenant);
        inner.enrolled.insert(tenant.clone(), false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enrolled_index_filters_disabled_tenants() {
        let store = InMemoryFleetStore::new();
        store.set_enrolled(&"a".into(), true).await.expect("set");
        store.set_enrolled(&"b".into(), false).await.expect("set");
        store.set_enrolled(&"c".into(), true).await.expect("set");

        let tenants = store.enrolled_tenants().await.expect("list");
        assert_eq!(tenants, vec![TenantId::from("a"), TenantId::from("c")]);
    }

    #[tokio::test]
    async fn reading_key_embeds_tenant_and_timestamp() {
        let store = InMemoryFleetStore::new();
        let tenant = TenantId::from("t1");
        let reading = Reading::from_status(Some(20.0), Some(50.0), Some(90.0));

        let key = store.put_reading(&tenant, &reading).await.expect("put");
        assert_eq!(key, format!("tenants/t1/readings/{}", reading.ts));
        assert_eq!(store.readings_for(&tenant), vec![reading]);
    }

    #[tokio::test]
    async fn clear_integration_removes_documents_and_unenrolls() {
        let store = InMemoryFleetStore::new();
        let tenant = TenantId::from("t1");
        store.set_enrolled(&tenant, true).await.expect("enroll");
        store
            .put_credentials(&tenant, &StoredCredentials::default())
            .await
            .expect("credentials");
        store
            .put_device_binding(
                &tenant,
                &DeviceBinding {
                    device_id: "dev".into(),
                    device_name: None,
                    enabled: true,
                },
            )
            .await
            .expect("binding");

        store.clear_integration(&tenant).await.expect("clear");

        assert!(store.enrolled_tenants().await.expect("list").is_empty());
        assert_eq!(store.credential_record(&tenant).await.expect("read"), None);
        assert_eq!(store.device_binding(&tenant).await.expect("read"), None);
    }
}
