use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use meterhub_api::client::{ApiError, DeviceApi};
use meterhub_core::store::{FleetStore, StoreError};
use meterhub_core::types::{
    PollOutcome, PollStatus, PollSummary, Reading, SkipReason, TenantId,
};

use crate::resolver::CredentialResolver;

/// Tunables for one poll cycle.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Cap on concurrently in-flight tenant tasks. Protects the external
    /// API when the tenant count is large; not a correctness requirement.
    pub max_in_flight: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { max_in_flight: 8 }
    }
}

/// Fans one poll task out per enrolled tenant and reduces the joined
/// outcomes into a summary. Per-tenant failures never cross task
/// boundaries; the only fatal error is failing to enumerate tenants.
pub struct FleetPoller<S, A> {
    store: Arc<S>,
    api: Arc<A>,
    resolver: Arc<CredentialResolver>,
    config: PollerConfig,
}

impl<S, A> FleetPoller<S, A>
where
    S: FleetStore + 'static,
    A: DeviceApi + 'static,
{
    pub fn new(
        store: Arc<S>,
        api: Arc<A>,
        resolver: CredentialResolver,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            api,
            resolver: Arc::new(resolver),
            config,
        }
    }

    /// Runs one fan-out cycle over every enrolled tenant.
    #[instrument(skip_all)]
    pub async fn poll_once(&self) -> Result<PollSummary, StoreError> {
        let tenants = self.store.enrolled_tenants().await?;
        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));

        let mut tasks = JoinSet::new();
        for tenant in tenants {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let api = Arc::clone(&self.api);
            let resolver = Arc::clone(&self.resolver);
            tasks.spawn(async move {
                // The semaphore outlives the cycle and is never closed
                // while tasks are joined, so acquisition cannot fail.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return PollOutcome {
                            tenant,
                            status: PollStatus::Failed {
                                reason: "cancelled".to_string(),
                            },
                        }
                    }
                };
                poll_tenant(store.as_ref(), api.as_ref(), resolver.as_ref(), tenant).await
            });
        }

        // Join barrier: counters are only accumulated once every task
        // has returned its immutable outcome.
        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => error!(error = %err, "tenant poll task panicked"),
            }
        }

        let summary = PollSummary::from_outcomes(&outcomes);
        info!(
            total = summary.total,
            saved = summary.saved,
            skipped = summary.skipped,
            failed = summary.failed,
            "poll cycle complete"
        );
        Ok(summary)
    }

    /// Single-tenant poll, used by the on-demand trigger.
    pub async fn poll_tenant(&self, tenant: TenantId) -> PollOutcome {
        poll_tenant(
            self.store.as_ref(),
            self.api.as_ref(),
            self.resolver.as_ref(),
            tenant,
        )
        .await
    }
}

/// One tenant's poll: resolve credentials, resolve the device binding,
/// fetch status, persist one reading. Every exit is a classified
/// outcome; errors are captured for observability and never propagate.
#[instrument(skip_all, fields(tenant = %tenant))]
pub async fn poll_tenant<S: FleetStore + ?Sized, A: DeviceApi + ?Sized>(
    store: &S,
    api: &A,
    resolver: &CredentialResolver,
    tenant: TenantId,
) -> PollOutcome {
    let status = poll_tenant_inner(store, api, resolver, &tenant).await;
    match &status {
        PollStatus::Saved { doc_key } => info!(doc_key = %doc_key, "reading saved"),
        PollStatus::Skipped { reason } => info!(reason = reason.as_str(), "tenant skipped"),
        PollStatus::Failed { reason } => warn!(reason = %reason, "tenant poll failed"),
    }
    PollOutcome { tenant, status }
}

async fn poll_tenant_inner<S: FleetStore + ?Sized, A: DeviceApi + ?Sized>(
    store: &S,
    api: &A,
    resolver: &CredentialResolver,
    tenant: &TenantId,
) -> PollStatus {
    let record = match store.credential_record(tenant).await {
        Ok(record) => record,
        Err(err) => return failed(format!("store: {err}")),
    };
    let Some(credentials) = resolver.resolve(record.as_ref()) else {
        return PollStatus::Skipped {
            reason: SkipReason::MissingSecrets,
        };
    };

    let binding = match store.device_binding(tenant).await {
        Ok(binding) => binding,
        Err(err) => return failed(format!("store: {err}")),
    };
    let Some(binding) = binding.filter(|b| b.enabled && !b.device_id.is_empty()) else {
        return PollStatus::Skipped {
            reason: SkipReason::MissingDevice,
        };
    };

    let status = match api
        .get_status(&binding.device_id, &credentials.token, &credentials.secret)
        .await
    {
        Ok(status) => status,
        Err(err) => return failed(classify_api_failure(&err)),
    };

    let reading = Reading::from_status(status.temperature, status.humidity, status.battery);
    match store.put_reading(tenant, &reading).await {
        Ok(doc_key) => PollStatus::Saved { doc_key },
        Err(err) => failed(format!("store: {err}")),
    }
}

fn failed(reason: String) -> PollStatus {
    PollStatus::Failed { reason }
}

/// Failure labels surfaced in outcomes. 401/403 is called out so callers
/// can prompt re-registration instead of waiting on further cycles.
fn classify_api_failure(err: &ApiError) -> String {
    match err {
        ApiError::Auth { status } => format!("credential_invalid (http {status})"),
        ApiError::Service { code, .. } => format!("api_error ({code})"),
        ApiError::Connectivity(_) => "connectivity".to_string(),
        ApiError::Decode(_) | ApiError::Sign(_) => "error".to_string(),
    }
}
