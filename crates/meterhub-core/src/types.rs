use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Opaque tenant identifier, assigned by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Which physical device a tenant's polls target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceBinding {
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    /// Polling only happens while this is set.
    pub enabled: bool,
}

/// One generation of a stored token/secret pair. Depending on the
/// generation that wrote them, values may be sealed blobs or plaintext.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialFields {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Raw per-tenant credential document as stored. At most one generation
/// is authoritative per read; `v1_plain` wins when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCredentials {
    #[serde(default)]
    pub v1_plain: Option<CredentialFields>,
    #[serde(default)]
    pub v1: Option<CredentialFields>,
}

/// One immutable snapshot per poll attempt. `ts` doubles as the
/// document key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub ts: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery: Option<f64>,
    pub source: String,
}

impl Reading {
    /// Stamp a status snapshot with the current UTC time.
    pub fn from_status(
        temperature: Option<f64>,
        humidity: Option<f64>,
        battery: Option<f64>,
    ) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            temperature,
            humidity,
            battery,
            source: "status".to_string(),
        }
    }
}

/// Why a tenant was skipped (a normal outcome, not a failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingSecrets,
    MissingDevice,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::MissingSecrets => "missing_secrets",
            SkipReason::MissingDevice => "missing_device",
        }
    }
}

/// Terminal state of a single tenant's poll task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// A reading was persisted under the given document key.
    Saved { doc_key: String },
    Skipped { reason: SkipReason },
    Failed { reason: String },
}

/// Per-tenant result of one fan-out task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub tenant: TenantId,
    pub status: PollStatus,
}

/// Aggregate over one fan-out cycle.
/// `total` always equals `saved + skipped + failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub total: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PollSummary {
    /// Pure reduction over completed outcomes; order-independent.
    pub fn from_outcomes(outcomes: &[PollOutcome]) -> Self {
        let mut summary = PollSummary {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.status {
                PollStatus::Saved { .. } => summary.saved += 1,
                PollStatus::Skipped { .. } => summary.skipped += 1,
                PollStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, status: PollStatus) -> PollOutcome {
        PollOutcome {
            tenant: TenantId::from(id),
            status,
        }
    }

    #[test]
    fn summary_counts_add_up() {
        let outcomes = vec![
            outcome(
                "a",
                PollStatus::Saved {
                    doc_key: "a/readings/t0".into(),
                },
            ),
            outcome(
                "b",
                PollStatus::Skipped {
                    reason: SkipReason::MissingSecrets,
                },
            ),
            outcome(
                "c",
                PollStatus::Failed {
                    reason: "connectivity".into(),
                },
            ),
            outcome(
                "d",
                PollStatus::Skipped {
                    reason: SkipReason::MissingDevice,
                },
            ),
        ];

        let summary = PollSummary::from_outcomes(&outcomes);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.total,
            summary.saved + summary.skipped + summary.failed
        );
    }

    #[test]
    fn summary_of_empty_cycle_is_zero() {
        assert_eq!(PollSummary::from_outcomes(&[]), PollSummary::default());
    }

    #[test]
    fn credential_document_parses_with_both_generations() {
        let doc: StoredCredentials = serde_json::from_str(
            r#"{
                "v1_plain": { "token": "tok", "secret": "sec" },
                "v1": { "token": "old-tok" }
            }"#,
        )
        .expect("parse");

        assert_eq!(doc.v1_plain.as_ref().unwrap().token.as_deref(), Some("tok"));
        let legacy = doc.v1.as_ref().unwrap();
        assert_eq!(legacy.token.as_deref(), Some("old-tok"));
        assert_eq!(legacy.secret, None);
    }

    #[test]
    fn credential_document_tolerates_empty_object() {
        let doc: StoredCredentials = serde_json::from_str("{}").expect("parse");
        assert_eq!(doc, StoredCredentials::default());
    }

    #[test]
    fn reading_timestamp_is_rfc3339_utc() {
        let reading = Reading::from_status(Some(21.5), None, Some(88.0));
        assert!(reading.ts.ends_with('Z'));
        chrono::DateTime::parse_from_rfc3339(&reading.ts).expect("valid timestamp");
        assert_eq!(reading.source, "status");
    }
}
