//! Bounded incident logging and reporting for the vigil security core.
//!
//! ## Architecture
//!
//! ```text
//! +-----------+     +----------------+     +---------------------+
//! |   log()   | --> | classify       | --> | bounded FIFO buffer |
//! | (type,    |     | severity,      |     | (session storage,   |
//! |  details) |     | redact details |     |  oldest evicted)    |
//! +-----------+     +----------------+     +---------------------+
//!                                                 |
//!                          severity >= threshold  v
//!                         +-----------------------------+
//!                         | detached POST {incident,    |
//!                         |   summary} — fire and forget|
//!                         +-----------------------------+
//! ```
//!
//! Incidents are immutable once created and live in a capped FIFO buffer in
//! session-scoped storage; the oldest entries are evicted when the buffer
//! overflows. Detail maps are redacted before storage: keys that look like
//! credentials are replaced with a marker and long string values are
//! truncated.
//!
//! Remote reporting is best-effort by contract: the POST runs as a detached
//! task whose result is intentionally discarded. `log()` never blocks, never
//! fails, and callers cannot observe a reporting failure.

use crate::constants::{
    DEFAULT_INCIDENT_KEY, DEFAULT_MAX_INCIDENTS, DETAIL_VALUE_MAX_LEN, REDACTION_MARKER,
    SENSITIVE_KEY_FRAGMENTS,
};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// SEVERITY
// =============================================================================

/// Incident severity, ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Routine audit events.
    #[default]
    Low,
    /// Suspicious but inconclusive activity.
    Medium,
    /// Probable attack or abuse.
    High,
    /// Confirmed attack class or quota/credential emergency.
    Critical,
}

impl Severity {
    /// Get all severities, lowest first.
    pub fn all() -> Vec<Self> {
        vec![Self::Low, Self::Medium, Self::High, Self::Critical]
    }

    /// Short description of what this severity signifies.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Routine audit event",
            Self::Medium => "Suspicious but inconclusive activity",
            Self::High => "Probable attack or abuse",
            Self::Critical => "Confirmed attack class or operational emergency",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(crate::Error::Validation(format!(
                "Unknown severity: '{}'. Valid: low, medium, high, critical",
                s
            ))),
        }
    }
}

/// Incident types always classified CRITICAL regardless of pattern rules.
const CRITICAL_TYPES: [&str; 5] = [
    "XSS_ATTEMPT",
    "SQL_INJECTION",
    "RATE_LIMIT_EXCEEDED",
    "CSRF_ATTEMPT",
    "AUTHENTICATION_FAILURE",
];

/// Classify an incident type that was logged without an explicit severity.
pub fn classify_severity(incident_type: &str) -> Severity {
    if CRITICAL_TYPES.contains(&incident_type) {
        return Severity::Critical;
    }
    if incident_type.contains("ATTEMPT") || incident_type.contains("INJECTION") {
        return Severity::High;
    }
    if incident_type.contains("INVALID") || incident_type.contains("SUSPICIOUS") {
        return Severity::Medium;
    }
    Severity::Low
}

// =============================================================================
// INCIDENT
// =============================================================================

/// A recorded security-relevant event. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityIncident {
    /// Category identifier, e.g. `XSS_ATTEMPT`.
    #[serde(rename = "type")]
    pub incident_type: String,

    /// Redacted metadata captured with the incident.
    pub details: Map<String, Value>,

    /// When the incident was logged.
    pub timestamp: DateTime<Utc>,

    /// Page URL at log time, when known.
    #[serde(default)]
    pub url: Option<String>,

    /// User agent at log time, when known.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Classified or caller-supplied severity.
    pub severity: Severity,
}

/// Aggregate view over the stored incident buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSummary {
    /// Number of stored incidents.
    pub total: usize,
    /// Incident counts per type.
    pub by_type: HashMap<String, usize>,
    /// Incident counts per severity.
    pub by_severity: HashMap<Severity, usize>,
    /// Timestamp of the oldest stored incident.
    pub earliest: Option<DateTime<Utc>>,
    /// Timestamp of the newest stored incident.
    pub latest: Option<DateTime<Utc>>,
}

// =============================================================================
// CONFIGURATION
// =============================================================================

fn default_max_incidents() -> usize {
    DEFAULT_MAX_INCIDENTS
}

fn default_incident_key() -> String {
    DEFAULT_INCIDENT_KEY.to_string()
}

fn default_reporting_threshold() -> Severity {
    Severity::High
}

fn default_console_logging() -> bool {
    true
}

/// Configuration for the incident monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Capacity of the FIFO incident buffer.
    #[serde(default = "default_max_incidents")]
    pub max_incidents: usize,

    /// Emit a structured log line for every incident.
    #[serde(default = "default_console_logging")]
    pub console_logging: bool,

    /// URL receiving `{incident, summary}` reports. `None` disables
    /// remote reporting.
    #[serde(default)]
    pub reporting_endpoint: Option<String>,

    /// Minimum severity that triggers a report.
    #[serde(default = "default_reporting_threshold")]
    pub reporting_threshold: Severity,

    /// Storage key holding the incident buffer.
    #[serde(default = "default_incident_key")]
    pub storage_key: String,

    /// Page URL stamped onto each incident, when known.
    #[serde(default)]
    pub page_url: Option<String>,

    /// User agent stamped onto each incident, when known.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_incidents: default_max_incidents(),
            console_logging: default_console_logging(),
            reporting_endpoint: None,
            reporting_threshold: default_reporting_threshold(),
            storage_key: default_incident_key(),
            page_url: None,
            user_agent: None,
        }
    }
}

impl MonitorConfig {
    /// Preset with remote reporting enabled at the given endpoint.
    pub fn reporting(endpoint: impl Into<String>) -> Self {
        Self {
            reporting_endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }
}

// =============================================================================
// INCIDENT MONITOR
// =============================================================================

/// Bounded incident log with automatic severity classification and
/// threshold-gated, fire-and-forget remote reporting.
#[derive(Clone)]
pub struct IncidentMonitor {
    config: MonitorConfig,
    storage: Arc<dyn Storage>,
    http: reqwest::Client,
}

impl std::fmt::Debug for IncidentMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncidentMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IncidentMonitor {
    /// Create a monitor with default configuration.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, MonitorConfig::default())
    }

    /// Create a monitor with custom configuration.
    pub fn with_config(storage: Arc<dyn Storage>, config: MonitorConfig) -> Self {
        Self {
            config,
            storage,
            http: reqwest::Client::new(),
        }
    }

    /// Access the active configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Record an incident.
    ///
    /// `severity: None` auto-classifies from the incident type. Details are
    /// redacted before storage. Never fails and never blocks; if reporting
    /// applies it runs as a detached task whose outcome is discarded.
    pub fn log(&self, incident_type: &str, details: Map<String, Value>, severity: Option<Severity>) {
        let severity = severity.unwrap_or_else(|| classify_severity(incident_type));
        let incident = SecurityIncident {
            incident_type: incident_type.to_string(),
            details: redact_details(details),
            timestamp: Utc::now(),
            url: self.config.page_url.clone(),
            user_agent: self.config.user_agent.clone(),
            severity,
        };

        if self.config.console_logging {
            match severity {
                Severity::Low => debug!(incident_type, %severity, "Security incident"),
                Severity::Medium => info!(incident_type, %severity, "Security incident"),
                _ => warn!(incident_type, %severity, "Security incident"),
            }
        }

        let mut incidents = self.load_incidents();
        incidents.push(incident.clone());
        if incidents.len() > self.config.max_incidents {
            let excess = incidents.len() - self.config.max_incidents;
            incidents.drain(..excess);
        }
        self.store_incidents(&incidents);

        if severity >= self.config.reporting_threshold {
            self.report(incident, self.summarize(&incidents));
        }
    }

    /// All stored incidents, oldest first.
    ///
    /// Each stored record is structurally validated; malformed entries are
    /// dropped rather than failing the read.
    pub fn incidents(&self) -> Vec<SecurityIncident> {
        self.load_incidents()
    }

    /// Stored incidents of the given type, oldest first.
    pub fn incidents_by_type(&self, incident_type: &str) -> Vec<SecurityIncident> {
        self.load_incidents()
            .into_iter()
            .filter(|i| i.incident_type == incident_type)
            .collect()
    }

    /// Stored incidents at the given severity, oldest first.
    pub fn incidents_by_severity(&self, severity: Severity) -> Vec<SecurityIncident> {
        self.load_incidents()
            .into_iter()
            .filter(|i| i.severity == severity)
            .collect()
    }

    /// Aggregate counts over the stored buffer.
    pub fn summary(&self) -> IncidentSummary {
        self.summarize(&self.load_incidents())
    }

    /// Drop every stored incident.
    pub fn clear_incidents(&self) {
        if let Err(e) = self.storage.remove(&self.config.storage_key) {
            warn!(error = %e, "Failed to clear incident buffer");
        }
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    fn load_incidents(&self) -> Vec<SecurityIncident> {
        let raw = match self.storage.get(&self.config.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Incident storage unavailable; starting empty");
                return Vec::new();
            }
        };

        let values: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, "Corrupt incident buffer; starting empty");
                return Vec::new();
            }
        };

        // Per-record validation: one malformed entry must not lose the rest.
        values
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<SecurityIncident>(v) {
                Ok(incident) => Some(incident),
                Err(e) => {
                    debug!(error = %e, "Dropping malformed incident record");
                    None
                }
            })
            .collect()
    }

    fn store_incidents(&self, incidents: &[SecurityIncident]) {
        let raw = match serde_json::to_string(incidents) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to encode incident buffer");
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.config.storage_key, &raw) {
            warn!(error = %e, "Failed to persist incident buffer");
        }
    }

    fn summarize(&self, incidents: &[SecurityIncident]) -> IncidentSummary {
        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut by_severity: HashMap<Severity, usize> = HashMap::new();
        for incident in incidents {
            *by_type.entry(incident.incident_type.clone()).or_default() += 1;
            *by_severity.entry(incident.severity).or_default() += 1;
        }
        IncidentSummary {
            total: incidents.len(),
            by_type,
            by_severity,
            earliest: incidents.iter().map(|i| i.timestamp).min(),
            latest: incidents.iter().map(|i| i.timestamp).max(),
        }
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    /// Dispatch a report as a detached task.
    ///
    /// Best-effort by contract: no timeout tuning, no retry, and the
    /// outcome is only visible in the debug log. Without a running tokio
    /// runtime the report is skipped.
    fn report(&self, incident: SecurityIncident, summary: IncidentSummary) {
        let endpoint = match &self.config.reporting_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => return,
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("No async runtime; skipping incident report");
                return;
            }
        };

        let client = self.http.clone();
        let payload = serde_json::json!({
            "incident": incident,
            "summary": summary,
        });

        handle.spawn(async move {
            match client.post(&endpoint).json(&payload).send().await {
                Ok(response) => {
                    debug!(status = %response.status(), "Incident report delivered")
                }
                Err(e) => debug!(error = %e, "Incident report failed"),
            }
        });
    }
}

/// Redact credential-like keys and truncate oversized string values.
fn redact_details(details: Map<String, Value>) -> Map<String, Value> {
    details
        .into_iter()
        .map(|(key, value)| {
            let lower = key.to_lowercase();
            if SENSITIVE_KEY_FRAGMENTS.iter().any(|f| lower.contains(f)) {
                return (key, Value::String(REDACTION_MARKER.to_string()));
            }
            let value = match value {
                Value::String(s) if s.chars().count() > DETAIL_VALUE_MAX_LEN => {
                    let truncated: String = s.chars().take(DETAIL_VALUE_MAX_LEN).collect();
                    Value::String(format!("{}...", truncated))
                }
                other => other,
            };
            (key, value)
        })
        .collect()
}

// =============================================================================
// UNIT TESTS
// =============================================================================
