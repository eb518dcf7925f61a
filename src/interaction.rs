//! Interaction anomaly detection for the vigil security core.
//!
//! Specialization of [`IncidentMonitor`] for an embedded map widget:
//! buffers UI interaction events in a bounded ring and runs statistical and
//! heuristic pattern detection on every event.
//!
//! ## Detections
//!
//! | Check | Trigger | Incident |
//! |-------|---------|----------|
//! | Rapid requests | more than `rapid_request_threshold` events in 60s | HIGH `RAPID_REQUESTS` |
//! | Automated clicking | ≥ `min_click_sample` clicks with inter-arrival variance below `automation_variance_threshold` | HIGH `SUSPICIOUS_USAGE` |
//! | Geolocation access | any geolocation request | LOW `GEOLOCATION_REQUEST` |
//!
//! The automation check computes consecutive inter-arrival deltas of
//! same-type click events, then their mean and population variance.
//! Near-constant timing (tiny variance) is how scripts click; humans are
//! noisy. The variance bound is an empirical default carried as
//! configuration, not a fixed constant.
//!
//! Batch analysis ([`InteractionMonitor::interaction_patterns`]) buckets a
//! trailing window by type and hour-of-day and flags structural anomalies:
//! single-type dominance, off-hours concentration, and a high share of
//! sub-100ms gaps (scripted replay).
//!
//! Map lifecycle events (`log_map_load`, `log_api_usage`,
//! `log_csp_violation`, `log_domain_mismatch`) carry fixed severity
//! mappings and feed the same incident buffer.

use crate::constants::{
    API_KEY_PREFIX_LEN, API_USAGE_HIGH_COUNT, API_USAGE_MEDIUM_COUNT, BUSINESS_HOURS,
    BUSINESS_HOURS_RATIO, DEFAULT_AUTOMATION_VARIANCE, DEFAULT_INTERACTION_BUFFER,
    DEFAULT_MIN_CLICK_SAMPLE, DEFAULT_PATTERN_WINDOW_MS, DEFAULT_RAPID_REQUEST_THRESHOLD,
    MAP_CDN_DOMAINS, RAPID_GAP_MS, RAPID_REQUEST_WINDOW_MS, RAPID_SEQUENCE_RATIO,
    TYPE_DOMINANCE_RATIO,
};
use crate::monitor::{IncidentMonitor, Severity};
use crate::storage::{Clock, SystemClock};
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

// =============================================================================
// INTERACTION EVENTS
// =============================================================================

/// The class of a UI interaction with the map widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// A pointer click on the map.
    Click,
    /// A zoom gesture.
    Zoom,
    /// A pan/drag gesture.
    Drag,
    /// A request for the user's geolocation.
    GeolocationRequest,
}

impl InteractionKind {
    /// Get all interaction kinds.
    pub fn all() -> Vec<Self> {
        vec![
            Self::Click,
            Self::Zoom,
            Self::Drag,
            Self::GeolocationRequest,
        ]
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Click => write!(f, "click"),
            Self::Zoom => write!(f, "zoom"),
            Self::Drag => write!(f, "drag"),
            Self::GeolocationRequest => write!(f, "geolocation_request"),
        }
    }
}

/// One buffered interaction. Never persisted; the ring buffer is the only
/// home these events have.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// The interaction class.
    pub kind: InteractionKind,
    /// Epoch-millis instant of the interaction.
    pub timestamp_ms: i64,
    /// Map coordinates of the interaction, when applicable.
    pub coordinates: Option<(f64, f64)>,
    /// User agent of the interacting client, when known.
    pub user_agent: Option<String>,
}

// =============================================================================
// CONFIGURATION
// =============================================================================

fn default_buffer() -> usize {
    DEFAULT_INTERACTION_BUFFER
}

fn default_rapid_threshold() -> usize {
    DEFAULT_RAPID_REQUEST_THRESHOLD
}

fn default_pattern_window() -> i64 {
    DEFAULT_PATTERN_WINDOW_MS
}

fn default_min_click_sample() -> usize {
    DEFAULT_MIN_CLICK_SAMPLE
}

fn default_automation_variance() -> f64 {
    DEFAULT_AUTOMATION_VARIANCE
}

/// Tunable thresholds for interaction anomaly detection.
///
/// The defaults are carried from field observation without formal
/// calibration; hosts with traffic data should tune them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// Capacity of the interaction ring buffer.
    #[serde(default = "default_buffer")]
    pub max_interaction_buffer: usize,

    /// Events per minute above which rapid-request abuse is flagged.
    #[serde(default = "default_rapid_threshold")]
    pub rapid_request_threshold: usize,

    /// Trailing window for batch pattern analysis, in milliseconds.
    #[serde(default = "default_pattern_window")]
    pub pattern_window_ms: i64,

    /// Minimum same-type click sample before timing variance is evaluated.
    #[serde(default = "default_min_click_sample")]
    pub min_click_sample: usize,

    /// Inter-arrival variance (ms²) below which clicking is automated.
    #[serde(default = "default_automation_variance")]
    pub automation_variance_threshold: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            max_interaction_buffer: default_buffer(),
            rapid_request_threshold: default_rapid_threshold(),
            pattern_window_ms: default_pattern_window(),
            min_click_sample: default_min_click_sample(),
            automation_variance_threshold: default_automation_variance(),
        }
    }
}

// =============================================================================
// ANALYSIS RESULTS
// =============================================================================

/// Structural anomaly flags produced by batch pattern analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFlag {
    /// One interaction type makes up more than 80% of all events.
    SingleInteractionDominance,
    /// Less than 30% of events fall inside business hours.
    HighOffHoursActivity,
    /// More than half of consecutive gaps are under 100ms.
    RapidSequentialInteractions,
}

/// Output of [`InteractionMonitor::interaction_patterns`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionPatterns {
    /// Events inside the analysis window.
    pub total: usize,
    /// Event counts per interaction type.
    pub by_type: HashMap<String, usize>,
    /// Event counts per hour-of-day (UTC).
    pub by_hour: HashMap<u32, usize>,
    /// Structural anomalies detected in the window.
    pub flags: Vec<PatternFlag>,
}

/// Quota state reported alongside API usage figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaStatus {
    /// Usage comfortably inside quota.
    Ok,
    /// Usage approaching quota.
    Warning,
    /// Quota exhausted.
    Exceeded,
}

impl std::fmt::Display for QuotaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Exceeded => write!(f, "exceeded"),
        }
    }
}

/// Aggregate view over map-related incidents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapIncidentSummary {
    /// All stored incidents.
    pub total_incidents: usize,
    /// Stored `MAP_LOAD_FAILURE` incidents.
    pub load_failures: usize,
    /// Stored `CSP_VIOLATION` incidents.
    pub csp_violations: usize,
    /// Stored quota-related incidents.
    pub quota_issues: usize,
    /// Stored `SUSPICIOUS_USAGE` and `RAPID_REQUESTS` incidents.
    pub suspicious_activity: usize,
    /// Stored `GEOLOCATION_REQUEST` incidents.
    pub geolocation_requests: usize,
    /// Mean load time across successful map loads, if any were recorded.
    pub average_load_time_ms: Option<f64>,
}

// =============================================================================
// INTERACTION MONITOR
// =============================================================================

/// Statistical interaction anomaly detector feeding an [`IncidentMonitor`].
pub struct InteractionMonitor {
    config: InteractionConfig,
    monitor: IncidentMonitor,
    clock: Arc<dyn Clock>,
    buffer: Mutex<VecDeque<InteractionEvent>>,
}

impl std::fmt::Debug for InteractionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InteractionMonitor {
    /// Create a detector over the given incident monitor with default
    /// thresholds and the system clock.
    pub fn new(monitor: IncidentMonitor) -> Self {
        Self::with_config(monitor, InteractionConfig::default())
    }

    /// Create a detector with custom thresholds and the system clock.
    pub fn with_config(monitor: IncidentMonitor, config: InteractionConfig) -> Self {
        Self::with_clock(monitor, config, Arc::new(SystemClock))
    }

    /// Create a detector with an injected clock, for deterministic tests.
    pub fn with_clock(
        monitor: IncidentMonitor,
        config: InteractionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            monitor,
            clock,
            buffer: Mutex::new(VecDeque::new()),
        }
    }

    /// Access the underlying incident monitor.
    pub fn monitor(&self) -> &IncidentMonitor {
        &self.monitor
    }

    /// Access the active configuration.
    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    /// Record one interaction and run the per-event detections.
    pub fn record_interaction(
        &self,
        kind: InteractionKind,
        coordinates: Option<(f64, f64)>,
        user_agent: Option<&str>,
    ) {
        let now = self.clock.now_ms();
        let event = InteractionEvent {
            kind,
            timestamp_ms: now,
            coordinates,
            user_agent: user_agent.map(str::to_string),
        };

        let snapshot: Vec<InteractionEvent> = {
            let mut buffer = match self.buffer.lock() {
                Ok(buffer) => buffer,
                Err(poisoned) => poisoned.into_inner(),
            };
            buffer.push_back(event);
            while buffer.len() > self.config.max_interaction_buffer {
                buffer.pop_front();
            }
            buffer.iter().cloned().collect()
        };

        if kind == InteractionKind::GeolocationRequest {
            let mut details = Map::new();
            if let Some((lat, lng)) = coordinates {
                details.insert("latitude".into(), Value::from(lat));
                details.insert("longitude".into(), Value::from(lng));
            }
            self.monitor
                .log("GEOLOCATION_REQUEST", details, Some(Severity::Low));
        }

        self.check_rapid_requests(&snapshot, now, user_agent);
        self.check_automated_clicking(&snapshot, kind, now);
    }

    /// Batch analysis of the trailing pattern window.
    pub fn interaction_patterns(&self) -> InteractionPatterns {
        let now = self.clock.now_ms();
        let cutoff = now - self.config.pattern_window_ms;
        let window: Vec<InteractionEvent> = {
            let buffer = match self.buffer.lock() {
                Ok(buffer) => buffer,
                Err(poisoned) => poisoned.into_inner(),
            };
            buffer
                .iter()
                .filter(|e| e.timestamp_ms > cutoff)
                .cloned()
                .collect()
        };

        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut by_hour: HashMap<u32, usize> = HashMap::new();
        for event in &window {
            *by_type.entry(event.kind.to_string()).or_default() += 1;
            if let Some(hour) = hour_of_day(event.timestamp_ms) {
                *by_hour.entry(hour).or_default() += 1;
            }
        }

        let mut flags = Vec::new();
        let total = window.len();
        if total > 0 {
            let dominant = by_type.values().copied().max().unwrap_or(0);
            if dominant as f64 / total as f64 > TYPE_DOMINANCE_RATIO {
                flags.push(PatternFlag::SingleInteractionDominance);
            }

            let in_hours = window
                .iter()
                .filter_map(|e| hour_of_day(e.timestamp_ms))
                .filter(|&h| (BUSINESS_HOURS.0..=BUSINESS_HOURS.1).contains(&h))
                .count();
            if (in_hours as f64 / total as f64) < BUSINESS_HOURS_RATIO {
                flags.push(PatternFlag::HighOffHoursActivity);
            }

            if total > 1 {
                let rapid_gaps = window
                    .windows(2)
                    .filter(|pair| pair[1].timestamp_ms - pair[0].timestamp_ms < RAPID_GAP_MS)
                    .count();
                if rapid_gaps as f64 / (total - 1) as f64 > RAPID_SEQUENCE_RATIO {
                    flags.push(PatternFlag::RapidSequentialInteractions);
                }
            }
        }

        InteractionPatterns {
            total,
            by_type,
            by_hour,
            flags,
        }
    }

    // -------------------------------------------------------------------------
    // Per-event detections
    // -------------------------------------------------------------------------

    fn check_rapid_requests(
        &self,
        snapshot: &[InteractionEvent],
        now: i64,
        user_agent: Option<&str>,
    ) {
        let cutoff = now - RAPID_REQUEST_WINDOW_MS;
        let recent = snapshot.iter().filter(|e| e.timestamp_ms > cutoff).count();
        if recent > self.config.rapid_request_threshold {
            debug!(count = recent, "Rapid interaction rate detected");
            let mut details = Map::new();
            details.insert("interactionCount".into(), Value::from(recent));
            details.insert("timeWindow".into(), Value::from(RAPID_REQUEST_WINDOW_MS));
            if let Some(ua) = user_agent {
                details.insert("userAgent".into(), Value::from(ua));
            }
            self.monitor
                .log("RAPID_REQUESTS", details, Some(Severity::High));
        }
    }

    fn check_automated_clicking(
        &self,
        snapshot: &[InteractionEvent],
        kind: InteractionKind,
        now: i64,
    ) {
        if kind != InteractionKind::Click {
            return;
        }
        let cutoff = now - RAPID_REQUEST_WINDOW_MS;
        let clicks: Vec<i64> = snapshot
            .iter()
            .filter(|e| e.kind == InteractionKind::Click && e.timestamp_ms > cutoff)
            .map(|e| e.timestamp_ms)
            .collect();
        if clicks.len() < self.config.min_click_sample {
            return;
        }

        let deltas: Vec<f64> = clicks
            .windows(2)
            .map(|pair| (pair[1] - pair[0]) as f64)
            .collect();
        let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
        let variance =
            deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / deltas.len() as f64;

        if variance < self.config.automation_variance_threshold {
            debug!(mean, variance, "Near-constant click timing detected");
            let mut details = Map::new();
            details.insert("patternType".into(), Value::from("automated_clicking"));
            details.insert("interactionCount".into(), Value::from(clicks.len()));
            details.insert("averageInterval".into(), Value::from(mean));
            details.insert("variance".into(), Value::from(variance));
            self.monitor
                .log("SUSPICIOUS_USAGE", details, Some(Severity::High));
        }
    }

    // -------------------------------------------------------------------------
    // Map lifecycle events
    // -------------------------------------------------------------------------

    /// Record a map load outcome.
    ///
    /// A leaked API key is CRITICAL regardless of the load outcome; only a
    /// short prefix of the key is stored.
    pub fn log_map_load(
        &self,
        success: bool,
        load_time_ms: Option<f64>,
        exposed_api_key: Option<&str>,
        error: Option<&str>,
    ) {
        if let Some(key) = exposed_api_key {
            // The detail name must not look credential-like, or the
            // monitor's redaction pass would replace the prefix we
            // deliberately preserve.
            let prefix: String = key.chars().take(API_KEY_PREFIX_LEN).collect();
            let mut details = Map::new();
            details.insert("exposedPrefix".into(), Value::from(format!("{}...", prefix)));
            self.monitor
                .log("MAP_API_KEY_EXPOSED", details, Some(Severity::Critical));
        }

        if success {
            let mut details = Map::new();
            if let Some(ms) = load_time_ms {
                details.insert("loadTime".into(), Value::from(ms));
            }
            self.monitor
                .log("MAP_LOAD_SUCCESS", details, Some(Severity::Low));
        } else {
            let mut details = Map::new();
            if let Some(e) = error {
                details.insert("error".into(), Value::from(e));
            }
            self.monitor
                .log("MAP_LOAD_FAILURE", details, Some(Severity::Medium));
        }
    }

    /// Record map API usage figures.
    ///
    /// An exceeded quota logs two incidents: the usage record itself and a
    /// dedicated `MAP_QUOTA_EXCEEDED`, both CRITICAL.
    pub fn log_api_usage(&self, request_count: u64, quota_status: QuotaStatus) {
        let severity = match quota_status {
            QuotaStatus::Exceeded => Severity::Critical,
            QuotaStatus::Warning => Severity::High,
            QuotaStatus::Ok if request_count > API_USAGE_HIGH_COUNT => Severity::High,
            QuotaStatus::Ok if request_count > API_USAGE_MEDIUM_COUNT => Severity::Medium,
            QuotaStatus::Ok => Severity::Low,
        };

        let mut details = Map::new();
        details.insert("requestCount".into(), Value::from(request_count));
        details.insert("quotaStatus".into(), Value::from(quota_status.to_string()));
        self.monitor.log("MAP_API_USAGE", details, Some(severity));

        if quota_status == QuotaStatus::Exceeded {
            let mut details = Map::new();
            details.insert("requestCount".into(), Value::from(request_count));
            self.monitor
                .log("MAP_QUOTA_EXCEEDED", details, Some(Severity::Critical));
        }
    }

    /// Record a Content-Security-Policy violation.
    ///
    /// Always HIGH; the blocked URI is matched against known map CDN
    /// domains so map breakage can be told apart from unrelated violations.
    pub fn log_csp_violation(&self, blocked_uri: &str, violated_directive: &str) {
        let is_map_related = MAP_CDN_DOMAINS.iter().any(|d| blocked_uri.contains(d));
        let mut details = Map::new();
        details.insert("blockedUri".into(), Value::from(blocked_uri));
        details.insert("violatedDirective".into(), Value::from(violated_directive));
        details.insert("isMapRelated".into(), Value::from(is_map_related));
        self.monitor
            .log("CSP_VIOLATION", details, Some(Severity::High));
    }

    /// Record a map served under an unexpected domain.
    pub fn log_domain_mismatch(&self, expected: &str, actual: &str, referrer: Option<&str>) {
        let mut details = Map::new();
        details.insert("expectedDomain".into(), Value::from(expected));
        details.insert("actualDomain".into(), Value::from(actual));
        if let Some(r) = referrer {
            details.insert("referrer".into(), Value::from(r));
        }
        self.monitor
            .log("DOMAIN_MISMATCH", details, Some(Severity::High));
    }

    /// Aggregate the stored buffer from the map widget's point of view.
    pub fn map_incident_summary(&self) -> MapIncidentSummary {
        let incidents = self.monitor.incidents();

        let count = |t: &str| incidents.iter().filter(|i| i.incident_type == t).count();

        let load_times: Vec<f64> = incidents
            .iter()
            .filter(|i| i.incident_type == "MAP_LOAD_SUCCESS")
            .filter_map(|i| i.details.get("loadTime").and_then(Value::as_f64))
            .collect();

        MapIncidentSummary {
            total_incidents: incidents.len(),
            load_failures: count("MAP_LOAD_FAILURE"),
            csp_violations: count("CSP_VIOLATION"),
            quota_issues: count("MAP_QUOTA_EXCEEDED"),
            suspicious_activity: count("SUSPICIOUS_USAGE") + count("RAPID_REQUESTS"),
            geolocation_requests: count("GEOLOCATION_REQUEST"),
            average_load_time_ms: if load_times.is_empty() {
                None
            } else {
                Some(load_times.iter().sum::<f64>() / load_times.len() as f64)
            },
        }
    }
}

/// UTC hour-of-day of an epoch-millis instant.
fn hour_of_day(timestamp_ms: i64) -> Option<u32> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).map(|dt| dt.hour())
}

// =============================================================================
// UNIT TESTS
// =============================================================================
