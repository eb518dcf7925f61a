//! Centralized constants for the vigil security core.
//!
//! This module provides a single source of truth for default values and
//! detection thresholds used throughout the crate. The anomaly-detection
//! thresholds are carried from field observation without formal calibration;
//! they are defaults for the corresponding config fields, not fixed limits.

// ============================================================================
// Field Length Limits
// ============================================================================

/// Maximum length for name fields.
pub const MAX_NAME_LEN: usize = 50;

/// Maximum length for email fields (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 254;

/// Maximum length for phone fields (formatted, before digit stripping).
pub const MAX_PHONE_LEN: usize = 20;

/// Maximum length for free-text message fields.
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Minimum digit count for a plausible phone number.
pub const MIN_PHONE_DIGITS: usize = 7;

/// Maximum digit count for a plausible phone number (E.164).
pub const MAX_PHONE_DIGITS: usize = 15;

/// Run length of identical characters treated as a spam indicator.
pub const SPAM_RUN_LEN: usize = 6;

// ============================================================================
// Rate Limiting Defaults
// ============================================================================

/// Default maximum submissions per window.
pub const DEFAULT_MAX_SUBMISSIONS: usize = 3;

/// Default sliding window length in milliseconds (1 hour).
pub const DEFAULT_TIME_WINDOW_MS: i64 = 60 * 60 * 1000;

/// Default storage key for the submission timestamp list.
pub const DEFAULT_RATE_LIMIT_KEY: &str = "form_submissions";

// ============================================================================
// Incident Monitoring Defaults
// ============================================================================

/// Default capacity of the bounded incident buffer.
pub const DEFAULT_MAX_INCIDENTS: usize = 10;

/// Default storage key for the incident buffer.
pub const DEFAULT_INCIDENT_KEY: &str = "security_incidents";

/// Maximum stored length for string detail values before truncation.
pub const DETAIL_VALUE_MAX_LEN: usize = 200;

/// Replacement marker for redacted detail values.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Detail keys containing any of these substrings are redacted.
pub const SENSITIVE_KEY_FRAGMENTS: [&str; 5] = ["password", "token", "secret", "key", "auth"];

// ============================================================================
// Interaction Anomaly Detection Defaults
// ============================================================================

/// Default capacity of the interaction event ring buffer.
pub const DEFAULT_INTERACTION_BUFFER: usize = 50;

/// Default rapid-request threshold (interactions per minute).
pub const DEFAULT_RAPID_REQUEST_THRESHOLD: usize = 10;

/// Trailing window for rapid-request counting, in milliseconds.
pub const RAPID_REQUEST_WINDOW_MS: i64 = 60 * 1000;

/// Default trailing window for batch pattern analysis (5 minutes).
pub const DEFAULT_PATTERN_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Minimum same-type sample size before timing variance is evaluated.
pub const DEFAULT_MIN_CLICK_SAMPLE: usize = 5;

/// Inter-arrival variance (ms^2) below which clicking is classed as automated.
pub const DEFAULT_AUTOMATION_VARIANCE: f64 = 100.0;

/// Consecutive gaps shorter than this (ms) count as scripted-replay gaps.
pub const RAPID_GAP_MS: i64 = 100;

/// Business hours range (inclusive), local hour-of-day.
pub const BUSINESS_HOURS: (u32, u32) = (9, 17);

/// Share of one interaction type above which dominance is flagged.
pub const TYPE_DOMINANCE_RATIO: f64 = 0.8;

/// Share of in-business-hours interactions below which off-hours is flagged.
pub const BUSINESS_HOURS_RATIO: f64 = 0.3;

/// Share of sub-100ms gaps above which scripted replay is flagged.
pub const RAPID_SEQUENCE_RATIO: f64 = 0.5;

/// API request count above which usage severity is raised to HIGH.
pub const API_USAGE_HIGH_COUNT: u64 = 1000;

/// API request count above which usage severity is raised to MEDIUM.
pub const API_USAGE_MEDIUM_COUNT: u64 = 100;

/// Number of API-key characters preserved in exposure incidents.
pub const API_KEY_PREFIX_LEN: usize = 8;

// ============================================================================
// Domain Lists
// ============================================================================

/// Disposable email providers matched as domain substrings (advisory only).
pub const DISPOSABLE_DOMAINS: [&str; 5] =
    ["tempmail", "throwaway", "guerrilla", "10minute", "mailinator"];

/// Map CDN domains used to classify CSP violations as map-related.
pub const MAP_CDN_DOMAINS: [&str; 5] = [
    "maps.googleapis.com",
    "maps.gstatic.com",
    "google.com",
    "googleapis.com",
    "gstatic.com",
];
