//! Field validation and risk aggregation for the vigil security core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FieldValidator                         │
//! │                                                             │
//! │  value ──► required ──► length ──► content rules ──► struct │
//! │             check        check     (ordered list)    checks │
//! │                                          │              │   │
//! │                                          ▼              ▼   │
//! │                                   Risk findings ── aggregate│
//! │                                                       │     │
//! │                              ValidationResult ◄───────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Content detectors are an ordered, pluggable list of regex rules so a
//! heuristic can be added or tuned without touching the aggregation logic.
//! Every detector is non-throwing: malformed input always yields a
//! well-formed [`ValidationResult`], never an error.
//!
//! Aggregation invariants:
//! - `risk_level` is the maximum level among the findings, or `None`.
//! - `is_valid` is true iff no finding is `High`. Advisory findings
//!   (`Low`/`Medium`) never block on their own.
//! - `sanitized_value` is computed unconditionally, so callers can echo or
//!   log a safe rendition of the input even when validation fails.

use crate::constants::{
    DISPOSABLE_DOMAINS, MAX_PHONE_DIGITS, MIN_PHONE_DIGITS, SPAM_RUN_LEN,
};
use crate::sanitizer::{FieldKind, Sanitizer};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// =============================================================================
// REGEX PATTERNS
// =============================================================================

/// Health/medical vocabulary the business may not respond to.
/// Wellness marketing cannot render medical advice, so free text carrying
/// these terms is blocked outright.
const MEDICAL_TERMS_PATTERN: &str = r"(?i)\b(diagnosis|prescription|medication|cure|treat|medical|doctor|physician|disease|illness|condition)\b";

/// SQL injection heuristic: statement keywords, comment markers, statement
/// terminators, quoting characters, stored-procedure prefixes, and the
/// classic tautology.
const SQL_INJECTION_PATTERN: &str = "(?i)\\b(?:SELECT|INSERT|UPDATE|DELETE|DROP|UNION|CREATE|ALTER|EXEC|EXECUTE)\\b|--|/\\*|\\*/|;|['\"`]|\\bxp_|\\bsp_|\\bOR\\s+1\\s*=\\s*1\\b";

/// XSS heuristic: script-capable elements, script protocols, inline event
/// handlers, and dynamic-evaluation forms.
const XSS_PATTERN: &str = r"(?i)<script|<iframe|<object|<embed|javascript\s*:|vbscript\s*:|data:text/html|\bon\w+\s*=|eval\s*\(|expression\s*\(";

/// Email header injection: raw or URL-encoded line breaks plus SMTP/MIME
/// header names an attacker would smuggle into a single-line field.
const EMAIL_INJECTION_PATTERN: &str =
    r"(?i)\r|\n|%0a|%0d|bcc:|cc:|to:|from:|subject:|reply-to:|content-type:|mime-version:";

/// Structural email shape: one local part, one domain, a TLD of 2+ letters.
const EMAIL_FORMAT_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// Separators tolerated in formatted phone numbers.
const PHONE_SEPARATOR_PATTERN: &str = r"[\s\-().]";

/// Shape of a phone number after separator stripping.
const PHONE_SHAPE_PATTERN: &str = r"^\+?\d+$";

// =============================================================================
// RISK TYPES
// =============================================================================

/// Severity of a single validation finding.
///
/// Ordered so that aggregation can take a maximum: `None < Low < Medium <
/// High`. Only `High` blocks submission; `Low` and `Medium` are advisory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// No findings.
    #[default]
    None,
    /// Informational finding.
    Low,
    /// Advisory finding; worth recording, does not block.
    Medium,
    /// Blocking finding; the value must not be accepted.
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// A single detected concern about an input value.
///
/// Request-scoped: produced per validation call and discarded after use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    /// Severity of this finding.
    pub level: RiskLevel,
    /// Category identifier, e.g. `XSS_ATTEMPT` or `DISPOSABLE_EMAIL`.
    #[serde(rename = "type")]
    pub risk_type: String,
    /// Human-readable message, safe to show to the user.
    pub message: String,
}

impl Risk {
    /// Create a new risk finding.
    pub fn new(level: RiskLevel, risk_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            risk_type: risk_type.into(),
            message: message.into(),
        }
    }
}

/// The outcome of validating one field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True iff no finding is [`RiskLevel::High`].
    pub is_valid: bool,
    /// All findings, in detection order.
    pub risks: Vec<Risk>,
    /// The sanitized rendition of the input, computed unconditionally.
    pub sanitized_value: String,
    /// Maximum level among the findings, or `None`.
    pub risk_level: RiskLevel,
}

impl ValidationResult {
    fn from_findings(risks: Vec<Risk>, sanitized_value: String) -> Self {
        let risk_level = risks
            .iter()
            .map(|r| r.level)
            .max()
            .unwrap_or(RiskLevel::None);
        Self {
            is_valid: risk_level < RiskLevel::High,
            risks,
            sanitized_value,
            risk_level,
        }
    }

    /// The message of the highest-severity finding, if any.
    ///
    /// This is the message shown to the user when a field fails validation.
    pub fn primary_message(&self) -> Option<&str> {
        self.risks
            .iter()
            .max_by_key(|r| r.level)
            .map(|r| r.message.as_str())
    }
}

// =============================================================================
// RISK RULES
// =============================================================================

/// One content detector in the ordered rule list.
///
/// Rules are regex heuristics, inherently approximate; they are kept as
/// data so individual rules can be added or retuned without touching the
/// validator itself.
#[derive(Debug)]
pub struct RiskRule {
    /// Category identifier emitted with the finding.
    pub risk_type: &'static str,
    /// Severity of a match.
    pub level: RiskLevel,
    /// The detection pattern.
    pub pattern: Regex,
    /// Message emitted with the finding.
    pub message: &'static str,
    /// Restrict this rule to free-text fields.
    pub free_text_only: bool,
}

impl RiskRule {
    fn applies_to(&self, kind: FieldKind) -> bool {
        !self.free_text_only || kind.is_free_text()
    }
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Multi-layered field validator.
///
/// Runs, in order: required check, length check, the content rule list,
/// structural per-type checks, and the spam heuristic; then folds the
/// findings into a [`ValidationResult`]. All regexes are compiled once at
/// construction.
#[derive(Debug)]
pub struct Validator {
    sanitizer: Sanitizer,
    rules: Vec<RiskRule>,
    email_format: Regex,
    email_injection: Regex,
    phone_separators: Regex,
    phone_shape: Regex,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Create a validator with the built-in rule battery.
    pub fn new() -> Self {
        let rules = vec![
            RiskRule {
                risk_type: "MEDICAL_TERMS",
                level: RiskLevel::High,
                pattern: Regex::new(MEDICAL_TERMS_PATTERN).expect("Invalid medical terms pattern"),
                message: "Please avoid medical terminology. We provide wellness services, not medical treatment.",
                free_text_only: true,
            },
            RiskRule {
                risk_type: "SQL_INJECTION",
                level: RiskLevel::High,
                pattern: Regex::new(SQL_INJECTION_PATTERN)
                    .expect("Invalid SQL injection pattern"),
                message: "Invalid characters detected in input.",
                free_text_only: false,
            },
            RiskRule {
                risk_type: "XSS_ATTEMPT",
                level: RiskLevel::High,
                pattern: Regex::new(XSS_PATTERN).expect("Invalid XSS pattern"),
                message: "Invalid content detected in input.",
                free_text_only: false,
            },
        ];

        Self {
            sanitizer: Sanitizer::new(),
            rules,
            email_format: Regex::new(EMAIL_FORMAT_PATTERN).expect("Invalid email format pattern"),
            email_injection: Regex::new(EMAIL_INJECTION_PATTERN)
                .expect("Invalid email injection pattern"),
            phone_separators: Regex::new(PHONE_SEPARATOR_PATTERN)
                .expect("Invalid phone separator pattern"),
            phone_shape: Regex::new(PHONE_SHAPE_PATTERN).expect("Invalid phone shape pattern"),
        }
    }

    /// Append a custom content rule, evaluated after the built-in battery.
    pub fn with_rule(mut self, rule: RiskRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Access the sanitizer this validator uses.
    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Validate one field value.
    ///
    /// Never fails: any input, however malformed, yields a
    /// [`ValidationResult`].
    pub fn validate(&self, field_name: &str, value: &str, kind: FieldKind) -> ValidationResult {
        debug!(field = field_name, %kind, "Validating field");
        let sanitized = self.sanitizer.sanitize(value, kind);

        // Required check short-circuits: an empty field has exactly one
        // finding and runs no detectors.
        if value.trim().is_empty() {
            return ValidationResult::from_findings(
                vec![Risk::new(
                    RiskLevel::Medium,
                    "EMPTY_FIELD",
                    format!("The {} field is required.", field_name),
                )],
                sanitized,
            );
        }

        let mut risks = Vec::new();

        if value.chars().count() > kind.max_len() {
            risks.push(Risk::new(
                RiskLevel::Medium,
                "EXCESSIVE_LENGTH",
                format!(
                    "The {} field exceeds the maximum length of {} characters.",
                    field_name,
                    kind.max_len()
                ),
            ));
        }

        for rule in self.rules.iter().filter(|r| r.applies_to(kind)) {
            if rule.pattern.is_match(value) {
                risks.push(Risk::new(rule.level, rule.risk_type, rule.message));
            }
        }

        match kind {
            FieldKind::Email => self.check_email(value, &mut risks),
            FieldKind::Phone => self.check_phone(value, &mut risks),
            _ => {}
        }

        if kind.is_free_text() && has_spam_run(value) {
            risks.push(Risk::new(
                RiskLevel::Medium,
                "SPAM_PATTERN",
                "Message contains repeated characters that look like spam.",
            ));
        }

        let result = ValidationResult::from_findings(risks, sanitized);
        if !result.is_valid {
            warn!(
                field = field_name,
                risk_level = %result.risk_level,
                risk_count = result.risks.len(),
                "Field failed validation"
            );
        }
        result
    }

    /// Check whether any field of a form carries a blocking finding.
    ///
    /// Aggregate gate for guarded submission: the form is high-risk if any
    /// single field is.
    pub fn is_high_risk<'a, I>(&self, fields: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str, FieldKind)>,
    {
        fields
            .into_iter()
            .any(|(name, value, kind)| !self.validate(name, value, kind).is_valid)
    }

    // -------------------------------------------------------------------------
    // Structural checks
    // -------------------------------------------------------------------------

    fn check_email(&self, value: &str, risks: &mut Vec<Risk>) {
        let trimmed = value.trim();

        // Consecutive dots pass the shape regex but are invalid addresses.
        if !self.email_format.is_match(trimmed) || trimmed.contains("..") {
            risks.push(Risk::new(
                RiskLevel::High,
                "INVALID_EMAIL",
                "Please enter a valid email address.",
            ));
        }

        if let Some(domain) = trimmed.rsplit('@').next() {
            let domain = domain.to_lowercase();
            if DISPOSABLE_DOMAINS.iter().any(|d| domain.contains(d)) {
                // Advisory: disposable addresses are recorded but accepted.
                risks.push(Risk::new(
                    RiskLevel::Medium,
                    "DISPOSABLE_EMAIL",
                    "Disposable email addresses may not receive our replies.",
                ));
            }
        }

        if self.email_injection.is_match(value) {
            risks.push(Risk::new(
                RiskLevel::High,
                "EMAIL_INJECTION",
                "Invalid characters detected in email address.",
            ));
        }
    }

    fn check_phone(&self, value: &str, risks: &mut Vec<Risk>) {
        let cleaned = self.phone_separators.replace_all(value.trim(), "");

        if !self.phone_shape.is_match(&cleaned) {
            risks.push(Risk::new(
                RiskLevel::High,
                "INVALID_PHONE_FORMAT",
                "Please enter a valid phone number.",
            ));
            return;
        }

        let digits = cleaned.chars().filter(|c| c.is_ascii_digit()).count();
        if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
            risks.push(Risk::new(
                RiskLevel::High,
                "INVALID_PHONE_LENGTH",
                format!(
                    "Phone numbers must contain between {} and {} digits.",
                    MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
                ),
            ));
        }
    }
}

/// Detect a run of [`SPAM_RUN_LEN`] or more identical consecutive characters.
///
/// A hand scan rather than a backreference pattern; the run length counts
/// characters, not bytes.
fn has_spam_run(value: &str) -> bool {
    let mut run = 0usize;
    let mut prev: Option<char> = None;
    for c in value.chars() {
        if Some(c) == prev {
            run += 1;
            if run >= SPAM_RUN_LEN {
                return true;
            }
        } else {
            prev = Some(c);
            run = 1;
        }
    }
    false
}

// =============================================================================
// UNIT TESTS
// =============================================================================
