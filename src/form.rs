//! Guarded form submission orchestration for the vigil security core.
//!
//! Wires the validator, rate limiter, and incident monitor into one
//! submission flow:
//!
//! ```text
//! submit(form)
//!   ├── check_limit()          blocked ──► log RATE_LIMIT_EXCEEDED, bail
//!   ├── terms acceptance gate  missing ──► bail
//!   ├── required-field gate    empty   ──► bail with field messages
//!   ├── validate every field   high    ──► log HIGH_RISK_CONTENT, bail
//!   ├── sanitize every field
//!   ├── handler.submit(sanitized).await
//!   │     Ok  ──► record() + log FORM_SUBMIT_SUCCESS
//!   │     Err ──► log FORM_SUBMISSION_ERROR, generic user message
//!   └── done
//! ```
//!
//! Error messages surfaced to the user never echo attacker-controlled
//! content or raw backend errors; the raw text lands only in the redacted
//! incident log.

use crate::monitor::{IncidentMonitor, Severity};
use crate::rate_limiter::RateLimiter;
use crate::sanitizer::FieldKind;
use crate::validator::Validator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

// =============================================================================
// FORM DATA
// =============================================================================

/// Raw contact-form input as received from the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub message: String,
    #[serde(default)]
    pub agree_to_terms: bool,
}

impl FormData {
    /// The validated fields, with their kinds. Phone is optional and only
    /// validated when present and non-empty.
    fn fields(&self) -> Vec<(&'static str, &str, FieldKind)> {
        let mut fields = vec![
            ("name", self.name.as_str(), FieldKind::Name),
            ("email", self.email.as_str(), FieldKind::Email),
            ("message", self.message.as_str(), FieldKind::Message),
        ];
        if let Some(phone) = &self.phone {
            if !phone.trim().is_empty() {
                fields.push(("phone", phone.as_str(), FieldKind::Phone));
            }
        }
        fields
    }
}

/// Sanitized form content handed to the submission callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub message: String,
}

// =============================================================================
// SUBMISSION CALLBACK
// =============================================================================

/// The external submission sink, supplied by the caller.
///
/// Receives only sanitized content. An `Err` triggers a MEDIUM
/// `FORM_SUBMISSION_ERROR` incident and a generic user-facing message; the
/// raw error text is captured only in the incident log.
#[async_trait]
pub trait SubmitHandler: Send + Sync {
    /// Deliver a sanitized form to the backing service.
    async fn submit(&self, form: &SanitizedForm) -> crate::Result<()>;
}

// =============================================================================
// OUTCOME
// =============================================================================

/// The result of one guarded submission attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The form was delivered.
    Accepted {
        /// Submissions left in the current rate-limit window.
        remaining_submissions: usize,
    },
    /// Blocked by the rate limit; not validated, not delivered.
    RateLimited {
        /// Minutes until the window frees a slot.
        time_until_reset: i64,
        /// Human-facing explanation.
        message: String,
    },
    /// Blocked by validation; not delivered.
    Rejected {
        /// One message per failing field, `(field, message)`.
        field_errors: Vec<(String, String)>,
    },
    /// Validation passed but delivery failed.
    Failed {
        /// Generic, non-leaking user-facing message.
        message: String,
    },
}

impl SubmitOutcome {
    /// Whether the form was delivered.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

// =============================================================================
// FORM GUARD
// =============================================================================

/// Orchestrates validation, rate limiting, and incident logging around an
/// external submission callback.
#[derive(Debug)]
pub struct FormGuard {
    validator: Validator,
    limiter: RateLimiter,
    monitor: IncidentMonitor,
}

impl FormGuard {
    /// Create a guard from its collaborators.
    pub fn new(validator: Validator, limiter: RateLimiter, monitor: IncidentMonitor) -> Self {
        Self {
            validator,
            limiter,
            monitor,
        }
    }

    /// Access the incident monitor.
    pub fn monitor(&self) -> &IncidentMonitor {
        &self.monitor
    }

    /// Access the rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run one guarded submission.
    ///
    /// Never returns `Err` for user-correctable conditions; those are
    /// encoded in [`SubmitOutcome`]. The submission is recorded against the
    /// rate limit only on successful delivery.
    pub async fn submit(&self, form: &FormData, handler: &dyn SubmitHandler) -> SubmitOutcome {
        let check = self.limiter.check_limit();
        if !check.allowed {
            let minutes = check.time_until_reset.unwrap_or(1);
            let mut details = Map::new();
            details.insert("timeUntilReset".into(), Value::from(minutes));
            self.monitor.log("RATE_LIMIT_EXCEEDED", details, None);
            return SubmitOutcome::RateLimited {
                time_until_reset: minutes,
                message: check.message,
            };
        }

        if !form.agree_to_terms {
            return SubmitOutcome::Rejected {
                field_errors: vec![(
                    "agreeToTerms".into(),
                    "Please accept the terms of service to continue.".into(),
                )],
            };
        }

        // Per-field required gate, then full validation. Empty findings and
        // blocking findings both surface as field messages; advisory
        // findings do not block.
        let mut field_errors: Vec<(String, String)> = Vec::new();
        let mut high_risk = false;
        for (name, value, kind) in form.fields() {
            let result = self.validator.validate(name, value, kind);
            if value.trim().is_empty() {
                field_errors.push((
                    name.to_string(),
                    result
                        .primary_message()
                        .unwrap_or("This field is required.")
                        .to_string(),
                ));
            } else if !result.is_valid {
                high_risk = true;
                field_errors.push((
                    name.to_string(),
                    result
                        .primary_message()
                        .unwrap_or("This field contains invalid content.")
                        .to_string(),
                ));
            }
        }

        if !field_errors.is_empty() {
            if high_risk {
                let mut details = Map::new();
                details.insert(
                    "fields".into(),
                    Value::from(
                        field_errors
                            .iter()
                            .map(|(f, _)| f.as_str())
                            .collect::<Vec<_>>(),
                    ),
                );
                self.monitor
                    .log("HIGH_RISK_CONTENT", details, Some(Severity::High));
                warn!(
                    fields = field_errors.len(),
                    "Submission blocked: high-risk content"
                );
            }
            return SubmitOutcome::Rejected { field_errors };
        }

        let sanitized = SanitizedForm {
            name: self.validator.sanitizer().sanitize(&form.name, FieldKind::Name),
            email: self
                .validator
                .sanitizer()
                .sanitize(&form.email, FieldKind::Email),
            phone: form
                .phone
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .map(|p| self.validator.sanitizer().sanitize(p, FieldKind::Phone)),
            message: self
                .validator
                .sanitizer()
                .sanitize(&form.message, FieldKind::Message),
        };

        match handler.submit(&sanitized).await {
            Ok(()) => {
                self.limiter.record();
                self.monitor
                    .log("FORM_SUBMIT_SUCCESS", Map::new(), Some(Severity::Low));
                let remaining = self.limiter.check_limit().remaining_submissions;
                info!(remaining, "Form submission delivered");
                SubmitOutcome::Accepted {
                    remaining_submissions: remaining,
                }
            }
            Err(e) => {
                debug!(error = %e, "Submission callback failed");
                let mut details = Map::new();
                details.insert("error".into(), Value::from(e.to_string()));
                self.monitor
                    .log("FORM_SUBMISSION_ERROR", details, Some(Severity::Medium));
                SubmitOutcome::Failed {
                    message: "Something went wrong sending your message. Please try again later."
                        .into(),
                }
            }
        }
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::RateLimitConfig;
    use crate::storage::{ManualClock, MemoryStore, Storage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    impl RecordingHandler {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl SubmitHandler for RecordingHandler {
        async fn submit(&self, _form: &SanitizedForm) -> crate::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::Error::Submission("backend said no".into()))
            } else {
                Ok(())
            }
        }
    }

    fn guard() -> FormGuard {
        guard_with_clock(Arc::new(ManualClock::new(1_000_000))).0
    }

    fn guard_with_clock(clock: Arc<ManualClock>) -> (FormGuard, Arc<dyn Storage>) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        let limiter =
            RateLimiter::with_clock(storage.clone(), RateLimitConfig::default(), clock);
        let monitor = IncidentMonitor::new(storage.clone());
        (
            FormGuard::new(Validator::new(), limiter, monitor),
            storage,
        )
    }

    fn valid_form() -> FormData {
        FormData {
            name: "John".into(),
            email: "john@example.com".into(),
            phone: Some("1234567890".into()),
            message: "This is a test message.".into(),
            agree_to_terms: true,
        }
    }

    // -------------------------------------------------------------------------
    // Happy Path Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_valid_form_accepted() {
        let g = guard();
        let handler = RecordingHandler::ok();
        let outcome = g.submit(&valid_form(), &handler).await;
        assert!(outcome.is_accepted());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(g.monitor().incidents_by_type("FORM_SUBMIT_SUCCESS").len(), 1);
    }

    #[tokio::test]
    async fn test_handler_receives_sanitized_content() {
        use std::sync::Mutex;

        struct CapturingHandler(Mutex<Option<SanitizedForm>>);

        #[async_trait]
        impl SubmitHandler for CapturingHandler {
            async fn submit(&self, form: &SanitizedForm) -> crate::Result<()> {
                *self.0.lock().unwrap() = Some(form.clone());
                Ok(())
            }
        }

        let g = guard();
        let handler = CapturingHandler(Mutex::new(None));
        let mut form = valid_form();
        form.name = "  John  ".into();
        form.email = "John@Example.COM".into();
        g.submit(&form, &handler).await;

        let captured = handler.0.lock().unwrap().clone().unwrap();
        assert_eq!(captured.name, "John");
        assert_eq!(captured.email, "john@example.com");
    }

    // -------------------------------------------------------------------------
    // Rate Limit Gate Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_fourth_submission_within_hour_blocked() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (g, _storage) = guard_with_clock(clock.clone());
        let handler = RecordingHandler::ok();

        for _ in 0..3 {
            let outcome = g.submit(&valid_form(), &handler).await;
            assert!(outcome.is_accepted());
            clock.advance(60_000);
        }

        let outcome = g.submit(&valid_form(), &handler).await;
        match outcome {
            SubmitOutcome::RateLimited {
                time_until_reset, ..
            } => assert!(time_until_reset > 0),
            other => panic!("expected rate limit, got {:?}", other),
        }
        // Blocked attempt never reached the handler
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            g.monitor().incidents_by_type("RATE_LIMIT_EXCEEDED").len(),
            1
        );
    }

    #[tokio::test]
    async fn test_rate_limit_incident_is_critical() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (g, _storage) = guard_with_clock(clock);
        let handler = RecordingHandler::ok();
        for _ in 0..4 {
            g.submit(&valid_form(), &handler).await;
        }
        let incidents = g.monitor().incidents_by_type("RATE_LIMIT_EXCEEDED");
        assert_eq!(incidents[0].severity, Severity::Critical);
    }

    // -------------------------------------------------------------------------
    // Validation Gate Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_terms_gate() {
        let g = guard();
        let handler = RecordingHandler::ok();
        let mut form = valid_form();
        form.agree_to_terms = false;

        let outcome = g.submit(&form, &handler).await;
        match outcome {
            SubmitOutcome::Rejected { field_errors } => {
                assert_eq!(field_errors[0].0, "agreeToTerms");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_required_field_rejected() {
        let g = guard();
        let handler = RecordingHandler::ok();
        let mut form = valid_form();
        form.message = "   ".into();

        let outcome = g.submit(&form, &handler).await;
        match outcome {
            SubmitOutcome::Rejected { field_errors } => {
                assert!(field_errors.iter().any(|(f, _)| f == "message"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        // Empty fields are user mistakes, not attacks
        assert!(g.monitor().incidents_by_type("HIGH_RISK_CONTENT").is_empty());
    }

    #[tokio::test]
    async fn test_xss_payload_rejected_and_logged() {
        let g = guard();
        let handler = RecordingHandler::ok();
        let mut form = valid_form();
        form.message = "<script>alert(1)</script>".into();

        let outcome = g.submit(&form, &handler).await;
        assert!(!outcome.is_accepted());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(g.monitor().incidents_by_type("HIGH_RISK_CONTENT").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_phone_is_fine() {
        let g = guard();
        let handler = RecordingHandler::ok();
        let mut form = valid_form();
        form.phone = None;
        assert!(g.submit(&form, &handler).await.is_accepted());
    }

    #[tokio::test]
    async fn test_disposable_email_still_accepted() {
        // Advisory findings must not block.
        let g = guard();
        let handler = RecordingHandler::ok();
        let mut form = valid_form();
        form.email = "john@mailinator.com".into();
        assert!(g.submit(&form, &handler).await.is_accepted());
    }

    // -------------------------------------------------------------------------
    // Delivery Failure Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_handler_failure_is_generic_and_logged() {
        let g = guard();
        let handler = RecordingHandler::failing();

        let outcome = g.submit(&valid_form(), &handler).await;
        match outcome {
            SubmitOutcome::Failed { message } => {
                // Generic message, no backend detail leaked
                assert!(!message.contains("backend said no"));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let incidents = g.monitor().incidents_by_type("FORM_SUBMISSION_ERROR");
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].severity, Severity::Medium);
        // Raw error text lands only in the incident log
        assert!(incidents[0].details["error"]
            .as_str()
            .unwrap()
            .contains("backend said no"));
    }

    #[tokio::test]
    async fn test_failed_delivery_not_counted_against_limit() {
        let g = guard();
        let failing = RecordingHandler::failing();
        for _ in 0..5 {
            g.submit(&valid_form(), &failing).await;
        }
        // Budget untouched: a working handler still gets through
        let ok = RecordingHandler::ok();
        assert!(g.submit(&valid_form(), &ok).await.is_accepted());
    }
}
