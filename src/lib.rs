//! # vigil
//!
//! Client-side security validation and anomaly monitoring core.
//!
//! ## Overview
//!
//! vigil is the security layer of a public-facing contact surface: it
//! validates and sanitizes user input, rate-limits submissions, keeps a
//! bounded log of security incidents, and statistically detects automated
//! (bot) usage of an embedded map widget. It is a consumable library core;
//! it renders nothing and binds to no UI framework.
//!
//! ## Architecture
//!
//! ```text
//!                   form submission              map interaction
//!                         |                            |
//!                         v                            v
//! +------------------------------------+  +------------------------+
//! |            FormGuard               |  |  InteractionMonitor    |
//! |                                    |  |  (ring buffer +        |
//! |  RateLimiter --> Validator -->     |  |   variance analysis)   |
//! |  Sanitizer --> SubmitHandler       |  +------------------------+
//! +------------------------------------+              |
//!                         |                           |
//!                         v                           v
//!               +------------------------------------------+
//!               |             IncidentMonitor              |
//!               |  bounded FIFO buffer, severity classes,  |
//!               |  redaction, fire-and-forget reporting    |
//!               +------------------------------------------+
//!                         |
//!                         v
//!               Storage / Clock (injected seams)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil::{
//!     FormData, FormGuard, IncidentMonitor, MemoryStore, RateLimiter, Validator,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(MemoryStore::new());
//!     let guard = FormGuard::new(
//!         Validator::new(),
//!         RateLimiter::new(storage.clone()),
//!         IncidentMonitor::new(storage),
//!     );
//!
//!     let form = FormData {
//!         name: "John".into(),
//!         email: "john@example.com".into(),
//!         phone: None,
//!         message: "Hello!".into(),
//!         agree_to_terms: true,
//!     };
//!
//!     let outcome = guard.submit(&form, &my_handler).await;
//!     println!("accepted: {}", outcome.is_accepted());
//! }
//! ```
//!
//! ## Failure policy
//!
//! The crate is deliberately availability-first: storage faults fail open
//! (rate limiting and incident logging degrade, the user is never blocked),
//! incident reporting is fire-and-forget, and every validator and sanitizer
//! is non-throwing.

// Module declarations
pub mod config;
pub mod constants;
pub mod error;
pub mod form;
pub mod interaction;
pub mod monitor;
pub mod rate_limiter;
pub mod sanitizer;
pub mod storage;
pub mod tracing_setup;
pub mod validator;

// Re-exports for convenient access
pub use config::{
    Environment, MapSettings, MonitoringSettings, RateLimitSettings, SecurityConfig,
};
pub use error::{Error, Result};
pub use form::{FormData, FormGuard, SanitizedForm, SubmitHandler, SubmitOutcome};
pub use interaction::{
    InteractionConfig, InteractionEvent, InteractionKind, InteractionMonitor,
    InteractionPatterns, MapIncidentSummary, PatternFlag, QuotaStatus,
};
pub use monitor::{
    classify_severity, IncidentMonitor, IncidentSummary, MonitorConfig, SecurityIncident,
    Severity,
};
pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimitStatus, RateLimiter};
pub use sanitizer::{FieldKind, Sanitizer};
pub use storage::{Clock, ManualClock, MemoryStore, Storage, SystemClock};
pub use validator::{Risk, RiskLevel, RiskRule, ValidationResult, Validator};

/// Current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "vigil");
    }
}
