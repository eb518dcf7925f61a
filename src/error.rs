//! Error types for the vigil security core.
//!
//! This module provides structured error handling with:
//! - Error codes for programmatic handling (E001-E099)
//! - User-safe messages that never echo attacker-controlled content
//! - Structured error types using thiserror
//!
//! # Error Code Ranges
//!
//! | Range | Category |
//! |-------|----------|
//! | E001-E009 | Configuration errors |
//! | E010-E019 | Validation errors |
//! | E020-E029 | Rate limit errors |
//! | E030-E039 | Storage errors |
//! | E040-E049 | Reporting/transport errors |
//! | E050-E059 | Submission errors |
//! | E090-E099 | Internal errors |
//!
//! Note that the detectors and sanitizers themselves are non-throwing by
//! contract: malformed input always yields a well-formed
//! [`ValidationResult`](crate::validator::ValidationResult), never an error.
//! The variants here cover configuration, storage, and transport faults.
//!
//! ## Macros
//!
//! The [`bail_if!`] macro provides early return on condition:
//!
//! ```ignore
//! use vigil::error::{bail_if, Error, Result};
//!
//! fn validate_max(value: usize) -> Result<()> {
//!     bail_if!(value == 0, Error::Config("value must be positive".into()));
//!     Ok(())
//! }
//! ```

use thiserror::Error;

// =============================================================================
// BAIL_IF MACRO
// =============================================================================

/// Early return if condition is true.
///
/// Simplifies conditional error returns for validation and guard clauses.
///
/// # Examples
///
/// ```ignore
/// use vigil::error::{bail_if, Error, Result};
///
/// fn check(max_incidents: usize) -> Result<()> {
///     bail_if!(max_incidents == 0, Error::Config("maxIncidents must be at least 1".into()));
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail_if {
    ($cond:expr, $err:expr) => {
        if $cond {
            return Err($err);
        }
    };
}

// Re-export for convenience
pub use bail_if;

// =============================================================================
// ERROR TYPE
// =============================================================================

/// The main error type for the vigil security core.
///
/// Each variant includes an error code prefix for easy identification
/// and programmatic handling. Use the `suggestion()` method to get
/// actionable guidance for resolving the error.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // CONFIGURATION ERRORS (E001-E009)
    // =========================================================================
    /// General configuration error.
    #[error("[E001] Configuration error: {0}")]
    Config(String),

    /// Configuration value is invalid.
    #[error("[E002] Invalid configuration value for '{key}': {details}")]
    ConfigInvalidValue { key: String, details: String },

    // =========================================================================
    // VALIDATION ERRORS (E010-E019)
    // =========================================================================
    /// General validation error.
    #[error("[E010] Validation error: {0}")]
    Validation(String),

    /// A required field was empty or whitespace-only.
    #[error("[E011] Required field is empty: {field}")]
    EmptyField { field: String },

    /// Aggregate content risk was too high to submit.
    #[error("[E012] Submission blocked: content flagged as high risk")]
    HighRiskContent,

    // =========================================================================
    // RATE LIMIT ERRORS (E020-E029)
    // =========================================================================
    /// The submission rate limit is exhausted.
    #[error("[E020] Rate limit exceeded; retry in {minutes} minute(s)")]
    RateLimited { minutes: i64 },

    // =========================================================================
    // STORAGE ERRORS (E030-E039)
    // =========================================================================
    /// The backing key-value store failed.
    #[error("[E030] Storage error: {0}")]
    Storage(String),

    /// Persisted state could not be decoded.
    #[error("[E031] Corrupt persisted state: {0}")]
    CorruptState(#[from] serde_json::Error),

    // =========================================================================
    // REPORTING/TRANSPORT ERRORS (E040-E049)
    // =========================================================================
    /// The incident reporting transport failed.
    ///
    /// Never propagated to callers of `log()`; surfaced only through the
    /// debug log of the detached reporting task.
    #[error("[E040] Reporting transport error: {0}")]
    Transport(#[from] reqwest::Error),

    // =========================================================================
    // SUBMISSION ERRORS (E050-E059)
    // =========================================================================
    /// The caller-supplied submission callback failed.
    #[error("[E050] Submission failed: {0}")]
    Submission(String),

    // =========================================================================
    // INTERNAL ERRORS (E090-E099)
    // =========================================================================
    /// Unexpected internal error.
    #[error("[E090] Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get an actionable suggestion for resolving this error, if any.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) | Self::ConfigInvalidValue { .. } => {
                Some("Check the SecurityConfig values; use an environment preset as a baseline")
            }
            Self::EmptyField { .. } => Some("Fill in the required field and resubmit"),
            Self::HighRiskContent => {
                Some("Remove markup, script fragments, and SQL-like syntax from the input")
            }
            Self::RateLimited { .. } => Some("Wait for the window to roll over before retrying"),
            Self::Storage(_) | Self::CorruptState(_) => {
                Some("Rate limiting and incident logging fail open; no user action required")
            }
            Self::Transport(_) => Some(
                "Incident reporting is best-effort; verify the reporting endpoint if reports are missing",
            ),
            _ => None,
        }
    }

    /// Check if this error represents an expected, user-correctable condition.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::EmptyField { .. } | Self::RateLimited { .. }
        )
    }
}

/// Convenient Result type alias for vigil operations.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// UNIT TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        assert!(Error::Config("bad".into()).to_string().starts_with("[E001]"));
        assert!(Error::Validation("bad".into())
            .to_string()
            .starts_with("[E010]"));
        assert!(Error::RateLimited { minutes: 5 }
            .to_string()
            .starts_with("[E020]"));
        assert!(Error::Storage("down".into())
            .to_string()
            .starts_with("[E030]"));
    }

    #[test]
    fn test_rate_limited_message_contains_minutes() {
        let err = Error::RateLimited { minutes: 42 };
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_suggestions() {
        assert!(Error::Config("x".into()).suggestion().is_some());
        assert!(Error::HighRiskContent.suggestion().is_some());
        assert!(Error::Internal("x".into()).suggestion().is_none());
    }

    #[test]
    fn test_user_correctable() {
        assert!(Error::EmptyField {
            field: "name".into()
        }
        .is_user_correctable());
        assert!(Error::RateLimited { minutes: 1 }.is_user_correctable());
        assert!(!Error::Storage("down".into()).is_user_correctable());
        assert!(!Error::HighRiskContent.is_user_correctable());
    }

    #[test]
    fn test_corrupt_state_from_serde() {
        let parse_err = serde_json::from_str::<Vec<i64>>("not json").unwrap_err();
        let err: Error = parse_err.into();
        assert!(err.to_string().starts_with("[E031]"));
    }

    #[test]
    fn test_bail_if_macro() {
        fn guard(v: usize) -> Result<usize> {
            bail_if!(v == 0, Error::Config("zero".into()));
            Ok(v)
        }
        assert!(guard(0).is_err());
        assert_eq!(guard(3).unwrap(), 3);
    }
}
