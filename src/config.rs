//! Typed security configuration for the vigil security core.
//!
//! One [`SecurityConfig`] value carries the monitoring, rate-limit, and
//! map-widget settings for a deployment environment. Presets exist for
//! development, staging, and production; `validate()` rejects combinations
//! that would silently weaken the security posture.
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil::config::{Environment, SecurityConfig};
//!
//! let config = SecurityConfig::for_environment(Environment::Production);
//! config.validate()?;
//! assert!(config.map.domain_allowed("maps.googleapis.com"));
//! ```

use crate::constants::{DEFAULT_MAX_INCIDENTS, DEFAULT_TIME_WINDOW_MS};
use crate::monitor::Severity;
use crate::{bail_if, Error, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Deployment environment selecting a configuration preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development: permissive limits, plain HTTP allowed.
    Development,
    /// Pre-production staging.
    Staging,
    /// Production: strict limits, HTTPS only, reporting on.
    #[default]
    Production,
}

impl Environment {
    /// Get all environments.
    pub fn all() -> Vec<Self> {
        vec![Self::Development, Self::Staging, Self::Production]
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(Error::Validation(format!(
                "Unknown environment: '{}'. Valid: development, staging, production",
                s
            ))),
        }
    }
}

// =============================================================================
// SETTING GROUPS
// =============================================================================

/// Incident monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSettings {
    /// Master switch for incident logging.
    pub enabled: bool,
    /// Minimum severity that triggers remote reporting.
    pub reporting_threshold: Severity,
    /// URL receiving incident reports, when configured.
    #[serde(default)]
    pub reporting_endpoint: Option<String>,
    /// Capacity of the incident buffer.
    pub max_incidents: usize,
}

/// Submission rate-limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSettings {
    /// Master switch for rate limiting.
    pub enabled: bool,
    /// Maximum submissions per window.
    pub max_submissions: usize,
    /// Window length in milliseconds.
    pub time_window_ms: i64,
}

/// Map widget security settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSettings {
    /// Domains the map may load resources from. `*.domain` entries match
    /// the base domain and any subdomain.
    pub allowed_domains: Vec<String>,
    /// Whether the map may request the user's geolocation.
    pub enable_geolocation: bool,
    /// Reject plain-HTTP map resources.
    pub restrict_to_https: bool,
}

impl MapSettings {
    /// Check a domain against the allowlist, honoring `*.` wildcards.
    pub fn domain_allowed(&self, domain: &str) -> bool {
        let domain = strip_protocol(domain);
        self.allowed_domains.iter().any(|allowed| {
            if let Some(base) = allowed.strip_prefix("*.") {
                domain == base || domain.ends_with(&format!(".{}", base))
            } else {
                domain == allowed
            }
        })
    }
}

fn strip_protocol(domain: &str) -> &str {
    domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain)
}

// =============================================================================
// SECURITY CONFIG
// =============================================================================

/// Complete security configuration for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// The environment this configuration targets.
    pub environment: Environment,
    /// Incident monitoring settings.
    pub monitoring: MonitoringSettings,
    /// Submission rate-limit settings.
    pub rate_limit: RateLimitSettings,
    /// Map widget settings.
    pub map: MapSettings,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Production)
    }
}

impl SecurityConfig {
    /// Build the preset configuration for an environment.
    pub fn for_environment(environment: Environment) -> Self {
        let mut config = Self {
            environment,
            monitoring: MonitoringSettings {
                enabled: true,
                reporting_threshold: match environment {
                    Environment::Production => Severity::High,
                    _ => Severity::Medium,
                },
                reporting_endpoint: None,
                max_incidents: DEFAULT_MAX_INCIDENTS,
            },
            rate_limit: RateLimitSettings {
                enabled: true,
                max_submissions: match environment {
                    Environment::Development => 10,
                    _ => 5,
                },
                time_window_ms: DEFAULT_TIME_WINDOW_MS,
            },
            map: MapSettings {
                allowed_domains: vec![
                    "maps.googleapis.com".to_string(),
                    "maps.gstatic.com".to_string(),
                    "*.googleapis.com".to_string(),
                    "*.gstatic.com".to_string(),
                    "*.google.com".to_string(),
                    "*.googleusercontent.com".to_string(),
                ],
                enable_geolocation: true,
                restrict_to_https: true,
            },
        };

        match environment {
            Environment::Development => {
                config.map.restrict_to_https = false;
                config
                    .map
                    .allowed_domains
                    .push("localhost".to_string());
            }
            Environment::Production => {
                config.monitoring.reporting_endpoint =
                    Some("/api/security/incidents".to_string());
            }
            Environment::Staging => {}
        }

        config
    }

    /// Reject configurations that would silently weaken the posture.
    pub fn validate(&self) -> Result<()> {
        bail_if!(
            self.monitoring.max_incidents == 0,
            Error::ConfigInvalidValue {
                key: "monitoring.maxIncidents".into(),
                details: "must be at least 1".into(),
            }
        );
        bail_if!(
            self.rate_limit.enabled && self.rate_limit.max_submissions == 0,
            Error::ConfigInvalidValue {
                key: "rateLimit.maxSubmissions".into(),
                details: "must be at least 1 while rate limiting is enabled".into(),
            }
        );
        bail_if!(
            self.rate_limit.enabled && self.rate_limit.time_window_ms <= 0,
            Error::ConfigInvalidValue {
                key: "rateLimit.timeWindowMs".into(),
                details: "must be positive".into(),
            }
        );
        bail_if!(
            self.map.allowed_domains.is_empty(),
            Error::ConfigInvalidValue {
                key: "map.allowedDomains".into(),
                details: "allowlist may not be empty".into(),
            }
        );

        for domain in &self.map.allowed_domains {
            let stripped = strip_protocol(domain).replace("*.", "");
            bail_if!(
                !stripped
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-'),
                Error::ConfigInvalidValue {
                    key: "map.allowedDomains".into(),
                    details: format!("invalid domain format: '{}'", domain),
                }
            );
        }

        if self.environment == Environment::Production {
            bail_if!(
                !self.map.restrict_to_https,
                Error::Config("production must restrict map resources to HTTPS".into())
            );
            bail_if!(
                self.map.allowed_domains.iter().any(|d| d.contains("localhost")),
                Error::Config("localhost domains are not allowed in production".into())
            );
        }

        Ok(())
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Preset Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_all_presets_validate() {
        for env in Environment::all() {
            let config = SecurityConfig::for_environment(env);
            assert!(config.validate().is_ok(), "{} preset invalid", env);
        }
    }

    #[test]
    fn test_development_is_permissive() {
        let config = SecurityConfig::for_environment(Environment::Development);
        assert_eq!(config.rate_limit.max_submissions, 10);
        assert!(!config.map.restrict_to_https);
        assert!(config.map.domain_allowed("localhost"));
        assert!(config.monitoring.reporting_endpoint.is_none());
    }

    #[test]
    fn test_production_is_strict() {
        let config = SecurityConfig::for_environment(Environment::Production);
        assert_eq!(config.rate_limit.max_submissions, 5);
        assert!(config.map.restrict_to_https);
        assert_eq!(
            config.monitoring.reporting_endpoint.as_deref(),
            Some("/api/security/incidents")
        );
        assert_eq!(config.monitoring.reporting_threshold, Severity::High);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(
            "Development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert!("qa".parse::<Environment>().is_err());
    }

    // -------------------------------------------------------------------------
    // Validation Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_zero_incidents_rejected() {
        let mut config = SecurityConfig::default();
        config.monitoring.max_incidents = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_submissions_rejected_only_when_enabled() {
        let mut config = SecurityConfig::default();
        config.rate_limit.max_submissions = 0;
        assert!(config.validate().is_err());
        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_rejects_http_and_localhost() {
        let mut config = SecurityConfig::for_environment(Environment::Production);
        config.map.restrict_to_https = false;
        assert!(config.validate().is_err());

        let mut config = SecurityConfig::for_environment(Environment::Production);
        config.map.allowed_domains.push("localhost".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_domain_rejected() {
        let mut config = SecurityConfig::default();
        config.map.allowed_domains.push("bad domain!".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bad domain!"));
    }

    // -------------------------------------------------------------------------
    // Domain Matching Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_exact_domain_match() {
        let config = SecurityConfig::default();
        assert!(config.map.domain_allowed("maps.googleapis.com"));
        assert!(!config.map.domain_allowed("evil.example.com"));
    }

    #[test]
    fn test_wildcard_matches_base_and_subdomains() {
        let config = SecurityConfig::default();
        assert!(config.map.domain_allowed("googleapis.com"));
        assert!(config.map.domain_allowed("fonts.googleapis.com"));
        assert!(config.map.domain_allowed("a.b.googleapis.com"));
        // Suffix similarity is not a subdomain
        assert!(!config.map.domain_allowed("evilgoogleapis.com"));
    }

    #[test]
    fn test_protocol_stripped_before_match() {
        let config = SecurityConfig::default();
        assert!(config.map.domain_allowed("https://maps.gstatic.com"));
    }
}
