//! Tracing and logging setup for vigil.
//!
//! Provides structured logging with configurable output formats (pretty or
//! JSON) and environment-based log level filtering. Hosts that already run
//! their own subscriber can skip this module entirely; nothing in the crate
//! depends on it being called.
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil::tracing_setup::setup_logging;
//!
//! // Human-readable output (default)
//! setup_logging(false, "info");
//!
//! // JSON output for machine parsing
//! setup_logging(true, "debug");
//! ```

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Initialize the tracing subscriber with configurable format.
///
/// # Arguments
///
/// * `json` - If true, output logs in JSON format (for machine parsing).
///   If false, use human-readable pretty format.
/// * `default_level` - Default log level if RUST_LOG is not set.
///   Options: "error", "warn", "info", "debug", "trace"
///
/// # Environment Variables
///
/// - `RUST_LOG`: Override log level filter (e.g., "debug", "vigil=trace")
/// - `VIGIL_LOG_JSON`: Set to "1" or "true" to enable JSON output
pub fn setup_logging(json: bool, default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        );
        subscriber.init();
    } else {
        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        );
        subscriber.init();
    }
}

/// Check if JSON logging is requested via environment variable.
pub fn should_use_json() -> bool {
    std::env::var("VIGIL_LOG_JSON")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}
