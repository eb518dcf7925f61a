//! Sliding-window submission rate limiter for the vigil security core.
//!
//! Bounds form submissions to `max_submissions` per rolling `time_window_ms`
//! by retaining only recent submission timestamps in durable storage.
//!
//! ## Architecture
//!
//! ```text
//! +------------------+     +------------------+     +------------------+
//! |   check_limit()  | --> |  read + prune    | --> | RateLimitResult  |
//! |                  |     |  timestamp list  |     | (allow / block)  |
//! +------------------+     +------------------+     +------------------+
//!                                  |
//!                                  v
//!                         +------------------+
//!                         | Storage (keyed)  |
//!                         | JSON i64 array   |
//!                         +------------------+
//! ```
//!
//! Pruning is lazy: `record()` only appends, `check_limit()` drops expired
//! timestamps and persists the shrunken list. Independent limiter instances
//! must use distinct storage keys.
//!
//! ## Failure policy
//!
//! Every storage fault — corrupt JSON, quota exceeded, store unavailable —
//! is treated as an empty history. The limiter fails open: a legitimate
//! user is never blocked by an infrastructure error.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil::rate_limiter::RateLimiter;
//! use vigil::storage::MemoryStore;
//!
//! let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
//! let check = limiter.check_limit();
//! if check.allowed {
//!     // ... submit ...
//!     limiter.record();
//! } else {
//!     println!("{}", check.message);
//! }
//! ```

use crate::constants::{DEFAULT_MAX_SUBMISSIONS, DEFAULT_RATE_LIMIT_KEY, DEFAULT_TIME_WINDOW_MS};
use crate::storage::{Clock, Storage, SystemClock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// CONFIGURATION
// =============================================================================

fn default_max_submissions() -> usize {
    DEFAULT_MAX_SUBMISSIONS
}

fn default_time_window_ms() -> i64 {
    DEFAULT_TIME_WINDOW_MS
}

fn default_storage_key() -> String {
    DEFAULT_RATE_LIMIT_KEY.to_string()
}

/// Configuration for the sliding-window rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum submissions allowed inside one window.
    #[serde(default = "default_max_submissions")]
    pub max_submissions: usize,

    /// Length of the rolling window, in milliseconds.
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: i64,

    /// Storage key holding this limiter's timestamp list.
    ///
    /// Isolates independent limiter instances; two limiters sharing a key
    /// share a budget.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_submissions: default_max_submissions(),
            time_window_ms: default_time_window_ms(),
            storage_key: default_storage_key(),
        }
    }
}

impl RateLimitConfig {
    /// Permissive preset for development environments.
    pub fn permissive() -> Self {
        Self {
            max_submissions: 10,
            ..Self::default()
        }
    }

    /// Strict preset for production contact forms.
    pub fn strict() -> Self {
        Self {
            max_submissions: 3,
            ..Self::default()
        }
    }

    /// Human-readable rendition of the window length.
    pub fn window_description(&self) -> String {
        let minutes = self.time_window_ms / 60_000;
        if minutes >= 60 && minutes % 60 == 0 {
            let hours = minutes / 60;
            format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
        } else {
            format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
        }
    }
}

// =============================================================================
// RESULT TYPES
// =============================================================================

/// Outcome of a [`RateLimiter::check_limit`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResult {
    /// Whether a submission may proceed now.
    pub allowed: bool,

    /// Submissions left in the current window.
    pub remaining_submissions: usize,

    /// Minutes until the oldest submission rolls out of the window.
    ///
    /// Only present when blocked; rounded up so "0 minutes" never shows
    /// while still blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_reset: Option<i64>,

    /// Human-facing explanation of the decision.
    pub message: String,
}

/// Introspection snapshot from [`RateLimiter::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Submissions currently inside the window.
    pub submissions: usize,
    /// Configured window budget.
    pub max_submissions: usize,
    /// Human-readable window length.
    pub window: String,
    /// Epoch-millis instant when the oldest submission expires, if any.
    pub next_reset_ms: Option<i64>,
}

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Sliding-window submission counter with durable, keyed state.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter with default configuration and the system clock.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, RateLimitConfig::default())
    }

    /// Create a limiter with custom configuration and the system clock.
    pub fn with_config(storage: Arc<dyn Storage>, config: RateLimitConfig) -> Self {
        Self {
            config,
            storage,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a limiter with an injected clock, for deterministic tests.
    pub fn with_clock(
        storage: Arc<dyn Storage>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            storage,
            clock,
        }
    }

    /// Access the active configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check whether a submission may proceed now.
    ///
    /// Prunes expired timestamps and persists the pruned list when it
    /// shrank. Storage faults yield an empty history (fail open).
    pub fn check_limit(&self) -> RateLimitResult {
        let now = self.clock.now_ms();
        let timestamps = self.load_timestamps();

        let cutoff = now - self.config.time_window_ms;
        let recent: Vec<i64> = timestamps
            .iter()
            .copied()
            .filter(|&t| t > cutoff && t <= now)
            .collect();

        if recent.len() < timestamps.len() {
            self.store_timestamps(&recent);
        }

        let remaining = self.config.max_submissions.saturating_sub(recent.len());

        if remaining == 0 {
            // recent is non-empty here: max_submissions >= 1 implies at
            // least one timestamp consumed the budget.
            let oldest = recent.iter().copied().min().unwrap_or(now);
            let reset_ms = (oldest + self.config.time_window_ms) - now;
            let minutes = div_ceil_minutes(reset_ms);
            debug!(
                key = %self.config.storage_key,
                minutes,
                "Submission blocked by rate limit"
            );
            return RateLimitResult {
                allowed: false,
                remaining_submissions: 0,
                time_until_reset: Some(minutes),
                message: format!(
                    "Too many submissions. Please try again in {} minute{}.",
                    minutes,
                    if minutes == 1 { "" } else { "s" }
                ),
            };
        }

        RateLimitResult {
            allowed: true,
            remaining_submissions: remaining,
            time_until_reset: None,
            message: format!(
                "{} submission{} remaining.",
                remaining,
                if remaining == 1 { "" } else { "s" }
            ),
        }
    }

    /// Record a successful submission at the current instant.
    ///
    /// Appends only; pruning is deferred to the next [`check_limit`](Self::check_limit).
    pub fn record(&self) {
        let now = self.clock.now_ms();
        let mut timestamps = self.load_timestamps();
        timestamps.push(now);
        self.store_timestamps(&timestamps);
        debug!(
            key = %self.config.storage_key,
            count = timestamps.len(),
            "Recorded submission"
        );
    }

    /// Clear all recorded submissions.
    pub fn reset(&self) {
        if let Err(e) = self.storage.remove(&self.config.storage_key) {
            warn!(error = %e, "Failed to clear rate limit state");
        }
    }

    /// Report the current window occupancy for introspection/admin tooling.
    pub fn status(&self) -> RateLimitStatus {
        let now = self.clock.now_ms();
        let cutoff = now - self.config.time_window_ms;
        let recent: Vec<i64> = self
            .load_timestamps()
            .into_iter()
            .filter(|&t| t > cutoff && t <= now)
            .collect();

        RateLimitStatus {
            submissions: recent.len(),
            max_submissions: self.config.max_submissions,
            window: self.config.window_description(),
            next_reset_ms: recent
                .iter()
                .copied()
                .min()
                .map(|oldest| oldest + self.config.time_window_ms),
        }
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    fn load_timestamps(&self) -> Vec<i64> {
        match self.storage.get(&self.config.storage_key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<i64>>(&raw) {
                Ok(list) => list,
                Err(e) => {
                    warn!(error = %e, "Corrupt rate limit state; failing open");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Rate limit storage unavailable; failing open");
                Vec::new()
            }
        }
    }

    fn store_timestamps(&self, timestamps: &[i64]) {
        let raw = match serde_json::to_string(timestamps) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to encode rate limit state");
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.config.storage_key, &raw) {
            warn!(error = %e, "Failed to persist rate limit state; failing open");
        }
    }
}

/// Round milliseconds up to whole minutes, never returning 0 while blocked.
fn div_ceil_minutes(ms: i64) -> i64 {
    if ms <= 0 {
        return 1;
    }
    (ms + 59_999) / 60_000
}

// =============================================================================
// UNIT TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ManualClock, MemoryStore};
    use crate::Result;

    fn fixture() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let limiter = RateLimiter::with_clock(
            Arc::new(MemoryStore::new()),
            RateLimitConfig::default(),
            clock.clone(),
        );
        (limiter, clock)
    }

    // -------------------------------------------------------------------------
    // Window Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_allows_until_budget_consumed() {
        let (limiter, _clock) = fixture();

        for expected_remaining in (1..=3).rev() {
            let check = limiter.check_limit();
            assert!(check.allowed);
            assert_eq!(check.remaining_submissions, expected_remaining);
            limiter.record();
        }

        let check = limiter.check_limit();
        assert!(!check.allowed);
        assert_eq!(check.remaining_submissions, 0);
        assert!(check.time_until_reset.unwrap() > 0);
    }

    #[test]
    fn test_window_rolls_over() {
        let (limiter, clock) = fixture();
        for _ in 0..3 {
            limiter.record();
        }
        assert!(!limiter.check_limit().allowed);

        clock.advance(DEFAULT_TIME_WINDOW_MS + 1);
        let check = limiter.check_limit();
        assert!(check.allowed);
        assert_eq!(check.remaining_submissions, 3);
    }

    #[test]
    fn test_partial_rollover_frees_budget_gradually() {
        let (limiter, clock) = fixture();
        limiter.record();
        clock.advance(30 * 60_000);
        limiter.record();
        limiter.record();
        assert!(!limiter.check_limit().allowed);

        // First record expires at +1h; we're at +30m, advance past it.
        clock.advance(30 * 60_000 + 1);
        let check = limiter.check_limit();
        assert!(check.allowed);
        assert_eq!(check.remaining_submissions, 1);
    }

    #[test]
    fn test_time_until_reset_rounds_up() {
        let (limiter, clock) = fixture();
        for _ in 0..3 {
            limiter.record();
        }
        clock.advance(DEFAULT_TIME_WINDOW_MS - 90_000); // 90s left
        let check = limiter.check_limit();
        assert!(!check.allowed);
        assert_eq!(check.time_until_reset, Some(2));
    }

    #[test]
    fn test_check_limit_prunes_persisted_state() {
        let storage = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let limiter = RateLimiter::with_clock(
            storage.clone(),
            RateLimitConfig::default(),
            clock.clone(),
        );

        limiter.record();
        limiter.record();
        clock.advance(DEFAULT_TIME_WINDOW_MS + 1);
        limiter.record();
        limiter.check_limit();

        let raw = storage.get(DEFAULT_RATE_LIMIT_KEY).unwrap().unwrap();
        let persisted: Vec<i64> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted.len(), 1);
    }

    // -------------------------------------------------------------------------
    // Fail-Open Tests
    // -------------------------------------------------------------------------

    struct BrokenStore;

    impl Storage for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(crate::Error::Storage("store offline".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(crate::Error::Storage("store offline".into()))
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Err(crate::Error::Storage("store offline".into()))
        }
    }

    #[test]
    fn test_fails_open_on_storage_fault() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));
        let check = limiter.check_limit();
        assert!(check.allowed);
        assert_eq!(check.remaining_submissions, 3);
        // record() must not panic either
        limiter.record();
        limiter.reset();
    }

    #[test]
    fn test_fails_open_on_corrupt_state() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(DEFAULT_RATE_LIMIT_KEY, "not json at all").unwrap();
        let limiter = RateLimiter::new(storage);
        assert!(limiter.check_limit().allowed);
    }

    // -------------------------------------------------------------------------
    // Isolation Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_distinct_keys_do_not_cross_contaminate() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let contact = RateLimiter::with_clock(
            storage.clone(),
            RateLimitConfig {
                storage_key: "contact_submissions".into(),
                ..RateLimitConfig::default()
            },
            clock.clone(),
        );
        let newsletter = RateLimiter::with_clock(
            storage,
            RateLimitConfig {
                storage_key: "newsletter_submissions".into(),
                ..RateLimitConfig::default()
            },
            clock,
        );

        for _ in 0..3 {
            contact.record();
        }
        assert!(!contact.check_limit().allowed);
        assert!(newsletter.check_limit().allowed);
    }

    // -------------------------------------------------------------------------
    // Reset / Status Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_reset_clears_history() {
        let (limiter, _clock) = fixture();
        for _ in 0..3 {
            limiter.record();
        }
        assert!(!limiter.check_limit().allowed);
        limiter.reset();
        assert!(limiter.check_limit().allowed);
    }

    #[test]
    fn test_status_snapshot() {
        let (limiter, clock) = fixture();
        let empty = limiter.status();
        assert_eq!(empty.submissions, 0);
        assert_eq!(empty.max_submissions, 3);
        assert_eq!(empty.window, "1 hour");
        assert!(empty.next_reset_ms.is_none());

        limiter.record();
        let one = limiter.status();
        assert_eq!(one.submissions, 1);
        assert_eq!(
            one.next_reset_ms,
            Some(clock.now_ms() + DEFAULT_TIME_WINDOW_MS)
        );
    }

    #[test]
    fn test_window_description() {
        assert_eq!(RateLimitConfig::default().window_description(), "1 hour");
        let half = RateLimitConfig {
            time_window_ms: 30 * 60_000,
            ..RateLimitConfig::default()
        };
        assert_eq!(half.window_description(), "30 minutes");
        let two = RateLimitConfig {
            time_window_ms: 2 * 60 * 60_000,
            ..RateLimitConfig::default()
        };
        assert_eq!(two.window_description(), "2 hours");
    }

    // -------------------------------------------------------------------------
    // Message Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_message_pluralization() {
        let (limiter, _clock) = fixture();
        let three = limiter.check_limit();
        assert!(three.message.contains("3 submissions remaining"));
        limiter.record();
        limiter.record();
        let one = limiter.check_limit();
        assert!(one.message.contains("1 submission remaining"));
    }
}
