//! Storage and clock seams for the vigil security core.
//!
//! The original host environment kept rate-limit history in durable
//! per-origin storage, the incident buffer in session-scoped storage, and
//! read wall-clock time from a global. Here all three are injected behind
//! small traits so the rate limiter and monitors can be exercised
//! deterministically without a host environment.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil::storage::{MemoryStore, Storage};
//!
//! let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
//! store.set("form_submissions", "[]")?;
//! assert_eq!(store.get("form_submissions")?.as_deref(), Some("[]"));
//! ```

use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

// =============================================================================
// STORAGE TRAIT
// =============================================================================

/// A keyed string store in the shape of web storage.
///
/// Backs the rate limiter's timestamp list (durable scope) and the incident
/// monitor's buffer (session scope). Implementations report faults through
/// `Err`; the consumers of this trait treat every fault as empty state and
/// fail open, so an implementation never needs to guarantee durability.
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value stored under `key`, if any.
    fn remove(&self, key: &str) -> Result<()>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory [`Storage`] implementation.
///
/// The default backing store for tests and for hosts without durable
/// storage. State lives for the lifetime of the instance.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| crate::Error::Storage("store lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| crate::Error::Storage("store lock poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| crate::Error::Storage("store lock poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Source of the current time as epoch milliseconds.
///
/// The sliding-window rate limiter and the interaction anomaly detector are
/// both time-window algorithms; injecting the clock lets tests advance time
/// past a window without sleeping.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Wall-clock [`Clock`] backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually advanced [`Clock`] for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Create a clock fixed at the given epoch-millisecond instant.
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    /// Advance the clock by `delta_ms` milliseconds.
    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Set the clock to an absolute instant.
    pub fn set(&self, instant_ms: i64) {
        self.now_ms.store(instant_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // MemoryStore Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_memory_store_remove() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        // Removing a missing key is not an error
        store.remove("k").unwrap();
    }

    #[test]
    fn test_memory_store_len() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.len(), 2);
    }

    // -------------------------------------------------------------------------
    // Clock Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_system_clock_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000); // after Sep 2020, sanity bound
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10_000);
        assert_eq!(clock.now_ms(), 10_000);
    }
}
