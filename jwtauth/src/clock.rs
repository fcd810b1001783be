//! Time source abstraction for token issuance and expiry checks.
//!
//! Tokens carry `iat`/`exp` claims in whole seconds since the Unix epoch. All
//! "what time is it" questions go through [`TimeSource`] so that production code
//! reads the system clock while tests drive time explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstraction over the current time.
///
/// Implementations must be shareable across request handlers, hence the
/// `Send + Sync` bound.
pub trait TimeSource: Send + Sync {
    /// Get the current time in whole seconds since Unix epoch.
    fn now_secs(&self) -> u64;
}

/// Real time source using the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_secs(&self) -> u64 {
        // A clock set before 1970 reads as the epoch itself, which makes every
        // issued token look expired rather than panicking mid-request.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_secs())
    }
}

/// A manually driven time source.
///
/// Time only moves when told to, which keeps expiry tests deterministic.
/// Uses an atomic so one instance can be shared (via `Arc`) between the
/// `AuthManager` under test and the test body that advances it.
///
/// # Example
///
/// ```
/// use jwtauth::clock::{ManualTimeSource, TimeSource};
///
/// let time = ManualTimeSource::new(1_000);
/// assert_eq!(time.now_secs(), 1_000);
///
/// time.advance(300);
/// assert_eq!(time.now_secs(), 1_300);
/// ```
#[derive(Debug)]
pub struct ManualTimeSource {
    current_secs: AtomicU64,
}

impl ManualTimeSource {
    /// Create a time source frozen at `initial_secs`.
    #[must_use]
    pub const fn new(initial_secs: u64) -> Self {
        Self {
            current_secs: AtomicU64::new(initial_secs),
        }
    }

    /// Create a time source starting at `1_700_000_000` (November 2023).
    #[must_use]
    pub const fn default_start() -> Self {
        Self::new(1_700_000_000)
    }

    /// Advance time by `secs`, saturating at `u64::MAX`.
    pub fn advance(&self, secs: u64) {
        let _ = self
            .current_secs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(secs))
            });
    }

    /// Set the current time. May move time backwards.
    pub fn set(&self, secs: u64) {
        self.current_secs.store(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_secs(&self) -> u64 {
        self.current_secs.load(Ordering::SeqCst)
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::default_start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_source() {
        let source = SystemTimeSource;
        let t1 = source.now_secs();
        let t2 = source.now_secs();

        // After 2020-01-01 00:00:00 UTC
        assert!(t1 > 1_577_836_800);
        assert!(t2 >= t1);
    }

    #[test]
    fn test_manual_time_advance() {
        let time = ManualTimeSource::new(1000);

        time.advance(100);
        assert_eq!(time.now_secs(), 1100);

        time.advance(u64::MAX);
        assert_eq!(time.now_secs(), u64::MAX);
    }

    #[test]
    fn test_manual_time_set() {
        let time = ManualTimeSource::new(1000);

        time.set(5000);
        assert_eq!(time.now_secs(), 5000);

        time.set(3000);
        assert_eq!(time.now_secs(), 3000);
    }

    #[test]
    fn test_manual_time_default() {
        assert_eq!(ManualTimeSource::default().now_secs(), 1_700_000_000);
    }
}
