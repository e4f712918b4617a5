//! Reconnection backoff policy.
//!
//! Delays double from `base_delay` and are capped at `max_delay`:
//!
//! | Attempt | 0 | 1 | 2 | 3 | 4 | 5 | 6 |
//! |---------|---|---|---|---|---|---|---|
//! | Delay (defaults) | 1s | 2s | 4s | 8s | 16s | 30s | 30s |
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use docstream_realtime::ReconnectPolicy;
//!
//! let policy = ReconnectPolicy::new()
//!     .with_base_delay(Duration::from_millis(500))
//!     .with_max_attempts(3);
//!
//! assert_eq!(policy.delay_for(2), Duration::from_secs(2));
//! assert!(!policy.allows(3));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Delay before the first reconnect attempt.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on any single delay.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Attempts allowed between two successful opens.
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Exponential backoff with a delay cap and an attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before attempt 0.
    pub base_delay: Duration,

    /// Cap applied to every delay.
    pub max_delay: Duration,

    /// Number of attempts scheduled before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ReconnectPolicy {
    /// Creates the default policy: 1s base, 30s cap, 10 attempts.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Creates a policy that never reconnects.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::new()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ReconnectPolicy {
    /// Sets the first delay.
    #[inline]
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[inline]
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the attempt ceiling.
    #[inline]
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

// ============================================================================
// Backoff
// ============================================================================

impl ReconnectPolicy {
    /// Delay before the attempt that follows `attempt` earlier failures.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Returns `true` if another attempt may be scheduled after
    /// `attempt_count` attempts.
    #[inline]
    #[must_use]
    pub fn allows(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Checks the policy for inconsistent settings.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() && self.max_attempts > 0 {
            return Err(Error::config("reconnect base delay must be greater than zero"));
        }
        if self.base_delay > self.max_delay {
            return Err(Error::config(format!(
                "reconnect base delay {:?} exceeds max delay {:?}",
                self.base_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
