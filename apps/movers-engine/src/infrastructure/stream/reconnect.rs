//! Reconnection Policy
//!
//! Fixed delay between attempts with no attempt ceiling. The counter is
//! reset once a connection authenticates.

use std::time::Duration;

/// Fixed-delay, unlimited reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy waiting `delay` before every attempt.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt. Never gives up.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.delay
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}
