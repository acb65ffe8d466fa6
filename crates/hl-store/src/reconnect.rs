//! Reconnection backoff for long-lived channels.

use std::time::Duration;

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Delay before attempt number `attempt` (0-indexed): the initial delay
    /// doubled per attempt, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Tracks consecutive failures against a [`ReconnectConfig`].
#[derive(Debug, Clone)]
pub struct ReconnectHandler {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectHandler {
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn can_reconnect(&self) -> bool {
        self.attempts < self.config.max_attempts
    }

    /// Record a failure and return the delay to wait before the next try.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.config.delay_for_attempt(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Called after a connection is fully established.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }
}
