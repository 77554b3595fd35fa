//! Schema discovery retry policy.
//!
//! After a schema request the client waits `timeout` for a schema. If none
//! arrives and fewer than `max_attempts` requests have gone out, it asks
//! again; after that it stays quiet and waits for a manual refresh.
//!
//! [`SchemaRetry`] is pure bookkeeping; the client reactor owns the timer
//! and consults it, so the timer dies with the reactor.

use std::time::Duration;

use tokio::time::Instant;

/// Retry behaviour for schema requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// How long to wait for a schema after each request
    pub timeout: Duration,
    /// Total requests, including the first
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_attempts: 3,
        }
    }
}

impl RetryConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl From<&paramconf::ClientConfig> for RetryConfig {
    fn from(config: &paramconf::ClientConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.schema_timeout_ms),
            max_attempts: config.schema_attempts,
        }
    }
}

/// Per-connection retry state.
#[derive(Debug, Clone)]
pub struct SchemaRetry {
    config: RetryConfig,
    attempts: u32,
    schema_received: bool,
    deadline: Option<Instant>,
}

impl SchemaRetry {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
            schema_received: false,
            deadline: None,
        }
    }

    /// A schema request went out at `now`.
    ///
    /// Every request counts toward the budget. The timer is only armed while
    /// no schema has been seen yet.
    pub fn record_request(&mut self, now: Instant) {
        self.attempts = self.attempts.saturating_add(1);
        if !self.schema_received {
            self.deadline = Some(now + self.config.timeout);
        }
    }

    /// A schema arrived; no more automatic requests.
    pub fn record_schema(&mut self) {
        self.schema_received = true;
        self.deadline = None;
    }

    /// When the reactor should wake up, if at all.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The deadline passed. Returns `true` if another request should be sent.
    pub fn on_timeout(&mut self) -> bool {
        self.deadline = None;
        !self.schema_received && self.attempts < self.config.max_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn schema_received(&self) -> bool {
        self.schema_received
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
