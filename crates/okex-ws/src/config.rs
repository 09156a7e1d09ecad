//! Agent configuration

use crate::endpoint::Endpoint;
use crate::error::{AgentError, AgentResult};
use std::time::Duration;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default keepalive period; the server drops idle connections after 30s
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(14);

/// Default pause after sending a login
pub const DEFAULT_LOGIN_GRACE: Duration = Duration::from_millis(100);

/// Default capacity of each internal queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Configuration for an [`OkexAgent`](crate::OkexAgent)
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// WebSocket URL
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Interval between keepalive pings
    pub keepalive_interval: Duration,
    /// Pause after a login frame, while still holding the send lock
    pub login_grace: Duration,
    /// Capacity of the error, event, table and query queues
    pub queue_capacity: usize,
    /// Close the session on Ctrl-C
    pub handle_signals: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: Endpoint::default().url(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE,
            login_grace: DEFAULT_LOGIN_GRACE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            handle_signals: false,
        }
    }
}

impl AgentConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config with `OKEX_WS_URL` and `OKEX_WS_KEEPALIVE_SECS` applied
    pub fn from_env() -> AgentResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("OKEX_WS_URL") {
            config.url = url;
        }
        if let Ok(secs) = std::env::var("OKEX_WS_KEEPALIVE_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                AgentError::Config(format!("OKEX_WS_KEEPALIVE_SECS is not a number: {secs:?}"))
            })?;
            config.keepalive_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the endpoint
    pub fn with_endpoint(mut self, endpoint: &Endpoint) -> Self {
        self.url = endpoint.url();
        self
    }

    /// Set a full WebSocket URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set keepalive interval
    pub fn with_keepalive(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the pause after a login frame
    pub fn with_login_grace(mut self, grace: Duration) -> Self {
        self.login_grace = grace;
        self
    }

    /// Set queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Close the session when the process receives Ctrl-C
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Check values the runtime cannot work with
    pub fn validate(&self) -> AgentResult<()> {
        if self.url.is_empty() {
            return Err(AgentError::Config("empty URL".into()));
        }
        if self.keepalive_interval.is_zero() {
            return Err(AgentError::Config("keepalive interval must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(AgentError::Config("queue capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::new();
        assert_eq!(config.url, "wss://real.okex.com:8443/ws/v3?compress=true");
        assert_eq!(config.keepalive_interval, Duration::from_secs(14));
        assert_eq!(config.login_grace, Duration::from_millis(100));
        assert_eq!(config.queue_capacity, 256);
        assert!(!config.handle_signals);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = AgentConfig::new()
            .with_endpoint(&Endpoint::new("wss://example.test").uncompressed())
            .with_timeout(Duration::from_secs(3))
            .with_keepalive(Duration::from_secs(5))
            .with_queue_capacity(8)
            .with_signal_handling(true);

        assert_eq!(config.url, "wss://example.test/ws/v3");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.queue_capacity, 8);
        assert!(config.handle_signals);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(AgentConfig::new().with_queue_capacity(0).validate().is_err());
        assert!(AgentConfig::new()
            .with_keepalive(Duration::ZERO)
            .validate()
            .is_err());
        assert!(AgentConfig::new().with_url("").validate().is_err());
    }
}
