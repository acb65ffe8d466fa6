//! Store and realtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ReconnectConfig;

/// Connection settings for the hosted record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub url: Option<String>,
    /// Public (anon) API key.
    pub anon_key: Option<String>,
    /// Table holding one row per subject.
    pub table: String,
    /// Database schema of `table`.
    pub schema: String,
    /// Per-request timeout for REST calls.
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            table: "locations".to_string(),
            schema: "public".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl StoreConfig {
    /// Both the URL and the key are present and non-blank.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.url) && present(&self.anon_key)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Realtime channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Interval between channel heartbeats. `0` disables heartbeats and
    /// with them dead-connection detection.
    pub heartbeat_interval_ms: u64,
    /// WebSocket connect timeout.
    pub connect_timeout_ms: u64,
    /// First reconnect delay; doubles per failed attempt.
    pub reconnect_initial_ms: u64,
    /// Upper bound for the reconnect delay.
    pub reconnect_max_ms: u64,
    /// Give up after this many consecutive failures. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 25_000,
            connect_timeout_ms: 10_000,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            max_reconnect_attempts: None,
        }
    }
}

impl RealtimeConfig {
    /// `None` when heartbeats are disabled.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Option<Duration> {
        if self.heartbeat_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.heartbeat_interval_ms))
        }
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig::new()
            .with_initial_delay(Duration::from_millis(self.reconnect_initial_ms))
            .with_max_delay(Duration::from_millis(self.reconnect_max_ms))
            .with_max_attempts(self.max_reconnect_attempts.unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_credentials_are_not_configured() {
        let config = StoreConfig {
            url: Some("https://abc.supabase.co".into()),
            anon_key: Some("   ".into()),
            ..StoreConfig::default()
        };
        assert!(!config.is_configured());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: StoreConfig = from_json(r#"{ "table": "positions" }"#);
        assert_eq!(config.table, "positions");
        assert_eq!(config.schema, "public");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn realtime_reconnect_defaults_to_unlimited() {
        let reconnect = RealtimeConfig::default().reconnect();
        assert_eq!(reconnect.max_attempts, u32::MAX);
        assert_eq!(reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(reconnect.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn zero_heartbeat_interval_means_disabled() {
        let config: RealtimeConfig = from_json(r#"{ "heartbeat_interval_ms": 0 }"#);
        assert_eq!(config.heartbeat_interval(), None);
        assert_eq!(
            RealtimeConfig::default().heartbeat_interval(),
            Some(Duration::from_secs(25))
        );
    }

    fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> T {
        serde_json::from_str(json).expect("config should parse")
    }
}
