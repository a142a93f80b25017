use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::speedtest::server::TestServer;

/// Parameters for one speed test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Seconds each throughput phase may run.
    pub duration_secs: u64,
    /// Concurrent transfers per throughput phase.
    pub parallel_connections: usize,
    pub enable_bufferbloat: bool,
    /// Reserved; nothing in the measurement pipeline reads it yet.
    pub enable_stress_test: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            duration_secs: 10,
            parallel_connections: 4,
            enable_bufferbloat: true,
            enable_stress_test: false,
        }
    }
}

impl TestConfig {
    pub const MAX_DURATION_SECS: u64 = 60;
    pub const MAX_CONNECTIONS: usize = 16;

    /// Clamp values into the range the measurers can work with.
    pub fn normalized(mut self) -> Self {
        self.duration_secs = self.duration_secs.clamp(1, Self::MAX_DURATION_SECS);
        self.parallel_connections = self.parallel_connections.clamp(1, Self::MAX_CONNECTIONS);
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Where the probes go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub servers: Vec<TestServer>,
    /// Streaming download targets, used round-robin.
    pub download: Vec<String>,
    /// Upload sinks accepting POST bodies, used round-robin.
    pub upload: Vec<String>,
    /// Cheap HEAD targets for the packet loss batch.
    pub packet_loss: Vec<String>,
    pub geolocation: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            servers: vec![
                TestServer::new(
                    "cloudflare",
                    "Cloudflare",
                    "Anycast (Cloudflare edge)",
                    "https://speed.cloudflare.com/__down?bytes=0",
                ),
                TestServer::new(
                    "google",
                    "Google",
                    "Anycast (Google edge)",
                    "https://www.google.com/generate_204",
                ),
            ],
            download: vec![
                "https://speed.cloudflare.com/__down?bytes=25000000".to_string(),
                "https://speed.cloudflare.com/__down?bytes=50000000".to_string(),
            ],
            upload: vec![
                "https://speed.cloudflare.com/__up".to_string(),
                "https://httpbin.org/post".to_string(),
            ],
            packet_loss: vec![
                "https://www.google.com/generate_204".to_string(),
                "https://speed.cloudflare.com/__down?bytes=0".to_string(),
                "https://www.cloudflare.com/cdn-cgi/trace".to_string(),
            ],
            geolocation: "https://ipinfo.io/json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Duration,
    Connections,
    Bufferbloat,
}

impl SettingsField {
    pub fn next(self) -> Self {
        match self {
            SettingsField::Duration => SettingsField::Connections,
            SettingsField::Connections => SettingsField::Bufferbloat,
            SettingsField::Bufferbloat => SettingsField::Duration,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            SettingsField::Duration => SettingsField::Bufferbloat,
            SettingsField::Connections => SettingsField::Duration,
            SettingsField::Bufferbloat => SettingsField::Connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_clamps_zero_values() {
        let config = TestConfig {
            duration_secs: 0,
            parallel_connections: 0,
            ..TestConfig::default()
        }
        .normalized();
        assert_eq!(config.duration_secs, 1);
        assert_eq!(config.parallel_connections, 1);
    }

    #[test]
    fn normalized_clamps_large_values() {
        let config = TestConfig {
            duration_secs: 3600,
            parallel_connections: 500,
            ..TestConfig::default()
        }
        .normalized();
        assert_eq!(config.duration_secs, TestConfig::MAX_DURATION_SECS);
        assert_eq!(config.parallel_connections, TestConfig::MAX_CONNECTIONS);
    }

    #[test]
    fn settings_field_cycles() {
        let mut field = SettingsField::Duration;
        for _ in 0..3 {
            field = field.next();
        }
        assert_eq!(field, SettingsField::Duration);
        assert_eq!(SettingsField::Duration.prev(), SettingsField::Bufferbloat);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: TestConfig = serde_json::from_str(r#"{"duration_secs": 5}"#).unwrap();
        assert_eq!(config.duration_secs, 5);
        assert_eq!(config.parallel_connections, 4);
        assert!(config.enable_bufferbloat);
    }
}
