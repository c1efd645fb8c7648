//! Server and client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for outbound calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host to dial
    pub host: String,
    /// Upper bound on connect plus call
    #[serde(with = "duration_ms")]
    pub call_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Settings for server instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Loopback address to bind; the port is always chosen by the OS
    pub host: String,
    /// Threads in each instance's worker group
    pub worker_threads: usize,
    /// How long a stop waits for in-flight calls to drain
    #[serde(with = "duration_ms")]
    pub drain_timeout: Duration,
    /// Settings used when the server sends to itself
    #[serde(default)]
    pub call: ClientConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            worker_threads: 1,
            drain_timeout: Duration::from_secs(10),
            call: ClientConfig::default(),
        }
    }
}

/// Helper for serializing Duration as milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.worker_threads, 1);
        assert_eq!(config.call.host, "localhost");
        assert_eq!(config.call.call_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_durations_as_millis() {
        let config = ClientConfig {
            host: "localhost".into(),
            call_timeout: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["call_timeout"], 1500);

        let back: ClientConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_server_config_call_defaults_when_missing() {
        let json = serde_json::json!({
            "host": "127.0.0.1",
            "worker_threads": 2,
            "drain_timeout": 250,
        });
        let config: ServerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.drain_timeout, Duration::from_millis(250));
        assert_eq!(config.call, ClientConfig::default());
    }
}
