use crate::error::ProxyError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

fn default_listen_addr() -> SocketAddr {
    // Port the relay has always answered on.
    "127.0.0.1:9088".parse().unwrap()
}

fn default_max_connections() -> usize {
    32
}

fn default_chunk_size() -> usize {
    8192
}

fn default_event_queue_size() -> usize {
    256
}

fn default_stats_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Some(LogLevel::Info),
            format: Some(LogFormat::Text),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the relay listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Upper bound on simultaneously served connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Read buffer size for the upstream response copy loop.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Optional upstream connect timeout. None dials without a deadline.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Capacity of the observation event channel.
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
    /// Seconds between transfer summary log lines. 0 disables the reporter.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    /// Tokio worker threads. None sizes from the CPU count.
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
            chunk_size: default_chunk_size(),
            connect_timeout_secs: None,
            event_queue_size: default_event_queue_size(),
            stats_interval_secs: default_stats_interval_secs(),
            worker_threads: None,
            logging: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Rejects configurations the listener cannot run with.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.listen_addr.port() == 0 {
            return Err(ProxyError::Config(
                "listen port 0 is reserved; pick an explicit port".to_string(),
            ));
        }
        if self.listen_addr.port() < 1024 {
            log::warn!(
                "Port {} requires elevated privileges on most systems",
                self.listen_addr.port()
            );
        }
        if self.max_connections == 0 {
            return Err(ProxyError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ProxyError::Config(
                "chunk_size must be at least 1 byte".to_string(),
            ));
        }
        if self.event_queue_size == 0 {
            return Err(ProxyError::Config(
                "event_queue_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_historic_values() {
        let config = Config::default();
        assert_eq!(config.listen_addr.port(), 9088);
        assert_eq!(config.max_connections, 32);
        assert_eq!(config.chunk_size, 8192);
        assert!(config.connect_timeout_secs.is_none());
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let mut config = Config::default();
        config.listen_addr = "127.0.0.1:0".parse().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let mut config = Config::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        let mut config = Config::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"listen_addr":"0.0.0.0:3128"}"#).unwrap();
        assert_eq!(config.listen_addr.port(), 3128);
        assert_eq!(config.max_connections, 32);
        assert_eq!(config.chunk_size, 8192);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.json");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.max_connections = 64;
        config.connect_timeout_secs = Some(5);
        config.to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.max_connections, 64);
        assert_eq!(loaded.connect_timeout_secs, Some(5));
        assert_eq!(loaded.listen_addr, config.listen_addr);
    }
}
