//! Server configuration.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use fxstream_rates::ECB_DAILY_URL;

/// Where the initial rate table comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSourceKind {
    /// ECB daily reference rates over HTTP.
    Ecb,
    /// Built-in table of major currencies.
    Static,
}

impl FromStr for RateSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecb" => Ok(RateSourceKind::Ecb),
            "static" => Ok(RateSourceKind::Static),
            other => Err(format!("Unknown rate source: {}", other)),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}

/// Main server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Time between rate ticks.
    pub refresh_interval: Duration,
    /// Initial rate source.
    pub rate_source: RateSourceKind,
    /// Endpoint of the ECB source.
    pub rate_source_url: String,
    /// HTTP timeout for the ECB source.
    pub source_timeout: Duration,
    /// Outbound events buffered per session.
    pub session_buffer: usize,
    /// How long fan-out waits on a full session stream.
    pub delivery_timeout: Duration,
    /// Upper bound of the per-tick relative rate change.
    pub max_rate_change: f64,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 9092,
            refresh_interval: Duration::from_millis(5000),
            rate_source: RateSourceKind::Ecb,
            rate_source_url: ECB_DAILY_URL.to_string(),
            source_timeout: Duration::from_millis(10_000),
            session_buffer: 64,
            delivery_timeout: Duration::from_millis(250),
            max_rate_change: 0.1,
            log_format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("FXSTREAM_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = lookup("FXSTREAM_LISTEN_PORT").and_then(|v| v.parse().ok()) {
            config.listen_port = port;
        }

        if let Some(ms) = lookup("FXSTREAM_REFRESH_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            config.refresh_interval = Duration::from_millis(ms);
        }

        if let Some(source) = lookup("FXSTREAM_RATE_SOURCE").and_then(|v| v.parse().ok()) {
            config.rate_source = source;
        }

        if let Some(url) = lookup("FXSTREAM_RATE_SOURCE_URL") {
            config.rate_source_url = url;
        }

        if let Some(ms) = lookup("FXSTREAM_SOURCE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.source_timeout = Duration::from_millis(ms);
        }

        if let Some(buffer) = lookup("FXSTREAM_SESSION_BUFFER").and_then(|v| v.parse().ok()) {
            config.session_buffer = buffer;
        }

        if let Some(ms) = lookup("FXSTREAM_DELIVERY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.delivery_timeout = Duration::from_millis(ms);
        }

        if let Some(change) = lookup("FXSTREAM_MAX_RATE_CHANGE").and_then(|v| v.parse().ok()) {
            config.max_rate_change = change;
        }

        if let Some(format) = lookup("FXSTREAM_LOG_FORMAT").and_then(|v| v.parse().ok()) {
            config.log_format = format;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if self.listen_addr.parse::<IpAddr>().is_err() {
            return Err(format!("Invalid listen address: {}", self.listen_addr));
        }

        if self.refresh_interval.is_zero() {
            return Err("Refresh interval cannot be 0".to_string());
        }

        if self.rate_source == RateSourceKind::Ecb && self.rate_source_url.is_empty() {
            return Err("Rate source URL cannot be empty".to_string());
        }

        if self.session_buffer == 0 {
            return Err("Session buffer cannot be 0".to_string());
        }

        if !(self.max_rate_change > 0.0 && self.max_rate_change < 1.0) {
            return Err("Max rate change must be between 0 and 1".to_string());
        }

        Ok(())
    }

    /// Address to bind the listener to.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        let ip: IpAddr = self
            .listen_addr
            .parse()
            .map_err(|_| format!("Invalid listen address: {}", self.listen_addr))?;
        Ok(SocketAddr::new(ip, self.listen_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_port, 9092);
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.rate_source_url, ECB_DAILY_URL);
    }

    #[test]
    fn test_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("FXSTREAM_LISTEN_ADDR", "127.0.0.1"),
            ("FXSTREAM_LISTEN_PORT", "7000"),
            ("FXSTREAM_REFRESH_INTERVAL_MS", "250"),
            ("FXSTREAM_RATE_SOURCE", "static"),
            ("FXSTREAM_MAX_RATE_CHANGE", "0.05"),
            ("FXSTREAM_LOG_FORMAT", "JSON"),
        ]));

        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr().unwrap(), "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.refresh_interval, Duration::from_millis(250));
        assert_eq!(config.rate_source, RateSourceKind::Static);
        assert_eq!(config.max_rate_change, 0.05);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("FXSTREAM_LISTEN_PORT", "not-a-port"),
            ("FXSTREAM_RATE_SOURCE", "bloomberg"),
        ]));

        assert_eq!(config.listen_port, 9092);
        assert_eq!(config.rate_source, RateSourceKind::Ecb);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = ServerConfig::default();
        config.listen_port = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.refresh_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.session_buffer = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.max_rate_change = 1.0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.listen_addr = "localhost:80".to_string();
        assert!(config.validate().is_err());
    }
}
