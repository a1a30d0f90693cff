//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every field has a default so a minimal (or empty) file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::wrapper::DEFAULT_PEEK_TIMEOUT;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// SSLRequest detection and address filtering.
    pub postgres_ssl: PostgresSslConfig,

    /// Certificate used to terminate TLS after the SSLRequest reply.
    pub tls: Option<TlsConfig>,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5432").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5432".to_string(),
            max_connections: 10_000,
        }
    }
}

/// SSLRequest wrapper settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PostgresSslConfig {
    /// How long to wait for the first 8 bytes, e.g. "300ms", "3s", "1m".
    /// Zero selects the default.
    pub timeout: String,

    /// Peer IPs the wrapper handles. Empty means every peer.
    pub allow: Vec<String>,

    /// Peer IPs the wrapper leaves alone. Checked before `allow`.
    pub deny: Vec<String>,
}

impl PostgresSslConfig {
    /// Parsed `timeout`. Zero or an unparseable value (rejected by
    /// validation) selects [`DEFAULT_PEEK_TIMEOUT`].
    pub fn peek_timeout(&self) -> Duration {
        parse_duration(&self.timeout)
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(DEFAULT_PEEK_TIMEOUT)
    }
}

impl Default for PostgresSslConfig {
    fn default() -> Self {
        Self {
            timeout: format!("{}ms", DEFAULT_PEEK_TIMEOUT.as_millis()),
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

/// Parse a duration such as "250ms", "3s" or "2m". A bare "0" is accepted;
/// any other value needs a unit.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        None
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to certificate chain (PEM).
    pub cert_path: String,

    /// Path to private key (PEM).
    pub key_path: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9187".to_string(),
        }
    }
}
