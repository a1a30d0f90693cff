//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Catch allow/deny entries that can never match a peer address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use tracing_subscriber::EnvFilter;

use crate::config::schema::{parse_duration, AppConfig};
use crate::security::access_control::{canonical_ip, split_host};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),

    #[error("observability.log_level {0:?} is not a valid filter")]
    LogLevel(String),

    #[error("postgres_ssl.timeout {0:?} is not a duration (e.g. \"300ms\", \"3s\")")]
    Timeout(String),

    /// Entries are compared with exact string equality, so a range would
    /// silently match nothing.
    #[error("postgres_ssl.{list} entry {entry:?} is a CIDR range; only single addresses are supported")]
    CidrRange { list: &'static str, entry: String },

    #[error("postgres_ssl.{list} entry {entry:?} includes a port; use {host:?}")]
    EntryWithPort {
        list: &'static str,
        entry: String,
        host: String,
    },

    #[error("postgres_ssl.{list} entry {entry:?} is not an IP address")]
    NotAnAddress { list: &'static str, entry: String },

    #[error("postgres_ssl.{list} entry {entry:?} can never match; write it as {canonical:?}")]
    NonCanonical {
        list: &'static str,
        entry: String,
        canonical: String,
    },

    #[error("tls.{0} must not be empty")]
    EmptyTlsPath(&'static str),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }

    if parse_duration(&config.postgres_ssl.timeout).is_none() {
        errors.push(ValidationError::Timeout(config.postgres_ssl.timeout.clone()));
    }
    validate_entries("allow", &config.postgres_ssl.allow, &mut errors);
    validate_entries("deny", &config.postgres_ssl.deny, &mut errors);

    if let Some(tls) = &config.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("cert_path"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::EmptyTlsPath("key_path"));
        }
    }

    let observability = &config.observability;
    if observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(observability.metrics_address.clone()));
    }
    if EnvFilter::try_new(&observability.log_level).is_err() {
        errors.push(ValidationError::LogLevel(observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_entries(list: &'static str, entries: &[String], errors: &mut Vec<ValidationError>) {
    for entry in entries {
        if let Some(error) = check_entry(list, entry) {
            errors.push(error);
        }
    }
}

/// Peer addresses are rendered with [`canonical_ip`]; an entry only ever
/// matches if it round-trips through it unchanged.
fn check_entry(list: &'static str, entry: &str) -> Option<ValidationError> {
    if entry.contains('/') {
        return Some(ValidationError::CidrRange {
            list,
            entry: entry.to_string(),
        });
    }

    match entry.parse::<IpAddr>() {
        Ok(ip) => {
            let canonical = canonical_ip(ip);
            (canonical != entry).then(|| ValidationError::NonCanonical {
                list,
                entry: entry.to_string(),
                canonical,
            })
        }
        Err(_) => match split_host(entry).and_then(|host| host.parse::<IpAddr>().ok()) {
            Some(ip) => Some(ValidationError::EntryWithPort {
                list,
                entry: entry.to_string(),
                host: canonical_ip(ip),
            }),
            None => Some(ValidationError::NotAnAddress {
                list,
                entry: entry.to_string(),
            }),
        },
    }
}
