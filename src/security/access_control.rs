//! Peer address allow/deny evaluation.
//!
//! Entries are compared to the peer's IP address by exact string equality.
//! The peer address is rendered by [`canonical_ip`], so entries must use the
//! same spelling (`10.0.0.1`, `::1`) to ever match. IPv4 peers accepted on a
//! dual-stack socket arrive as `::ffff:a.b.c.d` and are rendered as `a.b.c.d`.

use std::net::IpAddr;

use crate::net::listener::PeerAddr;

/// Outcome of evaluating a peer address against the allow and deny lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Address is on the deny list.
    Deny,
    /// An allow list is configured and the address is not on it.
    NotAllowed,
    /// The wrapper may inspect this connection.
    Proceed,
}

/// Allow and deny lists shared read-only by every accept.
///
/// ```
/// use pg_ssl_listener::security::access_control::{AddressFilter, FilterDecision};
///
/// let filter = AddressFilter::new(vec!["10.0.0.1".into()], vec!["10.0.0.2".into()]);
/// assert_eq!(filter.evaluate(Some("10.0.0.1")), FilterDecision::Proceed);
/// assert_eq!(filter.evaluate(Some("10.0.0.2")), FilterDecision::Deny);
/// assert_eq!(filter.evaluate(Some("10.0.0.3")), FilterDecision::NotAllowed);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl AddressFilter {
    /// Create a filter from allow and deny lists. Empty lists restrict nothing.
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }

    /// Addresses that may be inspected when non-empty.
    pub fn allow(&self) -> &[String] {
        &self.allow
    }

    /// Addresses that are always declined.
    pub fn deny(&self) -> &[String] {
        &self.deny
    }

    /// True when neither list restricts anything.
    pub fn is_open(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }

    /// Evaluate a peer address. `None` means the address could not be
    /// determined; it matches no entry.
    ///
    /// The deny list is checked first, so an address present in both lists
    /// is denied.
    pub fn evaluate(&self, addr: Option<&str>) -> FilterDecision {
        if !self.deny.is_empty() && matches_any(&self.deny, addr) {
            return FilterDecision::Deny;
        }
        if !self.allow.is_empty() && !matches_any(&self.allow, addr) {
            return FilterDecision::NotAllowed;
        }
        FilterDecision::Proceed
    }
}

fn matches_any(entries: &[String], addr: Option<&str>) -> bool {
    match addr {
        Some(addr) => entries.iter().any(|entry| entry == addr),
        None => false,
    }
}

/// IP address of the stream's peer, or `None` if it cannot be determined.
pub fn peer_host<S: PeerAddr + ?Sized>(stream: &S) -> Option<String> {
    stream.peer_addr().ok().map(|addr| canonical_ip(addr.ip()))
}

/// Text form used for filter matching, with IPv4-mapped IPv6 addresses
/// unwrapped to plain IPv4.
pub fn canonical_ip(ip: IpAddr) -> String {
    ip.to_canonical().to_string()
}

/// Host portion of a `host:port` or `[v6-host]:port` string.
///
/// Returns `None` for strings that do not have that shape.
pub fn split_host(addr: &str) -> Option<&str> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        if host.is_empty() || port.is_empty() || host.contains('[') || port.contains(']') {
            return None;
        }
        return Some(host);
    }

    let (host, port) = addr.rsplit_once(':')?;
    // A bare IPv6 literal has more than one colon and needs brackets.
    if host.contains(':') || port.is_empty() {
        return None;
    }
    Some(host)
}
