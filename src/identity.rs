//! Cluster node identity
//!
//! Every broker node is identified cluster-wide by a 32-bit value equal to
//! one of its IPv4 addresses in network byte order. Peers use this value to
//! address the node, so the unspecified address and loopback are never valid
//! identities.

use nix::unistd::gethostname;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use thiserror::Error;
use tracing::debug;

/// Errors from node-identity validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("must be an IPv4 address")]
    NotIpv4,
    #[error("node identity cannot be the unspecified or loopback address")]
    Reserved,
}

/// A validated cluster-wide node identity.
///
/// Wraps an IPv4 address that is neither `0.0.0.0` nor `127.0.0.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Ipv4Addr);

impl NodeId {
    /// Validate an IPv4 address as a node identity.
    pub fn new(addr: Ipv4Addr) -> Result<Self, IdentityError> {
        if addr == Ipv4Addr::UNSPECIFIED || addr == Ipv4Addr::LOCALHOST {
            return Err(IdentityError::Reserved);
        }
        Ok(Self(addr))
    }

    /// Parse and validate a dotted-quad string.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        let addr: Ipv4Addr = s.parse().map_err(|_| IdentityError::NotIpv4)?;
        Self::new(addr)
    }

    /// The underlying IPv4 address.
    pub fn addr(&self) -> Ipv4Addr {
        self.0
    }

    /// The identity in network byte order, as carried in peer announcements.
    pub fn to_wire(self) -> u32 {
        u32::from(self.0).to_be()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Derive this node's identity from the host network configuration.
///
/// Reads the local host name and resolves it to its first IPv4 address.
/// Returns `None` ("unknown") when resolution fails, yields no IPv4 record,
/// or yields loopback, which peers could not use to reach this node.
pub fn resolve_local() -> Option<NodeId> {
    let hostname = gethostname().ok()?;
    let hostname = hostname.into_string().ok()?;
    debug!(host = %hostname, "resolving node identity from host name");
    resolve_host(&hostname)
}

fn resolve_host(host: &str) -> Option<NodeId> {
    let addrs = (host, 0u16).to_socket_addrs().ok()?;
    first_ipv4(addrs.map(|sa| sa.ip()))
}

/// Pick the first IPv4 address from a resolution result, if it is usable
/// as a node identity.
fn first_ipv4<I: Iterator<Item = IpAddr>>(addrs: I) -> Option<NodeId> {
    for ip in addrs {
        if let IpAddr::V4(v4) = ip {
            return NodeId::new(v4).ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_addresses() {
        let id = NodeId::parse("10.0.0.5").unwrap();
        assert_eq!(id.addr(), Ipv4Addr::new(10, 0, 0, 5));

        assert!(NodeId::parse("192.168.1.20").is_ok());
        assert!(NodeId::parse("255.255.255.255").is_ok());
    }

    #[test]
    fn test_rejects_unspecified_and_loopback() {
        assert_eq!(NodeId::parse("0.0.0.0"), Err(IdentityError::Reserved));
        assert_eq!(NodeId::parse("127.0.0.1"), Err(IdentityError::Reserved));
    }

    #[test]
    fn test_only_the_loopback_address_itself_is_reserved() {
        // The rest of 127/8 is unusual but not rejected
        assert!(NodeId::parse("127.0.0.2").is_ok());
    }

    #[test]
    fn test_rejects_non_ipv4() {
        assert_eq!(NodeId::parse("not-an-ip"), Err(IdentityError::NotIpv4));
        assert_eq!(NodeId::parse("10.0.0"), Err(IdentityError::NotIpv4));
        assert_eq!(NodeId::parse("::1"), Err(IdentityError::NotIpv4));
        assert_eq!(NodeId::parse("10.0.0.256"), Err(IdentityError::NotIpv4));
    }

    #[test]
    fn test_wire_encoding_is_network_byte_order() {
        let id = NodeId::parse("10.0.0.5").unwrap();
        assert_eq!(id.to_wire().to_ne_bytes(), [10, 0, 0, 5]);

        let id = NodeId::parse("192.168.1.20").unwrap();
        assert_eq!(id.to_wire().to_ne_bytes(), [192, 168, 1, 20]);
    }

    #[test]
    fn test_first_ipv4_skips_v6_records() {
        let addrs = vec![
            IpAddr::V6("::1".parse().unwrap()),
            IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)),
        ];
        let id = first_ipv4(addrs.into_iter()).unwrap();
        assert_eq!(id.addr(), Ipv4Addr::new(10, 1, 2, 3));
    }

    #[test]
    fn test_first_ipv4_loopback_is_unknown() {
        // A host resolving to loopback first has no usable identity
        let addrs = vec![
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)),
        ];
        assert!(first_ipv4(addrs.into_iter()).is_none());
    }

    #[test]
    fn test_first_ipv4_empty_is_unknown() {
        assert!(first_ipv4(std::iter::empty()).is_none());
    }

    #[test]
    fn test_display_is_dotted_quad() {
        let id = NodeId::parse("10.0.0.5").unwrap();
        assert_eq!(id.to_string(), "10.0.0.5");
    }
}
