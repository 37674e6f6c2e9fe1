//! Outbound destination policy.
//!
//! Integrations may not reach loopback, private, link-local or otherwise
//! reserved addresses unless the operator allow-lists them. Hostnames are
//! resolved first and every resolved address must pass.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::warn;
use url::{Host, Url};

use crate::dispatcher::DispatchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CidrRange {
    network: IpAddr,
    prefix: u8,
}

impl CidrRange {
    fn parse(raw: &str) -> Option<Self> {
        let (address, prefix) = match raw.split_once('/') {
            Some((address, prefix)) => (address.parse::<IpAddr>().ok()?, prefix.parse::<u8>().ok()?),
            None => {
                let address = raw.parse::<IpAddr>().ok()?;
                let full = if address.is_ipv4() { 32 } else { 128 };
                (address, full)
            }
        };
        let max = if address.is_ipv4() { 32 } else { 128 };
        (prefix <= max).then_some(Self { network: address, prefix })
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, canonical(ip)) {
            (IpAddr::V4(network), IpAddr::V4(candidate)) => {
                let mask = prefix_mask_v4(self.prefix);
                u32::from(network) & mask == u32::from(candidate) & mask
            }
            (IpAddr::V6(network), IpAddr::V6(candidate)) => {
                let mask = prefix_mask_v6(self.prefix);
                u128::from(network) & mask == u128::from(candidate) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn prefix_mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

/// IPv4-mapped IPv6 addresses are judged as the IPv4 address they carry.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        v4 => v4,
    }
}

fn is_reserved_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        // 100.64.0.0/10 carrier-grade NAT
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        // 0.0.0.0/8
        || octets[0] == 0
}

fn is_reserved_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}

/// True for any address an untrusted integration must not reach by default.
pub fn is_reserved(ip: IpAddr) -> bool {
    match canonical(ip) {
        IpAddr::V4(v4) => is_reserved_v4(v4),
        IpAddr::V6(v6) => is_reserved_v6(v6),
    }
}

/// Deny-by-default policy for internal destinations with an operator
/// allow-list of CIDR ranges, single addresses and hostnames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkPolicy {
    ranges: Vec<CidrRange>,
    hostnames: Vec<String>,
}

impl NetworkPolicy {
    /// Parses a whitespace or comma separated allow-list. Entries that look
    /// like ranges but do not parse are skipped with a warning.
    pub fn from_allow_list(raw: &str) -> Self {
        let mut policy = Self::default();
        for entry in raw.split(|c: char| c.is_whitespace() || c == ',').filter(|e| !e.is_empty()) {
            if let Some(range) = CidrRange::parse(entry) {
                policy.ranges.push(range);
            } else if entry.contains('/') || entry.parse::<IpAddr>().is_ok() {
                warn!(
                    event_name = "command.network.invalid_allow_entry",
                    entry = entry,
                    "ignoring malformed internal connection allow-list entry"
                );
            } else {
                policy.hostnames.push(entry.trim_end_matches('.').to_ascii_lowercase());
            }
        }
        policy
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.hostnames.is_empty()
    }

    fn hostname_allowed(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.hostnames.iter().any(|allowed| *allowed == host)
    }

    /// Whether a concrete address may be contacted.
    pub fn permits(&self, ip: IpAddr) -> bool {
        !is_reserved(ip) || self.ranges.iter().any(|range| range.contains(ip))
    }

    /// Resolves the URL's host and checks every address. Returns the
    /// addresses so the caller can connect to exactly those.
    pub async fn check(&self, url: &Url) -> Result<Vec<SocketAddr>, DispatchError> {
        let port = url.port_or_known_default().unwrap_or(80);
        let host = url
            .host()
            .ok_or_else(|| DispatchError::InvalidUrl(format!("`{url}` has no host")))?;

        let addresses: Vec<SocketAddr> = match host {
            Host::Ipv4(ip) => vec![SocketAddr::new(IpAddr::V4(ip), port)],
            Host::Ipv6(ip) => vec![SocketAddr::new(IpAddr::V6(ip), port)],
            Host::Domain(domain) => {
                let resolved: Vec<SocketAddr> = tokio::net::lookup_host((domain, port))
                    .await
                    .map_err(|error| DispatchError::Resolve(format!("{domain}: {error}")))?
                    .collect();
                if resolved.is_empty() {
                    return Err(DispatchError::Resolve(format!("{domain}: no addresses")));
                }
                if self.hostname_allowed(domain) {
                    return Ok(resolved);
                }
                resolved
            }
        };

        if let Some(blocked) = addresses.iter().find(|address| !self.permits(address.ip())) {
            return Err(DispatchError::Blocked(blocked.ip()));
        }
        Ok(addresses)
    }
}
