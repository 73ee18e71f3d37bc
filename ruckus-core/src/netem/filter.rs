//! Traffic filters for netem: target networks, ports and the interface name.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ValidationError;

static RE_INTERFACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9.:_-]*$").unwrap());

/// An IPv4 network, normalized to its network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    /// Network address.
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// Prefix length (0-32).
    pub fn prefix(&self) -> u8 {
        self.prefix
    }
}

impl FromStr for Cidr {
    type Err = ValidationError;

    /// Parse `a.b.c.d` (treated as `/32`) or `a.b.c.d/n`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidCidr(s.to_string());
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse::<u8>().map_err(|_| invalid())?),
            None => (s.trim(), 32),
        };
        if prefix > 32 {
            return Err(invalid());
        }
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
        Ok(Self {
            addr: Ipv4Addr::from(u32::from(addr) & mask),
            prefix,
        })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Parse a comma-separated port list; every port must be 1-65535.
pub fn parse_ports(list: &str) -> Result<Vec<u16>, ValidationError> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(ValidationError::InvalidPort(p.to_string())),
        })
        .collect()
}

/// Interface names must match `[a-zA-Z][a-zA-Z0-9.:_-]*`.
///
/// The name ends up inside a command line run in the target container.
pub fn validate_interface(iface: &str) -> Result<(), ValidationError> {
    if RE_INTERFACE.is_match(iface) {
        Ok(())
    } else {
        Err(ValidationError::InvalidInterface(iface.to_string()))
    }
}

/// Which traffic a netem effect applies to.
///
/// An empty filter means all traffic on the interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficFilter {
    /// Destination networks.
    pub targets: Vec<Cidr>,
    /// Source ports (egress traffic from these local ports).
    pub sports: Vec<u16>,
    /// Destination ports.
    pub dports: Vec<u16>,
}

impl TrafficFilter {
    /// True when no target or port restricts the effect.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.sports.is_empty() && self.dports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ip_is_host_route() {
        let cidr: Cidr = "10.0.0.5".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.5/32");
    }

    #[test]
    fn cidr_normalizes_to_network() {
        let cidr: Cidr = "192.168.1.77/24".parse().unwrap();
        assert_eq!(cidr.to_string(), "192.168.1.0/24");

        let any: Cidr = "1.2.3.4/0".parse().unwrap();
        assert_eq!(any.to_string(), "0.0.0.0/0");
    }

    #[test]
    fn bad_cidrs() {
        for bad in ["", "10.0.0", "10.0.0.1/33", "10.0.0.1/x", "::1", "host.local"] {
            assert!(bad.parse::<Cidr>().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn ports_parse() {
        assert_eq!(parse_ports("80,443, 8080").unwrap(), vec![80, 443, 8080]);
        assert_eq!(parse_ports("").unwrap(), Vec::<u16>::new());
        assert!(parse_ports("0").is_err());
        assert!(parse_ports("65536").is_err());
        assert!(parse_ports("http").is_err());
    }

    #[test]
    fn interface_names() {
        for good in ["eth0", "ens3", "eth0.100", "br-1a2b", "veth_x", "eth0:1"] {
            assert!(validate_interface(good).is_ok(), "{good}");
        }
        for bad in ["", "0eth", "eth0;reboot", "eth 0", "eth0$(id)", "-eth"] {
            assert!(validate_interface(bad).is_err(), "{bad}");
        }
    }
}
