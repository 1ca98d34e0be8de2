//! IPv4 subnet math and address normalization.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{LeaseError, LeaseResult};

/// An IPv4 subnet in CIDR notation, e.g. `172.20.0.0/16`.
///
/// The network address is normalized on construction: host bits in the
/// input are masked off, so `10.0.0.5/24` becomes `10.0.0.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> LeaseResult<Self> {
        if prefix > 32 {
            return Err(LeaseError::InvalidCidr(format!("{addr}/{prefix}")));
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask_for(prefix));
        Ok(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask_for(self.prefix))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask_for(self.prefix) == u32::from(self.network)
    }

    /// Assignable host addresses in ascending order. Excludes the network
    /// and broadcast addresses; empty for /31 and /32.
    pub fn hosts(self) -> impl Iterator<Item = Ipv4Addr> {
        let first = u32::from(self.network).saturating_add(1);
        let last = u32::from(self.broadcast()).saturating_sub(1);
        (first..=last).map(Ipv4Addr::from)
    }
}

fn mask_for(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl FromStr for Subnet {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| LeaseError::InvalidCidr(s.to_string()))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| LeaseError::InvalidCidr(s.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| LeaseError::InvalidCidr(s.to_string()))?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Strip a CIDR suffix if present: `172.20.0.1/16` → `172.20.0.1`.
///
/// Container runtimes report attached addresses as CIDR literals; the
/// order table and the connection cache work with bare IPs.
pub fn normalize_addr(addr: &str) -> &str {
    match addr.split_once('/') {
        Some((ip, _)) => ip,
        None => addr,
    }
}

/// Parse a bare IP or CIDR literal into an address.
pub fn parse_addr(addr: &str) -> LeaseResult<Ipv4Addr> {
    normalize_addr(addr)
        .trim()
        .parse()
        .map_err(|_| LeaseError::InvalidAddress(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let subnet: Subnet = "172.20.0.0/16".parse().unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(172, 20, 0, 0));
        assert_eq!(subnet.prefix(), 16);
        assert_eq!(subnet.to_string(), "172.20.0.0/16");
    }

    #[test]
    fn host_bits_are_masked_off() {
        let subnet: Subnet = "10.0.0.5/24".parse().unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(10, 0, 0, 255));
    }

    #[test]
    fn contains_checks_the_masked_prefix() {
        let subnet: Subnet = "172.20.0.0/16".parse().unwrap();
        assert!(subnet.contains(Ipv4Addr::new(172, 20, 255, 3)));
        assert!(!subnet.contains(Ipv4Addr::new(172, 21, 0, 1)));
    }

    #[test]
    fn hosts_exclude_network_and_broadcast() {
        let subnet: Subnet = "10.0.0.0/30".parse().unwrap();
        let hosts: Vec<Ipv4Addr> = subnet.hosts().collect();
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }

    #[test]
    fn tiny_prefixes_have_no_hosts() {
        let p31: Subnet = "10.0.0.0/31".parse().unwrap();
        assert_eq!(p31.hosts().count(), 0);
        let p32: Subnet = "10.0.0.0/32".parse().unwrap();
        assert_eq!(p32.hosts().count(), 0);
    }

    #[test]
    fn rejects_malformed_cidr() {
        assert!("172.20.0.0".parse::<Subnet>().is_err());
        assert!("172.20.0.0/33".parse::<Subnet>().is_err());
        assert!("not-an-ip/16".parse::<Subnet>().is_err());
    }

    #[test]
    fn normalize_strips_suffix() {
        assert_eq!(normalize_addr("172.20.0.1/16"), "172.20.0.1");
        assert_eq!(normalize_addr("172.20.0.1"), "172.20.0.1");
    }

    #[test]
    fn parse_addr_accepts_both_forms() {
        assert_eq!(
            parse_addr("172.20.0.1/16").unwrap(),
            Ipv4Addr::new(172, 20, 0, 1)
        );
        assert_eq!(
            parse_addr("172.20.0.1").unwrap(),
            Ipv4Addr::new(172, 20, 0, 1)
        );
        assert!(parse_addr("gateway").is_err());
    }
}
