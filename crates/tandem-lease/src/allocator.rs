//! Lowest-free-address allocation against a point-in-time snapshot.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use tracing::debug;

use crate::error::{LeaseError, LeaseResult};
use crate::subnet::{Subnet, parse_addr};

/// The set of addresses currently in use on the managed network.
///
/// Built fresh for each allocation request from the container runtime's
/// network inspection plus the addresses recorded in the order table.
/// Entries may be bare IPs or CIDR literals; empty or unparsable entries
/// are skipped rather than rejected, since fresh order rows carry empty
/// address fields until provisioning fills them in.
#[derive(Debug, Clone, Default)]
pub struct LeaseSnapshot {
    in_use: HashSet<Ipv4Addr>,
}

impl LeaseSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_addrs<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut snapshot = Self::new();
        for addr in addrs {
            snapshot.insert(addr.as_ref());
        }
        snapshot
    }

    /// Record an address as taken.
    pub fn insert(&mut self, addr: &str) {
        if let Ok(ip) = parse_addr(addr) {
            self.in_use.insert(ip);
        }
    }

    pub fn insert_ip(&mut self, ip: Ipv4Addr) {
        self.in_use.insert(ip);
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.in_use.contains(&ip)
    }

    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }
}

/// Pick the numerically smallest free host address in `subnet`.
///
/// The network and broadcast addresses, the gateway, and every snapshot
/// entry are excluded. Deterministic for a fixed snapshot; two calls
/// without an intervening insert return the same address.
pub fn allocate(
    subnet: Subnet,
    gateway: Ipv4Addr,
    snapshot: &LeaseSnapshot,
) -> LeaseResult<Ipv4Addr> {
    for candidate in subnet.hosts() {
        if candidate == gateway || snapshot.contains(candidate) {
            continue;
        }
        debug!(address = %candidate, %subnet, in_use = snapshot.len(), "leased address");
        return Ok(candidate);
    }
    Err(LeaseError::Exhausted {
        subnet: subnet.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(s: &str) -> Subnet {
        s.parse().unwrap()
    }

    #[test]
    fn allocates_lowest_free_address() {
        let snapshot =
            LeaseSnapshot::from_addrs(["10.0.0.2", "10.0.0.3", "10.0.0.4"]);
        let gateway = Ipv4Addr::new(10, 0, 0, 1);
        let ip = allocate(subnet("10.0.0.0/24"), gateway, &snapshot).unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 5));
    }

    #[test]
    fn skips_gateway_on_empty_network() {
        let gateway = Ipv4Addr::new(172, 20, 0, 1);
        let ip = allocate(
            subnet("172.20.0.0/16"),
            gateway,
            &LeaseSnapshot::new(),
        )
        .unwrap();
        assert_eq!(ip, Ipv4Addr::new(172, 20, 0, 2));
    }

    #[test]
    fn fills_holes_before_extending() {
        let snapshot = LeaseSnapshot::from_addrs(["10.0.0.2", "10.0.0.4"]);
        let gateway = Ipv4Addr::new(10, 0, 0, 1);
        let ip = allocate(subnet("10.0.0.0/24"), gateway, &snapshot).unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 3));
    }

    #[test]
    fn deterministic_without_insert() {
        let snapshot = LeaseSnapshot::from_addrs(["10.0.0.2"]);
        let gateway = Ipv4Addr::new(10, 0, 0, 1);
        let net = subnet("10.0.0.0/24");
        let a = allocate(net, gateway, &snapshot).unwrap();
        let b = allocate(net, gateway, &snapshot).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn exhausted_when_range_is_spent() {
        // /30 has two host addresses; one is the gateway, one is used.
        let snapshot = LeaseSnapshot::from_addrs(["10.0.0.2"]);
        let gateway = Ipv4Addr::new(10, 0, 0, 1);
        let err = allocate(subnet("10.0.0.0/30"), gateway, &snapshot).unwrap_err();
        assert!(matches!(err, LeaseError::Exhausted { .. }));
    }

    #[test]
    fn snapshot_tolerates_cidr_and_junk_entries() {
        let snapshot = LeaseSnapshot::from_addrs([
            "10.0.0.2/24",
            "",
            "not-an-address",
            "10.0.0.3",
        ]);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(snapshot.contains(Ipv4Addr::new(10, 0, 0, 3)));
    }

    #[test]
    fn never_returns_network_or_broadcast() {
        // /30 with a free pool and no gateway inside: candidates are only
        // .1 and .2, never .0 or .3.
        let gateway = Ipv4Addr::new(192, 168, 5, 200);
        let net = subnet("10.0.0.0/30");
        let mut snapshot = LeaseSnapshot::new();
        let first = allocate(net, gateway, &snapshot).unwrap();
        assert_eq!(first, Ipv4Addr::new(10, 0, 0, 1));
        snapshot.insert_ip(first);
        let second = allocate(net, gateway, &snapshot).unwrap();
        assert_eq!(second, Ipv4Addr::new(10, 0, 0, 2));
        snapshot.insert_ip(second);
        assert!(allocate(net, gateway, &snapshot).is_err());
    }
}
